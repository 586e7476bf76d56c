use std::{
    any::Any,
    error::Error,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, Weak,
    },
    thread::JoinHandle as ThreadJoinHandle,
};

use smallvec::SmallVec;
use tokio::runtime;
use tokio::task::JoinHandle;

use crate::errors::UnsubscriptionError;
use crate::observer::Observer;

/// A trait for types that can be subscribed to, allowing consumers to receive
/// values emitted by an observable stream.
pub trait Subscribeable {
    /// The type of items emitted by the observable stream.
    type ObsType;

    /// Subscribes to the observable stream and specifies how to handle emitted
    /// values.
    ///
    /// The `Subscriber` parameter defines the behavior for processing values
    /// emitted by the observable stream. The returned `Subscription` allows
    /// the caller to cancel the stream and, for asynchronous sources, to await
    /// the producer.
    fn subscribe(&mut self, s: Subscriber<Self::ObsType>) -> Subscription;
}

/// A trait for types that can be unsubscribed, releasing the resources held
/// by an active subscription.
///
/// Unsubscribing consumes the handle. Teardown actions can fail; every
/// failure encountered while the graph is being torn down is collected and
/// returned as a single [`UnsubscriptionError`] after all teardowns ran, so
/// one failing action never prevents its siblings from being disposed.
pub trait Unsubscribeable {
    /// Unsubscribes and releases associated resources.
    ///
    /// # Errors
    ///
    /// Returns the aggregate of every teardown error collected while the
    /// subscription graph was being disposed.
    fn unsubscribe(self) -> Result<(), UnsubscriptionError>;
}

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type CompleteFn = Box<dyn FnMut() + Send + Sync>;
type ErrorFn = Box<dyn FnMut(Arc<dyn Error + Send + Sync>) + Send + Sync>;

/// The result a teardown callback reports back to the graph.
pub type TeardownResult = Result<(), Arc<dyn Error + Send + Sync>>;

/// A type that acts as an observer, allowing users to handle emitted values,
/// errors, and completion when subscribing to an `Observable` or `Subject`.
///
/// A `Subscriber` delivers at most one terminal notification: after `error`
/// or `complete` has been called it is stopped, and no further values reach
/// its handlers.
pub struct Subscriber<NextFnType> {
    next_fn: NextFn<NextFnType>,
    complete_fn: Option<CompleteFn>,
    error_fn: Option<ErrorFn>,
    completed: bool,
    errored: bool,
    stopped: Arc<AtomicBool>,
}

/// Lets its holder stop a [`Subscriber`] from the outside: after
/// [`stop`](StopHandle::stop) the subscriber delivers nothing further and
/// reports itself stopped to its producer.
///
/// Used by operators that cut a producer short, such as `take`, where the
/// decision to stop is made inside the subscriber's own `next` handler.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Stops the subscriber this handle was taken from.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl<NextFnType> Subscriber<NextFnType> {
    /// Creates a new `Subscriber` with handlers for emitted values, errors
    /// and completion.
    pub fn new(
        next_fn: impl FnMut(NextFnType) + 'static + Send,
        error_fn: impl FnMut(Arc<dyn Error + Send + Sync>) + 'static + Send + Sync,
        complete_fn: impl FnMut() + 'static + Send + Sync,
    ) -> Self {
        Subscriber {
            next_fn: Box::new(next_fn),
            complete_fn: Some(Box::new(complete_fn)),
            error_fn: Some(Box::new(error_fn)),
            completed: false,
            errored: false,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a new `Subscriber` with only a `next` handler.
    ///
    /// Completion is ignored; an error received without a registered error
    /// handler is logged, since silently dropping it would hide a terminated
    /// stream.
    pub fn on_next(next_fn: impl FnMut(NextFnType) + 'static + Send) -> Self {
        Subscriber {
            next_fn: Box::new(next_fn),
            complete_fn: None,
            error_fn: None,
            completed: false,
            errored: false,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the completion handler.
    pub fn on_complete(&mut self, complete_fn: impl FnMut() + 'static + Send + Sync) {
        self.complete_fn = Some(Box::new(complete_fn));
    }

    /// Sets the error handler.
    pub fn on_error(
        &mut self,
        error_fn: impl FnMut(Arc<dyn Error + Send + Sync>) + 'static + Send + Sync,
    ) {
        self.error_fn = Some(Box::new(error_fn));
    }

    /// Returns a handle that can stop this subscriber from the outside.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stopped))
    }

    /// Returns `true` once a terminal notification has been delivered or
    /// the subscriber was stopped through a [`StopHandle`].
    ///
    /// Synchronous producers use this to stop emitting early:
    ///
    /// ```text
    /// while !subscriber.is_stopped() { subscriber.next(produce()); }
    /// ```
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.completed || self.errored || self.stopped.load(Ordering::SeqCst)
    }
}

impl<T> Observer for Subscriber<T> {
    type NextFnType = T;

    fn next(&mut self, v: Self::NextFnType) {
        if self.is_stopped() {
            return;
        }
        (self.next_fn)(v);
    }

    fn complete(&mut self) {
        if self.is_stopped() {
            return;
        }
        self.completed = true;
        if let Some(cfn) = &mut self.complete_fn {
            (cfn)();
        }
    }

    fn error(&mut self, observable_error: Arc<dyn Error + Send + Sync>) {
        if self.is_stopped() {
            return;
        }
        self.errored = true;
        match &mut self.error_fn {
            Some(efn) => (efn)(observable_error),
            None => log::error!("unhandled observable error: {}", observable_error),
        }
    }
}

/// Enumerates the teardown actions a subscription can own.
pub enum UnsubscribeLogic {
    /// No teardown action.
    Nil,

    /// If one subscription depends on another. The wrapped subscription is
    /// unsubscribed as part of this one's teardown.
    Wrapped(Box<Subscription>),

    /// Teardown defined by a callback. The callback reports failures instead
    /// of aborting the rest of the graph; return `Ok(())` from actions that
    /// cannot fail.
    Logic(Box<dyn FnOnce() -> TeardownResult + Send>),

    /// Asynchronous teardown represented by a future, spawned on the Tokio
    /// runtime the subscription was created in. Use if the unsubscribe logic
    /// needs to send on async channels or `.await`.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

/// Enumerates the handles used to await the producer behind a subscription.
pub enum SubscriptionHandle {
    /// No handle; the producer is synchronous or detached.
    Nil,

    /// Join handle for a producer running as a Tokio task.
    JoinTask(JoinHandle<()>),

    /// Join handle for a producer running on an OS thread.
    JoinThread(ThreadJoinHandle<()>),
}

struct SubscriptionState {
    closed: bool,
    teardown: UnsubscribeLogic,
    children: SmallVec<[Subscription; 1]>,
    parents: Vec<Weak<Mutex<SubscriptionState>>>,
    handle: SubscriptionHandle,
    runtime_handle: Result<runtime::Handle, runtime::TryCurrentError>,
}

/// Represents a subscription to an observable or a subject: a disposable
/// handle over a teardown graph.
///
/// A `Subscription` owns its own teardown action plus any number of child
/// subscriptions registered through [`add`](Subscription::add). Unsubscribing
/// is transitive (children are disposed in insertion order) and idempotent
/// (the `closed` flag is set before any teardown runs, so re-entrant calls
/// are no-ops). Handles are cheaply clonable and all clones share the same
/// state, so a subscription stored in several places closes everywhere at
/// once.
///
/// For asynchronous producers the subscription also carries a join handle,
/// so the producer can be awaited through [`join`](Subscription::join) (OS
/// threads) or [`join_concurrent`](Subscription::join_concurrent) (Tokio
/// tasks).
pub struct Subscription {
    state: Arc<Mutex<SubscriptionState>>,
}

impl Clone for Subscription {
    fn clone(&self) -> Self {
        Subscription {
            state: Arc::clone(&self.state),
        }
    }
}

impl Subscription {
    /// Creates a new `Subscription` with the specified teardown logic and
    /// producer handle.
    #[must_use]
    pub fn new(
        unsubscribe_logic: UnsubscribeLogic,
        subscription_future: SubscriptionHandle,
    ) -> Self {
        let runtime_handle = runtime::Handle::try_current();
        Subscription {
            state: Arc::new(Mutex::new(SubscriptionState {
                closed: false,
                teardown: unsubscribe_logic,
                children: SmallVec::new(),
                parents: Vec::new(),
                handle: subscription_future,
                runtime_handle,
            })),
        }
    }

    /// Returns a subscription that is already closed.
    ///
    /// Used where a subscription must be handed out but there is nothing to
    /// cancel, e.g. when subscribing to a subject that has already
    /// terminated.
    #[must_use]
    pub fn closed() -> Self {
        let s = Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);
        s.state.lock().unwrap().closed = true;
        s
    }

    /// Returns `true` once this subscription has been unsubscribed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Registers `child` to be unsubscribed together with this subscription
    /// and returns its handle, so the caller can later detach it selectively
    /// with [`remove`](Subscription::remove).
    ///
    /// Adding a subscription to itself is a no-op. Adding to an already
    /// closed subscription disposes the child immediately instead of storing
    /// it.
    pub fn add(&self, child: Subscription) -> Subscription {
        if Arc::ptr_eq(&self.state, &child.state) {
            return child;
        }
        {
            let mut state = self.state.lock().unwrap();
            if !state.closed {
                child
                    .state
                    .lock()
                    .unwrap()
                    .parents
                    .push(Arc::downgrade(&self.state));
                state.children.push(child.clone());
                return child;
            }
        }
        if let Err(e) = child.clone().unsubscribe() {
            log::warn!("teardown added to a closed subscription failed: {}", e);
        }
        child
    }

    /// Wraps a teardown action in a child subscription and registers it.
    pub fn add_teardown(&self, teardown: UnsubscribeLogic) -> Subscription {
        self.add(Subscription::new(teardown, SubscriptionHandle::Nil))
    }

    /// Moves the producer handle out, leaving `Nil` behind.
    pub(crate) fn take_handle(&self) -> SubscriptionHandle {
        std::mem::replace(
            &mut self.state.lock().unwrap().handle,
            SubscriptionHandle::Nil,
        )
    }

    /// Installs a producer handle on this subscription.
    pub(crate) fn set_handle(&self, handle: SubscriptionHandle) {
        self.state.lock().unwrap().handle = handle;
    }

    /// Detaches `child` from this subscription without unsubscribing it.
    pub fn remove(&self, child: &Subscription) {
        self.state
            .lock()
            .unwrap()
            .children
            .retain(|c| !Arc::ptr_eq(&c.state, &child.state));
        child
            .state
            .lock()
            .unwrap()
            .parents
            .retain(|p| p.upgrade().is_some_and(|p| !Arc::ptr_eq(&p, &self.state)));
    }

    /// Awaits the producer running on an OS thread behind this subscription,
    /// blocking the current thread.
    ///
    /// # Errors
    ///
    /// Returns an error if joining the producer thread fails.
    ///
    /// # Panics
    ///
    /// Panics when the producer is a Tokio task; await those with
    /// [`join_concurrent`](Subscription::join_concurrent) instead.
    pub fn join(self) -> Result<(), Box<dyn Any + Send>> {
        let handle = std::mem::replace(
            &mut self.state.lock().unwrap().handle,
            SubscriptionHandle::Nil,
        );
        match handle {
            SubscriptionHandle::JoinThread(thread_handle) => thread_handle.join(),
            SubscriptionHandle::Nil => Ok(()),
            SubscriptionHandle::JoinTask(_) => {
                panic!(
                    "producer handle is a Tokio task handle; \
                     use `join_concurrent().await` to await it"
                )
            }
        }
    }

    /// Awaits the asynchronous producer behind this subscription, whether it
    /// runs as a Tokio task or on an OS thread.
    ///
    /// # Errors
    ///
    /// Returns an error if joining the producer task or thread fails.
    pub async fn join_concurrent(self) -> Result<(), Box<dyn Any + Send>> {
        let handle = std::mem::replace(
            &mut self.state.lock().unwrap().handle,
            SubscriptionHandle::Nil,
        );
        match handle {
            SubscriptionHandle::JoinTask(task_handle) => task_handle
                .await
                .map_err(|e| Box::new(e) as Box<dyn Any + Send>),
            SubscriptionHandle::JoinThread(thread_handle) => thread_handle.join(),
            SubscriptionHandle::Nil => Ok(()),
        }
    }
}

impl Unsubscribeable for Subscription {
    fn unsubscribe(self) -> Result<(), UnsubscriptionError> {
        // Mark closed and detach everything inside one critical section, then
        // run teardowns with no lock held so re-entrant calls from inside a
        // teardown cannot deadlock.
        let (teardown, children, parents, runtime_handle) = {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            (
                std::mem::replace(&mut state.teardown, UnsubscribeLogic::Nil),
                std::mem::take(&mut state.children),
                std::mem::take(&mut state.parents),
                state.runtime_handle.as_ref().ok().cloned(),
            )
        };

        for parent in parents {
            if let Some(parent) = parent.upgrade() {
                parent
                    .lock()
                    .unwrap()
                    .children
                    .retain(|c| !Arc::ptr_eq(&c.state, &self.state));
            }
        }

        let mut errors: Vec<Arc<dyn Error + Send + Sync>> = Vec::new();

        match teardown {
            UnsubscribeLogic::Nil => (),
            UnsubscribeLogic::Logic(fnc) => {
                if let Err(e) = fnc() {
                    errors.push(e);
                }
            }
            UnsubscribeLogic::Wrapped(subscription) => {
                if let Err(e) = subscription.unsubscribe() {
                    errors.extend(e.errors().iter().cloned());
                }
            }
            UnsubscribeLogic::Future(future) => match runtime_handle {
                Some(handle) => {
                    handle.spawn(async move {
                        future.await;
                    });
                }
                None => {
                    log::error!(
                        "async unsubscribe logic dropped: subscription was \
                         created outside a Tokio runtime"
                    );
                }
            },
        }

        for child in children {
            if let Err(e) = child.unsubscribe() {
                errors.extend(e.errors().iter().cloned());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(UnsubscriptionError::new(errors))
        }
    }
}
