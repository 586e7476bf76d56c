//! Multicasting observables: one producer run shared by many subscribers.
//!
//! A [`Connectable`] sits between a cold source and its subscribers.
//! Subscribing only registers with the connectable's subject; nothing flows
//! until `connect()` subscribes the source into that subject, after which
//! every registered subscriber receives the same emissions. `ref_count()`
//! automates the connect/disconnect pair around the first and last
//! subscriber.

use std::{
    error::Error,
    sync::{Arc, Mutex},
};

use crate::errors::UnsubscriptionError;
use crate::observer::Observer;
use crate::subjects::{
    AsyncSubject, AsyncSubjectEmitter, AsyncSubjectReceiver, Subject, SubjectEmitter,
    SubjectReceiver,
};
use crate::subscription::subscribe::{
    Subscribeable, Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic,
    Unsubscribeable,
};

use super::Observable;

struct ConnectableState<E, R> {
    subject: Option<(E, R)>,
    connection: Option<Subscription>,
}

/// Multicasting observable with a `connect()` method for starting one shared
/// subscription to the underlying source.
///
/// A `Connectable` does not emit until `connect()` is called, so any number
/// of subscribers can register beforehand and then receive the same set of
/// values concurrently. The emitter/receiver pair backing the multicast
/// comes from a subject factory: a plain `Subject` for
/// [`publish`](super::ObservableExt::publish), an `AsyncSubject` for
/// [`publish_last`](super::ObservableExt::publish_last).
///
/// When the shared run terminates, the connectable resets itself (subject
/// and connection are dropped) before the terminal notification reaches the
/// subscribers, so a later `connect()` starts a fresh run.
pub struct Connectable<T, E, R>
where
    E: Observer<NextFnType = T> + Clone + Send + Sync + 'static,
    R: Subscribeable<ObsType = T> + Clone + Send + Sync + 'static,
{
    source: Arc<Mutex<dyn Subscribeable<ObsType = T> + Send + Sync>>,
    subject_factory: Arc<dyn Fn() -> (E, R) + Send + Sync>,
    state: Arc<Mutex<ConnectableState<E, R>>>,
}

impl<T, E, R> Clone for Connectable<T, E, R>
where
    E: Observer<NextFnType = T> + Clone + Send + Sync + 'static,
    R: Subscribeable<ObsType = T> + Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Connectable {
            source: Arc::clone(&self.source),
            subject_factory: Arc::clone(&self.subject_factory),
            state: Arc::clone(&self.state),
        }
    }
}

/// Drops the current subject and closes the live connection. Runs before the
/// terminal notification is propagated, so late subscribers and a later
/// `connect()` see a fresh connectable.
fn reset_on_terminal<E, R>(state: &Arc<Mutex<ConnectableState<E, R>>>) {
    let conn = {
        let mut st = state.lock().unwrap();
        st.subject = None;
        st.connection.take()
    };
    if let Some(c) = conn {
        if let Err(e) = c.unsubscribe() {
            log::warn!("connection teardown failed: {}", e);
        }
    }
}

/// Gives back one consumer's share of the refcounted connection; the last
/// share closes it. Idempotent per consumer, so a terminal notification
/// followed by an explicit unsubscribe releases only once.
fn release(
    count: &Arc<Mutex<usize>>,
    shared_connection: &Arc<Mutex<Option<Subscription>>>,
    released: &Arc<Mutex<bool>>,
) -> Result<(), UnsubscriptionError> {
    {
        let mut r = released.lock().unwrap();
        if *r {
            return Ok(());
        }
        *r = true;
    }
    let conn = {
        let mut c = count.lock().unwrap();
        *c = c.saturating_sub(1);
        if *c == 0 {
            shared_connection.lock().unwrap().take()
        } else {
            None
        }
    };
    match conn {
        Some(c) => c.unsubscribe(),
        None => Ok(()),
    }
}

impl<T, E, R> Connectable<T, E, R>
where
    T: Send + 'static,
    E: Observer<NextFnType = T> + Clone + Send + Sync + 'static,
    R: Subscribeable<ObsType = T> + Clone + Send + Sync + 'static,
{
    pub(super) fn with_factory<S, F>(source: S, factory: F) -> Self
    where
        S: Subscribeable<ObsType = T> + Send + Sync + 'static,
        F: Fn() -> (E, R) + Send + Sync + 'static,
    {
        let source: Arc<Mutex<dyn Subscribeable<ObsType = T> + Send + Sync>> =
            Arc::new(Mutex::new(source));
        Connectable {
            source,
            subject_factory: Arc::new(factory),
            state: Arc::new(Mutex::new(ConnectableState {
                subject: None,
                connection: None,
            })),
        }
    }

    fn current_receiver(&self) -> R {
        let mut st = self.state.lock().unwrap();
        if st.subject.is_none() {
            st.subject = Some((self.subject_factory)());
        }
        st.subject.as_ref().unwrap().1.clone()
    }

    /// Connects the underlying source to the subject, starting the shared
    /// emissions.
    ///
    /// Idempotent while a connection is live: further calls return the same
    /// handle. The handle is stored *before* the source is subscribed, so a
    /// source that completes synchronously during `connect()` finds and
    /// closes that very handle; there is no window in which a connection
    /// exists but cannot be torn down.
    ///
    /// Unsubscribing the returned handle disconnects the source from the
    /// subject, stopping notifications to every subscriber.
    #[must_use]
    pub fn connect(&self) -> Subscription {
        let (emitter, connection) = {
            let mut st = self.state.lock().unwrap();
            if let Some(c) = &st.connection {
                if !c.is_closed() {
                    return c.clone();
                }
            }
            if st.subject.is_none() {
                st.subject = Some((self.subject_factory)());
            }
            let emitter = st.subject.as_ref().unwrap().0.clone();
            let connection =
                Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);
            st.connection = Some(connection.clone());
            (emitter, connection)
        };

        let state_e = Arc::clone(&self.state);
        let state_c = Arc::clone(&self.state);
        let mut e_n = emitter.clone();
        let mut e_e = emitter.clone();
        let mut e_c = emitter;

        let wrapper = Subscriber::new(
            move |v| e_n.next(v),
            move |err| {
                reset_on_terminal(&state_e);
                e_e.error(err);
            },
            move || {
                reset_on_terminal(&state_c);
                e_c.complete();
            },
        );

        let src_sub = self.source.lock().unwrap().subscribe(wrapper);
        // The connection carries the producer's join handle so callers can
        // await the shared run through the handle `connect()` returns.
        connection.set_handle(src_sub.take_handle());
        // For a source that already terminated, the connection is closed by
        // now and `add` disposes the producer subscription immediately.
        connection.add(src_sub);
        connection
    }

    /// Turns the connectable into an ordinary observable that connects when
    /// the first subscriber arrives and tears the shared connection down
    /// when the last one leaves.
    ///
    /// A subscriber leaves either by unsubscribing or by receiving a
    /// terminal notification; whichever happens first releases its share
    /// exactly once.
    pub fn ref_count(self) -> Observable<T> {
        let count = Arc::new(Mutex::new(0_usize));
        let shared_connection: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        Observable::new(move |s: Subscriber<T>| {
            let released = Arc::new(Mutex::new(false));

            let s_shared = Arc::new(Mutex::new(s));
            let s_e = Arc::clone(&s_shared);
            let s_c = Arc::clone(&s_shared);

            let count_te = Arc::clone(&count);
            let conn_te = Arc::clone(&shared_connection);
            let released_te = Arc::clone(&released);
            let count_tc = Arc::clone(&count);
            let conn_tc = Arc::clone(&shared_connection);
            let released_tc = Arc::clone(&released);

            let wrapped = Subscriber::new(
                move |v| s_shared.lock().unwrap().next(v),
                move |err| {
                    s_e.lock().unwrap().error(err);
                    if let Err(e) = release(&count_te, &conn_te, &released_te) {
                        log::warn!("shared connection teardown failed: {}", e);
                    }
                },
                move || {
                    s_c.lock().unwrap().complete();
                    if let Err(e) = release(&count_tc, &conn_tc, &released_tc) {
                        log::warn!("shared connection teardown failed: {}", e);
                    }
                },
            );

            let mut receiver = self.current_receiver();
            let inner_sub = receiver.subscribe(wrapped);

            let need_connect = {
                let mut c = count.lock().unwrap();
                *c += 1;
                *c == 1
            };
            if need_connect {
                let conn = self.connect();
                *shared_connection.lock().unwrap() = Some(conn);
            }

            let release_count = Arc::clone(&count);
            let release_conn = Arc::clone(&shared_connection);
            let release_flag = Arc::clone(&released);
            Subscription::new(
                UnsubscribeLogic::Logic(Box::new(move || {
                    let mut errors: Vec<Arc<dyn Error + Send + Sync>> = Vec::new();
                    if let Err(e) = inner_sub.unsubscribe() {
                        errors.extend(e.errors().iter().cloned());
                    }
                    if let Err(e) = release(&release_count, &release_conn, &release_flag) {
                        errors.extend(e.errors().iter().cloned());
                    }
                    if errors.is_empty() {
                        Ok(())
                    } else {
                        Err(UnsubscriptionError::new(errors).into_shared())
                    }
                })),
                SubscriptionHandle::Nil,
            )
        })
    }
}

impl<T, E, R> Subscribeable for Connectable<T, E, R>
where
    T: Send + 'static,
    E: Observer<NextFnType = T> + Clone + Send + Sync + 'static,
    R: Subscribeable<ObsType = T> + Clone + Send + Sync + 'static,
{
    type ObsType = T;

    fn subscribe(&mut self, s: Subscriber<Self::ObsType>) -> Subscription {
        let mut receiver = self.current_receiver();
        receiver.subscribe(s)
    }
}

pub(super) fn connectable<S, T>(
    source: S,
) -> Connectable<T, SubjectEmitter<T>, SubjectReceiver<T>>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    Connectable::with_factory(source, Subject::emitter_receiver)
}

pub(super) fn publish_last<S, T>(
    source: S,
) -> Connectable<T, AsyncSubjectEmitter<T>, AsyncSubjectReceiver<T>>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    Connectable::with_factory(source, AsyncSubject::emitter_receiver)
}

pub(super) fn multicast<S, T, R2, SF, SEL>(
    source: S,
    subject_factory: SF,
    selector: SEL,
) -> Observable<R2>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    R2: 'static,
    SF: (FnMut() -> (Subscriber<T>, Observable<T>)) + Send + Sync + 'static,
    SEL: (FnMut(Observable<T>) -> Observable<R2>) + Send + Sync + 'static,
{
    let source = Arc::new(Mutex::new(source));
    let subject_factory = Arc::new(Mutex::new(subject_factory));
    let selector = Arc::new(Mutex::new(selector));

    Observable::new(move |s: Subscriber<R2>| {
        // One multicast lifetime per downstream subscription: a fresh
        // subject each time, torn down with this very subscription.
        let (emitter, shared) = (subject_factory.lock().unwrap())();
        let mut result = (selector.lock().unwrap())(shared);

        let parent = Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);
        parent.add(result.subscribe(s));
        parent.add(source.lock().unwrap().subscribe(emitter));
        parent
    })
}
