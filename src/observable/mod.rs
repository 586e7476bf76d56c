//! The `observable` module provides the building blocks for creating and
//! manipulating observables, allowing for reactive programming in Rust.

use std::{
    error::Error,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::observer::Observer;
use crate::subscription::subscribe::{
    Subscribeable, Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic,
    Unsubscribeable,
};

mod buffer;
mod connectable;
mod group_by;
mod retry;
mod window;
mod zip;

pub use connectable::Connectable;
pub use group_by::GroupedObservable;

/// The `Observable` struct represents a source of values that can be
/// observed and transformed.
///
/// An observable is a lazy description of a push sequence: nothing runs
/// until `subscribe` is called, and every `subscribe` call invokes the
/// producer function again, independently of other subscriptions (cold by
/// default; use [`connectable`](ObservableExt::connectable) or
/// [`share`](ObservableExt::share) to multicast one producer run to many
/// subscribers).
///
/// The core imposes no scheduling of its own. `next`/`error`/`complete` are
/// ordinary synchronous calls, and the producer chooses whether to emit
/// inline, from an OS thread, or from a Tokio task; the returned
/// [`Subscription`] carries the unsubscribe logic and, for asynchronous
/// producers, a join handle.
///
/// # Example: basic synchronous `Observable`
///
/// ```no_run
/// use brook::subscribe::{Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic};
/// use brook::{Observable, Observer, Subscribeable};
///
/// let mut emit_10_observable = Observable::new(|mut subscriber| {
///     let mut i = 1;
///
///     while i <= 10 {
///         subscriber.next(i);
///         i += 1;
///     }
///     subscriber.complete();
///
///     Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
/// });
///
/// let observer = Subscriber::new(
///     |v| println!("Emitted {}", v),
///     |e| eprintln!("Error: {}", e),
///     || println!("Completed"),
/// );
///
/// // Observables are cold: without this call nothing is emitted.
/// emit_10_observable.subscribe(observer);
/// ```
///
/// # Example: asynchronous `Observable` with `unsubscribe`
///
/// ```no_run
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
///
/// use brook::subscribe::{
///     Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic, Unsubscribeable,
/// };
/// use brook::{Observable, ObservableExt, Observer, Subscribeable};
///
/// const STOP_SIGNAL: bool = true;
///
/// let observable = Observable::new(|mut o: Subscriber<_>| {
///     let done = Arc::new(Mutex::new(false));
///     let done_c = Arc::clone(&done);
///     let (tx, rx) = std::sync::mpsc::channel();
///
///     std::thread::spawn(move || {
///         if let Ok(STOP_SIGNAL) = rx.recv() {
///             *done_c.lock().unwrap() = STOP_SIGNAL;
///         }
///     });
///
///     let join_handle = std::thread::spawn(move || {
///         for i in 0..=10000 {
///             if *done.lock().unwrap() == STOP_SIGNAL {
///                 break;
///             }
///             o.next(i);
///             std::thread::sleep(Duration::from_millis(1));
///         }
///         o.complete();
///     });
///
///     Subscription::new(
///         UnsubscribeLogic::Logic(Box::new(move || {
///             if tx.send(STOP_SIGNAL).is_err() {
///                 println!("Receiver dropped.");
///             }
///             Ok(())
///         })),
///         SubscriptionHandle::JoinThread(join_handle),
///     )
/// });
///
/// let observer = Subscriber::on_next(|v| println!("Emitted {}", v));
///
/// let subscription = observable
///     .take(500)
///     .map(|v| format!("Mapped {}", v))
///     .subscribe(observer);
///
/// // Stop the emissions from the outside.
/// subscription.unsubscribe().unwrap();
/// ```
pub struct Observable<T> {
    subscribe_fn: Box<dyn FnMut(Subscriber<T>) -> Subscription + Send + Sync>,
}

impl<T> Observable<T> {
    /// Creates a new `Observable` with the provided subscribe function.
    ///
    /// The closure `sf` is the producer: it is invoked once per `subscribe`
    /// call with the downstream `Subscriber`, emits values through it, and
    /// returns a `Subscription` carrying the teardown logic (and, for
    /// asynchronous producers, a join handle).
    pub fn new(sf: impl FnMut(Subscriber<T>) -> Subscription + Send + Sync + 'static) -> Self {
        Observable {
            subscribe_fn: Box::new(sf),
        }
    }
}

impl<T: 'static> Observable<T> {
    /// Creates an observable that emits a single value, then completes.
    pub fn of(value: T) -> Self
    where
        T: Clone + Send + Sync,
    {
        Observable::new(move |mut o: Subscriber<T>| {
            o.next(value.clone());
            o.complete();
            Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
        })
    }

    /// Bridges a pull-style iterable into the push model.
    ///
    /// Each subscription re-runs the iterator from the start. One item is
    /// pulled per delivery and the loop stops as soon as the subscriber is
    /// stopped, so an infinite iterator composes with operators like
    /// [`take`](ObservableExt::take).
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    {
        Observable::new(move |mut o: Subscriber<T>| {
            for v in iter.clone() {
                if o.is_stopped() {
                    break;
                }
                o.next(v);
            }
            o.complete();
            Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
        })
    }

    /// Creates an observable that completes without emitting any value.
    pub fn empty() -> Self {
        Observable::new(|mut o: Subscriber<T>| {
            o.complete();
            Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
        })
    }

    /// Creates an observable that signals the given error to every
    /// subscriber.
    pub fn throw_error(e: Arc<dyn Error + Send + Sync>) -> Self {
        Observable::new(move |mut o: Subscriber<T>| {
            o.error(Arc::clone(&e));
            Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
        })
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Drives this observable to completion, applying `f` to every emitted
    /// value.
    ///
    /// Resolves with `Ok(())` when the source completes and with the
    /// received error when it fails; a failing source is eagerly
    /// unsubscribed.
    ///
    /// # Errors
    ///
    /// Returns the error emitted by the source, if any.
    pub async fn for_each<F>(mut self, f: F) -> Result<(), Arc<dyn Error + Send + Sync>>
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let tx_e = Arc::clone(&tx);

        let s = self.subscribe(Subscriber::new(
            f,
            move |e| {
                if let Some(tx) = tx_e.lock().unwrap().take() {
                    let _ = tx.send(Err(e));
                }
            },
            move || {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(Ok(()));
                }
            },
        ));

        // A dropped sender means the producer went away without a terminal
        // notification; treat it as completion.
        let result = rx.await.unwrap_or(Ok(()));
        if result.is_err() {
            if let Err(e) = s.unsubscribe() {
                log::warn!("teardown failed after source error: {}", e);
            }
        }
        result
    }
}

/// The `ObservableExt` trait provides the operators: extension methods
/// available on every [`Subscribeable`] type, including observables, subject
/// receivers, connectables and grouped observables.
///
/// Each operator returns a new `Observable` whose producer subscribes to the
/// source with an operator-specific subscriber, so chains compose without
/// running anything until the final `subscribe`.
pub trait ObservableExt<T: 'static>: Subscribeable<ObsType = T> {
    /// Transforms the items emitted by the observable using a transformation
    /// function.
    fn map<U, F>(mut self, f: F) -> Observable<U>
    where
        Self: Sized + Send + Sync + 'static,
        F: (FnOnce(T) -> U) + Copy + Sync + Send + 'static,
        U: 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let u = Subscriber::new(
                move |v| {
                    let t = f(v);
                    o_shared.lock().unwrap().next(t);
                },
                move |observable_error| {
                    o_cloned_e.lock().unwrap().error(observable_error);
                },
                move || {
                    o_cloned_c.lock().unwrap().complete();
                },
            );
            self.subscribe(u)
        })
    }

    /// Filters the items emitted by the observable based on a predicate
    /// function.
    fn filter<P>(mut self, predicate: P) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        P: (FnOnce(&T) -> bool) + Copy + Sync + Send + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let u = Subscriber::new(
                move |v| {
                    if predicate(&v) {
                        o_shared.lock().unwrap().next(v);
                    }
                },
                move |observable_error| {
                    o_cloned_e.lock().unwrap().error(observable_error);
                },
                move || {
                    o_cloned_c.lock().unwrap().complete();
                },
            );
            self.subscribe(u)
        })
    }

    /// Invokes a side effect for every emitted item, passing values through
    /// unchanged.
    fn tap<F>(mut self, f: F) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        F: FnMut(&T) + Sync + Send + 'static,
    {
        let f = Arc::new(Mutex::new(f));
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);
            let f = Arc::clone(&f);

            let u = Subscriber::new(
                move |v| {
                    (f.lock().unwrap())(&v);
                    o_shared.lock().unwrap().next(v);
                },
                move |observable_error| {
                    o_cloned_e.lock().unwrap().error(observable_error);
                },
                move || {
                    o_cloned_c.lock().unwrap().complete();
                },
            );
            self.subscribe(u)
        })
    }

    /// Skips the first `n` items emitted by the observable and then emits
    /// the rest.
    fn skip(mut self, n: usize) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let mut n = n;
            let u = Subscriber::new(
                move |v| {
                    if n > 0 {
                        n -= 1;
                        return;
                    }
                    o_shared.lock().unwrap().next(v);
                },
                move |observable_error| {
                    o_cloned_e.lock().unwrap().error(observable_error);
                },
                move || {
                    o_cloned_c.lock().unwrap().complete();
                },
            );
            self.subscribe(u)
        })
    }

    /// Delays the emissions from the observable by the specified number of
    /// milliseconds.
    fn delay(mut self, num_of_ms: u64) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let u = Subscriber::new(
                move |v| {
                    std::thread::sleep(Duration::from_millis(num_of_ms));
                    o_shared.lock().unwrap().next(v);
                },
                move |observable_error| {
                    o_cloned_e.lock().unwrap().error(observable_error);
                },
                move || {
                    o_cloned_c.lock().unwrap().complete();
                },
            );
            self.subscribe(u)
        })
    }

    /// Emits at most the first `n` items emitted by the observable, then
    /// completes and unsubscribes from the source.
    fn take(mut self, n: usize) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |mut o| {
            if n == 0 {
                o.complete();
                return Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);
            }

            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let upstream: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
            let upstream_c = Arc::clone(&upstream);
            let done = Arc::new(Mutex::new(false));
            let done_c = Arc::clone(&done);
            // Filled right after the subscriber is built; stopping the
            // subscriber is what cuts a synchronous producer short.
            let halt: Arc<Mutex<Option<crate::subscribe::StopHandle>>> =
                Arc::new(Mutex::new(None));
            let halt_c = Arc::clone(&halt);
            let mut taken = 0_usize;

            let u = Subscriber::new(
                move |v| {
                    if taken >= n {
                        return;
                    }
                    taken += 1;
                    o_shared.lock().unwrap().next(v);
                    if taken == n {
                        o_shared.lock().unwrap().complete();
                        *done_c.lock().unwrap() = true;
                        if let Some(h) = halt_c.lock().unwrap().as_ref() {
                            h.stop();
                        }
                        // Upstream handle is present only when the producer
                        // emits asynchronously; synchronous completion is
                        // handled after `subscribe` returns.
                        if let Some(s) = upstream_c.lock().unwrap().take() {
                            if let Err(e) = s.unsubscribe() {
                                log::warn!("upstream teardown failed in take: {}", e);
                            }
                        }
                    }
                },
                move |observable_error| {
                    o_cloned_e.lock().unwrap().error(observable_error);
                },
                move || {
                    o_cloned_c.lock().unwrap().complete();
                },
            );
            *halt.lock().unwrap() = Some(u.stop_handle());

            let s = self.subscribe(u);

            if *done.lock().unwrap() {
                if let Err(e) = s.clone().unsubscribe() {
                    log::warn!("upstream teardown failed in take: {}", e);
                }
            } else {
                *upstream.lock().unwrap() = Some(s.clone());
            }
            s
        })
    }

    /// Transforms the items emitted by the source observable into inner
    /// observables and merges their emissions into a single observable
    /// stream, subscribing to every inner observable concurrently.
    fn merge_map<R: 'static, F>(mut self, project: F) -> Observable<R>
    where
        Self: Sized + Send + Sync + 'static,
        F: (FnMut(T) -> Observable<R>) + Sync + Send + 'static,
    {
        let project = Arc::new(Mutex::new(project));
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let project = Arc::clone(&project);

            let composite = Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);
            let composite_c = composite.clone();

            let u = Subscriber::new(
                move |v| {
                    let o_shared = Arc::clone(&o_shared);
                    let o_cloned_e = Arc::clone(&o_shared);
                    let o_cloned_c = Arc::clone(&o_shared);

                    let mut inner_observable = (project.lock().unwrap())(v);

                    let inner_subscriber = Subscriber::new(
                        move |k| {
                            o_shared.lock().unwrap().next(k);
                        },
                        move |observable_error| {
                            o_cloned_e.lock().unwrap().error(observable_error);
                        },
                        move || {
                            o_cloned_c.lock().unwrap().complete();
                        },
                    );
                    composite_c.add(inner_observable.subscribe(inner_subscriber));
                },
                move |observable_error| {
                    o_cloned_e.lock().unwrap().error(observable_error);
                },
                move || {
                    o_cloned_c.lock().unwrap().complete();
                },
            );
            composite.add(self.subscribe(u));
            composite
        })
    }

    /// Transforms the items emitted by the source observable into inner
    /// observables, mirroring only the most recent one: each new item
    /// unsubscribes the previous inner observable before subscribing the
    /// next.
    fn switch_map<R: 'static, F>(mut self, project: F) -> Observable<R>
    where
        Self: Sized + Send + Sync + 'static,
        F: (FnMut(T) -> Observable<R>) + Sync + Send + 'static,
    {
        let project = Arc::new(Mutex::new(project));
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let project = Arc::clone(&project);

            let mut current_subscription: Option<Subscription> = None;

            let u = Subscriber::new(
                move |v| {
                    let o_shared = Arc::clone(&o_shared);
                    let o_cloned_e = Arc::clone(&o_shared);
                    let o_cloned_c = Arc::clone(&o_shared);

                    let mut inner_observable = (project.lock().unwrap())(v);

                    let inner_subscriber = Subscriber::new(
                        move |k| {
                            o_shared.lock().unwrap().next(k);
                        },
                        move |observable_error| {
                            o_cloned_e.lock().unwrap().error(observable_error);
                        },
                        move || {
                            o_cloned_c.lock().unwrap().complete();
                        },
                    );

                    if let Some(subscription) = current_subscription.take() {
                        if let Err(e) = subscription.unsubscribe() {
                            log::warn!("inner teardown failed in switch_map: {}", e);
                        }
                    }

                    let s = inner_observable.subscribe(inner_subscriber);
                    current_subscription = Some(s);
                },
                move |observable_error| {
                    o_cloned_e.lock().unwrap().error(observable_error);
                },
                move || {
                    o_cloned_c.lock().unwrap().complete();
                },
            );
            self.subscribe(u)
        })
    }

    /// Combines this observable with another, emitting paired tuples in
    /// lockstep.
    ///
    /// A pair is emitted only once both inputs have an unconsumed value;
    /// the output completes as soon as one completed input has no buffered
    /// values left, even if the other input could still emit.
    fn zip<U, S2>(self, other: S2) -> Observable<(T, U)>
    where
        Self: Sized + Send + Sync + 'static,
        S2: Subscribeable<ObsType = U> + Send + Sync + 'static,
        T: Send + 'static,
        U: Send + 'static,
    {
        zip::zip(self, other)
    }

    /// Collects items into non-overlapping `Vec`s of `buffer_size` items,
    /// emitting each buffer when full and flushing a partial buffer on
    /// completion.
    fn buffer_count(self, buffer_size: usize) -> Observable<Vec<T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + 'static,
    {
        buffer::buffer_count(self, buffer_size, buffer_size)
    }

    /// Collects items into `Vec`s of `buffer_size` items, starting a new
    /// buffer every `start_every` items; buffers overlap when `start_every`
    /// is smaller than `buffer_size`.
    fn buffer_count_every(self, buffer_size: usize, start_every: usize) -> Observable<Vec<T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + 'static,
    {
        buffer::buffer_count(self, buffer_size, start_every)
    }

    /// Opens a new buffer on every `openings` emission and closes it when
    /// the observable produced by `closing_selector` for that opening fires,
    /// emitting the buffered items as a `Vec`.
    fn buffer_toggle<O, C, F>(
        self,
        openings: Observable<O>,
        closing_selector: F,
    ) -> Observable<Vec<T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + 'static,
        O: Send + 'static,
        C: Send + 'static,
        F: (FnMut(O) -> Observable<C>) + Sync + Send + 'static,
    {
        buffer::buffer_toggle(self, openings, closing_selector)
    }

    /// Keeps a single open buffer, flushing and re-arming it whenever the
    /// observable produced by `closing_selector` emits or completes.
    fn buffer_when<C, F>(self, closing_selector: F) -> Observable<Vec<T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Send + 'static,
        C: Send + 'static,
        F: (FnMut() -> Observable<C>) + Sync + Send + 'static,
    {
        buffer::buffer_when(self, closing_selector)
    }

    /// Branches the source into non-overlapping windows of `window_size`
    /// items, emitting each window as a nested observable.
    fn window_count(self, window_size: usize) -> Observable<Observable<T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        window::window_count(self, window_size, window_size)
    }

    /// Branches the source into windows of `window_size` items, opening a
    /// new window every `start_every` items; windows overlap when
    /// `start_every` is smaller than `window_size`.
    fn window_count_every(
        self,
        window_size: usize,
        start_every: usize,
    ) -> Observable<Observable<T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        window::window_count(self, window_size, start_every)
    }

    /// Opens a new window on every `openings` emission and closes it when
    /// the observable produced by `closing_selector` for that opening fires.
    fn window_toggle<O, C, F>(
        self,
        openings: Observable<O>,
        closing_selector: F,
    ) -> Observable<Observable<T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        O: Send + 'static,
        C: Send + 'static,
        F: (FnMut(O) -> Observable<C>) + Sync + Send + 'static,
    {
        window::window_toggle(self, openings, closing_selector)
    }

    /// Keeps a single open window, closing and re-opening it whenever the
    /// observable produced by `closing_selector` emits or completes.
    fn window_when<C, F>(self, closing_selector: F) -> Observable<Observable<T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        C: Send + 'static,
        F: (FnMut() -> Observable<C>) + Sync + Send + 'static,
    {
        window::window_when(self, closing_selector)
    }

    /// Groups the items emitted by the source by the key returned from
    /// `key_selector`, emitting one [`GroupedObservable`] per distinct key.
    fn group_by<K, F>(self, key_selector: F) -> Observable<GroupedObservable<K, T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
        F: (FnMut(&T) -> K) + Sync + Send + 'static,
    {
        group_by::group_by(self, key_selector)
    }

    /// Like [`group_by`](ObservableExt::group_by), but closes a group when
    /// the observable produced by `duration_selector` for its key emits or
    /// completes; a later value under the same key opens a fresh group.
    fn group_by_until<K, D, F, G>(
        self,
        key_selector: F,
        duration_selector: G,
    ) -> Observable<GroupedObservable<K, T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
        D: Send + 'static,
        F: (FnMut(&T) -> K) + Sync + Send + 'static,
        G: (FnMut(&K) -> Observable<D>) + Sync + Send + 'static,
    {
        group_by::group_by_until(self, key_selector, duration_selector)
    }

    /// Resubscribes to the source when the notifier says so after an error.
    ///
    /// Source errors are fed into the observable handed to `notifier`; every
    /// notifier emission triggers one resubscription to the source, and a
    /// notifier terminal signal (complete or error) is propagated downstream
    /// instead of retrying.
    fn retry_when<N, F>(self, notifier: F) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Send + 'static,
        N: Send + 'static,
        F: (FnMut(Observable<Arc<dyn Error + Send + Sync>>) -> Observable<N>)
            + Send
            + Sync
            + 'static,
    {
        retry::retry_when(self, notifier)
    }

    /// Resubscribes to the source when the notifier says so after a
    /// completion.
    ///
    /// Source completions are fed into the observable handed to `notifier`;
    /// every notifier emission triggers one resubscription, and a notifier
    /// terminal signal is propagated downstream instead of repeating.
    fn repeat_when<N, F>(self, notifier: F) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Send + 'static,
        N: Send + 'static,
        F: (FnMut(Observable<()>) -> Observable<N>) + Send + Sync + 'static,
    {
        retry::repeat_when(self, notifier)
    }

    /// Wraps the source in a [`Connectable`] backed by a plain `Subject`:
    /// subscribers register up front and share one producer run, started by
    /// `connect()`.
    fn connectable(
        self,
    ) -> Connectable<T, crate::subjects::SubjectEmitter<T>, crate::subjects::SubjectReceiver<T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        connectable::connectable(self)
    }

    /// Alias for [`connectable`](ObservableExt::connectable), mirroring the
    /// multicast family naming.
    fn publish(
        self,
    ) -> Connectable<T, crate::subjects::SubjectEmitter<T>, crate::subjects::SubjectReceiver<T>>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        connectable::connectable(self)
    }

    /// Wraps the source in a [`Connectable`] backed by an `AsyncSubject`,
    /// so every subscriber receives only the final value once the shared
    /// producer run completes.
    fn publish_last(
        self,
    ) -> Connectable<
        T,
        crate::subjects::AsyncSubjectEmitter<T>,
        crate::subjects::AsyncSubjectReceiver<T>,
    >
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        connectable::publish_last(self)
    }

    /// Shares one producer run among all concurrent subscribers: the first
    /// subscription connects the source and the last unsubscription tears
    /// the shared connection down.
    fn share(self) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        connectable::connectable(self).ref_count()
    }

    /// Multicasts the source through a per-subscription subject.
    ///
    /// For every downstream subscription, `subject_factory` produces a fresh
    /// emitter/shared-observable pair, `selector` builds the result stream
    /// from the shared side, and the source is subscribed into the emitter:
    /// one multicast lifetime per subscription instead of a single shared
    /// connection.
    fn multicast<R, SF, SEL>(self, subject_factory: SF, selector: SEL) -> Observable<R>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        R: 'static,
        SF: (FnMut() -> (Subscriber<T>, Observable<T>)) + Send + Sync + 'static,
        SEL: (FnMut(Observable<T>) -> Observable<R>) + Send + Sync + 'static,
    {
        connectable::multicast(self, subject_factory, selector)
    }
}

impl<T: 'static> Subscribeable for Observable<T> {
    type ObsType = T;

    fn subscribe(&mut self, v: Subscriber<Self::ObsType>) -> Subscription {
        (self.subscribe_fn)(v)
    }
}

impl<O, T: 'static> ObservableExt<T> for O where O: Subscribeable<ObsType = T> {}

#[cfg(test)]
mod tests;
