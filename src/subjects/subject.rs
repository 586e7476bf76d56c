use std::{
    error::Error,
    sync::{Arc, Mutex},
};

use crate::{
    errors::{UnsubscribedError, UnsubscriptionError},
    observer::Observer,
    subscription::subscribe::{
        Subscribeable, Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic,
        Unsubscribeable,
    },
    Observable,
};

/// A `Subject` represents a unique variant of an `Observable` that enables
/// multicasting values to multiple observers.
///
/// Unlike regular observables, which are unicast (each subscribed observer
/// owns an independent execution of the producer), subjects are multicast:
/// one emission reaches every registered subscriber.
///
/// A subject moves through three stages. While *active* it registers
/// subscribers and fans values out to them. Once terminated by `error` or
/// `complete` it is *stopped*: the observer set is dropped and any late
/// subscriber immediately receives the stored terminal signal instead of
/// being registered. After `unsubscribe` it is *closed*: emissions and
/// subscriptions are rejected, which the fallible `try_next`/`try_error`/
/// `try_complete` methods surface as [`UnsubscribedError`].
///
/// Fan-out order is subscription order, over a snapshot taken when the
/// emission starts: a handler that synchronously unsubscribes another
/// subscriber does not stop that subscriber from seeing the in-flight value.
///
/// # Example
///
///```no_run
/// use brook::{subjects::Subject, subscribe::Subscriber};
/// use brook::{Observer, Subscribeable};
///
/// pub fn create_subscriber(subscriber_id: i32) -> Subscriber<i32> {
///     Subscriber::new(
///         move |v| println!("Subscriber #{} emitted: {}", subscriber_id, v),
///         |_| eprintln!("Error"),
///         move || println!("Completed {}", subscriber_id),
///     )
/// }
///
/// // Initialize a `Subject` and obtain its emitter and receiver.
/// let (mut emitter, mut receiver) = Subject::emitter_receiver();
///
/// // Registers `Subscriber` 1.
/// receiver.subscribe(create_subscriber(1));
///
/// emitter.next(101); // Emits 101 to registered `Subscriber` 1.
///
/// // Registers `Subscriber` 2.
/// receiver.subscribe(create_subscriber(2));
///
/// emitter.next(102); // Emits 102 to registered `Subscriber`'s 1 and 2.
///
/// emitter.complete(); // Calls `complete` on registered `Subscriber`'s 1 and 2.
///
/// // Subscriber 3: post-completion subscribe, completes immediately.
/// receiver.subscribe(create_subscriber(3));
///
/// emitter.next(103); // Called post-completion, does not emit.
///```
pub struct Subject<T> {
    observers: Vec<(u64, Arc<Mutex<Subscriber<T>>>)>,
    completed: bool,
    closed: bool,
    error: Option<Arc<dyn Error + Send + Sync>>,
}

impl<T: 'static> Subject<T> {
    /// Creates a new pair of `SubjectEmitter` for emitting values and
    /// `SubjectReceiver` for subscribing to values.
    pub fn emitter_receiver() -> (SubjectEmitter<T>, SubjectReceiver<T>) {
        let s = Arc::new(Mutex::new(Subject {
            observers: Vec::with_capacity(16),
            completed: false,
            closed: false,
            error: None,
        }));

        (
            SubjectEmitter(Arc::clone(&s)),
            SubjectReceiver(Arc::clone(&s)),
        )
    }
}

/// Subscription handler for `Subject`.
///
/// `SubjectReceiver` acts as an `Observable`, allowing you to utilize its
/// `subscribe` method for receiving emissions from the `Subject`'s
/// multicasting. You can also employ its `unsubscribe` method to close the
/// `Subject` and remove registered observers.
pub struct SubjectReceiver<T>(Arc<Mutex<Subject<T>>>);

impl<T> Clone for SubjectReceiver<T> {
    fn clone(&self) -> Self {
        SubjectReceiver(Arc::clone(&self.0))
    }
}

/// Multicasting emitter for `Subject`.
///
/// `SubjectEmitter` acts as an `Observer`, allowing you to utilize its
/// `next`, `error`, and `complete` methods for multicasting emissions to all
/// registered observers within the `Subject`.
#[derive(Clone)]
pub struct SubjectEmitter<T>(Arc<Mutex<Subject<T>>>);

impl<T> SubjectReceiver<T> {
    /// Returns the number of registered observers.
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().observers.len()
    }

    /// Returns `true` if no observers are registered, `false` otherwise.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Subscribeable for SubjectReceiver<T> {
    type ObsType = T;

    fn subscribe(&mut self, mut v: Subscriber<Self::ObsType>) -> Subscription {
        let key: u64 = super::gen_key().next().unwrap_or(super::random_seed());

        if let Ok(mut src) = self.0.lock() {
            // An unsubscribed Subject neither emits nor registers.
            if src.closed {
                log::warn!("subscribe on an unsubscribed subject rejected");
                return Subscription::closed();
            }
            // A stopped Subject does not register new subscribers; it replays
            // the stored terminal signal instead.
            if src.completed {
                if let Some(err) = &src.error {
                    v.error(Arc::clone(err));
                } else {
                    v.complete();
                }
                return Subscription::closed();
            }
            src.observers.push((key, Arc::new(Mutex::new(v))));
        } else {
            return Subscription::closed();
        };

        let source_cloned = Arc::clone(&self.0);

        Subscription::new(
            UnsubscribeLogic::Logic(Box::new(move || {
                source_cloned
                    .lock()
                    .unwrap()
                    .observers
                    .retain(move |v| v.0 != key);
                Ok(())
            })),
            SubscriptionHandle::Nil,
        )
    }
}

impl<T> Unsubscribeable for SubjectReceiver<T> {
    fn unsubscribe(self) -> Result<(), UnsubscriptionError> {
        if let Ok(mut r) = self.0.lock() {
            r.closed = true;
            r.observers.clear();
        }
        Ok(())
    }
}

impl<T: Clone> SubjectEmitter<T> {
    /// Emits a value to every currently registered observer.
    ///
    /// The observer set is snapshotted before the fan-out starts, so handlers
    /// that subscribe or unsubscribe while the emission is being delivered do
    /// not affect this pass. Emitting on a stopped subject is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`UnsubscribedError`] if the subject has been unsubscribed.
    pub fn try_next(&mut self, v: T) -> Result<(), UnsubscribedError> {
        let snapshot: Vec<_> = {
            let src = self.0.lock().unwrap();
            if src.closed {
                return Err(UnsubscribedError);
            }
            if src.completed {
                return Ok(());
            }
            src.observers.iter().map(|(_, o)| Arc::clone(o)).collect()
        };
        for o in snapshot {
            o.lock().unwrap().next(v.clone());
        }
        Ok(())
    }

    /// Stops the subject with an error, delivering it to every registered
    /// observer and to any future subscriber. The observer set is cleared;
    /// already stopped subjects ignore the call.
    ///
    /// # Errors
    ///
    /// Returns [`UnsubscribedError`] if the subject has been unsubscribed.
    pub fn try_error(
        &mut self,
        e: Arc<dyn Error + Send + Sync>,
    ) -> Result<(), UnsubscribedError> {
        let snapshot = {
            let mut src = self.0.lock().unwrap();
            if src.closed {
                return Err(UnsubscribedError);
            }
            if src.completed {
                return Ok(());
            }
            src.completed = true;
            src.error = Some(Arc::clone(&e));
            std::mem::take(&mut src.observers)
        };
        for (_, o) in snapshot {
            o.lock().unwrap().error(Arc::clone(&e));
        }
        Ok(())
    }

    /// Completes the subject, notifying every registered observer and any
    /// future subscriber. The observer set is cleared; already stopped
    /// subjects ignore the call.
    ///
    /// # Errors
    ///
    /// Returns [`UnsubscribedError`] if the subject has been unsubscribed.
    pub fn try_complete(&mut self) -> Result<(), UnsubscribedError> {
        let snapshot = {
            let mut src = self.0.lock().unwrap();
            if src.closed {
                return Err(UnsubscribedError);
            }
            if src.completed {
                return Ok(());
            }
            src.completed = true;
            std::mem::take(&mut src.observers)
        };
        for (_, o) in snapshot {
            o.lock().unwrap().complete();
        }
        Ok(())
    }
}

impl<T: Clone> Observer for SubjectEmitter<T> {
    type NextFnType = T;

    fn next(&mut self, v: Self::NextFnType) {
        if let Err(e) = self.try_next(v) {
            log::warn!("emission rejected: {}", e);
        }
    }

    fn error(&mut self, e: Arc<dyn Error + Send + Sync>) {
        if let Err(e) = self.try_error(e) {
            log::warn!("error notification rejected: {}", e);
        }
    }

    fn complete(&mut self) {
        if let Err(e) = self.try_complete() {
            log::warn!("completion rejected: {}", e);
        }
    }
}

impl<T: Clone + 'static> From<SubjectEmitter<T>> for Subscriber<T> {
    fn from(mut value: SubjectEmitter<T>) -> Self {
        let mut vn = value.clone();
        let mut ve = value.clone();
        Subscriber::new(
            move |v| {
                vn.next(v);
            },
            move |e| ve.error(e),
            move || value.complete(),
        )
    }
}

impl<T: Clone + Send + Sync + 'static> From<SubjectReceiver<T>> for Observable<T> {
    fn from(mut value: SubjectReceiver<T>) -> Self {
        Observable::new(move |subscriber| value.subscribe(subscriber))
    }
}

#[cfg(test)]
mod test {
    use std::{
        error::Error,
        sync::{Arc, Mutex},
    };

    use crate::{observer::Observer, subscribe::Subscriber, Subject, Subscribeable};

    fn subject_value_registers() -> (
        Vec<impl FnOnce() -> Subscriber<usize>>,
        Arc<Mutex<Vec<usize>>>,
        Arc<Mutex<Vec<usize>>>,
        Arc<Mutex<Vec<usize>>>,
    ) {
        let nexts: Vec<usize> = Vec::with_capacity(5);
        let nexts = Arc::new(Mutex::new(nexts));
        let nexts_c = Arc::clone(&nexts);

        let completes: Vec<usize> = Vec::with_capacity(5);
        let completes = Arc::new(Mutex::new(completes));
        let completes_c = Arc::clone(&completes);

        let errors: Vec<usize> = Vec::with_capacity(5);
        let errors = Arc::new(Mutex::new(errors));
        let errors_c = Arc::clone(&errors);

        let make_subscriber = vec![
            move || {
                Subscriber::new(
                    move |n| {
                        // Track next() calls.
                        nexts_c.lock().unwrap().push(n);
                    },
                    move |_| {
                        // Track error() calls.
                        errors_c.lock().unwrap().push(1);
                    },
                    move || {
                        // Track complete() calls.
                        completes_c.lock().unwrap().push(1);
                    },
                )
            };
            10
        ];
        (make_subscriber, nexts, completes, errors)
    }

    #[test]
    fn subject_emit_then_complete() {
        let (mut make_subscriber, nexts, completes, errors) = subject_value_registers();

        let x = make_subscriber.pop().unwrap()();
        let (mut stx, mut srx) = Subject::emitter_receiver();

        // Emit but no registered subscribers yet.
        stx.next(1);

        assert_eq!(srx.len(), 0);
        assert_eq!(nexts.lock().unwrap().len(), 0);

        // Register subscriber.
        srx.subscribe(x);

        assert_eq!(srx.len(), 1);
        assert_eq!(nexts.lock().unwrap().len(), 0);

        // Emit three times to one registered subscriber.
        stx.next(2);
        stx.next(3);
        stx.next(4);

        assert_eq!(srx.len(), 1);
        assert_eq!(nexts.lock().unwrap().len(), 3);

        // Register two more subscribers.
        let y = make_subscriber.pop().unwrap()();
        let z = make_subscriber.pop().unwrap()();
        srx.subscribe(y);
        srx.subscribe(z);

        // Emit twice on 3 registered subscribers.
        stx.next(5);
        stx.next(6);

        assert_eq!(srx.len(), 3);
        assert_eq!(nexts.lock().unwrap().len(), 9);
        assert_eq!(completes.lock().unwrap().len(), 0);

        stx.complete();

        assert_eq!(srx.len(), 0);
        assert_eq!(nexts.lock().unwrap().len(), 9);
        assert_eq!(completes.lock().unwrap().len(), 3);

        // Register another subscriber and emit after completion.
        let w = make_subscriber.pop().unwrap()();
        srx.subscribe(w);
        stx.next(7);

        assert_eq!(srx.len(), 0);
        assert_eq!(nexts.lock().unwrap().len(), 9);
        assert_eq!(completes.lock().unwrap().len(), 4);
        assert_eq!(errors.lock().unwrap().len(), 0);
    }

    #[test]
    fn subject_emit_then_error() {
        let (mut make_subscriber, nexts, completes, errors) = subject_value_registers();

        let x = make_subscriber.pop().unwrap()();
        let y = make_subscriber.pop().unwrap()();
        let z = make_subscriber.pop().unwrap()();

        let (mut stx, mut srx) = Subject::emitter_receiver();

        srx.subscribe(x);
        srx.subscribe(y);
        srx.subscribe(z);

        stx.next(1);
        stx.next(2);
        stx.next(3);

        assert_eq!(srx.len(), 3);
        assert_eq!(nexts.lock().unwrap().len(), 9);

        #[derive(Debug)]
        struct MyErr;

        impl std::fmt::Display for MyErr {
            fn fmt(&self, _: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                Ok(())
            }
        }

        impl Error for MyErr {}

        stx.error(Arc::new(MyErr));

        assert_eq!(srx.len(), 0);
        assert_eq!(nexts.lock().unwrap().len(), 9);
        assert_eq!(completes.lock().unwrap().len(), 0);
        assert_eq!(errors.lock().unwrap().len(), 3);

        // Register another subscriber and emit after the error.
        let w = make_subscriber.pop().unwrap()();
        srx.subscribe(w);
        stx.next(4);

        assert_eq!(srx.len(), 0);
        assert_eq!(nexts.lock().unwrap().len(), 9);
        assert_eq!(completes.lock().unwrap().len(), 0);
        assert_eq!(errors.lock().unwrap().len(), 4);
    }

    #[test]
    fn fan_out_delivers_to_snapshot() {
        use crate::subscribe::Unsubscribeable;

        let o2_seen = Arc::new(Mutex::new(Vec::new()));
        let o2_seen_c = Arc::clone(&o2_seen);

        let (mut stx, mut srx) = Subject::emitter_receiver();

        // O1 unsubscribes O2 from inside its own next handler.
        let sub2_slot: Arc<Mutex<Option<crate::subscribe::Subscription>>> =
            Arc::new(Mutex::new(None));
        let sub2_slot_c = Arc::clone(&sub2_slot);

        srx.subscribe(Subscriber::on_next(move |_: i32| {
            if let Some(s) = sub2_slot_c.lock().unwrap().take() {
                s.unsubscribe().unwrap();
            }
        }));

        let sub2 = srx.subscribe(Subscriber::on_next(move |v: i32| {
            o2_seen_c.lock().unwrap().push(v);
        }));
        *sub2_slot.lock().unwrap() = Some(sub2);

        // O2 was unsubscribed mid fan-out but still receives the in-flight
        // value from the snapshot.
        stx.next(1);
        assert_eq!(*o2_seen.lock().unwrap(), vec![1]);

        // The following emission no longer reaches O2.
        stx.next(2);
        assert_eq!(*o2_seen.lock().unwrap(), vec![1]);
        assert_eq!(srx.len(), 1);
    }

    #[test]
    fn closed_subject_rejects_emissions() {
        use crate::subscribe::Unsubscribeable;

        let (mut stx, srx) = Subject::emitter_receiver();
        srx.unsubscribe().unwrap();

        assert!(stx.try_next(1).is_err());
        assert!(stx.try_complete().is_err());
    }
}
