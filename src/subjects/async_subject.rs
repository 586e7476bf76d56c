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

/// A specialized `Subject` variant that emits its latest value to observers
/// upon completion.
///
/// `AsyncSubject` captures the last value pushed into it but broadcasts
/// nothing until it completes; at that point the stored value (if any) is
/// delivered to every registered observer followed by `complete`, and every
/// late subscriber receives the same replay.
///
/// If the subject terminates with an error instead, no value is emitted: the
/// error notification is delivered to every registered observer and replayed
/// to late subscribers.
pub struct AsyncSubject<T> {
    value: Option<T>,
    observers: Vec<(u64, Arc<Mutex<Subscriber<T>>>)>,
    completed: bool,
    closed: bool,
    error: Option<Arc<dyn Error + Send + Sync>>,
}

impl<T: Send + Sync + 'static> AsyncSubject<T> {
    /// Initializes an `AsyncSubject` and returns a tuple containing an
    /// `AsyncSubjectEmitter` for emitting values and an
    /// `AsyncSubjectReceiver` for subscribing to emitted values.
    pub fn emitter_receiver() -> (AsyncSubjectEmitter<T>, AsyncSubjectReceiver<T>) {
        let s = Arc::new(Mutex::new(AsyncSubject {
            value: None,
            observers: Vec::with_capacity(16),
            completed: false,
            closed: false,
            error: None,
        }));

        (
            AsyncSubjectEmitter(Arc::clone(&s)),
            AsyncSubjectReceiver(Arc::clone(&s)),
        )
    }
}

/// Subscription handler for `AsyncSubject`.
///
/// `AsyncSubjectReceiver` acts as an `Observable`, allowing you to utilize
/// its `subscribe` method for receiving the subject's final value. You can
/// also employ its `unsubscribe` method to close the `AsyncSubject` and
/// remove registered observers.
#[derive(Clone)]
pub struct AsyncSubjectReceiver<T>(Arc<Mutex<AsyncSubject<T>>>);

/// Multicasting emitter for `AsyncSubject`.
///
/// `AsyncSubjectEmitter` acts as an `Observer`, allowing you to utilize its
/// `next`, `error`, and `complete` methods. Values stored through `next`
/// stay buffered (only the latest is kept) until `complete` broadcasts the
/// final one.
#[derive(Clone)]
pub struct AsyncSubjectEmitter<T>(Arc<Mutex<AsyncSubject<T>>>);

impl<T> AsyncSubjectReceiver<T> {
    /// Returns the number of registered observers.
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().observers.len()
    }

    /// Returns `true` if no observers are registered, `false` otherwise.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync + 'static> Subscribeable for AsyncSubjectReceiver<T> {
    type ObsType = T;

    fn subscribe(&mut self, mut v: Subscriber<Self::ObsType>) -> Subscription {
        let key: u64 = super::gen_key().next().unwrap_or(super::random_seed());

        if let Ok(mut src) = self.0.lock() {
            if src.closed {
                log::warn!("subscribe on an unsubscribed subject rejected");
                return Subscription::closed();
            }
            // A stopped AsyncSubject replays its terminal signal, emitting
            // the stored final value first when it completed successfully.
            if src.completed {
                if let Some(err) = &src.error {
                    v.error(Arc::clone(err));
                } else {
                    if let Some(value) = &src.value {
                        v.next(value.clone());
                    }
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

impl<T> Unsubscribeable for AsyncSubjectReceiver<T> {
    fn unsubscribe(self) -> Result<(), UnsubscriptionError> {
        if let Ok(mut r) = self.0.lock() {
            r.closed = true;
            r.observers.clear();
        }
        Ok(())
    }
}

impl<T: Clone> AsyncSubjectEmitter<T> {
    /// Stores `v` as the latest value without emitting it.
    ///
    /// # Errors
    ///
    /// Returns [`UnsubscribedError`] if the subject has been unsubscribed.
    pub fn try_next(&mut self, v: T) -> Result<(), UnsubscribedError> {
        let mut src = self.0.lock().unwrap();
        if src.closed {
            return Err(UnsubscribedError);
        }
        if src.completed {
            return Ok(());
        }
        src.value = Some(v);
        Ok(())
    }

    /// Stops the subject with an error; the stored value is discarded and
    /// the error is delivered to every registered observer.
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

    /// Completes the subject, emitting the stored final value (if any) to
    /// every registered observer before the completion notification.
    ///
    /// # Errors
    ///
    /// Returns [`UnsubscribedError`] if the subject has been unsubscribed.
    pub fn try_complete(&mut self) -> Result<(), UnsubscribedError> {
        let (snapshot, value) = {
            let mut src = self.0.lock().unwrap();
            if src.closed {
                return Err(UnsubscribedError);
            }
            if src.completed {
                return Ok(());
            }
            src.completed = true;
            (std::mem::take(&mut src.observers), src.value.clone())
        };
        for (_, o) in snapshot {
            let mut o = o.lock().unwrap();
            if let Some(value) = &value {
                o.next(value.clone());
            }
            o.complete();
        }
        Ok(())
    }
}

impl<T: Clone> Observer for AsyncSubjectEmitter<T> {
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

impl<T: Clone + Send + 'static> From<AsyncSubjectEmitter<T>> for Subscriber<T> {
    fn from(mut value: AsyncSubjectEmitter<T>) -> Self {
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

impl<T: Clone + Send + Sync + 'static> From<AsyncSubjectReceiver<T>> for Observable<T> {
    fn from(mut value: AsyncSubjectReceiver<T>) -> Self {
        Observable::new(move |subscriber| value.subscribe(subscriber))
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use crate::{observer::Observer, subscribe::Subscriber, AsyncSubject, Subscribeable};

    #[test]
    fn async_subject_emits_latest_value_on_complete() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = Arc::clone(&seen);
        let completed = Arc::new(Mutex::new(0));
        let completed_c = Arc::clone(&completed);

        let (mut stx, mut srx) = AsyncSubject::emitter_receiver();

        srx.subscribe(Subscriber::new(
            move |v: i32| seen_c.lock().unwrap().push(v),
            |_| {},
            move || *completed_c.lock().unwrap() += 1,
        ));

        stx.next(101);
        stx.next(102);
        stx.next(103);

        // Nothing broadcast before completion.
        assert_eq!(seen.lock().unwrap().len(), 0);

        stx.complete();

        assert_eq!(*seen.lock().unwrap(), vec![103]);
        assert_eq!(*completed.lock().unwrap(), 1);

        // Late subscriber receives the replayed final value.
        let seen2 = Arc::new(Mutex::new(Vec::new()));
        let seen2_c = Arc::clone(&seen2);
        srx.subscribe(Subscriber::on_next(move |v: i32| {
            seen2_c.lock().unwrap().push(v)
        }));
        assert_eq!(*seen2.lock().unwrap(), vec![103]);
        assert_eq!(srx.len(), 0);
    }

    #[test]
    fn async_subject_without_values_completes_empty() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = Arc::clone(&seen);
        let completed = Arc::new(Mutex::new(0));
        let completed_c = Arc::clone(&completed);

        let (mut stx, mut srx) = AsyncSubject::<i32>::emitter_receiver();

        srx.subscribe(Subscriber::new(
            move |v: i32| seen_c.lock().unwrap().push(v),
            |_| {},
            move || *completed_c.lock().unwrap() += 1,
        ));

        stx.complete();

        assert_eq!(seen.lock().unwrap().len(), 0);
        assert_eq!(*completed.lock().unwrap(), 1);
    }
}
