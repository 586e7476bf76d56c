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

/// A specialized `Subject` variant that requires an initial value and emits
/// its latest value to each new subscriber at subscription time.
///
/// While active it behaves like a plain `Subject`, except that every new
/// subscriber immediately receives the most recent value before taking part
/// in subsequent fan-outs. Terminal behavior matches `Subject`: stopped
/// subjects replay their terminal signal to late subscribers without
/// registering them, closed subjects reject emissions and subscriptions.
pub struct BehaviorSubject<T> {
    value: T,
    observers: Vec<(u64, Arc<Mutex<Subscriber<T>>>)>,
    completed: bool,
    closed: bool,
    error: Option<Arc<dyn Error + Send + Sync>>,
}

impl<T: Send + Sync + 'static> BehaviorSubject<T> {
    /// Initializes a `BehaviorSubject` with the given starting value and
    /// returns its emitter/receiver pair.
    pub fn emitter_receiver(value: T) -> (BehaviorSubjectEmitter<T>, BehaviorSubjectReceiver<T>) {
        let s = Arc::new(Mutex::new(BehaviorSubject {
            value,
            observers: Vec::with_capacity(16),
            completed: false,
            closed: false,
            error: None,
        }));

        (
            BehaviorSubjectEmitter(Arc::clone(&s)),
            BehaviorSubjectReceiver(Arc::clone(&s)),
        )
    }
}

/// Subscription handler for `BehaviorSubject`.
#[derive(Clone)]
pub struct BehaviorSubjectReceiver<T>(Arc<Mutex<BehaviorSubject<T>>>);

/// Multicasting emitter for `BehaviorSubject`.
#[derive(Clone)]
pub struct BehaviorSubjectEmitter<T>(Arc<Mutex<BehaviorSubject<T>>>);

impl<T> BehaviorSubjectReceiver<T> {
    /// Returns the number of registered observers.
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().observers.len()
    }

    /// Returns `true` if no observers are registered, `false` otherwise.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync + 'static> Subscribeable for BehaviorSubjectReceiver<T> {
    type ObsType = T;

    fn subscribe(&mut self, mut v: Subscriber<Self::ObsType>) -> Subscription {
        let key: u64 = super::gen_key().next().unwrap_or(super::random_seed());

        if let Ok(mut src) = self.0.lock() {
            if src.closed {
                log::warn!("subscribe on an unsubscribed subject rejected");
                return Subscription::closed();
            }
            if src.completed {
                if let Some(err) = &src.error {
                    v.error(Arc::clone(err));
                } else {
                    v.complete();
                }
                return Subscription::closed();
            }
            // New subscribers receive the current value right away.
            v.next(src.value.clone());
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

impl<T> Unsubscribeable for BehaviorSubjectReceiver<T> {
    fn unsubscribe(self) -> Result<(), UnsubscriptionError> {
        if let Ok(mut r) = self.0.lock() {
            r.closed = true;
            r.observers.clear();
        }
        Ok(())
    }
}

impl<T: Clone> BehaviorSubjectEmitter<T> {
    /// Stores `v` as the latest value and emits it to every currently
    /// registered observer, over a snapshot of the observer set.
    ///
    /// # Errors
    ///
    /// Returns [`UnsubscribedError`] if the subject has been unsubscribed.
    pub fn try_next(&mut self, v: T) -> Result<(), UnsubscribedError> {
        let snapshot: Vec<_> = {
            let mut src = self.0.lock().unwrap();
            if src.closed {
                return Err(UnsubscribedError);
            }
            if src.completed {
                return Ok(());
            }
            src.value = v.clone();
            src.observers.iter().map(|(_, o)| Arc::clone(o)).collect()
        };
        for o in snapshot {
            o.lock().unwrap().next(v.clone());
        }
        Ok(())
    }

    /// Stops the subject with an error, delivering it to every registered
    /// observer and to any future subscriber.
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
    /// future subscriber.
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

impl<T: Clone> Observer for BehaviorSubjectEmitter<T> {
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

impl<T: Clone + Send + 'static> From<BehaviorSubjectEmitter<T>> for Subscriber<T> {
    fn from(mut value: BehaviorSubjectEmitter<T>) -> Self {
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

impl<T: Clone + Send + Sync + 'static> From<BehaviorSubjectReceiver<T>> for Observable<T> {
    fn from(mut value: BehaviorSubjectReceiver<T>) -> Self {
        Observable::new(move |subscriber| value.subscribe(subscriber))
    }
}
