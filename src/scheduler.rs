//! Injectable scheduling for time-based sources.
//!
//! The stream core itself imposes no scheduling: `next`/`error`/`complete`
//! are plain synchronous calls, and producers decide where they run. A
//! [`Scheduler`] packages that decision so time-based sources can be written
//! once and executed on either a Tokio task or an OS thread. Scheduled work
//! is cancelled through the returned `Subscription`, like any other
//! producer.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::observer::Observer;
use crate::subscription::subscribe::{
    Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic,
};
use crate::Observable;

/// A strategy for running a piece of work, optionally delayed.
pub trait Scheduler: Send + Sync {
    /// The scheduler's notion of the current time.
    fn now(&self) -> Instant;

    /// Runs `work` after `delay` (or as soon as possible when `None`).
    ///
    /// The returned `Subscription` cancels work that has not started yet and
    /// carries the join handle of the running task or thread.
    fn schedule(
        &self,
        delay: Option<Duration>,
        work: Box<dyn FnOnce() + Send>,
    ) -> Subscription;
}

/// Schedules work on a Tokio task.
pub struct TaskScheduler;

impl Scheduler for TaskScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(
        &self,
        delay: Option<Duration>,
        work: Box<dyn FnOnce() + Send>,
    ) -> Subscription {
        let cancelled = Arc::new(Mutex::new(false));
        let cancelled_c = Arc::clone(&cancelled);
        let handle = tokio::task::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if !*cancelled_c.lock().unwrap() {
                work();
            }
        });
        Subscription::new(
            UnsubscribeLogic::Logic(Box::new(move || {
                *cancelled.lock().unwrap() = true;
                Ok(())
            })),
            SubscriptionHandle::JoinTask(handle),
        )
    }
}

/// Schedules work on a dedicated OS thread.
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(
        &self,
        delay: Option<Duration>,
        work: Box<dyn FnOnce() + Send>,
    ) -> Subscription {
        let cancelled = Arc::new(Mutex::new(false));
        let cancelled_c = Arc::clone(&cancelled);
        let handle = std::thread::spawn(move || {
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
            if !*cancelled_c.lock().unwrap() {
                work();
            }
        });
        Subscription::new(
            UnsubscribeLogic::Logic(Box::new(move || {
                *cancelled.lock().unwrap() = true;
                Ok(())
            })),
            SubscriptionHandle::JoinThread(handle),
        )
    }
}

/// Emits `()` once after `delay` on the given scheduler, then completes.
pub fn timer(delay: Duration, scheduler: Arc<dyn Scheduler>) -> Observable<()> {
    Observable::new(move |o: Subscriber<()>| {
        let mut o = o;
        scheduler.schedule(
            Some(delay),
            Box::new(move || {
                o.next(());
                o.complete();
            }),
        )
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::subscribe::{Subscriber, Unsubscribeable};
    use crate::Subscribeable;

    #[tokio::test]
    async fn timer_emits_once_then_completes() {
        let nexts = Arc::new(AtomicUsize::new(0));
        let nexts_c = Arc::clone(&nexts);
        let completes = Arc::new(AtomicUsize::new(0));
        let completes_c = Arc::clone(&completes);

        let mut t = timer(Duration::from_millis(10), Arc::new(TaskScheduler));
        let s = t.subscribe(Subscriber::new(
            move |_| {
                nexts_c.fetch_add(1, Ordering::SeqCst);
            },
            |_| {},
            move || {
                completes_c.fetch_add(1, Ordering::SeqCst);
            },
        ));

        assert!(s.join_concurrent().await.is_ok());

        assert_eq!(nexts.load(Ordering::SeqCst), 1);
        assert_eq!(completes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_work_never_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_c = Arc::clone(&runs);

        let s = ThreadScheduler.schedule(
            Some(Duration::from_millis(50)),
            Box::new(move || {
                runs_c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        s.clone().unsubscribe().unwrap();
        assert!(s.join().is_ok());

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
