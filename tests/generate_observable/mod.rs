use std::sync::{Arc, Mutex};

use brook::subscribe::{Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic};
use brook::{Observable, Observer};

use tokio::sync::mpsc::channel;
use tokio::task;
use tokio::time::{sleep, Duration};

/// Emits `0..=end` from a Tokio task with an await point after each value,
/// so unsubscribe signals can interleave with the emissions. The
/// `last_emit_assert` closure runs in the producer task with the last value
/// that was actually emitted.
pub fn generate_u32_observable(
    end: u32,
    last_emit_assert: impl FnMut(u32) + Send + Sync + 'static,
) -> Observable<u32> {
    let last_emit_assert = Arc::new(Mutex::new(last_emit_assert));

    Observable::new(move |mut o: Subscriber<_>| {
        let done = Arc::new(Mutex::new(false));
        let done_c = Arc::clone(&done);
        let (tx, mut rx) = channel(10);

        task::spawn(async move {
            while let Some(signal) = rx.recv().await {
                *done_c.lock().unwrap() = signal;
            }
        });

        let last_emit_assert = Arc::clone(&last_emit_assert);
        let jh = task::spawn(async move {
            let mut last_emit = 0;

            for i in 0..=end {
                if *done.lock().unwrap() {
                    break;
                }
                last_emit = i;
                o.next(i);
                // Await point after each emit; without it the producer could
                // not be stopped between values.
                sleep(Duration::from_millis(1)).await;
            }
            (last_emit_assert.lock().unwrap())(last_emit);
            o.complete();
        });

        Subscription::new(
            UnsubscribeLogic::Future(Box::pin(async move {
                let _ = tx.send(true).await;
            })),
            SubscriptionHandle::JoinTask(jh),
        )
    })
}
