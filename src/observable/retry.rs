use std::{
    error::Error,
    sync::{Arc, Mutex},
};

use crate::observer::Observer;
use crate::subjects::Subject;
use crate::subscription::subscribe::{
    Subscribeable, Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic,
    Unsubscribeable,
};

use super::Observable;

struct Flags {
    busy: bool,
    pending: bool,
    done: bool,
}

/// One (re)subscription attempt against the source.
///
/// Synchronous sources can fail while `subscribe` is still on the stack,
/// which makes the notifier request another attempt re-entrantly; the
/// busy/pending pair turns that recursion into another round of the loop
/// instead.
fn resubscribe<S, T>(
    source: &Arc<Mutex<S>>,
    current: &Arc<Mutex<Option<Subscription>>>,
    flags: &Arc<Mutex<Flags>>,
    make_subscriber: &Arc<dyn Fn() -> Subscriber<T> + Send + Sync>,
) where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: 'static,
{
    {
        let mut f = flags.lock().unwrap();
        if f.done {
            return;
        }
        if f.busy {
            f.pending = true;
            return;
        }
        f.busy = true;
    }
    loop {
        flags.lock().unwrap().pending = false;
        let sub = source.lock().unwrap().subscribe((make_subscriber)());
        if flags.lock().unwrap().done {
            // A terminal signal arrived while the attempt was running; the
            // fresh subscription is of no further use.
            if let Err(e) = sub.unsubscribe() {
                log::warn!("source teardown failed after terminal signal: {}", e);
            }
            break;
        }
        let old = current.lock().unwrap().replace(sub);
        if let Some(old) = old {
            if let Err(e) = old.unsubscribe() {
                log::warn!("stale source teardown failed: {}", e);
            }
        }
        if !flags.lock().unwrap().pending {
            break;
        }
    }
    flags.lock().unwrap().busy = false;
}

pub(super) fn retry_when<S, T, N, F>(source: S, notifier: F) -> Observable<T>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Send + 'static,
    N: Send + 'static,
    F: (FnMut(Observable<Arc<dyn Error + Send + Sync>>) -> Observable<N>)
        + Send
        + Sync
        + 'static,
{
    let source = Arc::new(Mutex::new(source));
    let notifier = Arc::new(Mutex::new(notifier));

    Observable::new(move |o: Subscriber<T>| {
        let o_shared = Arc::new(Mutex::new(o));
        let flags = Arc::new(Mutex::new(Flags {
            busy: false,
            pending: false,
            done: false,
        }));
        let current: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        // Source errors are pushed into this subject and surface in the
        // observable handed to the notifier.
        let (err_tx, err_rx) =
            Subject::<Arc<dyn Error + Send + Sync>>::emitter_receiver();

        let make_subscriber: Arc<dyn Fn() -> Subscriber<T> + Send + Sync> = {
            let o_shared = Arc::clone(&o_shared);
            let flags = Arc::clone(&flags);
            Arc::new(move || {
                let o_n = Arc::clone(&o_shared);
                let o_c = Arc::clone(&o_shared);
                let flags_c = Arc::clone(&flags);
                let mut err_tx = err_tx.clone();
                Subscriber::new(
                    move |v| o_n.lock().unwrap().next(v),
                    move |e| {
                        err_tx.next(e);
                    },
                    move || {
                        flags_c.lock().unwrap().done = true;
                        o_c.lock().unwrap().complete();
                    },
                )
            })
        };

        let mut notifications = (notifier.lock().unwrap())(err_rx.clone().into());

        let notifier_sub = {
            let o_e = Arc::clone(&o_shared);
            let o_c = Arc::clone(&o_shared);
            let source = Arc::clone(&source);
            let current = Arc::clone(&current);
            let flags_n = Arc::clone(&flags);
            let flags_e = Arc::clone(&flags);
            let flags_c = Arc::clone(&flags);
            let make_subscriber = Arc::clone(&make_subscriber);
            notifications.subscribe(Subscriber::new(
                move |_| resubscribe(&source, &current, &flags_n, &make_subscriber),
                move |e| {
                    flags_e.lock().unwrap().done = true;
                    o_e.lock().unwrap().error(e);
                },
                move || {
                    flags_c.lock().unwrap().done = true;
                    o_c.lock().unwrap().complete();
                },
            ))
        };

        resubscribe(&source, &current, &flags, &make_subscriber);

        let parent = Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);
        parent.add(notifier_sub);
        let flags_t = Arc::clone(&flags);
        let current_t = Arc::clone(&current);
        parent.add_teardown(UnsubscribeLogic::Logic(Box::new(move || {
            flags_t.lock().unwrap().done = true;
            if let Some(s) = current_t.lock().unwrap().take() {
                s.unsubscribe().map_err(|e| e.into_shared())?;
            }
            Ok(())
        })));
        parent
    })
}

pub(super) fn repeat_when<S, T, N, F>(source: S, notifier: F) -> Observable<T>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Send + 'static,
    N: Send + 'static,
    F: (FnMut(Observable<()>) -> Observable<N>) + Send + Sync + 'static,
{
    let source = Arc::new(Mutex::new(source));
    let notifier = Arc::new(Mutex::new(notifier));

    Observable::new(move |o: Subscriber<T>| {
        let o_shared = Arc::new(Mutex::new(o));
        let flags = Arc::new(Mutex::new(Flags {
            busy: false,
            pending: false,
            done: false,
        }));
        let current: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        // Source completions are pushed into this subject and surface in the
        // observable handed to the notifier.
        let (comp_tx, comp_rx) = Subject::<()>::emitter_receiver();

        let make_subscriber: Arc<dyn Fn() -> Subscriber<T> + Send + Sync> = {
            let o_shared = Arc::clone(&o_shared);
            let flags = Arc::clone(&flags);
            Arc::new(move || {
                let o_n = Arc::clone(&o_shared);
                let o_e = Arc::clone(&o_shared);
                let flags_e = Arc::clone(&flags);
                let mut comp_tx = comp_tx.clone();
                Subscriber::new(
                    move |v| o_n.lock().unwrap().next(v),
                    move |e| {
                        flags_e.lock().unwrap().done = true;
                        o_e.lock().unwrap().error(e);
                    },
                    move || {
                        comp_tx.next(());
                    },
                )
            })
        };

        let mut notifications = (notifier.lock().unwrap())(comp_rx.clone().into());

        let notifier_sub = {
            let o_e = Arc::clone(&o_shared);
            let o_c = Arc::clone(&o_shared);
            let source = Arc::clone(&source);
            let current = Arc::clone(&current);
            let flags_n = Arc::clone(&flags);
            let flags_e = Arc::clone(&flags);
            let flags_c = Arc::clone(&flags);
            let make_subscriber = Arc::clone(&make_subscriber);
            notifications.subscribe(Subscriber::new(
                move |_| resubscribe(&source, &current, &flags_n, &make_subscriber),
                move |e| {
                    flags_e.lock().unwrap().done = true;
                    o_e.lock().unwrap().error(e);
                },
                move || {
                    flags_c.lock().unwrap().done = true;
                    o_c.lock().unwrap().complete();
                },
            ))
        };

        resubscribe(&source, &current, &flags, &make_subscriber);

        let parent = Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);
        parent.add(notifier_sub);
        let flags_t = Arc::clone(&flags);
        let current_t = Arc::clone(&current);
        parent.add_teardown(UnsubscribeLogic::Logic(Box::new(move || {
            flags_t.lock().unwrap().done = true;
            if let Some(s) = current_t.lock().unwrap().take() {
                s.unsubscribe().map_err(|e| e.into_shared())?;
            }
            Ok(())
        })));
        parent
    })
}
