use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use crate::observer::Observer;
use crate::subjects::{Subject, SubjectEmitter};
use crate::subscription::subscribe::{
    Subscribeable, Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic,
    Unsubscribeable,
};

use super::Observable;

/// Shared bookkeeping for the single-window/single-buffer re-arming
/// operators. `epoch` stamps each armed closing observable so notifications
/// from an already replaced closing are ignored.
pub(super) struct WhenState<W> {
    pub(super) current: Option<W>,
    pub(super) busy: bool,
    pub(super) reentered: bool,
    pub(super) done: bool,
    pub(super) epoch: u64,
}

impl<W> WhenState<W> {
    pub(super) fn new() -> Self {
        WhenState {
            current: None,
            busy: false,
            reentered: false,
            done: false,
            epoch: 0,
        }
    }
}

pub(super) fn window_count<S, T>(
    mut source: S,
    window_size: usize,
    start_every: usize,
) -> Observable<Observable<T>>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    Observable::new(move |mut o: Subscriber<Observable<T>>| {
        if window_size == 0 || start_every == 0 {
            o.complete();
            return Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);
        }

        let o_shared = Arc::new(Mutex::new(o));
        let o_cloned_e = Arc::clone(&o_shared);
        let o_cloned_c = Arc::clone(&o_shared);

        // Every open window sees every value; a window closes once it has
        // `window_size` values and a new one opens every `start_every`
        // values.
        let windows: Arc<Mutex<Vec<(SubjectEmitter<T>, usize)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let windows_e = Arc::clone(&windows);
        let windows_c = Arc::clone(&windows);

        let (e, r) = Subject::emitter_receiver();
        windows.lock().unwrap().push((e, 0));
        o_shared.lock().unwrap().next(r.into());

        let o_for_next = Arc::clone(&o_shared);
        let mut count: usize = 0;

        let u = Subscriber::new(
            move |v: T| {
                let full: Vec<SubjectEmitter<T>> = {
                    let mut ws = windows.lock().unwrap();
                    for (e, seen) in ws.iter_mut() {
                        e.next(v.clone());
                        *seen += 1;
                    }
                    let mut full = Vec::new();
                    ws.retain_mut(|(e, seen)| {
                        if *seen >= window_size {
                            full.push(e.clone());
                            false
                        } else {
                            true
                        }
                    });
                    full
                };
                for mut e in full {
                    e.complete();
                }
                count += 1;
                if count % start_every == 0 {
                    let (e, r) = Subject::emitter_receiver();
                    windows.lock().unwrap().push((e, 0));
                    o_for_next.lock().unwrap().next(r.into());
                }
            },
            move |err| {
                let ws = std::mem::take(&mut *windows_e.lock().unwrap());
                for (mut e, _) in ws {
                    e.error(Arc::clone(&err));
                }
                o_cloned_e.lock().unwrap().error(err);
            },
            move || {
                let ws = std::mem::take(&mut *windows_c.lock().unwrap());
                for (mut e, _) in ws {
                    e.complete();
                }
                o_cloned_c.lock().unwrap().complete();
            },
        );
        source.subscribe(u)
    })
}

pub(super) fn window_toggle<S, T, O, C, F>(
    source: S,
    openings: Observable<O>,
    closing_selector: F,
) -> Observable<Observable<T>>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    O: Send + 'static,
    C: Send + 'static,
    F: (FnMut(O) -> Observable<C>) + Send + Sync + 'static,
{
    let source = Arc::new(Mutex::new(source));
    let openings = Arc::new(Mutex::new(openings));
    let closing_selector = Arc::new(Mutex::new(closing_selector));

    Observable::new(move |o: Subscriber<Observable<T>>| {
        let o_shared = Arc::new(Mutex::new(o));

        let contexts: Arc<Mutex<Vec<(u64, SubjectEmitter<T>)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let next_key = Arc::new(AtomicU64::new(0));
        let parent = Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);

        let openings_sub = {
            let o_window = Arc::clone(&o_shared);
            let o_open_e = Arc::clone(&o_shared);
            let contexts_o = Arc::clone(&contexts);
            let selector = Arc::clone(&closing_selector);
            let parent_cl = parent.clone();
            let next_key = Arc::clone(&next_key);
            openings.lock().unwrap().subscribe(Subscriber::new(
                move |opening: O| {
                    let key = next_key.fetch_add(1, Ordering::SeqCst);
                    let (e, r) = Subject::emitter_receiver();
                    contexts_o.lock().unwrap().push((key, e));
                    o_window.lock().unwrap().next(r.into());

                    let mut closing = (selector.lock().unwrap())(opening);
                    let contexts_cl = Arc::clone(&contexts_o);
                    // Removes exactly this context; notifications after the
                    // first removal find nothing and do nothing.
                    let close = Arc::new(Mutex::new(move || {
                        let removed = {
                            let mut ctxs = contexts_cl.lock().unwrap();
                            ctxs.iter()
                                .position(|(k, _)| *k == key)
                                .map(|i| ctxs.remove(i))
                        };
                        if let Some((_, mut e)) = removed {
                            e.complete();
                        }
                    }));
                    let close_c = Arc::clone(&close);
                    let o_cls_e = Arc::clone(&o_window);
                    let cs = closing.subscribe(Subscriber::new(
                        move |_| (close.lock().unwrap())(),
                        move |err| o_cls_e.lock().unwrap().error(err),
                        move || (close_c.lock().unwrap())(),
                    ));
                    parent_cl.add(cs);
                },
                move |err| o_open_e.lock().unwrap().error(err),
                // Openings completing only stops new windows from opening.
                || {},
            ))
        };
        parent.add(openings_sub);

        let source_sub = {
            let o_src_e = Arc::clone(&o_shared);
            let o_src_c = Arc::clone(&o_shared);
            let contexts_n = Arc::clone(&contexts);
            let contexts_e = Arc::clone(&contexts);
            let contexts_c = Arc::clone(&contexts);
            source.lock().unwrap().subscribe(Subscriber::new(
                move |v: T| {
                    let mut ctxs = contexts_n.lock().unwrap();
                    for (_, e) in ctxs.iter_mut() {
                        e.next(v.clone());
                    }
                },
                move |err| {
                    let ctxs = std::mem::take(&mut *contexts_e.lock().unwrap());
                    for (_, mut e) in ctxs {
                        e.error(Arc::clone(&err));
                    }
                    o_src_e.lock().unwrap().error(err);
                },
                move || {
                    let ctxs = std::mem::take(&mut *contexts_c.lock().unwrap());
                    for (_, mut e) in ctxs {
                        e.complete();
                    }
                    o_src_c.lock().unwrap().complete();
                },
            ))
        };
        parent.add(source_sub);
        parent
    })
}

/// Arms one closing observable for the currently open window and loops while
/// closings fire synchronously. A closing that completes while it is still
/// being subscribed stops the whole stream instead of re-arming forever.
fn arm_window<T, C, F>(
    o_shared: Arc<Mutex<Subscriber<Observable<T>>>>,
    selector: Arc<Mutex<F>>,
    state: Arc<Mutex<WhenState<SubjectEmitter<T>>>>,
    closing_slot: Arc<Mutex<Option<Subscription>>>,
) where
    T: Clone + Send + Sync + 'static,
    C: Send + 'static,
    F: (FnMut() -> Observable<C>) + Send + Sync + 'static,
{
    {
        let mut st = state.lock().unwrap();
        if st.done {
            return;
        }
        if st.busy {
            st.reentered = true;
            return;
        }
        st.busy = true;
    }
    loop {
        let (receiver, my_epoch) = {
            let mut st = state.lock().unwrap();
            st.reentered = false;
            st.epoch += 1;
            let (e, r) = Subject::emitter_receiver();
            st.current = Some(e);
            (r, st.epoch)
        };
        o_shared.lock().unwrap().next(receiver.into());

        let mut closing = (selector.lock().unwrap())();

        let cs = {
            let o_next = Arc::clone(&o_shared);
            let state_n = Arc::clone(&state);
            let selector_n = Arc::clone(&selector);
            let slot_n = Arc::clone(&closing_slot);
            let o_err = Arc::clone(&o_shared);
            let state_e = Arc::clone(&state);
            let o_comp = Arc::clone(&o_shared);
            let state_c = Arc::clone(&state);
            let selector_c = Arc::clone(&selector);
            let slot_c = Arc::clone(&closing_slot);
            closing.subscribe(Subscriber::new(
                move |_| {
                    let flushed = {
                        let mut st = state_n.lock().unwrap();
                        if st.done || st.epoch != my_epoch {
                            None
                        } else {
                            st.current.take()
                        }
                    };
                    if let Some(mut e) = flushed {
                        e.complete();
                        arm_window(
                            Arc::clone(&o_next),
                            Arc::clone(&selector_n),
                            Arc::clone(&state_n),
                            Arc::clone(&slot_n),
                        );
                    }
                },
                move |err| {
                    let flushed = {
                        let mut st = state_e.lock().unwrap();
                        if st.done || st.epoch != my_epoch {
                            return;
                        }
                        st.done = true;
                        st.current.take()
                    };
                    if let Some(mut e) = flushed {
                        e.error(Arc::clone(&err));
                    }
                    o_err.lock().unwrap().error(err);
                },
                move || {
                    enum Action<W> {
                        Terminate(Option<W>),
                        Rearm(Option<W>),
                        Nothing,
                    }
                    let action = {
                        let mut st = state_c.lock().unwrap();
                        if st.done || st.epoch != my_epoch {
                            Action::Nothing
                        } else if st.busy {
                            st.done = true;
                            Action::Terminate(st.current.take())
                        } else {
                            Action::Rearm(st.current.take())
                        }
                    };
                    match action {
                        Action::Terminate(w) => {
                            if let Some(mut e) = w {
                                e.complete();
                            }
                            o_comp.lock().unwrap().complete();
                        }
                        Action::Rearm(w) => {
                            if let Some(mut e) = w {
                                e.complete();
                            }
                            arm_window(
                                Arc::clone(&o_comp),
                                Arc::clone(&selector_c),
                                Arc::clone(&state_c),
                                Arc::clone(&slot_c),
                            );
                        }
                        Action::Nothing => {}
                    }
                },
            ))
        };

        let old = closing_slot.lock().unwrap().replace(cs);
        if let Some(old) = old {
            if let Err(e) = old.unsubscribe() {
                log::warn!("closing teardown failed in window_when: {}", e);
            }
        }

        let mut st = state.lock().unwrap();
        if st.done || !st.reentered {
            st.busy = false;
            break;
        }
    }
}

pub(super) fn window_when<S, T, C, F>(mut source: S, closing_selector: F) -> Observable<Observable<T>>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    C: Send + 'static,
    F: (FnMut() -> Observable<C>) + Send + Sync + 'static,
{
    let closing_selector = Arc::new(Mutex::new(closing_selector));

    Observable::new(move |o: Subscriber<Observable<T>>| {
        let o_shared = Arc::new(Mutex::new(o));
        let state = Arc::new(Mutex::new(WhenState::new()));
        let closing_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        arm_window(
            Arc::clone(&o_shared),
            Arc::clone(&closing_selector),
            Arc::clone(&state),
            Arc::clone(&closing_slot),
        );

        let source_sub = {
            let state_n = Arc::clone(&state);
            let state_e = Arc::clone(&state);
            let state_c = Arc::clone(&state);
            let o_e = Arc::clone(&o_shared);
            let o_c = Arc::clone(&o_shared);
            source.subscribe(Subscriber::new(
                move |v: T| {
                    let emitter = state_n.lock().unwrap().current.clone();
                    if let Some(mut e) = emitter {
                        e.next(v);
                    }
                },
                move |err| {
                    let flushed = {
                        let mut st = state_e.lock().unwrap();
                        st.done = true;
                        st.current.take()
                    };
                    if let Some(mut e) = flushed {
                        e.error(Arc::clone(&err));
                    }
                    o_e.lock().unwrap().error(err);
                },
                move || {
                    let flushed = {
                        let mut st = state_c.lock().unwrap();
                        st.done = true;
                        st.current.take()
                    };
                    if let Some(mut e) = flushed {
                        e.complete();
                    }
                    o_c.lock().unwrap().complete();
                },
            ))
        };

        let parent = Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);
        parent.add(source_sub);
        let state_t = Arc::clone(&state);
        let slot_t = Arc::clone(&closing_slot);
        parent.add_teardown(UnsubscribeLogic::Logic(Box::new(move || {
            state_t.lock().unwrap().done = true;
            if let Some(s) = slot_t.lock().unwrap().take() {
                s.unsubscribe().map_err(|e| e.into_shared())?;
            }
            Ok(())
        })));
        parent
    })
}
