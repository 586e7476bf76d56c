use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use crate::observer::Observer;
use crate::subscription::subscribe::{
    Subscribeable, Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic,
    Unsubscribeable,
};

use super::window::WhenState;
use super::Observable;

pub(super) fn buffer_count<S, T>(
    mut source: S,
    buffer_size: usize,
    start_every: usize,
) -> Observable<Vec<T>>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Clone + Send + 'static,
{
    Observable::new(move |mut o: Subscriber<Vec<T>>| {
        if buffer_size == 0 || start_every == 0 {
            o.complete();
            return Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);
        }

        let o_shared = Arc::new(Mutex::new(o));
        let o_cloned_e = Arc::clone(&o_shared);
        let o_cloned_c = Arc::clone(&o_shared);

        let buffers: Arc<Mutex<Vec<Vec<T>>>> = Arc::new(Mutex::new(Vec::new()));
        let buffers_e = Arc::clone(&buffers);
        let buffers_c = Arc::clone(&buffers);

        let mut count: usize = 0;

        let u = Subscriber::new(
            move |v: T| {
                let ready: Vec<Vec<T>> = {
                    let mut bufs = buffers.lock().unwrap();
                    if count % start_every == 0 {
                        bufs.push(Vec::with_capacity(buffer_size));
                    }
                    count += 1;
                    for b in bufs.iter_mut() {
                        b.push(v.clone());
                    }
                    let mut ready = Vec::new();
                    let mut i = 0;
                    while i < bufs.len() {
                        if bufs[i].len() >= buffer_size {
                            ready.push(bufs.remove(i));
                        } else {
                            i += 1;
                        }
                    }
                    ready
                };
                for b in ready {
                    o_shared.lock().unwrap().next(b);
                }
            },
            move |err| {
                buffers_e.lock().unwrap().clear();
                o_cloned_e.lock().unwrap().error(err);
            },
            move || {
                let remaining = std::mem::take(&mut *buffers_c.lock().unwrap());
                let mut o = o_cloned_c.lock().unwrap();
                for b in remaining {
                    if !b.is_empty() {
                        o.next(b);
                    }
                }
                o.complete();
            },
        );
        source.subscribe(u)
    })
}

pub(super) fn buffer_toggle<S, T, O, C, F>(
    source: S,
    openings: Observable<O>,
    closing_selector: F,
) -> Observable<Vec<T>>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Clone + Send + 'static,
    O: Send + 'static,
    C: Send + 'static,
    F: (FnMut(O) -> Observable<C>) + Send + Sync + 'static,
{
    let source = Arc::new(Mutex::new(source));
    let openings = Arc::new(Mutex::new(openings));
    let closing_selector = Arc::new(Mutex::new(closing_selector));

    Observable::new(move |o: Subscriber<Vec<T>>| {
        let o_shared = Arc::new(Mutex::new(o));

        let contexts: Arc<Mutex<Vec<(u64, Vec<T>)>>> = Arc::new(Mutex::new(Vec::new()));
        let next_key = Arc::new(AtomicU64::new(0));
        let parent = Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);

        let openings_sub = {
            let o_flush = Arc::clone(&o_shared);
            let o_open_e = Arc::clone(&o_shared);
            let contexts_o = Arc::clone(&contexts);
            let selector = Arc::clone(&closing_selector);
            let parent_cl = parent.clone();
            let next_key = Arc::clone(&next_key);
            openings.lock().unwrap().subscribe(Subscriber::new(
                move |opening: O| {
                    let key = next_key.fetch_add(1, Ordering::SeqCst);
                    contexts_o.lock().unwrap().push((key, Vec::new()));

                    let mut closing = (selector.lock().unwrap())(opening);
                    let contexts_cl = Arc::clone(&contexts_o);
                    let o_emit = Arc::clone(&o_flush);
                    // Flushes exactly this buffer; notifications after the
                    // first removal find nothing and do nothing.
                    let close = Arc::new(Mutex::new(move || {
                        let removed = {
                            let mut ctxs = contexts_cl.lock().unwrap();
                            ctxs.iter()
                                .position(|(k, _)| *k == key)
                                .map(|i| ctxs.remove(i))
                        };
                        if let Some((_, buf)) = removed {
                            o_emit.lock().unwrap().next(buf);
                        }
                    }));
                    let close_c = Arc::clone(&close);
                    let o_cls_e = Arc::clone(&o_flush);
                    let cs = closing.subscribe(Subscriber::new(
                        move |_| (close.lock().unwrap())(),
                        move |err| o_cls_e.lock().unwrap().error(err),
                        move || (close_c.lock().unwrap())(),
                    ));
                    parent_cl.add(cs);
                },
                move |err| o_open_e.lock().unwrap().error(err),
                // Openings completing only stops new buffers from opening.
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
                    for (_, buf) in ctxs.iter_mut() {
                        buf.push(v.clone());
                    }
                },
                move |err| {
                    contexts_e.lock().unwrap().clear();
                    o_src_e.lock().unwrap().error(err);
                },
                move || {
                    let ctxs = std::mem::take(&mut *contexts_c.lock().unwrap());
                    let mut o = o_src_c.lock().unwrap();
                    for (_, buf) in ctxs {
                        if !buf.is_empty() {
                            o.next(buf);
                        }
                    }
                    o.complete();
                },
            ))
        };
        parent.add(source_sub);
        parent
    })
}

/// Arms one closing observable for the currently open buffer and loops while
/// closings fire synchronously. A closing that completes while it is still
/// being subscribed stops the whole stream instead of re-arming forever.
fn arm_buffer<T, C, F>(
    o_shared: Arc<Mutex<Subscriber<Vec<T>>>>,
    selector: Arc<Mutex<F>>,
    state: Arc<Mutex<WhenState<Vec<T>>>>,
    closing_slot: Arc<Mutex<Option<Subscription>>>,
) where
    T: Send + 'static,
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
        let my_epoch = {
            let mut st = state.lock().unwrap();
            st.reentered = false;
            st.epoch += 1;
            st.current = Some(Vec::new());
            st.epoch
        };

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
                    if let Some(buf) = flushed {
                        o_next.lock().unwrap().next(buf);
                        arm_buffer(
                            Arc::clone(&o_next),
                            Arc::clone(&selector_n),
                            Arc::clone(&state_n),
                            Arc::clone(&slot_n),
                        );
                    }
                },
                move |err| {
                    {
                        let mut st = state_e.lock().unwrap();
                        if st.done || st.epoch != my_epoch {
                            return;
                        }
                        st.done = true;
                        st.current = None;
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
                        Action::Terminate(buf) => {
                            let mut o = o_comp.lock().unwrap();
                            if let Some(buf) = buf {
                                o.next(buf);
                            }
                            o.complete();
                        }
                        Action::Rearm(buf) => {
                            if let Some(buf) = buf {
                                o_comp.lock().unwrap().next(buf);
                            }
                            arm_buffer(
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
                log::warn!("closing teardown failed in buffer_when: {}", e);
            }
        }

        let mut st = state.lock().unwrap();
        if st.done || !st.reentered {
            st.busy = false;
            break;
        }
    }
}

pub(super) fn buffer_when<S, T, C, F>(mut source: S, closing_selector: F) -> Observable<Vec<T>>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Send + 'static,
    C: Send + 'static,
    F: (FnMut() -> Observable<C>) + Send + Sync + 'static,
{
    let closing_selector = Arc::new(Mutex::new(closing_selector));

    Observable::new(move |o: Subscriber<Vec<T>>| {
        let o_shared = Arc::new(Mutex::new(o));
        let state = Arc::new(Mutex::new(WhenState::new()));
        let closing_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        arm_buffer(
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
                    if let Some(buf) = state_n.lock().unwrap().current.as_mut() {
                        buf.push(v);
                    }
                },
                move |err| {
                    {
                        let mut st = state_e.lock().unwrap();
                        st.done = true;
                        st.current = None;
                    }
                    o_e.lock().unwrap().error(err);
                },
                move || {
                    let flushed = {
                        let mut st = state_c.lock().unwrap();
                        st.done = true;
                        st.current.take()
                    };
                    let mut o = o_c.lock().unwrap();
                    if let Some(buf) = flushed {
                        if !buf.is_empty() {
                            o.next(buf);
                        }
                    }
                    o.complete();
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
