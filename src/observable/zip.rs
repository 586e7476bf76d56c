use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::observer::Observer;
use crate::subscription::subscribe::{
    Subscribeable, Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic,
    Unsubscribeable,
};

use super::Observable;

struct ZipState<T, U> {
    left: VecDeque<T>,
    right: VecDeque<U>,
    left_done: bool,
    right_done: bool,
    terminated: bool,
}

enum Step<T, U> {
    Emit((T, U)),
    Complete,
    Idle,
}

/// Emits every pair that is ready and completes the downstream once an
/// already-completed input has no buffered values left. Pairing decisions are
/// made under the state lock; delivery happens outside it.
fn drain<T, U>(
    state: &Arc<Mutex<ZipState<T, U>>>,
    o: &Arc<Mutex<Subscriber<(T, U)>>>,
    sources: &Arc<Mutex<Option<Subscription>>>,
) {
    loop {
        let step = {
            let mut st = state.lock().unwrap();
            if st.terminated {
                Step::Idle
            } else if !st.left.is_empty() && !st.right.is_empty() {
                let l = st.left.pop_front().unwrap();
                let r = st.right.pop_front().unwrap();
                Step::Emit((l, r))
            } else if (st.left_done && st.left.is_empty())
                || (st.right_done && st.right.is_empty())
            {
                st.terminated = true;
                Step::Complete
            } else {
                Step::Idle
            }
        };
        match step {
            Step::Emit(pair) => o.lock().unwrap().next(pair),
            Step::Complete => {
                o.lock().unwrap().complete();
                if let Some(s) = sources.lock().unwrap().take() {
                    if let Err(e) = s.unsubscribe() {
                        log::warn!("source teardown failed in zip: {}", e);
                    }
                }
                break;
            }
            Step::Idle => break,
        }
    }
}

pub(super) fn zip<S1, S2, T, U>(mut left: S1, mut right: S2) -> Observable<(T, U)>
where
    S1: Subscribeable<ObsType = T> + Send + Sync + 'static,
    S2: Subscribeable<ObsType = U> + Send + Sync + 'static,
    T: Send + 'static,
    U: Send + 'static,
{
    Observable::new(move |o: Subscriber<(T, U)>| {
        let o_shared = Arc::new(Mutex::new(o));
        let state = Arc::new(Mutex::new(ZipState {
            left: VecDeque::new(),
            right: VecDeque::new(),
            left_done: false,
            right_done: false,
            terminated: false,
        }));
        let sources: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let composite = Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);

        let left_sub = {
            let o_n = Arc::clone(&o_shared);
            let o_e = Arc::clone(&o_shared);
            let o_c = Arc::clone(&o_shared);
            let st_n = Arc::clone(&state);
            let st_e = Arc::clone(&state);
            let st_c = Arc::clone(&state);
            let src_n = Arc::clone(&sources);
            let src_c = Arc::clone(&sources);

            left.subscribe(Subscriber::new(
                move |v| {
                    st_n.lock().unwrap().left.push_back(v);
                    drain(&st_n, &o_n, &src_n);
                },
                move |observable_error| {
                    st_e.lock().unwrap().terminated = true;
                    o_e.lock().unwrap().error(observable_error);
                },
                move || {
                    st_c.lock().unwrap().left_done = true;
                    drain(&st_c, &o_c, &src_c);
                },
            ))
        };

        let right_sub = {
            let o_n = Arc::clone(&o_shared);
            let o_e = Arc::clone(&o_shared);
            let o_c = Arc::clone(&o_shared);
            let st_n = Arc::clone(&state);
            let st_e = Arc::clone(&state);
            let st_c = Arc::clone(&state);
            let src_n = Arc::clone(&sources);
            let src_c = Arc::clone(&sources);

            right.subscribe(Subscriber::new(
                move |v| {
                    st_n.lock().unwrap().right.push_back(v);
                    drain(&st_n, &o_n, &src_n);
                },
                move |observable_error| {
                    st_e.lock().unwrap().terminated = true;
                    o_e.lock().unwrap().error(observable_error);
                },
                move || {
                    st_c.lock().unwrap().right_done = true;
                    drain(&st_c, &o_c, &src_c);
                },
            ))
        };

        composite.add(left_sub);
        composite.add(right_sub);
        *sources.lock().unwrap() = Some(composite.clone());
        composite
    })
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use crate::{subscribe::Subscriber, Observable, ObservableExt, Subscribeable};

    #[test]
    fn zip_pairs_in_lockstep_and_completes_on_shorter_input() {
        let pairs = Arc::new(Mutex::new(Vec::new()));
        let pairs_c = Arc::clone(&pairs);
        let completed = Arc::new(Mutex::new(0));
        let completed_c = Arc::clone(&completed);

        let mut zipped =
            Observable::from_iter(vec![1, 2, 3]).zip(Observable::from_iter(vec![10, 20]));

        zipped.subscribe(Subscriber::new(
            move |pair: (i32, i32)| pairs_c.lock().unwrap().push(pair),
            |_| {},
            move || *completed_c.lock().unwrap() += 1,
        ));

        assert_eq!(*pairs.lock().unwrap(), vec![(1, 10), (2, 20)]);
        assert_eq!(*completed.lock().unwrap(), 1);
    }

    #[test]
    fn zip_completes_immediately_on_empty_input() {
        let pairs = Arc::new(Mutex::new(Vec::new()));
        let pairs_c = Arc::clone(&pairs);
        let completed = Arc::new(Mutex::new(0));
        let completed_c = Arc::clone(&completed);

        let mut zipped = Observable::<i32>::empty().zip(Observable::from_iter(vec![10, 20]));

        zipped.subscribe(Subscriber::new(
            move |pair: (i32, i32)| pairs_c.lock().unwrap().push(pair),
            |_| {},
            move || *completed_c.lock().unwrap() += 1,
        ));

        assert_eq!(pairs.lock().unwrap().len(), 0);
        assert_eq!(*completed.lock().unwrap(), 1);
    }
}
