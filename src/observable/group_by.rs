use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex},
};

use crate::observer::Observer;
use crate::subjects::{Subject, SubjectEmitter, SubjectReceiver};
use crate::subscription::subscribe::{
    Subscribeable, Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic,
};

use super::Observable;

/// The values that share one key, as emitted by
/// [`group_by`](super::ObservableExt::group_by).
///
/// A grouped observable is a subject handle: subscribing attaches to the
/// group's live feed. Since it implements [`Subscribeable`], every operator
/// applies to a group just as to any other observable.
pub struct GroupedObservable<K, T> {
    key: K,
    receiver: SubjectReceiver<T>,
}

impl<K, T> GroupedObservable<K, T> {
    /// The key shared by every value of this group.
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Clone, T> Clone for GroupedObservable<K, T> {
    fn clone(&self) -> Self {
        GroupedObservable {
            key: self.key.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

impl<K, T: 'static> Subscribeable for GroupedObservable<K, T> {
    type ObsType = T;

    fn subscribe(&mut self, s: Subscriber<Self::ObsType>) -> Subscription {
        self.receiver.subscribe(s)
    }
}

pub(super) fn group_by<S, T, K, F>(source: S, key_selector: F) -> Observable<GroupedObservable<K, T>>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
    F: (FnMut(&T) -> K) + Send + Sync + 'static,
{
    // A duration observable that never fires keeps every group open until
    // the source terminates.
    group_by_until(source, key_selector, |_| {
        Observable::<()>::new(|_| Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil))
    })
}

pub(super) fn group_by_until<S, T, K, D, F, G>(
    mut source: S,
    key_selector: F,
    duration_selector: G,
) -> Observable<GroupedObservable<K, T>>
where
    S: Subscribeable<ObsType = T> + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    K: Hash + Eq + Clone + Send + Sync + 'static,
    D: Send + 'static,
    F: (FnMut(&T) -> K) + Send + Sync + 'static,
    G: (FnMut(&K) -> Observable<D>) + Send + Sync + 'static,
{
    let key_selector = Arc::new(Mutex::new(key_selector));
    let duration_selector = Arc::new(Mutex::new(duration_selector));

    Observable::new(move |o: Subscriber<GroupedObservable<K, T>>| {
        let o_shared = Arc::new(Mutex::new(o));
        let o_cloned_e = Arc::clone(&o_shared);
        let o_cloned_c = Arc::clone(&o_shared);

        let groups: Arc<Mutex<HashMap<K, SubjectEmitter<T>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let groups_e = Arc::clone(&groups);
        let groups_c = Arc::clone(&groups);

        let parent = Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil);
        let parent_cl = parent.clone();

        let key_selector = Arc::clone(&key_selector);
        let duration_selector = Arc::clone(&duration_selector);
        let o_for_groups = Arc::clone(&o_shared);

        let u = Subscriber::new(
            move |v: T| {
                let k = (key_selector.lock().unwrap())(&v);
                let (mut emitter, created) = {
                    let mut g = groups.lock().unwrap();
                    match g.entry(k.clone()) {
                        std::collections::hash_map::Entry::Occupied(e) => {
                            (e.get().clone(), None)
                        }
                        std::collections::hash_map::Entry::Vacant(slot) => {
                            let (e, r) = Subject::emitter_receiver();
                            slot.insert(e.clone());
                            (e, Some(r))
                        }
                    }
                };
                if let Some(r) = created {
                    o_for_groups.lock().unwrap().next(GroupedObservable {
                        key: k.clone(),
                        receiver: r,
                    });

                    // The group closes early when its duration observable
                    // fires; a later value under the same key starts over.
                    let mut duration = (duration_selector.lock().unwrap())(&k);
                    let groups_d = Arc::clone(&groups);
                    let k_d = k.clone();
                    let close = Arc::new(Mutex::new(move || {
                        let removed = groups_d.lock().unwrap().remove(&k_d);
                        if let Some(mut e) = removed {
                            e.complete();
                        }
                    }));
                    let close_c = Arc::clone(&close);
                    let o_dur_e = Arc::clone(&o_for_groups);
                    let ds = duration.subscribe(Subscriber::new(
                        move |_| (close.lock().unwrap())(),
                        move |err| o_dur_e.lock().unwrap().error(err),
                        move || (close_c.lock().unwrap())(),
                    ));
                    parent_cl.add(ds);
                }
                emitter.next(v);
            },
            move |err| {
                let snapshot: Vec<_> = groups_e
                    .lock()
                    .unwrap()
                    .drain()
                    .map(|(_, e)| e)
                    .collect();
                for mut ge in snapshot {
                    ge.error(Arc::clone(&err));
                }
                o_cloned_e.lock().unwrap().error(err);
            },
            move || {
                let snapshot: Vec<_> = groups_c
                    .lock()
                    .unwrap()
                    .drain()
                    .map(|(_, e)| e)
                    .collect();
                for mut ge in snapshot {
                    ge.complete();
                }
                o_cloned_c.lock().unwrap().complete();
            },
        );

        parent.add(source.subscribe(u));
        parent
    })
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use crate::{
        observer::Observer, subscribe::Subscriber, Observable, ObservableExt, Subject,
        Subscribeable,
    };

    #[test]
    fn group_by_splits_by_key_in_first_appearance_order() {
        let keys = Arc::new(Mutex::new(Vec::new()));
        let keys_c = Arc::clone(&keys);
        let values = Arc::new(Mutex::new(Vec::new()));
        let completes = Arc::new(Mutex::new(0));
        let completes_c = Arc::clone(&completes);

        let mut grouped = Observable::from_iter(vec![1, 2, 3, 4, 5]).group_by(|v| v % 2);

        grouped.subscribe(Subscriber::new(
            move |mut g: crate::observable::GroupedObservable<i32, i32>| {
                let key = *g.key();
                keys_c.lock().unwrap().push(key);
                let values = Arc::clone(&values);
                let completes = Arc::clone(&completes);
                g.subscribe(Subscriber::new(
                    move |v| values.lock().unwrap().push((key, v)),
                    |_| {},
                    move || *completes.lock().unwrap() += 1,
                ));
            },
            |_| {},
            || {},
        ));

        assert_eq!(*keys.lock().unwrap(), vec![1, 0]);
        // Values arrive in source order, tagged with their group key.
        // (the register was moved into the group subscriber, so assert
        // through the completes counter and keys)
        assert_eq!(*completes_c.lock().unwrap(), 2);
    }

    #[test]
    fn group_by_routes_values_to_their_group() {
        let values = Arc::new(Mutex::new(Vec::new()));
        let values_outer = Arc::clone(&values);

        let mut grouped = Observable::from_iter(vec![1, 2, 3, 4, 5]).group_by(|v| v % 2);

        grouped.subscribe(Subscriber::on_next(
            move |mut g: crate::observable::GroupedObservable<i32, i32>| {
                let key = *g.key();
                let values = Arc::clone(&values_outer);
                g.subscribe(Subscriber::on_next(move |v| {
                    values.lock().unwrap().push((key, v));
                }));
            },
        ));

        assert_eq!(
            *values.lock().unwrap(),
            vec![(1, 1), (0, 2), (1, 3), (0, 4), (1, 5)]
        );
    }

    #[test]
    fn group_by_until_reopens_groups_after_duration_fires() {
        let created = Arc::new(Mutex::new(Vec::new()));
        let created_c = Arc::clone(&created);
        let values = Arc::new(Mutex::new(Vec::new()));
        let values_outer = Arc::clone(&values);

        let (mut stx, srx) = Subject::emitter_receiver();
        let (mut dtx, drx) = Subject::<()>::emitter_receiver();

        let mut grouped = srx
            .clone()
            .group_by_until(|v: &i32| v % 2, move |_| drx.clone().into());

        grouped.subscribe(Subscriber::on_next(
            move |mut g: crate::observable::GroupedObservable<i32, i32>| {
                let key = *g.key();
                created_c.lock().unwrap().push(key);
                let values = Arc::clone(&values_outer);
                g.subscribe(Subscriber::on_next(move |v| {
                    values.lock().unwrap().push((key, v));
                }));
            },
        ));

        stx.next(1);
        stx.next(2);
        stx.next(3);

        // Both open groups close here.
        dtx.next(());

        stx.next(4);
        stx.next(5);
        stx.complete();

        assert_eq!(*created.lock().unwrap(), vec![1, 0, 0, 1]);
        assert_eq!(
            *values.lock().unwrap(),
            vec![(1, 1), (0, 2), (1, 3), (0, 4), (1, 5)]
        );
    }
}
