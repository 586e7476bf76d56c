use std::sync::{Arc, Mutex};

use brook::subscribe::Subscriber;
use brook::{Observer, ObservableExt, Subject, Subscribeable};

#[test]
fn subject_receiver_composes_with_operators() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_c = Arc::clone(&seen);
    let completes = Arc::new(Mutex::new(0));
    let completes_c = Arc::clone(&completes);

    let (mut stx, srx) = Subject::emitter_receiver();

    let mut mapped = srx
        .clone()
        .filter(|v: &i32| v % 2 == 0)
        .map(|v| v * 10)
        .take(2);

    mapped.subscribe(Subscriber::new(
        move |v| seen_c.lock().unwrap().push(v),
        |_| {},
        move || *completes_c.lock().unwrap() += 1,
    ));

    stx.next(1);
    stx.next(2);
    stx.next(3);
    stx.next(4);
    stx.next(5);

    assert_eq!(*seen.lock().unwrap(), vec![20, 40]);
    assert_eq!(*completes.lock().unwrap(), 1);
    // `take` unsubscribed the chain, which removed the registered observer
    // from the subject.
    assert_eq!(srx.len(), 0);
}

#[test]
fn emitter_feeds_subject_from_another_observable() {
    use brook::Observable;
    use brook::subscribe::{Subscription, SubscriptionHandle, UnsubscribeLogic};

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_c = Arc::clone(&seen);

    let mut observable = Observable::new(|mut o: Subscriber<i32>| {
        for i in 0..5 {
            o.next(i);
        }
        o.complete();
        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
    });

    let (emitter, mut receiver) = Subject::emitter_receiver();

    receiver.subscribe(Subscriber::on_next(move |v: i32| {
        seen_c.lock().unwrap().push(v);
    }));

    // The emitter acts as an observer for the source observable.
    observable.subscribe(emitter.into());

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn multiple_subscribers_each_receive_fanout() {
    let seen1 = Arc::new(Mutex::new(Vec::new()));
    let seen1_c = Arc::clone(&seen1);
    let seen2 = Arc::new(Mutex::new(Vec::new()));
    let seen2_c = Arc::clone(&seen2);

    let (mut stx, mut srx) = Subject::emitter_receiver();

    srx.subscribe(Subscriber::on_next(move |v: i32| {
        seen1_c.lock().unwrap().push(v);
    }));
    srx.subscribe(Subscriber::on_next(move |v: i32| {
        seen2_c.lock().unwrap().push(v * 2);
    }));

    stx.next(1);
    stx.next(2);

    assert_eq!(*seen1.lock().unwrap(), vec![1, 2]);
    assert_eq!(*seen2.lock().unwrap(), vec![2, 4]);
}
