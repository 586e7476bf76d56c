use std::sync::{Arc, Mutex};

use crate::observer::Observer;
use crate::subscribe::{Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic};
use crate::{Observable, ObservableExt, Subscribeable};

struct CheckFinished {
    last_value: i32,
    completed: bool,
}

#[test]
fn unchained_observable() {
    let value = 100;
    let o = Subscriber::new(
        move |v| {
            assert_eq!(
                v, value,
                "expected integer value {} but {} is emitted",
                value, v
            );
        },
        |_| {},
        move || {},
    );

    let mut s = Observable::new(move |mut o: Subscriber<_>| {
        o.next(value);
        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
    });

    s.subscribe(o);
}

#[test]
fn map_observable() {
    let last_emit_value = Arc::new(Mutex::new(CheckFinished {
        last_value: 0,
        completed: false,
    }));
    let last_emit_value_c1 = last_emit_value.clone();
    let last_emit_value_c2 = last_emit_value.clone();

    let s = Observable::new(move |mut o: Subscriber<_>| {
        o.next(100);
        o.complete();
        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
    });

    let mut s = s.map(|x| {
        let y = x + 1000;
        format!("emit to str {}", y)
    });

    let o = Subscriber::new(
        move |v: String| {
            assert!(
                v.contains("to str"),
                "map chained observable failed, expected string \"{}\", got \"{}\"",
                "emit to str",
                v
            );
            // Make sure next is invoked.
            last_emit_value_c1.lock().unwrap().last_value = 1;
        },
        |_| {},
        move || {
            last_emit_value_c2.lock().unwrap().completed = true;
            assert!(
                last_emit_value_c2.lock().unwrap().last_value == 1,
                "next method not called, last emitted value should be 1, but it is {}",
                last_emit_value_c2.lock().unwrap().last_value
            );
        },
    );

    s.subscribe(o);
    assert!(
        last_emit_value.lock().unwrap().completed,
        "map operator did not complete observable"
    );
}

#[test]
fn filter_and_skip_chain() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_c = Arc::clone(&seen);
    let completed = Arc::new(Mutex::new(false));
    let completed_c = Arc::clone(&completed);

    let mut s = Observable::from_iter(0..=10)
        .filter(|v: &i32| v % 2 != 0)
        .skip(2);

    s.subscribe(Subscriber::new(
        move |v| seen_c.lock().unwrap().push(v),
        |_| {},
        move || *completed_c.lock().unwrap() = true,
    ));

    assert_eq!(*seen.lock().unwrap(), vec![5, 7, 9]);
    assert!(*completed.lock().unwrap());
}

#[test]
fn take_stops_synchronous_source() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_c = Arc::clone(&seen);
    let completes = Arc::new(Mutex::new(0));
    let completes_c = Arc::clone(&completes);

    // An endless iterator; `take` must stop the producer, not just drop
    // excess values.
    let mut s = Observable::from_iter(0..).take(3);

    s.subscribe(Subscriber::new(
        move |v: i32| seen_c.lock().unwrap().push(v),
        |_| {},
        move || *completes_c.lock().unwrap() += 1,
    ));

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(*completes.lock().unwrap(), 1);
}

#[test]
fn take_zero_completes_without_subscribing_effects() {
    let completes = Arc::new(Mutex::new(0));
    let completes_c = Arc::clone(&completes);

    let mut s = Observable::from_iter(0..10).take(0);
    s.subscribe(Subscriber::new(
        |_: i32| panic!("take(0) must not emit"),
        |_| {},
        move || *completes_c.lock().unwrap() += 1,
    ));

    assert_eq!(*completes.lock().unwrap(), 1);
}

#[test]
fn merge_map_flattens_inner_observables() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_c = Arc::clone(&seen);

    let mut s = Observable::from_iter(vec![1, 2, 3])
        .merge_map(|v| Observable::from_iter(vec![v * 10, v * 10 + 1]));

    s.subscribe(Subscriber::on_next(move |v| {
        seen_c.lock().unwrap().push(v)
    }));

    assert_eq!(*seen.lock().unwrap(), vec![10, 11, 20, 21, 30, 31]);
}

#[test]
fn switch_map_switches_to_latest_inner() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_c = Arc::clone(&seen);

    let mut s = Observable::from_iter(vec![1, 2])
        .switch_map(|v| Observable::from_iter(vec![v * 10, v * 10 + 1]));

    s.subscribe(Subscriber::on_next(move |v| {
        seen_c.lock().unwrap().push(v)
    }));

    // Synchronous inner observables drain before the next outer value, so
    // every inner emission is observed.
    assert_eq!(*seen.lock().unwrap(), vec![10, 11, 20, 21]);
}

#[test]
fn factory_observables() {
    use std::error::Error;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_c = Arc::clone(&seen);
    Observable::of(7).subscribe(Subscriber::on_next(move |v: i32| {
        seen_c.lock().unwrap().push(v)
    }));
    assert_eq!(*seen.lock().unwrap(), vec![7]);

    let completes = Arc::new(Mutex::new(0));
    let completes_c = Arc::clone(&completes);
    Observable::<i32>::empty().subscribe(Subscriber::new(
        |_| panic!("empty observable must not emit"),
        |_| {},
        move || *completes_c.lock().unwrap() += 1,
    ));
    assert_eq!(*completes.lock().unwrap(), 1);

    #[derive(Debug)]
    struct Broken;

    impl std::fmt::Display for Broken {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "broken")
        }
    }

    impl Error for Broken {}

    let errors = Arc::new(Mutex::new(0));
    let errors_c = Arc::clone(&errors);
    let mut failing = Observable::<i32>::throw_error(Arc::new(Broken));
    failing.subscribe(Subscriber::new(
        |_| panic!("failing observable must not emit"),
        move |_| *errors_c.lock().unwrap() += 1,
        || panic!("failing observable must not complete"),
    ));
    assert_eq!(*errors.lock().unwrap(), 1);
}

#[tokio::test]
async fn for_each_resolves_on_completion() {
    let sum = Arc::new(Mutex::new(0));
    let sum_c = Arc::clone(&sum);

    Observable::from_iter(vec![1, 2, 3])
        .for_each(move |v| *sum_c.lock().unwrap() += v)
        .await
        .unwrap();

    assert_eq!(*sum.lock().unwrap(), 6);
}

#[tokio::test]
async fn for_each_rejects_on_error() {
    use std::error::Error;

    #[derive(Debug)]
    struct Broken;

    impl std::fmt::Display for Broken {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "broken")
        }
    }

    impl Error for Broken {}

    let result = Observable::<i32>::throw_error(Arc::new(Broken))
        .for_each(|_| {})
        .await;

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "broken");
}
