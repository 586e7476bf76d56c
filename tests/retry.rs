use std::{
    error::Error,
    fmt::Display,
    sync::{Arc, Mutex},
};

use brook::subscribe::{Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic};
use brook::{Observable, ObservableExt, Observer, Subscribeable};

#[derive(Debug)]
struct Flaky;

impl Display for Flaky {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "flaky source failed")
    }
}

impl Error for Flaky {}

#[test]
fn retry_when_resubscribes_until_source_succeeds() {
    let attempts = Arc::new(Mutex::new(0));
    let attempts_c = Arc::clone(&attempts);

    // Fails twice, then emits and completes.
    let source = Observable::new(move |mut o: Subscriber<i32>| {
        let attempt = {
            let mut a = attempts_c.lock().unwrap();
            *a += 1;
            *a
        };
        if attempt < 3 {
            o.error(Arc::new(Flaky));
        } else {
            o.next(42);
            o.complete();
        }
        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_c = Arc::clone(&seen);
    let completes = Arc::new(Mutex::new(0));
    let completes_c = Arc::clone(&completes);
    let errors = Arc::new(Mutex::new(0));
    let errors_c = Arc::clone(&errors);

    let mut retried = source.retry_when(|errs| errs.take(5).map(|_| ()));

    retried.subscribe(Subscriber::new(
        move |v| seen_c.lock().unwrap().push(v),
        move |_| *errors_c.lock().unwrap() += 1,
        move || *completes_c.lock().unwrap() += 1,
    ));

    assert_eq!(*attempts.lock().unwrap(), 3);
    assert_eq!(*seen.lock().unwrap(), vec![42]);
    assert_eq!(*errors.lock().unwrap(), 0);
    assert_eq!(*completes.lock().unwrap(), 1);
}

#[test]
fn retry_when_notifier_completion_completes_output_after_one_attempt() {
    let attempts = Arc::new(Mutex::new(0));
    let attempts_c = Arc::clone(&attempts);

    // Always errors.
    let source = Observable::new(move |mut o: Subscriber<i32>| {
        *attempts_c.lock().unwrap() += 1;
        o.error(Arc::new(Flaky));
        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
    });

    let completes = Arc::new(Mutex::new(0));
    let completes_c = Arc::clone(&completes);
    let errors = Arc::new(Mutex::new(0));
    let errors_c = Arc::clone(&errors);

    // The notifier never emits; it completes after the first error
    // notification, which must complete the output without another attempt.
    let mut retried =
        source.retry_when(|errs| errs.take(1).filter(|_| false).map(|_| ()));

    retried.subscribe(Subscriber::new(
        |_: i32| panic!("output must not emit"),
        move |_| *errors_c.lock().unwrap() += 1,
        move || *completes_c.lock().unwrap() += 1,
    ));

    assert_eq!(*attempts.lock().unwrap(), 1);
    assert_eq!(*errors.lock().unwrap(), 0);
    assert_eq!(*completes.lock().unwrap(), 1);
}

#[test]
fn retry_when_notifier_error_propagates() {
    let source = Observable::new(move |mut o: Subscriber<i32>| {
        o.error(Arc::new(Flaky));
        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
    });

    let errors = Arc::new(Mutex::new(Vec::new()));
    let errors_c = Arc::clone(&errors);

    // The notifier turns the first error notification back into a failure.
    let mut retried = source.retry_when(|errs| {
        errs.take(1)
            .merge_map(|e| Observable::<()>::throw_error(e))
    });

    retried.subscribe(Subscriber::new(
        |_: i32| panic!("output must not emit"),
        move |e| errors_c.lock().unwrap().push(e.to_string()),
        || panic!("output must not complete"),
    ));

    assert_eq!(*errors.lock().unwrap(), vec!["flaky source failed"]);
}

#[test]
fn repeat_when_resubscribes_on_notifier_emission() {
    let runs = Arc::new(Mutex::new(0));
    let runs_c = Arc::clone(&runs);

    let source = Observable::new(move |mut o: Subscriber<i32>| {
        *runs_c.lock().unwrap() += 1;
        o.next(1);
        o.next(2);
        o.complete();
        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_c = Arc::clone(&seen);
    let completes = Arc::new(Mutex::new(0));
    let completes_c = Arc::clone(&completes);

    let mut repeated = source.repeat_when(|completions| completions.take(2).map(|_| ()));

    repeated.subscribe(Subscriber::new(
        move |v| seen_c.lock().unwrap().push(v),
        |_| {},
        move || *completes_c.lock().unwrap() += 1,
    ));

    assert_eq!(*runs.lock().unwrap(), 2);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 1, 2]);
    assert_eq!(*completes.lock().unwrap(), 1);
}
