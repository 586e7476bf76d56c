//! Push-based reactive streams for event-driven applications.
//!
//! `brook` provides a lazy [`Observable`] core, a transitively-cancelling
//! [`Subscription`](subscribe::Subscription) graph, multicasting
//! [`Subject`]s, a [`Connectable`]/`ref_count` sharing layer and a set of
//! operators including windowing, buffering, grouping, zipping and
//! notifier-driven retry/repeat.
//!
//! Values, errors and completion travel as ordinary synchronous calls; the
//! core imposes no scheduling of its own. Producers are free to emit inline,
//! from OS threads or from Tokio tasks, and the `Subscription` returned by
//! `subscribe` carries both the cancellation logic and, for asynchronous
//! producers, a join handle.
//!
//! ```no_run
//! use brook::subscribe::Subscriber;
//! use brook::{Observable, ObservableExt, Subscribeable};
//!
//! let mut evens = Observable::from_iter(0..10).filter(|v: &i32| v % 2 == 0);
//! evens.subscribe(Subscriber::on_next(|v| println!("{}", v)));
//! ```

pub mod errors;
pub mod observable;
pub mod observer;
pub mod scheduler;
pub mod subjects;
pub mod subscription;

pub use errors::{UnsubscribedError, UnsubscriptionError};
pub use observable::{Connectable, GroupedObservable, Observable, ObservableExt};
pub use observer::Observer;
pub use subjects::{AsyncSubject, BehaviorSubject, Subject};
pub use subscription::subscribe::{Subscribeable, Unsubscribeable};

/// Convenience access to the subscription building blocks.
pub mod subscribe {
    pub use crate::subscription::subscribe::*;
}
