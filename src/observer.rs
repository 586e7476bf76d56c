use std::{error::Error, sync::Arc};

/// The consumer side of a stream: a set of handlers for emitted values,
/// errors and completion.
///
/// At most one of the terminal methods (`error` or `complete`) is ever
/// delivered to a well-behaved observer; values stop flowing after either.
/// Errors travel as shared trait objects so a single error instance can fan
/// out to many observers.
pub trait Observer {
    /// The type of items this observer accepts through `next`.
    type NextFnType;

    /// Receives the next emitted item.
    fn next(&mut self, _: Self::NextFnType);

    /// Receives the completion notification.
    fn complete(&mut self);

    /// Receives an error notification.
    fn error(&mut self, _: Arc<dyn Error + Send + Sync>);
}
