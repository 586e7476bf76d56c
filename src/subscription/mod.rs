//! Subscription handles and the teardown graph.

pub mod subscribe;
