//! Multicasting subjects: broadcast hubs that are observers and observables
//! at once.
//!
//! Subjects are split into an emitter and a receiver through the
//! `emitter_receiver` function. The emitter behaves as an `Observer`,
//! accepting `next()`, `error()` and `complete()` calls and fanning them out
//! to every registered subscriber; it can also be converted into a
//! `Subscriber` and fed by another `Observable`. The receiver behaves as an
//! `Observable`, providing `subscribe` and `unsubscribe`.
//!
//! Every fan-out works on a point-in-time snapshot of the registered
//! observers, so a handler that subscribes or unsubscribes during the
//! fan-out never affects the pass that is currently being delivered.
//!
//! Three varieties are provided: the plain `Subject`, the `AsyncSubject`
//! (emits its final value on completion) and the `BehaviorSubject` (replays
//! its latest value to new subscribers).

mod async_subject;
mod behavior_subject;
mod subject;

pub use async_subject::*;
pub use behavior_subject::*;
pub use subject::*;

use std::hash::Hasher;

fn random_seed() -> u64 {
    std::hash::BuildHasher::build_hasher(&std::collections::hash_map::RandomState::new()).finish()
}

// Pseudorandom number generator from the "Xorshift RNGs" paper by George Marsaglia.
//
// https://github.com/rust-lang/rust/blob/1.55.0/library/core/src/slice/sort.rs#L559-L573
fn gen_key() -> impl Iterator<Item = u64> {
    let mut random: u64 = random_seed();
    std::iter::repeat_with(move || {
        random ^= random << 13;
        random ^= random >> 17;
        random ^= random << 5;
        random
    })
}
