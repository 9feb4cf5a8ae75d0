//! Hash maps used by the reconciler.
//!
//! `rustc-hash` backs the maps by default; the `std-hash` feature switches to
//! the standard SipHash implementation.

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::HashMap;

    pub fn with_capacity<K, V>(capacity: usize) -> HashMap<K, V> {
        HashMap::with_capacity(capacity)
    }
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use rustc_hash::FxHashMap as HashMap;

    pub fn with_capacity<K, V>(capacity: usize) -> HashMap<K, V> {
        HashMap::with_capacity_and_hasher(capacity, Default::default())
    }
}
