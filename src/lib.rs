#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Emits a `tracing` debug event when the `tracing` feature is enabled.
macro_rules! debug_event {
    ($($arg:tt)+) => {{
        #[cfg(feature = "tracing")]
        {
            tracing::debug!($($arg)+);
        }
    }};
}

mod index;

pub mod error;

pub mod hash_table;

/// An insertion-ordered hash map built on [`HashTable`].
///
/// This module provides a `HashMap` that hashes keys with a configurable
/// hasher builder and remembers the order in which keys were first inserted.
pub mod hash_map;

pub mod dict;

pub use dict::Dict;
pub use dict::KeyOps;
pub use dict::NativeOps;
pub use error::AllocError;
pub use error::DictError;
pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_table::HashTable;
pub use hash_table::Rehash;
pub use index::IndexWidth;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used when none is specified.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used when none is specified.
        pub type DefaultHashBuilder = std::collections::hash_map::RandomState;
    }
}
