//! Buffer slot replacement policy.
//!
//! The pool is small and fixed, so recency is tracked with a plain array of
//! slot indices ordered oldest to youngest instead of a linked structure.
//! Moving a slot to the youngest end shifts every younger entry down by one.
//!
//! # Interface
//!
//! - `youngest_first()`: search order for cache lookups
//! - `record_use()`: called whenever a slot becomes the current slot
//! - `oldest()`: the eviction victim

mod lru;

pub(crate) use lru::AgeIndex;
