//! Typed entity access over the key-value store.
//!
//! This module owns the mapping between engine entities and store keys
//! (see [`crate::store::keys`]) and the secondary indexes kept alongside them.

mod entities;

pub use entities::EntityStore;
