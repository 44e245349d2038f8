//! Negalab Core - shared model types for the Negalab conversion tools
//!
//! This crate holds the plain data types exchanged between the storage
//! layer and its callers, starting with the `Preset` conversion record.

mod preset;

pub use preset::*;
