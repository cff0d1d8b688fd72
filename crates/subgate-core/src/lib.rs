//! Core of the subscription-gate bot fleet.
//!
//! Telegram and the object store live behind ports (traits); the adapter crate
//! implements them and this crate drives every bot through them.

pub mod config;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod interaction;
pub mod logging;
pub mod messaging;
pub mod storage;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
