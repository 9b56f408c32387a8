//! Core database infrastructure
//!
//! This module provides the foundational database components used by the engine:
//! - `StorageHandle`: single-connection wrapper with access mode and tuning
//! - `Params` / `Row`: parameter binding and result rows
//! - `Tuning`: startup pragma directives

mod connection;
mod params;
mod tuning;

pub use connection::{AccessMode, StorageHandle};
pub use params::{Params, Row, Value};
pub use tuning::{Tuning, READ_ONLY_DEFAULTS, READ_WRITE_DEFAULTS};
