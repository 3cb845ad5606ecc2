//! # smart-traffic common library
//!
//! Shared code for the smart-traffic microservices:
//! - Event record models
//! - Classification oracle and provisional labelling rule
//! - Event store trait with SQLite and in-memory backends
//! - Database initialization
//! - Bootstrap configuration loading

pub mod classification;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod store;
pub mod time;

pub use error::{Error, Result};
pub use models::{EventIn, EventRecord, NewEvent};
pub use store::{EventStore, MemoryEventStore, SqliteEventStore};
