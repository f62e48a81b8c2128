//! CRUD event system for committed hierarchy mutations
//!
//! This module provides:
//! - `CrudEvent`: typed events emitted after every committed mutation
//! - `EventBus`: broadcast channel for distributing events to subscribers

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{CrudAction, CrudEvent, EntityType, EventEmitter};
