//! Neo4j client and models for the entity hierarchy

pub mod client;
mod impl_collab;
mod impl_entity_store;
pub mod models;
pub mod traits;

pub use client::Neo4jClient;
pub use models::*;
pub use traits::EntityStore;

#[cfg(test)]
pub(crate) mod mock;
