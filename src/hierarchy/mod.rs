//! Entity hierarchy core
//!
//! Goal > Project > Milestone > Task containment with:
//! - `ordering`: container scopes and end-of-scope positions
//! - `cascade`: mode propagation down the containment graph
//! - `archive`: archive-vs-delete decision on removal
//! - `batch`: multi-entity operations over a mixed selection
//! - `HierarchyManager`: the operation surface tying them together

pub mod archive;
mod batch;
pub mod cascade;
mod manager;
pub mod models;
pub mod ordering;
pub mod validation;

pub use manager::HierarchyManager;
pub use models::*;
pub use ordering::{ContainerScope, ScopeKey, POSITION_STEP};
