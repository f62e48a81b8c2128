//! In-memory access control for testing.
//!
//! Timers and comments live in `MockEntityStore` so they roll back with it.

use super::AccessControl;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Writable modes per user
pub struct MockAccessControl {
    pub writable: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl MockAccessControl {
    pub fn new() -> Self {
        Self {
            writable: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_mode(mut self, user: Uuid, mode_id: Uuid) -> Self {
        self.writable
            .get_mut()
            .entry(user)
            .or_default()
            .insert(mode_id);
        self
    }
}

impl Default for MockAccessControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccessControl for MockAccessControl {
    async fn mode_ids_writable_by(&self, user: Uuid) -> Result<HashSet<Uuid>> {
        Ok(self
            .writable
            .read()
            .await
            .get(&user)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writable_modes_are_per_user() {
        let owner = Uuid::new_v4();
        let mode = Uuid::new_v4();
        let access = MockAccessControl::new().with_mode(owner, mode);

        assert!(access.mode_ids_writable_by(owner).await.unwrap().contains(&mode));
        assert!(access
            .mode_ids_writable_by(Uuid::new_v4())
            .await
            .unwrap()
            .is_empty());
    }
}
