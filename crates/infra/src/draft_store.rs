//! Draft recovery store.
//!
//! Keeps the latest [`DraftSnapshot`] of each cart session so an abandoned or
//! reloaded session can pick up where it left off. Snapshots are stored as
//! JSON values; the undo log never leaves the session.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value as JsonValue;
use thiserror::Error;

use shipplan_planning::{DraftSnapshot, ShipmentPlan};

#[derive(Debug, Error)]
pub enum DraftStoreError {
    #[error("draft serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("draft storage error: {0}")]
    Storage(String),
}

/// Session-keyed draft storage.
pub trait DraftStore: Send + Sync {
    fn save(&self, session_id: &str, snapshot: &DraftSnapshot) -> Result<(), DraftStoreError>;

    fn load(&self, session_id: &str) -> Result<Option<DraftSnapshot>, DraftStoreError>;

    /// Drop a draft (cart cleared or submitted). Missing drafts are fine.
    fn discard(&self, session_id: &str) -> Result<(), DraftStoreError>;
}

impl<S> DraftStore for Arc<S>
where
    S: DraftStore + ?Sized,
{
    fn save(&self, session_id: &str, snapshot: &DraftSnapshot) -> Result<(), DraftStoreError> {
        (**self).save(session_id, snapshot)
    }

    fn load(&self, session_id: &str) -> Result<Option<DraftSnapshot>, DraftStoreError> {
        (**self).load(session_id)
    }

    fn discard(&self, session_id: &str) -> Result<(), DraftStoreError> {
        (**self).discard(session_id)
    }
}

/// Save the plan's current state.
pub fn save_plan<D>(store: &D, session_id: &str, plan: &ShipmentPlan) -> Result<(), DraftStoreError>
where
    D: DraftStore + ?Sized,
{
    store.save(session_id, &plan.snapshot())
}

/// Restore a plan from its draft, if one was saved.
pub fn restore_plan<D>(store: &D, session_id: &str) -> Result<Option<ShipmentPlan>, DraftStoreError>
where
    D: DraftStore + ?Sized,
{
    Ok(store.load(session_id)?.map(ShipmentPlan::restore))
}

/// In-memory draft store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDraftStore {
    drafts: RwLock<HashMap<String, JsonValue>>,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.drafts.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DraftStore for InMemoryDraftStore {
    fn save(&self, session_id: &str, snapshot: &DraftSnapshot) -> Result<(), DraftStoreError> {
        let value = serde_json::to_value(snapshot)?;
        let mut drafts = self
            .drafts
            .write()
            .map_err(|_| DraftStoreError::Storage("lock poisoned".to_string()))?;
        drafts.insert(session_id.to_string(), value);
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<DraftSnapshot>, DraftStoreError> {
        let drafts = self
            .drafts
            .read()
            .map_err(|_| DraftStoreError::Storage("lock poisoned".to_string()))?;
        drafts
            .get(session_id)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(DraftStoreError::from)
    }

    fn discard(&self, session_id: &str) -> Result<(), DraftStoreError> {
        let mut drafts = self
            .drafts
            .write()
            .map_err(|_| DraftStoreError::Storage("lock poisoned".to_string()))?;
        drafts.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use shipplan_planning::{CartLine, CollectionCatalog, CollectionRef, CollectionWindow};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn plan() -> ShipmentPlan {
        let catalog = CollectionCatalog::new().with_window(CollectionWindow::new(
            "A",
            "Spring",
            Some(date(3, 1)),
            Some(date(3, 15)),
        ));
        ShipmentPlan::from_cart(
            "session-7",
            vec![
                CartLine::new("A1", "Coat", 1, 100)
                    .in_collection(CollectionRef::new("A", "Spring")),
                CartLine::new("U1", "Scarf", 1, 100),
            ],
            &catalog,
        )
        .unwrap()
    }

    #[test]
    fn draft_restores_combined_plan_that_can_still_split() {
        let store = InMemoryDraftStore::new();
        let mut original = plan();
        let ids: Vec<_> = original.groups().iter().map(|g| g.id_typed()).collect();
        let combined = original.on_combine(ids[0], ids[1]).unwrap();
        save_plan(&store, "session-7", &original).unwrap();

        let mut restored = restore_plan(&store, "session-7").unwrap().unwrap();
        assert_eq!(restored.snapshot(), original.snapshot());

        restored.on_split(combined).unwrap();
        let restored_ids: Vec<_> = restored.groups().iter().map(|g| g.id_typed()).collect();
        assert_eq!(restored_ids, ids);
    }

    #[test]
    fn discard_removes_the_draft() {
        let store = Arc::new(InMemoryDraftStore::new());
        save_plan(&store, "s", &plan()).unwrap();
        assert_eq!(store.len(), 1);

        store.discard("s").unwrap();
        store.discard("s").unwrap();
        assert!(store.is_empty());
        assert!(restore_plan(&store, "s").unwrap().is_none());
    }
}
