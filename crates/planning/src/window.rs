//! Collection ship windows and the metadata provider boundary.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use shipplan_core::ValueObject;

/// Identifier of a product collection (owned by the catalog, not by this core).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved collection reference carried by a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionRef {
    pub id: CollectionId,
    pub name: String,
}

impl CollectionRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: CollectionId::new(id),
            name: name.into(),
        }
    }
}

/// Ship window of a collection. Immutable for the length of an editing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionWindow {
    pub collection_id: CollectionId,
    pub name: String,
    pub ship_window_start: Option<NaiveDate>,
    pub ship_window_end: Option<NaiveDate>,
}

impl ValueObject for CollectionWindow {}

impl CollectionWindow {
    pub fn new(
        collection_id: impl Into<String>,
        name: impl Into<String>,
        ship_window_start: Option<NaiveDate>,
        ship_window_end: Option<NaiveDate>,
    ) -> Self {
        Self {
            collection_id: CollectionId::new(collection_id),
            name: name.into(),
            ship_window_start,
            ship_window_end,
        }
    }

    /// A window with neither bound imposes nothing on a shipment.
    pub fn is_unbounded(&self) -> bool {
        self.ship_window_start.is_none() && self.ship_window_end.is_none()
    }
}

/// Collection Metadata Provider: ship window lookup per collection.
///
/// Lookups are synchronous; callers resolve metadata before planning starts.
pub trait WindowProvider {
    fn get_window(&self, collection_id: &CollectionId) -> Option<CollectionWindow>;
}

impl<P> WindowProvider for &P
where
    P: WindowProvider + ?Sized,
{
    fn get_window(&self, collection_id: &CollectionId) -> Option<CollectionWindow> {
        (**self).get_window(collection_id)
    }
}

impl<P> WindowProvider for Arc<P>
where
    P: WindowProvider + ?Sized,
{
    fn get_window(&self, collection_id: &CollectionId) -> Option<CollectionWindow> {
        (**self).get_window(collection_id)
    }
}

/// In-memory collection catalog.
#[derive(Debug, Clone, Default)]
pub struct CollectionCatalog {
    windows: HashMap<CollectionId, CollectionWindow>,
}

impl CollectionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, window: CollectionWindow) -> Self {
        self.upsert(window);
        self
    }

    /// Insert or replace the window of a collection.
    pub fn upsert(&mut self, window: CollectionWindow) {
        self.windows.insert(window.collection_id.clone(), window);
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl WindowProvider for CollectionCatalog {
    fn get_window(&self, collection_id: &CollectionId) -> Option<CollectionWindow> {
        self.windows.get(collection_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    #[test]
    fn catalog_upsert_replaces_existing_window() {
        let mut catalog = CollectionCatalog::new()
            .with_window(CollectionWindow::new("A", "Spring", Some(date(3, 1)), Some(date(3, 15))));
        catalog.upsert(CollectionWindow::new("A", "Spring", Some(date(4, 1)), None));

        let window = catalog.get_window(&CollectionId::new("A")).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(window.ship_window_start, Some(date(4, 1)));
        assert_eq!(window.ship_window_end, None);
    }

    #[test]
    fn unknown_collection_has_no_window() {
        let catalog = CollectionCatalog::new();
        assert!(catalog.get_window(&CollectionId::new("missing")).is_none());
        assert!(catalog.is_empty());
    }

    #[test]
    fn unbounded_window_detection() {
        assert!(CollectionWindow::new("A", "A", None, None).is_unbounded());
        assert!(!CollectionWindow::new("A", "A", Some(date(1, 1)), None).is_unbounded());
    }
}
