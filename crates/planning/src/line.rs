//! Cart lines and their grouping keys.

use serde::{Deserialize, Serialize};

use shipplan_core::OrderItemId;

use crate::group::ShipmentId;
use crate::window::{CollectionId, CollectionRef};

/// One already-priced cart line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CartLine {
    pub sku: String,
    pub description: String,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub collection: Option<CollectionRef>,
    /// Persisted order item backing this line, once the order was submitted.
    pub item_id: Option<OrderItemId>,
    /// Shipment this line came from before it was combined into another one.
    pub origin: Option<ShipmentId>,
}

impl CartLine {
    pub fn new(
        sku: impl Into<String>,
        description: impl Into<String>,
        quantity: i64,
        unit_price: u64,
    ) -> Self {
        Self {
            sku: sku.into(),
            description: description.into(),
            quantity,
            unit_price,
            collection: None,
            item_id: None,
            origin: None,
        }
    }

    pub fn in_collection(mut self, collection: CollectionRef) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn with_item_id(mut self, item_id: OrderItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn collection_id(&self) -> Option<&CollectionId> {
        self.collection.as_ref().map(|c| &c.id)
    }

    pub fn line_total(&self) -> u64 {
        u64::try_from(self.quantity)
            .unwrap_or(0)
            .saturating_mul(self.unit_price)
    }

    pub fn grouping_key(&self) -> GroupKey {
        match self.collection_id() {
            Some(id) => GroupKey::Collection(id.clone()),
            None => GroupKey::Default,
        }
    }

    pub(crate) fn tagged(mut self, origin: ShipmentId) -> Self {
        if self.origin.is_none() {
            self.origin = Some(origin);
        }
        self
    }

    pub(crate) fn untagged(mut self) -> Self {
        self.origin = None;
        self
    }
}

/// Key lines are grouped by: `collection-{id}` or `default`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum GroupKey {
    Collection(CollectionId),
    Default,
}

const COLLECTION_PREFIX: &str = "collection-";
const DEFAULT_KEY: &str = "default";

impl GroupKey {
    /// Parse a persisted group marker.
    pub fn parse(marker: &str) -> Option<Self> {
        if marker == DEFAULT_KEY {
            return Some(Self::Default);
        }
        marker
            .strip_prefix(COLLECTION_PREFIX)
            .filter(|id| !id.is_empty())
            .map(|id| Self::Collection(CollectionId::new(id)))
    }

    pub fn collection_id(&self) -> Option<&CollectionId> {
        match self {
            GroupKey::Collection(id) => Some(id),
            GroupKey::Default => None,
        }
    }
}

impl core::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            GroupKey::Collection(id) => write!(f, "{COLLECTION_PREFIX}{id}"),
            GroupKey::Default => f.write_str(DEFAULT_KEY),
        }
    }
}

impl From<GroupKey> for String {
    fn from(value: GroupKey) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for GroupKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        GroupKey::parse(&value).ok_or_else(|| format!("invalid group marker: {value}"))
    }
}
