//! Order Persistence Adapter.
//!
//! Translates between shipment plans and order service records:
//!
//! - **commit**: every finalized shipment becomes an explicit planned-shipment
//!   record; every line becomes an item carrying its shipment id and a group
//!   marker (the grouping key of the shipment it originally came from), so the
//!   grouping can be rebuilt without re-deriving it from collection metadata.
//! - **reconstruct**: rebuilds the plan of a submitted order from those
//!   records. Items attached to no shipment are regrouped by collection. The
//!   order must exist and be editable, before and after the records are read.
//!
//! Ship-window bounds always come from the current window provider; grouping
//! and planned dates always come from the persisted records.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use shipplan_core::{AggregateRoot, DomainError, OrderId, OrderItemId, PlannedShipmentId};
use shipplan_planning::{
    aggregate, CartLine, CollectionId, CollectionRef, GroupKey, Origin, PlanningError,
    ShipmentGroup, ShipmentId, ShipmentPlan, ShipmentValidation, WindowProvider,
    UNCONSTRAINED_NAME,
};

use crate::order_service::{
    CommitRequest, OrderHeader, OrderItemRecord, OrderService, OrderServiceError,
    PlannedShipmentRecord,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Submission refused before any I/O; the plan is unchanged.
    #[error("{} shipment(s) failed validation", .0.len())]
    ValidationFailed(Vec<ShipmentValidation>),

    /// The order vanished, became immutable, or moved on. Terminal for the session.
    #[error("order {order_id} can no longer be edited: {reason}")]
    StaleEditState { order_id: OrderId, reason: String },

    /// Nothing was persisted.
    #[error("persistence failure: {message}")]
    PersistenceFailure { message: String, retryable: bool },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl AdapterError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterError::PersistenceFailure { retryable: true, .. })
    }

    fn from_service(order_id: OrderId, err: OrderServiceError) -> Self {
        match err {
            OrderServiceError::NotFound(_)
            | OrderServiceError::NotEditable { .. }
            | OrderServiceError::Concurrency(_) => AdapterError::StaleEditState {
                order_id,
                reason: err.to_string(),
            },
            OrderServiceError::Storage(message) => AdapterError::PersistenceFailure {
                message,
                retryable: false,
            },
            OrderServiceError::Unavailable(message) => AdapterError::PersistenceFailure {
                message,
                retryable: true,
            },
        }
    }
}

fn log_stale(err: &AdapterError) {
    if let AdapterError::StaleEditState { order_id, reason } = err {
        warn!(order_id = %order_id, reason = %reason, "stale edit state");
    }
}

/// Shipment record created or updated by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedShipment {
    /// Id the shipment had in the plan (draft or persisted).
    pub shipment_id: ShipmentId,
    pub planned_shipment_id: PlannedShipmentId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedPlan {
    pub order_ids: Vec<OrderId>,
    /// Order version after the commit.
    pub version: u64,
    pub shipments: Vec<CommittedShipment>,
}

const ORIGIN_SLOT_SEPARATOR: char = '#';

pub struct OrderPersistenceAdapter<S, P> {
    service: S,
    windows: P,
}

impl<S, P> OrderPersistenceAdapter<S, P>
where
    S: OrderService,
    P: WindowProvider + Send + Sync,
{
    pub fn new(service: S, windows: P) -> Self {
        Self { service, windows }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Submit a plan. A cart creates a new order; an edit session replaces the
    /// shipments of the order it was reconstructed from.
    #[instrument(
        skip(self, plan),
        fields(order_id = ?plan.order_id(), shipment_count = plan.groups().len()),
        err
    )]
    pub async fn commit(&self, plan: &ShipmentPlan) -> Result<CommittedPlan, AdapterError> {
        plan.ensure_submittable().map_err(|err| match err {
            PlanningError::Validation(failures) => AdapterError::ValidationFailed(failures),
            PlanningError::Domain(err) => AdapterError::Domain(err),
            other => AdapterError::Domain(DomainError::invariant(other.to_string())),
        })?;

        let editing = plan.order_id();
        let order_id = editing.unwrap_or_else(OrderId::new);
        let (request, shipments) = build_commit_request(order_id, plan);

        let receipt = self
            .service
            .commit_order(request)
            .await
            .map_err(|err| match (editing, err) {
                // A fresh order id collided; trying again picks another one.
                (None, OrderServiceError::Concurrency(message)) => {
                    AdapterError::PersistenceFailure {
                        message,
                        retryable: true,
                    }
                }
                (_, err) => AdapterError::from_service(order_id, err),
            })
            .inspect_err(log_stale)?;

        info!(
            order_id = %order_id,
            version = receipt.version,
            shipment_count = shipments.len(),
            "order committed"
        );
        Ok(CommittedPlan {
            order_ids: receipt.order_ids,
            version: receipt.version,
            shipments,
        })
    }

    /// Reopen a submitted order for editing.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn reconstruct(&self, order_id: OrderId) -> Result<ShipmentPlan, AdapterError> {
        self.reconstruct_checked(order_id).await.inspect_err(log_stale)
    }

    async fn reconstruct_checked(&self, order_id: OrderId) -> Result<ShipmentPlan, AdapterError> {
        let header = self.load_editable(order_id).await?;

        let records = self
            .service
            .load_planned_shipments(order_id)
            .await
            .map_err(|err| AdapterError::from_service(order_id, err))?;
        let items = self
            .service
            .load_order_items(order_id)
            .await
            .map_err(|err| AdapterError::from_service(order_id, err))?;

        let groups = self.rebuild_groups(&records, &items)?;

        // No cache: the order is re-read, and must not have moved in between.
        let current = self.load_editable(order_id).await?;
        if current.version() != header.version() {
            return Err(AdapterError::StaleEditState {
                order_id,
                reason: format!(
                    "order changed while loading (version {} -> {})",
                    header.version(),
                    current.version()
                ),
            });
        }

        debug!(
            order_id = %order_id,
            version = header.version(),
            shipment_count = groups.len(),
            "order reconstructed"
        );
        Ok(ShipmentPlan::for_order(order_id, header.version(), groups))
    }

    async fn load_editable(&self, order_id: OrderId) -> Result<OrderHeader, AdapterError> {
        let header = self
            .service
            .load_order(order_id)
            .await
            .map_err(|err| AdapterError::from_service(order_id, err))?;
        if !header.status.is_editable() {
            return Err(AdapterError::StaleEditState {
                order_id,
                reason: format!("order is {}", header.status.as_str()),
            });
        }
        Ok(header)
    }

    fn rebuild_groups(
        &self,
        records: &[PlannedShipmentRecord],
        items: &[OrderItemRecord],
    ) -> Result<Vec<ShipmentGroup>, AdapterError> {
        let index: HashMap<OrderItemId, &OrderItemRecord> =
            items.iter().map(|i| (i.id, i)).collect();
        let mut claimed: HashSet<OrderItemId> = HashSet::new();
        let mut groups = Vec::with_capacity(records.len() + 1);

        for record in records {
            let attached: Vec<&OrderItemRecord> = record
                .item_ids
                .iter()
                .filter_map(|id| index.get(id).copied())
                .filter(|item| claimed.insert(item.id))
                .collect();
            if attached.len() != record.item_ids.len() {
                warn!(
                    shipment_id = %record.id,
                    listed = record.item_ids.len(),
                    found = attached.len(),
                    "planned shipment lists missing or duplicate items"
                );
            }
            groups.push(self.rebuild_group(record, &attached)?);
        }

        let unattached: Vec<CartLine> = items
            .iter()
            .filter(|item| !claimed.contains(&item.id))
            .map(item_to_line)
            .collect();
        if !unattached.is_empty() {
            debug!(
                item_count = unattached.len(),
                "items without a planned shipment, grouping by collection"
            );
            groups.extend(aggregate(unattached, &self.windows)?.groups);
        }

        Ok(groups)
    }

    fn rebuild_group(
        &self,
        record: &PlannedShipmentRecord,
        attached: &[&OrderItemRecord],
    ) -> Result<ShipmentGroup, AdapterError> {
        let id = ShipmentId::Persisted(record.id);

        // One part per distinct group marker, in first-appearance order.
        let mut parts: Vec<(String, Origin, Vec<CartLine>)> = Vec::new();
        for item in attached {
            let line = item_to_line(item);
            let persisted = item
                .group_marker
                .as_deref()
                .and_then(|marker| parse_marker(marker).map(|key| (marker.to_string(), key)));
            let (marker, key) = persisted.unwrap_or_else(|| {
                let key = line.grouping_key();
                (key.to_string(), key)
            });
            match parts.iter_mut().find(|(m, _, _)| *m == marker) {
                Some((_, _, lines)) => lines.push(line),
                None => {
                    let name = line.collection.as_ref().map(|c| c.name.as_str());
                    let origin = self.origin_for(&key, name);
                    parts.push((marker, origin, vec![line]));
                }
            }
        }

        let group = if parts.len() >= 2 {
            let parts = parts
                .into_iter()
                .map(|(_, origin, lines)| (origin, lines))
                .collect();
            ShipmentGroup::rebuild_combined(id, record.collection_name.clone(), parts)?
        } else {
            match (parts.pop(), &record.collection_id) {
                (part, Some(collection_id)) => {
                    let lines = part.map(|(_, _, lines)| lines).unwrap_or_default();
                    self.collection_group(id, record, collection_id, lines)
                }
                // A combination with a single surviving origin keeps that origin's window.
                (Some((_, origin, lines)), None) => {
                    ShipmentGroup::from_origin(&origin, lines).with_id(id)
                }
                (None, None) => ShipmentGroup::unconstrained(id, Vec::new()),
            }
        };

        Ok(group.with_planned_dates(record.planned_ship_start, record.planned_ship_end))
    }

    fn collection_group(
        &self,
        id: ShipmentId,
        record: &PlannedShipmentRecord,
        collection_id: &CollectionId,
        lines: Vec<CartLine>,
    ) -> ShipmentGroup {
        let window = self.windows.get_window(collection_id);
        let collection = CollectionRef {
            id: collection_id.clone(),
            name: record.collection_name.clone(),
        };
        ShipmentGroup::for_collection(id, collection, window.as_ref(), lines)
    }

    /// Origin record for one part of a reconstructed combination.
    fn origin_for(&self, key: &GroupKey, name_hint: Option<&str>) -> Origin {
        let Some(collection_id) = key.collection_id() else {
            return Origin {
                shipment_id: ShipmentId::new_draft(),
                collection_id: None,
                collection_name: UNCONSTRAINED_NAME.to_string(),
                min_allowed_start: None,
                min_allowed_end: None,
            };
        };
        let window = self.windows.get_window(collection_id);
        let collection_name = window
            .as_ref()
            .map(|w| w.name.clone())
            .or_else(|| name_hint.map(str::to_string))
            .unwrap_or_else(|| collection_id.to_string());
        Origin {
            shipment_id: ShipmentId::new_draft(),
            collection_id: Some(collection_id.clone()),
            collection_name,
            min_allowed_start: window.as_ref().and_then(|w| w.ship_window_start),
            min_allowed_end: window.as_ref().and_then(|w| w.ship_window_end),
        }
    }
}

/// Group marker of a line in a combined shipment: the origin's grouping key
/// plus its slot, so two origins of the same collection stay apart.
fn origin_marker(key: &GroupKey, slot: usize) -> String {
    format!("{key}{ORIGIN_SLOT_SEPARATOR}{slot}")
}

/// Grouping key carried by a persisted marker, with or without a slot.
fn parse_marker(marker: &str) -> Option<GroupKey> {
    let key = marker
        .split_once(ORIGIN_SLOT_SEPARATOR)
        .map_or(marker, |(key, _)| key);
    GroupKey::parse(key)
}

fn item_to_line(item: &OrderItemRecord) -> CartLine {
    let line = CartLine::new(
        item.sku.clone(),
        item.description.clone(),
        item.quantity,
        item.unit_price,
    )
    .with_item_id(item.id);
    match &item.collection_id {
        Some(collection_id) => line.in_collection(CollectionRef {
            id: collection_id.clone(),
            name: item
                .collection_name
                .clone()
                .unwrap_or_else(|| collection_id.to_string()),
        }),
        None => line,
    }
}

/// Records for a commit, plus the plan-id to record-id mapping.
fn build_commit_request(
    order_id: OrderId,
    plan: &ShipmentPlan,
) -> (CommitRequest, Vec<CommittedShipment>) {
    let mut shipments = Vec::with_capacity(plan.groups().len());
    let mut items = Vec::with_capacity(plan.line_count());
    let mut committed = Vec::with_capacity(plan.groups().len());

    for group in plan.groups() {
        let record_id = group
            .id_typed()
            .as_persisted()
            .unwrap_or_else(PlannedShipmentId::new);
        let origin_markers: HashMap<ShipmentId, String> = group
            .origins()
            .iter()
            .enumerate()
            .map(|(slot, o)| (o.shipment_id, origin_marker(&o.key(), slot)))
            .collect();
        let own_marker = group.grouping_key().map(|k| k.to_string());

        let mut item_ids = Vec::with_capacity(group.lines().len());
        for line in group.lines() {
            let item_id = line.item_id.unwrap_or_else(OrderItemId::new);
            let group_marker = line
                .origin
                .and_then(|tag| origin_markers.get(&tag).cloned())
                .or_else(|| own_marker.clone());
            items.push(OrderItemRecord {
                id: item_id,
                sku: line.sku.clone(),
                description: line.description.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                collection_id: line.collection.as_ref().map(|c| c.id.clone()),
                collection_name: line.collection.as_ref().map(|c| c.name.clone()),
                planned_shipment_id: Some(record_id),
                group_marker,
            });
            item_ids.push(item_id);
        }

        shipments.push(PlannedShipmentRecord {
            id: record_id,
            collection_id: group.collection_id().cloned(),
            collection_name: group.collection_name().to_string(),
            planned_ship_start: group.planned_ship_start(),
            planned_ship_end: group.planned_ship_end(),
            item_ids,
        });
        committed.push(CommittedShipment {
            shipment_id: group.id_typed(),
            planned_shipment_id: record_id,
        });
    }

    let request = CommitRequest {
        order_id,
        expected_version: plan.expected_version(),
        shipments,
        items,
    };
    (request, committed)
}
