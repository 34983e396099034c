//! Cart Aggregator: flat cart lines → initial shipment groups.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use shipplan_core::{DomainError, DomainResult};

use crate::group::{ShipmentGroup, ShipmentId};
use crate::line::{CartLine, GroupKey};
use crate::window::{CollectionRef, WindowProvider};

/// Result of aggregating a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub groups: Vec<ShipmentGroup>,
    /// More than one shipment will be created on submit. Informational only.
    pub will_split_order: bool,
}

/// Group cart lines by collection.
///
/// Groups come out in first-appearance order of their grouping key, and lines
/// keep their cart order inside each group.
pub fn aggregate<P>(lines: Vec<CartLine>, provider: &P) -> DomainResult<Aggregation>
where
    P: WindowProvider + ?Sized,
{
    if let Some(bad) = lines.iter().find(|l| l.quantity <= 0) {
        return Err(DomainError::validation(format!(
            "quantity must be positive (sku {})",
            bad.sku
        )));
    }

    let mut order: Vec<(GroupKey, Option<CollectionRef>, Vec<CartLine>)> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for line in lines {
        let key = line.grouping_key();
        match index.get(&key) {
            Some(&slot) => order[slot].2.push(line),
            None => {
                index.insert(key.clone(), order.len());
                let collection = line.collection.clone();
                order.push((key, collection, vec![line]));
            }
        }
    }

    let groups: Vec<ShipmentGroup> = order
        .into_iter()
        .map(|(key, collection, lines)| match collection {
            Some(collection) => {
                let window = provider.get_window(&collection.id);
                debug!(
                    group = %key,
                    lines = lines.len(),
                    has_window = window.is_some(),
                    "aggregated collection group"
                );
                ShipmentGroup::for_collection(
                    ShipmentId::new_draft(),
                    collection,
                    window.as_ref(),
                    lines,
                )
            }
            None => {
                debug!(group = %key, lines = lines.len(), "aggregated unconstrained group");
                ShipmentGroup::unconstrained(ShipmentId::new_draft(), lines)
            }
        })
        .collect();

    let will_split_order = groups.len() > 1;
    Ok(Aggregation {
        groups,
        will_split_order,
    })
}
