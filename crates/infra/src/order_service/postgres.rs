//! Postgres-backed order service.
//!
//! Schema lives in `migrations/0001_orders.sql`. A commit runs in one
//! transaction: lock the order row, check version and status, replace the
//! shipment and item rows, bump the version.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | OrderServiceError |
//! |------------|----------------------|-------------------|
//! | Database (unique violation) | `23505` | `Concurrency` |
//! | Database (connection class) | `08xxx` | `Unavailable` |
//! | Database (serialization / deadlock) | `40001`, `40P01` | `Unavailable` |
//! | Database (other) | Any other | `Storage` |
//! | PoolTimedOut / PoolClosed / Io | N/A | `Unavailable` |
//! | Other | N/A | `Storage` |

use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};

use shipplan_core::{OrderId, OrderItemId, PlannedShipmentId};
use shipplan_planning::CollectionId;

use super::r#trait::{
    check_commit_target, check_request, CommitReceipt, CommitRequest, OrderHeader, OrderItemRecord,
    OrderService, OrderServiceError, OrderStatus, PlannedShipmentRecord,
};

#[derive(Debug, Clone)]
pub struct PostgresOrderService {
    pool: Arc<PgPool>,
}

impl PostgresOrderService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(
        skip(self, request),
        fields(
            order_id = %request.order_id,
            expected_version = ?request.expected_version,
            shipment_count = request.shipments.len(),
            item_count = request.items.len()
        ),
        err
    )]
    async fn commit_in_tx(
        &self,
        request: CommitRequest,
    ) -> Result<CommitReceipt, OrderServiceError> {
        check_request(&request)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = lock_order(&mut tx, request.order_id).await?;
        if let Err(err) =
            check_commit_target(request.order_id, current.as_ref(), request.expected_version)
        {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(err);
        }

        let version = match current {
            Some(header) => {
                sqlx::query("UPDATE orders SET version = $2, updated_at = now() WHERE id = $1")
                    .bind(request.order_id.as_uuid())
                    .bind((header.version + 1) as i64)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("update_order", e))?;
                sqlx::query("DELETE FROM order_items WHERE order_id = $1")
                    .bind(request.order_id.as_uuid())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("delete_items", e))?;
                sqlx::query("DELETE FROM planned_shipments WHERE order_id = $1")
                    .bind(request.order_id.as_uuid())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("delete_shipments", e))?;
                header.version + 1
            }
            None => {
                sqlx::query("INSERT INTO orders (id, status, version) VALUES ($1, $2, 1)")
                    .bind(request.order_id.as_uuid())
                    .bind(OrderStatus::Submitted.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("insert_order", e))?;
                1
            }
        };

        for (position, shipment) in request.shipments.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO planned_shipments (
                    id,
                    order_id,
                    position,
                    collection_id,
                    collection_name,
                    planned_ship_start,
                    planned_ship_end
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(shipment.id.as_uuid())
            .bind(request.order_id.as_uuid())
            .bind(position as i32)
            .bind(shipment.collection_id.as_ref().map(|c| c.as_str()))
            .bind(&shipment.collection_name)
            .bind(shipment.planned_ship_start)
            .bind(shipment.planned_ship_end)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_shipment", e))?;
        }

        for (position, item) in request.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id,
                    order_id,
                    position,
                    sku,
                    description,
                    quantity,
                    unit_price,
                    collection_id,
                    collection_name,
                    planned_shipment_id,
                    group_marker
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(request.order_id.as_uuid())
            .bind(position as i32)
            .bind(&item.sku)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(i64::try_from(item.unit_price).unwrap_or(i64::MAX))
            .bind(item.collection_id.as_ref().map(|c| c.as_str()))
            .bind(item.collection_name.as_deref())
            .bind(item.planned_shipment_id.map(|id| *id.as_uuid()))
            .bind(item.group_marker.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_item", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("committed_version", version);
        Ok(CommitReceipt {
            order_ids: vec![request.order_id],
            version,
        })
    }

    async fn ensure_order_exists(&self, order_id: OrderId) -> Result<(), OrderServiceError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
            .bind(order_id.as_uuid())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("order_exists", e))?;
        if exists {
            Ok(())
        } else {
            Err(OrderServiceError::NotFound(order_id))
        }
    }
}

#[async_trait::async_trait]
impl OrderService for PostgresOrderService {
    async fn commit_order(
        &self,
        request: CommitRequest,
    ) -> Result<CommitReceipt, OrderServiceError> {
        self.commit_in_tx(request).await
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn load_order(&self, order_id: OrderId) -> Result<OrderHeader, OrderServiceError> {
        let row = sqlx::query("SELECT id, status, version FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_order", e))?
            .ok_or(OrderServiceError::NotFound(order_id))?;
        header_from_row(&row)
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn load_planned_shipments(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<PlannedShipmentRecord>, OrderServiceError> {
        self.ensure_order_exists(order_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT
                s.id,
                s.collection_id,
                s.collection_name,
                s.planned_ship_start,
                s.planned_ship_end,
                COALESCE(
                    ARRAY_AGG(i.id ORDER BY i.position) FILTER (WHERE i.id IS NOT NULL),
                    '{}'
                ) AS item_ids
            FROM planned_shipments s
            LEFT JOIN order_items i ON i.planned_shipment_id = s.id
            WHERE s.order_id = $1
            GROUP BY s.id
            ORDER BY s.position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_planned_shipments", e))?;

        let mut shipments = Vec::with_capacity(rows.len());
        for row in rows {
            let collection_id: Option<String> = row.try_get("collection_id").map_err(row_error)?;
            let item_ids: Vec<uuid::Uuid> = row.try_get("item_ids").map_err(row_error)?;
            let planned_ship_start: Option<NaiveDate> =
                row.try_get("planned_ship_start").map_err(row_error)?;
            let planned_ship_end: Option<NaiveDate> =
                row.try_get("planned_ship_end").map_err(row_error)?;
            shipments.push(PlannedShipmentRecord {
                id: PlannedShipmentId::from_uuid(row.try_get("id").map_err(row_error)?),
                collection_id: collection_id.map(CollectionId::new),
                collection_name: row.try_get("collection_name").map_err(row_error)?,
                planned_ship_start,
                planned_ship_end,
                item_ids: item_ids.into_iter().map(OrderItemId::from_uuid).collect(),
            });
        }

        Span::current().record("shipment_count", shipments.len());
        Ok(shipments)
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn load_order_items(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<OrderItemRecord>, OrderServiceError> {
        self.ensure_order_exists(order_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT
                id,
                sku,
                description,
                quantity,
                unit_price,
                collection_id,
                collection_name,
                planned_shipment_id,
                group_marker
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_order_items", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let collection_id: Option<String> = row.try_get("collection_id").map_err(row_error)?;
            let planned_shipment_id: Option<uuid::Uuid> =
                row.try_get("planned_shipment_id").map_err(row_error)?;
            let unit_price: i64 = row.try_get("unit_price").map_err(row_error)?;
            items.push(OrderItemRecord {
                id: OrderItemId::from_uuid(row.try_get("id").map_err(row_error)?),
                sku: row.try_get("sku").map_err(row_error)?,
                description: row.try_get("description").map_err(row_error)?,
                quantity: row.try_get("quantity").map_err(row_error)?,
                unit_price: u64::try_from(unit_price).unwrap_or(0),
                collection_id: collection_id.map(CollectionId::new),
                collection_name: row.try_get("collection_name").map_err(row_error)?,
                planned_shipment_id: planned_shipment_id.map(PlannedShipmentId::from_uuid),
                group_marker: row.try_get("group_marker").map_err(row_error)?,
            });
        }

        Span::current().record("item_count", items.len());
        Ok(items)
    }
}

/// Read the order header and lock its row for the rest of the transaction.
async fn lock_order(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> Result<Option<OrderHeader>, OrderServiceError> {
    let row = sqlx::query("SELECT id, status, version FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_order", e))?;
    row.as_ref().map(header_from_row).transpose()
}

fn header_from_row(row: &sqlx::postgres::PgRow) -> Result<OrderHeader, OrderServiceError> {
    let id: uuid::Uuid = row.try_get("id").map_err(row_error)?;
    let status: String = row.try_get("status").map_err(row_error)?;
    let version: i64 = row.try_get("version").map_err(row_error)?;
    Ok(OrderHeader {
        id: OrderId::from_uuid(id),
        status: OrderStatus::parse(&status)
            .ok_or_else(|| OrderServiceError::Storage(format!("unknown order status '{status}'")))?,
        version: version as u64,
    })
}

fn row_error(err: sqlx::Error) -> OrderServiceError {
    OrderServiceError::Storage(format!("failed to read row: {err}"))
}

/// Map SQLx errors to order service errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> OrderServiceError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => OrderServiceError::Concurrency(msg),
                Some("40001") | Some("40P01") => OrderServiceError::Unavailable(msg),
                Some(code) if code.starts_with("08") => OrderServiceError::Unavailable(msg),
                _ => OrderServiceError::Storage(msg),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            OrderServiceError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => {
            OrderServiceError::Unavailable(format!("io error in {operation}: {e}"))
        }
        other => OrderServiceError::Storage(format!("{operation}: {other}")),
    }
}
