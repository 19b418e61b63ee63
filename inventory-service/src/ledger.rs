//! The stock ledger core: movement validation, stock row mutation, and the
//! append-only movement record. Everything here runs against a caller-supplied
//! transactional connection so composite flows (e.g. item creation seeding
//! initial stock) share one commit with standalone movement recording.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{query, query_as, PgConnection, PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Income,
    Consumption,
    Transfer,
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Income => "INCOME",
            MovementKind::Consumption => "CONSUMPTION",
            MovementKind::Transfer => "TRANSFER",
            MovementKind::Adjustment => "ADJUSTMENT",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "INCOME" => Some(MovementKind::Income),
            "CONSUMPTION" => Some(MovementKind::Consumption),
            "TRANSFER" => Some(MovementKind::Transfer),
            "ADJUSTMENT" => Some(MovementKind::Adjustment),
            _ => None,
        }
    }
}

/// One proposed stock change. `tenant_id` is trusted as already authenticated;
/// the referenced item and warehouses are still resolved against it before
/// anything is written.
#[derive(Debug, Clone)]
pub struct MovementInput {
    pub tenant_id: Uuid,
    pub kind: MovementKind,
    pub item_id: Uuid,
    pub quantity: f64,
    pub source_warehouse_id: Option<Uuid>,
    pub destination_warehouse_id: Option<Uuid>,
    pub reference_task_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_by_user_id: Option<Uuid>,
}

/// Persisted ledger entry. Never updated or deleted once written.
#[derive(Debug, Clone, Serialize)]
pub struct Movement {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: MovementKind,
    pub item_id: Uuid,
    pub quantity: f64,
    pub source_warehouse_id: Option<Uuid>,
    pub destination_warehouse_id: Option<Uuid>,
    pub reference_task_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_by_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for Movement {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let kind_raw: String = row.try_get("kind")?;
        let kind = MovementKind::from_str(&kind_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "kind".into(),
            source: format!("unrecognized movement kind: {kind_raw}").into(),
        })?;
        Ok(Movement {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            kind,
            item_id: row.try_get("item_id")?,
            quantity: row.try_get("quantity")?,
            source_warehouse_id: row.try_get("source_warehouse_id")?,
            destination_warehouse_id: row.try_get("destination_warehouse_id")?,
            reference_task_id: row.try_get("reference_task_id")?,
            note: row.try_get("note")?,
            created_by_user_id: row.try_get("created_by_user_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct StockRow {
    pub warehouse_id: Uuid,
    pub item_id: Uuid,
    pub quantity: f64,
    pub low_threshold: f64,
    pub critical_threshold: f64,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("movement quantity must be a positive, finite number")]
    InvalidQuantity,
    #[error("item does not exist in the requesting tenant")]
    UnknownItem,
    #[error("warehouse does not exist in the requesting tenant")]
    UnknownWarehouse,
    #[error("movement is missing a required source or destination warehouse")]
    MissingEndpoint,
    #[error("transfer source and destination warehouses must differ")]
    SameWarehouseTransfer,
    #[error("insufficient stock: {available} on hand, {requested} requested")]
    InsufficientStock { available: f64, requested: f64 },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl LedgerError {
    /// Stable code carried on the wire as `X-Error-Code` and used as the
    /// rejection metric label.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidQuantity => "invalid_quantity",
            LedgerError::UnknownItem => "unknown_item",
            LedgerError::UnknownWarehouse => "unknown_warehouse",
            LedgerError::MissingEndpoint => "missing_endpoint",
            LedgerError::SameWarehouseTransfer => "same_warehouse_transfer",
            LedgerError::InsufficientStock { .. } => "insufficient_stock",
            LedgerError::Db(_) => "internal_error",
        }
    }
}

const ENSURE_STOCK_ROW_INSERT_SQL: &str = "INSERT INTO warehouse_stock (warehouse_id, item_id, quantity, low_threshold, critical_threshold) VALUES ($1, $2, 0, 0, 0) ON CONFLICT (warehouse_id, item_id) DO NOTHING";

const ENSURE_STOCK_ROW_LOCK_SQL: &str = "SELECT warehouse_id, item_id, quantity, low_threshold, critical_threshold FROM warehouse_stock WHERE warehouse_id = $1 AND item_id = $2 FOR UPDATE";

/// Get-or-create the stock row for a (warehouse, item) pair and lock it for
/// the remainder of the surrounding transaction. The insert is a no-op under
/// concurrent first access thanks to the composite primary key, so repeated
/// calls never create duplicates. Tenant ownership is the caller's problem.
pub async fn ensure_stock_row(
    conn: &mut PgConnection,
    warehouse_id: Uuid,
    item_id: Uuid,
) -> Result<StockRow, sqlx::Error> {
    query(ENSURE_STOCK_ROW_INSERT_SQL)
        .bind(warehouse_id)
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
    query_as::<_, StockRow>(ENSURE_STOCK_ROW_LOCK_SQL)
        .bind(warehouse_id)
        .bind(item_id)
        .fetch_one(&mut *conn)
        .await
}

/// Structural requirements per movement kind, checked before any row is
/// touched.
pub fn validate_endpoints(
    kind: MovementKind,
    source: Option<Uuid>,
    destination: Option<Uuid>,
) -> Result<(), LedgerError> {
    match kind {
        MovementKind::Income => {
            if destination.is_none() {
                return Err(LedgerError::MissingEndpoint);
            }
        }
        MovementKind::Consumption => {
            if source.is_none() {
                return Err(LedgerError::MissingEndpoint);
            }
        }
        MovementKind::Transfer => {
            let (Some(src), Some(dst)) = (source, destination) else {
                return Err(LedgerError::MissingEndpoint);
            };
            if src == dst {
                return Err(LedgerError::SameWarehouseTransfer);
            }
        }
        MovementKind::Adjustment => {
            if source.is_none() && destination.is_none() {
                return Err(LedgerError::MissingEndpoint);
            }
        }
    }
    Ok(())
}

async fn resolve_warehouse(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    warehouse_id: Option<Uuid>,
) -> Result<Option<Uuid>, LedgerError> {
    let Some(warehouse_id) = warehouse_id else {
        return Ok(None);
    };
    let found = query("SELECT id FROM warehouses WHERE id = $1 AND tenant_id = $2")
        .bind(warehouse_id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?;
    match found {
        // Missing and cross-tenant are deliberately the same error.
        None => Err(LedgerError::UnknownWarehouse),
        Some(_) => Ok(Some(warehouse_id)),
    }
}

/// Increment one stock row, creating it at zero first if absent. The
/// arithmetic happens in the database, never in the caller.
async fn add_stock(
    conn: &mut PgConnection,
    warehouse_id: Uuid,
    item_id: Uuid,
    quantity: f64,
) -> Result<(), LedgerError> {
    ensure_stock_row(&mut *conn, warehouse_id, item_id).await?;
    query("UPDATE warehouse_stock SET quantity = quantity + $1, updated_at = NOW() WHERE warehouse_id = $2 AND item_id = $3")
        .bind(quantity)
        .bind(warehouse_id)
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Decrement one stock row after a sufficiency check. `ensure_stock_row`
/// leaves the row locked, so check-then-decrement is atomic with respect to
/// concurrent movements against the same pair.
async fn remove_stock(
    conn: &mut PgConnection,
    warehouse_id: Uuid,
    item_id: Uuid,
    quantity: f64,
) -> Result<(), LedgerError> {
    let row = ensure_stock_row(&mut *conn, warehouse_id, item_id).await?;
    if row.quantity < quantity {
        return Err(LedgerError::InsufficientStock {
            available: row.quantity,
            requested: quantity,
        });
    }
    query("UPDATE warehouse_stock SET quantity = quantity - $1, updated_at = NOW() WHERE warehouse_id = $2 AND item_id = $3")
        .bind(quantity)
        .bind(warehouse_id)
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(crate) const INSERT_MOVEMENT_SQL: &str = "INSERT INTO inventory_movements (id, tenant_id, kind, item_id, quantity, source_warehouse_id, destination_warehouse_id, reference_task_id, note, created_by_user_id) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id, tenant_id, kind, item_id, quantity, source_warehouse_id, destination_warehouse_id, reference_task_id, note, created_by_user_id, created_at";

/// Validate and apply one movement through an already-open transactional
/// handle. Composite flows pass `&mut *tx` so their other writes commit (or
/// roll back) together with the ledger entry; nothing here commits.
///
/// Every rejection happens before the movement record is written, and the
/// caller abandoning the transaction on error unwinds any row mutations, so
/// failures leave no trace. The call is not idempotent: recording the same
/// input twice double-applies it.
pub async fn record_movement_tx(
    conn: &mut PgConnection,
    input: &MovementInput,
) -> Result<Movement, LedgerError> {
    if !input.quantity.is_finite() || input.quantity <= 0.0 {
        return Err(LedgerError::InvalidQuantity);
    }

    let item = query("SELECT id FROM inventory_items WHERE id = $1 AND tenant_id = $2")
        .bind(input.item_id)
        .bind(input.tenant_id)
        .fetch_optional(&mut *conn)
        .await?;
    if item.is_none() {
        return Err(LedgerError::UnknownItem);
    }

    let source = resolve_warehouse(&mut *conn, input.tenant_id, input.source_warehouse_id).await?;
    let destination =
        resolve_warehouse(&mut *conn, input.tenant_id, input.destination_warehouse_id).await?;

    validate_endpoints(input.kind, source, destination)?;

    match input.kind {
        MovementKind::Income => {
            let Some(dst) = destination else {
                return Err(LedgerError::MissingEndpoint);
            };
            add_stock(&mut *conn, dst, input.item_id, input.quantity).await?;
        }
        MovementKind::Consumption => {
            let Some(src) = source else {
                return Err(LedgerError::MissingEndpoint);
            };
            remove_stock(&mut *conn, src, input.item_id, input.quantity).await?;
        }
        MovementKind::Transfer => {
            let (Some(src), Some(dst)) = (source, destination) else {
                return Err(LedgerError::MissingEndpoint);
            };
            remove_stock(&mut *conn, src, input.item_id, input.quantity).await?;
            add_stock(&mut *conn, dst, input.item_id, input.quantity).await?;
        }
        MovementKind::Adjustment => {
            // Both sides allowed: an adjustment may remove from one warehouse
            // and add to another in a single record (correction-transfer).
            if let Some(src) = source {
                remove_stock(&mut *conn, src, input.item_id, input.quantity).await?;
            }
            if let Some(dst) = destination {
                add_stock(&mut *conn, dst, input.item_id, input.quantity).await?;
            }
        }
    }

    // The record carries the resolved warehouse ids, not the caller-supplied
    // ones, so the ledger can never reference entities outside the tenant.
    let movement = query_as::<_, Movement>(INSERT_MOVEMENT_SQL)
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.kind.as_str())
        .bind(input.item_id)
        .bind(input.quantity)
        .bind(source)
        .bind(destination)
        .bind(input.reference_task_id)
        .bind(input.note.as_deref())
        .bind(input.created_by_user_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(movement)
}

/// Standalone entry point: opens its own transaction, records the movement,
/// and commits. On any error the transaction is dropped, which rolls back
/// every partial write before the error propagates.
pub async fn record_movement(pool: &PgPool, input: &MovementInput) -> Result<Movement, LedgerError> {
    let mut tx = pool.begin().await?;
    let movement = record_movement_tx(&mut *tx, input).await?;
    tx.commit().await?;
    Ok(movement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wid() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn income_requires_destination() {
        assert!(matches!(
            validate_endpoints(MovementKind::Income, Some(wid()), None),
            Err(LedgerError::MissingEndpoint)
        ));
        assert!(validate_endpoints(MovementKind::Income, None, Some(wid())).is_ok());
    }

    #[test]
    fn consumption_requires_source() {
        assert!(matches!(
            validate_endpoints(MovementKind::Consumption, None, Some(wid())),
            Err(LedgerError::MissingEndpoint)
        ));
        assert!(validate_endpoints(MovementKind::Consumption, Some(wid()), None).is_ok());
    }

    #[test]
    fn transfer_requires_two_distinct_warehouses() {
        let a = wid();
        let b = wid();
        assert!(matches!(
            validate_endpoints(MovementKind::Transfer, Some(a), None),
            Err(LedgerError::MissingEndpoint)
        ));
        assert!(matches!(
            validate_endpoints(MovementKind::Transfer, Some(a), Some(a)),
            Err(LedgerError::SameWarehouseTransfer)
        ));
        assert!(validate_endpoints(MovementKind::Transfer, Some(a), Some(b)).is_ok());
    }

    #[test]
    fn adjustment_requires_at_least_one_side() {
        let a = wid();
        assert!(matches!(
            validate_endpoints(MovementKind::Adjustment, None, None),
            Err(LedgerError::MissingEndpoint)
        ));
        assert!(validate_endpoints(MovementKind::Adjustment, Some(a), None).is_ok());
        assert!(validate_endpoints(MovementKind::Adjustment, None, Some(a)).is_ok());
        assert!(validate_endpoints(MovementKind::Adjustment, Some(a), Some(a)).is_ok());
    }

    #[test]
    fn movement_kind_round_trips_through_storage_form() {
        for kind in [
            MovementKind::Income,
            MovementKind::Consumption,
            MovementKind::Transfer,
            MovementKind::Adjustment,
        ] {
            assert_eq!(MovementKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(MovementKind::from_str("RESERVATION"), None);
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(LedgerError::InvalidQuantity.code(), "invalid_quantity");
        assert_eq!(LedgerError::UnknownItem.code(), "unknown_item");
        assert_eq!(LedgerError::UnknownWarehouse.code(), "unknown_warehouse");
        assert_eq!(LedgerError::MissingEndpoint.code(), "missing_endpoint");
        assert_eq!(
            LedgerError::SameWarehouseTransfer.code(),
            "same_warehouse_transfer"
        );
        assert_eq!(
            LedgerError::InsufficientStock { available: 1.0, requested: 2.0 }.code(),
            "insufficient_stock"
        );
    }

    #[test]
    fn ensure_stock_row_upsert_is_keyed_on_composite_identity() {
        assert!(ENSURE_STOCK_ROW_INSERT_SQL.contains("ON CONFLICT (warehouse_id, item_id) DO NOTHING"));
        assert!(ENSURE_STOCK_ROW_LOCK_SQL.ends_with("FOR UPDATE"));
    }
}
