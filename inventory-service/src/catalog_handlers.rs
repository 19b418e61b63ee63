//! Item and warehouse registries. Creation endpoints seed zero-quantity stock
//! rows across the tenant inside the same transaction, and item creation can
//! record initial-stock movements through the open transaction, so a failure
//! anywhere unwinds the whole composite operation.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use common_http_errors::ApiError;
use serde::{Deserialize, Serialize};
use sqlx::{query, query_as, query_scalar, PgConnection, Row};
use uuid::Uuid;

use crate::ledger::{ensure_stock_row, record_movement_tx, MovementInput, MovementKind};
use crate::movement_handlers::map_ledger_error;
use crate::tenant::{actor_id_from_headers, tenant_id_from_headers};
use crate::AppState;

const ITEM_CODE_PREFIX: &str = "INS-";

#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct Warehouse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub description: String,
    pub unit: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewWarehouse {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InitialStock {
    pub warehouse_id: Uuid,
    pub quantity: f64,
}

#[derive(Debug, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub unit: String,
    #[serde(default)]
    pub low_threshold: f64,
    #[serde(default)]
    pub critical_threshold: f64,
    #[serde(default)]
    pub initial_stock: Vec<InitialStock>,
}

pub(crate) fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

// Locks the tenant's latest item row so two in-flight creations serialize on
// the code sequence instead of colliding on the unique (tenant_id, code) key.
const LAST_ITEM_CODE_SQL: &str = "SELECT code FROM inventory_items WHERE tenant_id = $1 AND code LIKE 'INS-%' ORDER BY created_at DESC LIMIT 1 FOR UPDATE";

/// Sequential per-tenant item codes: INS-0001, INS-0002, ...
async fn next_item_code(conn: &mut PgConnection, tenant_id: Uuid) -> Result<String, sqlx::Error> {
    let last: Option<String> = query_scalar(LAST_ITEM_CODE_SQL)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?;
    let current = last
        .as_deref()
        .and_then(|code| code.strip_prefix(ITEM_CODE_PREFIX))
        .and_then(|suffix| suffix.parse::<u32>().ok())
        .unwrap_or(0);
    Ok(format!("{ITEM_CODE_PREFIX}{:04}", current + 1))
}

pub async fn create_warehouse(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewWarehouse>,
) -> Result<Json<Warehouse>, ApiError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    let Some(name) = non_empty(&payload.name) else {
        return Err(ApiError::bad_request("missing_name", None));
    };
    let description = payload.description.as_deref().and_then(non_empty);

    let mut tx = state.db.begin().await.map_err(|e| ApiError::internal(e, None))?;

    let warehouse = query_as::<_, Warehouse>(
        "INSERT INTO warehouses (id, tenant_id, name, description) VALUES ($1, $2, $3, $4) RETURNING id, tenant_id, name, description, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(name)
    .bind(description)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ApiError::internal(e, None))?;

    // Every existing item of the tenant gets a zero row in the new warehouse.
    let item_ids = query("SELECT id FROM inventory_items WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| ApiError::internal(e, None))?;
    for row in item_ids {
        let item_id: Uuid = row.get("id");
        ensure_stock_row(&mut *tx, warehouse.id, item_id)
            .await
            .map_err(|e| ApiError::internal(e, None))?;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, None))?;
    tracing::info!(tenant_id = %tenant_id, warehouse_id = %warehouse.id, "Warehouse created");
    Ok(Json(warehouse))
}

pub async fn list_warehouses(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Warehouse>>, ApiError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    let warehouses = query_as::<_, Warehouse>(
        "SELECT id, tenant_id, name, description, created_at FROM warehouses WHERE tenant_id = $1 ORDER BY name",
    )
    .bind(tenant_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::internal(e, None))?;
    Ok(Json(warehouses))
}

pub async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewItem>,
) -> Result<Json<InventoryItem>, ApiError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    let (Some(name), Some(description), Some(unit)) = (
        non_empty(&payload.name),
        non_empty(&payload.description),
        non_empty(&payload.unit),
    ) else {
        return Err(ApiError::bad_request("missing_fields", None));
    };
    if !payload.low_threshold.is_finite() || !payload.critical_threshold.is_finite() {
        return Err(ApiError::bad_request("invalid_threshold", None));
    }
    let low_threshold = payload.low_threshold.max(0.0);
    let critical_threshold = payload.critical_threshold.max(0.0);

    let mut tx = state.db.begin().await.map_err(|e| ApiError::internal(e, None))?;

    let code = next_item_code(&mut *tx, tenant_id)
        .await
        .map_err(|e| ApiError::internal(e, None))?;

    let item = query_as::<_, InventoryItem>(
        "INSERT INTO inventory_items (id, tenant_id, code, name, description, unit) VALUES ($1, $2, $3, $4, $5, $6) RETURNING id, tenant_id, code, name, description, unit, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(&code)
    .bind(name)
    .bind(description)
    .bind(unit)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ApiError::internal(e, None))?;

    // Seed a zero row with the item's thresholds in every existing warehouse.
    let warehouse_ids = query("SELECT id FROM warehouses WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| ApiError::internal(e, None))?;
    for row in warehouse_ids {
        let warehouse_id: Uuid = row.get("id");
        query(
            "INSERT INTO warehouse_stock (warehouse_id, item_id, quantity, low_threshold, critical_threshold) VALUES ($1, $2, 0, $3, $4) ON CONFLICT (warehouse_id, item_id) DO NOTHING",
        )
        .bind(warehouse_id)
        .bind(item.id)
        .bind(low_threshold)
        .bind(critical_threshold)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApiError::internal(e, None))?;
    }

    // Initial stock arrives as ordinary income movements recorded through the
    // open transaction; a rejected entry rolls the item creation back too.
    let created_by_user_id = actor_id_from_headers(&headers);
    for entry in &payload.initial_stock {
        let input = MovementInput {
            tenant_id,
            kind: MovementKind::Income,
            item_id: item.id,
            quantity: entry.quantity,
            source_warehouse_id: None,
            destination_warehouse_id: Some(entry.warehouse_id),
            reference_task_id: None,
            note: Some(format!("Initial stock for {code}")),
            created_by_user_id,
        };
        record_movement_tx(&mut *tx, &input)
            .await
            .map_err(map_ledger_error)?;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, None))?;
    tracing::info!(tenant_id = %tenant_id, item_id = %item.id, code = %item.code, "Inventory item created");
    Ok(Json(item))
}

pub async fn list_items(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<InventoryItem>>, ApiError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    let items = query_as::<_, InventoryItem>(
        "SELECT id, tenant_id, code, name, description, unit, created_at FROM inventory_items WHERE tenant_id = $1 ORDER BY code",
    )
    .bind(tenant_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::internal(e, None))?;
    Ok(Json(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_trims_and_rejects_blank() {
        assert_eq!(non_empty("  Urea  "), Some("Urea"));
        assert_eq!(non_empty("   "), None);
        assert_eq!(non_empty(""), None);
    }

    #[test]
    fn code_sequence_read_takes_a_row_lock() {
        assert!(LAST_ITEM_CODE_SQL.contains("WHERE tenant_id = $1"));
        assert!(LAST_ITEM_CODE_SQL.ends_with("FOR UPDATE"));
    }

    #[test]
    fn item_code_formatting_pads_to_four_digits() {
        assert_eq!(format!("{ITEM_CODE_PREFIX}{:04}", 1), "INS-0001");
        assert_eq!(format!("{ITEM_CODE_PREFIX}{:04}", 42), "INS-0042");
        assert_eq!(format!("{ITEM_CODE_PREFIX}{:04}", 10000), "INS-10000");
    }
}
