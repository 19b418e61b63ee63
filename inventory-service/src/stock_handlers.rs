use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use common_http_errors::ApiError;
use serde::{Deserialize, Serialize};
use sqlx::query_as;
use uuid::Uuid;

use crate::alerts::{resolve_alert_level, AlertLevel};
use crate::tenant::tenant_id_from_headers;
use crate::AppState;

pub(crate) const LIST_STOCK_SQL: &str = "SELECT ws.warehouse_id, w.name AS warehouse_name, ws.item_id, i.code AS item_code, i.name AS item_name, i.unit, ws.quantity, ws.low_threshold, ws.critical_threshold FROM warehouse_stock ws JOIN warehouses w ON w.id = ws.warehouse_id JOIN inventory_items i ON i.id = ws.item_id WHERE w.tenant_id = $1 ORDER BY w.name, i.name";

#[derive(Debug, sqlx::FromRow)]
struct StockRecordRow {
    warehouse_id: Uuid,
    warehouse_name: String,
    item_id: Uuid,
    item_code: String,
    item_name: String,
    unit: String,
    quantity: f64,
    low_threshold: f64,
    critical_threshold: f64,
}

#[derive(Debug, Serialize)]
pub struct StockRecord {
    pub warehouse_id: Uuid,
    pub warehouse_name: String,
    pub item_id: Uuid,
    pub item_code: String,
    pub item_name: String,
    pub unit: String,
    pub quantity: f64,
    pub low_threshold: f64,
    pub critical_threshold: f64,
    pub alert_level: AlertLevel,
}

impl From<StockRecordRow> for StockRecord {
    fn from(row: StockRecordRow) -> Self {
        let alert_level =
            resolve_alert_level(row.quantity, row.low_threshold, row.critical_threshold);
        StockRecord {
            warehouse_id: row.warehouse_id,
            warehouse_name: row.warehouse_name,
            item_id: row.item_id,
            item_code: row.item_code,
            item_name: row.item_name,
            unit: row.unit,
            quantity: row.quantity,
            low_threshold: row.low_threshold,
            critical_threshold: row.critical_threshold,
            alert_level,
        }
    }
}

/// Tenant-wide stock report with the alert level resolved per row. Read-only;
/// tolerates running outside any movement transaction.
pub async fn list_stock(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<StockRecord>>, ApiError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    let rows = query_as::<_, StockRecordRow>(LIST_STOCK_SQL)
        .bind(tenant_id)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::internal(e, None))?;
    Ok(Json(rows.into_iter().map(StockRecord::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateThresholds {
    pub low_threshold: f64,
    pub critical_threshold: f64,
}

const UPDATE_THRESHOLDS_SQL: &str = "UPDATE warehouse_stock ws SET low_threshold = $1, critical_threshold = $2, updated_at = NOW() FROM warehouses w WHERE w.id = ws.warehouse_id AND w.tenant_id = $3 AND ws.warehouse_id = $4 AND ws.item_id = $5 RETURNING ws.warehouse_id, ws.item_id, ws.quantity, ws.low_threshold, ws.critical_threshold";

pub async fn update_thresholds(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((warehouse_id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateThresholds>,
) -> Result<Json<crate::ledger::StockRow>, ApiError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    if !payload.low_threshold.is_finite() || !payload.critical_threshold.is_finite() {
        return Err(ApiError::bad_request("invalid_threshold", None));
    }
    // Negative inputs clamp to zero rather than erroring.
    let low = payload.low_threshold.max(0.0);
    let critical = payload.critical_threshold.max(0.0);

    let updated = query_as::<_, crate::ledger::StockRow>(UPDATE_THRESHOLDS_SQL)
        .bind(low)
        .bind(critical)
        .bind(tenant_id)
        .bind(warehouse_id)
        .bind(item_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::internal(e, None))?;

    match updated {
        Some(row) => Ok(Json(row)),
        None => Err(ApiError::NotFound { code: "unknown_stock_row", trace_id: None }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_report_is_scoped_through_the_warehouse_tenant() {
        assert!(LIST_STOCK_SQL.contains("WHERE w.tenant_id = $1"));
    }

    #[test]
    fn threshold_update_checks_tenant_through_the_warehouse_join() {
        assert!(UPDATE_THRESHOLDS_SQL.contains("w.tenant_id = $3"));
        assert!(UPDATE_THRESHOLDS_SQL.contains("RETURNING"));
    }
}
