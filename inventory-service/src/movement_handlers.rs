use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use common_http_errors::ApiError;
use serde::Deserialize;
use sqlx::query_as;
use uuid::Uuid;

use crate::ledger::{record_movement, LedgerError, Movement, MovementInput, MovementKind};
use crate::tenant::{actor_id_from_headers, tenant_id_from_headers};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NewMovement {
    pub kind: MovementKind,
    pub item_id: Uuid,
    pub quantity: f64,
    #[serde(default)]
    pub source_warehouse_id: Option<Uuid>,
    #[serde(default)]
    pub destination_warehouse_id: Option<Uuid>,
    #[serde(default)]
    pub reference_task_id: Option<Uuid>,
    #[serde(default)]
    pub note: Option<String>,
}

pub(crate) const LIST_MOVEMENTS_SQL: &str = "SELECT id, tenant_id, kind, item_id, quantity, source_warehouse_id, destination_warehouse_id, reference_task_id, note, created_by_user_id, created_at FROM inventory_movements WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT $2";

const DEFAULT_MOVEMENT_PAGE: i64 = 500;
const MAX_MOVEMENT_PAGE: i64 = 5000;

#[derive(Debug, Default, Deserialize)]
pub struct ListMovementsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

fn page_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_MOVEMENT_PAGE).clamp(1, MAX_MOVEMENT_PAGE)
}

/// Map a ledger rejection to its HTTP shape. The core never formats user
/// messaging; this is where its errors get a status and a stable code.
pub fn map_ledger_error(err: LedgerError) -> ApiError {
    let code = err.code();
    match err {
        LedgerError::UnknownItem | LedgerError::UnknownWarehouse => {
            ApiError::NotFound { code, trace_id: None }
        }
        LedgerError::Db(e) => ApiError::internal(e, None),
        other => ApiError::BadRequest { code, trace_id: None, message: Some(other.to_string()) },
    }
}

pub async fn create_movement(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewMovement>,
) -> Result<Json<Movement>, ApiError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    let input = MovementInput {
        tenant_id,
        kind: payload.kind,
        item_id: payload.item_id,
        quantity: payload.quantity,
        source_warehouse_id: payload.source_warehouse_id,
        destination_warehouse_id: payload.destination_warehouse_id,
        reference_task_id: payload.reference_task_id,
        note: payload.note,
        created_by_user_id: actor_id_from_headers(&headers),
    };

    match record_movement(&state.db, &input).await {
        Ok(movement) => {
            state
                .metrics
                .movements_applied_total
                .with_label_values(&[movement.kind.as_str()])
                .inc();
            Ok(Json(movement))
        }
        Err(err) => {
            state
                .metrics
                .movements_rejected_total
                .with_label_values(&[err.code()])
                .inc();
            if let LedgerError::Db(ref db_err) = err {
                tracing::error!(?db_err, tenant_id = %tenant_id, item_id = %input.item_id, "Movement failed on persistence");
            }
            Err(map_ledger_error(err))
        }
    }
}

pub async fn list_movements(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListMovementsQuery>,
) -> Result<Json<Vec<Movement>>, ApiError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    let movements = query_as::<_, Movement>(LIST_MOVEMENTS_SQL)
        .bind(tenant_id)
        .bind(page_limit(params.limit))
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::internal(e, None))?;
    Ok(Json(movements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn list_movements_query_is_tenant_scoped_and_newest_first() {
        assert!(LIST_MOVEMENTS_SQL.contains("WHERE tenant_id = $1"));
        assert!(LIST_MOVEMENTS_SQL.contains("ORDER BY created_at DESC"));
        assert!(LIST_MOVEMENTS_SQL.contains("LIMIT $2"));
    }

    #[test]
    fn page_limit_defaults_and_clamps() {
        assert_eq!(page_limit(None), 500);
        assert_eq!(page_limit(Some(1)), 1);
        assert_eq!(page_limit(Some(0)), 1);
        assert_eq!(page_limit(Some(-3)), 1);
        assert_eq!(page_limit(Some(1_000_000)), 5000);
    }

    #[test]
    fn unknown_references_map_to_not_found() {
        let resp = map_ledger_error(LedgerError::UnknownItem).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "unknown_item");

        let resp = map_ledger_error(LedgerError::UnknownWarehouse).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "unknown_warehouse");
    }

    #[test]
    fn input_rejections_map_to_bad_request() {
        for (err, code) in [
            (LedgerError::InvalidQuantity, "invalid_quantity"),
            (LedgerError::MissingEndpoint, "missing_endpoint"),
            (LedgerError::SameWarehouseTransfer, "same_warehouse_transfer"),
            (
                LedgerError::InsufficientStock { available: 25.0, requested: 30.0 },
                "insufficient_stock",
            ),
        ] {
            let resp = map_ledger_error(err).into_response();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            assert_eq!(resp.headers().get("X-Error-Code").unwrap(), code);
        }
    }
}
