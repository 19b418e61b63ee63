//! Extraordinary item requests: one-off purchases that fall outside the item
//! catalog. Requests are plain tenant-scoped records with a PENDING/DELIVERED
//! lifecycle and never touch the stock ledger.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use common_http_errors::ApiError;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{query_as, Row};
use uuid::Uuid;

use crate::catalog_handlers::non_empty;
use crate::tenant::{actor_id_from_headers, tenant_id_from_headers};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Delivered,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Delivered => "DELIVERED",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(RequestStatus::Pending),
            "DELIVERED" => Some(RequestStatus::Delivered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtraordinaryRequest {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: String,
    pub status: RequestStatus,
    pub requested_by_user_id: Option<Uuid>,
    pub requested_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ExtraordinaryRequest {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status_raw: String = row.try_get("status")?;
        let status =
            RequestStatus::from_str(&status_raw).ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "status".into(),
                source: format!("unrecognized request status: {status_raw}").into(),
            })?;
        Ok(ExtraordinaryRequest {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            status,
            requested_by_user_id: row.try_get("requested_by_user_id")?,
            requested_at: row.try_get("requested_at")?,
            delivered_at: row.try_get("delivered_at")?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct NewExtraordinaryRequest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub requested_at: Option<DateTime<Utc>>,
}

const INSERT_REQUEST_SQL: &str = "INSERT INTO extraordinary_item_requests (id, tenant_id, name, description, status, requested_by_user_id, requested_at) VALUES ($1, $2, $3, $4, 'PENDING', $5, $6) RETURNING id, tenant_id, name, description, status, requested_by_user_id, requested_at, delivered_at";

pub(crate) const LIST_REQUESTS_SQL: &str = "SELECT id, tenant_id, name, description, status, requested_by_user_id, requested_at, delivered_at FROM extraordinary_item_requests WHERE tenant_id = $1 ORDER BY requested_at DESC";

pub(crate) const MARK_DELIVERED_SQL: &str = "UPDATE extraordinary_item_requests SET status = 'DELIVERED', delivered_at = NOW() WHERE id = $1 AND tenant_id = $2 RETURNING id, tenant_id, name, description, status, requested_by_user_id, requested_at, delivered_at";

pub async fn create_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewExtraordinaryRequest>,
) -> Result<Json<ExtraordinaryRequest>, ApiError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    let (Some(name), Some(description)) =
        (non_empty(&payload.name), non_empty(&payload.description))
    else {
        return Err(ApiError::bad_request("missing_fields", None));
    };
    let requested_at = payload.requested_at.unwrap_or_else(Utc::now);

    let request = query_as::<_, ExtraordinaryRequest>(INSERT_REQUEST_SQL)
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(name)
        .bind(description)
        .bind(actor_id_from_headers(&headers))
        .bind(requested_at)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::internal(e, None))?;

    tracing::info!(tenant_id = %tenant_id, request_id = %request.id, "Extraordinary item requested");
    Ok(Json(request))
}

pub async fn list_requests(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ExtraordinaryRequest>>, ApiError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    let requests = query_as::<_, ExtraordinaryRequest>(LIST_REQUESTS_SQL)
        .bind(tenant_id)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::internal(e, None))?;
    Ok(Json(requests))
}

/// Stamps the request DELIVERED with the delivery time. Requests outside the
/// tenant are indistinguishable from missing ones.
pub async fn mark_delivered(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(request_id): Path<Uuid>,
) -> Result<Json<ExtraordinaryRequest>, ApiError> {
    let tenant_id = tenant_id_from_headers(&headers)?;
    let updated = query_as::<_, ExtraordinaryRequest>(MARK_DELIVERED_SQL)
        .bind(request_id)
        .bind(tenant_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::internal(e, None))?;

    match updated {
        Some(request) => {
            tracing::info!(tenant_id = %tenant_id, request_id = %request.id, "Extraordinary item delivered");
            Ok(Json(request))
        }
        None => Err(ApiError::NotFound { code: "unknown_request", trace_id: None }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_round_trips() {
        for status in [RequestStatus::Pending, RequestStatus::Delivered] {
            assert_eq!(RequestStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::from_str("SHIPPED"), None);
    }

    #[test]
    fn request_queries_are_tenant_scoped() {
        assert!(INSERT_REQUEST_SQL.contains("'PENDING'"));
        assert!(LIST_REQUESTS_SQL.contains("WHERE tenant_id = $1"));
        assert!(LIST_REQUESTS_SQL.contains("ORDER BY requested_at DESC"));
        assert!(MARK_DELIVERED_SQL.contains("WHERE id = $1 AND tenant_id = $2"));
        assert!(MARK_DELIVERED_SQL.contains("status = 'DELIVERED'"));
    }
}
