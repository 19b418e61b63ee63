//! Tenant and actor extraction from request headers. The gateway in front of
//! this service authenticates the caller; these values are trusted as-is.

use axum::http::HeaderMap;
use common_http_errors::ApiError;
use uuid::Uuid;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";

pub fn tenant_id_from_headers(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let raw = headers
        .get(TENANT_HEADER)
        .ok_or_else(|| ApiError::bad_request("missing_tenant", None))?;
    raw.to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ApiError::bad_request("invalid_tenant", None))
}

/// Optional acting user for the movement audit trail.
pub fn actor_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_tenant_header_is_rejected() {
        let headers = HeaderMap::new();
        let err = tenant_id_from_headers(&headers).expect_err("missing header should fail");
        assert!(matches!(err, ApiError::BadRequest { code: "missing_tenant", .. }));
    }

    #[test]
    fn malformed_tenant_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_static("not-a-uuid"));
        let err = tenant_id_from_headers(&headers).expect_err("malformed header should fail");
        assert!(matches!(err, ApiError::BadRequest { code: "invalid_tenant", .. }));
    }

    #[test]
    fn actor_is_optional_and_lenient() {
        let mut headers = HeaderMap::new();
        assert_eq!(actor_id_from_headers(&headers), None);
        let user = Uuid::new_v4();
        headers.insert(USER_HEADER, HeaderValue::from_str(&user.to_string()).unwrap());
        assert_eq!(actor_id_from_headers(&headers), Some(user));
    }
}
