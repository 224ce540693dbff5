//! Shared context for API routes: the store location plus the access-policy
//! and notification seams.

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::access::{AccessPolicy, Notifier};
use crate::db::sqlite::open_database;

use super::error::ApiError;

/// Header carrying the acting caregiver or patient identity.
pub const CALLER_HEADER: &str = "X-Caller-Id";

/// Shared state for all API routes. Connections are opened per request; the
/// store carries the concurrency guarantees, not this struct.
#[derive(Clone)]
pub struct ApiContext {
    db_path: Arc<PathBuf>,
    access: Arc<dyn AccessPolicy>,
    pub notifier: Arc<dyn Notifier>,
}

impl ApiContext {
    pub fn new(
        db_path: PathBuf,
        access: Arc<dyn AccessPolicy>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db_path: Arc::new(db_path),
            access,
            notifier,
        }
    }

    pub fn open_db(&self) -> Result<Connection, ApiError> {
        open_database(&self.db_path).map_err(|e| ApiError::Internal(e.to_string()))
    }

    pub fn require_access(&self, caller: &str, patient_id: &str) -> Result<(), ApiError> {
        if self.access.can_act(caller, patient_id) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "caller {caller} may not act on patient {patient_id}"
            )))
        }
    }
}

/// Extract the caller identity from the request headers.
pub fn caller_id(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("");
    if value.is_empty() {
        return Err(ApiError::MissingCaller);
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn caller_id_reads_the_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_HEADER, HeaderValue::from_static("caregiver-1"));
        assert_eq!(caller_id(&headers).unwrap(), "caregiver-1");
    }

    #[test]
    fn missing_or_blank_caller_is_rejected() {
        let headers = HeaderMap::new();
        assert!(matches!(caller_id(&headers), Err(ApiError::MissingCaller)));

        let mut blank = HeaderMap::new();
        blank.insert(CALLER_HEADER, HeaderValue::from_static("   "));
        assert!(matches!(caller_id(&blank), Err(ApiError::MissingCaller)));
    }
}
