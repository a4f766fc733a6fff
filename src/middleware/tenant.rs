// Tenant scoping
// Every management request carries an X-Tenant-Id header; handlers scope
// all reads and writes to that tenant.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::middleware::error_handling::AppError;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Extractor for the calling tenant. Rejects requests with a missing or
/// malformed header before the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::BadRequest("Missing X-Tenant-Id header".to_string()))?;

        let tenant_id = Uuid::parse_str(header)
            .map_err(|_| AppError::BadRequest("Invalid X-Tenant-Id header".to_string()))?;

        Ok(TenantId(tenant_id))
    }
}
