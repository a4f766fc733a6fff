pub mod error_handling;
pub mod tenant;

pub use error_handling::{AppError, Result};
pub use tenant::{TenantId, TENANT_HEADER};
