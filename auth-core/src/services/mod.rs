//! Services layer for auth-core.
//!
//! Business logic for credential verification, MFA, token issuance, and
//! permission evaluation, composed by the [`auth::AuthService`] facade.

pub mod auth;
pub mod credentials;
pub mod mfa;
pub mod permissions;
pub mod tokens;

pub use auth::AuthService;
pub use credentials::CredentialService;
pub use mfa::{MfaService, MfaSetup};
pub use permissions::PermissionService;
pub use tokens::TokenService;

use service_core::breaker::BreakerError;
use tracing::warn;

use crate::error::AuthError;
use crate::store::StoreError;

/// Collapse a breaker-guarded store failure into the one error callers
/// see. Every path through here is failure-closed.
pub(crate) fn store_unavailable(operation: &str, err: BreakerError<StoreError>) -> AuthError {
    match &err {
        BreakerError::Open => {
            warn!(operation, "Store call rejected by open circuit");
        }
        BreakerError::Timeout(timeout) => {
            warn!(
                operation,
                timeout_ms = timeout.as_millis() as u64,
                "Store call timed out"
            );
        }
        BreakerError::Inner(e) => {
            warn!(operation, error = %e, "Store call failed");
        }
    }
    AuthError::UpstreamUnavailable
}
