//! Error taxonomy for the auth facade.
//!
//! Every fallible operation resolves to one of these variants, so callers
//! can branch on outcomes without string matching. `Store` and `Internal`
//! are infrastructure failures; their detail stays out of client bodies.

use service_core::error::AppError;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is temporarily locked")]
    AccountLocked,

    #[error("Password does not meet the complexity policy: {0}")]
    WeakPassword(String),

    #[error("Password was used too recently")]
    PasswordReused,

    #[error("Multi-factor code required")]
    MfaRequired,

    #[error("Invalid multi-factor code")]
    MfaInvalid,

    #[error("Multi-factor authentication is not configured")]
    MfaNotConfigured,

    #[error("Token missing")]
    TokenMissing,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token invalid")]
    TokenInvalid,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Upstream store unavailable")]
    UpstreamUnavailable,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Role not found")]
    RoleNotFound,

    #[error("Role already exists")]
    RoleExists,

    #[error("System roles cannot be modified")]
    RoleImmutable,

    #[error("Invalid role definition: {0}")]
    RoleInvalid(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable code for logs and response envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::AccountLocked => "account_locked",
            AuthError::WeakPassword(_) => "weak_password",
            AuthError::PasswordReused => "password_reused",
            AuthError::MfaRequired => "mfa_required",
            AuthError::MfaInvalid => "mfa_invalid",
            AuthError::MfaNotConfigured => "mfa_not_configured",
            AuthError::TokenMissing => "token_missing",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenInvalid => "token_invalid",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::InsufficientPermissions => "insufficient_permissions",
            AuthError::UpstreamUnavailable => "upstream_unavailable",
            AuthError::EmailTaken => "email_taken",
            AuthError::RoleNotFound => "role_not_found",
            AuthError::RoleExists => "role_exists",
            AuthError::RoleImmutable => "role_immutable",
            AuthError::RoleInvalid(_) => "role_invalid",
            AuthError::Store(_) => "store_error",
            AuthError::Internal(_) => "internal_error",
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::MfaInvalid
            | AuthError::TokenMissing
            | AuthError::TokenExpired
            | AuthError::TokenInvalid
            | AuthError::TokenRevoked => AppError::Unauthorized(anyhow::anyhow!("{}", err)),
            AuthError::AccountLocked => AppError::Locked(anyhow::anyhow!("{}", err)),
            AuthError::WeakPassword(_) | AuthError::PasswordReused | AuthError::RoleInvalid(_) => {
                AppError::BadRequest(anyhow::anyhow!("{}", err))
            }
            AuthError::MfaRequired => AppError::PreconditionRequired(anyhow::anyhow!("{}", err)),
            AuthError::MfaNotConfigured => AppError::PreconditionFailed(anyhow::anyhow!("{}", err)),
            AuthError::InsufficientPermissions | AuthError::RoleImmutable => {
                AppError::Forbidden(anyhow::anyhow!("{}", err))
            }
            AuthError::UpstreamUnavailable => AppError::ServiceUnavailable,
            AuthError::EmailTaken | AuthError::RoleExists => {
                AppError::Conflict(anyhow::anyhow!("{}", err))
            }
            AuthError::RoleNotFound => AppError::NotFound(anyhow::anyhow!("{}", err)),
            AuthError::Store(e) => AppError::InternalError(anyhow::anyhow!("{}", e)),
            AuthError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(AuthError::InvalidCredentials.code(), "invalid_credentials");
        assert_eq!(AuthError::AccountLocked.code(), "account_locked");
        assert_eq!(AuthError::TokenRevoked.code(), "token_revoked");
    }

    #[test]
    fn test_app_error_mapping_keeps_status_semantics() {
        let locked: AppError = AuthError::AccountLocked.into();
        assert_eq!(locked.status_code(), 423);

        let mfa: AppError = AuthError::MfaRequired.into();
        assert_eq!(mfa.status_code(), 428);

        let upstream: AppError = AuthError::UpstreamUnavailable.into();
        assert_eq!(upstream.status_code(), 503);

        let denied: AppError = AuthError::InsufficientPermissions.into();
        assert_eq!(denied.status_code(), 403);
    }

    #[test]
    fn test_store_detail_not_in_client_body() {
        let err: AppError =
            AuthError::Store(crate::store::StoreError::Unavailable("redis at 10.0.0.3".into()))
                .into();
        assert_eq!(err.body().error, "Internal server error");
    }
}
