//! The authentication facade.
//!
//! One struct wiring the credential, MFA, token, and permission services
//! into the operations a transport layer actually calls. Construction is
//! explicit; `AuthStack` in the crate root does the wiring for production.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{
    RequiredPermission, SanitizedUser, Scope, TokenClaims, TokenKind, TokenPair, User,
};
use crate::services::{CredentialService, MfaService, MfaSetup, PermissionService, TokenService};
use crate::store::UserStore;

pub struct AuthService {
    users: Arc<dyn UserStore>,
    credentials: CredentialService,
    mfa: MfaService,
    tokens: TokenService,
    permissions: Arc<PermissionService>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        credentials: CredentialService,
        mfa: MfaService,
        tokens: TokenService,
        permissions: Arc<PermissionService>,
    ) -> Self {
        Self {
            users,
            credentials,
            mfa,
            tokens,
            permissions,
        }
    }

    /// Authenticate and issue a token pair.
    ///
    /// Credentials are checked first, then the MFA gate when the account has
    /// it enabled: no code means `MfaRequired`, a wrong code `MfaInvalid`.
    /// An unknown email reports `InvalidCredentials`, the same as a wrong
    /// password.
    #[instrument(skip(self, password, mfa_code), fields(email = %email))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        mfa_code: Option<&str>,
    ) -> Result<(TokenPair, SanitizedUser), AuthError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        self.credentials.validate_password(&user, password).await?;

        if user.mfa_enabled {
            let code = mfa_code.ok_or(AuthError::MfaRequired)?;
            if !self.mfa.verify(&user, code).await? {
                warn!(user_id = %user.user_id, "Login rejected: invalid MFA code");
                return Err(AuthError::MfaInvalid);
            }
        }

        let grants = self.permissions.effective_permissions(&user.role).await?;
        let pair = self.tokens.issue(&user, &grants)?;
        info!(user_id = %user.user_id, role = %user.role, "Login succeeded");
        Ok((pair, user.sanitized()))
    }

    /// Rotate a refresh token into a fresh pair.
    ///
    /// The user and role grants are re-read from the store, so role changes
    /// take effect here rather than riding out the old token's lifetime. The
    /// presented refresh token is revoked before the replacement is issued.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh).await?;
        let user_id = claims.user_id().map_err(|_| AuthError::TokenInvalid)?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        let grants = self.permissions.effective_permissions(&user.role).await?;

        self.tokens.revoke(&claims).await?;

        let pair = self.tokens.issue(&user, &grants)?;
        info!(user_id = %user.user_id, "Token pair rotated");
        Ok(pair)
    }

    /// Verify an access token and require every permission pair at the given
    /// scope. Returns the verified claims so callers can read identity and
    /// role without decoding twice.
    pub async fn authorize(
        &self,
        access_token: &str,
        required: &[RequiredPermission],
        scope: Scope,
    ) -> Result<TokenClaims, AuthError> {
        let token = access_token.trim();
        if token.is_empty() {
            return Err(AuthError::TokenMissing);
        }

        let claims = self.tokens.verify(token, TokenKind::Access).await?;
        let user_id = claims.user_id().map_err(|_| AuthError::TokenInvalid)?;

        let allowed = self
            .permissions
            .check(user_id, &claims.role, required, scope)
            .await?;
        if !allowed {
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(claims)
    }

    /// Provision TOTP and backup codes. MFA is live as soon as this returns.
    pub async fn setup_mfa(&self, user_id: Uuid) -> Result<MfaSetup, AuthError> {
        let user = self.require_user(user_id).await?;
        self.mfa.setup(&user).await
    }

    /// Check a TOTP or backup code outside the login flow.
    pub async fn verify_mfa(&self, user_id: Uuid, code: &str) -> Result<bool, AuthError> {
        let user = self.require_user(user_id).await?;
        self.mfa.verify(&user, code).await
    }

    /// Turn MFA off. The caller must still present a valid code.
    pub async fn disable_mfa(&self, user_id: Uuid, code: &str) -> Result<(), AuthError> {
        let user = self.require_user(user_id).await?;
        self.mfa.disable(&user, code).await
    }

    /// Revoke both tokens of a session.
    ///
    /// The refresh token must verify; an access token that has already
    /// expired needs no revocation entry and is not an error.
    #[instrument(skip_all)]
    pub async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<(), AuthError> {
        let refresh = self.tokens.verify(refresh_token, TokenKind::Refresh).await?;
        self.tokens.revoke(&refresh).await?;

        match self.tokens.verify(access_token, TokenKind::Access).await {
            Ok(access) => self.tokens.revoke(&access).await?,
            Err(AuthError::TokenExpired) => {}
            Err(e) => return Err(e),
        }

        info!("Session terminated");
        Ok(())
    }

    /// Create a user with a policy-checked password hash and an existing role.
    #[instrument(skip(self, password), fields(email = %email, role = %role))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<SanitizedUser, AuthError> {
        if !self.permissions.role_exists(role).await? {
            return Err(AuthError::RoleNotFound);
        }
        if self.users.find_by_email(email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let hash = self.credentials.hash_new_password(password)?;
        let user = User::new(email, hash, role);
        self.users.insert(&user).await?;

        info!(user_id = %user.user_id, "User registered");
        Ok(user.sanitized())
    }

    /// Re-authenticate with the current password, then rotate to the new one
    /// under the complexity and reuse policies.
    #[instrument(skip(self, current, new_password), fields(user_id = %user_id))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self.require_user(user_id).await?;
        self.credentials.validate_password(&user, current).await?;
        self.credentials.set_password(&user, new_password).await
    }

    /// Move a user to another existing role. Cached authorization decisions
    /// for the old role are dropped; outstanding access tokens keep the old
    /// grants until they expire or refresh.
    #[instrument(skip(self), fields(user_id = %user_id, role = %role))]
    pub async fn set_user_role(&self, user_id: Uuid, role: &str) -> Result<(), AuthError> {
        if !self.permissions.role_exists(role).await? {
            return Err(AuthError::RoleNotFound);
        }
        let user = self.require_user(user_id).await?;
        self.users.set_role(user.user_id, role).await?;
        self.permissions.invalidate_all();

        info!(user_id = %user.user_id, "User role changed");
        Ok(())
    }

    /// Facade callers hold a verified token naming this id; a missing row
    /// means the identity it names is gone.
    async fn require_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::TokenInvalid)
    }
}
