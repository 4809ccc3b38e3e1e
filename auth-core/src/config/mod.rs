use serde::Deserialize;
use service_core::breaker::BreakerConfig;
use service_core::config as core_config;
use service_core::config::{get_env, Environment};
use service_core::error::AppError;
use std::env;
use std::time::Duration;

/// Development fallback only; production must supply its own secret.
const DEV_JWT_SECRET: &str = "dev-only-signing-secret-0123456789abcdef";

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub token: TokenConfig,
    pub password: PasswordPolicy,
    pub lockout: LockoutPolicy,
    pub mfa: MfaConfig,
    pub cache: CacheConfig,
    pub breaker: BreakerSettings,
    pub redis: Option<RedisConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Symmetric signing secret; both halves of the pair use it.
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_expiry_minutes: i64,
    pub refresh_expiry_days: i64,
    /// Rotation epoch stamped into every token and checked on verify.
    pub version: u32,
    /// Clock-skew allowance for `exp`/`iat`, in seconds.
    pub leeway_seconds: u64,
    /// When false, issued tokens are never checked against the
    /// revocation store and nothing is written to it.
    pub revocation_check: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
    /// How many previous hashes a new password is compared against.
    pub history_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub lockout_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MfaConfig {
    /// Issuer label shown in authenticator apps.
    pub issuer: String,
    pub digits: usize,
    pub step_seconds: u64,
    /// Accepted steps either side of now.
    pub skew_steps: u8,
    pub backup_code_count: usize,
    pub backup_code_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: i64,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub failure_window_seconds: u64,
    pub reset_timeout_seconds: u64,
    pub call_timeout_ms: u64,
}

impl BreakerSettings {
    pub fn to_breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            failure_window: Duration::from_secs(self.failure_window_seconds),
            reset_timeout: Duration::from_secs(self.reset_timeout_seconds),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

impl AuthConfig {
    /// The development defaults, without touching the process environment.
    /// Embedders and tests start here and override what they need;
    /// production loads through [`AuthConfig::from_env`] instead.
    pub fn for_dev() -> Self {
        AuthConfig {
            common: core_config::Config {
                service_name: "taskhive-auth".to_string(),
                log_level: "info".to_string(),
            },
            environment: Environment::Dev,
            token: TokenConfig {
                secret: DEV_JWT_SECRET.to_string(),
                issuer: "taskhive-auth".to_string(),
                audience: "taskhive-api".to_string(),
                access_expiry_minutes: 15,
                refresh_expiry_days: 7,
                version: 1,
                leeway_seconds: 30,
                revocation_check: true,
            },
            password: PasswordPolicy {
                min_length: 12,
                require_uppercase: true,
                require_lowercase: true,
                require_digit: true,
                require_special: true,
                history_depth: 5,
            },
            lockout: LockoutPolicy {
                max_failed_attempts: 5,
                lockout_minutes: 30,
            },
            mfa: MfaConfig {
                issuer: "taskhive".to_string(),
                digits: 6,
                step_seconds: 30,
                skew_steps: 1,
                backup_code_count: 10,
                backup_code_length: 10,
            },
            cache: CacheConfig {
                ttl_seconds: 300,
                sweep_interval_seconds: 60,
            },
            breaker: BreakerSettings {
                failure_threshold: 5,
                failure_window_seconds: 60,
                reset_timeout_seconds: 30,
                call_timeout_ms: 2000,
            },
            redis: None,
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            common,
            environment,
            token: TokenConfig {
                secret: get_env("JWT_SECRET", Some(DEV_JWT_SECRET), is_prod)?,
                issuer: get_env("JWT_ISSUER", Some("taskhive-auth"), is_prod)?,
                audience: get_env("JWT_AUDIENCE", Some("taskhive-api"), is_prod)?,
                access_expiry_minutes: get_env("JWT_ACCESS_EXPIRY_MINUTES", Some("15"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
                refresh_expiry_days: get_env("JWT_REFRESH_EXPIRY_DAYS", Some("7"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
                version: get_env("JWT_TOKEN_VERSION", Some("1"), is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
                leeway_seconds: get_env("JWT_LEEWAY_SECONDS", Some("30"), is_prod)?
                    .parse()
                    .unwrap_or(30),
                revocation_check: get_env("REVOCATION_CHECK_ENABLED", Some("true"), is_prod)?
                    .parse()
                    .unwrap_or(true),
            },
            password: PasswordPolicy {
                min_length: get_env("PASSWORD_MIN_LENGTH", Some("12"), is_prod)?
                    .parse()
                    .unwrap_or(12),
                require_uppercase: get_env("PASSWORD_REQUIRE_UPPERCASE", Some("true"), is_prod)?
                    .parse()
                    .unwrap_or(true),
                require_lowercase: get_env("PASSWORD_REQUIRE_LOWERCASE", Some("true"), is_prod)?
                    .parse()
                    .unwrap_or(true),
                require_digit: get_env("PASSWORD_REQUIRE_DIGIT", Some("true"), is_prod)?
                    .parse()
                    .unwrap_or(true),
                require_special: get_env("PASSWORD_REQUIRE_SPECIAL", Some("true"), is_prod)?
                    .parse()
                    .unwrap_or(true),
                history_depth: get_env("PASSWORD_HISTORY_DEPTH", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
            },
            lockout: LockoutPolicy {
                max_failed_attempts: get_env("LOCKOUT_MAX_FAILED_ATTEMPTS", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
                lockout_minutes: get_env("LOCKOUT_DURATION_MINUTES", Some("30"), is_prod)?
                    .parse()
                    .unwrap_or(30),
            },
            mfa: MfaConfig {
                issuer: get_env("MFA_ISSUER", Some("taskhive"), is_prod)?,
                digits: get_env("MFA_DIGITS", Some("6"), is_prod)?.parse().unwrap_or(6),
                step_seconds: get_env("MFA_STEP_SECONDS", Some("30"), is_prod)?
                    .parse()
                    .unwrap_or(30),
                skew_steps: get_env("MFA_SKEW_STEPS", Some("1"), is_prod)?
                    .parse()
                    .unwrap_or(1),
                backup_code_count: get_env("MFA_BACKUP_CODE_COUNT", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
                backup_code_length: get_env("MFA_BACKUP_CODE_LENGTH", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
            },
            cache: CacheConfig {
                ttl_seconds: get_env("PERMISSION_CACHE_TTL_SECONDS", Some("300"), is_prod)?
                    .parse()
                    .unwrap_or(300),
                sweep_interval_seconds: get_env(
                    "PERMISSION_CACHE_SWEEP_SECONDS",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
            },
            breaker: BreakerSettings {
                failure_threshold: get_env("BREAKER_FAILURE_THRESHOLD", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
                failure_window_seconds: get_env(
                    "BREAKER_FAILURE_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
                reset_timeout_seconds: get_env(
                    "BREAKER_RESET_TIMEOUT_SECONDS",
                    Some("30"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(30),
                call_timeout_ms: get_env("BREAKER_CALL_TIMEOUT_MS", Some("2000"), is_prod)?
                    .parse()
                    .unwrap_or(2000),
            },
            redis: env::var("REDIS_URL").ok().map(|url| RedisConfig { url }),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.token.secret.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 bytes"
            )));
        }

        if self.token.access_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.token.refresh_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_EXPIRY_DAYS must be positive"
            )));
        }

        if self.password.min_length < 8 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PASSWORD_MIN_LENGTH must be at least 8"
            )));
        }

        if self.password.history_depth == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PASSWORD_HISTORY_DEPTH must be at least 1"
            )));
        }

        if self.lockout.max_failed_attempts == 0 || self.lockout.lockout_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "lockout policy requires a positive attempt threshold and duration"
            )));
        }

        if !(6..=8).contains(&self.mfa.digits) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MFA_DIGITS must be between 6 and 8"
            )));
        }

        if self.mfa.step_seconds == 0 || self.mfa.backup_code_count == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MFA step and backup code count must be positive"
            )));
        }

        if self.mfa.backup_code_length < 8 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MFA_BACKUP_CODE_LENGTH must be at least 8"
            )));
        }

        if self.cache.ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PERMISSION_CACHE_TTL_SECONDS must be positive"
            )));
        }

        if self.breaker.failure_threshold == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BREAKER_FAILURE_THRESHOLD must be at least 1"
            )));
        }

        // In production, ensure stricter validation
        if self.environment == Environment::Prod {
            if self.token.secret == DEV_JWT_SECRET {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "The development JWT secret cannot be used in production"
                )));
            }

            if self.redis.is_none() && self.token.revocation_check {
                tracing::warn!(
                    "No REDIS_URL set; revoked tokens will not survive a restart"
                );
            }
        }

        Ok(())
    }
}
