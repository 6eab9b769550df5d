use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use lettre::message::Mailbox;
use once_cell::sync::Lazy;
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;
use zeroize::{Zeroize, Zeroizing};

pub static CONF: Lazy<Config> = Lazy::new(|| Config::from_env().expect("Failed to load config"));

const DB_USERNAME_VAR: &str = "PURGE_DB_USERNAME";
const DB_PASSWORD_VAR: &str = "PURGE_DB_PASSWORD";
const DB_HOSTNAME_VAR: &str = "PURGE_DB_HOSTNAME";
const DB_PORT_VAR: &str = "PURGE_DB_PORT";
const DB_NAME_VAR: &str = "PURGE_DB_NAME";
const DB_MAX_CONNECTIONS_VAR: &str = "PURGE_DB_MAX_CONNECTIONS";

const TOKEN_SIGNING_KEY_VAR: &str = "PURGE_TOKEN_SIGNING_KEY_B64";

const EMAIL_ENABLED_VAR: &str = "PURGE_EMAIL_ENABLED";
const EMAIL_FROM_ADDR: &str = "PURGE_EMAIL_FROM_ADDR";
const EMAIL_REPLY_TO_ADDR: &str = "PURGE_EMAIL_REPLY_TO_ADDR";
const SMTP_ADDRESS_VAR: &str = "PURGE_SMTP_ADDRESS";
const SMTP_USERNAME_VAR: &str = "PURGE_SMTP_USERNAME";
const SMTP_KEY_VAR: &str = "PURGE_SMTP_KEY";
const MAX_SMTP_CONNECTIONS_VAR: &str = "PURGE_MAX_SMTP_CONNECTIONS";
const SMTP_IDLE_TIMEOUT_SECS_VAR: &str = "PURGE_SMTP_IDLE_TIMEOUT_SECS";

const OTP_LIFETIME_MINS_VAR: &str = "PURGE_OTP_LIFETIME_MINS";
const DELETION_STALE_AFTER_MINS_VAR: &str = "PURGE_DELETION_STALE_AFTER_MINS";

const REVOCATION_TIMEOUT_SECS_VAR: &str = "PURGE_REVOCATION_TIMEOUT_SECS";
const STRIPE_CLIENT_ID_VAR: &str = "PURGE_STRIPE_CLIENT_ID";
const STRIPE_CLIENT_SECRET_VAR: &str = "PURGE_STRIPE_CLIENT_SECRET";

const ACTIX_WORKER_COUNT_VAR: &str = "PURGE_ACTIX_WORKER_COUNT";

const LOG_LEVEL_VAR: &str = "PURGE_LOG_LEVEL";

const TOKEN_SIGNING_KEY_SIZE: usize = 64;

#[derive(Zeroize)]
pub struct ConfigInner {
    pub db_username: String,
    pub db_password: String,
    pub db_hostname: String,
    pub db_port: u16,
    pub db_name: String,
    #[zeroize(skip)]
    pub db_max_connections: u32,

    pub token_signing_key: [u8; TOKEN_SIGNING_KEY_SIZE],

    pub email_enabled: bool,
    #[zeroize(skip)]
    pub email_from_address: Mailbox,
    #[zeroize(skip)]
    pub email_reply_to_address: Mailbox,
    pub smtp_address: String,
    pub smtp_username: String,
    pub smtp_key: String,
    #[zeroize(skip)]
    pub max_smtp_connections: u32,
    #[zeroize(skip)]
    pub smtp_idle_timeout: Duration,

    #[zeroize(skip)]
    pub otp_lifetime: Duration,
    #[zeroize(skip)]
    pub deletion_stale_after: Duration,

    #[zeroize(skip)]
    pub revocation_timeout: Duration,
    pub stripe_client_id: Option<String>,
    pub stripe_client_secret: Option<String>,

    #[zeroize(skip)]
    pub actix_worker_count: usize,

    #[zeroize(skip)]
    pub log_level: String,
}

impl ConfigInner {
    pub fn database_uri(&self) -> Zeroizing<String> {
        Zeroizing::new(format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_username, self.db_password, self.db_hostname, self.db_port, self.db_name,
        ))
    }
}

pub struct Config {
    inner: UnsafeCell<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        // Safe as long as `unsafe Config::zeroize()` hasn't been called
        unsafe { &*self.inner.get() }
    }
}

// Safe to be shared across threads as long as `unsafe Config::zeroize()` hasn't been called
unsafe impl Sync for Config {}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let token_signing_key = Zeroizing::new(
            b64.decode(env_var::<String>(TOKEN_SIGNING_KEY_VAR)?.as_bytes())
                .map_err(|_| ConfigError::InvalidVar(TOKEN_SIGNING_KEY_VAR))?,
        );

        if token_signing_key.len() < TOKEN_SIGNING_KEY_SIZE {
            return Err(ConfigError::InvalidVar(TOKEN_SIGNING_KEY_VAR));
        }

        let token_signing_key = token_signing_key[..TOKEN_SIGNING_KEY_SIZE]
            .try_into()
            .map_err(|_| ConfigError::InvalidVar(TOKEN_SIGNING_KEY_VAR))?;

        let email_from_address: Mailbox = env_var::<String>(EMAIL_FROM_ADDR)?
            .parse()
            .map_err(|_| ConfigError::InvalidVar(EMAIL_FROM_ADDR))?;
        let email_reply_to_address: Mailbox = env_var::<String>(EMAIL_REPLY_TO_ADDR)?
            .parse()
            .map_err(|_| ConfigError::InvalidVar(EMAIL_REPLY_TO_ADDR))?;

        let inner = ConfigInner {
            db_username: env_var(DB_USERNAME_VAR)?,
            db_password: env_var(DB_PASSWORD_VAR)?,
            db_hostname: env_var(DB_HOSTNAME_VAR)?,
            db_port: env_var(DB_PORT_VAR)?,
            db_name: env_var(DB_NAME_VAR)?,
            db_max_connections: env_var_or(DB_MAX_CONNECTIONS_VAR, 48),

            token_signing_key,

            email_enabled: if cfg!(test) {
                false
            } else {
                env_var(EMAIL_ENABLED_VAR)?
            },
            email_from_address,
            email_reply_to_address,
            smtp_address: env_var(SMTP_ADDRESS_VAR)?,
            smtp_username: env_var(SMTP_USERNAME_VAR)?,
            smtp_key: env_var(SMTP_KEY_VAR)?,
            max_smtp_connections: env_var_or(MAX_SMTP_CONNECTIONS_VAR, 24),
            smtp_idle_timeout: Duration::from_secs(env_var_or(SMTP_IDLE_TIMEOUT_SECS_VAR, 60)),

            otp_lifetime: Duration::from_secs(env_var_or(OTP_LIFETIME_MINS_VAR, 10) * 60),
            deletion_stale_after: Duration::from_secs(
                env_var_or(DELETION_STALE_AFTER_MINS_VAR, 60) * 60,
            ),

            revocation_timeout: Duration::from_secs(env_var_or(REVOCATION_TIMEOUT_SECS_VAR, 10)),
            stripe_client_id: optional_env_var(STRIPE_CLIENT_ID_VAR),
            stripe_client_secret: optional_env_var(STRIPE_CLIENT_SECRET_VAR),

            actix_worker_count: env_var_or(ACTIX_WORKER_COUNT_VAR, num_cpus::get()),

            log_level: env_var_or(LOG_LEVEL_VAR, String::from("info")),
        };

        Ok(Config {
            inner: UnsafeCell::new(inner),
        })
    }

    /// # Safety
    ///
    /// Safe only if the Config isn't being used by other threads or across an async
    /// boundary. Generally, this should only be used at the end of the main function once
    /// all threads have been joined.
    pub unsafe fn zeroize(&self) {
        unsafe {
            (*self.inner.get()).zeroize();
        }
    }
}

fn env_var<T: FromStr>(key: &'static str) -> Result<T, ConfigError> {
    let var = std::env::var(key).map_err(|_| ConfigError::missing(key))?;
    let var: T = var.parse().map_err(|_| ConfigError::invalid(key))?;
    Ok(var)
}

fn env_var_or<T: FromStr>(key: &'static str, default: T) -> T {
    let Ok(var) = std::env::var(key) else {
        return default;
    };

    var.parse().unwrap_or(default)
}

fn optional_env_var(key: &'static str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar(&'static str),
}

impl ConfigError {
    fn missing(var_name: &'static str) -> Self {
        Self::MissingVar(var_name)
    }

    fn invalid(var_name: &'static str) -> Self {
        Self::InvalidVar(var_name)
    }
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVar(key) => write!(f, "Missing environment variable '{}'", key),
            Self::InvalidVar(key) => write!(f, "Environment variable '{}' is invalid", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or_falls_back() {
        assert_eq!(env_var_or("PURGE_TEST_UNSET_VAR_1", 42u32), 42);
    }

    #[test]
    fn test_env_var_reports_missing() {
        assert_eq!(
            env_var::<u32>("PURGE_TEST_UNSET_VAR_2").unwrap_err(),
            ConfigError::MissingVar("PURGE_TEST_UNSET_VAR_2")
        );
    }

    #[test]
    fn test_optional_env_var_ignores_unset() {
        assert!(optional_env_var("PURGE_TEST_UNSET_VAR_3").is_none());
    }
}
