use purge_common::otp::Otp;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::ports::{Account, IdentityProvider, PortError, VerificationCodeStore};

pub const DELETE_ACCOUNT_PURPOSE: &str = "delete_account";

pub const OAUTH_PROVIDERS: [&str; 7] = [
    "google",
    "github",
    "gitlab",
    "bitbucket",
    "azure",
    "facebook",
    "twitter",
];

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Credential {
    Password(String),
    VerificationCode(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReauthMethod {
    Password,
    Otp,
}

impl ReauthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReauthMethod::Password => "password",
            ReauthMethod::Otp => "otp",
        }
    }
}

#[derive(Debug)]
pub enum GateError {
    ReauthRequired { method: ReauthMethod },
    MissingInput { method: ReauthMethod },
    WrongPassword,
    InvalidCode,
    InvalidCodeFormat,
    PasswordNotSupported,
    Unavailable(PortError),
}

impl GateError {
    /// Reason recorded in the audit trail. Never shown to the caller.
    pub fn audit_reason(&self) -> &'static str {
        match self {
            GateError::ReauthRequired { .. } => "reauth_required",
            GateError::MissingInput { .. } => "missing_credential",
            GateError::WrongPassword => "invalid_password",
            GateError::InvalidCode => "invalid_verification_code",
            GateError::InvalidCodeFormat => "invalid_verification_code_format",
            GateError::PasswordNotSupported => "password_not_supported",
            GateError::Unavailable(_) => "gate_unavailable",
        }
    }
}

impl std::error::Error for GateError {}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::ReauthRequired { method } => {
                write!(f, "GateError: Re-authentication required ({})", method.as_str())
            }
            GateError::MissingInput { method } => {
                write!(f, "GateError: Empty credential ({})", method.as_str())
            }
            GateError::WrongPassword => write!(f, "GateError: Wrong password"),
            GateError::InvalidCode => write!(f, "GateError: Invalid verification code"),
            GateError::InvalidCodeFormat => {
                write!(f, "GateError: Malformed verification code")
            }
            GateError::PasswordNotSupported => {
                write!(f, "GateError: Account cannot authenticate with a password")
            }
            GateError::Unavailable(e) => write!(f, "GateError: {e}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Verified {
    pub user_id: Uuid,
    pub method: ReauthMethod,
}

/// An account may re-authenticate with a password only if `email` is among its providers and
/// its primary provider is not an OAuth provider. Either signal alone is not enough.
pub fn is_password_capable(account: &Account) -> bool {
    let has_email_provider =
        account.provider == "email" || account.providers.iter().any(|p| p == "email");
    let primary_is_oauth = OAUTH_PROVIDERS.contains(&account.provider.as_str());

    has_email_provider && !primary_is_oauth
}

pub fn preferred_method(account: &Account) -> ReauthMethod {
    if is_password_capable(account) {
        ReauthMethod::Password
    } else {
        ReauthMethod::Otp
    }
}

pub struct ReauthGate {
    identity: Arc<dyn IdentityProvider>,
    codes: Arc<dyn VerificationCodeStore>,
}

impl ReauthGate {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        codes: Arc<dyn VerificationCodeStore>,
    ) -> Self {
        Self { identity, codes }
    }

    pub async fn verify(
        &self,
        account: &Account,
        credential: Option<&Credential>,
    ) -> Result<Verified, GateError> {
        let method = preferred_method(account);

        match credential {
            None => Err(GateError::ReauthRequired { method }),
            Some(Credential::Password(password)) => {
                if password.is_empty() {
                    return Err(GateError::MissingInput { method });
                }

                if !is_password_capable(account) {
                    return Err(GateError::PasswordNotSupported);
                }

                let is_valid = self
                    .identity
                    .verify_password(account.user_id, password)
                    .await
                    .map_err(GateError::Unavailable)?;

                if !is_valid {
                    return Err(GateError::WrongPassword);
                }

                Ok(Verified {
                    user_id: account.user_id,
                    method: ReauthMethod::Password,
                })
            }
            Some(Credential::VerificationCode(code)) => {
                if code.is_empty() {
                    return Err(GateError::MissingInput { method });
                }

                if !Otp::is_well_formed(code) {
                    return Err(GateError::InvalidCodeFormat);
                }

                let consumed = self
                    .codes
                    .consume(account.user_id, DELETE_ACCOUNT_PURPOSE, code)
                    .await
                    .map_err(GateError::Unavailable)?;

                if !consumed {
                    return Err(GateError::InvalidCode);
                }

                Ok(Verified {
                    user_id: account.user_id,
                    method: ReauthMethod::Otp,
                })
            }
        }
    }
}
