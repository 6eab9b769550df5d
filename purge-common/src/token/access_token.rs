use crate::token::{Expiring, HmacSha256Verifier, Token};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    #[serde(rename = "uid")]
    pub user_id: Uuid,
    #[serde(rename = "eml")]
    pub user_email: String,
    #[serde(rename = "exp")]
    pub expiration: u64,
}

impl Expiring for AccessTokenClaims {
    fn expiration(&self) -> u64 {
        self.expiration
    }
}

/// Bearer credential issued by the auth service. This service only verifies it.
pub struct AccessToken {}

impl Token for AccessToken {
    type Claims = AccessTokenClaims;
    type Verifier = HmacSha256Verifier;

    fn token_name() -> &'static str {
        "AccessToken"
    }
}
