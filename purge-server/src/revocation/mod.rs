//! Best-effort invalidation of OAuth tokens at each provider. A failed revocation is logged and
//! reported as `false`; it never aborts an account deletion.

mod google;
mod meta;
mod stripe;
mod tiktok;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

#[async_trait]
pub trait RevokeToken: Send + Sync {
    async fn revoke(&self, platform: &str, access_token: &str, refresh_token: Option<&str>)
        -> bool;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Platform {
    Google,
    Patreon,
    Stripe,
    Meta,
    TikTok,
    Unknown,
}

impl Platform {
    pub fn from_name(name: &str) -> Self {
        match name {
            "youtube" | "google" => Platform::Google,
            "patreon" => Platform::Patreon,
            "stripe" => Platform::Stripe,
            "instagram" | "facebook" => Platform::Meta,
            "tiktok" => Platform::TikTok,
            _ => Platform::Unknown,
        }
    }
}

#[derive(Debug)]
pub enum RevocationError {
    Network(reqwest::Error),
    Status(u16),
    MissingCredentials(&'static str),
    UnexpectedResponse(&'static str),
}

impl std::error::Error for RevocationError {}

impl fmt::Display for RevocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevocationError::Network(e) => write!(f, "RevocationError: Network: {e}"),
            RevocationError::Status(status) => {
                write!(f, "RevocationError: Provider answered with status {status}")
            }
            RevocationError::MissingCredentials(name) => {
                write!(f, "RevocationError: Missing {name}")
            }
            RevocationError::UnexpectedResponse(msg) => {
                write!(f, "RevocationError: Unexpected response: {msg}")
            }
        }
    }
}

impl From<reqwest::Error> for RevocationError {
    fn from(e: reqwest::Error) -> Self {
        RevocationError::Network(e)
    }
}

#[derive(Clone, Debug)]
pub struct RevocationConfig {
    pub google_revoke_url: String,
    pub stripe_account_url: String,
    pub stripe_deauthorize_url: String,
    pub stripe_client_id: Option<String>,
    pub stripe_client_secret: Option<String>,
    /// Graph API root including the version, e.g. `https://graph.facebook.com/v20.0`
    pub meta_graph_url: String,
    pub tiktok_revoke_url: String,
    pub timeout: Duration,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            google_revoke_url: String::from("https://oauth2.googleapis.com/revoke"),
            stripe_account_url: String::from("https://api.stripe.com/v1/account"),
            stripe_deauthorize_url: String::from("https://connect.stripe.com/oauth/deauthorize"),
            stripe_client_id: None,
            stripe_client_secret: None,
            meta_graph_url: String::from("https://graph.facebook.com/v20.0"),
            tiktok_revoke_url: String::from("https://open.tiktokapis.com/v2/oauth/revoke/"),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct RevocationClient {
    client: reqwest::Client,
    config: RevocationConfig,
}

impl RevocationClient {
    pub fn new(config: RevocationConfig) -> Result<Self, RevocationError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("purge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }
}

fn check_status(response: &reqwest::Response) -> Result<(), RevocationError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(RevocationError::Status(response.status().as_u16()))
    }
}

#[async_trait]
impl RevokeToken for RevocationClient {
    async fn revoke(
        &self,
        platform: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> bool {
        let result = match Platform::from_name(platform) {
            Platform::Google => {
                google::revoke(&self.client, &self.config, access_token, refresh_token).await
            }
            Platform::Stripe => stripe::revoke(&self.client, &self.config, access_token).await,
            Platform::Meta => meta::revoke(&self.client, &self.config, access_token).await,
            Platform::TikTok => tiktok::revoke(&self.client, &self.config, access_token).await,
            Platform::Patreon => {
                log::info!(
                    "Patreon offers no token revocation API; the user must revoke access from \
                     their Patreon settings"
                );
                Ok(())
            }
            Platform::Unknown => {
                log::info!("No revocation strategy for platform '{platform}', skipping");
                Ok(())
            }
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("Token revocation for {platform} failed: {e}");
                false
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::{route, FakeProvider};
    use super::*;

    #[test]
    fn test_platform_names() {
        assert_eq!(Platform::from_name("youtube"), Platform::Google);
        assert_eq!(Platform::from_name("instagram"), Platform::Meta);
        assert_eq!(Platform::from_name("tiktok"), Platform::TikTok);
        assert_eq!(Platform::from_name("stripe"), Platform::Stripe);
        assert_eq!(Platform::from_name("patreon"), Platform::Patreon);
        assert_eq!(Platform::from_name("shopify"), Platform::Unknown);
        assert_eq!(Platform::from_name("YouTube"), Platform::Unknown);
    }

    #[actix_web::test]
    async fn test_patreon_and_unknown_succeed_without_network() {
        let provider = FakeProvider::start(Vec::new()).await;
        let client = RevocationClient::new(provider.config()).unwrap();

        assert!(client.revoke("patreon", "token", None).await);
        assert!(client.revoke("gumroad", "token", Some("refresh")).await);
        assert!(provider.requests().is_empty());

        provider.stop().await;
    }

    #[actix_web::test]
    async fn test_unreachable_provider_is_false() {
        let config = RevocationConfig {
            tiktok_revoke_url: String::from("http://127.0.0.1:1/v2/oauth/revoke/"),
            timeout: Duration::from_secs(2),
            ..RevocationConfig::default()
        };
        let client = RevocationClient::new(config).unwrap();

        assert!(!client.revoke("tiktok", "token", None).await);
    }

    #[actix_web::test]
    async fn test_dispatches_by_platform() {
        let provider = FakeProvider::start(vec![
            route("POST", "/revoke", 200, "{}"),
            route("POST", "/v2/oauth/revoke/", 200, "{}"),
        ])
        .await;
        let client = RevocationClient::new(provider.config()).unwrap();

        assert!(client.revoke("youtube", "yt-access", None).await);
        assert!(client.revoke("tiktok", "tt-access", None).await);

        let paths = provider
            .requests()
            .into_iter()
            .map(|r| r.path)
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["/revoke", "/v2/oauth/revoke/"]);

        provider.stop().await;
    }
}
