use serde::Deserialize;

use super::{check_status, RevocationConfig, RevocationError};

#[derive(Deserialize)]
struct StripeAccount {
    id: String,
}

/// Looks up the connected account with the user's token, then deauthorizes it using the
/// platform's own credentials.
pub async fn revoke(
    client: &reqwest::Client,
    config: &RevocationConfig,
    access_token: &str,
) -> Result<(), RevocationError> {
    let (Some(client_id), Some(client_secret)) =
        (&config.stripe_client_id, &config.stripe_client_secret)
    else {
        return Err(RevocationError::MissingCredentials(
            "Stripe client ID or secret",
        ));
    };

    let response = client
        .get(&config.stripe_account_url)
        .bearer_auth(access_token)
        .send()
        .await?;
    check_status(&response)?;

    let account = response
        .json::<StripeAccount>()
        .await
        .map_err(|_| RevocationError::UnexpectedResponse("Stripe account has no ID"))?;

    let response = client
        .post(&config.stripe_deauthorize_url)
        .bearer_auth(client_secret)
        .form(&[
            ("client_id", client_id.as_str()),
            ("stripe_user_id", account.id.as_str()),
        ])
        .send()
        .await?;

    check_status(&response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revocation::test_utils::{route, FakeProvider};

    #[actix_web::test]
    async fn test_deauthorizes_discovered_account() {
        let provider = FakeProvider::start(vec![
            route("GET", "/v1/account", 200, r#"{"id":"acct_123","object":"account"}"#),
            route("POST", "/oauth/deauthorize", 200, r#"{"stripe_user_id":"acct_123"}"#),
        ])
        .await;
        let client = reqwest::Client::new();

        revoke(&client, &provider.config(), "sk_user").await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer sk_user"));
        assert_eq!(requests[1].authorization.as_deref(), Some("Bearer sk_test"));
        assert_eq!(requests[1].body, "client_id=ca_test&stripe_user_id=acct_123");

        provider.stop().await;
    }

    #[actix_web::test]
    async fn test_missing_credentials_skip_network() {
        let provider = FakeProvider::start(Vec::new()).await;
        let client = reqwest::Client::new();

        let config = RevocationConfig {
            stripe_client_secret: None,
            ..provider.config()
        };
        let result = revoke(&client, &config, "sk_user").await;
        assert!(matches!(result, Err(RevocationError::MissingCredentials(_))));
        assert!(provider.requests().is_empty());

        provider.stop().await;
    }

    #[actix_web::test]
    async fn test_account_lookup_failure() {
        let provider = FakeProvider::start(vec![
            route("GET", "/v1/account", 401, r#"{"error":{"type":"invalid_request_error"}}"#),
            route("POST", "/oauth/deauthorize", 200, "{}"),
        ])
        .await;
        let client = reqwest::Client::new();

        let result = revoke(&client, &provider.config(), "revoked").await;
        assert!(matches!(result, Err(RevocationError::Status(401))));
        assert_eq!(provider.requests().len(), 1);

        provider.stop().await;
    }

    #[actix_web::test]
    async fn test_account_without_id() {
        let provider =
            FakeProvider::start(vec![route("GET", "/v1/account", 200, r#"{"object":"account"}"#)])
                .await;
        let client = reqwest::Client::new();

        let result = revoke(&client, &provider.config(), "sk_user").await;
        assert!(matches!(result, Err(RevocationError::UnexpectedResponse(_))));

        provider.stop().await;
    }
}
