use reqwest::header::CONTENT_TYPE;

use super::{check_status, RevocationConfig, RevocationError};

pub async fn revoke(
    client: &reqwest::Client,
    config: &RevocationConfig,
    access_token: &str,
) -> Result<(), RevocationError> {
    let response = client
        .post(&config.tiktok_revoke_url)
        .bearer_auth(access_token)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .send()
        .await?;

    check_status(&response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revocation::test_utils::{route, FakeProvider};

    #[actix_web::test]
    async fn test_posts_bearer_token() {
        let provider =
            FakeProvider::start(vec![route("POST", "/v2/oauth/revoke/", 200, "{}")]).await;
        let client = reqwest::Client::new();

        revoke(&client, &provider.config(), "act.tiktok").await.unwrap();
        assert_eq!(
            provider.requests()[0].authorization.as_deref(),
            Some("Bearer act.tiktok")
        );

        provider.stop().await;
    }

    #[actix_web::test]
    async fn test_rejection_is_an_error() {
        let provider =
            FakeProvider::start(vec![route("POST", "/v2/oauth/revoke/", 401, "{}")]).await;
        let client = reqwest::Client::new();

        let result = revoke(&client, &provider.config(), "act.tiktok").await;
        assert!(matches!(result, Err(RevocationError::Status(401))));

        provider.stop().await;
    }
}
