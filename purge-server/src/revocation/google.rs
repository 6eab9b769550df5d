use reqwest::header::CONTENT_TYPE;

use super::{check_status, RevocationConfig, RevocationError};

async fn post_revoke(
    client: &reqwest::Client,
    url: &str,
    token: &str,
) -> Result<(), RevocationError> {
    let response = client
        .post(url)
        .query(&[("token", token)])
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .send()
        .await?;

    check_status(&response)
}

/// Revokes the access token, falling back to the refresh token once if that fails. Revoking
/// either token invalidates the whole grant.
pub async fn revoke(
    client: &reqwest::Client,
    config: &RevocationConfig,
    access_token: &str,
    refresh_token: Option<&str>,
) -> Result<(), RevocationError> {
    let result = post_revoke(client, &config.google_revoke_url, access_token).await;

    match (result, refresh_token) {
        (Ok(()), _) => Ok(()),
        (Err(e), Some(refresh_token)) => {
            log::warn!("Google access token revocation failed, retrying with refresh token: {e}");
            post_revoke(client, &config.google_revoke_url, refresh_token).await
        }
        (Err(e), None) => Err(e),
    }
}
