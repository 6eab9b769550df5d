use serde::Deserialize;

use super::{check_status, RevocationConfig, RevocationError};

#[derive(Deserialize)]
struct GraphUser {
    id: String,
}

pub async fn revoke(
    client: &reqwest::Client,
    config: &RevocationConfig,
    access_token: &str,
) -> Result<(), RevocationError> {
    let response = client
        .get(format!("{}/me", config.meta_graph_url))
        .bearer_auth(access_token)
        .send()
        .await?;
    check_status(&response)?;

    let user = response
        .json::<GraphUser>()
        .await
        .map_err(|_| RevocationError::UnexpectedResponse("Graph user has no ID"))?;

    let response = client
        .delete(format!("{}/{}/permissions", config.meta_graph_url, user.id))
        .bearer_auth(access_token)
        .send()
        .await?;

    check_status(&response)
}
