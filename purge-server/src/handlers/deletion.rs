use actix_web::http::header::{CacheControl, CacheDirective};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::handlers::error::HttpErrorResponse;
use crate::middleware::auth::BearerToken;
use crate::orchestrator::{Authorization, ClientInfo, DeletionCommand, Orchestrator};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountRequest {
    pub confirmation_text: Option<String>,
    pub current_password: Option<String>,
    pub verification_code: Option<String>,
}

pub async fn delete_account(
    orchestrator: web::Data<Orchestrator>,
    bearer_token: BearerToken,
    client: ClientInfo,
    request: web::Json<DeleteAccountRequest>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let request = request.into_inner();

    let command = DeletionCommand {
        confirmation_text: request.confirmation_text.unwrap_or_default(),
        current_password: request.current_password,
        verification_code: request.verification_code,
        client,
    };

    let run = match orchestrator.authorize(&bearer_token.0, command).await? {
        Authorization::AlreadyDeleted => {
            return Ok(HttpResponse::Ok().json(json!({
                "ok": true,
                "message": "Account has already been deleted",
            })));
        }
        Authorization::Authorized(run) => run,
    };

    let events = orchestrator.into_inner().start(run);
    let stream = UnboundedReceiverStream::new(events)
        .map(|event| Ok::<_, actix_web::Error>(web::Bytes::from(event.to_string())));

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(CacheControl(vec![CacheDirective::NoCache]))
        .streaming(stream))
}
