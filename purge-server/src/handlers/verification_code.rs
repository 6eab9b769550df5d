use actix_web::{web, HttpResponse};
use lettre::message::Mailbox;
use purge_common::email::templates::VerificationCodeMessage;
use purge_common::email::{EmailMessage, EmailSender};
use purge_common::otp::{Otp, OTP_LENGTH};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::handlers::error::HttpErrorResponse;
use crate::middleware::auth::BearerToken;
use crate::orchestrator::ports::{
    AuditEvent, AuditSink, AuditStatus, IdentityProvider, SecurityAction, VerificationCodeStore,
};
use crate::orchestrator::rate_limiter::{RateLimiter, SEND_OTP_POLICY};
use crate::orchestrator::{ClientInfo, Collaborators};

pub const VALID_PURPOSES: [&str; 3] = ["password_change", "delete_account", "revoke_sessions"];

#[derive(Debug, Deserialize)]
pub struct VerificationCodeRequest {
    pub purpose: String,
}

/// Masks all but the first two characters of the local part, e.g. `jo***@example.com`.
fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if local.chars().count() > 2 => {
            let prefix = local.chars().take(2).collect::<String>();
            format!("{prefix}***@{domain}")
        }
        _ => String::from(email),
    }
}

pub struct VerificationCodeIssuer {
    identity: Arc<dyn IdentityProvider>,
    codes: Arc<dyn VerificationCodeStore>,
    audit: Arc<dyn AuditSink>,
    limiter: RateLimiter,
    email_sender: EmailSender,
    code_lifetime: Duration,
    from_address: Mailbox,
    reply_to_address: Mailbox,
}

impl VerificationCodeIssuer {
    pub fn new(
        collaborators: &Collaborators,
        email_sender: EmailSender,
        code_lifetime: Duration,
        from_address: Mailbox,
        reply_to_address: Mailbox,
    ) -> Self {
        Self {
            identity: Arc::clone(&collaborators.identity),
            codes: Arc::clone(&collaborators.codes),
            audit: Arc::clone(&collaborators.audit),
            limiter: RateLimiter::new(Arc::clone(&collaborators.rate_limits)),
            email_sender,
            code_lifetime,
            from_address,
            reply_to_address,
        }
    }

    pub fn code_lifetime_mins(&self) -> u64 {
        self.code_lifetime.as_secs() / 60
    }

    pub async fn issue(
        &self,
        bearer_token: &str,
        purpose: &str,
        client: &ClientInfo,
    ) -> Result<(), HttpErrorResponse> {
        let identity = match self.identity.get_current_user(bearer_token).await {
            Ok(Some(i)) => i,
            Ok(None) => {
                return Err(HttpErrorResponse::Unauthorized(String::from("Unauthorized")));
            }
            Err(e) => {
                log::error!("{e}");
                return Err(HttpErrorResponse::Unavailable(String::from(
                    "Service temporarily unavailable. Please try again later.",
                )));
            }
        };

        if !VALID_PURPOSES.contains(&purpose) {
            return Err(HttpErrorResponse::IncorrectlyFormed(String::from(
                "Invalid purpose",
            )));
        }

        let rate_check = match self.limiter.check(identity.user_id, &SEND_OTP_POLICY).await {
            Ok(c) => c,
            Err(e) => {
                log::error!("Rate limit store unavailable, denying code request: {e}");
                return Err(HttpErrorResponse::Unavailable(String::from(
                    "Service temporarily unavailable. Please try again later.",
                )));
            }
        };

        if !rate_check.allowed {
            self.audit
                .log_event(AuditEvent {
                    action: SecurityAction::RateLimitExceeded,
                    actor_id: Some(identity.user_id),
                    status: AuditStatus::Warning,
                    details: client.details(json!({
                        "action_type": SEND_OTP_POLICY.operation,
                        "purpose": purpose,
                    })),
                })
                .await;

            return Err(HttpErrorResponse::TooManyAttempts {
                message: String::from(
                    "Too many verification code requests. Please wait before trying again.",
                ),
                retry_after_secs: rate_check.retry_after_secs(),
            });
        }

        let code = Otp::generate(OTP_LENGTH);
        let expires_at = SystemTime::now() + self.code_lifetime;

        let delivery = async {
            self.codes
                .issue(identity.user_id, &identity.email, &code, purpose, expires_at)
                .await
                .map_err(|e| e.to_string())?;

            let message = EmailMessage {
                body: VerificationCodeMessage::generate(&code, purpose, self.code_lifetime),
                subject: VerificationCodeMessage::subject(purpose),
                from: self.from_address.clone(),
                reply_to: self.reply_to_address.clone(),
                destination: &identity.email,
                is_html: true,
            };

            self.email_sender
                .send(message)
                .await
                .map_err(|e| e.to_string())
        };

        if let Err(e) = delivery.await {
            log::error!("Failed to deliver verification code: {e}");

            self.audit
                .log_event(AuditEvent {
                    action: SecurityAction::OtpSendFailed,
                    actor_id: Some(identity.user_id),
                    status: AuditStatus::Failure,
                    details: client.details(json!({ "purpose": purpose })),
                })
                .await;

            return Err(HttpErrorResponse::InternalError(String::from(
                "Failed to send verification email. Please try again.",
            )));
        }

        self.audit
            .log_event(AuditEvent {
                action: SecurityAction::OtpSent,
                actor_id: Some(identity.user_id),
                status: AuditStatus::Success,
                details: client.details(json!({
                    "purpose": purpose,
                    "email_masked": mask_email(&identity.email),
                })),
            })
            .await;

        Ok(())
    }
}

pub async fn send(
    issuer: web::Data<VerificationCodeIssuer>,
    bearer_token: BearerToken,
    client: ClientInfo,
    request: web::Json<VerificationCodeRequest>,
) -> Result<HttpResponse, HttpErrorResponse> {
    issuer
        .issue(&bearer_token.0, &request.purpose, &client)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "message": "Verification code sent to your email",
        "expiresInMinutes": issuer.code_lifetime_mins(),
    })))
}
