pub mod deletion;
pub mod health;
pub mod verification_code;

pub mod error {
    use actix_web::http::{header, StatusCode};
    use actix_web::{HttpResponse, HttpResponseBuilder};
    use serde_json::json;
    use std::fmt;

    use crate::orchestrator::gate::ReauthMethod;
    use crate::orchestrator::{DeletionError, GENERIC_ERROR_MSG};

    pub const REAUTH_REQUIRED_MSG: &str =
        "Re-authentication required. Please provide current password or verification code.";
    pub const REAUTH_FAILED_MSG: &str =
        "Re-authentication failed. Please check your credentials and try again.";

    #[derive(Debug)]
    pub enum HttpErrorResponse {
        // 400
        IncorrectlyFormed(String),

        // 401
        Unauthorized(String),
        IncorrectCredential(String),
        ReauthRequired(ReauthMethod),

        // 409
        ConflictWithExisting(String),

        // 429
        TooManyAttempts {
            message: String,
            retry_after_secs: u64,
        },

        // 500
        InternalError(String),

        // 503
        Unavailable(String),
    }

    impl HttpErrorResponse {
        fn message(&self) -> &str {
            match self {
                HttpErrorResponse::IncorrectlyFormed(msg)
                | HttpErrorResponse::Unauthorized(msg)
                | HttpErrorResponse::IncorrectCredential(msg)
                | HttpErrorResponse::ConflictWithExisting(msg)
                | HttpErrorResponse::TooManyAttempts { message: msg, .. }
                | HttpErrorResponse::InternalError(msg)
                | HttpErrorResponse::Unavailable(msg) => msg,
                HttpErrorResponse::ReauthRequired(_) => REAUTH_REQUIRED_MSG,
            }
        }

        fn body(&self) -> serde_json::Value {
            match self {
                HttpErrorResponse::ReauthRequired(method) => json!({
                    "error": self.message(),
                    "requiresReauth": true,
                    "authMethod": method.as_str(),
                }),
                HttpErrorResponse::TooManyAttempts {
                    retry_after_secs, ..
                } => json!({
                    "error": self.message(),
                    "retryAfter": retry_after_secs,
                }),
                _ => json!({ "error": self.message() }),
            }
        }
    }

    impl std::error::Error for HttpErrorResponse {}

    impl fmt::Display for HttpErrorResponse {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} {}", self.status_code().as_u16(), self.message())
        }
    }

    impl actix_web::error::ResponseError for HttpErrorResponse {
        fn error_response(&self) -> HttpResponse {
            let mut builder = HttpResponseBuilder::new(self.status_code());

            if let HttpErrorResponse::TooManyAttempts {
                retry_after_secs, ..
            } = self
            {
                builder.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
            }

            builder.json(self.body())
        }

        fn status_code(&self) -> StatusCode {
            match *self {
                HttpErrorResponse::IncorrectlyFormed(_) => StatusCode::BAD_REQUEST,
                HttpErrorResponse::Unauthorized(_)
                | HttpErrorResponse::IncorrectCredential(_)
                | HttpErrorResponse::ReauthRequired(_) => StatusCode::UNAUTHORIZED,
                HttpErrorResponse::ConflictWithExisting(_) => StatusCode::CONFLICT,
                HttpErrorResponse::TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
                HttpErrorResponse::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                HttpErrorResponse::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            }
        }
    }

    impl From<DeletionError> for HttpErrorResponse {
        fn from(err: DeletionError) -> Self {
            match err {
                DeletionError::Unauthorized => {
                    HttpErrorResponse::Unauthorized(String::from("Unauthorized"))
                }
                DeletionError::InvalidInput(msg) => HttpErrorResponse::IncorrectlyFormed(msg),
                DeletionError::AlreadyInProgress => HttpErrorResponse::ConflictWithExisting(
                    String::from("Account deletion is already in progress"),
                ),
                DeletionError::TooManyAttempts { retry_after_secs } => {
                    HttpErrorResponse::TooManyAttempts {
                        message: String::from(
                            "Too many deletion attempts. Please wait before trying again.",
                        ),
                        retry_after_secs,
                    }
                }
                DeletionError::ReauthRequired { method } => {
                    HttpErrorResponse::ReauthRequired(method)
                }
                DeletionError::ReauthFailed => {
                    HttpErrorResponse::IncorrectCredential(String::from(REAUTH_FAILED_MSG))
                }
                DeletionError::CriticalErasureFailure { message, detail } => {
                    log::error!("{detail}");
                    HttpErrorResponse::InternalError(message)
                }
                DeletionError::Fatal(msg) => {
                    log::error!("{msg}");
                    HttpErrorResponse::InternalError(String::from(GENERIC_ERROR_MSG))
                }
                DeletionError::Unavailable(msg) => {
                    log::error!("{msg}");
                    HttpErrorResponse::Unavailable(String::from(
                        "Service temporarily unavailable. Please try again later.",
                    ))
                }
            }
        }
    }

    impl From<actix_web::error::JsonPayloadError> for HttpErrorResponse {
        fn from(_err: actix_web::error::JsonPayloadError) -> Self {
            HttpErrorResponse::IncorrectlyFormed(String::from("Invalid JSON body"))
        }
    }

}

#[cfg(test)]
pub mod test_utils {
    use actix_web::web::Data;
    use actix_web::App;
    use purge_common::email::senders::MockSender;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::handlers::verification_code::VerificationCodeIssuer;
    use crate::orchestrator::testing::Fakes;
    use crate::services;

    pub fn issuer(fakes: &Fakes, email: &Arc<MockSender>) -> VerificationCodeIssuer {
        VerificationCodeIssuer::new(
            &fakes.collaborators(),
            email.clone(),
            Duration::from_secs(600),
            "Purge <no-reply@example.com>".parse().unwrap(),
            "Purge Support <support@example.com>".parse().unwrap(),
        )
    }

    /// The full API wired to in-memory fakes.
    pub fn app(
        fakes: &Fakes,
        email: &Arc<MockSender>,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        let orchestrator = Data::from(fakes.orchestrator());
        let issuer = Data::new(issuer(fakes, email));

        App::new()
            .app_data(orchestrator)
            .app_data(issuer)
            .configure(services::api::configure)
    }
}
