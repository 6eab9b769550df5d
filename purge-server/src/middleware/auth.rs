use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest};
use futures::future;

use crate::handlers::error::HttpErrorResponse;
use crate::middleware::header_value;

const BEARER_PREFIX: &str = "Bearer ";

/// The raw credential from an `Authorization: Bearer <token>` header. Whether the token is
/// acceptable is decided by the identity provider, not here.
#[derive(Debug)]
pub struct BearerToken(pub String);

impl FromRequest for BearerToken {
    type Error = HttpErrorResponse;
    type Future = future::Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match extract_bearer(req) {
            Some(token) => future::ok(BearerToken(String::from(token))),
            None => future::err(HttpErrorResponse::Unauthorized(String::from("Unauthorized"))),
        }
    }
}

#[inline]
fn extract_bearer(req: &HttpRequest) -> Option<&str> {
    let header = header_value(req, AUTHORIZATION.as_str())?;
    let token = header.strip_prefix(BEARER_PREFIX)?.trim();

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[actix_web::test]
    async fn test_bearer_from_header() {
        let (req, mut payload) = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def"))
            .to_http_parts();

        let token = BearerToken::from_request(&req, &mut payload).await.unwrap();
        assert_eq!(token.0, "abc.def");
    }

    #[actix_web::test]
    async fn test_bearer_missing_or_malformed() {
        for header in [None, Some("abc.def"), Some("Basic abc"), Some("Bearer   ")] {
            let mut req = TestRequest::default();
            if let Some(h) = header {
                req = req.insert_header(("Authorization", h));
            }

            let (req, mut payload) = req.to_http_parts();
            let result = BearerToken::from_request(&req, &mut payload).await;

            assert!(matches!(
                result,
                Err(HttpErrorResponse::Unauthorized(_))
            ));
        }
    }
}
