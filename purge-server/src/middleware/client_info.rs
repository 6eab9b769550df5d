use actix_web::dev::Payload;
use actix_web::http::header::USER_AGENT;
use actix_web::{FromRequest, HttpRequest};
use futures::future::{ready, Ready};

use crate::middleware::header_value;
use crate::orchestrator::ClientInfo;

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const REAL_IP_HEADER: &str = "x-real-ip";
const UNKNOWN: &str = "unknown";

impl FromRequest for ClientInfo {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(client_info(req)))
    }
}

fn client_info(req: &HttpRequest) -> ClientInfo {
    let forwarded = header_value(req, FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    let ip = forwarded
        .or_else(|| header_value(req, REAL_IP_HEADER).map(str::trim))
        .filter(|ip| !ip.is_empty())
        .unwrap_or(UNKNOWN);

    let user_agent = header_value(req, USER_AGENT.as_str())
        .filter(|ua| !ua.is_empty())
        .unwrap_or(UNKNOWN);

    ClientInfo {
        ip: String::from(ip),
        user_agent: String::from(user_agent),
    }
}
