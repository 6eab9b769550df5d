pub mod auth;
pub mod client_info;

use actix_web::HttpRequest;

#[inline]
fn header_value<'a>(req: &'a HttpRequest, key: &str) -> Option<&'a str> {
    let header = req.headers().get(key)?;
    header.to_str().ok()
}
