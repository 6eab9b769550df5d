use actix_web::web::*;

use crate::handlers::error::HttpErrorResponse;

mod health;
mod user;

pub fn configure(cfg: &mut ServiceConfig) {
    let json_config = JsonConfig::default()
        .error_handler(|err, _req| HttpErrorResponse::from(err).into());

    cfg.service(
        scope("/api")
            .app_data(json_config)
            .configure(health::configure)
            .configure(user::configure),
    );
}
