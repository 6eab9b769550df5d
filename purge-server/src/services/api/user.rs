use actix_web::web::*;

use crate::handlers::{deletion, verification_code};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/user")
            .service(resource("/delete_account").route(post().to(deletion::delete_account)))
            .service(
                resource("/verification_code").route(post().to(verification_code::send)),
            ),
    );
}
