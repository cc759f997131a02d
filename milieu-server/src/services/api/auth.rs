use actix_web::web::*;

use crate::handlers::{self, auth};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/auth")
            .service(
                resource("/register")
                    .route(post().to(auth::register))
                    .default_service(route().to(handlers::method_not_allowed)),
            )
            .service(
                resource("/login")
                    .route(post().to(auth::login))
                    .default_service(route().to(handlers::method_not_allowed)),
            )
            .service(
                resource("/logout")
                    .route(post().to(auth::logout))
                    .default_service(route().to(handlers::method_not_allowed)),
            ),
    );
}
