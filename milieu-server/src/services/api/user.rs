use actix_web::web::*;

use crate::handlers::{self, user};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/users/me")
            .service(
                resource("/sessions")
                    .route(get().to(user::list_sessions))
                    .default_service(route().to(handlers::method_not_allowed)),
            )
            .service(
                resource("/repos")
                    .route(get().to(user::list_repos))
                    .default_service(route().to(handlers::method_not_allowed)),
            )
            .service(
                resource("/invites")
                    .route(get().to(user::list_invites))
                    .default_service(route().to(handlers::method_not_allowed)),
            )
            .service(
                resource("/invites/{invite_id}/{action}")
                    .route(post().to(user::invite_action))
                    .default_service(route().to(handlers::method_not_allowed)),
            )
            .service(
                resource("/key")
                    .route(get().to(user::get_user_key))
                    .route(put().to(user::put_user_key))
                    .default_service(route().to(handlers::method_not_allowed)),
            )
            .service(
                resource("/umk")
                    .route(get().to(user::get_umk))
                    .route(put().to(user::put_umk))
                    .default_service(route().to(handlers::method_not_allowed)),
            ),
    );
}
