use actix_web::web::*;

use crate::handlers::{self, object};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        resource("/{repo_id}/branches")
            .route(get().to(object::list_branches))
            .default_service(route().to(handlers::method_not_allowed)),
    )
    .service(
        resource("/{repo_id}/branches/{branch}/objects")
            .route(post().to(object::push))
            .default_service(route().to(handlers::method_not_allowed)),
    )
    .service(
        resource("/{repo_id}/branches/{branch}/objects/latest")
            .route(get().to(object::get_latest))
            .default_service(route().to(handlers::method_not_allowed)),
    )
    .service(
        resource("/{repo_id}/branches/{branch}/objects/history")
            .route(get().to(object::get_history))
            .default_service(route().to(handlers::method_not_allowed)),
    )
    .service(
        resource("/{repo_id}/branches/{branch}/objects/version")
            .route(get().to(object::get_version))
            .default_service(route().to(handlers::method_not_allowed)),
    );
}
