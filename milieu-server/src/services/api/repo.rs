use actix_web::web::*;

use crate::handlers::{self, repo};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        resource("")
            .route(post().to(repo::create))
            .route(get().to(repo::lookup_by_name))
            .default_service(route().to(handlers::method_not_allowed)),
    )
    .service(
        resource("/{repo_id}")
            .route(delete().to(repo::delete))
            .default_service(route().to(handlers::method_not_allowed)),
    )
    .service(
        resource("/{repo_id}/manifest")
            .route(get().to(repo::get_manifest))
            .route(put().to(repo::put_manifest))
            .default_service(route().to(handlers::method_not_allowed)),
    )
    .service(
        resource("/{repo_id}/access")
            .route(get().to(repo::list_access))
            .route(post().to(repo::invite))
            .route(patch().to(repo::update_access))
            .route(delete().to(repo::revoke_access))
            .default_service(route().to(handlers::method_not_allowed)),
    )
    .service(
        resource("/{repo_id}/key")
            .route(get().to(repo::get_repo_key))
            .route(put().to(repo::put_repo_key))
            .default_service(route().to(handlers::method_not_allowed)),
    );
}
