use actix_web::web::*;

mod auth;
mod object;
mod repo;
mod user;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/v1")
            .configure(auth::configure)
            .configure(user::configure)
            .service(
                scope("/repos")
                    .configure(repo::configure)
                    .configure(object::configure),
            ),
    );
}
