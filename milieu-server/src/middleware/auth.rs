use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::web::{self, Data};
use actix_web::{FromRequest, HttpRequest};
use milieu_common::db::{self, DaoError, DbThreadPool};
use milieu_common::token;
use std::future::Future;
use std::pin::Pin;
use std::time::SystemTime;
use uuid::Uuid;

use crate::handlers::error::HttpErrorResponse;

/// Extractor that resolves the `Authorization: Bearer` token to a live
/// session. Handlers taking this parameter are authenticated endpoints.
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub token_digest: Vec<u8>,
}

impl FromRequest for AuthenticatedUser {
    type Error = HttpErrorResponse;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let db_thread_pool = req.app_data::<Data<DbThreadPool>>().cloned();
        let auth_header = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(String::from);

        Box::pin(async move {
            let Some(db_thread_pool) = db_thread_pool else {
                log::error!("DB thread pool was not available to auth extractor");
                return Err(HttpErrorResponse::InternalError);
            };

            let header_value = auth_header.ok_or(HttpErrorResponse::MissingAuth)?;
            let bearer_token = header_value
                .strip_prefix("Bearer ")
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or(HttpErrorResponse::MissingAuth)?;

            let token_digest = token::digest_token(bearer_token);
            let digest_for_query = token_digest.clone();

            let auth_dao = db::auth::Dao::new(&db_thread_pool);
            let (session, email) = match web::block(move || {
                let session = auth_dao.get_session(&digest_for_query)?;
                let email = auth_dao.get_user_email(session.user_id)?;
                Ok::<_, DaoError>((session, email))
            })
            .await?
            {
                Ok(found) => found,
                Err(DaoError::QueryFailure(diesel::result::Error::NotFound)) => {
                    return Err(HttpErrorResponse::InvalidToken);
                }
                Err(e) => {
                    log::error!("{e}");
                    return Err(HttpErrorResponse::InternalError);
                }
            };

            if session.expires_at <= SystemTime::now() {
                return Err(HttpErrorResponse::TokenExpired);
            }

            Ok(AuthenticatedUser {
                user_id: session.user_id,
                email,
                token_digest,
            })
        })
    }
}
