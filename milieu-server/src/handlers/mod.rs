use std::time::{SystemTime, UNIX_EPOCH};

use actix_web::HttpResponse;

use error::HttpErrorResponse;

pub mod auth;
pub mod object;
pub mod repo;
pub mod user;

pub fn unix_millis(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub async fn method_not_allowed() -> Result<HttpResponse, HttpErrorResponse> {
    Err(HttpErrorResponse::MethodNotAllowed)
}

pub async fn not_found() -> Result<HttpResponse, HttpErrorResponse> {
    Err(HttpErrorResponse::NotFound)
}

pub mod access {
    use actix_web::web;
    use milieu_common::db::{self, repo::AccessLevel, DaoError, DbThreadPool};
    use uuid::Uuid;

    use super::error::HttpErrorResponse;

    /// Resolves the caller's access, reporting missing repos and missing
    /// permissions identically so collaborators cannot probe for repos they
    /// were not granted.
    pub async fn get_access_level(
        db_thread_pool: &DbThreadPool,
        repo_id: Uuid,
        user_id: Uuid,
    ) -> Result<AccessLevel, HttpErrorResponse> {
        let repo_dao = db::repo::Dao::new(db_thread_pool);
        match web::block(move || repo_dao.get_access_level(repo_id, user_id)).await? {
            Ok(level) => Ok(level),
            Err(DaoError::QueryFailure(diesel::result::Error::NotFound)) => {
                Err(HttpErrorResponse::RepoNotFound)
            }
            Err(e) => {
                log::error!("{e}");
                Err(HttpErrorResponse::InternalError)
            }
        }
    }

    pub async fn require_read(
        db_thread_pool: &DbThreadPool,
        repo_id: Uuid,
        user_id: Uuid,
    ) -> Result<AccessLevel, HttpErrorResponse> {
        let level = get_access_level(db_thread_pool, repo_id, user_id).await?;

        if !level.can_read() {
            return Err(HttpErrorResponse::RepoNotFound);
        }

        Ok(level)
    }

    pub async fn require_write(
        db_thread_pool: &DbThreadPool,
        repo_id: Uuid,
        user_id: Uuid,
    ) -> Result<AccessLevel, HttpErrorResponse> {
        let level = get_access_level(db_thread_pool, repo_id, user_id).await?;

        if !level.can_write() {
            return Err(HttpErrorResponse::RepoNotFound);
        }

        Ok(level)
    }

    pub async fn require_owner(
        db_thread_pool: &DbThreadPool,
        repo_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), HttpErrorResponse> {
        let level = get_access_level(db_thread_pool, repo_id, user_id).await?;

        if level != AccessLevel::Owner {
            return Err(HttpErrorResponse::RepoNotFound);
        }

        Ok(())
    }
}

pub mod error {
    use actix_web::http::StatusCode;
    use actix_web::{HttpResponse, HttpResponseBuilder};
    use std::fmt;
    use tokio::sync::oneshot;

    /// Error responses are serialized as `{"error": "<code>"}` with the
    /// status code determined by the variant.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum HttpErrorResponse {
        // 400
        InvalidRequest,
        InvalidEmail,
        InvalidRepoName,
        InvalidPath,
        InvalidRole,
        InvalidAction,
        InvalidCiphertext,
        CannotInviteOwner,
        RepoIdMismatch,
        MissingParam(&'static str),

        // 401
        MissingAuth,
        InvalidToken,
        TokenExpired,
        InvalidCredentials,

        // 404
        NotFound,
        RepoNotFound,
        UserNotFound,
        AccessNotFound,
        InviteNotFound,

        // 405
        MethodNotAllowed,

        // 409
        EmailExists,
        RepoExists,
        AlreadyHasAccess,

        // 413
        RepoSizeExceeded,

        // 429
        RateLimited,

        // 500
        InternalError,
    }

    impl HttpErrorResponse {
        pub fn error_code(&self) -> &'static str {
            match self {
                HttpErrorResponse::InvalidRequest => "invalid_request",
                HttpErrorResponse::InvalidEmail => "invalid_email",
                HttpErrorResponse::InvalidRepoName => "invalid_repo_name",
                HttpErrorResponse::InvalidPath => "invalid_path",
                HttpErrorResponse::InvalidRole => "invalid_role",
                HttpErrorResponse::InvalidAction => "invalid_action",
                HttpErrorResponse::InvalidCiphertext => "invalid_ciphertext",
                HttpErrorResponse::CannotInviteOwner => "cannot_invite_owner",
                HttpErrorResponse::RepoIdMismatch => "repo_id_mismatch",
                HttpErrorResponse::MissingParam(code) => code,

                HttpErrorResponse::MissingAuth => "missing_auth",
                HttpErrorResponse::InvalidToken => "invalid_token",
                HttpErrorResponse::TokenExpired => "token_expired",
                HttpErrorResponse::InvalidCredentials => "invalid_credentials",

                HttpErrorResponse::NotFound => "not_found",
                HttpErrorResponse::RepoNotFound => "repo_not_found",
                HttpErrorResponse::UserNotFound => "user_not_found",
                HttpErrorResponse::AccessNotFound => "access_not_found",
                HttpErrorResponse::InviteNotFound => "invite_not_found",

                HttpErrorResponse::MethodNotAllowed => "method_not_allowed",

                HttpErrorResponse::EmailExists => "email_exists",
                HttpErrorResponse::RepoExists => "repo_exists",
                HttpErrorResponse::AlreadyHasAccess => "already_has_access",

                HttpErrorResponse::RepoSizeExceeded => "repo_size_exceeded",

                HttpErrorResponse::RateLimited => "rate_limited",

                HttpErrorResponse::InternalError => "internal_error",
            }
        }
    }

    impl std::error::Error for HttpErrorResponse {}

    impl fmt::Display for HttpErrorResponse {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.error_code())
        }
    }

    impl actix_web::error::ResponseError for HttpErrorResponse {
        fn error_response(&self) -> HttpResponse {
            HttpResponseBuilder::new(self.status_code())
                .json(serde_json::json!({ "error": self.error_code() }))
        }

        fn status_code(&self) -> StatusCode {
            match *self {
                HttpErrorResponse::InvalidRequest
                | HttpErrorResponse::InvalidEmail
                | HttpErrorResponse::InvalidRepoName
                | HttpErrorResponse::InvalidPath
                | HttpErrorResponse::InvalidRole
                | HttpErrorResponse::InvalidAction
                | HttpErrorResponse::InvalidCiphertext
                | HttpErrorResponse::CannotInviteOwner
                | HttpErrorResponse::RepoIdMismatch
                | HttpErrorResponse::MissingParam(_) => StatusCode::BAD_REQUEST,
                HttpErrorResponse::MissingAuth
                | HttpErrorResponse::InvalidToken
                | HttpErrorResponse::TokenExpired
                | HttpErrorResponse::InvalidCredentials => StatusCode::UNAUTHORIZED,
                HttpErrorResponse::NotFound
                | HttpErrorResponse::RepoNotFound
                | HttpErrorResponse::UserNotFound
                | HttpErrorResponse::AccessNotFound
                | HttpErrorResponse::InviteNotFound => StatusCode::NOT_FOUND,
                HttpErrorResponse::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
                HttpErrorResponse::EmailExists
                | HttpErrorResponse::RepoExists
                | HttpErrorResponse::AlreadyHasAccess => StatusCode::CONFLICT,
                HttpErrorResponse::RepoSizeExceeded => StatusCode::PAYLOAD_TOO_LARGE,
                HttpErrorResponse::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                HttpErrorResponse::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    impl From<actix_web::error::BlockingError> for HttpErrorResponse {
        fn from(_err: actix_web::error::BlockingError) -> Self {
            HttpErrorResponse::InternalError
        }
    }

    impl From<oneshot::error::RecvError> for HttpErrorResponse {
        fn from(_err: oneshot::error::RecvError) -> Self {
            HttpErrorResponse::InternalError
        }
    }
}
