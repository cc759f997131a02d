use actix_web::{web, HttpResponse};
use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use milieu_common::db::object::{ObjectPutOutcome, ObjectRecord};
use milieu_common::db::{self, DaoError, DbThreadPool};
use milieu_common::models::env_object::EnvObject;
use milieu_common::validators;
use serde::Deserialize;
use uuid::Uuid;

use crate::env::Config;
use crate::handlers::error::HttpErrorResponse;
use crate::handlers::{access, unix_millis};
use crate::middleware::auth::AuthenticatedUser;

#[derive(Deserialize)]
pub struct PushObjectRequest {
    pub path: Option<String>,
    pub nonce: Option<String>,
    pub ciphertext: Option<String>,
    pub aad: Option<String>,
    pub ciphertext_hash: Option<String>,
    pub client_created_at: Option<String>,
    pub schema_version: Option<i32>,
}

#[derive(Deserialize)]
pub struct ObjectKeyQuery {
    pub path: Option<String>,
}

#[derive(Deserialize)]
pub struct ObjectVersionQuery {
    pub path: Option<String>,
    pub version: Option<i32>,
}

fn object_json(object: &EnvObject) -> serde_json::Value {
    serde_json::json!({
        "path": object.path,
        "nonce": object.nonce,
        "ciphertext": b64.encode(&object.ciphertext),
        "aad": object.aad,
        "ciphertext_hash": object.ciphertext_hash,
        "version": object.version,
        "created_at": unix_millis(object.created_at),
        "client_created_at": object.client_created_at,
        "schema_version": object.schema_version,
    })
}

fn is_retryable(error: &DaoError) -> bool {
    matches!(
        error,
        DaoError::QueryFailure(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::SerializationFailure
                | diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        ))
    )
}

pub async fn push(
    db_thread_pool: web::Data<DbThreadPool>,
    config: web::Data<Config>,
    authenticated_user: AuthenticatedUser,
    path_params: web::Path<(Uuid, String)>,
    body: web::Json<PushObjectRequest>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let (repo_id, branch) = path_params.into_inner();
    let body = body.into_inner();

    access::require_write(&db_thread_pool, repo_id, authenticated_user.user_id).await?;

    let (Some(path), Some(nonce), Some(ciphertext), Some(aad), Some(ciphertext_hash)) = (
        body.path,
        body.nonce,
        body.ciphertext,
        body.aad,
        body.ciphertext_hash,
    ) else {
        return Err(HttpErrorResponse::InvalidRequest);
    };

    if !validators::is_valid_env_path(&path) {
        return Err(HttpErrorResponse::InvalidPath);
    }

    let ciphertext = b64
        .decode(&ciphertext)
        .map_err(|_| HttpErrorResponse::InvalidCiphertext)?;
    if ciphertext.is_empty() {
        return Err(HttpErrorResponse::InvalidCiphertext);
    }

    let schema_version = body.schema_version.unwrap_or(1);
    let user_id = authenticated_user.user_id;
    let max_repo_bytes = config.max_repo_bytes;
    let history_limit = config.object_history_limit;

    // Concurrent pushes to the same key can collide on the version number.
    // The losing transaction is retried once against the new state.
    let mut attempts_left = 2;
    let outcome = loop {
        attempts_left -= 1;

        let object_dao = db::object::Dao::new(&db_thread_pool);
        let branch = branch.clone();
        let path = path.clone();
        let nonce = nonce.clone();
        let ciphertext = ciphertext.clone();
        let aad = aad.clone();
        let ciphertext_hash = ciphertext_hash.clone();
        let client_created_at = body.client_created_at.clone();

        let result = web::block(move || {
            object_dao.put_object(
                ObjectRecord {
                    repo_id,
                    branch: &branch,
                    path: &path,
                    nonce: &nonce,
                    ciphertext: &ciphertext,
                    aad: &aad,
                    ciphertext_hash: &ciphertext_hash,
                    client_created_at: client_created_at.as_deref(),
                    schema_version,
                },
                user_id,
                max_repo_bytes,
                history_limit,
            )
        })
        .await?;

        match result {
            Ok(outcome) => break outcome,
            Err(e) if is_retryable(&e) && attempts_left > 0 => continue,
            Err(e) => {
                log::error!("{e}");
                return Err(HttpErrorResponse::InternalError);
            }
        }
    };

    match outcome {
        ObjectPutOutcome::Stored(stored) => Ok(HttpResponse::Ok().json(object_json(&stored))),
        ObjectPutOutcome::QuotaExceeded => Err(HttpErrorResponse::RepoSizeExceeded),
    }
}

pub async fn get_latest(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path_params: web::Path<(Uuid, String)>,
    query: web::Query<ObjectKeyQuery>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let (repo_id, branch) = path_params.into_inner();

    access::require_read(&db_thread_pool, repo_id, authenticated_user.user_id).await?;

    let path = query
        .into_inner()
        .path
        .ok_or(HttpErrorResponse::MissingParam("missing_path"))?;

    let object_dao = db::object::Dao::new(&db_thread_pool);
    let object = match web::block(move || object_dao.get_latest(repo_id, &branch, &path)).await? {
        Ok(object) => object,
        Err(DaoError::QueryFailure(diesel::result::Error::NotFound)) => {
            return Err(HttpErrorResponse::NotFound);
        }
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    Ok(HttpResponse::Ok().json(object_json(&object)))
}

pub async fn get_version(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path_params: web::Path<(Uuid, String)>,
    query: web::Query<ObjectVersionQuery>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let (repo_id, branch) = path_params.into_inner();

    access::require_read(&db_thread_pool, repo_id, authenticated_user.user_id).await?;

    let query = query.into_inner();
    let (Some(path), Some(version)) = (query.path, query.version) else {
        return Err(HttpErrorResponse::MissingParam("missing_params"));
    };

    let object_dao = db::object::Dao::new(&db_thread_pool);
    let object =
        match web::block(move || object_dao.get_version(repo_id, &branch, &path, version)).await? {
            Ok(object) => object,
            Err(DaoError::QueryFailure(diesel::result::Error::NotFound)) => {
                return Err(HttpErrorResponse::NotFound);
            }
            Err(e) => {
                log::error!("{e}");
                return Err(HttpErrorResponse::InternalError);
            }
        };

    Ok(HttpResponse::Ok().json(object_json(&object)))
}

pub async fn get_history(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path_params: web::Path<(Uuid, String)>,
    query: web::Query<ObjectKeyQuery>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let (repo_id, branch) = path_params.into_inner();

    access::require_read(&db_thread_pool, repo_id, authenticated_user.user_id).await?;

    let path = query
        .into_inner()
        .path
        .ok_or(HttpErrorResponse::MissingParam("missing_path"))?;

    let object_dao = db::object::Dao::new(&db_thread_pool);
    let history = match web::block(move || object_dao.get_history(repo_id, &branch, &path)).await? {
        Ok(history) => history,
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    let entries: Vec<serde_json::Value> = history
        .iter()
        .map(|(version, created_at, ciphertext_hash)| {
            serde_json::json!({
                "version": version,
                "created_at": unix_millis(*created_at),
                "ciphertext_hash": ciphertext_hash,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(entries))
}

pub async fn list_branches(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path_params: web::Path<Uuid>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let repo_id = path_params.into_inner();

    access::require_read(&db_thread_pool, repo_id, authenticated_user.user_id).await?;

    let object_dao = db::object::Dao::new(&db_thread_pool);
    let branches = match web::block(move || object_dao.list_branches(repo_id)).await? {
        Ok(branches) => branches,
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({ "branches": branches })))
}
