use actix_web::{web, HttpResponse};
use milieu_common::db::{self, DaoError, DbThreadPool};
use milieu_common::models::repo_access::AccessRole;
use milieu_common::validators;
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::error::HttpErrorResponse;
use crate::handlers::{access, unix_millis};
use crate::middleware::auth::AuthenticatedUser;

#[derive(Deserialize)]
pub struct CreateRepoRequest {
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct RepoLookupQuery {
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct AccessChangeRequest {
    pub email: Option<String>,
    pub role: Option<String>,
}

#[derive(Deserialize)]
pub struct RevokeAccessQuery {
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct PutRepoKeyRequest {
    pub wrapped_key: Option<String>,
    pub algorithm: Option<String>,
    pub email: Option<String>,
}

pub async fn create(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    body: web::Json<CreateRepoRequest>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let name = body
        .into_inner()
        .name
        .map(|n| String::from(n.trim()))
        .ok_or(HttpErrorResponse::InvalidRequest)?;

    if !validators::is_valid_repo_name(&name) {
        return Err(HttpErrorResponse::InvalidRepoName);
    }

    let repo_id = Uuid::now_v7();

    // Clients keep the manifest encrypted after onboarding; the server only
    // seeds the initial plaintext skeleton
    let manifest = serde_json::json!({
        "version": 1,
        "repo_id": repo_id,
        "repo_name": name,
        "active_branch": "dev",
        "branches": [{ "name": "dev", "files": [] }],
    })
    .to_string();

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let user_id = authenticated_user.user_id;
    let name_for_insert = name.clone();

    match web::block(move || repo_dao.create_repo(repo_id, user_id, &name_for_insert, &manifest))
        .await?
    {
        Ok(()) => (),
        Err(DaoError::QueryFailure(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        ))) => {
            return Err(HttpErrorResponse::RepoExists);
        }
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    }

    Ok(HttpResponse::Created().json(serde_json::json!({ "repo_id": repo_id, "name": name })))
}

pub async fn lookup_by_name(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    query: web::Query<RepoLookupQuery>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let name = query
        .into_inner()
        .name
        .filter(|n| !n.is_empty())
        .ok_or(HttpErrorResponse::MissingParam("missing_name"))?;

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let user_id = authenticated_user.user_id;

    let (repo_id, name) =
        match web::block(move || repo_dao.get_repo_by_name_for_user(user_id, &name)).await? {
            Ok(found) => found,
            Err(DaoError::QueryFailure(diesel::result::Error::NotFound)) => {
                return Err(HttpErrorResponse::RepoNotFound);
            }
            Err(e) => {
                log::error!("{e}");
                return Err(HttpErrorResponse::InternalError);
            }
        };

    Ok(HttpResponse::Ok().json(serde_json::json!({ "repo_id": repo_id, "name": name })))
}

pub async fn delete(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let repo_id = path.into_inner();

    access::require_owner(&db_thread_pool, repo_id, authenticated_user.user_id).await?;

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    match web::block(move || repo_dao.delete_repo(repo_id)).await? {
        Ok(()) => (),
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

pub async fn get_manifest(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let repo_id = path.into_inner();

    access::require_read(&db_thread_pool, repo_id, authenticated_user.user_id).await?;

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let manifest = match web::block(move || repo_dao.get_manifest(repo_id)).await? {
        Ok(manifest) => manifest,
        Err(DaoError::QueryFailure(diesel::result::Error::NotFound)) => {
            return Err(HttpErrorResponse::RepoNotFound);
        }
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    if manifest.trim().is_empty() {
        return Err(HttpErrorResponse::NotFound);
    }

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .body(manifest))
}

pub async fn put_manifest(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let repo_id = path.into_inner();
    let body = body.into_inner();

    access::require_write(&db_thread_pool, repo_id, authenticated_user.user_id).await?;

    let manifest_repo_id = body.get("repo_id").and_then(|v| v.as_str());
    let manifest_repo_name = body.get("repo_name").and_then(|v| v.as_str());

    let (Some(manifest_repo_id), Some(_)) = (manifest_repo_id, manifest_repo_name) else {
        return Err(HttpErrorResponse::InvalidRequest);
    };

    if manifest_repo_id.parse::<Uuid>() != Ok(repo_id) {
        return Err(HttpErrorResponse::RepoIdMismatch);
    }

    let manifest = body.to_string();
    let repo_dao = db::repo::Dao::new(&db_thread_pool);

    match web::block(move || repo_dao.put_manifest(repo_id, &manifest)).await? {
        Ok(()) => (),
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

pub async fn list_access(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let repo_id = path.into_inner();

    access::require_owner(&db_thread_pool, repo_id, authenticated_user.user_id).await?;

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let (active, pending) = match web::block(move || {
        let active = repo_dao.list_active_access(repo_id)?;
        let pending = repo_dao.list_pending_invites(repo_id)?;
        Ok::<_, DaoError>((active, pending))
    })
    .await?
    {
        Ok(listed) => listed,
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    let mut entries: Vec<serde_json::Value> = active
        .iter()
        .map(|entry| {
            serde_json::json!({
                "email": entry.email,
                "role": entry.role,
                "status": "active",
                "created_at": unix_millis(entry.created_at),
                "public_key": entry.public_key,
                "key_algorithm": entry.key_algorithm,
            })
        })
        .collect();

    entries.extend(pending.iter().map(|entry| {
        serde_json::json!({
            "email": entry.email,
            "role": entry.role,
            "status": "pending",
            "invited_by": entry.invited_by,
            "created_at": unix_millis(entry.created_at),
        })
    }));

    Ok(HttpResponse::Ok().json(serde_json::json!({ "entries": entries })))
}

pub async fn invite(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<AccessChangeRequest>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let repo_id = path.into_inner();
    let body = body.into_inner();

    access::require_owner(&db_thread_pool, repo_id, authenticated_user.user_id).await?;

    let email = body
        .email
        .as_deref()
        .and_then(validators::normalize_email)
        .ok_or(HttpErrorResponse::InvalidEmail)?;

    let role = match body.role.as_deref() {
        None => AccessRole::Read,
        Some(r) => r.parse().map_err(|_| HttpErrorResponse::InvalidRole)?,
    };

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let (_, owner_email) = match web::block(move || repo_dao.get_owner(repo_id)).await? {
        Ok(owner) => owner,
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    if owner_email == email {
        return Err(HttpErrorResponse::CannotInviteOwner);
    }

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let email_for_check = email.clone();
    let has_access =
        match web::block(move || repo_dao.user_has_access(repo_id, &email_for_check)).await? {
            Ok(has) => has,
            Err(e) => {
                log::error!("{e}");
                return Err(HttpErrorResponse::InternalError);
            }
        };

    if has_access {
        return Err(HttpErrorResponse::AlreadyHasAccess);
    }

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let invited_by = authenticated_user.user_id;

    let invite_id = match web::block(move || {
        repo_dao.create_or_refresh_invite(repo_id, &email, invited_by, role)
    })
    .await?
    {
        Ok(id) => id,
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true, "invite_id": invite_id })))
}

pub async fn update_access(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<AccessChangeRequest>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let repo_id = path.into_inner();
    let body = body.into_inner();

    access::require_owner(&db_thread_pool, repo_id, authenticated_user.user_id).await?;

    let email = body
        .email
        .as_deref()
        .and_then(validators::normalize_email)
        .ok_or(HttpErrorResponse::InvalidEmail)?;

    let role: AccessRole = body
        .role
        .as_deref()
        .ok_or(HttpErrorResponse::InvalidRole)?
        .parse()
        .map_err(|_| HttpErrorResponse::InvalidRole)?;

    // A pending invite is updated in place; otherwise the active access row
    // is the target
    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let email_for_invite = email.clone();
    let updated_invites = match web::block(move || {
        repo_dao.set_pending_invite_role(repo_id, &email_for_invite, role)
    })
    .await?
    {
        Ok(count) => count,
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    if updated_invites > 0 {
        return Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })));
    }

    let auth_dao = db::auth::Dao::new(&db_thread_pool);
    let email_for_lookup = email.clone();
    let target_user_id =
        match web::block(move || auth_dao.get_user_id_by_email(&email_for_lookup)).await? {
            Ok(id) => id,
            Err(DaoError::QueryFailure(diesel::result::Error::NotFound)) => {
                return Err(HttpErrorResponse::UserNotFound);
            }
            Err(e) => {
                log::error!("{e}");
                return Err(HttpErrorResponse::InternalError);
            }
        };

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let updated =
        match web::block(move || repo_dao.set_access_role(repo_id, target_user_id, role)).await? {
            Ok(count) => count,
            Err(e) => {
                log::error!("{e}");
                return Err(HttpErrorResponse::InternalError);
            }
        };

    if updated == 0 {
        return Err(HttpErrorResponse::AccessNotFound);
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

pub async fn revoke_access(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path: web::Path<Uuid>,
    query: web::Query<RevokeAccessQuery>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let repo_id = path.into_inner();

    access::require_owner(&db_thread_pool, repo_id, authenticated_user.user_id).await?;

    let email = query
        .into_inner()
        .email
        .ok_or(HttpErrorResponse::MissingParam("missing_email"))?;
    let email =
        validators::normalize_email(&email).ok_or(HttpErrorResponse::InvalidEmail)?;

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let email_for_invite = email.clone();
    let revoked_invites =
        match web::block(move || repo_dao.revoke_pending_invite(repo_id, &email_for_invite))
            .await?
        {
            Ok(count) => count,
            Err(e) => {
                log::error!("{e}");
                return Err(HttpErrorResponse::InternalError);
            }
        };

    if revoked_invites > 0 {
        return Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })));
    }

    let auth_dao = db::auth::Dao::new(&db_thread_pool);
    let email_for_lookup = email.clone();
    let target_user_id =
        match web::block(move || auth_dao.get_user_id_by_email(&email_for_lookup)).await? {
            Ok(id) => id,
            Err(DaoError::QueryFailure(diesel::result::Error::NotFound)) => {
                return Err(HttpErrorResponse::UserNotFound);
            }
            Err(e) => {
                log::error!("{e}");
                return Err(HttpErrorResponse::InternalError);
            }
        };

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let removed =
        match web::block(move || repo_dao.remove_access(repo_id, target_user_id)).await? {
            Ok(count) => count,
            Err(e) => {
                log::error!("{e}");
                return Err(HttpErrorResponse::InternalError);
            }
        };

    if removed == 0 {
        return Err(HttpErrorResponse::AccessNotFound);
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

pub async fn get_repo_key(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let repo_id = path.into_inner();
    let user_id = authenticated_user.user_id;

    access::require_read(&db_thread_pool, repo_id, user_id).await?;

    let keys_dao = db::keys::Dao::new(&db_thread_pool);
    let key = match web::block(move || keys_dao.get_repo_key(repo_id, user_id)).await? {
        Ok(key) => key,
        Err(DaoError::QueryFailure(diesel::result::Error::NotFound)) => {
            return Err(HttpErrorResponse::NotFound);
        }
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "wrapped_key": key.wrapped_key,
        "algorithm": key.algorithm,
        "created_at": unix_millis(key.created_at),
        "updated_at": unix_millis(key.updated_at),
    })))
}

pub async fn put_repo_key(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<PutRepoKeyRequest>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let repo_id = path.into_inner();
    let body = body.into_inner();

    let (Some(wrapped_key), Some(algorithm)) = (body.wrapped_key, body.algorithm) else {
        return Err(HttpErrorResponse::InvalidRequest);
    };

    if wrapped_key.is_empty() || algorithm.is_empty() {
        return Err(HttpErrorResponse::InvalidRequest);
    }

    let target_email = match body.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(e) => validators::normalize_email(e).ok_or(HttpErrorResponse::InvalidEmail)?,
        None => authenticated_user.email.clone(),
    };

    // Distributing a wrapped key to someone else is an owner operation;
    // storing your own copy only needs access to the repo
    if target_email != authenticated_user.email {
        access::require_owner(&db_thread_pool, repo_id, authenticated_user.user_id).await?;
    } else {
        access::require_read(&db_thread_pool, repo_id, authenticated_user.user_id).await?;
    }

    let auth_dao = db::auth::Dao::new(&db_thread_pool);
    let email_for_lookup = target_email.clone();
    let target_user_id =
        match web::block(move || auth_dao.get_user_id_by_email(&email_for_lookup)).await? {
            Ok(id) => id,
            Err(DaoError::QueryFailure(diesel::result::Error::NotFound)) => {
                return Err(HttpErrorResponse::UserNotFound);
            }
            Err(e) => {
                log::error!("{e}");
                return Err(HttpErrorResponse::InternalError);
            }
        };

    let keys_dao = db::keys::Dao::new(&db_thread_pool);
    let requester_user_id = authenticated_user.user_id;
    let requester_email = authenticated_user.email;

    match web::block(move || {
        keys_dao.upsert_repo_key(
            repo_id,
            target_user_id,
            &target_email,
            requester_user_id,
            &requester_email,
            &wrapped_key,
            &algorithm,
        )
    })
    .await?
    {
        Ok(()) => (),
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use actix_web::test::{self, TestRequest};
    use actix_web::web::Data;
    use actix_web::{web, App};

    use crate::env;
    use crate::handlers::test_utils;

    async fn body_json(resp: actix_web::dev::ServiceResponse) -> serde_json::Value {
        serde_json::from_slice(&to_bytes(resp.into_body()).await.unwrap()).unwrap()
    }

    macro_rules! test_app {
        () => {
            test::init_service(
                App::new()
                    .app_data(Data::new(env::testing::DB_THREAD_POOL.clone()))
                    .app_data(Data::new(env::testing::test_config()))
                    .configure(crate::services::api::configure)
                    .default_service(web::route().to(crate::handlers::not_found)),
            )
            .await
        };
    }

    macro_rules! invite {
        ($app:expr, $owner_token:expr, $repo_id:expr, $email:expr, $role:expr) => {{
            let req = TestRequest::post()
                .uri(&format!("/v1/repos/{}/access", $repo_id))
                .insert_header(("Authorization", format!("Bearer {}", $owner_token)))
                .set_json(serde_json::json!({ "email": $email, "role": $role }))
                .to_request();
            test::call_service($app, req).await
        }};
    }

    macro_rules! accept_invite {
        ($app:expr, $invitee_token:expr, $invite_id:expr) => {{
            let req = TestRequest::post()
                .uri(&format!("/v1/users/me/invites/{}/accept", $invite_id))
                .insert_header(("Authorization", format!("Bearer {}", $invitee_token)))
                .to_request();
            let resp = test::call_service($app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }};
    }

    #[actix_rt::test]
    async fn test_create_lookup_and_duplicates() {
        let app = test_app!();

        let owner = test_utils::create_user().await;

        let req = TestRequest::post()
            .uri("/v1/repos")
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({ "name": "my-app" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body = body_json(resp).await;
        let repo_id = String::from(body["repo_id"].as_str().unwrap());
        assert_eq!(body["name"], "my-app");

        let req = TestRequest::get()
            .uri("/v1/repos?name=my-app")
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["repo_id"].as_str().unwrap(), repo_id);

        let req = TestRequest::get()
            .uri("/v1/repos")
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "missing_name");

        let req = TestRequest::post()
            .uri("/v1/repos")
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({ "name": "my-app" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(resp).await["error"], "repo_exists");

        let req = TestRequest::post()
            .uri("/v1/repos")
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({ "name": "bad name!" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "invalid_repo_name");
    }

    #[actix_rt::test]
    async fn test_manifest_flow() {
        let app = test_app!();

        let owner = test_utils::create_user().await;
        let repo_id = test_utils::create_repo(&owner.access_token, "manifest-repo").await;

        let req = TestRequest::get()
            .uri(&format!("/v1/repos/{repo_id}/manifest"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let manifest = body_json(resp).await;
        assert_eq!(manifest["repo_id"].as_str().unwrap(), repo_id.to_string());
        assert_eq!(manifest["active_branch"], "dev");
        assert_eq!(manifest["branches"][0]["name"], "dev");

        // The manifest must name the repo it belongs to
        let req = TestRequest::put()
            .uri(&format!("/v1/repos/{repo_id}/manifest"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({
                "repo_id": uuid::Uuid::now_v7(),
                "repo_name": "manifest-repo",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "repo_id_mismatch");

        let req = TestRequest::put()
            .uri(&format!("/v1/repos/{repo_id}/manifest"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({
                "repo_id": repo_id,
                "repo_name": "manifest-repo",
                "active_branch": "main",
                "branches": [{ "name": "main", "files": [".env"] }],
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = TestRequest::get()
            .uri(&format!("/v1/repos/{repo_id}/manifest"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let manifest = body_json(resp).await;
        assert_eq!(manifest["active_branch"], "main");
    }

    #[actix_rt::test]
    async fn test_missing_repos_and_access_are_indistinguishable() {
        let app = test_app!();

        let owner = test_utils::create_user().await;
        let stranger = test_utils::create_user().await;
        let repo_id = test_utils::create_repo(&owner.access_token, "private-repo").await;

        let req = TestRequest::get()
            .uri(&format!("/v1/repos/{repo_id}/manifest"))
            .insert_header(("Authorization", format!("Bearer {}", stranger.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "repo_not_found");

        let req = TestRequest::get()
            .uri(&format!("/v1/repos/{}/manifest", uuid::Uuid::now_v7()))
            .insert_header(("Authorization", format!("Bearer {}", stranger.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "repo_not_found");

        // A read-only collaborator cannot manage access either
        let reader = test_utils::create_user().await;
        let resp = invite!(&app, owner.access_token, repo_id, reader.email, "read");
        let invite_id = String::from(body_json(resp).await["invite_id"].as_str().unwrap());
        accept_invite!(&app, reader.access_token, invite_id);

        let req = TestRequest::get()
            .uri(&format!("/v1/repos/{repo_id}/access"))
            .insert_header(("Authorization", format!("Bearer {}", reader.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "repo_not_found");
    }

    #[actix_rt::test]
    async fn test_invite_constraints() {
        let app = test_app!();

        let owner = test_utils::create_user().await;
        let member = test_utils::create_user().await;
        let repo_id = test_utils::create_repo(&owner.access_token, "invite-rules").await;

        let resp = invite!(&app, owner.access_token, repo_id, owner.email, "read");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "cannot_invite_owner");

        let resp = invite!(&app, owner.access_token, repo_id, member.email, "read");
        assert_eq!(resp.status(), StatusCode::OK);
        let first_invite_id = String::from(body_json(resp).await["invite_id"].as_str().unwrap());

        // Re-inviting while pending refreshes the same invite
        let resp = invite!(&app, owner.access_token, repo_id, member.email, "write");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await["invite_id"].as_str().unwrap(),
            first_invite_id
        );

        accept_invite!(&app, member.access_token, first_invite_id);

        let resp = invite!(&app, owner.access_token, repo_id, member.email, "read");
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(resp).await["error"], "already_has_access");

        let resp = invite!(&app, owner.access_token, repo_id, member.email, "admin");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "invalid_role");
    }

    #[actix_rt::test]
    async fn test_access_listing_active_then_pending() {
        let app = test_app!();

        let owner = test_utils::create_user().await;
        let member = test_utils::create_user().await;
        let invitee = test_utils::create_user().await;
        let repo_id = test_utils::create_repo(&owner.access_token, "access-list").await;

        let resp = invite!(&app, owner.access_token, repo_id, member.email, "write");
        let invite_id = String::from(body_json(resp).await["invite_id"].as_str().unwrap());
        accept_invite!(&app, member.access_token, invite_id);

        let resp = invite!(&app, owner.access_token, repo_id, invitee.email, "read");
        assert_eq!(resp.status(), StatusCode::OK);

        let req = TestRequest::get()
            .uri(&format!("/v1/repos/{repo_id}/access"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        let entries = body["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["email"], member.email);
        assert_eq!(entries[0]["status"], "active");
        assert_eq!(entries[0]["role"], "write");
        assert_eq!(entries[1]["email"], invitee.email);
        assert_eq!(entries[1]["status"], "pending");
        assert_eq!(entries[1]["invited_by"], owner.email);
    }

    #[actix_rt::test]
    async fn test_update_and_revoke_access() {
        let app = test_app!();

        let owner = test_utils::create_user().await;
        let member = test_utils::create_user().await;
        let outsider = test_utils::create_user().await;
        let repo_id = test_utils::create_repo(&owner.access_token, "role-changes").await;

        let resp = invite!(&app, owner.access_token, repo_id, member.email, "read");
        let invite_id = String::from(body_json(resp).await["invite_id"].as_str().unwrap());
        accept_invite!(&app, member.access_token, invite_id);

        let req = TestRequest::patch()
            .uri(&format!("/v1/repos/{repo_id}/access"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({ "email": member.email, "role": "write" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = TestRequest::patch()
            .uri(&format!("/v1/repos/{repo_id}/access"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({
                "email": format!("nobody-{}", member.email),
                "role": "read",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "user_not_found");

        let req = TestRequest::patch()
            .uri(&format!("/v1/repos/{repo_id}/access"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({ "email": outsider.email, "role": "read" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "access_not_found");

        let req = TestRequest::delete()
            .uri(&format!("/v1/repos/{repo_id}/access"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "missing_email");

        let req = TestRequest::delete()
            .uri(&format!("/v1/repos/{repo_id}/access?email={}", member.email))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // The revoked collaborator is back to square one
        let req = TestRequest::get()
            .uri(&format!("/v1/repos/{repo_id}/manifest"))
            .insert_header(("Authorization", format!("Bearer {}", member.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "repo_not_found");

        let req = TestRequest::delete()
            .uri(&format!("/v1/repos/{repo_id}/access?email={}", member.email))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "access_not_found");
    }

    #[actix_rt::test]
    async fn test_delete_repo_requires_owner() {
        let app = test_app!();

        let owner = test_utils::create_user().await;
        let member = test_utils::create_user().await;
        let repo_id = test_utils::create_repo(&owner.access_token, "doomed-repo").await;

        let resp = invite!(&app, owner.access_token, repo_id, member.email, "write");
        let invite_id = String::from(body_json(resp).await["invite_id"].as_str().unwrap());
        accept_invite!(&app, member.access_token, invite_id);

        let req = TestRequest::delete()
            .uri(&format!("/v1/repos/{repo_id}"))
            .insert_header(("Authorization", format!("Bearer {}", member.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "repo_not_found");

        let req = TestRequest::delete()
            .uri(&format!("/v1/repos/{repo_id}"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = TestRequest::get()
            .uri(&format!("/v1/repos/{repo_id}/manifest"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = TestRequest::get()
            .uri("/v1/users/me/repos")
            .insert_header(("Authorization", format!("Bearer {}", member.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(body_json(resp).await["repos"].as_array().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_repo_key_distribution() {
        let app = test_app!();

        let owner = test_utils::create_user().await;
        let member = test_utils::create_user().await;
        let repo_id = test_utils::create_repo(&owner.access_token, "keyed-repo").await;

        let resp = invite!(&app, owner.access_token, repo_id, member.email, "read");
        let invite_id = String::from(body_json(resp).await["invite_id"].as_str().unwrap());
        accept_invite!(&app, member.access_token, invite_id);

        let req = TestRequest::get()
            .uri(&format!("/v1/repos/{repo_id}/key"))
            .insert_header(("Authorization", format!("Bearer {}", member.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "not_found");

        // The owner wraps the repo key for the collaborator
        let req = TestRequest::put()
            .uri(&format!("/v1/repos/{repo_id}/key"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({
                "wrapped_key": "wrapped-for-member",
                "algorithm": "x25519-xsalsa20",
                "email": member.email,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = TestRequest::get()
            .uri(&format!("/v1/repos/{repo_id}/key"))
            .insert_header(("Authorization", format!("Bearer {}", member.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["wrapped_key"], "wrapped-for-member");

        // A collaborator may store their own copy but not distribute keys
        let req = TestRequest::put()
            .uri(&format!("/v1/repos/{repo_id}/key"))
            .insert_header(("Authorization", format!("Bearer {}", member.access_token)))
            .set_json(serde_json::json!({
                "wrapped_key": "rewrapped-by-member",
                "algorithm": "x25519-xsalsa20",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = TestRequest::put()
            .uri(&format!("/v1/repos/{repo_id}/key"))
            .insert_header(("Authorization", format!("Bearer {}", member.access_token)))
            .set_json(serde_json::json!({
                "wrapped_key": "sneaky",
                "algorithm": "x25519-xsalsa20",
                "email": owner.email,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "repo_not_found");

        let req = TestRequest::put()
            .uri(&format!("/v1/repos/{repo_id}/key"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({ "wrapped_key": "half-formed" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "invalid_request");

        let req = TestRequest::put()
            .uri(&format!("/v1/repos/{repo_id}/key"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({
                "wrapped_key": "wrapped",
                "algorithm": "x25519-xsalsa20",
                "email": format!("ghost-{}", owner.email),
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "user_not_found");
    }
}
