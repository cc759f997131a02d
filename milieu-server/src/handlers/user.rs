use actix_web::{web, HttpResponse};
use milieu_common::db::{self, DaoError, DbThreadPool};
use serde::Deserialize;
use std::time::SystemTime;
use uuid::Uuid;

use crate::handlers::error::HttpErrorResponse;
use crate::handlers::unix_millis;
use crate::middleware::auth::AuthenticatedUser;

#[derive(Deserialize)]
pub struct PutUserKeyRequest {
    pub public_key: Option<String>,
    pub algorithm: Option<String>,
}

#[derive(Deserialize)]
pub struct PutUmkRequest {
    pub encrypted_umk: Option<String>,
    pub kdf_params: Option<serde_json::Value>,
    pub version: Option<i32>,
}

pub async fn list_sessions(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, HttpErrorResponse> {
    let auth_dao = db::auth::Dao::new(&db_thread_pool);
    let user_id = authenticated_user.user_id;

    let sessions = match web::block(move || auth_dao.list_sessions(user_id)).await? {
        Ok(s) => s,
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    let now = SystemTime::now();
    let payload: Vec<serde_json::Value> = sessions
        .iter()
        .map(|session| {
            serde_json::json!({
                "host": session.host,
                "created_at": unix_millis(session.created_at),
                "expires_at": unix_millis(session.expires_at),
                "token_suffix": session.token_suffix,
                "active": session.expires_at > now,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(payload))
}

pub async fn list_repos(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, HttpErrorResponse> {
    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let user_id = authenticated_user.user_id;

    let entries = match web::block(move || repo_dao.list_repos_for_user(user_id)).await? {
        Ok(entries) => entries,
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    let repos: Vec<serde_json::Value> = entries
        .iter()
        .map(|entry| {
            serde_json::json!({
                "repo_id": entry.repo_id,
                "name": entry.name,
                "owner_email": entry.owner_email,
                "last_seen": entry.last_seen.map(unix_millis),
                "access": entry.role.as_deref().unwrap_or("read"),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({ "repos": repos })))
}

pub async fn list_invites(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, HttpErrorResponse> {
    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let email = authenticated_user.email;

    let invites = match web::block(move || repo_dao.list_invites_for_email(&email)).await? {
        Ok(invites) => invites,
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    let payload: Vec<serde_json::Value> = invites
        .iter()
        .map(|invite| {
            serde_json::json!({
                "id": invite.id,
                "repo_id": invite.repo_id,
                "repo_name": invite.repo_name,
                "role": invite.role,
                "invited_by": invite.invited_by,
                "created_at": unix_millis(invite.created_at),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(payload))
}

pub async fn invite_action(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    path: web::Path<(Uuid, String)>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let (invite_id, action) = path.into_inner();

    if action != "accept" && action != "reject" {
        return Err(HttpErrorResponse::InvalidAction);
    }

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let email = authenticated_user.email.clone();

    // Only the invitee may act on an invite, and only while it is pending
    let invite =
        match web::block(move || repo_dao.get_pending_invite_for_email(invite_id, &email)).await? {
            Ok(invite) => invite,
            Err(DaoError::QueryFailure(diesel::result::Error::NotFound)) => {
                return Err(HttpErrorResponse::InviteNotFound);
            }
            Err(e) => {
                log::error!("{e}");
                return Err(HttpErrorResponse::InternalError);
            }
        };

    let repo_dao = db::repo::Dao::new(&db_thread_pool);
    let user_id = authenticated_user.user_id;
    let accepting = action == "accept";

    match web::block(move || {
        if accepting {
            repo_dao.accept_invite(&invite, user_id)
        } else {
            repo_dao.reject_invite(invite.id)
        }
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

pub async fn get_user_key(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, HttpErrorResponse> {
    let keys_dao = db::keys::Dao::new(&db_thread_pool);
    let user_id = authenticated_user.user_id;

    let key = match web::block(move || keys_dao.get_user_key(user_id)).await? {
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
        "public_key": key.public_key,
        "algorithm": key.algorithm,
        "created_at": unix_millis(key.created_at),
        "updated_at": unix_millis(key.updated_at),
    })))
}

pub async fn put_user_key(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    body: web::Json<PutUserKeyRequest>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let body = body.into_inner();

    let (Some(public_key), Some(algorithm)) = (body.public_key, body.algorithm) else {
        return Err(HttpErrorResponse::InvalidRequest);
    };

    if public_key.is_empty() || algorithm.is_empty() {
        return Err(HttpErrorResponse::InvalidRequest);
    }

    let keys_dao = db::keys::Dao::new(&db_thread_pool);
    let user_id = authenticated_user.user_id;

    match web::block(move || keys_dao.upsert_user_key(user_id, &public_key, &algorithm)).await? {
        Ok(()) => (),
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

pub async fn get_umk(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
) -> Result<HttpResponse, HttpErrorResponse> {
    let keys_dao = db::keys::Dao::new(&db_thread_pool);
    let user_id = authenticated_user.user_id;

    let blob = match web::block(move || keys_dao.get_umk_blob(user_id)).await? {
        Ok(blob) => blob,
        Err(DaoError::QueryFailure(diesel::result::Error::NotFound)) => {
            return Err(HttpErrorResponse::NotFound);
        }
        Err(e) => {
            log::error!("{e}");
            return Err(HttpErrorResponse::InternalError);
        }
    };

    let kdf_params: serde_json::Value =
        serde_json::from_str(&blob.kdf_params).unwrap_or(serde_json::Value::Null);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "encrypted_umk": blob.encrypted_umk,
        "kdf_params": kdf_params,
        "version": blob.version,
        "updated_at": unix_millis(blob.updated_at),
    })))
}

pub async fn put_umk(
    db_thread_pool: web::Data<DbThreadPool>,
    authenticated_user: AuthenticatedUser,
    body: web::Json<PutUmkRequest>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let body = body.into_inner();

    let (Some(encrypted_umk), Some(kdf_params), Some(version)) =
        (body.encrypted_umk, body.kdf_params, body.version)
    else {
        return Err(HttpErrorResponse::InvalidRequest);
    };

    if encrypted_umk.is_empty() || kdf_params.is_null() {
        return Err(HttpErrorResponse::InvalidRequest);
    }

    let kdf_params = kdf_params.to_string();
    let keys_dao = db::keys::Dao::new(&db_thread_pool);
    let user_id = authenticated_user.user_id;

    match web::block(move || {
        keys_dao.upsert_umk_blob(user_id, &encrypted_umk, &kdf_params, version)
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

    use crate::env::{self, Config};
    use crate::handlers::test_utils;

    async fn body_json(resp: actix_web::dev::ServiceResponse) -> serde_json::Value {
        serde_json::from_slice(&to_bytes(resp.into_body()).await.unwrap()).unwrap()
    }

    macro_rules! test_app {
        ($config:expr) => {
            test::init_service(
                App::new()
                    .app_data(Data::new(env::testing::DB_THREAD_POOL.clone()))
                    .app_data(Data::new($config))
                    .configure(crate::services::api::configure)
                    .default_service(web::route().to(crate::handlers::not_found)),
            )
            .await
        };
    }

    macro_rules! login {
        ($app:expr, $email:expr, $password:expr, $host:expr) => {{
            let req = TestRequest::post()
                .uri("/v1/auth/login")
                .set_json(
                    serde_json::json!({ "email": $email, "password": $password, "host": $host }),
                )
                .to_request();
            test::call_service($app, req).await
        }};
    }

    #[actix_rt::test]
    async fn test_sessions_are_capped_and_flagged() {
        let config = Config {
            max_sessions_per_user: 3,
            ..env::testing::test_config()
        };
        let app = test_app!(config);

        let user = test_utils::create_user().await;

        let mut last_token = user.access_token.clone();
        for i in 0..4 {
            let resp = login!(&app, &user.email, &user.password, format!("host-{i}"));
            assert_eq!(resp.status(), StatusCode::OK);
            last_token = String::from(body_json(resp).await["access_token"].as_str().unwrap());
        }

        let req = TestRequest::get()
            .uri("/v1/users/me/sessions")
            .insert_header(("Authorization", format!("Bearer {last_token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let sessions = body_json(resp).await;
        let sessions = sessions.as_array().unwrap();
        assert_eq!(sessions.len(), 3);

        // Newest first, none of them leak more than a suffix of the token
        assert_eq!(sessions[0]["host"], "host-3");
        assert_eq!(sessions[0]["active"], true);
        assert_eq!(sessions[0]["token_suffix"].as_str().unwrap().len(), 6);
        assert!(last_token.ends_with(sessions[0]["token_suffix"].as_str().unwrap()));
    }

    #[actix_rt::test]
    async fn test_second_login_from_same_host_expires_first_session() {
        let app = test_app!(env::testing::test_config());

        let user = test_utils::create_user().await;

        let resp = login!(&app, &user.email, &user.password, "laptop");
        let first_token = String::from(body_json(resp).await["access_token"].as_str().unwrap());

        let resp = login!(&app, &user.email, &user.password, "laptop");
        let second_token = String::from(body_json(resp).await["access_token"].as_str().unwrap());

        let req = TestRequest::get()
            .uri("/v1/users/me/sessions")
            .insert_header(("Authorization", format!("Bearer {first_token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"], "token_expired");

        let req = TestRequest::get()
            .uri("/v1/users/me/sessions")
            .insert_header(("Authorization", format!("Bearer {second_token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let sessions = body_json(resp).await;
        let laptop_sessions: Vec<_> = sessions
            .as_array()
            .unwrap()
            .iter()
            .filter(|s| s["host"] == "laptop")
            .collect();
        assert_eq!(laptop_sessions.len(), 2);
        assert_eq!(
            laptop_sessions
                .iter()
                .filter(|s| s["active"] == true)
                .count(),
            1
        );
    }

    #[actix_rt::test]
    async fn test_repo_listing_reflects_access() {
        let app = test_app!(env::testing::test_config());

        let owner = test_utils::create_user().await;
        let collaborator = test_utils::create_user().await;

        let repo_id = test_utils::create_repo(&owner.access_token, "listing-repo").await;

        let req = TestRequest::post()
            .uri(&format!("/v1/repos/{repo_id}/access"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({ "email": collaborator.email, "role": "write" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let invite_id = String::from(body_json(resp).await["invite_id"].as_str().unwrap());

        let req = TestRequest::post()
            .uri(&format!("/v1/users/me/invites/{invite_id}/accept"))
            .insert_header(("Authorization", format!("Bearer {}", collaborator.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = TestRequest::get()
            .uri("/v1/users/me/repos")
            .insert_header(("Authorization", format!("Bearer {}", collaborator.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        let repos = body["repos"].as_array().unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0]["name"], "listing-repo");
        assert_eq!(repos[0]["owner_email"], owner.email);
        assert_eq!(repos[0]["access"], "write");
    }

    #[actix_rt::test]
    async fn test_invite_reject_and_invalid_action() {
        let app = test_app!(env::testing::test_config());

        let owner = test_utils::create_user().await;
        let invitee = test_utils::create_user().await;

        let repo_id = test_utils::create_repo(&owner.access_token, "reject-repo").await;

        let req = TestRequest::post()
            .uri(&format!("/v1/repos/{repo_id}/access"))
            .insert_header(("Authorization", format!("Bearer {}", owner.access_token)))
            .set_json(serde_json::json!({ "email": invitee.email, "role": "read" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let invite_id = String::from(body_json(resp).await["invite_id"].as_str().unwrap());

        let req = TestRequest::get()
            .uri("/v1/users/me/invites")
            .insert_header(("Authorization", format!("Bearer {}", invitee.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let invites = body_json(resp).await;
        assert_eq!(invites.as_array().unwrap().len(), 1);
        assert_eq!(invites[0]["repo_name"], "reject-repo");
        assert_eq!(invites[0]["invited_by"], owner.email);

        let req = TestRequest::post()
            .uri(&format!("/v1/users/me/invites/{invite_id}/ignore"))
            .insert_header(("Authorization", format!("Bearer {}", invitee.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "invalid_action");

        let req = TestRequest::post()
            .uri(&format!("/v1/users/me/invites/{invite_id}/reject"))
            .insert_header(("Authorization", format!("Bearer {}", invitee.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // Rejected invites cannot be acted on again
        let req = TestRequest::post()
            .uri(&format!("/v1/users/me/invites/{invite_id}/accept"))
            .insert_header(("Authorization", format!("Bearer {}", invitee.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "invite_not_found");

        // A rejected invite grants no repo access
        let req = TestRequest::get()
            .uri("/v1/users/me/repos")
            .insert_header(("Authorization", format!("Bearer {}", invitee.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(body_json(resp).await["repos"].as_array().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_user_key_roundtrip() {
        let app = test_app!(env::testing::test_config());

        let user = test_utils::create_user().await;

        let req = TestRequest::get()
            .uri("/v1/users/me/key")
            .insert_header(("Authorization", format!("Bearer {}", user.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = TestRequest::put()
            .uri("/v1/users/me/key")
            .insert_header(("Authorization", format!("Bearer {}", user.access_token)))
            .set_json(serde_json::json!({ "public_key": "pk-data", "algorithm": "x25519" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = TestRequest::get()
            .uri("/v1/users/me/key")
            .insert_header(("Authorization", format!("Bearer {}", user.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["public_key"], "pk-data");
        assert_eq!(body["algorithm"], "x25519");

        let req = TestRequest::put()
            .uri("/v1/users/me/key")
            .insert_header(("Authorization", format!("Bearer {}", user.access_token)))
            .set_json(serde_json::json!({ "public_key": "pk-data" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "invalid_request");
    }

    #[actix_rt::test]
    async fn test_umk_roundtrip() {
        let app = test_app!(env::testing::test_config());

        let user = test_utils::create_user().await;

        let req = TestRequest::get()
            .uri("/v1/users/me/umk")
            .insert_header(("Authorization", format!("Bearer {}", user.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = TestRequest::put()
            .uri("/v1/users/me/umk")
            .insert_header(("Authorization", format!("Bearer {}", user.access_token)))
            .set_json(serde_json::json!({
                "encrypted_umk": "sealed-umk-bytes",
                "kdf_params": { "algorithm": "pbkdf2-sha256", "iterations": 600000 },
                "version": 1,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = TestRequest::get()
            .uri("/v1/users/me/umk")
            .insert_header(("Authorization", format!("Bearer {}", user.access_token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["encrypted_umk"], "sealed-umk-bytes");
        assert_eq!(body["kdf_params"]["iterations"], 600000);
        assert_eq!(body["version"], 1);

        let req = TestRequest::put()
            .uri("/v1/users/me/umk")
            .insert_header(("Authorization", format!("Bearer {}", user.access_token)))
            .set_json(serde_json::json!({ "encrypted_umk": "incomplete" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "invalid_request");
    }
}
