use diesel::{dsl, ExpressionMethods, QueryDsl, RunQueryDsl};
use std::time::SystemTime;
use uuid::Uuid;

use crate::db::{DaoError, DbThreadPool};
use crate::models::repo_key::{NewRepoKey, RepoKey};
use crate::models::repo_key_event::NewRepoKeyEvent;
use crate::models::umk_blob::{NewUmkBlob, UmkBlob};
use crate::models::user_key::{NewUserKey, UserKey};
use crate::schema::repo_key_events::dsl::repo_key_events;
use crate::schema::repo_keys as repo_key_fields;
use crate::schema::repo_keys::dsl::repo_keys;
use crate::schema::umk_blobs as umk_blob_fields;
use crate::schema::umk_blobs::dsl::umk_blobs;
use crate::schema::user_keys as user_key_fields;
use crate::schema::user_keys::dsl::user_keys;

pub struct Dao {
    db_thread_pool: DbThreadPool,
}

impl Dao {
    pub fn new(db_thread_pool: &DbThreadPool) -> Self {
        Self {
            db_thread_pool: db_thread_pool.clone(),
        }
    }

    pub fn get_user_key(&self, user_id: Uuid) -> Result<UserKey, DaoError> {
        Ok(user_keys
            .find(user_id)
            .get_result(&mut self.db_thread_pool.get()?)?)
    }

    pub fn upsert_user_key(
        &self,
        user_id: Uuid,
        public_key: &str,
        algorithm: &str,
    ) -> Result<(), DaoError> {
        let now = SystemTime::now();

        let new_key = NewUserKey {
            user_id,
            public_key,
            algorithm,
            created_at: now,
            updated_at: now,
        };

        dsl::insert_into(user_keys)
            .values(&new_key)
            .on_conflict(user_key_fields::user_id)
            .do_update()
            .set((
                user_key_fields::public_key.eq(public_key),
                user_key_fields::algorithm.eq(algorithm),
                user_key_fields::updated_at.eq(now),
            ))
            .execute(&mut self.db_thread_pool.get()?)?;

        Ok(())
    }

    pub fn get_umk_blob(&self, user_id: Uuid) -> Result<UmkBlob, DaoError> {
        Ok(umk_blobs
            .find(user_id)
            .get_result(&mut self.db_thread_pool.get()?)?)
    }

    pub fn upsert_umk_blob(
        &self,
        user_id: Uuid,
        encrypted_umk: &str,
        kdf_params: &str,
        version: i32,
    ) -> Result<(), DaoError> {
        let new_blob = NewUmkBlob {
            user_id,
            encrypted_umk,
            kdf_params,
            version,
            updated_at: SystemTime::now(),
        };

        dsl::insert_into(umk_blobs)
            .values(&new_blob)
            .on_conflict(umk_blob_fields::user_id)
            .do_update()
            .set((
                umk_blob_fields::encrypted_umk.eq(encrypted_umk),
                umk_blob_fields::kdf_params.eq(kdf_params),
                umk_blob_fields::version.eq(version),
                umk_blob_fields::updated_at.eq(new_blob.updated_at),
            ))
            .execute(&mut self.db_thread_pool.get()?)?;

        Ok(())
    }

    pub fn get_repo_key(&self, repo_id: Uuid, user_id: Uuid) -> Result<RepoKey, DaoError> {
        Ok(repo_keys
            .find((repo_id, user_id))
            .get_result(&mut self.db_thread_pool.get()?)?)
    }

    /// Stores a wrapped repo key for `target_user_id` and appends an audit
    /// event naming who distributed it.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_repo_key(
        &self,
        repo_id: Uuid,
        target_user_id: Uuid,
        target_email: &str,
        requester_user_id: Uuid,
        requester_email: &str,
        wrapped_key: &str,
        algorithm: &str,
    ) -> Result<(), DaoError> {
        let mut db_connection = self.db_thread_pool.get()?;

        db_connection
            .build_transaction()
            .run::<_, DaoError, _>(|conn| {
                let now = SystemTime::now();

                let new_key = NewRepoKey {
                    repo_id,
                    user_id: target_user_id,
                    wrapped_key,
                    algorithm,
                    created_at: now,
                    updated_at: now,
                };

                dsl::insert_into(repo_keys)
                    .values(&new_key)
                    .on_conflict((repo_key_fields::repo_id, repo_key_fields::user_id))
                    .do_update()
                    .set((
                        repo_key_fields::wrapped_key.eq(wrapped_key),
                        repo_key_fields::algorithm.eq(algorithm),
                        repo_key_fields::updated_at.eq(now),
                    ))
                    .execute(conn)?;

                let new_event = NewRepoKeyEvent {
                    id: Uuid::now_v7(),
                    repo_id,
                    requester_user_id,
                    requester_email,
                    target_user_id,
                    target_email,
                    action: "upsert",
                    created_at: now,
                };

                dsl::insert_into(repo_key_events)
                    .values(&new_event)
                    .execute(conn)?;

                Ok(())
            })
    }
}
