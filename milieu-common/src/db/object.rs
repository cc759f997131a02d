use diesel::sql_types::{BigInt, Uuid as SqlUuid};
use diesel::{dsl, ExpressionMethods, OptionalExtension, QueryDsl, QueryableByName, RunQueryDsl};
use std::time::SystemTime;
use uuid::Uuid;

use crate::db::{DaoError, DbThreadPool};
use crate::models::env_object::{EnvObject, NewEnvObject};
use crate::models::repo_link::NewRepoLink;
use crate::schema::env_objects as env_object_fields;
use crate::schema::env_objects::dsl::env_objects;
use crate::schema::repo_links as link_fields;
use crate::schema::repo_links::dsl::repo_links;

diesel::define_sql_function! {
    fn octet_length(bytes: diesel::sql_types::Binary) -> diesel::sql_types::Integer;
}

/// Outcome of storing a new object version. Quota failures are reported as a
/// value rather than an error so the store transaction rolls back cleanly.
pub enum ObjectPutOutcome {
    Stored(EnvObject),
    QuotaExceeded,
}

pub struct ObjectRecord<'a> {
    pub repo_id: Uuid,
    pub branch: &'a str,
    pub path: &'a str,
    pub nonce: &'a str,
    pub ciphertext: &'a [u8],
    pub aad: &'a str,
    pub ciphertext_hash: &'a str,
    pub client_created_at: Option<&'a str>,
    pub schema_version: i32,
}

#[derive(QueryableByName)]
struct LatestTotal {
    #[diesel(sql_type = BigInt)]
    total: i64,
}

pub struct Dao {
    db_thread_pool: DbThreadPool,
}

impl Dao {
    pub fn new(db_thread_pool: &DbThreadPool) -> Self {
        Self {
            db_thread_pool: db_thread_pool.clone(),
        }
    }

    /// Stores a new version of an object and prunes history beyond
    /// `history_limit` versions. Quota is checked against the sum of the
    /// latest version at every (branch, path) in the repo, as older versions
    /// are reclaimable. Runs serializably so concurrent pushes to the same
    /// key cannot both claim the same version number.
    pub fn put_object(
        &self,
        record: ObjectRecord,
        user_id: Uuid,
        max_repo_bytes: i64,
        history_limit: i32,
    ) -> Result<ObjectPutOutcome, DaoError> {
        let mut db_connection = self.db_thread_pool.get()?;

        db_connection
            .build_transaction()
            .serializable()
            .run::<_, DaoError, _>(|conn| {
                let latest_total = diesel::sql_query(
                    "SELECT COALESCE(SUM(OCTET_LENGTH(ciphertext)), 0)::BIGINT AS total FROM \
                     (SELECT DISTINCT ON (branch, path) ciphertext FROM env_objects \
                      WHERE repo_id = $1 ORDER BY branch, path, created_at DESC) latest",
                )
                .bind::<SqlUuid, _>(record.repo_id)
                .get_result::<LatestTotal>(conn)?
                .total;

                let current_at_key = env_objects
                    .filter(env_object_fields::repo_id.eq(record.repo_id))
                    .filter(env_object_fields::branch.eq(record.branch))
                    .filter(env_object_fields::path.eq(record.path))
                    .order(env_object_fields::created_at.desc())
                    .limit(1)
                    .select(octet_length(env_object_fields::ciphertext))
                    .get_result::<i32>(conn)
                    .optional()?
                    .unwrap_or(0);

                let new_size = record.ciphertext.len() as i64;
                if latest_total - i64::from(current_at_key) + new_size > max_repo_bytes {
                    return Ok(ObjectPutOutcome::QuotaExceeded);
                }

                let max_version = env_objects
                    .filter(env_object_fields::repo_id.eq(record.repo_id))
                    .filter(env_object_fields::branch.eq(record.branch))
                    .filter(env_object_fields::path.eq(record.path))
                    .select(dsl::max(env_object_fields::version))
                    .get_result::<Option<i32>>(conn)?
                    .unwrap_or(0);

                let next_version = max_version + 1;
                let now = SystemTime::now();

                let new_object = NewEnvObject {
                    id: Uuid::now_v7(),
                    repo_id: record.repo_id,
                    branch: record.branch,
                    path: record.path,
                    nonce: record.nonce,
                    ciphertext: record.ciphertext,
                    aad: record.aad,
                    ciphertext_hash: record.ciphertext_hash,
                    version: next_version,
                    created_at: now,
                    client_created_at: record.client_created_at,
                    schema_version: record.schema_version,
                };

                let stored = dsl::insert_into(env_objects)
                    .values(&new_object)
                    .get_result::<EnvObject>(conn)?;

                diesel::delete(
                    env_objects
                        .filter(env_object_fields::repo_id.eq(record.repo_id))
                        .filter(env_object_fields::branch.eq(record.branch))
                        .filter(env_object_fields::path.eq(record.path))
                        .filter(env_object_fields::version.lt(next_version - (history_limit - 1))),
                )
                .execute(conn)?;

                let new_link = NewRepoLink {
                    user_id,
                    repo_id: record.repo_id,
                    last_seen: now,
                };

                dsl::insert_into(repo_links)
                    .values(&new_link)
                    .on_conflict((link_fields::user_id, link_fields::repo_id))
                    .do_update()
                    .set(link_fields::last_seen.eq(now))
                    .execute(conn)?;

                Ok(ObjectPutOutcome::Stored(stored))
            })
    }

    pub fn get_latest(
        &self,
        repo_id: Uuid,
        branch: &str,
        path: &str,
    ) -> Result<EnvObject, DaoError> {
        Ok(env_objects
            .filter(env_object_fields::repo_id.eq(repo_id))
            .filter(env_object_fields::branch.eq(branch))
            .filter(env_object_fields::path.eq(path))
            .order(env_object_fields::created_at.desc())
            .limit(1)
            .get_result(&mut self.db_thread_pool.get()?)?)
    }

    pub fn get_version(
        &self,
        repo_id: Uuid,
        branch: &str,
        path: &str,
        version: i32,
    ) -> Result<EnvObject, DaoError> {
        Ok(env_objects
            .filter(env_object_fields::repo_id.eq(repo_id))
            .filter(env_object_fields::branch.eq(branch))
            .filter(env_object_fields::path.eq(path))
            .filter(env_object_fields::version.eq(version))
            .get_result(&mut self.db_thread_pool.get()?)?)
    }

    /// Version history for one key, newest version first.
    pub fn get_history(
        &self,
        repo_id: Uuid,
        branch: &str,
        path: &str,
    ) -> Result<Vec<(i32, SystemTime, String)>, DaoError> {
        Ok(env_objects
            .filter(env_object_fields::repo_id.eq(repo_id))
            .filter(env_object_fields::branch.eq(branch))
            .filter(env_object_fields::path.eq(path))
            .order(env_object_fields::version.desc())
            .select((
                env_object_fields::version,
                env_object_fields::created_at,
                env_object_fields::ciphertext_hash,
            ))
            .load(&mut self.db_thread_pool.get()?)?)
    }

    pub fn list_branches(&self, repo_id: Uuid) -> Result<Vec<String>, DaoError> {
        Ok(env_objects
            .filter(env_object_fields::repo_id.eq(repo_id))
            .select(env_object_fields::branch)
            .distinct()
            .order(env_object_fields::branch.asc())
            .load(&mut self.db_thread_pool.get()?)?)
    }
}
