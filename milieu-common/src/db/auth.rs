use diesel::{dsl, ExpressionMethods, OptionalExtension, QueryDsl, RunQueryDsl};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::db::{DaoError, DbThreadPool};
use crate::models::login_attempt::NewLoginAttempt;
use crate::models::session::{NewSession, Session};
use crate::models::user::NewUser;
use crate::schema::login_attempts as login_attempt_fields;
use crate::schema::login_attempts::dsl::login_attempts;
use crate::schema::sessions as session_fields;
use crate::schema::sessions::dsl::sessions;
use crate::schema::users as user_fields;
use crate::schema::users::dsl::users;

pub struct UserCredentials {
    pub user_id: Uuid,
    pub password_hash: Vec<u8>,
    pub password_salt: Vec<u8>,
    pub password_iters: i32,
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

    pub fn create_user(
        &self,
        email: &str,
        password_hash: &[u8],
        password_salt: &[u8],
        password_iters: i32,
    ) -> Result<Uuid, DaoError> {
        let user_id = Uuid::now_v7();

        let new_user = NewUser {
            id: user_id,
            email,
            password_hash,
            password_salt,
            password_iters,
            created_at: SystemTime::now(),
        };

        dsl::insert_into(users)
            .values(&new_user)
            .execute(&mut self.db_thread_pool.get()?)?;

        Ok(user_id)
    }

    pub fn get_user_credentials(&self, email: &str) -> Result<UserCredentials, DaoError> {
        let (user_id, password_hash, password_salt, password_iters) = users
            .select((
                user_fields::id,
                user_fields::password_hash,
                user_fields::password_salt,
                user_fields::password_iters,
            ))
            .filter(user_fields::email.eq(email))
            .get_result::<(Uuid, Vec<u8>, Vec<u8>, i32)>(&mut self.db_thread_pool.get()?)?;

        Ok(UserCredentials {
            user_id,
            password_hash,
            password_salt,
            password_iters,
        })
    }

    pub fn get_user_email(&self, user_id: Uuid) -> Result<String, DaoError> {
        Ok(users
            .find(user_id)
            .select(user_fields::email)
            .get_result(&mut self.db_thread_pool.get()?)?)
    }

    pub fn get_user_id_by_email(&self, email: &str) -> Result<Uuid, DaoError> {
        Ok(users
            .filter(user_fields::email.eq(email))
            .select(user_fields::id)
            .get_result(&mut self.db_thread_pool.get()?)?)
    }

    /// Reports whether the bucket for `attempt_key` has hit `max_attempts`
    /// within its window. Buckets whose window has elapsed are deleted and
    /// no longer count.
    pub fn is_login_rate_limited(
        &self,
        attempt_key: &str,
        max_attempts: i32,
        window: Duration,
    ) -> Result<bool, DaoError> {
        let mut db_connection = self.db_thread_pool.get()?;

        let bucket = login_attempts
            .find(attempt_key)
            .select((
                login_attempt_fields::count,
                login_attempt_fields::window_start,
            ))
            .get_result::<(i32, SystemTime)>(&mut db_connection)
            .optional()?;

        let Some((count, window_start)) = bucket else {
            return Ok(false);
        };

        if SystemTime::now() > window_start + window {
            diesel::delete(login_attempts.find(attempt_key)).execute(&mut db_connection)?;
            return Ok(false);
        }

        Ok(count >= max_attempts)
    }

    /// Counts a failed password check against `attempt_key`. A bucket whose
    /// window has elapsed restarts at one.
    pub fn record_login_failure(
        &self,
        attempt_key: &str,
        window: Duration,
    ) -> Result<(), DaoError> {
        let mut db_connection = self.db_thread_pool.get()?;

        db_connection
            .build_transaction()
            .run::<_, DaoError, _>(|conn| {
                let now = SystemTime::now();

                let bucket = login_attempts
                    .find(attempt_key)
                    .select(login_attempt_fields::window_start)
                    .get_result::<SystemTime>(conn)
                    .optional()?;

                match bucket {
                    None => {
                        let new_attempt = NewLoginAttempt {
                            attempt_key,
                            count: 1,
                            window_start: now,
                        };

                        dsl::insert_into(login_attempts)
                            .values(&new_attempt)
                            .execute(conn)?;
                    }
                    Some(window_start) if now > window_start + window => {
                        dsl::update(login_attempts.find(attempt_key))
                            .set((
                                login_attempt_fields::count.eq(1),
                                login_attempt_fields::window_start.eq(now),
                            ))
                            .execute(conn)?;
                    }
                    Some(_) => {
                        dsl::update(login_attempts.find(attempt_key))
                            .set(
                                login_attempt_fields::count
                                    .eq(login_attempt_fields::count + 1),
                            )
                            .execute(conn)?;
                    }
                }

                Ok(())
            })?;

        Ok(())
    }

    pub fn clear_login_attempts(&self, attempt_key: &str) -> Result<(), DaoError> {
        diesel::delete(login_attempts.find(attempt_key))
            .execute(&mut self.db_thread_pool.get()?)?;

        Ok(())
    }

    /// Records a new session. Any live session for the same user and host is
    /// expired first, and the user's session list is pruned down to
    /// `max_sessions` most-recent entries.
    #[allow(clippy::too_many_arguments)]
    pub fn create_session(
        &self,
        user_id: Uuid,
        token_digest: &[u8],
        token_suffix: &str,
        host: &str,
        expires_at: SystemTime,
        max_sessions: i64,
    ) -> Result<(), DaoError> {
        let mut db_connection = self.db_thread_pool.get()?;

        db_connection
            .build_transaction()
            .run::<_, DaoError, _>(|conn| {
                let now = SystemTime::now();

                dsl::update(
                    sessions
                        .filter(session_fields::user_id.eq(user_id))
                        .filter(session_fields::host.eq(host)),
                )
                .set(session_fields::expires_at.eq(now))
                .execute(conn)?;

                let new_session = NewSession {
                    token_digest,
                    token_suffix,
                    user_id,
                    host,
                    created_at: now,
                    expires_at,
                };

                dsl::insert_into(sessions)
                    .values(&new_session)
                    .execute(conn)?;

                let keep = sessions
                    .filter(session_fields::user_id.eq(user_id))
                    .order(session_fields::created_at.desc())
                    .limit(max_sessions)
                    .select(session_fields::token_digest)
                    .load::<Vec<u8>>(conn)?;

                diesel::delete(
                    sessions
                        .filter(session_fields::user_id.eq(user_id))
                        .filter(session_fields::token_digest.ne_all(keep)),
                )
                .execute(conn)?;

                Ok(())
            })?;

        Ok(())
    }

    pub fn get_session(&self, token_digest: &[u8]) -> Result<Session, DaoError> {
        Ok(sessions
            .find(token_digest)
            .get_result(&mut self.db_thread_pool.get()?)?)
    }

    /// Sets the session's expiration to now. A no-op when the session does
    /// not exist or is already expired, which makes logout idempotent.
    pub fn expire_session(&self, token_digest: &[u8]) -> Result<(), DaoError> {
        dsl::update(sessions.find(token_digest))
            .set(session_fields::expires_at.eq(SystemTime::now()))
            .execute(&mut self.db_thread_pool.get()?)?;

        Ok(())
    }

    pub fn list_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, DaoError> {
        Ok(sessions
            .filter(session_fields::user_id.eq(user_id))
            .order(session_fields::created_at.desc())
            .load(&mut self.db_thread_pool.get()?)?)
    }

    pub fn delete_expired_sessions(&self, grace_period: Duration) -> Result<usize, DaoError> {
        let cutoff = SystemTime::now() - grace_period;

        Ok(
            diesel::delete(sessions.filter(session_fields::expires_at.lt(cutoff)))
                .execute(&mut self.db_thread_pool.get()?)?,
        )
    }

    pub fn delete_stale_login_attempts(&self, max_age: Duration) -> Result<usize, DaoError> {
        let cutoff = SystemTime::now() - max_age;

        Ok(diesel::delete(
            login_attempts.filter(login_attempt_fields::window_start.lt(cutoff)),
        )
        .execute(&mut self.db_thread_pool.get()?)?)
    }
}
