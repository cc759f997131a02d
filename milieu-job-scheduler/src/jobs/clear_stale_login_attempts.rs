use async_trait::async_trait;
use milieu_common::db::auth::Dao as AuthDao;
use milieu_common::db::DbThreadPool;
use std::time::Duration;

use crate::jobs::{Job, JobError};

/// Deletes login attempt buckets whose rate-limit window started longer than
/// `max_age` ago. Expired buckets are already ignored at login time, so this
/// only reclaims table space.
pub struct ClearStaleLoginAttemptsJob {
    max_age: Duration,
    db_thread_pool: DbThreadPool,
    is_running: bool,
}

impl ClearStaleLoginAttemptsJob {
    pub fn new(max_age: Duration, db_thread_pool: DbThreadPool) -> Self {
        Self {
            max_age,
            db_thread_pool,
            is_running: false,
        }
    }
}

#[async_trait]
impl Job for ClearStaleLoginAttemptsJob {
    fn name(&self) -> &'static str {
        "Clear Stale Login Attempts"
    }

    fn is_ready(&self) -> bool {
        !self.is_running
    }

    async fn execute(&mut self) -> Result<(), JobError> {
        self.is_running = true;

        let dao = AuthDao::new(&self.db_thread_pool);
        let max_age = self.max_age;
        let deleted =
            tokio::task::spawn_blocking(move || dao.delete_stale_login_attempts(max_age))
                .await??;

        log::info!("Deleted {deleted} stale login attempt buckets");

        self.is_running = false;
        Ok(())
    }
}
