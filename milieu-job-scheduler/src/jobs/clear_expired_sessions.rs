use async_trait::async_trait;
use milieu_common::db::auth::Dao as AuthDao;
use milieu_common::db::DbThreadPool;
use std::time::Duration;

use crate::jobs::{Job, JobError};

/// Deletes sessions whose expiration passed more than a grace period ago.
/// The grace period keeps recently expired sessions visible in session
/// listings so users can recognize devices they signed out of.
pub struct ClearExpiredSessionsJob {
    grace_period: Duration,
    db_thread_pool: DbThreadPool,
    is_running: bool,
}

impl ClearExpiredSessionsJob {
    pub fn new(grace_period: Duration, db_thread_pool: DbThreadPool) -> Self {
        Self {
            grace_period,
            db_thread_pool,
            is_running: false,
        }
    }
}

#[async_trait]
impl Job for ClearExpiredSessionsJob {
    fn name(&self) -> &'static str {
        "Clear Expired Sessions"
    }

    fn is_ready(&self) -> bool {
        !self.is_running
    }

    async fn execute(&mut self) -> Result<(), JobError> {
        self.is_running = true;

        let dao = AuthDao::new(&self.db_thread_pool);
        let grace_period = self.grace_period;
        let deleted =
            tokio::task::spawn_blocking(move || dao.delete_expired_sessions(grace_period))
                .await??;

        log::info!("Deleted {deleted} expired sessions");

        self.is_running = false;
        Ok(())
    }
}
