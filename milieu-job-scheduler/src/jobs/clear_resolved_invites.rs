use async_trait::async_trait;
use milieu_common::db::repo::Dao as RepoDao;
use milieu_common::db::DbThreadPool;
use std::time::Duration;

use crate::jobs::{Job, JobError};

/// Deletes accepted, rejected, and revoked invites after a retention period.
/// Pending invites are left alone regardless of age.
pub struct ClearResolvedInvitesJob {
    max_age: Duration,
    db_thread_pool: DbThreadPool,
    is_running: bool,
}

impl ClearResolvedInvitesJob {
    pub fn new(max_age: Duration, db_thread_pool: DbThreadPool) -> Self {
        Self {
            max_age,
            db_thread_pool,
            is_running: false,
        }
    }
}

#[async_trait]
impl Job for ClearResolvedInvitesJob {
    fn name(&self) -> &'static str {
        "Clear Resolved Invites"
    }

    fn is_ready(&self) -> bool {
        !self.is_running
    }

    async fn execute(&mut self) -> Result<(), JobError> {
        self.is_running = true;

        let dao = RepoDao::new(&self.db_thread_pool);
        let max_age = self.max_age;
        let deleted =
            tokio::task::spawn_blocking(move || dao.delete_resolved_invites(max_age)).await??;

        log::info!("Deleted {deleted} resolved invites");

        self.is_running = false;
        Ok(())
    }
}
