mod clear_expired_sessions;
mod clear_resolved_invites;
mod clear_stale_login_attempts;

pub use clear_expired_sessions::ClearExpiredSessionsJob;
pub use clear_resolved_invites::ClearResolvedInvitesJob;
pub use clear_stale_login_attempts::ClearStaleLoginAttemptsJob;

use async_trait::async_trait;
use milieu_common::db::DaoError;
use std::fmt;
use tokio::task::JoinError;

#[derive(Debug)]
pub enum JobError {
    DaoFailure(DaoError),
    ConcurrencyError(JoinError),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::DaoFailure(e) => {
                write!(f, "JobError: {e}")
            }
            JobError::ConcurrencyError(e) => {
                write!(f, "JobError: ConcurrencyError: {e}")
            }
        }
    }
}

impl From<DaoError> for JobError {
    fn from(e: DaoError) -> Self {
        JobError::DaoFailure(e)
    }
}

impl From<JoinError> for JobError {
    fn from(e: JoinError) -> Self {
        JobError::ConcurrencyError(e)
    }
}

#[async_trait]
pub trait Job: Send {
    fn name(&self) -> &'static str;
    fn is_ready(&self) -> bool;
    async fn execute(&mut self) -> Result<(), JobError>;
}
