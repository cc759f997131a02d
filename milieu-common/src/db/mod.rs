use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;
use std::fmt;
use std::time::Duration;

pub mod auth;
pub mod job_registry;
pub mod keys;
pub mod object;
pub mod repo;

pub type DbThreadPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type DbConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

pub fn create_db_thread_pool(
    database_uri: &str,
    max_connections: u32,
    idle_timeout: Duration,
) -> DbThreadPool {
    let manager = ConnectionManager::<PgConnection>::new(database_uri);
    r2d2::Pool::builder()
        .max_size(max_connections)
        .idle_timeout(Some(idle_timeout))
        .build(manager)
        .expect("Failed to create DB thread pool")
}

#[derive(Debug)]
pub enum DaoError {
    DbThreadPoolFailure(r2d2::Error),
    QueryFailure(diesel::result::Error),
}

impl std::error::Error for DaoError {}

impl fmt::Display for DaoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaoError::DbThreadPoolFailure(e) => {
                write!(f, "DaoError: Failed to obtain DB connection: {e}")
            }
            DaoError::QueryFailure(e) => {
                write!(f, "DaoError: Query failed: {e}")
            }
        }
    }
}

impl From<r2d2::Error> for DaoError {
    fn from(error: r2d2::Error) -> Self {
        DaoError::DbThreadPoolFailure(error)
    }
}

impl From<diesel::result::Error> for DaoError {
    fn from(error: diesel::result::Error) -> Self {
        DaoError::QueryFailure(error)
    }
}
