use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DB_USERNAME_VAR: &str = "MILIEU_DB_USERNAME";
const DB_PASSWORD_VAR: &str = "MILIEU_DB_PASSWORD";
const DB_HOSTNAME_VAR: &str = "MILIEU_DB_HOSTNAME";
const DB_PORT_VAR: &str = "MILIEU_DB_PORT";
const DB_NAME_VAR: &str = "MILIEU_DB_NAME";
const DB_MAX_CONNECTIONS_VAR: &str = "MILIEU_DB_MAX_CONNECTIONS";
const DB_IDLE_TIMEOUT_SECS_VAR: &str = "MILIEU_DB_IDLE_TIMEOUT_SECS";

const SESSION_TTL_HOURS_VAR: &str = "MILIEU_SESSION_TTL_HOURS";
const MAX_SESSIONS_PER_USER_VAR: &str = "MILIEU_MAX_SESSIONS_PER_USER";
const LOGIN_MAX_ATTEMPTS_VAR: &str = "MILIEU_LOGIN_MAX_ATTEMPTS";
const LOGIN_ATTEMPT_WINDOW_SECS_VAR: &str = "MILIEU_LOGIN_ATTEMPT_WINDOW_SECS";
const PASSWORD_ITERATIONS_VAR: &str = "MILIEU_PASSWORD_ITERATIONS";

const OBJECT_HISTORY_LIMIT_VAR: &str = "MILIEU_OBJECT_HISTORY_LIMIT";
const MAX_REPO_BYTES_VAR: &str = "MILIEU_MAX_REPO_BYTES";

const ACTIX_WORKER_COUNT_VAR: &str = "MILIEU_ACTIX_WORKER_COUNT";
const LOG_LEVEL_VAR: &str = "MILIEU_LOG_LEVEL";

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar(&'static str),
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingVar(var) => {
                write!(f, "Environment variable {var} must be set")
            }
            ConfigError::InvalidVar(var) => {
                write!(f, "Environment variable {var} is incorrectly formatted")
            }
        }
    }
}

/// Server configuration, read once at startup and shared with handlers via
/// `web::Data`.
#[derive(Clone)]
pub struct Config {
    pub db_uri: String,
    pub db_max_connections: u32,
    pub db_idle_timeout: Duration,

    pub session_ttl: Duration,
    pub max_sessions_per_user: i64,
    pub login_max_attempts: i32,
    pub login_attempt_window: Duration,
    pub password_iterations: u32,

    pub object_history_limit: i32,
    pub max_repo_bytes: i64,

    pub actix_worker_count: usize,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let cpu_count = num_cpus::get();

        let db_username = env_var(DB_USERNAME_VAR)?;
        let db_password = env_var(DB_PASSWORD_VAR)?;
        let db_hostname = env_var(DB_HOSTNAME_VAR)?;
        let db_port: u16 = env_var_or(DB_PORT_VAR, 5432)?;
        let db_name = env_var(DB_NAME_VAR)?;

        Ok(Config {
            db_uri: format!(
                "postgres://{db_username}:{db_password}@{db_hostname}:{db_port}/{db_name}"
            ),
            db_max_connections: env_var_or(DB_MAX_CONNECTIONS_VAR, cpu_count as u32 * 4)?,
            db_idle_timeout: Duration::from_secs(env_var_or(DB_IDLE_TIMEOUT_SECS_VAR, 30)?),

            session_ttl: Duration::from_secs(env_var_or(SESSION_TTL_HOURS_VAR, 720u64)? * 3600),
            max_sessions_per_user: env_var_or(MAX_SESSIONS_PER_USER_VAR, 12)?,
            login_max_attempts: env_var_or(LOGIN_MAX_ATTEMPTS_VAR, 10)?,
            login_attempt_window: Duration::from_secs(env_var_or(
                LOGIN_ATTEMPT_WINDOW_SECS_VAR,
                900,
            )?),
            password_iterations: env_var_or(PASSWORD_ITERATIONS_VAR, 600_000)?,

            object_history_limit: env_var_or(OBJECT_HISTORY_LIMIT_VAR, 12)?,
            max_repo_bytes: env_var_or(MAX_REPO_BYTES_VAR, 1024 * 1024)?,

            actix_worker_count: env_var_or(ACTIX_WORKER_COUNT_VAR, cpu_count)?,
            log_level: env_var_or(LOG_LEVEL_VAR, String::from("info"))?,
        })
    }
}

fn env_var(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingVar(key))
}

fn env_var_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val.parse().map_err(|_| ConfigError::InvalidVar(key)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
pub mod testing {
    use milieu_common::db::{create_db_thread_pool, DbThreadPool};
    use once_cell::sync::Lazy;
    use std::time::Duration;

    use super::Config;

    pub static DB_THREAD_POOL: Lazy<DbThreadPool> = Lazy::new(|| {
        let config = test_config();
        create_db_thread_pool(
            &config.db_uri,
            config.db_max_connections,
            config.db_idle_timeout,
        )
    });

    /// Test defaults with fast password hashing. Individual tests override
    /// fields to exercise limits.
    pub fn test_config() -> Config {
        let db_username = require_var(super::DB_USERNAME_VAR);
        let db_password = require_var(super::DB_PASSWORD_VAR);
        let db_hostname = require_var(super::DB_HOSTNAME_VAR);
        let db_port = std::env::var(super::DB_PORT_VAR).unwrap_or_else(|_| String::from("5432"));
        let db_name = require_var(super::DB_NAME_VAR);

        Config {
            db_uri: format!(
                "postgres://{db_username}:{db_password}@{db_hostname}:{db_port}/{db_name}"
            ),
            db_max_connections: 48,
            db_idle_timeout: Duration::from_secs(30),

            session_ttl: Duration::from_secs(3600),
            max_sessions_per_user: 12,
            login_max_attempts: 5,
            login_attempt_window: Duration::from_secs(900),
            password_iterations: 1000,

            object_history_limit: 12,
            max_repo_bytes: 1 << 20,

            actix_worker_count: 2,
            log_level: String::from("info"),
        }
    }

    fn require_var(key: &str) -> String {
        std::env::var(key).unwrap_or_else(|_| panic!("Environment variable {key} must be set"))
    }
}
