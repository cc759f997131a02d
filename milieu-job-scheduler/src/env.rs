use once_cell::sync::Lazy;
use std::str::FromStr;
use std::time::Duration;

const DB_USERNAME_VAR: &str = "MILIEU_DB_USERNAME";
const DB_PASSWORD_VAR: &str = "MILIEU_DB_PASSWORD";
const DB_HOSTNAME_VAR: &str = "MILIEU_DB_HOSTNAME";
const DB_PORT_VAR: &str = "MILIEU_DB_PORT";
const DB_NAME_VAR: &str = "MILIEU_DB_NAME";
const DB_MAX_CONNECTIONS_VAR: &str = "MILIEU_DB_MAX_CONNECTIONS";
const DB_IDLE_TIMEOUT_SECS_VAR: &str = "MILIEU_DB_IDLE_TIMEOUT_SECS";

const WORKER_THREADS_VAR: &str = "MILIEU_SCHEDULER_WORKER_THREADS";
const MAX_BLOCKING_THREADS_VAR: &str = "MILIEU_SCHEDULER_MAX_BLOCKING_THREADS";
const UPDATE_FREQUENCY_SECS_VAR: &str = "MILIEU_SCHEDULER_UPDATE_FREQUENCY_SECS";
const LOG_LEVEL_VAR: &str = "MILIEU_LOG_LEVEL";

const CLEAR_EXPIRED_SESSIONS_FREQUENCY_SECS_VAR: &str =
    "MILIEU_CLEAR_EXPIRED_SESSIONS_FREQUENCY_SECS";
const EXPIRED_SESSION_GRACE_HOURS_VAR: &str = "MILIEU_EXPIRED_SESSION_GRACE_HOURS";

const CLEAR_STALE_LOGIN_ATTEMPTS_FREQUENCY_SECS_VAR: &str =
    "MILIEU_CLEAR_STALE_LOGIN_ATTEMPTS_FREQUENCY_SECS";
const STALE_LOGIN_ATTEMPT_MAX_AGE_HOURS_VAR: &str = "MILIEU_STALE_LOGIN_ATTEMPT_MAX_AGE_HOURS";

const CLEAR_RESOLVED_INVITES_FREQUENCY_SECS_VAR: &str =
    "MILIEU_CLEAR_RESOLVED_INVITES_FREQUENCY_SECS";
const RESOLVED_INVITE_MAX_AGE_DAYS_VAR: &str = "MILIEU_RESOLVED_INVITE_MAX_AGE_DAYS";

pub struct Config {
    pub db_uri: String,
    pub db_max_connections: u32,
    pub db_idle_timeout: Duration,

    pub worker_threads: usize,
    pub max_blocking_threads: usize,
    pub update_frequency: Duration,
    pub log_level: String,

    pub clear_expired_sessions_job_frequency: Duration,
    pub expired_session_grace_period: Duration,

    pub clear_stale_login_attempts_job_frequency: Duration,
    pub stale_login_attempt_max_age: Duration,

    pub clear_resolved_invites_job_frequency: Duration,
    pub resolved_invite_max_age: Duration,
}

pub static CONF: Lazy<Config> = Lazy::new(|| {
    let cpu_count = num_cpus::get();

    let db_username = require_var(DB_USERNAME_VAR);
    let db_password = require_var(DB_PASSWORD_VAR);
    let db_hostname = require_var(DB_HOSTNAME_VAR);
    let db_port: u16 = var_or(DB_PORT_VAR, 5432);
    let db_name = require_var(DB_NAME_VAR);

    Config {
        db_uri: format!(
            "postgres://{db_username}:{db_password}@{db_hostname}:{db_port}/{db_name}"
        ),
        db_max_connections: var_or(DB_MAX_CONNECTIONS_VAR, cpu_count as u32 * 2),
        db_idle_timeout: Duration::from_secs(var_or(DB_IDLE_TIMEOUT_SECS_VAR, 30)),

        worker_threads: var_or(WORKER_THREADS_VAR, cpu_count),
        max_blocking_threads: var_or(MAX_BLOCKING_THREADS_VAR, 16),
        update_frequency: Duration::from_secs(var_or(UPDATE_FREQUENCY_SECS_VAR, 30)),
        log_level: var_or(LOG_LEVEL_VAR, String::from("info")),

        clear_expired_sessions_job_frequency: Duration::from_secs(var_or(
            CLEAR_EXPIRED_SESSIONS_FREQUENCY_SECS_VAR,
            3600,
        )),
        expired_session_grace_period: Duration::from_secs(
            var_or(EXPIRED_SESSION_GRACE_HOURS_VAR, 24u64) * 3600,
        ),

        clear_stale_login_attempts_job_frequency: Duration::from_secs(var_or(
            CLEAR_STALE_LOGIN_ATTEMPTS_FREQUENCY_SECS_VAR,
            3600,
        )),
        stale_login_attempt_max_age: Duration::from_secs(
            var_or(STALE_LOGIN_ATTEMPT_MAX_AGE_HOURS_VAR, 24u64) * 3600,
        ),

        clear_resolved_invites_job_frequency: Duration::from_secs(var_or(
            CLEAR_RESOLVED_INVITES_FREQUENCY_SECS_VAR,
            3600 * 24,
        )),
        resolved_invite_max_age: Duration::from_secs(
            var_or(RESOLVED_INVITE_MAX_AGE_DAYS_VAR, 30u64) * 86400,
        ),
    }
});

fn require_var(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| panic!("Environment variable {key} must be set"))
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) => val
            .parse()
            .unwrap_or_else(|_| panic!("Environment variable {key} is incorrectly formatted")),
        Err(_) => default,
    }
}
