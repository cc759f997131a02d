use diesel::{dsl, ExpressionMethods, OptionalExtension, QueryDsl, RunQueryDsl};
use std::time::SystemTime;

use crate::db::{DaoError, DbThreadPool};
use crate::schema::job_registry as job_registry_fields;
use crate::schema::job_registry::dsl::job_registry;

/// Bookkeeping for the background sweeper. One row per job name holding the
/// wall-clock time of its most recent dispatch, so schedules survive
/// restarts.
pub struct Dao {
    db_thread_pool: DbThreadPool,
}

impl Dao {
    pub fn new(db_thread_pool: &DbThreadPool) -> Self {
        Self {
            db_thread_pool: db_thread_pool.clone(),
        }
    }

    pub fn last_run_for(&self, job_name: &str) -> Result<Option<SystemTime>, DaoError> {
        Ok(job_registry
            .filter(job_registry_fields::job_name.eq(job_name))
            .select(job_registry_fields::last_run_timestamp)
            .get_result(&mut self.db_thread_pool.get()?)
            .optional()?)
    }

    pub fn record_run(&self, job_name: &str, ran_at: SystemTime) -> Result<(), DaoError> {
        dsl::insert_into(job_registry)
            .values((
                job_registry_fields::job_name.eq(job_name),
                job_registry_fields::last_run_timestamp.eq(ran_at),
            ))
            .on_conflict(job_registry_fields::job_name)
            .do_update()
            .set(job_registry_fields::last_run_timestamp.eq(ran_at))
            .execute(&mut self.db_thread_pool.get()?)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::db::test_utils::DB_THREAD_POOL;
    use std::time::{Duration, UNIX_EPOCH};
    use uuid::Uuid;

    #[test]
    fn test_registry_persists_and_updates_timestamps() {
        let dao = Dao::new(&DB_THREAD_POOL);
        let job_name = format!("test-job-{}", Uuid::now_v7());

        assert!(dao.last_run_for(&job_name).unwrap().is_none());

        // Microsecond granularity so the value round-trips through the DB
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        let timestamp = UNIX_EPOCH + Duration::from_micros(elapsed.as_micros() as u64);

        dao.record_run(&job_name, timestamp).unwrap();
        assert_eq!(dao.last_run_for(&job_name).unwrap(), Some(timestamp));

        let new_timestamp = timestamp + Duration::from_secs(60);
        dao.record_run(&job_name, new_timestamp).unwrap();
        assert_eq!(dao.last_run_for(&job_name).unwrap(), Some(new_timestamp));
    }
}
