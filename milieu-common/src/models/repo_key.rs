use diesel::{Insertable, Queryable};
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::repo_keys;

#[derive(Debug, Queryable)]
#[diesel(table_name = repo_keys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RepoKey {
    pub repo_id: Uuid,
    pub user_id: Uuid,
    pub wrapped_key: String,
    pub algorithm: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = repo_keys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewRepoKey<'a> {
    pub repo_id: Uuid,
    pub user_id: Uuid,
    pub wrapped_key: &'a str,
    pub algorithm: &'a str,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}
