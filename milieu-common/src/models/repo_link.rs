use diesel::{Insertable, Queryable};
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::repo_links;

#[derive(Debug, Queryable)]
#[diesel(table_name = repo_links)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RepoLink {
    pub user_id: Uuid,
    pub repo_id: Uuid,
    pub last_seen: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = repo_links)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewRepoLink {
    pub user_id: Uuid,
    pub repo_id: Uuid,
    pub last_seen: SystemTime,
}
