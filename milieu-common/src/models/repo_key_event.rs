use diesel::{Insertable, Queryable};
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::repo_key_events;

// Append-only audit trail for wrapped-key distribution.

#[derive(Debug, Identifiable, Queryable)]
#[diesel(table_name = repo_key_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RepoKeyEvent {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub requester_user_id: Uuid,
    pub requester_email: String,
    pub target_user_id: Uuid,
    pub target_email: String,
    pub action: String,
    pub created_at: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = repo_key_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewRepoKeyEvent<'a> {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub requester_user_id: Uuid,
    pub requester_email: &'a str,
    pub target_user_id: Uuid,
    pub target_email: &'a str,
    pub action: &'a str,
    pub created_at: SystemTime,
}
