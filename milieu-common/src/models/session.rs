use diesel::{Insertable, Queryable};
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::sessions;

#[derive(Debug, Queryable)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Session {
    pub token_digest: Vec<u8>,
    pub token_suffix: String,
    pub user_id: Uuid,
    pub host: String,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewSession<'a> {
    pub token_digest: &'a [u8],
    pub token_suffix: &'a str,
    pub user_id: Uuid,
    pub host: &'a str,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}
