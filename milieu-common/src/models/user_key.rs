use diesel::{Insertable, Queryable};
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::user_keys;

#[derive(Debug, Queryable)]
#[diesel(table_name = user_keys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserKey {
    pub user_id: Uuid,
    pub public_key: String,
    pub algorithm: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_keys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewUserKey<'a> {
    pub user_id: Uuid,
    pub public_key: &'a str,
    pub algorithm: &'a str,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}
