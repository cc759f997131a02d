use diesel::{Insertable, Queryable};
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::repos;

#[derive(Debug, Identifiable, Queryable)]
#[diesel(table_name = repos)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Repo {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    pub manifest_json: String,
    pub created_at: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = repos)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewRepo<'a> {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: &'a str,
    pub manifest_json: &'a str,
    pub created_at: SystemTime,
}
