use diesel::{Insertable, Queryable};
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::umk_blobs;

#[derive(Debug, Queryable)]
#[diesel(table_name = umk_blobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UmkBlob {
    pub user_id: Uuid,
    pub encrypted_umk: String,
    pub kdf_params: String,
    pub version: i32,
    pub updated_at: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = umk_blobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewUmkBlob<'a> {
    pub user_id: Uuid,
    pub encrypted_umk: &'a str,
    pub kdf_params: &'a str,
    pub version: i32,
    pub updated_at: SystemTime,
}
