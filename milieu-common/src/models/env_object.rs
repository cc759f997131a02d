use diesel::{Insertable, Queryable};
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::env_objects;

/// A single encrypted env-file snapshot. The server never inspects
/// `ciphertext`; it only accounts for its size and orders versions.
#[derive(Debug, Identifiable, Queryable)]
#[diesel(table_name = env_objects)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EnvObject {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub branch: String,
    pub path: String,
    pub nonce: String,
    pub ciphertext: Vec<u8>,
    pub aad: String,
    pub ciphertext_hash: String,
    pub version: i32,
    pub created_at: SystemTime,
    pub client_created_at: Option<String>,
    pub schema_version: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = env_objects)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewEnvObject<'a> {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub branch: &'a str,
    pub path: &'a str,
    pub nonce: &'a str,
    pub ciphertext: &'a [u8],
    pub aad: &'a str,
    pub ciphertext_hash: &'a str,
    pub version: i32,
    pub created_at: SystemTime,
    pub client_created_at: Option<&'a str>,
    pub schema_version: i32,
}
