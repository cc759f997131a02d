use diesel::{Insertable, Queryable};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::repo_access;

/// Access granted to a collaborator. Repo owners are not represented in
/// `repo_access`; ownership is recorded on the repo row itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessRole {
    Read,
    Write,
}

impl AccessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRole::Read => "read",
            AccessRole::Write => "write",
        }
    }
}

impl FromStr for AccessRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(AccessRole::Read),
            "write" => Ok(AccessRole::Write),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AccessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Queryable)]
#[diesel(table_name = repo_access)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RepoAccess {
    pub repo_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = repo_access)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewRepoAccess<'a> {
    pub repo_id: Uuid,
    pub user_id: Uuid,
    pub role: &'a str,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}
