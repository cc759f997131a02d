use diesel::{Insertable, Queryable};
use std::str::FromStr;
use std::time::SystemTime;
use uuid::Uuid;

use crate::schema::repo_invites;

/// Invite lifecycle. Only `pending` invites are actionable; the other three
/// states are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InviteStatus {
    Pending,
    Accepted,
    Rejected,
    Revoked,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Rejected => "rejected",
            InviteStatus::Revoked => "revoked",
        }
    }
}

impl FromStr for InviteStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InviteStatus::Pending),
            "accepted" => Ok(InviteStatus::Accepted),
            "rejected" => Ok(InviteStatus::Rejected),
            "revoked" => Ok(InviteStatus::Revoked),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Identifiable, Queryable)]
#[diesel(table_name = repo_invites)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RepoInvite {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub email: String,
    pub invited_by_user_id: Uuid,
    pub role: String,
    pub status: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = repo_invites)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewRepoInvite<'a> {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub email: &'a str,
    pub invited_by_user_id: Uuid,
    pub role: &'a str,
    pub status: &'a str,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}
