use diesel::{dsl, BoolExpressionMethods, ExpressionMethods, JoinOnDsl, NullableExpressionMethods, OptionalExtension, QueryDsl, RunQueryDsl};
use std::cmp::Reverse;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::db::{DaoError, DbThreadPool};
use crate::models::repo::NewRepo;
use crate::models::repo_access::{AccessRole, NewRepoAccess};
use crate::models::repo_invite::{InviteStatus, NewRepoInvite, RepoInvite};
use crate::models::repo_link::NewRepoLink;
use crate::schema::env_objects::dsl::env_objects;
use crate::schema::env_objects as env_object_fields;
use crate::schema::repo_access as access_fields;
use crate::schema::repo_access::dsl::repo_access;
use crate::schema::repo_invites as invite_fields;
use crate::schema::repo_invites::dsl::repo_invites;
use crate::schema::repo_key_events as key_event_fields;
use crate::schema::repo_key_events::dsl::repo_key_events;
use crate::schema::repo_keys as repo_key_fields;
use crate::schema::repo_keys::dsl::repo_keys;
use crate::schema::repo_links as link_fields;
use crate::schema::repo_links::dsl::repo_links;
use crate::schema::repos as repo_fields;
use crate::schema::repos::dsl::repos;
use crate::schema::user_keys as user_key_fields;
use crate::schema::user_keys::dsl::user_keys;
use crate::schema::users as user_fields;
use crate::schema::users::dsl::users;

/// What a user is allowed to do with a repo. Owners hold every permission;
/// collaborators are limited by their granted role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessLevel {
    Owner,
    Collaborator(AccessRole),
    NoAccess,
}

impl AccessLevel {
    pub fn can_read(&self) -> bool {
        !matches!(self, AccessLevel::NoAccess)
    }

    pub fn can_write(&self) -> bool {
        matches!(
            self,
            AccessLevel::Owner | AccessLevel::Collaborator(AccessRole::Write)
        )
    }
}

pub struct RepoListEntry {
    pub repo_id: Uuid,
    pub name: String,
    pub owner_email: String,
    pub role: Option<String>,
    pub created_at: SystemTime,
    pub last_seen: Option<SystemTime>,
}

pub struct ActiveAccessEntry {
    pub email: String,
    pub role: String,
    pub created_at: SystemTime,
    pub public_key: Option<String>,
    pub key_algorithm: Option<String>,
}

pub struct PendingInviteEntry {
    pub email: String,
    pub role: String,
    pub invited_by: String,
    pub created_at: SystemTime,
}

pub struct UserInviteEntry {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub repo_name: String,
    pub role: String,
    pub invited_by: String,
    pub created_at: SystemTime,
}

pub struct Dao {
    db_thread_pool: DbThreadPool,
}

impl Dao {
    pub fn new(db_thread_pool: &DbThreadPool) -> Self {
        Self {
            db_thread_pool: db_thread_pool.clone(),
        }
    }

    /// Records a new repo and the owner's repo link. The caller supplies the
    /// id so it can be embedded in the seed manifest.
    pub fn create_repo(
        &self,
        repo_id: Uuid,
        owner_user_id: Uuid,
        name: &str,
        manifest_json: &str,
    ) -> Result<(), DaoError> {
        let mut db_connection = self.db_thread_pool.get()?;

        db_connection
            .build_transaction()
            .run::<_, DaoError, _>(|conn| {
                let now = SystemTime::now();

                let new_repo = NewRepo {
                    id: repo_id,
                    owner_user_id,
                    name,
                    manifest_json,
                    created_at: now,
                };

                dsl::insert_into(repos).values(&new_repo).execute(conn)?;

                let new_link = NewRepoLink {
                    user_id: owner_user_id,
                    repo_id,
                    last_seen: now,
                };

                dsl::insert_into(repo_links)
                    .values(&new_link)
                    .execute(conn)?;

                Ok(())
            })
    }

    /// Resolves the caller's permission on a repo. Returns `Err(NotFound)`
    /// when the repo itself does not exist.
    pub fn get_access_level(&self, repo_id: Uuid, user_id: Uuid) -> Result<AccessLevel, DaoError> {
        let mut db_connection = self.db_thread_pool.get()?;

        let owner_user_id = repos
            .find(repo_id)
            .select(repo_fields::owner_user_id)
            .get_result::<Uuid>(&mut db_connection)?;

        if owner_user_id == user_id {
            return Ok(AccessLevel::Owner);
        }

        let role = repo_access
            .find((repo_id, user_id))
            .select(access_fields::role)
            .get_result::<String>(&mut db_connection)
            .optional()?;

        Ok(match role.and_then(|r| r.parse::<AccessRole>().ok()) {
            Some(role) => AccessLevel::Collaborator(role),
            None => AccessLevel::NoAccess,
        })
    }

    pub fn get_repo_by_name_for_user(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> Result<(Uuid, String), DaoError> {
        Ok(repos
            .left_join(
                repo_access.on(access_fields::repo_id
                    .eq(repo_fields::id)
                    .and(access_fields::user_id.eq(user_id))),
            )
            .filter(repo_fields::name.eq(name))
            .filter(
                repo_fields::owner_user_id
                    .eq(user_id)
                    .or(access_fields::user_id.nullable().is_not_null()),
            )
            .select((repo_fields::id, repo_fields::name))
            .get_result::<(Uuid, String)>(&mut self.db_thread_pool.get()?)?)
    }

    pub fn get_owner(&self, repo_id: Uuid) -> Result<(Uuid, String), DaoError> {
        Ok(repos
            .inner_join(users)
            .filter(repo_fields::id.eq(repo_id))
            .select((repo_fields::owner_user_id, user_fields::email))
            .get_result::<(Uuid, String)>(&mut self.db_thread_pool.get()?)?)
    }

    pub fn get_manifest(&self, repo_id: Uuid) -> Result<String, DaoError> {
        Ok(repos
            .find(repo_id)
            .select(repo_fields::manifest_json)
            .get_result(&mut self.db_thread_pool.get()?)?)
    }

    pub fn put_manifest(&self, repo_id: Uuid, manifest_json: &str) -> Result<(), DaoError> {
        dsl::update(repos.find(repo_id))
            .set(repo_fields::manifest_json.eq(manifest_json))
            .execute(&mut self.db_thread_pool.get()?)?;

        Ok(())
    }

    /// Deletes a repo along with every row that references it.
    pub fn delete_repo(&self, repo_id: Uuid) -> Result<(), DaoError> {
        let mut db_connection = self.db_thread_pool.get()?;

        db_connection
            .build_transaction()
            .run::<_, DaoError, _>(|conn| {
                diesel::delete(env_objects.filter(env_object_fields::repo_id.eq(repo_id)))
                    .execute(conn)?;
                diesel::delete(repo_keys.filter(repo_key_fields::repo_id.eq(repo_id)))
                    .execute(conn)?;
                diesel::delete(repo_key_events.filter(key_event_fields::repo_id.eq(repo_id)))
                    .execute(conn)?;
                diesel::delete(repo_access.filter(access_fields::repo_id.eq(repo_id)))
                    .execute(conn)?;
                diesel::delete(repo_invites.filter(invite_fields::repo_id.eq(repo_id)))
                    .execute(conn)?;
                diesel::delete(repo_links.filter(link_fields::repo_id.eq(repo_id)))
                    .execute(conn)?;
                diesel::delete(repos.find(repo_id)).execute(conn)?;

                Ok(())
            })
    }

    /// Lists every repo the user owns or collaborates on, most recently
    /// used first.
    pub fn list_repos_for_user(&self, user_id: Uuid) -> Result<Vec<RepoListEntry>, DaoError> {
        let rows = repos
            .inner_join(users)
            .left_join(
                repo_access.on(access_fields::repo_id
                    .eq(repo_fields::id)
                    .and(access_fields::user_id.eq(user_id))),
            )
            .left_join(
                repo_links.on(link_fields::repo_id
                    .eq(repo_fields::id)
                    .and(link_fields::user_id.eq(user_id))),
            )
            .filter(
                repo_fields::owner_user_id
                    .eq(user_id)
                    .or(access_fields::user_id.nullable().is_not_null()),
            )
            .select((
                repo_fields::id,
                repo_fields::name,
                user_fields::email,
                access_fields::role.nullable(),
                repo_fields::created_at,
                link_fields::last_seen.nullable(),
            ))
            .load::<(Uuid, String, String, Option<String>, SystemTime, Option<SystemTime>)>(
                &mut self.db_thread_pool.get()?,
            )?;

        let mut entries: Vec<RepoListEntry> = rows
            .into_iter()
            .map(
                |(repo_id, name, owner_email, role, created_at, last_seen)| RepoListEntry {
                    repo_id,
                    name,
                    owner_email,
                    role,
                    created_at,
                    last_seen,
                },
            )
            .collect();

        entries.sort_by_key(|entry| Reverse(entry.last_seen.unwrap_or(entry.created_at)));

        Ok(entries)
    }

    pub fn upsert_repo_link(&self, user_id: Uuid, repo_id: Uuid) -> Result<(), DaoError> {
        let new_link = NewRepoLink {
            user_id,
            repo_id,
            last_seen: SystemTime::now(),
        };

        dsl::insert_into(repo_links)
            .values(&new_link)
            .on_conflict((link_fields::user_id, link_fields::repo_id))
            .do_update()
            .set(link_fields::last_seen.eq(new_link.last_seen))
            .execute(&mut self.db_thread_pool.get()?)?;

        Ok(())
    }

    pub fn user_has_access(&self, repo_id: Uuid, email: &str) -> Result<bool, DaoError> {
        let count = repo_access
            .inner_join(users)
            .filter(access_fields::repo_id.eq(repo_id))
            .filter(user_fields::email.eq(email))
            .count()
            .get_result::<i64>(&mut self.db_thread_pool.get()?)?;

        Ok(count > 0)
    }

    /// Records an invite. A pending invite for the same email is refreshed
    /// in place rather than duplicated.
    pub fn create_or_refresh_invite(
        &self,
        repo_id: Uuid,
        email: &str,
        invited_by_user_id: Uuid,
        role: AccessRole,
    ) -> Result<Uuid, DaoError> {
        let mut db_connection = self.db_thread_pool.get()?;

        db_connection
            .build_transaction()
            .run::<_, DaoError, _>(|conn| {
                let now = SystemTime::now();

                let existing = repo_invites
                    .filter(invite_fields::repo_id.eq(repo_id))
                    .filter(invite_fields::email.eq(email))
                    .filter(invite_fields::status.eq(InviteStatus::Pending.as_str()))
                    .select(invite_fields::id)
                    .get_result::<Uuid>(conn)
                    .optional()?;

                if let Some(invite_id) = existing {
                    dsl::update(repo_invites.find(invite_id))
                        .set((
                            invite_fields::role.eq(role.as_str()),
                            invite_fields::updated_at.eq(now),
                        ))
                        .execute(conn)?;

                    return Ok(invite_id);
                }

                let invite_id = Uuid::now_v7();

                let new_invite = NewRepoInvite {
                    id: invite_id,
                    repo_id,
                    email,
                    invited_by_user_id,
                    role: role.as_str(),
                    status: InviteStatus::Pending.as_str(),
                    created_at: now,
                    updated_at: now,
                };

                dsl::insert_into(repo_invites)
                    .values(&new_invite)
                    .execute(conn)?;

                Ok(invite_id)
            })
    }

    pub fn list_active_access(&self, repo_id: Uuid) -> Result<Vec<ActiveAccessEntry>, DaoError> {
        let rows = repo_access
            .inner_join(users.left_join(user_keys))
            .filter(access_fields::repo_id.eq(repo_id))
            .select((
                user_fields::email,
                access_fields::role,
                access_fields::created_at,
                user_key_fields::public_key.nullable(),
                user_key_fields::algorithm.nullable(),
            ))
            .order(user_fields::email.asc())
            .load::<(String, String, SystemTime, Option<String>, Option<String>)>(
                &mut self.db_thread_pool.get()?,
            )?;

        Ok(rows
            .into_iter()
            .map(
                |(email, role, created_at, public_key, key_algorithm)| ActiveAccessEntry {
                    email,
                    role,
                    created_at,
                    public_key,
                    key_algorithm,
                },
            )
            .collect())
    }

    pub fn list_pending_invites(&self, repo_id: Uuid) -> Result<Vec<PendingInviteEntry>, DaoError> {
        let rows = repo_invites
            .inner_join(users)
            .filter(invite_fields::repo_id.eq(repo_id))
            .filter(invite_fields::status.eq(InviteStatus::Pending.as_str()))
            .select((
                invite_fields::email,
                invite_fields::role,
                user_fields::email,
                invite_fields::created_at,
            ))
            .order(invite_fields::created_at.desc())
            .load::<(String, String, String, SystemTime)>(&mut self.db_thread_pool.get()?)?;

        Ok(rows
            .into_iter()
            .map(|(email, role, invited_by, created_at)| PendingInviteEntry {
                email,
                role,
                invited_by,
                created_at,
            })
            .collect())
    }

    pub fn list_invites_for_email(&self, email: &str) -> Result<Vec<UserInviteEntry>, DaoError> {
        let rows = repo_invites
            .inner_join(repos)
            .inner_join(users)
            .filter(invite_fields::email.eq(email))
            .filter(invite_fields::status.eq(InviteStatus::Pending.as_str()))
            .select((
                invite_fields::id,
                invite_fields::repo_id,
                repo_fields::name,
                invite_fields::role,
                user_fields::email,
                invite_fields::created_at,
            ))
            .order(invite_fields::created_at.desc())
            .load::<(Uuid, Uuid, String, String, String, SystemTime)>(
                &mut self.db_thread_pool.get()?,
            )?;

        Ok(rows
            .into_iter()
            .map(
                |(id, repo_id, repo_name, role, invited_by, created_at)| UserInviteEntry {
                    id,
                    repo_id,
                    repo_name,
                    role,
                    invited_by,
                    created_at,
                },
            )
            .collect())
    }

    pub fn get_pending_invite_for_email(
        &self,
        invite_id: Uuid,
        email: &str,
    ) -> Result<RepoInvite, DaoError> {
        Ok(repo_invites
            .find(invite_id)
            .filter(invite_fields::email.eq(email))
            .filter(invite_fields::status.eq(InviteStatus::Pending.as_str()))
            .get_result(&mut self.db_thread_pool.get()?)?)
    }

    pub fn reject_invite(&self, invite_id: Uuid) -> Result<(), DaoError> {
        dsl::update(repo_invites.find(invite_id))
            .set((
                invite_fields::status.eq(InviteStatus::Rejected.as_str()),
                invite_fields::updated_at.eq(SystemTime::now()),
            ))
            .execute(&mut self.db_thread_pool.get()?)?;

        Ok(())
    }

    /// Grants the invited role and marks the invite accepted, all or nothing.
    pub fn accept_invite(&self, invite: &RepoInvite, user_id: Uuid) -> Result<(), DaoError> {
        let mut db_connection = self.db_thread_pool.get()?;

        db_connection
            .build_transaction()
            .run::<_, DaoError, _>(|conn| {
                let now = SystemTime::now();

                let new_access = NewRepoAccess {
                    repo_id: invite.repo_id,
                    user_id,
                    role: &invite.role,
                    created_at: now,
                    updated_at: now,
                };

                dsl::insert_into(repo_access)
                    .values(&new_access)
                    .on_conflict((access_fields::repo_id, access_fields::user_id))
                    .do_update()
                    .set((
                        access_fields::role.eq(&invite.role),
                        access_fields::updated_at.eq(now),
                    ))
                    .execute(conn)?;

                dsl::update(repo_invites.find(invite.id))
                    .set((
                        invite_fields::status.eq(InviteStatus::Accepted.as_str()),
                        invite_fields::updated_at.eq(now),
                    ))
                    .execute(conn)?;

                let new_link = NewRepoLink {
                    user_id,
                    repo_id: invite.repo_id,
                    last_seen: now,
                };

                dsl::insert_into(repo_links)
                    .values(&new_link)
                    .on_conflict((link_fields::user_id, link_fields::repo_id))
                    .do_update()
                    .set(link_fields::last_seen.eq(now))
                    .execute(conn)?;

                Ok(())
            })
    }

    /// Returns the number of pending invites updated (zero or one).
    pub fn set_pending_invite_role(
        &self,
        repo_id: Uuid,
        email: &str,
        role: AccessRole,
    ) -> Result<usize, DaoError> {
        Ok(dsl::update(
            repo_invites
                .filter(invite_fields::repo_id.eq(repo_id))
                .filter(invite_fields::email.eq(email))
                .filter(invite_fields::status.eq(InviteStatus::Pending.as_str())),
        )
        .set((
            invite_fields::role.eq(role.as_str()),
            invite_fields::updated_at.eq(SystemTime::now()),
        ))
        .execute(&mut self.db_thread_pool.get()?)?)
    }

    pub fn set_access_role(
        &self,
        repo_id: Uuid,
        user_id: Uuid,
        role: AccessRole,
    ) -> Result<usize, DaoError> {
        Ok(dsl::update(repo_access.find((repo_id, user_id)))
            .set((
                access_fields::role.eq(role.as_str()),
                access_fields::updated_at.eq(SystemTime::now()),
            ))
            .execute(&mut self.db_thread_pool.get()?)?)
    }

    /// Returns the number of pending invites revoked (zero or one).
    pub fn revoke_pending_invite(&self, repo_id: Uuid, email: &str) -> Result<usize, DaoError> {
        Ok(dsl::update(
            repo_invites
                .filter(invite_fields::repo_id.eq(repo_id))
                .filter(invite_fields::email.eq(email))
                .filter(invite_fields::status.eq(InviteStatus::Pending.as_str())),
        )
        .set((
            invite_fields::status.eq(InviteStatus::Revoked.as_str()),
            invite_fields::updated_at.eq(SystemTime::now()),
        ))
        .execute(&mut self.db_thread_pool.get()?)?)
    }

    /// Removes a collaborator's access row and repo link. Returns the number
    /// of access rows deleted.
    pub fn remove_access(&self, repo_id: Uuid, user_id: Uuid) -> Result<usize, DaoError> {
        let mut db_connection = self.db_thread_pool.get()?;

        db_connection
            .build_transaction()
            .run::<_, DaoError, _>(|conn| {
                let deleted =
                    diesel::delete(repo_access.find((repo_id, user_id))).execute(conn)?;

                diesel::delete(repo_links.find((user_id, repo_id))).execute(conn)?;

                Ok(deleted)
            })
    }

    /// Deletes accepted, rejected, and revoked invites that have not been
    /// touched within `max_age`. Pending invites are never deleted.
    pub fn delete_resolved_invites(&self, max_age: Duration) -> Result<usize, DaoError> {
        let cutoff = SystemTime::now() - max_age;

        Ok(diesel::delete(
            repo_invites
                .filter(invite_fields::status.ne(InviteStatus::Pending.as_str()))
                .filter(invite_fields::updated_at.lt(cutoff)),
        )
        .execute(&mut self.db_thread_pool.get()?)?)
    }
}
