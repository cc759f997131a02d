pub mod env_object;
pub mod login_attempt;
pub mod repo;
pub mod repo_access;
pub mod repo_invite;
pub mod repo_key;
pub mod repo_key_event;
pub mod repo_link;
pub mod session;
pub mod umk_blob;
pub mod user;
pub mod user_key;
