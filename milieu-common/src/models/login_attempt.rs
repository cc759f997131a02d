use diesel::{Insertable, Queryable};
use std::time::SystemTime;

use crate::schema::login_attempts;

#[derive(Debug, Queryable)]
#[diesel(table_name = login_attempts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LoginAttempt {
    pub attempt_key: String,
    pub count: i32,
    pub window_start: SystemTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = login_attempts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewLoginAttempt<'a> {
    pub attempt_key: &'a str,
    pub count: i32,
    pub window_start: SystemTime,
}
