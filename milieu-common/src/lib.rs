#![cfg(not(doctest))]

#[macro_use]
extern crate diesel;

pub mod db;
pub mod models;
pub mod password;
pub mod schema;
pub mod threadrand;
pub mod token;
pub mod validators;
