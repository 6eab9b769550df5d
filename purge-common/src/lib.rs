#![cfg(not(doctest))]

#[macro_use]
extern crate diesel;

pub mod db;
pub mod email;
pub mod models;
pub mod otp;
pub mod schema;
pub mod threadrand;
pub mod token;
