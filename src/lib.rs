pub mod cfapi;
pub mod cfdb;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod schedule;
pub mod sync;
