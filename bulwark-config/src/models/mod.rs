pub mod auth;
pub mod runner;
