pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod fallback;
pub mod photos;
pub mod projects;
pub mod remote;
pub mod sync;
pub mod workflow;
