pub mod auth;
pub mod categories;
pub mod config;
pub mod db;
pub mod error;
pub mod google;
pub mod household;
pub mod http;
pub mod id;
pub mod invites;
pub mod logging;
pub mod mail;
pub mod members;
pub mod migrate;
pub mod model;
pub mod pets;
pub mod repo;
pub mod rewards;
pub mod state;
pub mod tasks;
pub mod time;
pub mod users;

pub use error::{AppError, AppResult};
