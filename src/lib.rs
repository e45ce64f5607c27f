pub mod app_database;
pub mod models;
pub mod schema;
pub mod systems;

pub use app_database::{AppDatabase, AppDatabaseError};
pub use models::*;
