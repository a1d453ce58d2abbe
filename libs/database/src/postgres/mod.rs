//! PostgreSQL connector used for subscription, user and event lookups

mod config;
mod connector;

pub use config::PostgresConfig;
pub use connector::{check_health, connect_from_config, connect_from_config_with_retry};

pub use sea_orm::{ConnectOptions, DatabaseConnection, DbErr};
