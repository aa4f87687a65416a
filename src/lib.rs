mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod gateway;
    pub mod identity;
    pub mod memory;
    pub mod postgres;
    pub mod reconcile;
    pub mod schema;
}
mod authentication {
    pub mod jwt;
    pub mod middleware;
}
mod constants;

pub mod config;
pub mod routes;

pub use authentication::*;
pub use constants::*;
pub use database::*;
