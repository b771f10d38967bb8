pub mod auth;
pub mod bookings;
pub mod cars;
pub mod config;
pub mod context;
pub mod db_client;
pub mod error;
pub mod routes;
pub mod search;
pub mod store;
pub mod verification;
