pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod runner;
pub mod snippets;
pub mod state;
pub mod store;
