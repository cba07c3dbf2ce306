pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod geo;
pub mod models;
pub mod observability;
pub mod projection;
pub mod state;
pub mod tracker;
