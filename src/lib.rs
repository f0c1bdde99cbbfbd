pub mod api;
pub mod config;
pub mod error;
pub mod secrets;
pub mod store;
pub mod validation;
pub mod webhook;
