pub mod cli;
pub mod config;
pub mod error;
pub mod exchange;
pub mod expiry;
pub mod mfa;
pub mod refresh;
pub mod service;
pub mod store;

pub use error::RefreshError;
