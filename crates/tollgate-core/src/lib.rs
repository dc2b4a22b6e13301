#![forbid(unsafe_code)]

pub mod baseline;
pub mod config;
pub mod decision;
pub mod errors;
pub mod event;
pub mod schema;
pub mod traits;
pub mod types;
