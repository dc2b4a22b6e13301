pub mod atomic;
pub mod audit_log;
mod chain;
pub mod history;
