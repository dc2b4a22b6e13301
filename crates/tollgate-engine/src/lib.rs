#![forbid(unsafe_code)]

pub mod baseline;
pub mod classify;
pub mod emit;
pub mod gates;
pub mod pipeline;
pub mod state;
pub mod tools;

pub use pipeline::Pipeline;
