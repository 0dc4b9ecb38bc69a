// publisher-core/src/infrastructure/mod.rs

pub mod acquisition;
pub mod adapters;
pub mod compiler;
pub mod config;
pub mod connection;
pub mod error;
pub mod fs;
