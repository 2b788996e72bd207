//! Core load logic: config, type catalog, mapping, validation and execution.

pub mod api;
pub mod catalog;
pub mod coerce;
pub mod error;
pub mod errorlog;
pub mod executor;
pub mod input;
pub mod mapper;
pub mod parser;
pub mod types;
pub mod validator;
