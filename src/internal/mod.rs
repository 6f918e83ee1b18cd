//! Internal layer exports for authentication, configuration, the execution
//! unit and its loader, command tokenizing and the orchestrator that ties
//! them together.

pub mod auth;
pub mod config;
pub mod module;
pub mod orchestrator;
pub mod tokenizer;
