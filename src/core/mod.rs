//! Core kernel logic: entries, registry, inheritance, binding, pipelines.

pub mod binder;
pub mod config;
pub mod entry;
pub mod error;
pub mod executor;
pub mod invoker;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod storage;
pub mod types;
