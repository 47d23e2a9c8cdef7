//! Infrastructure layer: event persistence, command dispatch, read models,
//! and the external data sources audits sample from.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod sequence;
pub mod sources;

#[cfg(test)]
mod integration_tests;
