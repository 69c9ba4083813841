//! Storage backends for the certification workflow.

pub mod memory;
pub mod postgres;

pub use memory::{CommitStep, InMemoryCertificationStore};
pub use postgres::PgCertificationStore;
