//! Deployment module

pub mod job;
pub mod orchestrator;
pub mod templates;
