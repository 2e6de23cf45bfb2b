//! Application wiring and CLI flow

pub mod options;
pub mod run;
pub mod state;
