//! Lab Deployer Library
//!
//! Core components for deploying RHCSA training labs against a Proxmox VE
//! control plane: connection lifecycle, resource catalog, deployment
//! orchestration, VM registry and the append-only event log.

pub mod api;
pub mod app;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod deploy;
pub mod errors;
pub mod eventlog;
pub mod events;
pub mod logs;
pub mod registry;
