//! Cluster node lifecycle controller for a replicated, leader-based
//! event-log database.
//!
//! The controller is a single-consumer handler attached to the node's main
//! in-process message bus: it decides the node's role, drives transitions
//! between roles, admits or rejects client requests, and orchestrates
//! startup and shutdown of the node's subordinate services. See
//! `SPEC_FULL.md` at the repository root for the full component design.

pub mod admission;
pub mod bus;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod fatal;
pub mod handlers;
pub mod ids;
pub mod leader_info;
pub mod message;
pub mod node_info;
pub mod role;

pub use config::ControllerConfig;
pub use controller::{Collaborators, Controller, ControllerHandles};
pub use error::ControllerError;
pub use fatal::FatalReason;
pub use node_info::NodeInfo;
pub use role::Role;
