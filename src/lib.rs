//! cloudock - OpenStack cluster orchestration for Docker workloads
//!
//! cloudock provisions a named cluster of virtual machines, secures it with
//! security group rules computed from the live roster, and deploys
//! containers across the nodes. It provides:
//!
//! - Node creation and destruction with bounded convergence polling
//! - Security group reconciliation from role-addressed rule templates
//! - Image pulls, container lifecycle and smoke tests on every node
//! - Live progress tables and per-entity outcome reports

pub mod config;
pub mod docker;
pub mod error;
pub mod node;
pub mod openstack;
pub mod orchestrator;
pub mod progress;
pub mod secgroup;
pub mod topology;

#[cfg(test)]
mod testing;

pub use error::{CloudockError, Result};
