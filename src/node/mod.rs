//! Compute nodes: provider interface, polling and lifecycle

pub mod dns;
pub mod lifecycle;
pub mod poll;
pub mod provider;

pub use dns::{update_hosts, RemoteShell, SshShell};
pub use lifecycle::{AssumeYes, Confirm, NodeManager, StdinConfirm};
pub use poll::{poll_until, PollPolicy, Probe};
pub use provider::{ComputeProvider, InstanceFilter, InstanceRequest, LiveNode};
