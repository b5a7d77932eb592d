//! Cluster-wide name resolution through `/etc/hosts`

use super::provider::LiveNode;
use crate::error::{CloudockError, Result};
use crate::progress::Report;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs shell commands on cluster nodes
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run `command` as `user` on `host`, returning its standard output
    async fn run(&self, user: &str, host: &str, command: &str) -> Result<String>;
}

/// `ssh` client of the local machine
pub struct SshShell;

#[async_trait]
impl RemoteShell for SshShell {
    async fn run(&self, user: &str, host: &str, command: &str) -> Result<String> {
        debug!("ssh {}@{} {}", user, host, command);
        let output = Command::new("ssh")
            .args(["-o", "StrictHostKeyChecking=no"])
            .arg(format!("{}@{}", user, host))
            .arg(command)
            .output()
            .await?;

        if !output.status.success() {
            return Err(CloudockError::Remote(format!(
                "{}: {}",
                host,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// `<ipv4> <name>` lines of every addressed node
pub fn host_entries(roster: &[LiveNode]) -> Vec<String> {
    roster
        .iter()
        .filter(|n| !n.ipv4.is_empty())
        .map(|n| format!("{} {}", n.ipv4, n.name))
        .collect()
}

/// Shell command prepending `entries` to `/etc/hosts`
pub fn prepend_hosts_command(entries: &[String]) -> String {
    format!(
        "printf '%s\\n' {} | cat - /etc/hosts > /tmp/cloudock-hosts && sudo mv /tmp/cloudock-hosts /etc/hosts",
        entries
            .iter()
            .map(|e| format!("'{}'", e))
            .collect::<Vec<_>>()
            .join(" ")
    )
}

/// Write the whole roster into the hosts file of every active node
///
/// Nodes are updated one after the other; a failing node is reported and
/// the next one is still attempted.
pub async fn update_hosts(
    shell: &dyn RemoteShell,
    user: &str,
    roster: &[LiveNode],
) -> Report {
    let mut report = Report::new("node dns");
    let command = prepend_hosts_command(&host_entries(roster));

    for node in roster {
        if !node.is_converged() {
            report.skip(&node.name, format!("status {}", node.status));
            continue;
        }
        let result = shell.run(user, &node.ipv4, &command).await.map(|_| ());
        match &result {
            Ok(()) => info!("Done prepending hosts to {}", node.name),
            Err(e) => warn!("Failed to update hosts of {}: {}", node.name, e),
        }
        report.absorb(&node.name, result);
    }
    report
}
