//! Composite cluster operations
//!
//! `launch` brings a cluster up from nothing and `teardown` removes it.
//! Each runs its steps in order and stops after the first step whose
//! report carries an error.

use crate::config::ClusterConfig;
use crate::error::{CloudockError, Result};
use crate::node::{update_hosts, ComputeProvider, Confirm, NodeManager, PollPolicy, RemoteShell};
use crate::progress::{ProgressSink, Report};
use crate::secgroup::{NetworkProvider, SecurityGroupReconciler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Drives the node, security group and hosts file steps of a cluster
pub struct Orchestrator<'a> {
    config: &'a ClusterConfig,
    compute: &'a dyn ComputeProvider,
    network: &'a dyn NetworkProvider,
    shell: &'a dyn RemoteShell,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a ClusterConfig,
        compute: &'a dyn ComputeProvider,
        network: &'a dyn NetworkProvider,
        shell: &'a dyn RemoteShell,
    ) -> Self {
        Self {
            config,
            compute,
            network,
            shell,
            policy: PollPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn nodes(&self) -> NodeManager<'a> {
        NodeManager::new(self.config, self.compute)
            .with_policy(self.policy)
            .with_cancellation(self.cancel.clone())
    }

    fn secgroups(&self) -> SecurityGroupReconciler<'a> {
        SecurityGroupReconciler::new(self.config, self.network, self.compute)
    }

    fn ssh_username(&self) -> Result<&'a str> {
        self.config
            .provider
            .ssh_username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                CloudockError::InvalidConfig(
                    "provider.ssh_username is required to update hosts files".to_string(),
                )
            })
    }

    /// Prepend the cluster roster to the hosts file of every active node
    pub async fn dns(&self) -> Result<Report> {
        let user = self.ssh_username()?;
        let roster = self.nodes().list(None).await?;
        info!("Updating hosts files of {} nodes", roster.len());
        Ok(update_hosts(self.shell, user, &roster).await)
    }

    /// Create the security groups and nodes, then wire rules and hosts
    pub async fn launch(&self, sink: &mut dyn ProgressSink) -> Result<Report> {
        // Checked before the first provider call
        self.ssh_username()?;
        let mut report = Report::new("launch");

        if !step(&mut report, self.secgroups().create().await)? {
            return Ok(skip_rest(report, &["node create", "secgroup update", "node dns"]));
        }
        let created = self.nodes().create(&self.config.node_types, sink).await;
        if !step(&mut report, created)? {
            return Ok(skip_rest(report, &["secgroup update", "node dns"]));
        }
        if !step(&mut report, self.secgroups().update().await)? {
            return Ok(skip_rest(report, &["node dns"]));
        }
        step(&mut report, self.dns().await)?;

        Ok(report)
    }

    /// Destroy the nodes, then the security groups they used
    pub async fn teardown(
        &self,
        confirm: &dyn Confirm,
        sink: &mut dyn ProgressSink,
    ) -> Result<Report> {
        let mut report = Report::new("teardown");

        if !step(&mut report, self.nodes().destroy(confirm, sink).await)? {
            return Ok(skip_rest(report, &["secgroup destroy"]));
        }
        step(&mut report, self.secgroups().destroy().await)?;

        Ok(report)
    }
}

/// Merge a step into the composite report, telling if the next may run
///
/// Operator aborts propagate. Other fatal step errors end the run inside
/// the report.
fn step(report: &mut Report, outcome: Result<Report>) -> Result<bool> {
    match outcome {
        Ok(step) => {
            let failed = !step.is_success();
            report.merge(step);
            Ok(!failed)
        }
        Err(CloudockError::Aborted) => Err(CloudockError::Aborted),
        Err(e) => {
            warn!("{} stopped: {}", report.operation(), e);
            report.finish(Err(e));
            Ok(false)
        }
    }
}

fn skip_rest(mut report: Report, steps: &[&str]) -> Report {
    for name in steps {
        report.skip(*name, "an earlier step failed");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NodeTypeSpec, RuleTemplate, SecurityGroupSpec};
    use crate::node::AssumeYes;
    use crate::progress::Outcome;
    use crate::testing::{
        cluster_config, FakeCompute, FakeNetwork, FakeShell, RecordingSink,
    };
    use std::time::Duration;

    fn config() -> ClusterConfig {
        let mut config = cluster_config("demo");
        config.security_groups.insert(
            "internal".to_string(),
            SecurityGroupSpec {
                description: "Cluster traffic".to_string(),
                rules: vec![RuleTemplate {
                    remote_node_roles: vec!["web".to_string()],
                    ..Default::default()
                }],
            },
        );
        config.node_types = vec![NodeTypeSpec {
            name: "web".to_string(),
            replication: 2,
            security_groups: vec!["internal".to_string()],
            ..Default::default()
        }];
        config
    }

    fn fast() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_runs_every_step() {
        let config = config();
        let compute = FakeCompute::new();
        compute.script("demo-web-1", &["BUILD", "ACTIVE"]);
        compute.script("demo-web-2", &["ACTIVE"]);
        let network = FakeNetwork::new();
        let shell = FakeShell::default();
        let mut sink = RecordingSink::default();

        let report = Orchestrator::new(&config, &compute, &network, &shell)
            .with_policy(fast())
            .launch(&mut sink)
            .await
            .unwrap();

        assert!(report.is_success(), "{}", report);
        assert_eq!(network.groups()[0].name, "demo-internal");
        assert_eq!(compute.created()[0].security_groups, vec!["demo-internal"]);
        assert_eq!(network.rules_of("demo-internal").len(), 2);
        assert_eq!(shell.hosts(), vec!["ubuntu@10.0.0.1", "ubuntu@10.0.0.2"]);
        assert!(report
            .entries()
            .iter()
            .any(|e| e.entity == "node create: demo-web-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_stops_after_failed_step() {
        let config = config();
        let compute = FakeCompute::new();
        compute.fail_create("demo-web-2");
        compute.script("demo-web-1", &["ACTIVE"]);
        let network = FakeNetwork::new();
        let shell = FakeShell::default();
        let mut sink = RecordingSink::default();

        let report = Orchestrator::new(&config, &compute, &network, &shell)
            .with_policy(fast())
            .launch(&mut sink)
            .await
            .unwrap();

        assert!(matches!(report.error(), Some(CloudockError::Compute(_))));
        assert!(network.rules_of("demo-internal").is_empty());
        assert!(shell.hosts().is_empty());
        let last = report.entries().last().unwrap();
        assert_eq!(last.entity, "node dns");
        assert!(matches!(last.outcome, Outcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_launch_requires_ssh_user_before_any_call() {
        let mut config = config();
        config.provider.ssh_username = None;
        let compute = FakeCompute::new();
        let network = FakeNetwork::new();
        let shell = FakeShell::default();
        let mut sink = RecordingSink::default();

        let err = Orchestrator::new(&config, &compute, &network, &shell)
            .launch(&mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, CloudockError::InvalidConfig(_)));
        assert!(network.groups().is_empty());
        assert!(compute.created().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_removes_nodes_then_groups() {
        let config = config();
        let compute = FakeCompute::new();
        compute.add_node("demo-web-1", "10.0.0.1", "ACTIVE");
        let network = FakeNetwork::new();
        network.create_group("demo-internal", "").await.unwrap();
        network.create_group("other-internal", "").await.unwrap();
        let shell = FakeShell::default();
        let mut sink = RecordingSink::default();

        let report = Orchestrator::new(&config, &compute, &network, &shell)
            .with_policy(fast())
            .teardown(&AssumeYes, &mut sink)
            .await
            .unwrap();

        assert!(report.is_success(), "{}", report);
        assert!(compute.live_names().is_empty());
        let names: Vec<_> = network.groups().into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["other-internal"]);
    }

    #[tokio::test]
    async fn test_dns_reports_unreachable_node() {
        let config = config();
        let compute = FakeCompute::new();
        compute.add_node("demo-web-1", "10.0.0.1", "ACTIVE");
        compute.add_node("demo-web-2", "10.0.0.2", "ACTIVE");
        compute.add_node("demo-web-3", "10.0.0.3", "BUILD");
        let network = FakeNetwork::new();
        let shell = FakeShell::failing_on("10.0.0.1");

        let report = Orchestrator::new(&config, &compute, &network, &shell)
            .dns()
            .await
            .unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(shell.hosts(), vec!["ubuntu@10.0.0.1", "ubuntu@10.0.0.2"]);
        assert!(matches!(report.error(), Some(CloudockError::Remote(_))));
    }
}
