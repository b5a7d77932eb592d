//! Node lifecycle management
//!
//! Nodes are created in parallel and each one is polled until it converges
//! or its time budget runs out. Destruction works off the live roster, not
//! the declared catalog, and polls until the provider stops knowing the
//! instance.

use super::poll::{poll_until, PollPolicy, Probe};
use super::provider::{ComputeProvider, InstanceFilter, InstanceRequest, LiveNode};
use crate::config::{ClusterConfig, NodeTypeSpec};
use crate::error::{CloudockError, Result};
use crate::progress::{run_with_redraw, ProgressSink, ProgressTable, Report, REDRAW_PERIOD};
use crate::topology::{expand, fan_out, group_name, FanOutMode, NodeIdentity};
use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Progress table columns of node operations
pub const NODE_COLUMNS: &[&str] = &["Id", "Name", "Zone:Ipv4", "Status"];

/// Yes/no gate in front of destructive operations
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Answers yes without asking (`--yes`)
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Asks on the controlling terminal
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        print!("{} [y/N] ", prompt);
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

/// Node lifecycle manager
pub struct NodeManager<'a> {
    config: &'a ClusterConfig,
    compute: &'a dyn ComputeProvider,
    policy: PollPolicy,
    redraw: Duration,
    cancel: CancellationToken,
}

impl<'a> NodeManager<'a> {
    pub fn new(config: &'a ClusterConfig, compute: &'a dyn ComputeProvider) -> Self {
        Self {
            config,
            compute,
            policy: PollPolicy::default(),
            redraw: REDRAW_PERIOD,
            cancel: CancellationToken::new(),
        }
    }

    /// Override the poll cadence and budget
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Token cancelling pending polls
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Create every node of the given types and wait for them to converge
    pub async fn create(
        &self,
        node_types: &[NodeTypeSpec],
        sink: &mut dyn ProgressSink,
    ) -> Result<Report> {
        let identities = expand(&self.config.cluster, node_types);
        info!(
            "Creating {} nodes in cluster {}",
            identities.len(),
            self.config.cluster
        );

        let table = RefCell::new(ProgressTable::new(NODE_COLUMNS).with_status_column(3));
        let report = RefCell::new(Report::new("node create"));

        let work = fan_out(identities.iter(), FanOutMode::Parallel, |identity| {
            let table = &table;
            let report = &report;
            async move {
                let result = self.create_one(node_types, identity, table).await;
                if let Err(e) = &result {
                    warn!("Node {} not created: {}", identity.name, e);
                }
                report.borrow_mut().record(&identity.name, &result);
                result
            }
        });
        let result = run_with_redraw(&table, sink, self.redraw, work).await;

        let mut report = report.into_inner();
        report.finish(result);
        Ok(report)
    }

    async fn create_one(
        &self,
        node_types: &[NodeTypeSpec],
        identity: &NodeIdentity,
        table: &RefCell<ProgressTable>,
    ) -> Result<()> {
        let spec = node_types
            .iter()
            .find(|t| t.name == identity.node_type)
            .ok_or_else(|| {
                CloudockError::InvalidConfig(format!("Unknown node type {}", identity.node_type))
            })?;

        let request = self.instance_request(spec, &identity.name);
        let id = self.compute.create_instance(&request).await?;
        info!("Submitted {} as {}", identity.name, id);

        let id = &id;
        let node = poll_until(&self.policy, &self.cancel, &identity.name, move || async move {
            let node = self.compute.get_instance(id).await?;
            debug!("{} is {}", node.name, node.status);
            table.borrow_mut().upsert(node.short_id(), node_row(&node));
            Ok(if node.is_converged() {
                Probe::Ready(node)
            } else {
                Probe::Pending
            })
        })
        .await?;

        info!("Node {} is {} at {}", node.name, node.status, node.ipv4);
        Ok(())
    }

    fn instance_request(&self, spec: &NodeTypeSpec, name: &str) -> InstanceRequest {
        let provider = &self.config.provider;
        InstanceRequest {
            name: name.to_string(),
            tenant: provider.tenant_name.clone(),
            security_groups: spec
                .security_groups
                .iter()
                .map(|g| group_name(&self.config.cluster, g))
                .collect(),
            image_ref: spec.image_ref.clone(),
            flavor_ref: spec.flavor_ref.clone(),
            key_name: provider.key_name.clone(),
            availability_zone: provider.availability_zone.clone(),
            user_data: provider.user_data.clone(),
        }
    }

    /// Live cluster nodes, optionally restricted to one status
    pub async fn list(&self, status: Option<&str>) -> Result<Vec<LiveNode>> {
        let filter = InstanceFilter::cluster(&self.config.cluster).with_status(status);
        let mut nodes = self.compute.list_instances(&filter).await?;
        nodes.retain(|n| filter.accepts(n));
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    /// Destroy every live node of the cluster
    ///
    /// Nothing is called when the operator declines.
    pub async fn destroy(
        &self,
        confirm: &dyn Confirm,
        sink: &mut dyn ProgressSink,
    ) -> Result<Report> {
        let prompt = format!(
            "Destroy every node of cluster {}?",
            self.config.cluster
        );
        if !confirm.confirm(&prompt)? {
            return Err(CloudockError::Aborted);
        }

        let roster = self.list(None).await?;
        info!("Destroying {} nodes of cluster {}", roster.len(), self.config.cluster);

        let table = RefCell::new(ProgressTable::new(NODE_COLUMNS).with_status_column(3));
        let report = RefCell::new(Report::new("node destroy"));

        let work = fan_out(roster.iter(), FanOutMode::Parallel, |node| {
            let table = &table;
            let report = &report;
            async move {
                let result = self.destroy_one(node, table).await;
                if let Err(e) = &result {
                    warn!("Node {} not destroyed: {}", node.name, e);
                }
                report.borrow_mut().record(&node.name, &result);
                result
            }
        });
        let result = run_with_redraw(&table, sink, self.redraw, work).await;

        let mut report = report.into_inner();
        report.finish(result);
        Ok(report)
    }

    async fn destroy_one(&self, node: &LiveNode, table: &RefCell<ProgressTable>) -> Result<()> {
        self.compute.destroy_instance(&node.id).await?;
        info!("Requested deletion of {}", node.name);

        poll_until(&self.policy, &self.cancel, &node.name, move || async move {
            match self.compute.get_instance(&node.id).await {
                Ok(current) => {
                    table.borrow_mut().upsert(current.short_id(), node_row(&current));
                    Ok(Probe::Pending)
                }
                Err(CloudockError::InstanceNotFound(_)) => {
                    let mut row = node_row(node);
                    row[3] = "DELETED".to_string();
                    table.borrow_mut().upsert(node.short_id(), row);
                    Ok(Probe::Ready(()))
                }
                Err(e) => Err(e),
            }
        })
        .await
    }
}

/// Progress row of a node
pub fn node_row(node: &LiveNode) -> Vec<String> {
    vec![
        node.short_id(),
        node.name.clone(),
        node.address.clone(),
        node.status.clone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Outcome;
    use crate::testing::{cluster_config, FakeCompute, RecordingSink};

    struct Decline;

    impl Confirm for Decline {
        fn confirm(&self, _prompt: &str) -> Result<bool> {
            Ok(false)
        }
    }

    fn web(replication: u32) -> Vec<NodeTypeSpec> {
        vec![NodeTypeSpec {
            name: "web".to_string(),
            replication,
            image_ref: "img".to_string(),
            flavor_ref: "small".to_string(),
            security_groups: vec!["http".to_string()],
            ..Default::default()
        }]
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_two_web_nodes() {
        let config = cluster_config("cluster");
        let compute = FakeCompute::new();
        compute.script("cluster-web-1", &["BUILD", "BUILD", "RUNNING"]);
        compute.script("cluster-web-2", &["BUILD", "RUNNING"]);
        let mut sink = RecordingSink::default();

        let manager = NodeManager::new(&config, &compute);
        let report = manager.create(&web(2), &mut sink).await.unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 0);
        assert!(report.is_success());

        let requests = compute.created();
        let names: Vec<_> = requests.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["cluster-web-1", "cluster-web-2"]);
        assert_eq!(requests[0].security_groups, vec!["cluster-http".to_string()]);
        assert_eq!(requests[0].tenant, "tenant");

        // Three samples for the first node, two for the second
        assert_eq!(compute.get_calls(), 5);
        let table = sink.finished.unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.rows().all(|r| r[3] == "RUNNING"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_timeout_is_reported() {
        let config = cluster_config("cluster");
        let compute = FakeCompute::new();
        compute.script("cluster-web-1", &["BUILD"]);
        compute.script("cluster-web-2", &["RUNNING"]);
        let mut sink = RecordingSink::default();

        let report = NodeManager::new(&config, &compute)
            .create(&web(2), &mut sink)
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.timed_out(), 1);
        assert!(report.error().map(|e| e.is_timeout()).unwrap_or(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_failure_is_not_polled() {
        let config = cluster_config("cluster");
        let compute = FakeCompute::new();
        compute.fail_create("cluster-web-1");
        compute.script("cluster-web-2", &["RUNNING"]);
        let mut sink = RecordingSink::default();

        let report = NodeManager::new(&config, &compute)
            .create(&web(2), &mut sink)
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 1);
        assert!(matches!(report.entries()[0].outcome, Outcome::Failed(_)));
        assert_eq!(compute.get_calls(), 1);
        assert!(matches!(report.error(), Some(CloudockError::Compute(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_declined_destroy_makes_no_calls() {
        let config = cluster_config("cluster");
        let compute = FakeCompute::new();
        compute.add_node("cluster-web-1", "10.0.0.5", "ACTIVE");
        let mut sink = RecordingSink::default();

        let result = NodeManager::new(&config, &compute)
            .destroy(&Decline, &mut sink)
            .await;

        assert!(matches!(result, Err(CloudockError::Aborted)));
        assert_eq!(compute.list_calls(), 0);
        assert!(compute.destroyed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_polls_until_absent() {
        let config = cluster_config("cluster");
        let compute = FakeCompute::new();
        compute.add_node("cluster-web-1", "10.0.0.5", "ACTIVE");
        compute.add_node("cluster-db-1", "10.0.0.6", "SHUTOFF");
        compute.add_node("other-web-1", "10.0.0.7", "ACTIVE");
        let mut sink = RecordingSink::default();

        let report = NodeManager::new(&config, &compute)
            .destroy(&AssumeYes, &mut sink)
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(compute.destroyed().len(), 2);
        assert_eq!(compute.live_names(), vec!["other-web-1".to_string()]);
        let table = sink.finished.unwrap();
        assert!(table.rows().all(|r| r[3] == "DELETED"));
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let config = cluster_config("cluster");
        let compute = FakeCompute::new();
        compute.add_node("cluster-web-1", "10.0.0.5", "ACTIVE");
        compute.add_node("cluster-db-1", "10.0.0.6", "BUILD");
        compute.add_node("other-web-1", "10.0.0.7", "ACTIVE");

        let manager = NodeManager::new(&config, &compute);
        let all = manager.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "cluster-db-1");

        let active = manager.list(Some("running")).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].role, "web");
    }
}
