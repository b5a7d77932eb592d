//! Security group reconciliation
//!
//! Rules are only ever added: `update` does not diff against the rules a
//! group already holds, so running it twice on the same group duplicates
//! them. Start from freshly created groups when the roster changed.

use super::provider::{ConcreteRule, NetworkProvider, SecurityGroup};
use super::rules::expand_rules;
use crate::config::ClusterConfig;
use crate::error::Result;
use crate::node::{ComputeProvider, InstanceFilter};
use crate::progress::Report;
use crate::topology::{fan_out, group_name, group_plain_name, FanOutMode};
use std::cell::RefCell;
use tracing::{info, warn};

/// Longest description shown by `list`
pub const DESCRIPTION_WIDTH: usize = 40;

/// Security group reconciler
pub struct SecurityGroupReconciler<'a> {
    config: &'a ClusterConfig,
    network: &'a dyn NetworkProvider,
    compute: &'a dyn ComputeProvider,
}

impl<'a> SecurityGroupReconciler<'a> {
    pub fn new(
        config: &'a ClusterConfig,
        network: &'a dyn NetworkProvider,
        compute: &'a dyn ComputeProvider,
    ) -> Self {
        Self {
            config,
            network,
            compute,
        }
    }

    /// Create every declared group
    pub async fn create(&self) -> Result<Report> {
        let report = RefCell::new(Report::new("secgroup create"));

        let result = fan_out(
            self.config.security_groups.iter(),
            FanOutMode::Parallel,
            |(plain, spec)| {
                let report = &report;
                async move {
                    let name = group_name(&self.config.cluster, plain);
                    let result = self
                        .network
                        .create_group(&name, &spec.description)
                        .await
                        .map(|id| info!("Created security group {} ({})", name, id));
                    if let Err(e) = &result {
                        warn!("Security group {} not created: {}", name, e);
                    }
                    report.borrow_mut().record(&name, &result);
                    result
                }
            },
        )
        .await;

        let mut report = report.into_inner();
        report.finish(result);
        Ok(report)
    }

    /// Groups of this cluster, by name prefix
    pub async fn cluster_groups(&self) -> Result<Vec<SecurityGroup>> {
        let prefix = format!("{}-", self.config.cluster);
        let mut groups = self.network.list_groups().await?;
        groups.retain(|g| g.name.starts_with(&prefix));
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    /// Expand every group's templates against the live roster and apply them
    ///
    /// Listing failures are fatal. A failing rule is reported while the
    /// other rules of the group are still applied.
    pub async fn update(&self) -> Result<Report> {
        let roster = self
            .compute
            .list_instances(&InstanceFilter::cluster(&self.config.cluster))
            .await?;
        let groups = self.cluster_groups().await?;
        info!(
            "Updating {} security groups against {} nodes",
            groups.len(),
            roster.len()
        );

        let mut report = Report::new("secgroup update");
        for group in &groups {
            let Some(spec) = self.config.security_groups.get(group_plain_name(&group.name)) else {
                warn!("Security group {} is not declared, skipped", group.name);
                report.skip(&group.name, "not declared");
                continue;
            };

            let expansion = expand_rules(&group.id, &spec.rules, &roster);
            for warning in expansion.warnings {
                warn!("{}: {}", group.name, warning);
                report.warn(format!("{}: {}", group.name, warning));
            }

            let rules = RefCell::new(Report::new(&group.name));
            let result = fan_out(expansion.rules.iter(), FanOutMode::Parallel, |rule| {
                let rules = &rules;
                async move {
                    let result = self.network.create_rule(rule).await;
                    if let Err(e) = &result {
                        warn!("Rule {} not applied: {}", describe_rule(rule), e);
                    }
                    rules.borrow_mut().record(describe_rule(rule), &result);
                    result
                }
            })
            .await;

            let mut rules = rules.into_inner();
            rules.finish(result);
            report.merge(rules);
        }

        Ok(report)
    }

    /// Destroy every group of the cluster, stopping at the first failure
    pub async fn destroy(&self) -> Result<Report> {
        let groups = self.cluster_groups().await?;
        let report = RefCell::new(Report::new("secgroup destroy"));

        let result = fan_out(groups.iter(), FanOutMode::Serial, |group| {
            let report = &report;
            async move {
                let result = self.network.destroy_group(&group.id).await;
                match &result {
                    Ok(()) => info!("Destroyed security group {}", group.name),
                    Err(e) => warn!("Security group {} not destroyed: {}", group.name, e),
                }
                report.borrow_mut().record(&group.name, &result);
                result
            }
        })
        .await;

        let mut report = report.into_inner();
        for group in groups.iter().skip(report.entries().len()) {
            report.skip(&group.name, "aborted after an earlier failure");
        }
        report.finish(result);
        Ok(report)
    }

    /// Groups of this cluster with descriptions shortened for display
    pub async fn list(&self) -> Result<Vec<SecurityGroup>> {
        let mut groups = self.cluster_groups().await?;
        for group in &mut groups {
            group.description = truncate_description(&group.description);
        }
        Ok(groups)
    }
}

/// Shorten a description to `DESCRIPTION_WIDTH` characters plus an ellipsis
pub fn truncate_description(description: &str) -> String {
    if description.chars().count() > DESCRIPTION_WIDTH {
        let head: String = description.chars().take(DESCRIPTION_WIDTH).collect();
        format!("{}...", head)
    } else {
        description.to_string()
    }
}

fn describe_rule(rule: &ConcreteRule) -> String {
    let ports = match (rule.port_range_min, rule.port_range_max) {
        (Some(min), Some(max)) if min != max => format!("{}-{}", min, max),
        (Some(port), _) | (None, Some(port)) => port.to_string(),
        (None, None) => "any".to_string(),
    };
    format!(
        "{} {}/{} from {}",
        rule.direction,
        rule.protocol.as_deref().unwrap_or("any"),
        ports,
        rule.remote_ip_prefix
    )
}
