//! Rule template expansion against the live roster

use super::provider::ConcreteRule;
use crate::config::RuleTemplate;
use crate::node::LiveNode;

/// Expanded rules of one group plus the warnings raised on the way
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Expansion {
    pub rules: Vec<ConcreteRule>,
    pub warnings: Vec<String>,
}

/// Expand the templates of a group into concrete rules
///
/// A static prefix copies through once. Role addressing yields one rule
/// per live node whose role is listed, with the node address as remote
/// endpoint; no matching node means no rule. Templates with neither are
/// skipped, and so are matching nodes that have no address yet.
pub fn expand_rules(group_id: &str, templates: &[RuleTemplate], roster: &[LiveNode]) -> Expansion {
    let mut expansion = Expansion::default();

    for (index, template) in templates.iter().enumerate() {
        if template.remote_ip_prefix.is_none() && template.remote_node_roles.is_empty() {
            expansion
                .warnings
                .push(format!("Rule {} has no remote endpoint, skipped", index));
            continue;
        }

        for node in roster
            .iter()
            .filter(|n| template.remote_node_roles.contains(&n.role))
        {
            if node.ipv4.is_empty() {
                expansion
                    .warnings
                    .push(format!("Node {} has no address yet, skipped", node.name));
                continue;
            }
            expansion
                .rules
                .push(concrete(group_id, template, node.ipv4.clone()));
        }

        if let Some(prefix) = &template.remote_ip_prefix {
            expansion
                .rules
                .push(concrete(group_id, template, prefix.clone()));
        }
    }

    expansion
}

fn concrete(group_id: &str, template: &RuleTemplate, remote: String) -> ConcreteRule {
    ConcreteRule {
        security_group_id: group_id.to_string(),
        direction: template.direction.clone(),
        ethertype: template.ethertype.clone(),
        protocol: template.protocol.clone(),
        port_range_min: template.port_range_min,
        port_range_max: template.port_range_max,
        remote_ip_prefix: remote,
    }
}
