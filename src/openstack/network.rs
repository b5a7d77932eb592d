//! Neutron security groups as a network provider

use super::client::{error_message, Session};
use crate::error::{CloudockError, Result};
use crate::secgroup::{ConcreteRule, NetworkProvider, SecurityGroup};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Deserialize)]
struct GroupBody {
    security_group: SecurityGroup,
}

#[derive(Deserialize)]
struct GroupsBody {
    security_groups: Vec<SecurityGroup>,
}

/// Body of `POST /v2.0/security-group-rules`
pub fn rule_body(rule: &ConcreteRule) -> Result<Value> {
    Ok(json!({ "security_group_rule": serde_json::to_value(rule)? }))
}

/// Neutron client bound to the network endpoint of a session
pub struct NeutronNetwork {
    session: Session,
    endpoint: String,
}

impl NeutronNetwork {
    pub fn new(session: Session) -> Result<Self> {
        let endpoint = format!("{}/v2.0", session.endpoint("network")?);
        Ok(Self { session, endpoint })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CloudockError::Network(format!(
            "{} {}",
            status,
            error_message(&body)
        )))
    }
}

#[async_trait]
impl NetworkProvider for NeutronNetwork {
    async fn create_group(&self, name: &str, description: &str) -> Result<String> {
        let response = self
            .session
            .post(&format!("{}/security-groups", self.endpoint))
            .json(&json!({
                "security_group": { "name": name, "description": description }
            }))
            .send()
            .await?;
        let body: GroupBody = Self::check(response).await?.json().await?;
        debug!("Security group {} created as {}", name, body.security_group.id);
        Ok(body.security_group.id)
    }

    async fn destroy_group(&self, id: &str) -> Result<()> {
        let response = self
            .session
            .delete(&format!("{}/security-groups/{}", self.endpoint, id))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<SecurityGroup>> {
        let response = self
            .session
            .get(&format!("{}/security-groups", self.endpoint))
            .send()
            .await?;
        let body: GroupsBody = Self::check(response).await?.json().await?;
        Ok(body.security_groups)
    }

    async fn create_rule(&self, rule: &ConcreteRule) -> Result<()> {
        let response = self
            .session
            .post(&format!("{}/security-group-rules", self.endpoint))
            .json(&rule_body(rule)?)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_body_omits_open_ranges() {
        let rule = ConcreteRule {
            security_group_id: "sg-1".to_string(),
            direction: "ingress".to_string(),
            ethertype: "IPv4".to_string(),
            protocol: None,
            port_range_min: None,
            port_range_max: None,
            remote_ip_prefix: "10.0.0.5".to_string(),
        };

        let body = rule_body(&rule).unwrap();
        let inner = &body["security_group_rule"];
        assert_eq!(inner["security_group_id"], "sg-1");
        assert_eq!(inner["remote_ip_prefix"], "10.0.0.5");
        assert!(inner.get("protocol").is_none());
        assert!(inner.get("port_range_min").is_none());
    }

    #[test]
    fn test_group_listing_projection() {
        let body: GroupsBody = serde_json::from_value(json!({
            "security_groups": [
                {"id": "a1", "name": "default", "description": "Default security group", "security_group_rules": []},
                {"id": "b2", "name": "demo-http"}
            ]
        }))
        .unwrap();
        assert_eq!(body.security_groups.len(), 2);
        assert_eq!(body.security_groups[1].description, "");
    }
}
