//! In-memory providers, engines and sinks for unit tests

use crate::config::{ClusterConfig, ProviderConfig};
use crate::docker::{
    ContainerCreateOptions, ContainerEngine, ContainerSummary, EngineConnector, ImageSummary,
    PullStream,
};
use crate::error::{CloudockError, Result};
use crate::node::{ComputeProvider, InstanceFilter, InstanceRequest, LiveNode, RemoteShell};
use crate::progress::{ProgressSink, ProgressTable};
use crate::secgroup::{ConcreteRule, NetworkProvider, SecurityGroup};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Minimal valid configuration
pub fn cluster_config(cluster: &str) -> ClusterConfig {
    ClusterConfig {
        cluster: cluster.to_string(),
        provider: ProviderConfig {
            auth_url: "http://keystone.test/v3".to_string(),
            username: "user".to_string(),
            password: Some("secret".to_string()),
            tenant_name: "tenant".to_string(),
            ssh_username: Some("ubuntu".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Counts draws and keeps the final table
#[derive(Default)]
pub struct RecordingSink {
    pub draws: usize,
    pub finished: Option<ProgressTable>,
}

impl ProgressSink for RecordingSink {
    fn draw(&mut self, _table: &ProgressTable) -> Result<()> {
        self.draws += 1;
        Ok(())
    }

    fn finish(&mut self, table: &ProgressTable) -> Result<()> {
        self.finished = Some(table.clone());
        Ok(())
    }
}

struct FakeInstance {
    node: LiveNode,
    /// Statuses reported by the next samples; the last one sticks
    upcoming: VecDeque<String>,
    deleting: bool,
    reported_deleting: bool,
}

#[derive(Default)]
struct ComputeState {
    next: u32,
    instances: Vec<FakeInstance>,
    scripts: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    created: Vec<InstanceRequest>,
    destroyed: Vec<String>,
    get_calls: usize,
    list_calls: usize,
}

impl ComputeState {
    fn spawn(&mut self, name: &str, ipv4: &str, statuses: Vec<String>) -> String {
        self.next += 1;
        let id = format!("{:05}-instance", self.next);
        let ipv4 = if ipv4.is_empty() {
            format!("10.0.0.{}", self.next)
        } else {
            ipv4.to_string()
        };
        let first = statuses.first().cloned().unwrap_or_else(|| "BUILD".to_string());
        self.instances.push(FakeInstance {
            node: LiveNode::new(&id, name, "public", &ipv4, &first),
            upcoming: statuses.into_iter().collect(),
            deleting: false,
            reported_deleting: false,
        });
        id
    }
}

/// Compute provider whose instances follow scripted status sequences
#[derive(Default)]
pub struct FakeCompute {
    state: Mutex<ComputeState>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses the instance named `name` reports, one per sample
    pub fn script(&self, name: &str, statuses: &[&str]) {
        self.state.lock().unwrap().scripts.insert(
            name.to_string(),
            statuses.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Reject the creation of `name`
    pub fn fail_create(&self, name: &str) {
        self.state.lock().unwrap().failing.insert(name.to_string());
    }

    /// Add an existing instance, returning its id
    pub fn add_node(&self, name: &str, ipv4: &str, status: &str) -> String {
        self.state
            .lock()
            .unwrap()
            .spawn(name, ipv4, vec![status.to_string()])
    }

    pub fn remove_node(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .instances
            .retain(|i| i.node.name != name);
    }

    pub fn live_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .instances
            .iter()
            .map(|i| i.node.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn created(&self) -> Vec<InstanceRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.state.lock().unwrap().destroyed.clone()
    }

    pub fn get_calls(&self) -> usize {
        self.state.lock().unwrap().get_calls
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

#[async_trait]
impl ComputeProvider for FakeCompute {
    async fn create_instance(&self, request: &InstanceRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(&request.name) {
            return Err(CloudockError::Compute("Quota exceeded".to_string()));
        }
        state.created.push(request.clone());
        let statuses = state.scripts.get(&request.name).cloned().unwrap_or_default();
        Ok(state.spawn(&request.name, "", statuses))
    }

    async fn get_instance(&self, id: &str) -> Result<LiveNode> {
        let mut state = self.state.lock().unwrap();
        state.get_calls += 1;
        let position = state
            .instances
            .iter()
            .position(|i| i.node.id == id)
            .ok_or_else(|| CloudockError::InstanceNotFound(id.to_string()))?;

        let instance = &mut state.instances[position];
        if instance.deleting {
            if instance.reported_deleting {
                state.instances.remove(position);
                return Err(CloudockError::InstanceNotFound(id.to_string()));
            }
            instance.reported_deleting = true;
            instance.node.status = "DELETING".to_string();
            return Ok(instance.node.clone());
        }

        let status = if instance.upcoming.len() > 1 {
            instance.upcoming.pop_front()
        } else {
            instance.upcoming.front().cloned()
        };
        if let Some(status) = status {
            instance.node.status = status.to_uppercase();
        }
        Ok(instance.node.clone())
    }

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<LiveNode>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        Ok(state
            .instances
            .iter()
            .map(|i| i.node.clone())
            .filter(|n| filter.accepts(n))
            .collect())
    }

    async fn destroy_instance(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.destroyed.push(id.to_string());
        match state.instances.iter_mut().find(|i| i.node.id == id) {
            Some(instance) => {
                instance.deleting = true;
                Ok(())
            }
            None => Err(CloudockError::InstanceNotFound(id.to_string())),
        }
    }
}

/// Remote shell recording every target, optionally failing on one host
#[derive(Default)]
pub struct FakeShell {
    targets: Mutex<Vec<String>>,
    failing_host: Option<String>,
}

impl FakeShell {
    pub fn failing_on(host: &str) -> Self {
        Self {
            failing_host: Some(host.to_string()),
            ..Default::default()
        }
    }

    /// `user@host` of every call, in call order
    pub fn hosts(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn run(&self, user: &str, host: &str, _command: &str) -> Result<String> {
        self.targets.lock().unwrap().push(format!("{}@{}", user, host));
        if self.failing_host.as_deref() == Some(host) {
            return Err(CloudockError::Remote(format!("{}: connection refused", host)));
        }
        Ok(String::new())
    }
}

#[derive(Default)]
struct NetworkState {
    next: u32,
    groups: Vec<SecurityGroup>,
    rules: Vec<ConcreteRule>,
    failing_remotes: HashSet<String>,
    failing_destroys: HashSet<String>,
}

/// Security group provider keeping groups and rules in memory
#[derive(Default)]
pub struct FakeNetwork {
    state: Mutex<NetworkState>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups sorted by name
    pub fn groups(&self) -> Vec<SecurityGroup> {
        let mut groups = self.state.lock().unwrap().groups.clone();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    /// Rules applied to the group named `name`
    pub fn rules_of(&self, name: &str) -> Vec<ConcreteRule> {
        let state = self.state.lock().unwrap();
        let Some(group) = state.groups.iter().find(|g| g.name == name) else {
            return Vec::new();
        };
        state
            .rules
            .iter()
            .filter(|r| r.security_group_id == group.id)
            .cloned()
            .collect()
    }

    /// Reject rules whose remote endpoint is `remote`
    pub fn fail_rule_for(&self, remote: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_remotes
            .insert(remote.to_string());
    }

    /// Reject the deletion of the group named `name`
    pub fn fail_destroy_of(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_destroys
            .insert(name.to_string());
    }
}

#[async_trait]
impl NetworkProvider for FakeNetwork {
    async fn create_group(&self, name: &str, description: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.next += 1;
        let id = format!("sg-{}", state.next);
        state.groups.push(SecurityGroup {
            id: id.clone(),
            name: name.to_string(),
            description: description.to_string(),
        });
        Ok(id)
    }

    async fn destroy_group(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .iter()
            .find(|g| g.id == id)
            .cloned()
            .ok_or_else(|| CloudockError::Network(format!("No security group {}", id)))?;
        if state.failing_destroys.contains(&group.name) {
            return Err(CloudockError::Network(format!("{} is in use", group.name)));
        }
        state.groups.retain(|g| g.id != id);
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<SecurityGroup>> {
        Ok(self.state.lock().unwrap().groups.clone())
    }

    async fn create_rule(&self, rule: &ConcreteRule) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_remotes.contains(&rule.remote_ip_prefix) {
            return Err(CloudockError::Network(format!(
                "Rule from {} rejected",
                rule.remote_ip_prefix
            )));
        }
        state.rules.push(rule.clone());
        Ok(())
    }
}

#[derive(Default)]
struct EngineState {
    next: u32,
    calls: Vec<(String, String)>,
    containers: HashMap<String, Vec<ContainerSummary>>,
    images: HashMap<String, Vec<ImageSummary>>,
    created: Vec<(String, ContainerCreateOptions)>,
    pull_chunks: Vec<String>,
    failing_pulls: HashSet<String>,
    failing_creates: HashSet<String>,
    unreachable: HashSet<String>,
    missing: HashSet<String>,
    start_status: Option<u16>,
}

/// Container engines of every node, sharing one in-memory state
#[derive(Clone, Default)]
pub struct FakeEngines {
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, host: &str, id: &str, image: &str) {
        self.state
            .lock()
            .unwrap()
            .containers
            .entry(host.to_string())
            .or_default()
            .push(ContainerSummary {
                id: id.to_string(),
                names: vec![format!("/{}", id)],
                image: image.to_string(),
                state: "running".to_string(),
                status: "Up 2 hours".to_string(),
            });
    }

    pub fn add_image(&self, host: &str, id: &str, tag: &str) {
        self.state
            .lock()
            .unwrap()
            .images
            .entry(host.to_string())
            .or_default()
            .push(ImageSummary {
                id: id.to_string(),
                repo_tags: Some(vec![tag.to_string()]),
                created: 1_700_000_000,
            });
    }

    /// Raw output of every successful pull
    pub fn set_pull_chunks(&self, chunks: &[&str]) {
        self.state.lock().unwrap().pull_chunks = chunks.iter().map(|c| c.to_string()).collect();
    }

    pub fn fail_pull_on(&self, host: &str) {
        self.state.lock().unwrap().failing_pulls.insert(host.to_string());
    }

    /// Refuse to connect to the engine of `host`
    pub fn refuse_on(&self, host: &str) {
        self.state.lock().unwrap().unreachable.insert(host.to_string());
    }

    pub fn fail_create_on(&self, host: &str) {
        self.state.lock().unwrap().failing_creates.insert(host.to_string());
    }

    /// Answer 404 for every operation on `id`
    pub fn mark_missing(&self, id: &str) {
        self.state.lock().unwrap().missing.insert(id.to_string());
    }

    /// Status every start answers with
    pub fn set_start_status(&self, status: u16) {
        self.state.lock().unwrap().start_status = Some(status);
    }

    /// `(host, call)` pairs in call order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls made on `host`
    pub fn calls_on(&self, host: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c)
            .collect()
    }

    pub fn created(&self) -> Vec<(String, ContainerCreateOptions)> {
        self.state.lock().unwrap().created.clone()
    }
}

impl EngineConnector for FakeEngines {
    fn connect(&self, node: &LiveNode) -> Result<Box<dyn ContainerEngine>> {
        if self.state.lock().unwrap().unreachable.contains(&node.ipv4) {
            return Err(CloudockError::Engine {
                status: None,
                message: format!("{}: connection refused", node.ipv4),
            });
        }
        Ok(Box::new(FakeEngine {
            host: node.ipv4.clone(),
            state: self.state.clone(),
        }))
    }
}

struct FakeEngine {
    host: String,
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngine {
    fn log(&self, call: String) -> std::sync::MutexGuard<'_, EngineState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((self.host.clone(), call));
        state
    }

    fn check_missing(state: &EngineState, id: &str) -> Result<()> {
        if state.missing.contains(id) {
            return Err(CloudockError::engine(404, format!("No such object: {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn pull_image(&self, reference: &str) -> Result<PullStream> {
        let state = self.log(format!("pull {}", reference));
        let chunks: Vec<Result<Vec<u8>>> = if state.failing_pulls.contains(&self.host) {
            vec![Ok(b"{\"error\":\"manifest unknown\"}\n".to_vec())]
        } else {
            state
                .pull_chunks
                .iter()
                .map(|c| Ok(c.as_bytes().to_vec()))
                .collect()
        };
        Ok(stream::iter(chunks).boxed())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let state = self.log("images".to_string());
        Ok(state.images.get(&self.host).cloned().unwrap_or_default())
    }

    async fn remove_image(&self, id: &str) -> Result<()> {
        let mut state = self.log(format!("rmi {}", id));
        Self::check_missing(&state, id)?;
        if let Some(images) = state.images.get_mut(&self.host) {
            images.retain(|i| i.id != id);
        }
        Ok(())
    }

    async fn list_containers(&self, _all: bool) -> Result<Vec<ContainerSummary>> {
        let state = self.log("ps".to_string());
        Ok(state.containers.get(&self.host).cloned().unwrap_or_default())
    }

    async fn create_container(&self, options: &ContainerCreateOptions) -> Result<String> {
        let mut state = self.log("create".to_string());
        if state.failing_creates.contains(&self.host) {
            return Err(CloudockError::engine(500, "No space left on device"));
        }
        state.next += 1;
        let id = format!("c{}", state.next);
        state.created.push((self.host.clone(), options.clone()));
        let image = options.image.clone().unwrap_or_default();
        state
            .containers
            .entry(self.host.clone())
            .or_default()
            .push(ContainerSummary {
                id: id.clone(),
                image,
                state: "created".to_string(),
                ..Default::default()
            });
        Ok(id)
    }

    async fn start_container(&self, id: &str, _options: &Value) -> Result<()> {
        let state = self.log(format!("start {}", id));
        Self::check_missing(&state, id)?;
        match state.start_status {
            Some(status) => Err(CloudockError::engine(status, "start refused")),
            None => Ok(()),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let state = self.log(format!("stop {}", id));
        Self::check_missing(&state, id)
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let mut state = self.log(format!("rm {}", id));
        Self::check_missing(&state, id)?;
        if let Some(containers) = state.containers.get_mut(&self.host) {
            containers.retain(|c| c.id != id);
        }
        Ok(())
    }
}
