//! Container deployment pipeline
//!
//! Every operation works on the ACTIVE nodes of the cluster. Nodes are
//! processed in parallel; the images or containers of one node are
//! handled one after the other, and a failure never stops the next one.

use super::engine::{
    consume_pull, ContainerEngine, ContainerSummary, EngineConnector, ImageSummary,
};
use super::options::{container_options, ContainerCreateOptions};
use super::smoke;
use crate::config::{ClusterConfig, ImageSpec};
use crate::error::{CloudockError, Result};
use crate::node::{ComputeProvider, InstanceFilter, LiveNode};
use crate::progress::{run_with_redraw, ProgressSink, ProgressTable, Report, REDRAW_PERIOD};
use crate::topology::{fan_out, FanOutMode, Selector, Target};
use futures::future::try_join_all;
use std::cell::RefCell;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Progress table columns of `pull`
pub const PULL_COLUMNS: &[&str] = &["Node", "Image", "Progress"];

/// A container and the node it lives on
#[derive(Debug, Clone)]
pub struct NodeContainer {
    pub node: LiveNode,
    pub container: ContainerSummary,
}

/// An image and the node it is stored on
#[derive(Debug, Clone)]
pub struct NodeImage {
    pub node: LiveNode,
    pub image: ImageSummary,
}

/// Lifecycle call applied to selected containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOp {
    Start,
    Stop,
    Remove,
}

impl ContainerOp {
    pub fn name(&self) -> &'static str {
        match self {
            ContainerOp::Start => "docker start",
            ContainerOp::Stop => "docker stop",
            ContainerOp::Remove => "docker rm",
        }
    }

    async fn apply(&self, engine: &dyn ContainerEngine, id: &str) -> Result<()> {
        match self {
            ContainerOp::Start => engine.start_container(id, &serde_json::Value::Null).await,
            ContainerOp::Stop => engine.stop_container(id).await,
            ContainerOp::Remove => engine.remove_container(id).await,
        }
    }
}

/// Deploys and operates workload containers across the cluster
pub struct Deployer<'a> {
    config: &'a ClusterConfig,
    compute: &'a dyn ComputeProvider,
    connector: &'a dyn EngineConnector,
    redraw: Duration,
}

impl<'a> Deployer<'a> {
    pub fn new(
        config: &'a ClusterConfig,
        compute: &'a dyn ComputeProvider,
        connector: &'a dyn EngineConnector,
    ) -> Self {
        Self {
            config,
            compute,
            connector,
            redraw: REDRAW_PERIOD,
        }
    }

    /// ACTIVE nodes of the cluster, by name
    pub async fn active_nodes(&self) -> Result<Vec<LiveNode>> {
        let filter = InstanceFilter::cluster(&self.config.cluster).with_status(Some("ACTIVE"));
        let mut nodes = self.compute.list_instances(&filter).await?;
        nodes.retain(|n| filter.accepts(n));
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    fn reference(&self, image: &ImageSpec) -> String {
        image.reference(self.config.docker.registry.as_deref())
    }

    /// Catalog name of the workload of `node` whose reference is one of `references`
    fn workload_of(&self, node: &LiveNode, references: &[&str]) -> Option<&'a str> {
        self.config
            .images_for(&node.role)
            .into_iter()
            .find(|(_, image)| {
                let reference = self.reference(image);
                references.iter().any(|r| *r == reference)
            })
            .map(|(name, _)| name)
    }

    /// Engine of `node`; a connection failure is reported against `entities`
    fn engine_for(
        &self,
        node: &LiveNode,
        entities: &[String],
        report: &RefCell<Report>,
    ) -> Result<Box<dyn ContainerEngine>> {
        self.connector.connect(node).map_err(|e| {
            warn!("Cannot reach the engine of {}: {}", node.name, e);
            let mut report = report.borrow_mut();
            for entity in entities {
                report.fail(entity.as_str(), &e);
            }
            e
        })
    }

    /// Pull the workload images of every node
    pub async fn pull(&self, sink: &mut dyn ProgressSink) -> Result<Report> {
        let nodes = self.active_nodes().await?;
        info!("Started pulling images on {} nodes", nodes.len());

        let table = RefCell::new(ProgressTable::new(PULL_COLUMNS));
        let report = RefCell::new(Report::new("docker pull"));

        let work = fan_out(nodes.iter(), FanOutMode::Parallel, |node| {
            let table = &table;
            let report = &report;
            async move {
                let images = self.config.images_for(&node.role);
                if images.is_empty() {
                    return Ok(());
                }
                let entities: Vec<String> = images
                    .iter()
                    .map(|(name, _)| format!("{}: {}", node.name, name))
                    .collect();
                let engine = self.engine_for(node, &entities, report)?;

                let mut first = Ok(());
                for ((name, image), entity) in images.into_iter().zip(entities) {
                    let result = self.pull_one(engine.as_ref(), node, name, image, table).await;
                    if let Err(e) = &result {
                        warn!("Failed pulling {} on {}: {}", name, node.name, e);
                    }
                    report.borrow_mut().record(entity, &result);
                    if first.is_ok() {
                        first = result;
                    }
                }
                first
            }
        });
        let result = run_with_redraw(&table, sink, self.redraw, work).await;

        let mut report = report.into_inner();
        report.finish(result);
        Ok(report)
    }

    async fn pull_one(
        &self,
        engine: &dyn ContainerEngine,
        node: &LiveNode,
        name: &str,
        image: &ImageSpec,
        table: &RefCell<ProgressTable>,
    ) -> Result<()> {
        let reference = self.reference(image);
        info!("Started pulling image {} on node {}", reference, node.name);
        let row = |progress: String| vec![node.name.clone(), name.to_string(), progress];

        table.borrow_mut().upsert(&node.id, row("Waiting".to_string()));
        let stream = engine.pull_image(&reference).await?;
        consume_pull(stream, |event| {
            table.borrow_mut().upsert(&node.id, row(event.describe()));
        })
        .await?;

        table.borrow_mut().upsert(&node.id, row("Done".to_string()));
        info!("Done pulling image {} on node {}", reference, node.name);
        Ok(())
    }

    /// Create and start the selected workload containers
    ///
    /// Containers not using the host network get every other node, the
    /// `dockerhost` alias and the declared host aliases in their hosts file.
    pub async fn run(&self, selector: &Selector) -> Result<Report> {
        let nodes = self.active_nodes().await?;
        info!("Started creating containers ({})", selector.describe());
        let report = RefCell::new(Report::new("docker run"));

        let roster = &nodes;
        let result = fan_out(nodes.iter(), FanOutMode::Parallel, |node| {
            let report = &report;
            async move {
                let mut selected = Vec::new();
                for (name, image) in self.config.images_for(&node.role) {
                    let entity = format!("{}: {}", node.name, name);
                    let target = Target {
                        node_type: &node.role,
                        node_id: &node.id,
                        image_name: Some(name),
                        entity_id: None,
                        image_assigned: true,
                    };
                    if selector.matches(&target) {
                        selected.push((entity, name, image));
                    } else {
                        report.borrow_mut().skip(entity, "not selected");
                    }
                }
                if selected.is_empty() {
                    return Ok(());
                }
                let entities: Vec<String> = selected.iter().map(|(e, _, _)| e.clone()).collect();
                let engine = self.engine_for(node, &entities, report)?;

                let mut first = Ok(());
                for (entity, name, image) in selected {
                    let reference = self.reference(image);
                    let (options, warnings) = container_options(
                        &image.run.create,
                        &reference,
                        &image.run.cmd,
                        &image.run.host_aliases,
                        node,
                        roster,
                    );
                    for warning in warnings {
                        warn!("{}", warning);
                        report.borrow_mut().warn(warning);
                    }

                    let result = create_and_start(engine.as_ref(), &options, &image.run.start).await;
                    match &result {
                        Ok(id) => info!(
                            "Completed creating and running the container {} from image {} on node {}",
                            id, name, node.name
                        ),
                        Err(e) => warn!("Failed running {} on {}: {}", name, node.name, e),
                    }
                    let result = result.map(|_| ());
                    report.borrow_mut().record(entity, &result);
                    if first.is_ok() {
                        first = result;
                    }
                }
                first
            }
        })
        .await;

        let mut report = report.into_inner();
        report.finish(result);
        Ok(report)
    }

    /// Every container (running or not) of every active node
    pub async fn containers(&self) -> Result<Vec<NodeContainer>> {
        let nodes = self.active_nodes().await?;
        let listed = try_join_all(nodes.iter().map(|node| async move {
            let engine = self.connector.connect(node)?;
            let containers = engine.list_containers(true).await?;
            Ok::<_, CloudockError>(
                containers
                    .into_iter()
                    .map(|container| NodeContainer {
                        node: node.clone(),
                        container,
                    })
                    .collect::<Vec<_>>(),
            )
        }))
        .await?;
        Ok(listed.into_iter().flatten().collect())
    }

    /// Every image stored on every active node
    pub async fn images(&self) -> Result<Vec<NodeImage>> {
        let nodes = self.active_nodes().await?;
        let listed = try_join_all(nodes.iter().map(|node| async move {
            let engine = self.connector.connect(node)?;
            let images = engine.list_images().await?;
            Ok::<_, CloudockError>(
                images
                    .into_iter()
                    .map(|image| NodeImage {
                        node: node.clone(),
                        image,
                    })
                    .collect::<Vec<_>>(),
            )
        }))
        .await?;
        Ok(listed.into_iter().flatten().collect())
    }

    fn container_target<'t>(&'t self, entry: &'t NodeContainer) -> Target<'t> {
        let name = self.workload_of(&entry.node, &[entry.container.image.as_str()]);
        Target {
            node_type: &entry.node.role,
            node_id: &entry.node.id,
            image_name: name,
            entity_id: Some(&entry.container.id),
            image_assigned: name.is_some(),
        }
    }

    /// Selected containers
    pub async fn ps(&self, selector: &Selector) -> Result<Vec<NodeContainer>> {
        let mut containers = self.containers().await?;
        containers.retain(|c| selector.matches(&self.container_target(c)));
        Ok(containers)
    }

    /// Apply a lifecycle call to every selected container
    ///
    /// Engine answers meaning "already in that state" or "gone" count as
    /// success.
    pub async fn operate(&self, op: ContainerOp, selector: &Selector) -> Result<Report> {
        let containers = self.containers().await?;
        info!("Started {} ({})", op.name(), selector.describe());
        let mut report = Report::new(op.name());

        for entry in &containers {
            let entity = format!("{}: {}", entry.node.name, short(&entry.container.id));
            if !selector.matches(&self.container_target(entry)) {
                report.skip(entity, "not selected");
                continue;
            }

            let result = match self.connector.connect(&entry.node) {
                Ok(engine) => op.apply(engine.as_ref(), &entry.container.id).await,
                Err(e) => Err(e),
            };
            let result = match result {
                Err(e) if e.is_benign() => {
                    debug!("{} {}: {}", op.name(), entry.container.id, e);
                    Ok(())
                }
                other => other,
            };
            if let Err(e) = &result {
                warn!("{} failed on {}: {}", op.name(), entity, e);
            }
            report.absorb(entity, result);
        }
        Ok(report)
    }

    /// Remove every selected image
    pub async fn rmi(&self, selector: &Selector) -> Result<Report> {
        let images = self.images().await?;
        info!("Started removing images ({})", selector.describe());
        let mut report = Report::new("docker rmi");

        for entry in &images {
            let entity = format!("{}: {}", entry.node.name, entry.image.first_tag());
            let tags: Vec<&str> = entry.image.tags().collect();
            let name = self.workload_of(&entry.node, &tags);
            let target = Target {
                node_type: &entry.node.role,
                node_id: &entry.node.id,
                image_name: name,
                entity_id: Some(&entry.image.id),
                image_assigned: name.is_some(),
            };
            if !selector.matches(&target) {
                report.skip(entity, "not selected");
                continue;
            }

            let result = match self.connector.connect(&entry.node) {
                Ok(engine) => engine.remove_image(&entry.image.id).await,
                Err(e) => Err(e),
            };
            let result = match result {
                Err(e) if e.is_benign() => Ok(()),
                other => other,
            };
            if let Err(e) = &result {
                warn!("Failed removing {}: {}", entity, e);
            }
            report.absorb(entity, result);
        }
        Ok(report)
    }

    /// Run the smoke tests declared for each node type
    pub async fn test(&self, client: &reqwest::Client) -> Result<Report> {
        let nodes = self.active_nodes().await?;
        info!("Started testing containers");
        let mut report = Report::new("docker test");

        for node in &nodes {
            let Some(node_type) = self.config.node_type(&node.role) else {
                continue;
            };
            for case in &node_type.tests {
                let result = smoke::run_case(client, case, node).await;
                report.absorb(format!("{}: {}", node.name, case.name), result);
            }
        }
        Ok(report)
    }
}

async fn create_and_start(
    engine: &dyn ContainerEngine,
    options: &ContainerCreateOptions,
    start: &serde_json::Value,
) -> Result<String> {
    let id = engine.create_container(options).await?;
    match engine.start_container(&id, start).await {
        Err(e) if e.is_benign() => debug!("Container {} already started: {}", id, e),
        other => other?,
    }
    Ok(id)
}

fn short(id: &str) -> &str {
    let end = id.char_indices().nth(12).map(|(i, _)| i).unwrap_or(id.len());
    &id[..end]
}
