//! The logical membership API.
//!
//! [`ClusterApi`] is the facade the transport layer (REST, RPC, or the
//! in-repo CLI) drives. Membership edits are synchronous blocking critical
//! sections; embedding servers should run them on a blocking pool. Bootstrap
//! and join return a [`TaskHandle`] immediately and complete in the
//! background.

use std::{collections::BTreeMap, sync::Arc};

use clusterd_types::{ClusterError, NodeEntry, Result, TotemConfig};

use crate::{
    context::ClusterContext,
    gateway::{JoinGateway, JoinInfo, build_join_info},
    orchestrator::{self, BootstrapRequest, JoinRequest},
    qdevice::QdeviceMonitor,
    registry::{self, AddNodeOutcome, AddNodeRequest},
    tasks::{self, TaskHandle},
};

/// Facade over the membership operations.
pub struct ClusterApi {
    ctx: ClusterContext,
}

impl ClusterApi {
    /// Creates the API over a context.
    pub fn new(ctx: ClusterContext) -> Self {
        Self { ctx }
    }

    /// The underlying context.
    pub fn context(&self) -> &ClusterContext {
        &self.ctx
    }

    /// `GET /` - the sub-resources of the membership API.
    pub fn index(&self) -> Vec<&'static str> {
        vec!["join", "nodes", "qdevice", "totem"]
    }

    /// `POST /` - bootstraps a new cluster in the background.
    pub fn create_cluster(&self, req: BootstrapRequest) -> TaskHandle {
        let ctx = self.ctx.clone();
        tasks::spawn("create-cluster", move |log| orchestrator::bootstrap(&ctx, &req, log))
    }

    /// `GET /nodes` - the current members, name-ordered.
    pub fn nodes(&self) -> Result<Vec<NodeEntry>> {
        registry::list_nodes(&self.ctx)
    }

    /// `POST /nodes/{node}` - adds a member.
    pub fn add_node(&self, name: &str, req: &AddNodeRequest) -> Result<AddNodeOutcome> {
        registry::add_node(&self.ctx, name, req)
    }

    /// `DELETE /nodes/{node}` - removes a member by name or link address.
    pub fn remove_node(&self, identifier: &str) -> Result<()> {
        registry::remove_node(&self.ctx, identifier)
    }

    /// `GET /join` - information a candidate needs to join this cluster.
    pub fn join_info(&self, node: Option<&str>) -> Result<JoinInfo> {
        build_join_info(&self.ctx, node)
    }

    /// `POST /join` - joins an existing cluster in the background.
    pub fn join(&self, gateway: Arc<dyn JoinGateway>, req: JoinRequest) -> TaskHandle {
        let ctx = self.ctx.clone();
        tasks::spawn("join-cluster", move |log| {
            orchestrator::join_existing(&ctx, gateway.as_ref(), &req, log)
        })
    }

    /// `GET /totem` - the raw totem settings.
    pub fn totem(&self) -> Result<TotemConfig> {
        let doc = self.ctx.store.read().map_err(ClusterError::from_store)?;
        Ok(doc.totem)
    }

    /// `GET /qdevice` - quorum-witness status snapshot.
    pub async fn qdevice_status(&self) -> Result<BTreeMap<String, String>> {
        QdeviceMonitor::new(&self.ctx.qdevice_socket).status().await
    }
}
