use crate::backend::NodeBackend;
use crate::error::ReportError;
use crate::model::Node;
use log::debug;

/// The backend plus the most recent snapshot fetched from it.
///
/// A refresh replaces the snapshot wholesale; channels are never patched in
/// place.
pub struct NodeSession<'a> {
    backend: &'a dyn NodeBackend,
    node: Node,
}

impl<'a> NodeSession<'a> {
    /// Fetch the initial snapshot.
    pub async fn open(backend: &'a dyn NodeBackend) -> Result<Self, ReportError> {
        let node = collect(backend).await?;
        Ok(Self { backend, node })
    }

    pub async fn refresh(&mut self) -> Result<(), ReportError> {
        self.node = collect(self.backend).await?;
        Ok(())
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn backend(&self) -> &'a dyn NodeBackend {
        self.backend
    }

    pub fn has_channels(&self) -> bool {
        !self.node.channels.is_empty()
    }
}

async fn collect(backend: &dyn NodeBackend) -> Result<Node, ReportError> {
    let node = backend.fetch().await.map_err(ReportError::Backend)?;
    debug!(
        "Collected state: {} channels ({} private), {}sat capacity",
        node.channels.len(),
        node.channels.iter().filter(|c| c.private).count(),
        node.channels.iter().map(|c| c.capacity).sum::<u64>(),
    );
    Ok(node)
}
