//! File-backed host view
//!
//! Stands in for a map host: the live tree is read from a map document and
//! the configured domain bundle files.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::application::services::{BundleSource, DocumentService};
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::LayerArena;
use crate::infrastructure::traits::ViewResolver;

pub struct FileMapView {
    documents: DocumentService,
    map_file: PathBuf,
    bundles: Vec<BundleSource>,
    timeout: Option<Duration>,
}

impl FileMapView {
    pub fn new(documents: DocumentService, map_file: PathBuf, bundles: Vec<BundleSource>) -> Self {
        Self {
            documents,
            map_file,
            bundles,
            timeout: None,
        }
    }

    /// Give up resolving after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn load(&self) -> ApplicationResult<LayerArena> {
        let doc = self.documents.compose_map(&self.map_file, &self.bundles)?;
        LayerArena::from_document(&doc).map_err(|e| {
            ApplicationError::unavailable(
                "layer tree",
                format!("{}: {e}", self.map_file.display()),
            )
        })
    }
}

#[async_trait]
impl ViewResolver for FileMapView {
    async fn resolve_view(&self) -> ApplicationResult<LayerArena> {
        debug!("resolve_view: {}", self.map_file.display());
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.load())
                .await
                .map_err(|_| ApplicationError::unavailable("view", format!("not resolved within {limit:?}")))?,
            None => self.load().await,
        }
    }
}
