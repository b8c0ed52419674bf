//! Map and instruction documents on disk
//!
//! Loads the map document, merges domain bundle files into it and reads
//! the raw instruction list.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::application::error_ext::{IoResultExt, JsonResultExt};
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{tag_bundle_layers, LayerSpec, MapDocument};
use crate::infrastructure::traits::FileSystem;

/// A domain bundle file, given as `ID=FILE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSource {
    pub id: String,
    pub path: PathBuf,
}

impl FromStr for BundleSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((id, path)) if !id.trim().is_empty() && !path.trim().is_empty() => Ok(Self {
                id: id.trim().to_string(),
                path: PathBuf::from(path.trim()),
            }),
            _ => Err(format!("expected BUNDLE_ID=FILE, got '{s}'")),
        }
    }
}

/// A bundle file holds either a bare layer list or a whole map document.
#[derive(Deserialize)]
#[serde(untagged)]
enum BundleLayers {
    List(Vec<LayerSpec>),
    Document(MapDocument),
}

pub struct DocumentService {
    fs: Arc<dyn FileSystem>,
}

impl DocumentService {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Load the map document; a missing file means the map is unavailable.
    pub fn load_map(&self, path: &Path) -> ApplicationResult<MapDocument> {
        if !self.fs.is_file(path) {
            return Err(ApplicationError::unavailable(
                "map layers",
                format!("no map document at {}", path.display()),
            ));
        }
        let text = self
            .fs
            .read_to_string(path)
            .with_path_context("read map document", path)?;
        let doc: MapDocument =
            serde_json::from_str(&text).with_path_context("parse map document", path)?;
        debug!("load_map: {} root layer(s) from {}", doc.layers.len(), path.display());
        Ok(doc)
    }

    /// Load a bundle's layers, tagged with the bundle id.
    pub fn load_bundle(&self, source: &BundleSource) -> ApplicationResult<Vec<LayerSpec>> {
        let text = self
            .fs
            .read_to_string(&source.path)
            .with_path_context("read bundle", &source.path)?;
        let parsed: BundleLayers =
            serde_json::from_str(&text).with_path_context("parse bundle", &source.path)?;
        let mut layers = match parsed {
            BundleLayers::List(layers) => layers,
            BundleLayers::Document(doc) => doc.layers,
        };
        tag_bundle_layers(&mut layers, &source.id);
        Ok(layers)
    }

    /// Map document with every bundle's layers appended at the root.
    #[instrument(level = "debug", skip(self))]
    pub fn compose_map(
        &self,
        map: &Path,
        bundles: &[BundleSource],
    ) -> ApplicationResult<MapDocument> {
        let mut doc = self.load_map(map)?;
        for bundle in bundles {
            let layers = self.load_bundle(bundle)?;
            debug!("bundle '{}': {} layer(s)", bundle.id, layers.len());
            doc.layers.extend(layers);
        }
        Ok(doc)
    }

    /// Raw instruction document; shape problems are left to validation.
    pub fn load_instructions(&self, path: &Path) -> ApplicationResult<Value> {
        let text = self
            .fs
            .read_to_string(path)
            .with_path_context("read instructions", path)?;
        serde_json::from_str(&text).with_path_context("parse instructions", path)
    }

    pub fn save_map(&self, path: &Path, doc: &MapDocument) -> ApplicationResult<()> {
        let text = serde_json::to_string_pretty(doc).map_err(|e| ApplicationError::OperationFailed {
            context: "serialize map document".into(),
            source: Box::new(e),
        })?;
        self.fs
            .ensure_parent(path)
            .with_path_context("create directory for", path)?;
        self.fs
            .write(path, &format!("{text}\n"))
            .with_path_context("write map document", path)
    }
}
