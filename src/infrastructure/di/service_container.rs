//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::path::PathBuf;
use std::sync::Arc;

use crate::application::services::{BundleSource, DocumentService, SortingService};
use crate::config::Settings;
use crate::infrastructure::traits::{ConsoleNotifier, FileSystem, Notifier, RealFileSystem};
use crate::infrastructure::view::FileMapView;

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// User-facing notification sink
    pub notifier: Arc<dyn Notifier>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(settings, Arc::new(RealFileSystem), Arc::new(ConsoleNotifier))
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let settings = Arc::new(settings);

        Self {
            settings,
            fs,
            notifier,
        }
    }

    pub fn documents(&self) -> DocumentService {
        DocumentService::new(Arc::clone(&self.fs))
    }

    pub fn sorting(&self) -> SortingService {
        SortingService::new(Arc::clone(&self.settings), Arc::clone(&self.notifier))
    }

    pub fn map_view(&self, map_file: PathBuf, bundles: Vec<BundleSource>) -> FileMapView {
        FileMapView::new(self.documents(), map_file, bundles)
    }
}
