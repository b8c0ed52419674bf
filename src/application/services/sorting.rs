//! Layer sorting service
//!
//! One run: resolve the view, validate the instructions against the live
//! tree, filter domain bundle layers and restructure.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::application::{ApplicationError, ApplicationResult};
use crate::config::Settings;
use crate::domain::{
    ConfigValidator, DomainFilter, LayerArena, RestructureReport, RestructuringEngine,
    ValidationResult,
};
use crate::infrastructure::traits::{Notifier, ViewResolver};

/// When the domain bundle filter runs relative to restructuring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterTiming {
    /// Prune the live tree first, then restructure what is left
    Before,
    /// Restructure first; the engine prunes what it did not place
    #[default]
    After,
}

impl fmt::Display for FilterTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterTiming::Before => write!(f, "before"),
            FilterTiming::After => write!(f, "after"),
        }
    }
}

/// Result of a successful run.
#[derive(Debug)]
pub struct SortingOutcome {
    pub tree: LayerArena,
    pub report: RestructureReport,
}

/// Service running layer sorting against a host view.
///
/// Holds no lock: callers serialize runs per tree.
pub struct SortingService {
    settings: Arc<Settings>,
    notifier: Arc<dyn Notifier>,
}

impl SortingService {
    pub fn new(settings: Arc<Settings>, notifier: Arc<dyn Notifier>) -> Self {
        Self { settings, notifier }
    }

    pub fn validator(&self) -> ConfigValidator {
        ConfigValidator::new(self.settings.validation_profile, self.settings.max_depth)
    }

    pub fn domain_filter(&self) -> DomainFilter {
        DomainFilter::new(
            self.settings.domain.show_remaining.clone(),
            self.settings.domain.classifier(),
        )
    }

    /// Validate an instruction document against the tree's catalogue.
    pub fn validate(&self, instructions: &Value, tree: &LayerArena) -> ValidationResult {
        self.validator().validate(instructions, &tree.catalogue())
    }

    /// Full run with user notifications.
    #[instrument(level = "debug", skip_all)]
    pub async fn run(
        &self,
        view: &dyn ViewResolver,
        instructions: &Value,
    ) -> ApplicationResult<SortingOutcome> {
        let mut tree = match view.resolve_view().await {
            Ok(tree) => tree,
            Err(e) => {
                error!("resolve view: {e}");
                self.notifier.error(&self.settings.messages.failure);
                return Err(e);
            }
        };

        let validation = self.validate(instructions, &tree);
        if !validation.valid {
            for problem in &validation.errors {
                error!("{problem}");
            }
            self.notifier.warn(&self.settings.messages.failure);
            return Err(ApplicationError::ValidationFailed {
                errors: validation.errors,
            });
        }

        match self.sort_tree(&mut tree, &validation) {
            Ok(report) => {
                info!(
                    "layer sorting applied: {} placed, {} created, {} pruned",
                    report.placed.len(),
                    report.created.len(),
                    report.pruned.len()
                );
                self.notifier.info(&self.settings.messages.success);
                Ok(SortingOutcome { tree, report })
            }
            Err(e) => {
                error!("layer sorting failed: {e}");
                self.notifier.error(&self.settings.messages.failure);
                Err(e)
            }
        }
    }

    /// Filter and restructure a tree with already validated instructions.
    pub fn sort_tree(
        &self,
        tree: &mut LayerArena,
        validation: &ValidationResult,
    ) -> ApplicationResult<RestructureReport> {
        let engine = RestructuringEngine::new();
        let filter = self.domain_filter();
        if !filter.is_active() {
            return Ok(engine.restructure(&validation.instructions, tree, None)?);
        }

        let explicit = validation.explicit_ids();
        let decision = filter.decide_prune(tree, &explicit);
        debug!(
            "filter {}: {} bundle layer(s) to prune, {} kept at root",
            self.settings.filter_timing,
            decision.len(),
            decision.kept().len()
        );

        let report = match self.settings.filter_timing {
            FilterTiming::Before => {
                let pruned = filter.apply(tree, &decision)?;
                let kept = decision.kept_only();
                let mut report =
                    engine.restructure(&validation.instructions, tree, Some(&kept))?;
                report.pruned = pruned;
                report
            }
            FilterTiming::After => {
                engine.restructure(&validation.instructions, tree, Some(&decision))?
            }
        };
        Ok(report)
    }
}
