//! Tests for SortingService runs against a host view

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use layersort::application::services::{BundleSource, DocumentService, SortingService};
use layersort::application::{ApplicationError, ApplicationResult};
use layersort::config::{Settings, DEFAULT_FAILURE_MESSAGE, DEFAULT_SUCCESS_MESSAGE};
use layersort::domain::{DomainError, LayerArena, MapDocument, ValidationError};
use layersort::infrastructure::traits::{Notifier, RealFileSystem, ViewResolver};
use layersort::infrastructure::view::FileMapView;
use layersort::util::testing;

// ============================================================
// Test doubles
// ============================================================

#[derive(Debug, Clone, PartialEq)]
enum Note {
    Info(String),
    Warn(String),
    Error(String),
}

#[derive(Default)]
struct RecordingNotifier {
    notes: Mutex<Vec<Note>>,
}

impl RecordingNotifier {
    fn notes(&self) -> Vec<Note> {
        self.notes.lock().expect("notes lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn info(&self, message: &str) {
        self.notes.lock().expect("notes lock").push(Note::Info(message.into()));
    }

    fn warn(&self, message: &str) {
        self.notes.lock().expect("notes lock").push(Note::Warn(message.into()));
    }

    fn error(&self, message: &str) {
        self.notes.lock().expect("notes lock").push(Note::Error(message.into()));
    }
}

/// View handing out a fresh tree built from a fixed document.
struct StaticView(MapDocument);

impl StaticView {
    fn new(doc: Value) -> Self {
        Self(serde_json::from_value(doc).expect("valid map document"))
    }
}

#[async_trait]
impl ViewResolver for StaticView {
    async fn resolve_view(&self) -> ApplicationResult<LayerArena> {
        tokio::task::yield_now().await;
        Ok(LayerArena::from_document(&self.0)?)
    }
}

struct UnavailableView;

#[async_trait]
impl ViewResolver for UnavailableView {
    async fn resolve_view(&self) -> ApplicationResult<LayerArena> {
        Err(ApplicationError::unavailable("view", "host not ready"))
    }
}

fn service() -> (SortingService, Arc<RecordingNotifier>) {
    testing::init_test_setup();
    let notifier = Arc::new(RecordingNotifier::default());
    let service = SortingService::new(Arc::new(Settings::default()), notifier.clone());
    (service, notifier)
}

fn scenario_a_view() -> StaticView {
    StaticView::new(json!({
        "layers": [
            {"id": "layer1"},
            {"id": "groupB", "layers": [{"id": "layer3"}]},
            {"id": "groupA", "layers": [{"id": "layer2"}]}
        ]
    }))
}

fn scenario_a_instructions() -> Value {
    json!([
        {"id": "groupA", "order": 3},
        {"id": "groupB", "order": 1},
        {"id": "layer1", "newParentId": "groupA", "order": 2},
        {"id": "layer2", "newParentId": "groupA", "order": 1},
        {"id": "layer3", "newParentId": "groupB", "order": 1}
    ])
}

// ============================================================
// Runs
// ============================================================

#[tokio::test]
async fn given_valid_instructions_when_running_then_restructured_and_success_notified() {
    let (service, notifier) = service();

    let outcome = service
        .run(&scenario_a_view(), &scenario_a_instructions())
        .await
        .expect("run");

    assert_eq!(outcome.tree.root_ids(), vec!["groupA", "groupB"]);
    assert_eq!(
        outcome.tree.child_ids("groupA"),
        Some(vec!["layer1".into(), "layer2".into()])
    );
    assert_eq!(notifier.notes(), vec![Note::Info(DEFAULT_SUCCESS_MESSAGE.into())]);
}

#[tokio::test]
async fn given_cyclic_instructions_when_running_then_warned_and_nothing_applied() {
    let (service, notifier) = service();
    let instructions = json!([
        {"id": "a", "newParentId": "c"},
        {"id": "b", "newParentId": "a"},
        {"id": "c", "newParentId": "b"}
    ]);

    let err = service
        .run(&scenario_a_view(), &instructions)
        .await
        .unwrap_err();

    match err {
        ApplicationError::ValidationFailed { errors } => {
            assert!(errors
                .iter()
                .any(|e| matches!(e, ValidationError::Cycle { .. })));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(notifier.notes(), vec![Note::Warn(DEFAULT_FAILURE_MESSAGE.into())]);
}

#[tokio::test]
async fn given_empty_instructions_when_running_then_single_empty_error() {
    let (service, notifier) = service();

    let err = service
        .run(&scenario_a_view(), &json!([]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::ValidationFailed { ref errors } if errors == &vec![ValidationError::Empty]
    ));
    assert_eq!(notifier.notes(), vec![Note::Warn(DEFAULT_FAILURE_MESSAGE.into())]);
}

#[tokio::test]
async fn given_unavailable_view_when_running_then_error_notified() {
    let (service, notifier) = service();

    let err = service
        .run(&UnavailableView, &scenario_a_instructions())
        .await
        .unwrap_err();

    assert!(matches!(err, ApplicationError::ResourceUnavailable { .. }));
    assert_eq!(notifier.notes(), vec![Note::Error(DEFAULT_FAILURE_MESSAGE.into())]);
}

#[tokio::test]
async fn given_target_inside_moved_group_when_running_then_engine_failure_notified() {
    let (service, notifier) = service();
    let view = StaticView::new(json!({
        "layers": [{"id": "outer", "layers": [{"id": "inner", "layers": []}]}]
    }));
    let instructions = json!([{"id": "outer", "newParentId": "inner"}]);

    let err = service.run(&view, &instructions).await.unwrap_err();

    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::WouldNest { .. })
    ));
    assert_eq!(notifier.notes(), vec![Note::Error(DEFAULT_FAILURE_MESSAGE.into())]);
}

#[tokio::test]
async fn given_custom_messages_when_running_then_passed_through_verbatim() {
    testing::init_test_setup();
    let mut settings = Settings::default();
    settings.messages.success = "Sortierung angewendet".into();
    let notifier = Arc::new(RecordingNotifier::default());
    let service = SortingService::new(Arc::new(settings), notifier.clone());

    service
        .run(&scenario_a_view(), &scenario_a_instructions())
        .await
        .expect("run");

    assert_eq!(notifier.notes(), vec![Note::Info("Sortierung angewendet".into())]);
}

// ============================================================
// File-backed view
// ============================================================

fn write_json(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_string_pretty(value).expect("json")).expect("write");
}

fn documents() -> DocumentService {
    DocumentService::new(Arc::new(RealFileSystem))
}

#[tokio::test]
async fn given_map_and_bundle_files_when_resolving_then_bundle_layers_tagged() {
    testing::init_test_setup();
    let temp = TempDir::new().expect("temp dir");
    let map = temp.path().join("map.json");
    let bundle = temp.path().join("schools.json");
    write_json(&map, &json!({"layers": [{"id": "topics", "layers": []}]}));
    write_json(
        &bundle,
        &json!([{"id": "schools", "layers": [{"id": "primary"}, {"id": "secondary", "layers": [{"id": "deep"}]}]}]),
    );
    let view = FileMapView::new(
        documents(),
        map,
        vec![BundleSource {
            id: "domain-schools".into(),
            path: bundle,
        }],
    )
    .with_timeout(Duration::from_secs(5));

    let tree = view.resolve_view().await.expect("resolve");

    assert_eq!(tree.root_ids(), vec!["topics", "schools"]);
    let bundle_of = |id: &str| {
        tree.find(id)
            .and_then(|idx| tree.get_node(idx))
            .and_then(|node| node.data.bundle_id.clone())
    };
    assert_eq!(bundle_of("schools").as_deref(), Some("domain-schools"));
    assert_eq!(bundle_of("secondary").as_deref(), Some("domain-schools"));
    assert_eq!(bundle_of("deep"), None);
    assert_eq!(bundle_of("topics"), None);
}

#[tokio::test]
async fn given_missing_map_file_when_resolving_then_resource_unavailable() {
    let temp = TempDir::new().expect("temp dir");
    let view = FileMapView::new(documents(), temp.path().join("absent.json"), Vec::new());

    let err = view.resolve_view().await.unwrap_err();

    assert!(matches!(err, ApplicationError::ResourceUnavailable { .. }));
}

#[tokio::test]
async fn given_file_view_when_running_then_result_saved_and_reloaded() {
    let (service, _) = service();
    let temp = TempDir::new().expect("temp dir");
    let map = temp.path().join("map.json");
    write_json(
        &map,
        &json!({"layers": [{"id": "childlayer"}, {"id": "other"}]}),
    );
    let view = FileMapView::new(documents(), map.clone(), Vec::new());
    let instructions = json!([{"id": "childlayer", "newParentId": "missingparent", "order": 1}]);

    // Strict profile rejects the unknown parent
    assert!(service.run(&view, &instructions).await.is_err());

    let mut settings = Settings::default();
    settings.validation_profile = layersort::domain::ProfileKind::Permissive;
    let permissive = SortingService::new(Arc::new(settings), Arc::new(RecordingNotifier::default()));
    let outcome = permissive.run(&view, &instructions).await.expect("run");
    let out = temp.path().join("out").join("sorted.json");
    documents()
        .save_map(&out, &outcome.tree.to_document())
        .expect("save");

    let saved = documents().load_map(&out).expect("reload");
    assert_eq!(saved.layers.len(), 1);
    assert_eq!(saved.layers[0].id, "missingparent");
    assert_eq!(saved.layers[0].title.as_deref(), Some("missingparent"));
    let children = saved.layers[0].layers.as_ref().expect("group layer");
    assert_eq!(children[0].id, "childlayer");
}
