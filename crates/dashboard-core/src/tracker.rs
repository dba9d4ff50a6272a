//! Pipeline progress reconstructed from stream events.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;

use crate::event::StreamEvent;
use crate::log::LogEntry;
use crate::pipeline::{PipelineConfig, PipelineNode};

/// Display status of a single node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

/// Completed, failed and active nodes.
///
/// `completed` only grows while events are applied; [`NodeStatusSet::invalidate`]
/// is the single way to shrink it.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct NodeStatusSet {
    completed: BTreeSet<PipelineNode>,
    failed: BTreeSet<PipelineNode>,
    active: Option<PipelineNode>,
}

impl NodeStatusSet {
    pub fn completed(&self) -> &BTreeSet<PipelineNode> {
        &self.completed
    }

    pub fn failed(&self) -> &BTreeSet<PipelineNode> {
        &self.failed
    }

    pub fn active(&self) -> Option<PipelineNode> {
        self.active
    }

    pub fn is_completed(&self, node: PipelineNode) -> bool {
        self.completed.contains(&node)
    }

    /// Status to display for `node`. Failure and activity take precedence
    /// over completion.
    pub fn status_of(&self, node: PipelineNode) -> NodeStatus {
        if self.failed.contains(&node) {
            NodeStatus::Failed
        } else if self.active == Some(node) {
            NodeStatus::Active
        } else if self.completed.contains(&node) {
            NodeStatus::Completed
        } else {
            NodeStatus::Pending
        }
    }

    fn mark_completed(&mut self, node: PipelineNode) {
        self.completed.insert(node);
        self.failed.remove(&node);
    }

    fn mark_failed(&mut self, node: PipelineNode) {
        self.failed.insert(node);
    }

    /// Drops `nodes` from the completed set. Used by rerun-from-node only.
    pub(crate) fn invalidate(&mut self, nodes: &BTreeSet<PipelineNode>) {
        self.completed.retain(|node| !nodes.contains(node));
    }

    pub(crate) fn clear_active(&mut self) {
        self.active = None;
    }
}

/// A stage's artifact, tagged by the stage that produced it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeArtifact<'a> {
    DataCollector(&'a Value),
    VideoAnalyzer(&'a Value),
    ContentAnalyzer(&'a Value),
    TrendProcessor(&'a Value),
    OutfitDesigner(&'a Value),
    VideoGeneration(&'a Value),
}

impl<'a> NodeArtifact<'a> {
    fn new(node: PipelineNode, payload: &'a Value) -> Self {
        match node {
            PipelineNode::DataCollector => NodeArtifact::DataCollector(payload),
            PipelineNode::VideoAnalyzer => NodeArtifact::VideoAnalyzer(payload),
            PipelineNode::ContentAnalyzer => NodeArtifact::ContentAnalyzer(payload),
            PipelineNode::TrendProcessor => NodeArtifact::TrendProcessor(payload),
            PipelineNode::OutfitDesigner => NodeArtifact::OutfitDesigner(payload),
            PipelineNode::VideoGeneration => NodeArtifact::VideoGeneration(payload),
        }
    }

    pub fn node(&self) -> PipelineNode {
        match self {
            NodeArtifact::DataCollector(_) => PipelineNode::DataCollector,
            NodeArtifact::VideoAnalyzer(_) => PipelineNode::VideoAnalyzer,
            NodeArtifact::ContentAnalyzer(_) => PipelineNode::ContentAnalyzer,
            NodeArtifact::TrendProcessor(_) => PipelineNode::TrendProcessor,
            NodeArtifact::OutfitDesigner(_) => PipelineNode::OutfitDesigner,
            NodeArtifact::VideoGeneration(_) => PipelineNode::VideoGeneration,
        }
    }

    pub fn payload(&self) -> &'a Value {
        match *self {
            NodeArtifact::DataCollector(payload)
            | NodeArtifact::VideoAnalyzer(payload)
            | NodeArtifact::ContentAnalyzer(payload)
            | NodeArtifact::TrendProcessor(payload)
            | NodeArtifact::OutfitDesigner(payload)
            | NodeArtifact::VideoGeneration(payload) => payload,
        }
    }
}

/// Latest artifact per stage. Entries are replaced, never merged.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct ArtifactStore {
    entries: BTreeMap<PipelineNode, Value>,
}

impl ArtifactStore {
    pub fn get(&self, node: PipelineNode) -> Option<NodeArtifact<'_>> {
        self.entries
            .get(&node)
            .map(|payload| NodeArtifact::new(node, payload))
    }

    /// Artifacts in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = NodeArtifact<'_>> {
        self.entries
            .iter()
            .map(|(node, payload)| NodeArtifact::new(*node, payload))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn replace(&mut self, node: PipelineNode, payload: Value) {
        self.entries.insert(node, payload);
    }
}

/// Node statuses plus artifacts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineProgress {
    pub statuses: NodeStatusSet,
    pub artifacts: ArtifactStore,
}

/// Result of applying one event.
#[derive(Clone, Debug)]
pub struct TrackerOutcome {
    pub progress: PipelineProgress,
    /// Log entries the event produced.
    pub log: Vec<LogEntry>,
    /// Every stage is accounted for as completed.
    pub finished: bool,
    /// The event carried the terminal final-output marker.
    pub final_output: bool,
}

/// Applies events to progress. Holds only immutable configuration.
#[derive(Clone, Debug)]
pub struct StatusTracker {
    pipeline: Arc<PipelineConfig>,
}

impl StatusTracker {
    pub fn new(pipeline: Arc<PipelineConfig>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// Computes the progress after `event`. Never fails; fields and stage
    /// names it does not know are ignored.
    pub fn apply(&self, event: &StreamEvent, current: &PipelineProgress) -> TrackerOutcome {
        let mut progress = current.clone();
        let mut log = Vec::new();
        let mut finished = false;

        if let Some(statuses) = event.execution_status() {
            finished = self.apply_execution_status(statuses, &mut progress.statuses);
        }
        self.apply_artifacts(event, &mut progress);
        if let Some(errors) = event.errors() {
            self.apply_errors(errors, &mut progress.statuses, &mut log);
        }

        let final_output = event.final_output().is_some();
        if final_output {
            progress.statuses.clear_active();
            log.push(LogEntry::success("Pipeline completed"));
        }

        TrackerOutcome {
            progress,
            log,
            finished,
            final_output,
        }
    }

    /// Returns whether every stage is accounted for as completed.
    fn apply_execution_status<'a>(
        &self,
        statuses: impl Iterator<Item = (&'a str, &'a str)>,
        set: &mut NodeStatusSet,
    ) -> bool {
        let mut reported_completed = BTreeSet::new();
        let mut running = BTreeSet::new();
        let mut failed = BTreeSet::new();
        for (name, status) in statuses {
            let Some(node) = self.pipeline.resolve(name) else {
                continue;
            };
            match status {
                "completed" => {
                    reported_completed.insert(node);
                }
                "running" => {
                    running.insert(node);
                }
                "failed" => {
                    failed.insert(node);
                }
                _ => {}
            }
        }

        for node in &reported_completed {
            set.mark_completed(*node);
        }

        if let Some(node) = running.first() {
            set.active = Some(*node);
            return false;
        }
        if let Some(node) = failed.first() {
            for failed_node in &failed {
                set.mark_failed(*failed_node);
            }
            set.active = Some(*node);
            return false;
        }
        let next = PipelineNode::ALL
            .into_iter()
            .find(|node| !reported_completed.contains(node) && !set.completed.contains(node));
        set.active = next;
        next.is_none()
    }

    fn apply_artifacts(&self, event: &StreamEvent, progress: &mut PipelineProgress) {
        for stage in self.pipeline.stages() {
            let Some(payload) = event.field(&stage.artifact_field) else {
                continue;
            };
            if !is_non_empty(payload) {
                continue;
            }
            progress.statuses.mark_completed(stage.node);
            progress.artifacts.replace(stage.node, payload.clone());
        }
    }

    fn apply_errors(
        &self,
        errors: &serde_json::Map<String, Value>,
        set: &mut NodeStatusSet,
        log: &mut Vec<LogEntry>,
    ) {
        let failed: BTreeSet<PipelineNode> = errors
            .keys()
            .filter_map(|name| self.pipeline.resolve(name))
            .collect();
        for node in &failed {
            set.mark_failed(*node);
        }
        if let Some(node) = failed.first() {
            set.active = Some(*node);
        }
        let names: Vec<&str> = errors.keys().map(String::as_str).collect();
        log.push(
            LogEntry::error(format!("Pipeline reported errors: {}", names.join(", ")))
                .with_payload(Value::Object(errors.clone())),
        );
    }
}

fn is_non_empty(payload: &Value) -> bool {
    match payload {
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        _ => false,
    }
}

/// Rerun-from-node invalidation: removes exactly the stages downstream of
/// `node` from the completed set.
pub(crate) fn invalidate_downstream(
    pipeline: &PipelineConfig,
    statuses: &mut NodeStatusSet,
    node: PipelineNode,
) {
    statuses.invalidate(pipeline.invalidated_by(node));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tracker() -> StatusTracker {
        StatusTracker::new(Arc::new(PipelineConfig::default()))
    }

    fn apply_all(events: &[Value]) -> PipelineProgress {
        let tracker = tracker();
        events.iter().fold(PipelineProgress::default(), |progress, event| {
            tracker
                .apply(&StreamEvent::new(event.clone()), &progress)
                .progress
        })
    }

    fn nodes(list: &[PipelineNode]) -> BTreeSet<PipelineNode> {
        list.iter().copied().collect()
    }

    #[test]
    fn running_node_becomes_active() {
        let progress = apply_all(&[
            json!({"execution_status": {"data_collector": "completed"}}),
            json!({"execution_status": {"data_collector": "completed", "video_analyzer": "running"}}),
        ]);
        assert_eq!(progress.statuses.active(), Some(PipelineNode::VideoAnalyzer));
        assert_eq!(
            progress.statuses.completed(),
            &nodes(&[PipelineNode::DataCollector])
        );
    }

    #[test]
    fn failed_status_is_active_when_nothing_runs() {
        let progress = apply_all(&[json!({"execution_status": {
            "data_collector": "completed",
            "final_processor": "failed",
            "video_analyzer": "failed"
        }})]);
        assert_eq!(progress.statuses.active(), Some(PipelineNode::VideoAnalyzer));
        assert_eq!(
            progress.statuses.failed(),
            &nodes(&[PipelineNode::VideoAnalyzer, PipelineNode::TrendProcessor])
        );
        assert_eq!(
            progress.statuses.status_of(PipelineNode::TrendProcessor),
            NodeStatus::Failed
        );
    }

    #[test]
    fn next_active_is_inferred_from_pipeline_order() {
        let progress = apply_all(&[json!({"execution_status": {
            "data_collector": "completed",
            "video_analyzer": "completed",
            "outfit_reviewer": "running"
        }})]);
        assert_eq!(progress.statuses.active(), Some(PipelineNode::ContentAnalyzer));
    }

    #[test]
    fn all_completed_finishes_and_clears_active() {
        let tracker = tracker();
        let statuses: serde_json::Map<String, Value> = tracker
            .pipeline()
            .stages()
            .iter()
            .map(|stage| (stage.backend_name.clone(), json!("completed")))
            .collect();
        let event = StreamEvent::new(json!({ "execution_status": statuses }));
        let outcome = tracker.apply(&event, &PipelineProgress::default());
        assert!(outcome.finished);
        assert_eq!(outcome.progress.statuses.active(), None);
        assert_eq!(outcome.progress.statuses.completed().len(), 6);
    }

    #[test]
    fn terminal_status_event_is_idempotent() {
        let tracker = tracker();
        let event = StreamEvent::new(json!({"execution_status": {
            "data_collector": "completed",
            "content_analyzer": "failed"
        }}));
        let once = tracker.apply(&event, &PipelineProgress::default()).progress;
        let twice = tracker.apply(&event, &once).progress;
        assert_eq!(once.statuses, twice.statuses);
    }

    #[test]
    fn completed_never_shrinks_across_events() {
        let tracker = tracker();
        let events = [
            json!({"data_urls": [{"url": "https://example.com"}]}),
            json!({"execution_status": {"data_collector": "running"}}),
            json!({"execution_status": {}, "errors": {"data_collector": "late"}}),
            json!({"execution_status": {"video_analyzer": "completed"}}),
            json!({"final_output": {"ok": true}}),
        ];
        let mut progress = PipelineProgress::default();
        for event in events {
            let next = tracker.apply(&StreamEvent::new(event), &progress).progress;
            assert!(next.statuses.completed().is_superset(progress.statuses.completed()));
            progress = next;
        }
        assert_eq!(
            progress.statuses.completed(),
            &nodes(&[PipelineNode::DataCollector, PipelineNode::VideoAnalyzer])
        );
    }

    #[test]
    fn non_empty_artifact_marks_completed_and_replaces_snapshot() {
        let progress = apply_all(&[
            json!({"final_report": {"trends": ["a"]}}),
            json!({"final_report": {"trends": ["b"]}, "content_analysis": []}),
        ]);
        assert!(progress.statuses.is_completed(PipelineNode::TrendProcessor));
        assert!(!progress.statuses.is_completed(PipelineNode::ContentAnalyzer));
        let artifact = progress
            .artifacts
            .get(PipelineNode::TrendProcessor)
            .expect("artifact");
        assert!(matches!(artifact, NodeArtifact::TrendProcessor(_)));
        assert_eq!(artifact.payload(), &json!({"trends": ["b"]}));
        assert_eq!(progress.artifacts.len(), 1);
    }

    #[test]
    fn errors_mark_failed_active_and_log_raw_payload() {
        let tracker = tracker();
        let event = StreamEvent::new(json!({"errors": {"content_analyzer": "boom"}}));
        let outcome = tracker.apply(&event, &PipelineProgress::default());
        assert_eq!(
            outcome.progress.statuses.active(),
            Some(PipelineNode::ContentAnalyzer)
        );
        assert!(outcome
            .progress
            .statuses
            .failed()
            .contains(&PipelineNode::ContentAnalyzer));
        assert_eq!(outcome.log.len(), 1);
        assert_eq!(
            outcome.log[0].payload,
            Some(json!({"content_analyzer": "boom"}))
        );
    }

    #[test]
    fn final_output_clears_active_and_logs_success() {
        let tracker = tracker();
        let running = apply_all(&[json!({"execution_status": {"video_generator": "running"}})]);
        let outcome = tracker.apply(
            &StreamEvent::new(json!({"final_output": {"videos": 2}})),
            &running,
        );
        assert!(outcome.final_output);
        assert_eq!(outcome.progress.statuses.active(), None);
        assert_eq!(outcome.log[0].level, crate::log::LogLevel::Success);
    }

    #[test]
    fn unknown_shapes_are_ignored() {
        let progress = apply_all(&[
            json!("keepalive"),
            json!({"execution_status": "running", "errors": [], "data_urls": "x"}),
            json!({"brand_new_field": {"nested": true}}),
        ]);
        assert_eq!(progress, PipelineProgress::default());
    }

    #[test]
    fn rerun_invalidation_removes_exactly_downstream() {
        let pipeline = PipelineConfig::default();
        let mut progress = apply_all(&[json!({"execution_status": {
            "data_collector": "completed",
            "video_analyzer": "completed",
            "content_analyzer": "completed",
            "final_processor": "completed",
            "outfit_designer": "completed"
        }})]);
        invalidate_downstream(
            &pipeline,
            &mut progress.statuses,
            PipelineNode::ContentAnalyzer,
        );
        assert_eq!(
            progress.statuses.completed(),
            &nodes(&[
                PipelineNode::DataCollector,
                PipelineNode::VideoAnalyzer,
                PipelineNode::ContentAnalyzer
            ])
        );
    }

    #[test]
    fn rerun_from_any_node_keeps_the_node_itself() {
        let pipeline = PipelineConfig::default();
        for node in PipelineNode::ALL {
            let mut statuses = NodeStatusSet::default();
            for done in PipelineNode::ALL {
                statuses.mark_completed(done);
            }
            let before = statuses.completed().clone();
            invalidate_downstream(&pipeline, &mut statuses, node);
            let removed: BTreeSet<_> = before.difference(statuses.completed()).copied().collect();
            assert_eq!(&removed, pipeline.invalidated_by(node));
            assert!(statuses.is_completed(node));
        }
    }
}
