//! Fixed pipeline stages and the static configuration built around them:
//! backend name aliases, artifact fields, and the rerun dependency table.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::errors::ClientError;

/// One of the six pipeline stages. Declaration order is pipeline order, so
/// `Ord` and `BTreeSet` iteration follow it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PipelineNode {
    DataCollector,
    VideoAnalyzer,
    ContentAnalyzer,
    TrendProcessor,
    OutfitDesigner,
    VideoGeneration,
}

impl PipelineNode {
    /// All stages in pipeline order.
    pub const ALL: [PipelineNode; 6] = [
        PipelineNode::DataCollector,
        PipelineNode::VideoAnalyzer,
        PipelineNode::ContentAnalyzer,
        PipelineNode::TrendProcessor,
        PipelineNode::OutfitDesigner,
        PipelineNode::VideoGeneration,
    ];

    /// Stable client-side id.
    pub fn id(self) -> &'static str {
        match self {
            PipelineNode::DataCollector => "data_collector",
            PipelineNode::VideoAnalyzer => "video_analyzer",
            PipelineNode::ContentAnalyzer => "content_analyzer",
            PipelineNode::TrendProcessor => "trend_processor",
            PipelineNode::OutfitDesigner => "outfit_designer",
            PipelineNode::VideoGeneration => "video_generation",
        }
    }

    /// Zero-based position in pipeline order.
    pub fn position(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PipelineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for PipelineNode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PipelineNode::ALL
            .into_iter()
            .find(|node| node.id() == s)
            .ok_or_else(|| ClientError::Validation(format!("unknown pipeline node: {s}")))
    }
}

/// Shape of the payload a stage publishes under its artifact field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactShape {
    List,
    Object,
}

/// Static description of one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageSpec {
    pub node: PipelineNode,
    /// Name the service uses in `execution_status`, `errors` and `next`.
    pub backend_name: String,
    /// Top-level state field carrying this stage's output.
    pub artifact_field: String,
    pub shape: ArtifactShape,
}

impl StageSpec {
    pub fn new(
        node: PipelineNode,
        backend_name: impl Into<String>,
        artifact_field: impl Into<String>,
        shape: ArtifactShape,
    ) -> Self {
        Self {
            node,
            backend_name: backend_name.into(),
            artifact_field: artifact_field.into(),
            shape,
        }
    }
}

/// Immutable pipeline configuration, built once and shared by the tracker
/// and the session.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    stages: Vec<StageSpec>,
    aliases: HashMap<String, PipelineNode>,
    invalidates: Vec<BTreeSet<PipelineNode>>,
}

impl PipelineConfig {
    /// Builds and validates a configuration.
    ///
    /// Every node needs exactly one stage spec; ids, backend names and
    /// artifact fields must not collide; invalidation targets must be strictly
    /// downstream of their source.
    pub fn new(
        mut stages: Vec<StageSpec>,
        invalidates: Vec<(PipelineNode, Vec<PipelineNode>)>,
    ) -> Result<Self, ClientError> {
        stages.sort_by_key(|stage| stage.node);
        let covered: Vec<PipelineNode> = stages.iter().map(|stage| stage.node).collect();
        if covered != PipelineNode::ALL {
            return Err(ClientError::Config(format!(
                "pipeline must describe each stage exactly once, got {covered:?}"
            )));
        }

        let mut aliases = HashMap::new();
        let mut fields = BTreeSet::new();
        for stage in &stages {
            if stage.backend_name.trim().is_empty() || stage.artifact_field.trim().is_empty() {
                return Err(ClientError::Config(format!(
                    "stage {} needs a backend name and an artifact field",
                    stage.node
                )));
            }
            for alias in [stage.node.id(), stage.backend_name.as_str()] {
                if let Some(existing) = aliases.insert(alias.to_string(), stage.node)
                    && existing != stage.node
                {
                    return Err(ClientError::Config(format!(
                        "name {alias} refers to both {existing} and {}",
                        stage.node
                    )));
                }
            }
            if !fields.insert(stage.artifact_field.clone()) {
                return Err(ClientError::Config(format!(
                    "artifact field {} is used by more than one stage",
                    stage.artifact_field
                )));
            }
        }

        let mut table = vec![BTreeSet::new(); PipelineNode::ALL.len()];
        for (source, targets) in invalidates {
            for target in targets {
                if target <= source {
                    return Err(ClientError::Config(format!(
                        "{source} can only invalidate downstream stages, not {target}"
                    )));
                }
                table[source.position()].insert(target);
            }
        }

        Ok(Self {
            stages,
            aliases,
            invalidates: table,
        })
    }

    /// Stage spec for a node.
    pub fn stage(&self, node: PipelineNode) -> &StageSpec {
        &self.stages[node.position()]
    }

    /// Stage specs in pipeline order.
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Resolves a client id or a backend name to its node.
    pub fn resolve(&self, name: &str) -> Option<PipelineNode> {
        self.aliases.get(name).copied()
    }

    /// Stages whose results become stale when `node` is edited and rerun.
    pub fn invalidated_by(&self, node: PipelineNode) -> &BTreeSet<PipelineNode> {
        &self.invalidates[node.position()]
    }
}

impl Default for PipelineConfig {
    /// The fashion-analysis pipeline served by the orchestration service.
    fn default() -> Self {
        use PipelineNode::*;

        let stages = vec![
            StageSpec::new(DataCollector, "data_collector", "data_urls", ArtifactShape::List),
            StageSpec::new(VideoAnalyzer, "video_analyzer", "video_analysis", ArtifactShape::List),
            StageSpec::new(
                ContentAnalyzer,
                "content_analyzer",
                "content_analysis",
                ArtifactShape::List,
            ),
            StageSpec::new(TrendProcessor, "final_processor", "final_report", ArtifactShape::Object),
            StageSpec::new(OutfitDesigner, "outfit_designer", "outfit_designs", ArtifactShape::List),
            StageSpec::new(VideoGeneration, "video_generator", "outfit_videos", ArtifactShape::List),
        ];
        let table = [
            (DataCollector, vec![ContentAnalyzer, TrendProcessor, OutfitDesigner, VideoGeneration]),
            (VideoAnalyzer, vec![ContentAnalyzer, TrendProcessor, OutfitDesigner, VideoGeneration]),
            (ContentAnalyzer, vec![TrendProcessor, OutfitDesigner, VideoGeneration]),
            (TrendProcessor, vec![OutfitDesigner, VideoGeneration]),
            (OutfitDesigner, vec![VideoGeneration]),
            (VideoGeneration, vec![]),
        ];

        let mut aliases = HashMap::new();
        for stage in &stages {
            aliases.insert(stage.node.id().to_string(), stage.node);
            aliases.insert(stage.backend_name.clone(), stage.node);
        }
        let invalidates = table
            .into_iter()
            .map(|(_, targets)| targets.into_iter().collect())
            .collect();

        Self {
            stages,
            aliases,
            invalidates,
        }
    }
}
