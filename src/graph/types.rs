use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an ownership/responsibility annotation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotationSource {
    /// Declared explicitly (e.g. a CODEOWNERS file, an ADR header).
    Declared,
    /// Derived automatically (e.g. from git blame, import analysis).
    Inferred,
}

impl AnnotationSource {
    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            AnnotationSource::Declared => "declared",
            AnnotationSource::Inferred => "inferred",
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "declared" => Some(AnnotationSource::Declared),
            "inferred" => Some(AnnotationSource::Inferred),
            _ => None,
        }
    }
}

/// A module in the dependency graph, with optional architectural
/// annotations (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Primary key.
    pub module_id: String,
    /// Display name.
    pub name: String,
    /// Repository-relative root path.
    pub root_path: String,
    /// Manifest kind, e.g. "cargo", "npm", when detected.
    pub manifest_type: Option<String>,
    /// When this module was first detected.
    pub detected_at: DateTime<Utc>,
    /// Repository state identifier at detection.
    pub state_id: String,
    /// Public/internal path boundaries, when annotated.
    pub boundaries: Option<Boundaries>,
    /// One-sentence responsibility summary, when annotated.
    pub responsibility: Option<String>,
    /// Owning team/individual reference, when annotated.
    pub owner_ref: Option<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Provenance of the annotation fields above, when any are set.
    pub annotation_source: Option<AnnotationSource>,
    /// Confidence in the annotation fields, in `[0, 1]`, when any are set.
    pub confidence: Option<f64>,
}

/// Public/internal path lists for a module, stored as `boundaries_json`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Boundaries {
    /// Paths considered part of the module's public surface.
    #[serde(default)]
    pub public: Vec<String>,
    /// Paths considered internal implementation detail.
    #[serde(default)]
    pub internal: Vec<String>,
}

/// A directed dependency edge between two modules (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyEdge {
    /// Source module.
    pub from_module: String,
    /// Target module.
    pub to_module: String,
    /// Edge kind, e.g. "import".
    pub kind: String,
    /// Non-negative edge weight.
    pub strength: f64,
}

/// An append-only record of a module identifier being renamed.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRename {
    /// Previous module identifier.
    pub old_id: String,
    /// New module identifier.
    pub new_id: String,
    /// When the rename was recorded.
    pub renamed_at: DateTime<Utc>,
    /// Free-text reason, when given.
    pub reason: Option<String>,
}

/// Scope of an ownership assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipScope {
    /// Primary maintainer, approves changes.
    Maintainer,
    /// Expected to review changes.
    Reviewer,
    /// Has contributed but isn't a primary owner.
    Contributor,
}

impl OwnershipScope {
    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            OwnershipScope::Maintainer => "maintainer",
            OwnershipScope::Reviewer => "reviewer",
            OwnershipScope::Contributor => "contributor",
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "maintainer" => Some(OwnershipScope::Maintainer),
            "reviewer" => Some(OwnershipScope::Reviewer),
            "contributor" => Some(OwnershipScope::Contributor),
            _ => None,
        }
    }
}

/// Where an ownership rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnershipSource {
    /// A CODEOWNERS-style file.
    Codeowners,
    /// Derived from git blame history.
    GitBlame,
    /// Declared by a human outside CODEOWNERS (e.g. an ADR).
    Declared,
    /// Derived automatically by some other heuristic.
    Inferred,
}

impl OwnershipSource {
    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            OwnershipSource::Codeowners => "codeowners",
            OwnershipSource::GitBlame => "git-blame",
            OwnershipSource::Declared => "declared",
            OwnershipSource::Inferred => "inferred",
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "codeowners" => Some(OwnershipSource::Codeowners),
            "git-blame" => Some(OwnershipSource::GitBlame),
            "declared" => Some(OwnershipSource::Declared),
            "inferred" => Some(OwnershipSource::Inferred),
            _ => None,
        }
    }
}

/// A glob-pattern ownership rule (spec §3, §4.4). Glob evaluation,
/// including `**`, is performed by the caller (OQ-1); this store returns
/// rules ordered by pattern length desc, confidence desc.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipRule {
    /// Surrogate identifier, assigned by the store.
    pub id: i64,
    /// Glob pattern this rule matches.
    pub pattern: String,
    /// Owner identifiers.
    pub owners: Vec<String>,
    /// Maintainer/reviewer/contributor.
    pub scope: OwnershipScope,
    /// Provenance of this rule.
    pub source: OwnershipSource,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// An ownership-rule lifecycle event (append-only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipEvent {
    /// An owner was added to a pattern.
    Added,
    /// An owner was removed from a pattern.
    Removed,
    /// An owner's scope was escalated (e.g. contributor -> maintainer).
    Promoted,
    /// An owner's scope was lowered.
    Demoted,
}

impl OwnershipEvent {
    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            OwnershipEvent::Added => "added",
            OwnershipEvent::Removed => "removed",
            OwnershipEvent::Promoted => "promoted",
            OwnershipEvent::Demoted => "demoted",
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "added" => Some(OwnershipEvent::Added),
            "removed" => Some(OwnershipEvent::Removed),
            "promoted" => Some(OwnershipEvent::Promoted),
            "demoted" => Some(OwnershipEvent::Demoted),
            _ => None,
        }
    }
}

/// Append-only ownership history row.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipHistoryEntry {
    /// The pattern this event concerns.
    pub pattern: String,
    /// The owner affected.
    pub owner_id: String,
    /// What happened.
    pub event: OwnershipEvent,
    /// Free-text reason.
    pub reason: Option<String>,
    /// When this event was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// What kind of entity a `Responsibility` or `HotspotSnapshot` describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// A module.
    Module,
    /// A single file.
    File,
    /// A symbol.
    Symbol,
}

impl TargetType {
    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            TargetType::Module => "module",
            TargetType::File => "file",
            TargetType::Symbol => "symbol",
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "module" => Some(TargetType::Module),
            "file" => Some(TargetType::File),
            "symbol" => Some(TargetType::Symbol),
            _ => None,
        }
    }
}

/// Where a responsibility summary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponsibilitySource {
    /// Declared explicitly.
    Declared,
    /// Derived automatically.
    Inferred,
    /// Produced by an LLM.
    LlmGenerated,
}

impl ResponsibilitySource {
    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            ResponsibilitySource::Declared => "declared",
            ResponsibilitySource::Inferred => "inferred",
            ResponsibilitySource::LlmGenerated => "llm-generated",
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "declared" => Some(ResponsibilitySource::Declared),
            "inferred" => Some(ResponsibilitySource::Inferred),
            "llm-generated" => Some(ResponsibilitySource::LlmGenerated),
            _ => None,
        }
    }
}

/// A responsibility summary for a module, file, or symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Responsibility {
    /// The entity this summary describes.
    pub target_id: String,
    /// What kind of entity `target_id` is.
    pub target_type: TargetType,
    /// One-paragraph summary.
    pub summary: String,
    /// Capabilities this entity provides.
    pub capabilities: Vec<String>,
    /// Provenance.
    pub source: ResponsibilitySource,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// When a human last confirmed this summary, if ever.
    pub verified_at: Option<DateTime<Utc>>,
}

/// Lifecycle status of an architectural decision record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    /// Drafted but not yet accepted.
    Proposed,
    /// In effect.
    Accepted,
    /// No longer in effect, not replaced by anything specific.
    Deprecated,
    /// Replaced by a later decision.
    Superseded,
}

impl DecisionStatus {
    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            DecisionStatus::Proposed => "proposed",
            DecisionStatus::Accepted => "accepted",
            DecisionStatus::Deprecated => "deprecated",
            DecisionStatus::Superseded => "superseded",
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "proposed" => Some(DecisionStatus::Proposed),
            "accepted" => Some(DecisionStatus::Accepted),
            "deprecated" => Some(DecisionStatus::Deprecated),
            "superseded" => Some(DecisionStatus::Superseded),
            _ => None,
        }
    }
}

/// An architecture decision record (ADR).
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Human-style identifier, e.g. "ADR-001".
    pub id: String,
    /// Title.
    pub title: String,
    /// Lifecycle status.
    pub status: DecisionStatus,
    /// Modules this decision affects.
    pub affected_modules: Vec<String>,
    /// Source file path, when the ADR lives in the repo.
    pub file_path: Option<String>,
    /// Author, when known.
    pub author: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// A single day's churn/complexity/coupling measurement for a target.
#[derive(Debug, Clone, PartialEq)]
pub struct HotspotSnapshot {
    /// The entity measured.
    pub target_id: String,
    /// What kind of entity `target_id` is.
    pub target_type: TargetType,
    /// The date this snapshot covers.
    pub snapshot_date: DateTime<Utc>,
    /// Recent change volume.
    pub churn: f64,
    /// Structural complexity.
    pub complexity: f64,
    /// Coupling to other entities.
    pub coupling: f64,
    /// Composite hotspot score.
    pub score: f64,
}
