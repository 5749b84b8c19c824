// src/store/types.rs
// Data model (spec.md §3)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Project,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Project => "project",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "global" => Some(Scope::Global),
            "project" => Some(Scope::Project),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Normal,
}

impl Importance {
    pub fn as_str(self) -> &'static str {
        match self {
            Importance::High => "high",
            Importance::Normal => "normal",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Importance::High),
            "normal" => Some(Importance::Normal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Auto,
    Manual,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Auto => "auto",
            SourceType::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeliefStatus {
    Active,
    Demoted,
    Retracted,
}

impl BeliefStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BeliefStatus::Active => "active",
            BeliefStatus::Demoted => "demoted",
            BeliefStatus::Retracted => "retracted",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BeliefStatus::Active),
            "demoted" => Some(BeliefStatus::Demoted),
            "retracted" => Some(BeliefStatus::Retracted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectSource {
    Auto,
    ClaudeMd,
    Manual,
}

impl ProjectSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectSource::Auto => "auto",
            ProjectSource::ClaudeMd => "claude_md",
            ProjectSource::Manual => "manual",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(ProjectSource::Auto),
            "claude_md" => Some(ProjectSource::ClaudeMd),
            "manual" => Some(ProjectSource::Manual),
            _ => None,
        }
    }
}

/// An atomic memory item extracted from a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub session_id: String,
    pub project: Option<String>,
    pub project_path: Option<String>,
    pub scope: Scope,
    pub summary: String,
    pub full_content: Option<String>,
    pub entities: Vec<String>,
    pub importance: Importance,
    pub source_type: SourceType,
    pub embedding: Option<Vec<f32>>,
    pub created_at: i64,
    pub accessed_at: i64,
    pub access_count: i64,
    pub graduated_at: Option<i64>,
}

impl Episode {
    /// Invariant from spec.md §3: scope='project' <=> project & project_path set.
    pub fn check_scope_invariant(&self) -> bool {
        match self.scope {
            Scope::Project => self.project.is_some() && self.project_path.is_some(),
            Scope::Global => self.project.is_none() && self.project_path.is_none(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkLayer {
    Global,
    Project,
}

impl ChunkLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkLayer::Global => "global",
            ChunkLayer::Project => "project",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "global" => Some(ChunkLayer::Global),
            "project" => Some(ChunkLayer::Project),
            _ => None,
        }
    }
}

/// A windowed slice of a curated Markdown file, used for hybrid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub path: String,
    pub layer: ChunkLayer,
    pub project: Option<String>,
    pub start_line: i64,
    pub end_line: i64,
    pub hash: String,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub updated_at: i64,
}

/// A higher-order consolidated statement with Beta-distribution confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Belief {
    pub id: String,
    pub statement: String,
    pub subject: Option<String>,
    pub predicate: Option<String>,
    pub context: Option<String>,
    pub confidence_alpha: f64,
    pub confidence_beta: f64,
    pub evidence_count: i64,
    pub supporting_episodes: Vec<String>,
    pub contradicting_episodes: Vec<String>,
    pub scope: Scope,
    pub project: Option<String>,
    pub project_path: Option<String>,
    pub status: BeliefStatus,
    pub promoted_at: Option<i64>,
    pub demoted_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Belief {
    /// Point confidence = alpha / (alpha + beta).
    pub fn confidence(&self) -> f64 {
        let total = self.confidence_alpha + self.confidence_beta;
        if total <= 0.0 {
            0.0
        } else {
            self.confidence_alpha / total
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub full_path: String,
    pub name: String,
    pub description: Option<String>,
    pub source: ProjectSource,
    pub parent_project: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Result of dedup-upsert and search ranking helpers: a compact "bite" returned to
/// a recollection request (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bite {
    pub id: String,
    pub bite: String,
}
