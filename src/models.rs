use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Tweet,
    Article,
    Idea,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tweet => "tweet",
            Self::Article => "article",
            Self::Idea => "idea",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStatus {
    Pending,
    Queued,
    Recorded,
    Uploaded,
}

impl ScriptStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Queued, Self::Recorded, Self::Uploaded];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Recorded => "recorded",
            Self::Uploaded => "uploaded",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "queued" => Some(Self::Queued),
            "recorded" => Some(Self::Recorded),
            "uploaded" => Some(Self::Uploaded),
            _ => None,
        }
    }
}

/// Audience framing passed to the generation service. `Casual` targets the
/// non-technical everyday viewer; `SmallBusiness` layers business-owner
/// framing on top of it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tone {
    #[default]
    Casual,
    SmallBusiness,
}

impl Tone {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Casual => "casual",
            Self::SmallBusiness => "small-business",
        }
    }
}

/// One script as produced by the generation service, before it has a row id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedScript {
    #[serde(default)]
    pub structure: String,
    #[serde(default)]
    pub hook: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub cta: String,
    #[serde(default)]
    pub angle: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub visual_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedTopic {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scripts: Vec<GeneratedScript>,
}

/// Row ids produced by one atomic `save_generation` call.
#[derive(Debug, Clone, Serialize)]
pub struct SavedGeneration {
    pub source_id: i64,
    pub script_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntakeOutcome {
    pub kind: SourceKind,
    pub source_id: i64,
    pub script_ids: Vec<i64>,
    pub topics: Vec<GeneratedTopic>,
}

/// A script row joined with its topic name (and, for single-row fetches,
/// the originating source text). Metrics columns stay `None` until the
/// first measurement lands.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptRecord {
    pub id: i64,
    pub topic_id: i64,
    pub topic_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    pub structure: String,
    pub hook: String,
    pub body: String,
    pub cta: String,
    pub angle: Option<String>,
    pub duration: Option<String>,
    pub visual_format: Option<String>,
    pub status: ScriptStatus,
    pub published_url: Option<String>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
    pub favorites: Option<i64>,
    pub avg_watch_time: Option<f64>,
    pub full_watch_rate: Option<f64>,
    pub metrics_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Wholesale metrics overwrite. Counts the operator never measured come in
/// as zero; the two rates stay `None` when unknown.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MetricsUpdate {
    pub views: i64,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub comments: i64,
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub favorites: Option<i64>,
    #[serde(default)]
    pub avg_watch_time: Option<f64>,
    #[serde(default)]
    pub full_watch_rate: Option<f64>,
}

/// Reported back after a manual metrics entry. The engagement percentage is
/// derived for display only and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub script_id: i64,
    pub views: i64,
    pub engagement_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub matched: u32,
    pub unmatched: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructureStat {
    pub structure: String,
    pub total: i64,
    pub avg_views: Option<f64>,
    pub avg_likes: Option<f64>,
    pub avg_watch_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicStat {
    pub topic: String,
    pub total_scripts: i64,
    pub with_metrics: i64,
    pub avg_views: Option<f64>,
    pub avg_likes: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HookStat {
    pub hook: String,
    pub views: i64,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
    pub structure: String,
    pub full_watch_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub week_start: NaiveDate,
    pub summary: String,
    pub patterns: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One metered script as handed to the analysis service.
#[derive(Debug, Clone, Serialize)]
pub struct MeteredScript {
    pub id: i64,
    pub hook: String,
    pub structure: String,
    pub topic: String,
    pub angle: Option<String>,
    pub views: i64,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
    pub avg_watch_time: Option<f64>,
    pub full_watch_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternFinding {
    pub category: String,
    pub finding: String,
    pub evidence: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternReport {
    pub summary: String,
    #[serde(default)]
    pub patterns: Vec<PatternFinding>,
    #[serde(default)]
    pub top_recommendations: Vec<String>,
    #[serde(default)]
    pub avoid: Vec<String>,
    #[serde(default)]
    pub prompt_adjustments: Vec<String>,
}
