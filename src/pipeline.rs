use crate::ai::{AnalysisService, GenerationService};
use crate::classify::classify;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::importer::parse_metrics_csv;
use crate::models::{
    AnalysisRecord, HookStat, ImportSummary, IntakeOutcome, MeteredScript, MetricsSummary,
    MetricsUpdate, PatternReport, ScriptRecord, ScriptStatus, StructureStat, Tone, TopicStat,
};
use chrono::{Datelike, Utc, Weekday};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Below this many metered scripts the analysis flow refuses to run at all;
/// pattern claims from one or two data points are noise.
pub const MIN_METERED_FOR_ANALYSIS: usize = 3;

/// Sequences intake, status transitions, metrics ingestion and analysis
/// runs across the store and the two AI services. Owns no state of its own.
pub struct Pipeline {
    db: Arc<Database>,
    generator: Arc<dyn GenerationService>,
    analyst: Arc<dyn AnalysisService>,
}

impl Pipeline {
    pub fn new(
        db: Arc<Database>,
        generator: Arc<dyn GenerationService>,
        analyst: Arc<dyn AnalysisService>,
    ) -> Self {
        Self {
            db,
            generator,
            analyst,
        }
    }

    /// Raw text in, persisted topic/script tree out. Nothing is persisted
    /// unless the generation service returns at least one topic.
    pub async fn intake(&self, text: &str, tone: Tone) -> AppResult<IntakeOutcome> {
        let kind = classify(text);
        tracing::info!(kind = kind.as_str(), chars = text.len(), "running intake");

        let topics = self.generator.generate_scripts(text, tone).await?;
        if topics.is_empty() {
            return Err(AppError::ExternalService(
                "no topics could be extracted from that content".to_string(),
            ));
        }

        let saved = self.db.save_generation(kind, text, &topics)?;
        tracing::info!(
            source_id = saved.source_id,
            scripts = saved.script_ids.len(),
            "generation saved"
        );

        Ok(IntakeOutcome {
            kind,
            source_id: saved.source_id,
            script_ids: saved.script_ids,
            topics,
        })
    }

    pub fn set_status(&self, script_id: i64, status: ScriptStatus) -> AppResult<()> {
        validate_id(script_id)?;
        self.db.set_script_status(script_id, status)
    }

    pub fn set_url(&self, script_id: i64, url: &str) -> AppResult<()> {
        validate_id(script_id)?;
        self.db.set_script_url(script_id, url)
    }

    /// Manual metrics entry. Overwrites wholesale and returns the derived
    /// engagement percentage, which is reported but never persisted.
    pub fn record_metrics(&self, script_id: i64, update: MetricsUpdate) -> AppResult<MetricsSummary> {
        validate_id(script_id)?;
        if self.db.get_script(script_id)?.is_none() {
            return Err(AppError::NotFound(format!("script #{script_id} does not exist")));
        }

        self.db.set_script_metrics(script_id, &update)?;
        Ok(MetricsSummary {
            script_id,
            views: update.views,
            engagement_pct: engagement_pct(update.views, update.likes, update.comments, update.shares),
        })
    }

    /// Bulk metrics import from a vendor analytics export. Rows are matched
    /// to uploaded scripts by exact URL; rows with no match are counted and
    /// reported, never treated as errors.
    pub fn import_metrics_csv(&self, bytes: &[u8]) -> AppResult<ImportSummary> {
        let rows = parse_metrics_csv(bytes)?;
        let uploaded = self.db.list_scripts_by_status(ScriptStatus::Uploaded)?;

        let mut summary = ImportSummary::default();
        for row in rows {
            let matched = row.url.as_deref().and_then(|url| {
                uploaded
                    .iter()
                    .find(|script| script.published_url.as_deref() == Some(url))
            });
            match matched {
                Some(script) => {
                    self.db.set_script_metrics(script.id, &row.update)?;
                    summary.matched += 1;
                }
                None => summary.unmatched += 1,
            }
        }

        tracing::info!(
            matched = summary.matched,
            unmatched = summary.unmatched,
            "metrics import finished"
        );
        Ok(summary)
    }

    /// Runs the analysis service over every metered script and persists the
    /// report keyed by the current week's Monday. Refuses below the data
    /// threshold without calling the service.
    pub async fn run_analysis(&self) -> AppResult<PatternReport> {
        let metered = self.db.list_scripts_with_metrics()?;
        if metered.len() < MIN_METERED_FOR_ANALYSIS {
            return Err(AppError::Validation(format!(
                "need at least {MIN_METERED_FOR_ANALYSIS} scripts with metrics to analyze, have {}",
                metered.len()
            )));
        }

        let data: Vec<MeteredScript> = metered.iter().map(to_metered).collect();
        let report = self.analyst.analyze_performance(&data).await?;

        let week_start = Utc::now().date_naive().week(Weekday::Mon).first_day();
        self.db
            .record_analysis(week_start, &report.summary, &serde_json::to_value(&report)?)?;
        tracing::info!(week_start = %week_start, patterns = report.patterns.len(), "analysis recorded");

        Ok(report)
    }

    // Read surface consumed by the bot and the dashboard.

    pub fn counts_by_status(&self) -> AppResult<BTreeMap<ScriptStatus, i64>> {
        self.db.counts_by_status()
    }

    pub fn script(&self, script_id: i64) -> AppResult<Option<ScriptRecord>> {
        self.db.get_script(script_id)
    }

    pub fn scripts(&self, status: Option<ScriptStatus>) -> AppResult<Vec<ScriptRecord>> {
        match status {
            Some(status) => self.db.list_scripts_by_status(status),
            None => self.db.list_all_scripts(),
        }
    }

    pub fn metered_scripts(&self) -> AppResult<Vec<ScriptRecord>> {
        self.db.list_scripts_with_metrics()
    }

    pub fn recent_scripts(&self, limit: i64) -> AppResult<Vec<ScriptRecord>> {
        self.db.recent_scripts(limit)
    }

    pub fn top_performers(&self, limit: i64) -> AppResult<Vec<ScriptRecord>> {
        self.db.top_performers(limit)
    }

    pub fn structure_aggregates(&self) -> AppResult<Vec<StructureStat>> {
        self.db.structure_aggregates()
    }

    pub fn topic_aggregates(&self) -> AppResult<Vec<TopicStat>> {
        self.db.topic_aggregates()
    }

    pub fn hook_leaderboard(&self) -> AppResult<Vec<HookStat>> {
        self.db.hook_leaderboard()
    }

    pub fn latest_analysis(&self) -> AppResult<Option<AnalysisRecord>> {
        self.db.latest_analysis()
    }
}

/// (likes + comments + shares) / views × 100; zero views means zero
/// engagement rather than a division error.
pub fn engagement_pct(views: i64, likes: i64, comments: i64, shares: i64) -> f64 {
    if views <= 0 {
        return 0.0;
    }
    (likes + comments + shares) as f64 / views as f64 * 100.0
}

fn validate_id(script_id: i64) -> AppResult<()> {
    if script_id <= 0 {
        return Err(AppError::Validation(format!(
            "script id must be a positive integer, got {script_id}"
        )));
    }
    Ok(())
}

fn to_metered(script: &ScriptRecord) -> MeteredScript {
    MeteredScript {
        id: script.id,
        hook: script.hook.clone(),
        structure: script.structure.clone(),
        topic: script.topic_name.clone(),
        angle: script.angle.clone(),
        views: script.views.unwrap_or(0),
        likes: script.likes,
        comments: script.comments,
        shares: script.shares,
        avg_watch_time: script.avg_watch_time,
        full_watch_rate: script.full_watch_rate,
    }
}
