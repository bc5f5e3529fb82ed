use crate::errors::{AppError, AppResult};
use crate::models::{
    AnalysisRecord, GeneratedScript, GeneratedTopic, HookStat, MetricsUpdate, SavedGeneration,
    ScriptRecord, ScriptStatus, SourceKind, StructureStat, TopicStat,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const SCRIPT_COLUMNS: &str = "s.id, s.topic_id, t.name, s.structure, s.hook, s.body, s.cta, \
     s.angle, s.duration, s.visual_format, s.status, s.published_url, \
     s.views, s.likes, s.comments, s.shares, s.favorites, \
     s.avg_watch_time, s.full_watch_rate, s.metrics_updated_at, s.created_at";

/// Single-file store for the whole pipeline. One connection behind a mutex;
/// SQLite serializes writers itself, callers never overlap mutations on the
/// same script.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    pub fn create_source(&self, kind: SourceKind, text: &str) -> AppResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sources (kind, original_text, created_at) VALUES (?1, ?2, ?3)",
            params![kind.as_str(), text, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn create_topic(&self, source_id: i64, name: &str, description: &str) -> AppResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO topics (source_id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![source_id, name, description, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn create_script(&self, topic_id: i64, draft: &GeneratedScript) -> AppResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO scripts (topic_id, structure, hook, body, cta, angle, duration, visual_format, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                topic_id,
                draft.structure,
                draft.hook,
                draft.body,
                draft.cta,
                draft.angle,
                draft.duration,
                draft.visual_format,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// No-op when the id does not resolve; transitions are unconstrained.
    pub fn set_script_status(&self, script_id: i64, status: ScriptStatus) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE scripts SET status = ?1 WHERE id = ?2",
            params![status.as_str(), script_id],
        )?;
        Ok(())
    }

    /// Attaching a published URL implies the script went out: status is
    /// forced to `uploaded` in the same statement.
    pub fn set_script_url(&self, script_id: i64, url: &str) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE scripts SET published_url = ?1, status = 'uploaded' WHERE id = ?2",
            params![url, script_id],
        )?;
        Ok(())
    }

    /// Wholesale overwrite; every call stamps a fresh `metrics_updated_at`.
    pub fn set_script_metrics(&self, script_id: i64, update: &MetricsUpdate) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE scripts SET views = ?1, likes = ?2, comments = ?3, shares = ?4,
             favorites = ?5, avg_watch_time = ?6, full_watch_rate = ?7,
             metrics_updated_at = ?8 WHERE id = ?9",
            params![
                update.views,
                update.likes,
                update.comments,
                update.shares,
                update.favorites,
                update.avg_watch_time,
                update.full_watch_rate,
                Utc::now().to_rfc3339(),
                script_id,
            ],
        )?;
        Ok(())
    }

    pub fn get_script(&self, script_id: i64) -> AppResult<Option<ScriptRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {SCRIPT_COLUMNS}, src.original_text
                 FROM scripts s
                 JOIN topics t ON s.topic_id = t.id
                 JOIN sources src ON t.source_id = src.id
                 WHERE s.id = ?1"
            ),
            [script_id],
            |row| {
                let mut record = parse_script_row(row)?;
                record.source_text = row.get(21)?;
                Ok(record)
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_scripts_by_status(&self, status: ScriptStatus) -> AppResult<Vec<ScriptRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCRIPT_COLUMNS} FROM scripts s
             JOIN topics t ON s.topic_id = t.id
             WHERE s.status = ?1
             ORDER BY s.created_at DESC, s.id DESC"
        ))?;
        let rows = stmt
            .query_map([status.as_str()], parse_script_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_all_scripts(&self) -> AppResult<Vec<ScriptRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCRIPT_COLUMNS} FROM scripts s
             JOIN topics t ON s.topic_id = t.id
             ORDER BY s.created_at DESC, s.id DESC"
        ))?;
        let rows = stmt
            .query_map([], parse_script_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_scripts_with_metrics(&self) -> AppResult<Vec<ScriptRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCRIPT_COLUMNS} FROM scripts s
             JOIN topics t ON s.topic_id = t.id
             WHERE s.views IS NOT NULL
             ORDER BY s.views DESC"
        ))?;
        let rows = stmt
            .query_map([], parse_script_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn recent_scripts(&self, limit: i64) -> AppResult<Vec<ScriptRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCRIPT_COLUMNS} FROM scripts s
             JOIN topics t ON s.topic_id = t.id
             ORDER BY s.created_at DESC, s.id DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map([limit], parse_script_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn counts_by_status(&self) -> AppResult<BTreeMap<ScriptStatus, i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM scripts GROUP BY status")?;
        let mut rows = stmt.query([])?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let status = parse_status(&row.get::<_, String>(0)?)?;
            counts.insert(status, row.get(1)?);
        }
        Ok(counts)
    }

    pub fn top_performers(&self, limit: i64) -> AppResult<Vec<ScriptRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCRIPT_COLUMNS} FROM scripts s
             JOIN topics t ON s.topic_id = t.id
             WHERE s.views IS NOT NULL
             ORDER BY s.views DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map([limit], parse_script_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn structure_aggregates(&self) -> AppResult<Vec<StructureStat>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT structure, COUNT(*), AVG(views), AVG(likes), AVG(full_watch_rate)
             FROM scripts
             WHERE views IS NOT NULL
             GROUP BY structure
             ORDER BY AVG(views) DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StructureStat {
                    structure: row.get(0)?,
                    total: row.get(1)?,
                    avg_views: row.get(2)?,
                    avg_likes: row.get(3)?,
                    avg_watch_rate: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Grouped by topic name, restricted to topics with at least one
    /// metered script.
    pub fn topic_aggregates(&self) -> AppResult<Vec<TopicStat>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.name,
                COUNT(*),
                SUM(CASE WHEN s.views IS NOT NULL THEN 1 ELSE 0 END) AS with_metrics,
                AVG(s.views),
                AVG(s.likes)
             FROM scripts s
             JOIN topics t ON s.topic_id = t.id
             GROUP BY t.name
             HAVING with_metrics > 0
             ORDER BY AVG(s.views) DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TopicStat {
                    topic: row.get(0)?,
                    total_scripts: row.get(1)?,
                    with_metrics: row.get(2)?,
                    avg_views: row.get(3)?,
                    avg_likes: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn hook_leaderboard(&self) -> AppResult<Vec<HookStat>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT hook, views, likes, comments, shares, structure, full_watch_rate
             FROM scripts
             WHERE views IS NOT NULL
             ORDER BY views DESC LIMIT 20",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(HookStat {
                    hook: row.get(0)?,
                    views: row.get(1)?,
                    likes: row.get(2)?,
                    comments: row.get(3)?,
                    shares: row.get(4)?,
                    structure: row.get(5)?,
                    full_watch_rate: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn record_analysis(
        &self,
        week_start: NaiveDate,
        summary: &str,
        patterns: &serde_json::Value,
    ) -> AppResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO analysis_log (week_start, summary, patterns_json, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                week_start.format("%Y-%m-%d").to_string(),
                summary,
                serde_json::to_string(patterns)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn latest_analysis(&self) -> AppResult<Option<AnalysisRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, week_start, summary, patterns_json, created_at
             FROM analysis_log ORDER BY created_at DESC, id DESC LIMIT 1",
            [],
            |row| {
                Ok(AnalysisRecord {
                    id: row.get(0)?,
                    week_start: parse_date(&row.get::<_, String>(1)?)?,
                    summary: row.get(2)?,
                    patterns: row
                        .get::<_, Option<String>>(3)?
                        .and_then(|raw| serde_json::from_str(&raw).ok())
                        .unwrap_or(serde_json::json!({})),
                    created_at: parse_time(&row.get::<_, String>(4)?)?,
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Persists one generation response as a whole: one source, its topics,
    /// their scripts. All-or-nothing; a failure anywhere rolls the entire
    /// tree back so no orphaned fragments survive.
    pub fn save_generation(
        &self,
        kind: SourceKind,
        original_text: &str,
        topics: &[GeneratedTopic],
    ) -> AppResult<SavedGeneration> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO sources (kind, original_text, created_at) VALUES (?1, ?2, ?3)",
            params![kind.as_str(), original_text, now],
        )?;
        let source_id = tx.last_insert_rowid();

        let mut script_ids = Vec::new();
        for topic in topics {
            tx.execute(
                "INSERT INTO topics (source_id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![source_id, topic.name, topic.description, now],
            )?;
            let topic_id = tx.last_insert_rowid();

            for script in &topic.scripts {
                tx.execute(
                    "INSERT INTO scripts (topic_id, structure, hook, body, cta, angle, duration, visual_format, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        topic_id,
                        script.structure,
                        script.hook,
                        script.body,
                        script.cta,
                        script.angle,
                        script.duration,
                        script.visual_format,
                        now,
                    ],
                )?;
                script_ids.push(tx.last_insert_rowid());
            }
        }

        tx.commit()?;
        Ok(SavedGeneration {
            source_id,
            script_ids,
        })
    }
}

fn parse_script_row(row: &Row<'_>) -> rusqlite::Result<ScriptRecord> {
    Ok(ScriptRecord {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        topic_name: row.get(2)?,
        source_text: None,
        structure: row.get(3)?,
        hook: row.get(4)?,
        body: row.get(5)?,
        cta: row.get(6)?,
        angle: row.get(7)?,
        duration: row.get(8)?,
        visual_format: row.get(9)?,
        status: parse_status(&row.get::<_, String>(10)?)?,
        published_url: row.get(11)?,
        views: row.get(12)?,
        likes: row.get(13)?,
        comments: row.get(14)?,
        shares: row.get(15)?,
        favorites: row.get(16)?,
        avg_watch_time: row.get(17)?,
        full_watch_rate: row.get(18)?,
        metrics_updated_at: row
            .get::<_, Option<String>>(19)?
            .map(|raw| parse_time(&raw))
            .transpose()?,
        created_at: parse_time(&row.get::<_, String>(20)?)?,
    })
}

fn parse_status(raw: &str) -> rusqlite::Result<ScriptStatus> {
    ScriptStatus::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown script status '{}'", raw),
            )),
        )
    })
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

fn parse_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::models::{
        GeneratedScript, GeneratedTopic, MetricsUpdate, ScriptStatus, SourceKind,
    };

    fn open_db(dir: &tempfile::TempDir) -> Database {
        Database::open(&dir.path().join("test.db")).expect("db")
    }

    fn draft(hook: &str) -> GeneratedScript {
        GeneratedScript {
            structure: "question".to_string(),
            hook: hook.to_string(),
            body: "body text".to_string(),
            cta: "Follow me for more shortcuts".to_string(),
            angle: "contrarian".to_string(),
            duration: "45s".to_string(),
            visual_format: "talking head".to_string(),
        }
    }

    fn topic(name: &str, hooks: &[&str]) -> GeneratedTopic {
        GeneratedTopic {
            name: name.to_string(),
            description: "one-liner".to_string(),
            scripts: hooks.iter().map(|h| draft(h)).collect(),
        }
    }

    #[test]
    fn joined_fields_come_from_topic_and_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        let source_id = db
            .create_source(SourceKind::Idea, "raw idea text")
            .expect("source");
        let topic_id = db
            .create_topic(source_id, "automation", "doing less by hand")
            .expect("topic");
        let script_id = db.create_script(topic_id, &draft("what if")).expect("script");

        let record = db.get_script(script_id).expect("get").expect("exists");
        assert_eq!(record.topic_name, "automation");
        assert_eq!(record.source_text.as_deref(), Some("raw idea text"));
        assert_eq!(record.status, ScriptStatus::Pending);
        assert!(record.views.is_none());
    }

    #[test]
    fn topic_requires_existing_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        let result = db.create_topic(999, "orphan", "");
        assert!(result.is_err());
    }

    #[test]
    fn save_generation_persists_the_whole_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        let topics = vec![
            topic("topic a", &["hook a1", "hook a2"]),
            topic("topic b", &["hook b1", "hook b2"]),
        ];
        let saved = db
            .save_generation(SourceKind::Article, "long article", &topics)
            .expect("save");

        assert_eq!(saved.script_ids.len(), 4);
        let all = db.list_all_scripts().expect("list");
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|s| s.status == ScriptStatus::Pending));
    }

    #[test]
    fn save_generation_rolls_back_on_mid_batch_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        // Force the third script insert to fail partway through the batch.
        {
            let conn = db.conn.lock().expect("db lock");
            conn.execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON scripts
                 WHEN NEW.hook = 'poison' BEGIN
                   SELECT RAISE(ABORT, 'poisoned row');
                 END;",
            )
            .expect("trigger");
        }

        let topics = vec![
            topic("topic a", &["hook a1", "hook a2"]),
            topic("topic b", &["poison"]),
        ];
        let result = db.save_generation(SourceKind::Tweet, "tweet text", &topics);
        assert!(result.is_err());

        let conn = db.conn.lock().expect("db lock");
        let sources: i64 = conn
            .query_row("SELECT COUNT(*) FROM sources", [], |row| row.get(0))
            .expect("count sources");
        let topics_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM topics", [], |row| row.get(0))
            .expect("count topics");
        let scripts: i64 = conn
            .query_row("SELECT COUNT(*) FROM scripts", [], |row| row.get(0))
            .expect("count scripts");
        assert_eq!((sources, topics_count, scripts), (0, 0, 0));
    }

    #[test]
    fn setting_url_forces_uploaded_from_any_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        let saved = db
            .save_generation(SourceKind::Idea, "idea", &[topic("t", &["h1"])])
            .expect("save");
        let id = saved.script_ids[0];

        for status in ScriptStatus::ALL {
            db.set_script_status(id, status).expect("status");
            db.set_script_url(id, "https://example.com/v/1").expect("url");
            let record = db.get_script(id).expect("get").expect("exists");
            assert_eq!(record.status, ScriptStatus::Uploaded);
            assert_eq!(record.published_url.as_deref(), Some("https://example.com/v/1"));
        }
    }

    #[test]
    fn status_update_for_missing_id_is_a_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        db.set_script_status(42, ScriptStatus::Recorded).expect("noop");
        assert!(db.list_all_scripts().expect("list").is_empty());
    }

    #[test]
    fn metrics_update_overwrites_instead_of_merging() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        let saved = db
            .save_generation(SourceKind::Idea, "idea", &[topic("t", &["h1"])])
            .expect("save");
        let id = saved.script_ids[0];

        db.set_script_metrics(
            id,
            &MetricsUpdate {
                views: 1000,
                likes: 50,
                comments: 30,
                shares: 20,
                favorites: Some(5),
                avg_watch_time: Some(12.5),
                full_watch_rate: Some(40.0),
            },
        )
        .expect("first update");

        db.set_script_metrics(
            id,
            &MetricsUpdate {
                views: 2000,
                likes: 80,
                comments: 10,
                shares: 4,
                favorites: None,
                avg_watch_time: None,
                full_watch_rate: None,
            },
        )
        .expect("second update");

        let record = db.get_script(id).expect("get").expect("exists");
        assert_eq!(record.views, Some(2000));
        assert_eq!(record.likes, Some(80));
        assert_eq!(record.favorites, None);
        assert_eq!(record.avg_watch_time, None);
        assert!(record.metrics_updated_at.is_some());
    }

    #[test]
    fn counts_by_status_sum_to_total_scripts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        let saved = db
            .save_generation(
                SourceKind::Article,
                "article",
                &[topic("t", &["h1", "h2", "h3", "h4"])],
            )
            .expect("save");
        db.set_script_status(saved.script_ids[0], ScriptStatus::Queued)
            .expect("status");
        db.set_script_status(saved.script_ids[1], ScriptStatus::Recorded)
            .expect("status");
        db.set_script_url(saved.script_ids[2], "https://example.com/v/2")
            .expect("url");

        let counts = db.counts_by_status().expect("counts");
        let total: i64 = counts.values().sum();
        assert_eq!(total as usize, db.list_all_scripts().expect("list").len());
        assert_eq!(counts.get(&ScriptStatus::Uploaded), Some(&1));
    }

    #[test]
    fn metered_listings_order_by_views_descending() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        let saved = db
            .save_generation(SourceKind::Idea, "idea", &[topic("t", &["h1", "h2", "h3"])])
            .expect("save");
        for (i, views) in [500_i64, 1500, 900].iter().enumerate() {
            db.set_script_metrics(
                saved.script_ids[i],
                &MetricsUpdate {
                    views: *views,
                    ..MetricsUpdate::default()
                },
            )
            .expect("metrics");
        }

        let metered = db.list_scripts_with_metrics().expect("metered");
        let views: Vec<_> = metered.iter().map(|s| s.views.unwrap()).collect();
        assert_eq!(views, vec![1500, 900, 500]);

        let top = db.top_performers(2).expect("top");
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].views, Some(1500));
    }

    #[test]
    fn aggregates_are_idempotent_and_skip_unmetered_topics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        db.save_generation(SourceKind::Idea, "no metrics here", &[topic("cold", &["h1"])])
            .expect("save");
        let saved = db
            .save_generation(SourceKind::Idea, "idea", &[topic("warm", &["h2", "h3"])])
            .expect("save");
        db.set_script_metrics(
            saved.script_ids[0],
            &MetricsUpdate {
                views: 100,
                likes: 10,
                comments: 1,
                shares: 1,
                ..MetricsUpdate::default()
            },
        )
        .expect("metrics");

        let first = db.topic_aggregates().expect("topics");
        let second = db.topic_aggregates().expect("topics again");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].topic, "warm");
        assert_eq!(first[0].total_scripts, 2);
        assert_eq!(first[0].with_metrics, 1);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].avg_views, second[0].avg_views);

        let structures = db.structure_aggregates().expect("structures");
        assert_eq!(structures.len(), 1);
        assert_eq!(structures[0].total, 1);
    }

    #[test]
    fn hook_leaderboard_caps_at_twenty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        let hooks: Vec<String> = (0..25).map(|i| format!("hook {i}")).collect();
        let hook_refs: Vec<&str> = hooks.iter().map(String::as_str).collect();
        let saved = db
            .save_generation(SourceKind::Article, "big batch", &[topic("t", &hook_refs)])
            .expect("save");
        for (i, id) in saved.script_ids.iter().enumerate() {
            db.set_script_metrics(
                *id,
                &MetricsUpdate {
                    views: i as i64 * 10,
                    ..MetricsUpdate::default()
                },
            )
            .expect("metrics");
        }

        let leaderboard = db.hook_leaderboard().expect("leaderboard");
        assert_eq!(leaderboard.len(), 20);
        assert_eq!(leaderboard[0].views, 240);
    }

    #[test]
    fn latest_analysis_returns_most_recent_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        assert!(db.latest_analysis().expect("empty").is_none());

        let week = chrono::NaiveDate::from_ymd_opt(2026, 8, 24).expect("date");
        db.record_analysis(week, "first pass", &serde_json::json!({"n": 1}))
            .expect("first");
        let second_id = db
            .record_analysis(week, "second pass", &serde_json::json!({"n": 2}))
            .expect("second");

        let latest = db.latest_analysis().expect("latest").expect("exists");
        assert_eq!(latest.id, second_id);
        assert_eq!(latest.summary, "second pass");
        assert_eq!(latest.week_start, week);
        assert_eq!(latest.patterns["n"], 2);
    }
}
