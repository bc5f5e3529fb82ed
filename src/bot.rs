use crate::errors::{AppError, AppResult};
use crate::models::{
    IntakeOutcome, MetricsUpdate, PatternReport, ScriptRecord, ScriptStatus, Tone,
};
use crate::pipeline::Pipeline;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const POLL_TIMEOUT_SECS: u64 = 30;
const LIST_PREVIEW_LIMIT: usize = 20;
// Telegram rejects messages over 4096 characters; split a little earlier.
const MESSAGE_SPLIT_AT: usize = 4000;

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Document {
    file_id: String,
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    data: Option<String>,
    message: Option<Box<Message>>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

/// Thin client for the Telegram Bot API. Long-polling only; the original
/// webhook mode is not carried over.
struct TelegramApi {
    http: reqwest::Client,
    api_base: String,
    file_base: String,
}

impl TelegramApi {
    fn new(token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: format!("https://api.telegram.org/bot{token}"),
            file_base: format!("https://api.telegram.org/file/bot{token}"),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> AppResult<T> {
        let response = self
            .http
            .post(format!("{}/{method}", self.api_base))
            .json(&payload)
            .send()
            .await?;
        let envelope: ApiEnvelope<T> = response.json().await?;
        if !envelope.ok {
            return Err(AppError::ExternalService(format!(
                "telegram {method} failed: {}",
                envelope.description.unwrap_or_default()
            )));
        }
        envelope.result.ok_or_else(|| {
            AppError::ExternalService(format!("telegram {method} returned no result"))
        })
    }

    async fn get_updates(&self, offset: i64) -> AppResult<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({ "offset": offset, "timeout": POLL_TIMEOUT_SECS }),
        )
        .await
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> AppResult<()> {
        for chunk in split_message(text) {
            let _: serde_json::Value = self
                .call(
                    "sendMessage",
                    json!({ "chat_id": chat_id, "text": chunk, "parse_mode": "Markdown" }),
                )
                .await?;
        }
        Ok(())
    }

    async fn send_message_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: serde_json::Value,
    ) -> AppResult<()> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "Markdown",
                    "reply_markup": { "inline_keyboard": keyboard },
                }),
            )
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> AppResult<()> {
        let mut payload = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }
        let _: serde_json::Value = self.call("answerCallbackQuery", payload).await?;
        Ok(())
    }

    async fn download_document(&self, file_id: &str) -> AppResult<Vec<u8>> {
        let info: FileInfo = self.call("getFile", json!({ "file_id": file_id })).await?;
        let path = info.file_path.ok_or_else(|| {
            AppError::ExternalService("telegram getFile returned no path".to_string())
        })?;
        let bytes = self
            .http
            .get(format!("{}/{path}", self.file_base))
            .send()
            .await?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

/// Operator-facing chat surface. One update handled to completion at a
/// time, matching the single-writer model of the rest of the system.
pub struct Bot {
    api: TelegramApi,
    pipeline: Arc<Pipeline>,
    allowed_user: Option<i64>,
    dashboard_url: String,
}

impl Bot {
    pub fn new(
        token: &str,
        pipeline: Arc<Pipeline>,
        allowed_user: Option<i64>,
        dashboard_url: String,
    ) -> Self {
        Self {
            api: TelegramApi::new(token),
            pipeline,
            allowed_user,
            dashboard_url,
        }
    }

    pub async fn run(self) {
        tracing::info!("bot polling for updates");
        let mut offset = 0i64;
        loop {
            match self.api.get_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Err(error) = self.handle_update(update).await {
                            tracing::warn!(error = %error, "update handling failed");
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(error = %error, "getUpdates failed, backing off");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    fn authorized(&self, user: Option<i64>) -> bool {
        match (self.allowed_user, user) {
            (Some(allowed), Some(sender)) => allowed == sender,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    async fn handle_update(&self, update: Update) -> AppResult<()> {
        if let Some(message) = update.message {
            let sender = message.from.as_ref().map(|user| user.id);
            if !self.authorized(sender) {
                return self.api.send_message(message.chat.id, "Not authorized.").await;
            }
            return self.handle_message(message).await;
        }

        if let Some(callback) = update.callback_query {
            if !self.authorized(Some(callback.from.id)) {
                return self.api.answer_callback(&callback.id, Some("Not authorized")).await;
            }
            return self.handle_callback(callback).await;
        }

        Ok(())
    }

    async fn handle_message(&self, message: Message) -> AppResult<()> {
        let chat_id = message.chat.id;

        if let Some(document) = message.document {
            return self.handle_csv_upload(chat_id, document).await;
        }

        let Some(text) = message.text else {
            return Ok(());
        };

        if let Some(rest) = text.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            let command = parts.next().unwrap_or_default();
            let args: Vec<&str> = parts.collect();
            return self.handle_command(chat_id, command, &args).await;
        }

        self.handle_intake(chat_id, &text).await
    }

    async fn handle_command(&self, chat_id: i64, command: &str, args: &[&str]) -> AppResult<()> {
        match command {
            "start" => self.api.send_message(chat_id, HELP_TEXT).await,
            "stats" => {
                let counts = self.pipeline.counts_by_status()?;
                let get = |status: ScriptStatus| counts.get(&status).copied().unwrap_or(0);
                let total: i64 = counts.values().sum();
                let text = format!(
                    "*Content pipeline*\n\n\
                     Pending: {}\nQueued: {}\nRecorded: {}\nUploaded: {}\n\
                     ---------------\nTotal: {} scripts",
                    get(ScriptStatus::Pending),
                    get(ScriptStatus::Queued),
                    get(ScriptStatus::Recorded),
                    get(ScriptStatus::Uploaded),
                    total,
                );
                self.api.send_message(chat_id, &text).await
            }
            "pending" => self.send_script_list(chat_id, ScriptStatus::Pending, "Pending").await,
            "queue" => self.send_script_list(chat_id, ScriptStatus::Queued, "Queued").await,
            "recorded" => self.send_script_list(chat_id, ScriptStatus::Recorded, "Recorded").await,
            "uploaded" => self.send_script_list(chat_id, ScriptStatus::Uploaded, "Uploaded").await,
            "dashboard" => {
                self.api
                    .send_message(chat_id, &format!("Your dashboard: {}", self.dashboard_url))
                    .await
            }
            "analyze" => self.handle_analyze(chat_id).await,
            "metrics" => self.handle_metrics_command(chat_id, args).await,
            "url" => self.handle_url_command(chat_id, args).await,
            _ => {
                self.api
                    .send_message(chat_id, "Unknown command. Send /start for the list.")
                    .await
            }
        }
    }

    async fn handle_intake(&self, chat_id: i64, text: &str) -> AppResult<()> {
        self.api
            .send_message(chat_id, "Processing... generating scripts.")
            .await?;

        match self.pipeline.intake(text, Tone::default()).await {
            Ok(outcome) => self.send_intake_results(chat_id, outcome).await,
            Err(error) => {
                tracing::warn!(error = %error, "intake failed");
                self.api
                    .send_message(
                        chat_id,
                        "Could not generate scripts from that content. Try different text.",
                    )
                    .await
            }
        }
    }

    async fn send_intake_results(&self, chat_id: i64, outcome: IntakeOutcome) -> AppResult<()> {
        let total_scripts = outcome.script_ids.len();
        self.api
            .send_message(
                chat_id,
                &format!(
                    "*{} topics* -> *{} scripts* generated\n\nSource saved as #{}",
                    outcome.topics.len(),
                    total_scripts,
                    outcome.source_id
                ),
            )
            .await?;

        let mut script_index = 0usize;
        for topic in &outcome.topics {
            let mut text = format!("*{}*\n{}\n\n", topic.name, topic.description);
            let mut buttons = Vec::new();
            for script in &topic.scripts {
                let id = outcome.script_ids[script_index];
                script_index += 1;
                text.push_str(&format!(
                    "---------------\n*{}*\n{} | {}\n\n",
                    script.hook, script.structure, script.duration
                ));
                buttons.push(json!([
                    { "text": format!("View #{id}"), "callback_data": format!("view:{id}") },
                    { "text": "Queue", "callback_data": format!("status:{id}:queued") },
                ]));
            }
            self.api
                .send_message_with_keyboard(chat_id, &text, json!(buttons))
                .await?;
        }
        Ok(())
    }

    async fn handle_analyze(&self, chat_id: i64) -> AppResult<()> {
        self.api
            .send_message(chat_id, "Analyzing performance... give me a moment.")
            .await?;

        match self.pipeline.run_analysis().await {
            Ok(report) => {
                self.api
                    .send_message(chat_id, &format_report(&report))
                    .await
            }
            Err(AppError::Validation(message)) => self.api.send_message(chat_id, &message).await,
            Err(error) => {
                tracing::warn!(error = %error, "analysis failed");
                self.api
                    .send_message(chat_id, "Analysis failed. Try again.")
                    .await
            }
        }
    }

    async fn handle_metrics_command(&self, chat_id: i64, args: &[&str]) -> AppResult<()> {
        let parsed = parse_metrics_args(args);
        let (script_id, update) = match parsed {
            Ok(values) => values,
            Err(_) => {
                return self
                    .api
                    .send_message(
                        chat_id,
                        "Format: `/metrics ID views likes comments shares`\n\
                         Optional: `/metrics ID views likes comments shares avg_watch_sec full_watch_pct`",
                    )
                    .await;
            }
        };

        match self.pipeline.record_metrics(script_id, update) {
            Ok(summary) => {
                let mut text = format!(
                    "Metrics saved for script #{}\n\n\
                     {} views\n{} likes\n{} comments\n{} shares\n\
                     Engagement: {:.1}%",
                    summary.script_id,
                    update.views,
                    update.likes,
                    update.comments,
                    update.shares,
                    summary.engagement_pct,
                );
                if let Some(avg) = update.avg_watch_time {
                    text.push_str(&format!("\nWatch time: {avg}s"));
                }
                if let Some(rate) = update.full_watch_rate {
                    text.push_str(&format!("\nFull watch: {rate}%"));
                }
                self.api.send_message(chat_id, &text).await
            }
            Err(AppError::NotFound(message)) | Err(AppError::Validation(message)) => {
                self.api.send_message(chat_id, &message).await
            }
            Err(error) => Err(error),
        }
    }

    async fn handle_url_command(&self, chat_id: i64, args: &[&str]) -> AppResult<()> {
        let parsed = match args {
            [id, url] => id.parse::<i64>().ok().map(|id| (id, *url)),
            _ => None,
        };
        let Some((script_id, url)) = parsed else {
            return self
                .api
                .send_message(chat_id, "Format: `/url ID https://...`")
                .await;
        };

        match self.pipeline.set_url(script_id, url) {
            Ok(()) => {
                self.api
                    .send_message(
                        chat_id,
                        &format!("URL saved. Script #{script_id} is now uploaded."),
                    )
                    .await
            }
            Err(AppError::Validation(message)) => self.api.send_message(chat_id, &message).await,
            Err(error) => Err(error),
        }
    }

    async fn handle_csv_upload(&self, chat_id: i64, document: Document) -> AppResult<()> {
        let is_csv = document
            .file_name
            .as_deref()
            .is_some_and(|name| name.ends_with(".csv"));
        if !is_csv {
            return self
                .api
                .send_message(chat_id, "Only CSV analytics exports are supported.")
                .await;
        }

        self.api.send_message(chat_id, "Processing analytics CSV...").await?;

        let bytes = self.api.download_document(&document.file_id).await?;
        match self.pipeline.import_metrics_csv(&bytes) {
            Ok(summary) => {
                let tail = if summary.unmatched > 0 {
                    "For unmatched rows, make sure each uploaded script has its published URL set."
                } else {
                    "All matched. Use /analyze to look for patterns."
                };
                self.api
                    .send_message(
                        chat_id,
                        &format!(
                            "CSV processed:\n\n{} videos matched to scripts\n{} videos with no matching script\n\n{tail}",
                            summary.matched, summary.unmatched
                        ),
                    )
                    .await
            }
            Err(AppError::Validation(message)) => self.api.send_message(chat_id, &message).await,
            Err(error) => {
                tracing::warn!(error = %error, "csv import failed");
                self.api
                    .send_message(chat_id, "Could not process that CSV.")
                    .await
            }
        }
    }

    async fn handle_callback(&self, callback: CallbackQuery) -> AppResult<()> {
        let Some(data) = callback.data.as_deref() else {
            return self.api.answer_callback(&callback.id, None).await;
        };
        let chat_id = callback.message.as_ref().map(|message| message.chat.id);

        if let Some(rest) = data.strip_prefix("status:") {
            let mut parts = rest.splitn(2, ':');
            let id = parts.next().and_then(|raw| raw.parse::<i64>().ok());
            let status = parts.next().and_then(ScriptStatus::parse);
            if let (Some(id), Some(status)) = (id, status) {
                self.pipeline.set_status(id, status)?;
                return self
                    .api
                    .answer_callback(&callback.id, Some(&format!("Moved to {}", status.as_str())))
                    .await;
            }
            return self.api.answer_callback(&callback.id, Some("Bad request")).await;
        }

        if let Some(raw_id) = data.strip_prefix("view:") {
            let script = raw_id
                .parse::<i64>()
                .ok()
                .and_then(|id| self.pipeline.script(id).transpose())
                .transpose()?;
            let Some(script) = script else {
                return self.api.answer_callback(&callback.id, Some("Not found")).await;
            };

            self.api.answer_callback(&callback.id, None).await?;
            if let Some(chat_id) = chat_id {
                self.api
                    .send_message_with_keyboard(
                        chat_id,
                        &format_script_detail(&script),
                        status_keyboard(script.id, script.status),
                    )
                    .await?;
            }
            return Ok(());
        }

        if let Some(raw_id) = data.strip_prefix("metrics:") {
            self.api.answer_callback(&callback.id, None).await?;
            if let (Some(chat_id), Ok(id)) = (chat_id, raw_id.parse::<i64>()) {
                self.api
                    .send_message(
                        chat_id,
                        &format!(
                            "*Enter metrics for script #{id}*\n\n\
                             Send the numbers in this format:\n\
                             `/metrics {id} views likes comments shares`\n\n\
                             Example:\n`/metrics {id} 15000 450 23 12`"
                        ),
                    )
                    .await?;
            }
            return Ok(());
        }

        self.api.answer_callback(&callback.id, None).await
    }

    async fn send_script_list(
        &self,
        chat_id: i64,
        status: ScriptStatus,
        title: &str,
    ) -> AppResult<()> {
        let scripts = self.pipeline.scripts(Some(status))?;
        if scripts.is_empty() {
            return self
                .api
                .send_message(chat_id, &format!("{title}: no scripts in this state."))
                .await;
        }

        let mut text = format!("{title} ({}):\n\n", scripts.len());
        let mut buttons = Vec::new();
        for script in scripts.iter().take(LIST_PREVIEW_LIMIT) {
            let hook: String = script.hook.chars().take(50).collect();
            text.push_str(&format!("#{} - {hook}...\n", script.id));
            buttons.push(json!([
                { "text": format!("View #{}", script.id), "callback_data": format!("view:{}", script.id) },
            ]));
        }
        if scripts.len() > LIST_PREVIEW_LIMIT {
            text.push_str(&format!(
                "\n...and {} more. Check the dashboard for the full list.",
                scripts.len() - LIST_PREVIEW_LIMIT
            ));
        }

        self.api
            .send_message_with_keyboard(chat_id, &text, json!(buttons))
            .await
    }
}

const HELP_TEXT: &str = "*Content Factory*\n\n\
Send me any of these and I will generate scripts:\n\n\
- A tweet or thread (paste the text)\n\
- An article (paste the text)\n\
- A loose idea\n\n\
*Commands:*\n\
/pending - Scripts waiting for review\n\
/queue - Scripts queued to record\n\
/recorded - Recorded scripts\n\
/uploaded - Uploaded scripts\n\
/stats - Pipeline summary\n\
/metrics - Enter performance numbers\n\
/url - Attach a published URL\n\
/analyze - AI performance analysis\n\
/dashboard - Web dashboard link";

fn parse_metrics_args(args: &[&str]) -> Result<(i64, MetricsUpdate), ()> {
    if args.len() < 5 || args.len() > 7 {
        return Err(());
    }
    let script_id = args[0].parse::<i64>().map_err(|_| ())?;
    let views = args[1].parse::<i64>().map_err(|_| ())?;
    let likes = args[2].parse::<i64>().map_err(|_| ())?;
    let comments = args[3].parse::<i64>().map_err(|_| ())?;
    let shares = args[4].parse::<i64>().map_err(|_| ())?;
    let avg_watch_time = match args.get(5) {
        Some(raw) => Some(raw.parse::<f64>().map_err(|_| ())?),
        None => None,
    };
    let full_watch_rate = match args.get(6) {
        Some(raw) => Some(raw.parse::<f64>().map_err(|_| ())?),
        None => None,
    };

    Ok((
        script_id,
        MetricsUpdate {
            views,
            likes,
            comments,
            shares,
            favorites: None,
            avg_watch_time,
            full_watch_rate,
        },
    ))
}

fn status_keyboard(script_id: i64, current: ScriptStatus) -> serde_json::Value {
    let labels = [
        (ScriptStatus::Pending, "Pending"),
        (ScriptStatus::Queued, "Queue"),
        (ScriptStatus::Recorded, "Recorded"),
        (ScriptStatus::Uploaded, "Uploaded"),
    ];
    let row: Vec<serde_json::Value> = labels
        .iter()
        .filter(|(status, _)| *status != current)
        .map(|(status, label)| {
            json!({
                "text": label,
                "callback_data": format!("status:{script_id}:{}", status.as_str()),
            })
        })
        .collect();

    let mut rows = vec![json!(row)];
    if current == ScriptStatus::Uploaded {
        rows.push(json!([
            { "text": "Enter metrics", "callback_data": format!("metrics:{script_id}") },
        ]));
    }
    json!(rows)
}

fn format_script_detail(script: &ScriptRecord) -> String {
    format!(
        "*Script #{}*\n{}\n{}\n\n*HOOK:*\n{}\n\n*BODY:*\n{}\n\n*CTA:*\n{}\n\n{} | {}\nAngle: {}",
        script.id,
        script.topic_name,
        script.structure,
        script.hook,
        script.body,
        script.cta,
        script.duration.as_deref().unwrap_or("-"),
        script.visual_format.as_deref().unwrap_or("-"),
        script.angle.as_deref().unwrap_or("-"),
    )
}

fn format_report(report: &PatternReport) -> String {
    let mut text = format!("*Performance analysis*\n\n{}\n\n", report.summary);

    text.push_str("*Patterns:*\n");
    for pattern in &report.patterns {
        text.push_str(&format!(
            "\n- *{}*: {}\n  Evidence: {}\n  Action: {}\n",
            pattern.category, pattern.finding, pattern.evidence, pattern.action
        ));
    }

    text.push_str("\n*Top 3 recommendations:*\n");
    for recommendation in &report.top_recommendations {
        text.push_str(&format!("- {recommendation}\n"));
    }

    if !report.avoid.is_empty() {
        text.push_str("\n*Avoid:*\n");
        for item in &report.avoid {
            text.push_str(&format!("- {item}\n"));
        }
    }

    text
}

fn split_message(text: &str) -> Vec<&str> {
    if text.len() <= MESSAGE_SPLIT_AT {
        return vec![text];
    }
    // Prefer the last newline before the limit; fall back to the nearest
    // char boundary so multi-byte text never splits mid-character.
    let mut cut = text.as_bytes()[..MESSAGE_SPLIT_AT]
        .iter()
        .rposition(|&byte| byte == b'\n')
        .filter(|&position| position > 0)
        .unwrap_or(MESSAGE_SPLIT_AT);
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let (head, tail) = text.split_at(cut);
    let mut parts = vec![head];
    parts.extend(split_message(tail));
    parts
}
