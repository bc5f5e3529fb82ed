use super::{strip_code_fences, AnalysisService, GenerationService};
use crate::errors::{AppError, AppResult};
use crate::models::{GeneratedTopic, MeteredScript, PatternReport, Tone};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

const GENERATION_MAX_TOKENS: u32 = 4096;
const ANALYSIS_MAX_TOKENS: u32 = 2048;

const GENERATION_PROMPT: &str = r#"You are an expert at turning technical content about AI and software into short, engaging vertical-video scripts for a non-technical audience.

THE VIEWER:
- 40 to 60 years old, runs a small business or works at one
- Uses messaging apps and social media but is not technical
- Has heard of AI tools but does not know what they actually do
- Does not care how anything works inside, only what it can do for them
- Gets bored fast when they don't understand; hooks on anything concrete and useful

SIMPLIFICATION RULES:
- Never use technical jargon without an everyday analogy
- Always give one concrete, everyday example
- Each video runs 45-60 seconds at most
- Tone: like telling a friend a story over dinner

HOOK RULES (CRITICAL):
- The hook must never name a tool, product, company or technical concept
- The hook always starts from something everyday, emotional or relatable: a work situation, a common frustration, a money worry
- GOOD: "What if your best employee forgot everything every time you spoke to them?"
- BAD: "The new memory feature in this AI assistant lets you..."
- The viewer has never heard of any tool. The hook has to catch them before any technology is named.

CTA RULES:
- Every call to action must end with a "Follow me for..." promise of future value tied to the topic of that script
- Never close with "leave a comment" or "share this" - only the follow request

RESPONSE FORMAT:
Return ONLY valid JSON, no markdown, no backticks, no extra prose, with this structure:
{
  "topics": [
    {
      "name": "short topic name",
      "description": "what it covers, one sentence",
      "scripts": [
        {
          "structure": "name of the script structure used",
          "hook": "the first 3 seconds, 15 words maximum",
          "body": "the video body: simple explanation with an analogy",
          "cta": "always 'Follow me for [promise of value tied to the topic]'",
          "duration": "30s / 45s / 60s",
          "visual_format": "talking head / screen + voiceover / animated text",
          "angle": "what makes this script different from the others on the same topic"
        }
      ]
    }
  ]
}

EXTRACTION INSTRUCTIONS:
1. Identify every independent topic or idea in the content. A long article may hold 5-8 topics; a tweet 1-3.
2. For each topic, produce 2 to 4 scripts with genuinely different structures and angles.
3. Each script must stand alone as an independent video.
4. Analogies must differ between scripts on the same topic.
5. Every CTA ends with "Follow me for..." plus a topic-related promise."#;

const SMALL_BUSINESS_ADDENDUM: &str = r#"

TONE ADJUSTMENT - SMALL BUSINESS OWNER:
- Beyond the everyday viewer, write for someone who owns a business and wants efficiency
- Lean on saved time, saved money and competitive advantage
- Use business examples: "imagine you run a hardware store...", "if you have an accounting practice..."
- The CTA may promise things like "Follow me so your business runs itself""#;

const ANALYSIS_PROMPT: &str = r#"You are a short-video content analyst. You will receive performance data for videos that follow different script structures, hooks and topics.

Your job:
1. Identify clear patterns: which structures, hooks and topics perform best and worst
2. Give concrete, actionable recommendations
3. Be brutally honest - if something is not working, say so

RESPONSE FORMAT:
Return ONLY valid JSON:
{
  "summary": "executive summary in 2-3 sentences",
  "patterns": [
    {
      "category": "structure|hook|topic|timing",
      "finding": "what you discovered",
      "evidence": "the numbers backing it",
      "action": "what to do about it"
    }
  ],
  "top_recommendations": [
    "concrete recommendation 1",
    "concrete recommendation 2",
    "concrete recommendation 3"
  ],
  "avoid": ["what to stop doing 1", "what to stop doing 2"],
  "prompt_adjustments": ["suggested tweaks to the script generation prompt"]
}"#;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct GenerationPayload {
    #[serde(default)]
    topics: Vec<GeneratedTopic>,
}

/// Anthropic Messages API client backing both service seams. One plain
/// request/response call per operation; no retries, no streaming.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> AppResult<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .http
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "model API returned {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");
        Ok(text)
    }
}

#[async_trait]
impl GenerationService for AnthropicClient {
    async fn generate_scripts(&self, text: &str, tone: Tone) -> AppResult<Vec<GeneratedTopic>> {
        let system = match tone {
            Tone::Casual => GENERATION_PROMPT.to_string(),
            Tone::SmallBusiness => format!("{GENERATION_PROMPT}{SMALL_BUSINESS_ADDENDUM}"),
        };
        let user = format!(
            "Content to process:\n\n{text}\n\nExtract every topic, produce multiple angles per topic, and write the scripts ready to record. Respond ONLY with valid JSON."
        );

        let raw = self.complete(&system, &user, GENERATION_MAX_TOKENS).await?;
        let payload = parse_generation_payload(&raw)?;
        Ok(payload)
    }
}

#[async_trait]
impl AnalysisService for AnthropicClient {
    async fn analyze_performance(&self, scripts: &[MeteredScript]) -> AppResult<PatternReport> {
        let data = serde_json::to_string_pretty(scripts)?;
        let user = format!(
            "Here is the performance data for my videos:\n\n{data}\n\nAnalyze the patterns and give me recommendations. Respond ONLY with valid JSON."
        );

        let raw = self.complete(ANALYSIS_PROMPT, &user, ANALYSIS_MAX_TOKENS).await?;
        parse_analysis_payload(&raw)
    }
}

fn parse_generation_payload(raw: &str) -> AppResult<Vec<GeneratedTopic>> {
    let clean = strip_code_fences(raw);
    let payload: GenerationPayload = serde_json::from_str(clean).map_err(|err| {
        AppError::ExternalService(format!("generation response did not parse: {err}"))
    })?;
    Ok(payload.topics)
}

fn parse_analysis_payload(raw: &str) -> AppResult<PatternReport> {
    let clean = strip_code_fences(raw);
    serde_json::from_str(clean).map_err(|err| {
        AppError::ExternalService(format!("analysis response did not parse: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_analysis_payload, parse_generation_payload};
    use crate::errors::AppError;

    #[test]
    fn generation_payload_parses_with_fences() {
        let raw = r#"```json
{
  "topics": [
    {
      "name": "automation",
      "description": "letting software do the boring part",
      "scripts": [
        {
          "structure": "question",
          "hook": "How many hours did you lose this week?",
          "body": "body",
          "cta": "Follow me for more ways to work less",
          "duration": "45s",
          "visual_format": "talking head",
          "angle": "time cost"
        }
      ]
    }
  ]
}
```"#;
        let topics = parse_generation_payload(raw).expect("parse");
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].scripts.len(), 1);
        assert_eq!(topics[0].scripts[0].duration, "45s");
    }

    #[test]
    fn generation_payload_rejects_prose() {
        let err = parse_generation_payload("Sure! Here are your scripts.").unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
    }

    #[test]
    fn analysis_payload_fills_missing_lists() {
        let raw = r#"{"summary": "too little data to say much"}"#;
        let report = parse_analysis_payload(raw).expect("parse");
        assert_eq!(report.summary, "too little data to say much");
        assert!(report.patterns.is_empty());
        assert!(report.prompt_adjustments.is_empty());
    }
}
