pub mod anthropic;

use crate::errors::AppResult;
use crate::models::{GeneratedTopic, MeteredScript, PatternReport, Tone};
use async_trait::async_trait;

/// Turns raw operator text into a tree of topics with recordable script
/// variants. Implementations return the parsed tree or an external-service
/// error; they never persist anything.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate_scripts(&self, text: &str, tone: Tone) -> AppResult<Vec<GeneratedTopic>>;
}

/// Produces a pattern report from accumulated script metrics.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze_performance(&self, scripts: &[MeteredScript]) -> AppResult<PatternReport>;
}

/// The service contract promises structured-only output; this still strips
/// any accidental markdown fencing before decoding.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::strip_code_fences;

    #[test]
    fn passes_plain_json_through() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn strips_json_fence_with_language_tag() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_fence_and_surrounding_whitespace() {
        let fenced = "  ```\n[1, 2]\n```  ";
        assert_eq!(strip_code_fences(fenced), "[1, 2]");
    }

    #[test]
    fn leaves_unterminated_fence_body_intact() {
        let fenced = "```json\n{\"a\": 1}";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");
    }
}
