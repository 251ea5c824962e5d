use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Shown when a stream fails without a usable server message.
pub const DEFAULT_ERROR_TEXT: &str =
    "An error occurred. Please try again. If the problem persists, please contact the site administrator.";

const INNER_ERROR_CUE: &str = r"{\'error\': {\'message\': ";

const CONTENT_FILTER_TEXT: &str = "The prompt was filtered due to triggering Azure OpenAI’s content filtering system.\nReason: This prompt contains content flagged as ";
const CONTENT_FILTER_FOOTER: &str =
    "\n\nPlease modify your prompt and retry. Learn more: https://go.microsoft.com/fwlink/?linkid=2198766";

static INNER_ERROR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"'innererror': (\{.*\})\}\}").ok());
static PY_TRUE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\bTrue\b").ok());
static PY_FALSE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\bFalse\b").ok());

#[derive(Debug, Deserialize)]
struct InnerError {
    content_filter_result: ContentFilterResult,
}

#[derive(Debug, Deserialize)]
struct ContentFilterResult {
    #[serde(default)]
    jailbreak: Option<FilterVerdict>,
}

#[derive(Debug, Deserialize)]
struct FilterVerdict {
    #[serde(default)]
    filtered: bool,
}

/// Rewrites raw backend error text into something fit for the chat stream.
///
/// Python-repr wrapped errors are unwrapped behind their status-code prefix, and
/// content-filter rejections are replaced by a fixed explanation.
pub fn parse_error_message(raw: &str) -> String {
    let mut message = raw.to_string();

    if let Some(cue_at) = raw.find(INNER_ERROR_CUE) {
        let code_prefix = raw.find('-').map(|dash| &raw[..=dash]).unwrap_or_default();
        let inner = &raw[cue_at..];
        let inner = inner.strip_suffix("'}}").unwrap_or(inner);
        message = format!("{code_prefix} {}", inner.replace(r"\'", "'"));
    }

    content_filter_text(&message).unwrap_or(message)
}

fn content_filter_text(message: &str) -> Option<String> {
    let captures = INNER_ERROR.as_ref()?.captures(message)?;
    let quoted = captures.get(1)?.as_str().replace('\'', "\"");
    let quoted = PY_TRUE.as_ref()?.replace_all(&quoted, "true");
    let quoted = PY_FALSE.as_ref()?.replace_all(&quoted, "false");

    let inner = match serde_json::from_str::<InnerError>(&quoted) {
        Ok(inner) => inner,
        Err(error) => {
            tracing::warn!(error = %error, "failed to decode inner error payload");
            return None;
        }
    };

    inner
        .content_filter_result
        .jailbreak
        .filter(|verdict| verdict.filtered)
        .map(|_| format!("{CONTENT_FILTER_TEXT}Jailbreak{CONTENT_FILTER_FOOTER}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_messages_pass_through() {
        assert_eq!(parse_error_message("Service unavailable"), "Service unavailable");
    }

    #[test]
    fn python_repr_inner_error_is_unwrapped_behind_code_prefix() {
        let raw = r"429 - {\'error\': {\'message\': \'Rate limit reached\'}}";
        assert_eq!(
            parse_error_message(raw),
            r"429 - {'error': {'message': 'Rate limit reached\"
        );
    }

    #[test]
    fn jailbreak_filter_is_explained() {
        let raw = "400 - {'error': {'message': 'filtered', 'innererror': {'code': 'ResponsibleAIPolicyViolation', 'content_filter_result': {'jailbreak': {'filtered': True, 'detected': True}, 'hate': {'filtered': False}}}}}";

        let text = parse_error_message(raw);
        assert!(text.starts_with("The prompt was filtered due to triggering Azure OpenAI’s content filtering system."));
        assert!(text.contains("flagged as Jailbreak"));
    }

    #[test]
    fn unfiltered_inner_error_keeps_original_text() {
        let raw = "400 - {'error': {'message': 'x', 'innererror': {'content_filter_result': {'jailbreak': {'filtered': False}}}}}";
        assert_eq!(parse_error_message(raw), raw);
    }
}
