//! Records produced by AI rounds: [`AiResult`], selector analysis, and
//! [`AnalysisResult`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::TokenUsage;

/// An opaque message exchanged with the AI backend.
///
/// Shape is backend-defined (vendor chat messages, tool calls, ...); this
/// crate only orders and forwards them.
pub type OpaqueMessage = Value;

/// Outcome of one round with the AI backend.
///
/// A missing `result` means the round was incomplete or failed softly (for
/// example, a usage monitor refused it). `messages` is the ordered log of what
/// was exchanged to get there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResult<T> {
    /// The round's result, if it completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,

    /// Messages exchanged with the backend, in order.
    #[serde(default)]
    pub messages: Vec<OpaqueMessage>,

    /// Token usage reported by the backend for this round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl<T> AiResult<T> {
    /// A round that produced nothing.
    pub fn empty() -> Self {
        Self {
            result: None,
            messages: Vec::new(),
            usage: None,
        }
    }

    /// A completed round.
    pub fn completed(result: T, messages: Vec<OpaqueMessage>) -> Self {
        Self {
            result: Some(result),
            messages,
            usage: None,
        }
    }

    /// Attaches token usage.
    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Returns `true` if the round produced a result.
    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    /// Transforms the result, keeping messages and usage.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AiResult<U> {
        AiResult {
            result: self.result.map(f),
            messages: self.messages,
            usage: self.usage,
        }
    }
}

impl<T> Default for AiResult<T> {
    fn default() -> Self {
        Self::empty()
    }
}

// ---------------------------------------------------------------------------
// Selector analysis
// ---------------------------------------------------------------------------

/// How much confidence the analysis has in a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorValidity {
    /// Proposed from page structure but never run.
    Guess,
    /// Run against the source page and matched.
    TestedValid,
    /// Run against the source page and did not match.
    TestedFail,
}

/// A CSS selector discovered during analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorRecord {
    /// The CSS selector.
    pub selector: String,
    /// URL of the page the selector was derived from.
    pub url: String,
    /// What the selector is expected to match.
    pub description: String,
    /// Validation status.
    pub validity: SelectorValidity,
}

/// Output of the analysis pass.
///
/// Selectors keep insertion order and may repeat: the same selector string
/// found on different URLs is recorded once per URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOutput {
    /// Discovered selectors, in discovery order.
    #[serde(default)]
    pub selectors: Vec<SelectorRecord>,
    /// Free-text notes about the analysed pages.
    #[serde(default)]
    pub metadata: Vec<String>,
}

impl AnalyzeOutput {
    /// Selectors confirmed by testing.
    pub fn valid_selectors(&self) -> impl Iterator<Item = &SelectorRecord> {
        self.selectors
            .iter()
            .filter(|s| s.validity == SelectorValidity::TestedValid)
    }

    /// Selectors derived from `url`, in discovery order.
    pub fn selectors_for_url<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a SelectorRecord> {
        self.selectors.iter().filter(move |s| s.url == url)
    }
}

/// An analysis paired with the exact prompt that produced it.
///
/// Fields are private: once returned, an analysis is not modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    analysis: AnalyzeOutput,
    prompt: String,
}

impl AnalysisResult {
    /// Pairs `analysis` with the prompt text that produced it.
    pub fn new(analysis: AnalyzeOutput, prompt: impl Into<String>) -> Self {
        Self {
            analysis,
            prompt: prompt.into(),
        }
    }

    /// The analysis output.
    pub fn analysis(&self) -> &AnalyzeOutput {
        &self.analysis
    }

    /// The prompt text that produced the analysis.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(selector: &str, url: &str, validity: SelectorValidity) -> SelectorRecord {
        SelectorRecord {
            selector: selector.to_string(),
            url: url.to_string(),
            description: "price".to_string(),
            validity,
        }
    }

    #[test]
    fn duplicate_selectors_from_different_urls_are_kept_in_order() {
        let output = AnalyzeOutput {
            selectors: vec![
                record(".price", "https://a.example", SelectorValidity::TestedValid),
                record(".price", "https://b.example", SelectorValidity::Guess),
                record("#total", "https://a.example", SelectorValidity::TestedFail),
            ],
            metadata: vec!["pages are server-rendered".to_string()],
        };

        assert_eq!(output.valid_selectors().count(), 1);
        let for_a: Vec<_> = output
            .selectors_for_url("https://a.example")
            .map(|s| s.selector.as_str())
            .collect();
        assert_eq!(for_a, vec![".price", "#total"]);
    }

    #[test]
    fn validity_uses_kebab_case_tags() {
        assert_eq!(
            serde_json::to_value(SelectorValidity::TestedValid).unwrap(),
            json!("tested-valid")
        );
        assert_eq!(
            serde_json::from_value::<SelectorValidity>(json!("tested-fail")).unwrap(),
            SelectorValidity::TestedFail
        );
    }

    #[test]
    fn empty_result_signals_incomplete_round() {
        let result: AiResult<String> = AiResult::empty();
        assert!(!result.is_complete());
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({ "messages": [] }));
    }

    #[test]
    fn map_keeps_messages_and_usage() {
        let result = AiResult::completed("42".to_string(), vec![json!({ "role": "assistant" })])
            .with_usage(TokenUsage::new(3, 4));
        let mapped = result.map(|s| s.parse::<u32>().unwrap());
        assert_eq!(mapped.result, Some(42));
        assert_eq!(mapped.messages.len(), 1);
        assert_eq!(mapped.usage.unwrap().total().as_u64(), 7);
    }
}
