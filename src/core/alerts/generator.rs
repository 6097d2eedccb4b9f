// Alert content generation seam.
//
// The engine asks an external generator for display/speech text and falls
// back to the message catalog whenever the generator is missing or fails.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use super::messages::MessageCatalog;
use super::model::{AlertKind, AlertPriority};
use crate::core::model::{CrossingEvent, RainfallBucket};

/// Ratio of the limit past which a sentence break is preferred over a hard cut.
const SENTENCE_BREAK_RATIO: f64 = 0.7;

lazy_static! {
    static ref NON_SPEECH: Regex = Regex::new(r"[\p{So}\p{Sk}\p{Co}\x{FE0F}\x{200D}*_`#~]+").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("content generator is unavailable")]
    Unavailable,
    #[error("content generation failed: {0}")]
    Failed(String),
    #[error("generator returned no display text")]
    Empty,
}

/// Everything a generator gets to work with.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub kind: AlertKind,
    pub location: String,
    pub rainfall: f64,
    /// Bucket before the crossing (`None` for location changes)
    pub from_bucket: Option<RainfallBucket>,
    pub to_bucket: RainfallBucket,
    pub severity: AlertPriority,
    pub crossing: Option<CrossingEvent>,
}

/// Generator output.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContent {
    pub display_text: String,
    /// Shorter speech-friendly text; derived from `display_text` when empty
    pub speech_text: String,
    pub severity: AlertPriority,
    pub source_references: Vec<String>,
}

/// External producer of alert text (LLM-backed or templated).
pub trait AlertContentGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool {
        true
    }

    /// May block (network-bound generators); callers decide where it runs.
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GeneratorError>;
}

/// Catalog-driven generator that annotates messages with the crossing detail.
pub struct TemplateGenerator {
    catalog: MessageCatalog,
    speech_max_len: usize,
}

impl TemplateGenerator {
    pub fn new(catalog: MessageCatalog, speech_max_len: usize) -> Self {
        Self {
            catalog,
            speech_max_len,
        }
    }
}

impl AlertContentGenerator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GeneratorError> {
        let message = self.catalog.render(
            request.kind,
            &request.location,
            request.rainfall,
            request.to_bucket,
            request.crossing.as_ref(),
        );
        let display_text = match &request.crossing {
            Some(c) => format!(
                "{} ({:.0}mm, {} through {:.0}mm)",
                message,
                request.rainfall,
                c.direction.label(),
                c.crossed_threshold
            ),
            None => message.clone(),
        };
        Ok(GeneratedContent {
            speech_text: derive_speech_text(&message, request.severity, self.speech_max_len),
            display_text,
            severity: request.severity,
            source_references: vec![format!("catalog:{}", request.location)],
        })
    }
}

/// Speech form of display text: markup stripped, truncated, priority prefixed.
pub fn derive_speech_text(display_text: &str, priority: AlertPriority, max_len: usize) -> String {
    let cleaned = NON_SPEECH.replace_all(display_text, " ");
    let cleaned = WHITESPACE.replace_all(cleaned.trim(), " ");
    format!("{}{}", priority.speech_prefix(), truncate_for_speech(&cleaned, max_len))
}

fn truncate_for_speech(text: &str, max_len: usize) -> &str {
    let Some((cut, _)) = text.char_indices().nth(max_len) else {
        return text;
    };
    let truncated = &text[..cut];
    let min_break = (max_len as f64 * SENTENCE_BREAK_RATIO) as usize;
    match truncated.rfind('.') {
        Some(pos) if truncated[..pos].chars().count() > min_break => &truncated[..=pos],
        _ => truncated.trim_end(),
    }
}
