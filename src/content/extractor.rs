//! Fragment extraction: hook, script and call-to-action

use super::{ContentType, Fragment};
use crate::catalog::VideoRecord;
use crate::error::{BrainError, Result};
use regex::Regex;

/// Number of script tokens used as a hook when none is given
pub const HOOK_TOKEN_LIMIT: usize = 20;

/// Trailing script lines inspected for a call-to-action
const CTA_TAIL_LINES: usize = 2;

/// Call-to-action keywords (English, Spanish, Portuguese, French)
pub const DEFAULT_CTA_KEYWORDS: &[&str] = &[
    "follow",
    "follows",
    "following",
    "comment",
    "comments",
    "link",
    "subscribe",
    "like",
    "likes",
    "save",
    "share",
    "sígueme",
    "sigueme",
    "síguenos",
    "segue",
    "siga",
    "abonne",
    "abonnez",
    "abonnez-vous",
    "comenta",
    "comente",
    "commente",
    "commentez",
    "suscríbete",
    "suscribete",
    "inscreva",
    "inscreva-se",
    "enlace",
    "lien",
    "guarda",
    "salva",
    "partage",
    "comparte",
    "compartilhe",
];

/// Turns a raw video record into zero to three text fragments
pub struct ContentExtractor {
    cta_pattern: Regex,
}

impl ContentExtractor {
    /// Extractor with the built-in keyword list
    pub fn new() -> Result<Self> {
        Self::with_keywords(DEFAULT_CTA_KEYWORDS)
    }

    /// Extractor with a custom list of call-to-action keywords
    pub fn with_keywords(keywords: &[&str]) -> Result<Self> {
        if keywords.is_empty() {
            return Err(BrainError::validation(
                "cta_keywords",
                "At least one call-to-action keyword is required",
            ));
        }

        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let cta_pattern = Regex::new(&format!(r"(?i)(?:^|[^\w])(?:{})(?:[^\w]|$)", alternation))
            .map_err(|e| BrainError::Config(format!("Invalid CTA keyword pattern: {}", e)))?;

        Ok(Self { cta_pattern })
    }

    /// Extract the fragments of a video. No usable text yields an empty list.
    pub fn extract(&self, video: &VideoRecord) -> Vec<Fragment> {
        let script = clean(video.script.as_deref());
        let mut fragments = Vec::with_capacity(3);

        let hook = clean(video.hook.as_deref())
            .map(str::to_string)
            .or_else(|| script.map(leading_tokens));
        if let Some(text) = hook {
            fragments.push(Fragment {
                content_type: ContentType::Hook,
                text,
            });
        }

        if let Some(text) = script {
            fragments.push(Fragment {
                content_type: ContentType::Script,
                text: text.to_string(),
            });
        }

        let cta = clean(video.cta.as_deref())
            .map(|s| s.to_string())
            .or_else(|| script.and_then(|s| self.trailing_cta(s)));
        if let Some(text) = cta {
            fragments.push(Fragment {
                content_type: ContentType::Cta,
                text,
            });
        }

        fragments
    }

    /// Whether a line reads as a call-to-action
    pub fn is_cta(&self, line: &str) -> bool {
        self.cta_pattern.is_match(line)
    }

    fn trailing_cta(&self, script: &str) -> Option<String> {
        let lines: Vec<&str> = script
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let tail = &lines[lines.len().saturating_sub(CTA_TAIL_LINES)..];

        // Keep from the first CTA line to the end so the action reads whole
        let start = tail.iter().position(|line| self.is_cta(line))?;
        Some(tail[start..].join("\n"))
    }
}

fn clean(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|s| !s.is_empty())
}

fn leading_tokens(script: &str) -> String {
    script
        .split_whitespace()
        .take(HOOK_TOKEN_LIMIT)
        .collect::<Vec<_>>()
        .join(" ")
}
