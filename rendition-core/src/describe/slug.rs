use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::fingerprint::Fingerprint;

pub const FALLBACK_PREFIX: &str = "generic-media";

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\p{P}\p{S}_]+").expect("valid separator pattern"));
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9-]").expect("valid charset pattern"));
static HYPHEN_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-{2,}").expect("valid hyphen pattern"));
static SLUG_GRAMMAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid slug grammar"));

/// Filename stem shared by every artifact of one input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DescriptionSlug(String);

impl DescriptionSlug {
    /// Sanitizes free text into a slug, or `None` if nothing usable remains.
    pub fn from_text(raw: &str, max_len: usize) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        let separated = SEPARATORS.replace_all(&lowered, "-");
        let ascii = DISALLOWED.replace_all(&separated, "");
        let collapsed = HYPHEN_RUNS.replace_all(&ascii, "-");
        let trimmed = collapsed.trim_matches('-');
        // Only ASCII remains, so byte slicing is on char boundaries.
        let cut = &trimmed[..trimmed.len().min(max_len)];
        let slug = cut.trim_end_matches('-');
        if SLUG_GRAMMAR.is_match(slug) {
            Some(Self(slug.to_string()))
        } else {
            None
        }
    }

    pub fn fallback(fingerprint: &Fingerprint, prefix_len: usize) -> Self {
        Self(format!("{FALLBACK_PREFIX}-{}", fingerprint.short(prefix_len.max(1))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(text: &str) -> bool {
        SLUG_GRAMMAR.is_match(text)
    }
}

impl fmt::Display for DescriptionSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
