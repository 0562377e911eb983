//! Emotion markers in text to speak
//!
//! Text may open with `(emotion)`, e.g. `(happy)Hello there` or `(开心)你好`.
//! A recognized marker is stripped and selects the emotion tag; anything
//! else leaves the text untouched and keeps the default emotion.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Leading `(marker)text`
static MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(([^)]+)\)(.+)$").expect("valid regex"));

/// Built-in marker aliases
const BUILTIN: &[(&str, &str)] = &[
    ("happy", "happy"),
    ("sad", "sad"),
    ("angry", "angry"),
    ("fear", "fear"),
    ("neutral", "neutral"),
    ("excited", "excited"),
    ("coldness", "coldness"),
    ("开心", "happy"),
    ("高兴", "happy"),
    ("快乐", "happy"),
    ("悲伤", "sad"),
    ("伤心", "sad"),
    ("难过", "sad"),
    ("愤怒", "angry"),
    ("生气", "angry"),
    ("恐惧", "fear"),
    ("害怕", "fear"),
    ("惊讶", "excited"),
    ("惊喜", "excited"),
    ("平静", "neutral"),
    ("中性", "neutral"),
    ("冷漠", "coldness"),
];

/// Text with its emotion marker resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedText {
    /// Text to synthesize
    pub text: String,
    /// Emotion tag to request
    pub emotion: String,
}

/// Marker alias table
#[derive(Debug, Clone)]
pub struct EmotionMap {
    aliases: HashMap<String, String>,
}

impl Default for EmotionMap {
    fn default() -> Self {
        Self {
            aliases: BUILTIN
                .iter()
                .map(|(alias, tag)| ((*alias).to_string(), (*tag).to_string()))
                .collect(),
        }
    }
}

impl EmotionMap {
    /// Built-in aliases extended (or overridden) by `extra`
    #[must_use]
    pub fn with_aliases(extra: &HashMap<String, String>) -> Self {
        let mut map = Self::default();
        for (alias, tag) in extra {
            map.aliases.insert(alias.trim().to_string(), tag.trim().to_string());
        }
        map
    }

    /// Look up a marker
    #[must_use]
    pub fn resolve(&self, marker: &str) -> Option<&str> {
        self.aliases.get(marker).map(String::as_str)
    }

    /// Split a leading marker off `text`
    #[must_use]
    pub fn parse(&self, text: &str, default_emotion: &str) -> ParsedText {
        if let Some(captures) = MARKER_REGEX.captures(text) {
            let marker = captures[1].trim();
            if let Some(emotion) = self.resolve(marker) {
                return ParsedText {
                    text: captures[2].trim().to_string(),
                    emotion: emotion.to_string(),
                };
            }
            tracing::debug!(marker, "unrecognized emotion marker, using default");
        }

        ParsedText {
            text: text.to_string(),
            emotion: default_emotion.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_marker() {
        let parsed = EmotionMap::default().parse("(happy)Hello there", "neutral");
        assert_eq!(parsed.text, "Hello there");
        assert_eq!(parsed.emotion, "happy");
    }

    #[test]
    fn test_chinese_alias_and_trim() {
        let parsed = EmotionMap::default().parse("( 生气 )  走开", "neutral");
        assert_eq!(parsed.text, "走开");
        assert_eq!(parsed.emotion, "angry");
    }

    #[test]
    fn test_unknown_marker_keeps_text() {
        let parsed = EmotionMap::default().parse("(???)Hi", "neutral");
        assert_eq!(parsed.text, "(???)Hi");
        assert_eq!(parsed.emotion, "neutral");
    }

    #[test]
    fn test_marker_without_text_is_not_stripped() {
        let parsed = EmotionMap::default().parse("(happy)", "sad");
        assert_eq!(parsed.text, "(happy)");
        assert_eq!(parsed.emotion, "sad");
    }

    #[test]
    fn test_extra_aliases() {
        let extra = HashMap::from([("glad".to_string(), "happy".to_string())]);
        let parsed = EmotionMap::with_aliases(&extra).parse("(glad)ok", "neutral");
        assert_eq!(parsed.emotion, "happy");
    }
}
