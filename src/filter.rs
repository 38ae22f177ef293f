//! Classification of encoder diagnostic lines.
//!
//! A [`LineFilter`] is an ordered table of `(pattern, disposition)` rules.
//! Classification of a line goes:
//!
//! 1. any `Suppress` rule matching drops the line;
//! 2. a level tag written by `-loglevel level+...` (`[error]`, `[warning]`, ...)
//!    decides the severity and is stripped from the text;
//! 3. otherwise the first matching rule wins, falling back to `Info`.
//!
//! Patterns match case-insensitively as substrings.

use serde::Deserialize;

use crate::facade::{LogEntry, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Suppress,
    Error,
    Warning,
    Info,
    Success,
}

impl Disposition {
    fn severity(self) -> Option<Severity> {
        match self {
            Disposition::Suppress => None,
            Disposition::Error => Some(Severity::Error),
            Disposition::Warning => Some(Severity::Warning),
            Disposition::Info => Some(Severity::Info),
            Disposition::Success => Some(Severity::Success),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pattern: String,
    disposition: Disposition,
}

impl FilterRule {
    pub fn new(pattern: &str, disposition: Disposition) -> Self {
        Self {
            pattern: pattern.to_lowercase(),
            disposition,
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        !self.pattern.is_empty() && lowered.contains(&self.pattern)
    }
}

const DEFAULT_RULES: &[(&str, Disposition)] = &[
    // codec over-read notices
    ("overread", Disposition::Suppress),
    ("last message repeated", Disposition::Suppress),
    // container metadata banner
    ("metadata:", Disposition::Suppress),
    ("encoder         :", Disposition::Suppress),
    ("duration:", Disposition::Suppress),
    ("stream mapping", Disposition::Suppress),
    ("past duration", Disposition::Suppress),
    // progress
    ("frame=", Disposition::Suppress),
    ("size=", Disposition::Suppress),
    ("connection refused", Disposition::Error),
    ("broken pipe", Disposition::Error),
    ("no such file", Disposition::Error),
    ("could not", Disposition::Error),
    ("failed", Disposition::Error),
    ("invalid", Disposition::Error),
    ("error", Disposition::Error),
    ("warning", Disposition::Warning),
    ("deprecated", Disposition::Warning),
];

const LEVEL_TAGS: &[(&str, Severity)] = &[
    ("[panic]", Severity::Error),
    ("[fatal]", Severity::Error),
    ("[error]", Severity::Error),
    ("[warning]", Severity::Warning),
    ("[info]", Severity::Info),
    ("[verbose]", Severity::Info),
    ("[debug]", Severity::Info),
    ("[trace]", Severity::Info),
];

#[derive(Debug, Clone)]
pub struct LineFilter {
    rules: Vec<FilterRule>,
}

impl LineFilter {
    /// A filter with no rules: every non-blank line is accepted as `Info`
    /// unless it carries a level tag.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends a rule. Rules added later lose to earlier ones, except that
    /// suppression always wins.
    pub fn with_rule(mut self, pattern: &str, disposition: Disposition) -> Self {
        self.rules.push(FilterRule::new(pattern, disposition));
        self
    }

    pub fn with_suppressed<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            self = self.with_rule(pattern.as_ref(), Disposition::Suppress);
        }
        self
    }

    /// Puts a rule ahead of the existing table.
    pub fn with_priority_rule(mut self, pattern: &str, disposition: Disposition) -> Self {
        self.rules.insert(0, FilterRule::new(pattern, disposition));
        self
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Returns `None` for suppressed or blank lines.
    pub fn classify(&self, line: &str) -> Option<(Severity, String)> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let lowered = line.to_lowercase();

        if self
            .rules
            .iter()
            .any(|rule| rule.disposition == Disposition::Suppress && rule.matches(&lowered))
        {
            return None;
        }

        if let Some(tagged) = strip_level_tag(line) {
            return Some(tagged);
        }

        let severity = self
            .rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .and_then(|rule| rule.disposition.severity())
            .unwrap_or(Severity::Info);
        Some((severity, line.to_string()))
    }

    pub fn accept(&self, line: &str) -> Option<LogEntry> {
        self.classify(line)
            .map(|(severity, text)| LogEntry::new(text, severity))
    }
}

impl Default for LineFilter {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES
                .iter()
                .map(|(pattern, disposition)| FilterRule::new(pattern, *disposition))
                .collect(),
        }
    }
}

/// Reads the `[level]` token ffmpeg writes after any `[name @ 0x..]`
/// context prefixes. Brackets later in the message are left alone.
fn strip_level_tag(line: &str) -> Option<(Severity, String)> {
    let mut rest = line;
    loop {
        if !rest.starts_with('[') {
            return None;
        }
        let end = rest.find(']')?;
        let token = &rest[..=end];
        if let Some((_, severity)) = LEVEL_TAGS
            .iter()
            .find(|(tag, _)| token.eq_ignore_ascii_case(tag))
        {
            let prefix = &line[..line.len() - rest.len()];
            let text = format!("{prefix}{}", rest[end + 1..].trim_start());
            return Some((*severity, text.trim().to_string()));
        }
        if !token.contains(" @ ") {
            return None;
        }
        rest = rest[end + 1..].trim_start();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suppressed_lines_are_dropped() {
        let filter = LineFilter::default();
        assert!(filter.classify("[h264 @ 0x55d] overread 8").is_none());
        assert!(filter
            .classify("    Last message repeated 3 times")
            .is_none());
        assert!(filter.classify("  Metadata:").is_none());
        assert!(filter
            .classify("frame= 1200 fps= 25 q=23.0 size=  4096kB time=00:00:48.00 bitrate= 699.1kbits/s speed=1x")
            .is_none());
        assert!(filter.classify("   ").is_none());
    }

    #[test]
    fn test_suppression_beats_level_tag() {
        let filter = LineFilter::default();
        assert!(filter
            .classify("[aac @ 0x1] [error] Overread VLC by 3 bits")
            .is_none());
    }

    #[test]
    fn test_level_tag_decides_and_is_stripped() {
        let filter = LineFilter::default();
        let (severity, text) = filter
            .classify("[flv @ 0x5581] [warning] Failed to update header")
            .unwrap();
        assert_eq!(severity, Severity::Warning);
        assert_eq!(text, "[flv @ 0x5581] Failed to update header");

        let (severity, text) = filter.classify("[fatal] Conversion failed!").unwrap();
        assert_eq!(severity, Severity::Error);
        assert_eq!(text, "Conversion failed!");
    }

    #[test]
    fn test_only_the_leading_level_tag_counts() {
        let filter = LineFilter::default();
        let (severity, text) = filter
            .classify("[info] Opening 'news[error]clip.mp4' for reading")
            .unwrap();
        assert_eq!(severity, Severity::Info);
        assert_eq!(text, "Opening 'news[error]clip.mp4' for reading");

        let (severity, text) = filter
            .classify("[tcp @ 0x7f] [info] Starting connection attempt [error] retry")
            .unwrap();
        assert_eq!(severity, Severity::Info);
        assert_eq!(text, "[tcp @ 0x7f] Starting connection attempt [error] retry");
    }

    #[test]
    fn test_untagged_line_with_bracketed_level_falls_back() {
        let filter = LineFilter::default();
        let (severity, text) = filter.classify("Stream #0:0 [error] here").unwrap();
        assert_eq!(severity, Severity::Error);
        assert_eq!(text, "Stream #0:0 [error] here");
    }

    #[test]
    fn test_vocabulary_fallback() {
        let filter = LineFilter::default();
        let (severity, _) = filter
            .classify("rtmp://a.rtmp.youtube.com/live2: Connection refused")
            .unwrap();
        assert_eq!(severity, Severity::Error);

        let (severity, _) = filter.classify("Warning: deprecated pixel format").unwrap();
        assert_eq!(severity, Severity::Warning);

        let (severity, _) = filter.classify("Press [q] to stop").unwrap();
        assert_eq!(severity, Severity::Info);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let filter = LineFilter::empty()
            .with_rule("handshake", Disposition::Success)
            .with_rule("error", Disposition::Error);
        let (severity, _) = filter.classify("handshake error recovered").unwrap();
        assert_eq!(severity, Severity::Success);

        let filter = filter.with_priority_rule("recovered", Disposition::Info);
        let (severity, _) = filter.classify("handshake error recovered").unwrap();
        assert_eq!(severity, Severity::Info);
    }

    #[test]
    fn test_configured_suppression_is_case_insensitive() {
        let filter = LineFilter::default().with_suppressed(["NON-MONOTONIC DTS"]);
        assert!(filter
            .classify("Application provided invalid, non-monotonic dts")
            .is_none());
    }
}
