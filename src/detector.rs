//! Failure signature detection over raw log text.
//!
//! Signatures are matched case-sensitively against the whole text, either as
//! literal substrings or as regular expressions. Every distinct line (or run of
//! lines, for a match that crosses line breaks) containing a match is recorded
//! once, in order of first appearance.

use std::collections::HashSet;

use regex::Regex;

use crate::config::{ConfigError, DetectorConfig};

/// A log line that matched a failure signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatch {
    /// The configured signature that fired first on this span
    pub signature: String,
    /// The full line(s) containing the match, `\r` line endings removed
    pub line: String,
}

/// Compiled failure signature set
#[derive(Debug, Clone)]
pub struct FailureDetector {
    signatures: Vec<String>,
    patterns: Vec<Regex>,
}

impl FailureDetector {
    /// Compile a signature set.
    ///
    /// With `literal` set, regex metacharacters in the signatures are escaped.
    pub fn new<I, S>(signatures: I, literal: bool) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let signatures: Vec<String> = signatures.into_iter().map(Into::into).collect();
        let patterns = signatures
            .iter()
            .map(|s| {
                if literal {
                    Regex::new(&regex::escape(s))
                } else {
                    Regex::new(s)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            signatures,
            patterns,
        })
    }

    pub fn from_config(config: &DetectorConfig) -> Result<Self, ConfigError> {
        Self::new(config.signatures.iter().cloned(), config.literal)
    }

    /// Scan log text and return each distinct matching span.
    ///
    /// Every pattern runs over the whole text. A match is widened to the full
    /// line or lines it touches, so a match within one line records that line.
    /// Empty text yields no matches; zero-width matches are ignored.
    pub fn scan(&self, text: &str) -> Vec<SignatureMatch> {
        if self.patterns.is_empty() || text.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(usize, usize, usize)> = Vec::new();
        for (idx, pattern) in self.patterns.iter().enumerate() {
            for m in pattern.find_iter(text) {
                if m.start() == m.end() {
                    continue;
                }
                let (start, end) = line_span(text, m.start(), m.end());
                hits.push((start, end, idx));
            }
        }
        hits.sort_unstable();

        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        for (start, end, idx) in hits {
            let line = normalize_span(&text[start..end]);
            if seen.insert(line.clone()) {
                matches.push(SignatureMatch {
                    signature: self.signatures[idx].clone(),
                    line,
                });
            }
        }

        matches
    }
}

/// Byte range of the lines covered by the non-empty match `start..end`,
/// excluding the final line terminator
fn line_span(text: &str, start: usize, end: usize) -> (usize, usize) {
    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = if text.as_bytes()[end - 1] == b'\n' {
        end - 1
    } else {
        text[end..].find('\n').map_or(text.len(), |i| end + i)
    };
    (line_start, line_end.max(line_start))
}

/// Strip the `\r` of CRLF line endings inside a span
fn normalize_span(span: &str) -> String {
    span.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SIGNATURES;

    fn default_detector() -> FailureDetector {
        FailureDetector::new(DEFAULT_SIGNATURES.iter().copied(), true).unwrap()
    }

    #[test]
    fn test_scan_empty_text_has_no_matches() {
        assert!(default_detector().scan("").is_empty());
    }

    #[test]
    fn test_scan_clean_log_has_no_matches() {
        let log = "INFO starting\nINFO listening on :8080\nINFO shutdown complete\n";
        assert!(default_detector().scan(log).is_empty());
    }

    #[test]
    fn test_scan_finds_traceback() {
        let log = "INFO ok\nTraceback (most recent call last):\n  File \"x.py\", line 1\n";
        let matches = default_detector().scan(log);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].signature, "Traceback");
        assert_eq!(matches[0].line, "Traceback (most recent call last):");
    }

    #[test]
    fn test_scan_is_case_sensitive() {
        let log = "error: lowercase is not a signature\ntraceback too\n";
        assert!(default_detector().scan(log).is_empty());
    }

    #[test]
    fn test_scan_preserves_first_appearance_order() {
        let log = "[Errno 2] No such file\nall good\nERROR: db down\n[Errno 2] No such file\n";
        let matches = default_detector().scan(log);
        let lines: Vec<&str> = matches.iter().map(|m| m.line.as_str()).collect();
        assert_eq!(lines, vec!["[Errno 2] No such file", "ERROR: db down"]);
    }

    #[test]
    fn test_scan_reports_first_configured_signature_per_line() {
        let log = "FileNotFoundError: [Errno 2] No such file or directory\n";
        let matches = default_detector().scan(log);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].signature, "FileNotFoundError");
    }

    #[test]
    fn test_scan_strips_carriage_returns() {
        let matches = default_detector().scan("ERROR boom\r\nok\r\n");
        assert_eq!(matches[0].line, "ERROR boom");
    }

    #[test]
    fn test_literal_mode_escapes_metacharacters() {
        let detector = FailureDetector::new(["exit(1)"], true).unwrap();
        assert_eq!(detector.scan("worker exit(1)\n").len(), 1);
        assert!(detector.scan("worker exit1\n").is_empty());
    }

    #[test]
    fn test_regex_mode() {
        let detector = FailureDetector::new([r"status=5\d\d"], false).unwrap();
        assert_eq!(detector.scan("GET / status=503\nGET / status=200\n").len(), 1);
    }

    #[test]
    fn test_regex_spanning_lines_records_every_covered_line() {
        let detector = FailureDetector::new([r"(?s)Traceback.*KeyError"], false).unwrap();
        let log = "INFO ok\nTraceback (most recent call last):\n  File \"x.py\", line 1\nKeyError: 'k'\nINFO bye\n";
        let matches = detector.scan(log);
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].line,
            "Traceback (most recent call last):\n  File \"x.py\", line 1\nKeyError: 'k'"
        );
    }

    #[test]
    fn test_literal_with_newline_matches_across_lines() {
        let detector = FailureDetector::new(["Killed\nexit"], true).unwrap();
        let matches = detector.scan("worker Killed\nexit status 9\nok\n");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line, "worker Killed\nexit status 9");
    }

    #[test]
    fn test_match_ending_in_newline_stays_on_its_line() {
        let detector = FailureDetector::new(["boom\n"], true).unwrap();
        let matches = detector.scan("a boom\nnext\n");
        assert_eq!(matches[0].line, "a boom");
    }

    #[test]
    fn test_zero_width_pattern_is_ignored() {
        let detector = FailureDetector::new(["x*"], false).unwrap();
        assert!(detector.scan("abc\n").is_empty());
    }

    #[test]
    fn test_empty_signature_set_never_matches() {
        let detector = FailureDetector::new(Vec::<String>::new(), true).unwrap();
        assert!(detector.scan("ERROR Traceback Errno").is_empty());
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        assert!(matches!(
            FailureDetector::new(["(oops"], false),
            Err(ConfigError::Pattern(_))
        ));
    }
}
