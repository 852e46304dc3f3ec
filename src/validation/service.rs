/*!
 * QA gate run on every translated chunk.
 *
 * The gate is pure: it looks at the raw model answer, the restored text and
 * the source chunk, and reports every check that failed. It never repairs.
 */

use log::debug;
use serde::Serialize;
use std::fmt;

use crate::preservation::PlaceholderMap;

use super::placeholders::{PlaceholderValidationResult, PlaceholderValidator};
use super::structure::{url_difference, MathMarker, StructureCounts};

/// A single failed QA check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum QaFailure {
    /// A token did not appear exactly as often as expected in the raw answer
    PlaceholderCount { token: String, expected: usize, found: usize },
    /// The raw answer contains a token-shaped string the map never issued
    UnknownPlaceholder { token: String },
    /// A token-shaped string survived restoration
    LeftoverPlaceholder { token: String },
    FenceCount { expected: usize, found: usize },
    MathDelimiters { marker: MathMarker, expected: usize, found: usize },
    UrlMultiset { missing: Vec<String>, unexpected: Vec<String> },
}

impl QaFailure {
    /// Short name of the check that produced this failure
    pub fn check(&self) -> &'static str {
        match self {
            Self::PlaceholderCount { .. } => "placeholder_count",
            Self::UnknownPlaceholder { .. } => "unknown_placeholder",
            Self::LeftoverPlaceholder { .. } => "leftover_placeholder",
            Self::FenceCount { .. } => "fence_count",
            Self::MathDelimiters { .. } => "math_delimiters",
            Self::UrlMultiset { .. } => "url_multiset",
        }
    }
}

impl fmt::Display for QaFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlaceholderCount { token, expected, found } => {
                write!(f, "placeholder {} expected {} time(s), found {}", token, expected, found)
            }
            Self::UnknownPlaceholder { token } => write!(f, "unknown placeholder {}", token),
            Self::LeftoverPlaceholder { token } => write!(f, "placeholder {} left after restore", token),
            Self::FenceCount { expected, found } => {
                write!(f, "code fence lines: expected {}, found {}", expected, found)
            }
            Self::MathDelimiters { marker, expected, found } => {
                write!(f, "math delimiter {}: expected {}, found {}", marker, expected, found)
            }
            Self::UrlMultiset { missing, unexpected } => write!(
                f,
                "URLs changed: missing [{}], unexpected [{}]",
                missing.join(", "),
                unexpected.join(", ")
            ),
        }
    }
}

/// Everything the gate needs for one chunk
#[derive(Debug, Clone, Copy)]
pub struct QaInput<'a> {
    pub chunk_id: &'a str,
    /// Model answer after cleanup, before restoration
    pub raw_output: &'a str,
    /// Model answer after restoration
    pub restored: &'a str,
    /// Source chunk with its placeholders restored
    pub original: &'a str,
    /// Tokens present in the source chunk, in order
    pub expected_tokens: &'a [String],
    pub map: &'a PlaceholderMap,
}

/// Result of running the gate on one chunk
#[derive(Debug, Clone, Serialize)]
pub struct QaReport {
    pub chunk_id: String,
    pub placeholders: PlaceholderValidationResult,
    pub original: StructureCounts,
    pub restored: StructureCounts,
    pub failures: Vec<QaFailure>,
}

impl QaReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.passed() {
            format!("{}: QA passed", self.chunk_id)
        } else {
            format!("{}: {} QA failure(s)", self.chunk_id, self.failures.len())
        }
    }
}

/// Runs every structural check on a translated chunk
#[derive(Debug, Clone, Copy, Default)]
pub struct QaGate;

impl QaGate {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, input: &QaInput<'_>) -> QaReport {
        let mut failures = Vec::new();

        let placeholders = PlaceholderValidator::validate(input.raw_output, input.expected_tokens, input.map);
        failures.extend(placeholders.mismatches().map(|t| QaFailure::PlaceholderCount {
            token: t.token.clone(),
            expected: t.expected,
            found: t.found,
        }));
        failures.extend(
            placeholders
                .unknown_tokens
                .iter()
                .map(|token| QaFailure::UnknownPlaceholder { token: token.clone() }),
        );
        failures.extend(
            PlaceholderValidator::leftovers(input.restored)
                .into_iter()
                .filter(|t| !placeholders.unknown_tokens.contains(t))
                .map(|token| QaFailure::LeftoverPlaceholder { token }),
        );

        let original = StructureCounts::of(input.original);
        let restored = StructureCounts::of(input.restored);

        if original.fences != restored.fences {
            failures.push(QaFailure::FenceCount {
                expected: original.fences,
                found: restored.fences,
            });
        }

        let mut markers: Vec<MathMarker> = original.math.keys().chain(restored.math.keys()).copied().collect();
        markers.sort();
        markers.dedup();
        for marker in markers {
            let (expected, found) = (original.math_count(marker), restored.math_count(marker));
            if expected != found {
                failures.push(QaFailure::MathDelimiters { marker, expected, found });
            }
        }

        if original.urls != restored.urls {
            let (missing, unexpected) = url_difference(&original.urls, &restored.urls);
            failures.push(QaFailure::UrlMultiset { missing, unexpected });
        }

        let report = QaReport {
            chunk_id: input.chunk_id.to_string(),
            placeholders,
            original,
            restored,
            failures,
        };
        debug!("{}", report.summary());
        report
    }
}
