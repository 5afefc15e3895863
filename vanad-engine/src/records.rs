// Copyright (c) The vanad-watch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire records emitted by the vanad child process.
//!
//! The child writes one JSON object per completed testcase to its stdout,
//! newline-delimited. These types mirror that wire shape exactly.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// A source location extracted from a stack trace: the file and line where
/// an assertion or crash originated in user code.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct CallerLocation {
    /// Absolute path to the source file.
    pub path: Utf8PathBuf,
    /// 1-based line number.
    pub line: u32,
}

impl CallerLocation {
    /// Creates a new caller location.
    pub fn new(path: impl Into<Utf8PathBuf>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }

    /// Returns true if this caller points into the given document.
    pub fn is_in(&self, document: &Utf8Path) -> bool {
        self.path.as_path() == document
    }
}

/// One result record, reported by the child as each testcase completes.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct TestResult {
    /// Testcase title as declared in the test source.
    pub title: String,
    /// Human-readable comparison payload. Absent or empty means the
    /// testcase passed; non-empty means it failed.
    #[serde(default)]
    pub diff: Option<String>,
    /// Stack-derived callers for the failing assertion, innermost first.
    #[serde(default)]
    pub callers: Vec<CallerLocation>,
}

impl TestResult {
    /// Returns true if the testcase failed, i.e. carries a non-empty diff.
    pub fn is_failure(&self) -> bool {
        self.diff.as_deref().is_some_and(|diff| !diff.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_decodes() {
        let record: TestResult = serde_json::from_str(
            r#"{"title":"adds numbers","diff":"1 != 2","callers":[{"path":"/src/calc.test.js","line":7}]}"#,
        )
        .expect("valid record");
        assert_eq!(record.title, "adds numbers");
        assert_eq!(record.diff.as_deref(), Some("1 != 2"));
        assert_eq!(
            record.callers,
            vec![CallerLocation::new("/src/calc.test.js", 7)]
        );
        assert!(record.is_failure());
    }

    #[test]
    fn null_and_absent_diff_both_pass() {
        let tests = &[
            r#"{"title":"t","diff":null,"callers":[]}"#,
            r#"{"title":"t","callers":[]}"#,
            r#"{"title":"t"}"#,
            r#"{"title":"t","diff":""}"#,
        ];
        for input in tests {
            let record: TestResult = serde_json::from_str(input).expect("valid record");
            assert!(!record.is_failure(), "for input {input:?}");
        }
    }

    #[test]
    fn caller_document_matching() {
        let caller = CallerLocation::new("/a/b.js", 3);
        assert!(caller.is_in(Utf8Path::new("/a/b.js")));
        assert!(!caller.is_in(Utf8Path::new("/a/c.js")));
    }
}
