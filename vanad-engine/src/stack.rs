// Copyright (c) The vanad-watch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of raw stack trace text into caller locations.
//!
//! The child runtime emits conventional multi-line stack traces, one frame
//! per line with a trailing `path:line:column` token. This module extracts
//! the user-source frames and also splits full crash output (as captured
//! from stderr) into a message and a parsed stack.

use crate::records::CallerLocation;
use regex::Regex;
use std::sync::LazyLock;

/// Matches a trailing `path:line:column` token, optionally parenthesized
/// and preceded by whitespace. Applied to trimmed lines, so a bare
/// `path:line:column` line without a leading frame label does not match.
static CALLER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s\(?(\S+):(\d+):(\d+)\)?$").expect("caller pattern is valid"));

/// Frames under the runtime's internal module tree are not user source.
static INTERNAL_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^internal/").expect("internal pattern is valid"));

/// First line of the stack portion of a crash report.
static ERROR_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Error").expect("error pattern is valid"));

/// Extracts caller locations from raw stack text, innermost frame first.
///
/// Lines without a location token contribute nothing, and frames inside the
/// runtime's internal modules are discarded. Never fails: unparseable input
/// yields an empty vector.
pub fn parse_stack(stack: &str) -> Vec<CallerLocation> {
    stack.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<CallerLocation> {
    let captures = CALLER_LINE.captures(line.trim())?;
    let path = &captures[1];
    if INTERNAL_FRAME.is_match(path) {
        return None;
    }
    // The column (capture 3) is matched but not retained downstream.
    let line_number: u32 = captures[2].parse().ok()?;
    if line_number == 0 {
        // Line numbers are 1-based; a zero is a malformed frame.
        return None;
    }
    Some(CallerLocation::new(path, line_number))
}

/// A crash report assembled from the child's raw stderr output.
///
/// Distinct from a structured failing [`TestResult`](crate::records::TestResult):
/// this is the unstructured failure mode, and its display fully supersedes
/// result display for the run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CrashReport {
    /// Human-readable message, shown quoted in the tooltip.
    pub message: String,
    /// Callers extracted from the stack portion, innermost first.
    pub callers: Vec<CallerLocation>,
}

impl CrashReport {
    /// Splits raw crash text into a message and a parsed stack.
    ///
    /// The first line matching `^Error` is the split point: the message is
    /// everything before it minus the two immediately preceding lines
    /// (runtime boilerplate showing the throwing source line), and the
    /// stack is everything after it. The boilerplate count is a
    /// compatibility detail of the child runtime's crash output.
    ///
    /// Without a marker line (e.g. a `TypeError:` heading), the whole text
    /// is scanned for callers and doubles as the message. The same fallback
    /// applies when the computed message trims to empty.
    pub fn parse(text: &str) -> Self {
        let lines: Vec<&str> = text.lines().collect();
        match lines.iter().position(|line| ERROR_MARKER.is_match(line)) {
            Some(marker) => {
                let boilerplate_start = marker.saturating_sub(2);
                let mut message = lines[..boilerplate_start].join("\n").trim().to_owned();
                if message.is_empty() {
                    message = text.trim().to_owned();
                }
                let stack = lines[marker + 1..].join("\n");
                Self {
                    message,
                    callers: parse_stack(&stack),
                }
            }
            None => Self {
                message: text.trim().to_owned(),
                callers: parse_stack(text),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn parses_frames_in_order() {
        let stack = indoc! {"
            Error: expected 3, got 4
                at assertEqual (/work/project/calc.test.js:12:5)
                at run (/work/project/calc.test.js:40:3)
                at Module._compile (internal/modules/cjs/loader.js:999:30)
        "};
        assert_eq!(
            parse_stack(stack),
            vec![
                CallerLocation::new("/work/project/calc.test.js", 12),
                CallerLocation::new("/work/project/calc.test.js", 40),
            ]
        );
    }

    #[test]
    fn skips_lines_without_location_token() {
        let tests: &[&str] = &[
            "",
            "Error: boom",
            "    at <anonymous>",
            // No whitespace before the token after trimming, so no match.
            "/work/a.js:1:2",
            // Zero line numbers are malformed.
            "    at f (/work/a.js:0:2)",
            "not a stack line at all",
        ];
        for input in tests {
            assert_eq!(parse_stack(input), vec![], "for input {input:?}");
        }
    }

    #[test]
    fn unparenthesized_frames_match() {
        assert_eq!(
            parse_stack("    at /work/a.js:7:11"),
            vec![CallerLocation::new("/work/a.js", 7)]
        );
    }

    #[test]
    fn internal_frames_are_filtered() {
        let stack = "    at processTicksAndRejections (internal/process/task_queues.js:95:5)";
        assert_eq!(parse_stack(stack), vec![]);
    }

    #[test]
    fn crash_report_splits_at_error_marker() {
        let text = indoc! {"
            /work/project/calc.test.js:12
                throw new Error('expected 3, got 4');
                ^

            Error: expected 3, got 4
                at assertEqual (/work/project/calc.test.js:12:5)
                at run (internal/main/run_main_module.js:17:47)
        "};
        let report = CrashReport::parse(text);
        // The two lines right before the marker (caret and blank) are
        // boilerplate; the leading source excerpt is the message.
        assert_eq!(
            report.message,
            "/work/project/calc.test.js:12\n    throw new Error('expected 3, got 4');"
        );
        assert_eq!(
            report.callers,
            vec![CallerLocation::new("/work/project/calc.test.js", 12)]
        );
    }

    #[test]
    fn crash_report_without_marker_scans_whole_text() {
        let text = "TypeError: boom\n    at foo (/a.js:10:3)\n";
        let report = CrashReport::parse(text);
        assert_eq!(report.message, "TypeError: boom\n    at foo (/a.js:10:3)");
        assert_eq!(report.callers, vec![CallerLocation::new("/a.js", 10)]);
    }

    #[test]
    fn crash_report_with_leading_marker_falls_back_to_full_text() {
        let text = "Error: boom\n    at foo (/a.js:10:3)\n";
        let report = CrashReport::parse(text);
        assert_eq!(report.message, "Error: boom\n    at foo (/a.js:10:3)");
        assert_eq!(report.callers, vec![CallerLocation::new("/a.js", 10)]);
    }

    #[test]
    fn crash_report_never_panics_on_junk() {
        for input in ["", "\n\n\n", "Error", "\u{0}garbage\u{ffff}", ":::"] {
            let _ = CrashReport::parse(input);
        }
    }
}
