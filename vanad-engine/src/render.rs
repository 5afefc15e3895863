// Copyright (c) The vanad-watch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attribution of failures to document lines and render plan computation.
//!
//! [`plan`] is a pure function of (run state, active document): identical
//! inputs yield identical plans, so re-applying a plan the UI already
//! reflects is a no-op. The engine re-plans on every state transition and
//! on every editor focus change, since the matching step depends on which
//! document is active.

use crate::{records::TestResult, stack::CrashReport, state::RunState};
use camino::{Utf8Path, Utf8PathBuf};
use std::{collections::BTreeSet, fmt};

/// Read access to the document the editor currently shows.
pub trait DocumentView {
    /// Absolute path of the document.
    fn path(&self) -> &Utf8Path;

    /// Text of the 1-based `line`, without its trailing newline. `None` if
    /// the document has no such line.
    fn line_text(&self, line: u32) -> Option<&str>;
}

/// An engine-owned snapshot of the active document, rebuilt from editor
/// events.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DocumentSnapshot {
    path: Utf8PathBuf,
    lines: Vec<String>,
}

impl DocumentSnapshot {
    /// Snapshots a document from its full text.
    pub fn new(path: impl Into<Utf8PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            lines: text.lines().map(str::to_owned).collect(),
        }
    }
}

impl DocumentView for DocumentSnapshot {
    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn line_text(&self, line: u32) -> Option<&str> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        self.lines.get(index).map(String::as_str)
    }
}

/// One line-span highlight in the active document, from the first
/// non-whitespace character to the end of the line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Highlight {
    /// 1-based line number.
    pub line: u32,
    /// 0-based character offset of the first non-whitespace character.
    pub start_col: u32,
    /// 0-based character offset one past the last character.
    pub end_col: u32,
    /// Tooltip payload; `None` renders the highlight bare.
    pub tooltip: Option<String>,
}

/// Status line shown by the editor. Renders through `Display`; the empty
/// string hides the status entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Status {
    /// A run is in flight.
    Running,
    /// The run produced crash-shaped output.
    ErrorsEncountered,
    /// N testcases reported a non-empty diff.
    Failed(usize),
    /// The run settled with no failures (including the vacuous run that
    /// reported no testcases at all).
    AllPassed,
    /// Idle, but watch mode is armed.
    Watching,
    /// Nothing to show.
    Hidden,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Running => f.write_str("Running tests..."),
            Status::ErrorsEncountered => f.write_str("Errors encountered"),
            Status::Failed(1) => f.write_str("1 testcase failed"),
            Status::Failed(count) => write!(f, "{count} testcases failed"),
            Status::AllPassed => f.write_str("All testcases passed"),
            Status::Watching => f.write_str("Watching for saves"),
            Status::Hidden => Ok(()),
        }
    }
}

/// The full desired UI state for one render pass. Applied wholesale: the
/// highlight set replaces the previous one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RenderPlan {
    /// Status text to display.
    pub status: Status,
    /// Highlights for the active document, in evidentiary order.
    pub highlights: Vec<Highlight>,
}

/// Computes the render plan for the given state and active document.
///
/// Crash display fully supersedes result display: when error chunks are
/// present the structured results contribute nothing to the plan.
pub fn plan<D>(state: &RunState, document: Option<&D>) -> RenderPlan
where
    D: DocumentView + ?Sized,
{
    let highlights = match document {
        Some(document) if !state.error_chunks().is_empty() => crash_highlights(state, document),
        Some(document) => failure_highlights(state.results(), document),
        None => Vec::new(),
    };
    RenderPlan {
        status: status_of(state),
        highlights,
    }
}

fn status_of(state: &RunState) -> Status {
    if state.is_running() {
        return Status::Running;
    }
    if !state.error_chunks().is_empty() {
        return Status::ErrorsEncountered;
    }
    let failed = state.results().iter().filter(|r| r.is_failure()).count();
    if failed > 0 {
        Status::Failed(failed)
    } else if state.is_settled() {
        Status::AllPassed
    } else if state.watching() {
        Status::Watching
    } else {
        Status::Hidden
    }
}

/// The crash branch: one highlight at the first caller that lands in the
/// active document, tooltip carrying the quoted crash message. No matching
/// caller is a normal outcome and yields status text only.
fn crash_highlights(state: &RunState, document: &(impl DocumentView + ?Sized)) -> Vec<Highlight> {
    let report = CrashReport::parse(&state.error_chunks().concat());
    report
        .callers
        .iter()
        .find(|caller| caller.is_in(document.path()))
        .and_then(|caller| {
            let tooltip = format!("\"{}\"", report.message.trim());
            line_highlight(document, caller.line, Some(tooltip))
        })
        .into_iter()
        .collect()
}

/// The failure branch: every caller of every failing result that lands in
/// the active document gets a highlight, in arrival order. When several map
/// to the same line, the first wins. The diff tooltip is suppressed when
/// the matched line contains the testcase title verbatim: that match landed
/// on the test's declaration line, not an assertion call site, and showing
/// the diff there is misleading.
fn failure_highlights(
    results: &[TestResult],
    document: &(impl DocumentView + ?Sized),
) -> Vec<Highlight> {
    let mut seen_lines = BTreeSet::new();
    let mut highlights = Vec::new();
    for result in results.iter().filter(|result| result.is_failure()) {
        for caller in result.callers.iter().filter(|c| c.is_in(document.path())) {
            if !seen_lines.insert(caller.line) {
                continue;
            }
            let Some(text) = document.line_text(caller.line) else {
                continue;
            };
            let tooltip = if text.contains(&result.title) {
                None
            } else {
                result.diff.clone()
            };
            if let Some(highlight) = line_highlight(document, caller.line, tooltip) {
                highlights.push(highlight);
            }
        }
    }
    highlights
}

fn line_highlight(
    document: &(impl DocumentView + ?Sized),
    line: u32,
    tooltip: Option<String>,
) -> Option<Highlight> {
    let text = document.line_text(line)?;
    let start_col = column(text.chars().take_while(|c| c.is_whitespace()).count());
    let end_col = column(text.chars().count());
    Some(Highlight {
        line,
        start_col,
        end_col,
        tooltip,
    })
}

/// Character counts saturate rather than wrap on lines longer than `u32`
/// can address.
fn column(chars: usize) -> u32 {
    u32::try_from(chars).unwrap_or(u32::MAX)
}
