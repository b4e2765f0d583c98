//! Rendering of WILD root causes as source diagnostics.
//!
//! One report per real WILD slot that leads a group: the reason it was
//! forced `Wild` and how many other pointers it drags along, labelled at the
//! location of the constraint (or of the declaration owning the slot).

use std::ops::Range;

use ariadne::{Color, Config, IndexType, Label, Report, ReportKind, Source};
use ptrqual_common::{LineIndex, SourceLoc};

use crate::disjoint::WildRoot;

/// Byte range of the identifier-like token starting at `loc`, at least one
/// byte wide when the source is non-empty.
fn token_range(source: &str, loc: &SourceLoc) -> Range<usize> {
    let index = LineIndex::new(source);
    let mut start = index
        .offset(loc.line, loc.col)
        .map(|o| o as usize)
        .unwrap_or(0)
        .min(source.len());
    // Columns count bytes; step back out of a multi-byte character.
    while !source.is_char_boundary(start) {
        start -= 1;
    }
    let word = source[start..]
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map_or(source.len() - start, |(i, _)| i);
    let end = if word == 0 {
        (start + 1).min(source.len())
    } else {
        start + word
    };
    start..end
}

/// Render one WILD root cause against the text of the file it points into.
///
/// `affected` is the number of other pointers that are `Wild` because of
/// this one.
pub fn render_wild_root(
    root: &WildRoot,
    loc: &SourceLoc,
    affected: usize,
    source: &str,
    color: bool,
) -> String {
    let config = Config::default()
        .with_color(color)
        .with_index_type(IndexType::Byte);
    let span = token_range(source, loc);
    let msg = format!("{} is unchecked: {}", root.var, root.reason);
    let label = if affected == 0 {
        "forced Wild here".to_string()
    } else if affected == 1 {
        "forced Wild here, making 1 other pointer Wild".to_string()
    } else {
        format!("forced Wild here, making {} other pointers Wild", affected)
    };

    let report = Report::build(ReportKind::Warning, span.clone())
        .with_message(&msg)
        .with_config(config)
        .with_label(Label::new(span).with_message(label).with_color(Color::Yellow))
        .with_note(format!("constraint {}", root.constraint.0))
        .finish();

    let mut buf = Vec::new();
    if report.write(Source::from(source), &mut buf).is_err() {
        return msg;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// One-line form used when the source file cannot be read.
pub fn render_wild_root_plain(root: &WildRoot, loc: Option<&SourceLoc>, affected: usize) -> String {
    match loc {
        Some(loc) => format!(
            "{}: {} is unchecked: {} ({} affected)",
            loc, root.var, root.reason, affected
        ),
        None => format!(
            "{} is unchecked: {} ({} affected)",
            root.var, root.reason, affected
        ),
    }
}
