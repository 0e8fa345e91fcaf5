//! Annotated rendering of feature parse warnings

use ariadne::{Config, Label, Report, ReportKind, Source};
use std::ops::Range;

use crate::features::Dimensions;
use crate::lexer;
use crate::warning::{Warning, WarningKind};

/// Labels are placed by character, spans are stored in bytes
fn char_range(text: &str, bytes: Range<usize>) -> Range<usize> {
    let to_char = |byte: usize| {
        let byte = byte.min(text.len());
        text.char_indices().take_while(|(i, _)| *i < byte).count()
    };
    let start = to_char(bytes.start);
    let end = to_char(bytes.end).max(start + 1);
    start..end
}

fn severity(kind: WarningKind) -> ReportKind<'static> {
    if kind.skips_feature() {
        ReportKind::Error
    } else {
        ReportKind::Warning
    }
}

/// Render `warnings` against the detail text, plus a note for every
/// character the lexer could not classify. Returns an empty string when there
/// is nothing to report.
pub fn render(detail: &str, warnings: &[Warning]) -> String {
    let mut out = Vec::new();

    for warning in warnings {
        let bytes = warning.span.map(Range::from).unwrap_or(0..detail.len());
        let range = char_range(detail, bytes);

        let report = Report::build(severity(warning.kind), (), range.start)
            .with_config(Config::default().with_color(false))
            .with_message(&warning.message)
            .with_label(Label::new(range).with_message(format!("{:?}", warning.kind)))
            .finish();

        if let Err(e) = report.write(Source::from(detail), &mut out) {
            log::warn!("failed to render diagnostic: {}", e);
        }
    }

    let covered: Vec<Range<usize>> = warnings.iter().filter_map(|w| w.span.map(Range::from)).collect();
    for span in lexer::unrecognized(detail) {
        if covered.contains(&span) {
            continue;
        }
        let range = char_range(detail, span);
        let report = Report::build(ReportKind::Advice, (), range.start)
            .with_config(Config::default().with_color(false))
            .with_message("character ignored")
            .with_label(Label::new(range).with_message("not part of any dimension"))
            .finish();

        if let Err(e) = report.write(Source::from(detail), &mut out) {
            log::warn!("failed to render diagnostic: {}", e);
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// One line per parsed dimension, e.g. `diameter  30 mm`
pub fn describe_dimensions(dims: &Dimensions) -> String {
    dims.values()
        .map(|(field, value)| format!("{:<9} {} mm", field.name(), value))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KinematicsConfig;
    use crate::features::{parse_feature, FeatureInput};

    #[test]
    fn test_char_range_over_multibyte() {
        // "ø" is two bytes
        assert_eq!(char_range("ø30 x", 2..4), 1..3);
        assert_eq!(char_range("ø30", 0..0), 0..1);
    }

    #[test]
    fn test_renders_parse_failure() {
        let input = FeatureInput::new("outer_diameter", "see drawing");
        let warning = parse_feature(0, &input, &KinematicsConfig::default()).unwrap_err();
        let out = render(&input.detail, &[warning]);
        assert!(out.contains("no diameter found"));
        assert!(out.contains("UnparseableDetail"));
    }

    #[test]
    fn test_reports_ignored_characters() {
        let out = render("ø30 # L=100", &[]);
        assert!(out.contains("character ignored"));
    }

    #[test]
    fn test_ignored_character_reported_once() {
        let input = FeatureInput::new("outer_diameter", "ø30 # L=100");
        let parsed = parse_feature(0, &input, &KinematicsConfig::default()).unwrap();
        let out = render(&input.detail, &parsed.warnings);
        assert!(out.contains("'#' ignored"));
        assert!(!out.contains("character ignored"));
    }

    #[test]
    fn test_nothing_to_report() {
        assert!(render("ø30, L=100", &[]).is_empty());
    }

    #[test]
    fn test_describe_dimensions() {
        let dims = Dimensions {
            diameter: Some(30.0),
            length: Some(100.0),
            ..Default::default()
        };
        assert_eq!(describe_dimensions(&dims), "diameter  30 mm\nlength    100 mm");
    }
}
