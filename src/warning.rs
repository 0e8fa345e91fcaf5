//! Non-fatal issues collected while estimating a part

use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A missing dimension was replaced by a documented default
    DefaultApplied,
    /// The detail text could not be turned into usable dimensions
    UnparseableDetail,
    /// Part of the detail text was not used; the feature is still timed
    IgnoredText,
    UnknownFeatureType,
    InvalidCount,
    /// No cutting condition after the roughing/finishing fallback
    ConditionNotFound,
    /// A condition was found but its values cannot drive the formula
    UnusableCondition,
    Geometry,
}

impl WarningKind {
    /// Whether the feature carrying this warning was dropped from the sum
    pub fn skips_feature(self) -> bool {
        !matches!(
            self,
            WarningKind::DefaultApplied | WarningKind::IgnoredText | WarningKind::Geometry
        )
    }
}

/// Byte span into a feature's detail text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

impl From<Span> for Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_index: Option<usize>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            feature_index: None,
            message: message.into(),
            span: None,
        }
    }

    pub fn for_feature(mut self, index: usize) -> Self {
        self.feature_index = Some(index);
        self
    }

    pub fn with_span(mut self, span: impl Into<Span>) -> Self {
        self.span = Some(span.into());
        self
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.feature_index {
            Some(idx) => write!(f, "feature #{}: {}", idx, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}
