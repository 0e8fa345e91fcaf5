//! Typed extractors for feature detail text
//!
//! Each extractor is a pure function from a lexed detail to an optional set of
//! dimensions. [`extract`] runs them in order and the first extractor that
//! supplies a field wins it.

use logos::Span;
use serde::{Deserialize, Serialize};

use super::{Family, FeatureKind};
use crate::lexer::{self, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Diameter,
    Length,
    Width,
    Depth,
    Pitch,
    Wall,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Diameter,
        Field::Length,
        Field::Width,
        Field::Depth,
        Field::Pitch,
        Field::Wall,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Diameter => "diameter",
            Field::Length => "length",
            Field::Width => "width",
            Field::Depth => "depth",
            Field::Pitch => "pitch",
            Field::Wall => "wall",
        }
    }
}

/// Numeric dimensions parsed from a detail string, all in millimetres
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    /// Wall thickness to an adjacent feature, when stated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall: Option<f64>,
}

impl Dimensions {
    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::Diameter => self.diameter,
            Field::Length => self.length,
            Field::Width => self.width,
            Field::Depth => self.depth,
            Field::Pitch => self.pitch,
            Field::Wall => self.wall,
        }
    }

    pub fn set(&mut self, field: Field, value: f64) {
        let slot = match field {
            Field::Diameter => &mut self.diameter,
            Field::Length => &mut self.length,
            Field::Width => &mut self.width,
            Field::Depth => &mut self.depth,
            Field::Pitch => &mut self.pitch,
            Field::Wall => &mut self.wall,
        };
        *slot = Some(value);
    }

    /// Copy every field of `other` that is still missing here
    pub fn fill_from(&mut self, other: &Dimensions) {
        for field in Field::ALL {
            if self.get(field).is_none() {
                if let Some(value) = other.get(field) {
                    self.set(field, value);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        Field::ALL.iter().all(|f| self.get(*f).is_none())
    }

    pub fn values(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
        Field::ALL
            .into_iter()
            .filter_map(move |f| self.get(f).map(|v| (f, v)))
    }
}

/// A detail string lexed for one feature kind, with fit designations removed
#[derive(Debug, Clone)]
pub struct Detail<'a> {
    pub text: &'a str,
    pub kind: FeatureKind,
    tokens: Vec<(Token, Span)>,
}

impl<'a> Detail<'a> {
    pub fn new(text: &'a str, kind: FeatureKind) -> Self {
        Self {
            text,
            kind,
            tokens: strip_fit_classes(lexer::lex(text), kind),
        }
    }

    pub fn tokens(&self) -> &[(Token, Span)] {
        &self.tokens
    }
}

pub type Extractor = fn(&Detail<'_>) -> Option<Dimensions>;

/// Extractors in priority order
pub const CHAIN: [(&str, Extractor); 5] = [
    ("thread designation", thread_designation),
    ("marked diameter", marked_diameter),
    ("keyed values", keyed_values),
    ("separated dimensions", separated_dimensions),
    ("bare number", bare_number),
];

/// Run the whole chain, first success per field
pub fn extract(detail: &Detail<'_>) -> Dimensions {
    let mut dims = Dimensions::default();
    for (_, extractor) in CHAIN {
        if let Some(found) = extractor(detail) {
            dims.fill_from(&found);
        }
    }
    dims
}

/// Numbers no extractor used, and characters the lexer could not classify.
/// An angle (`45°`) is informational and never reported.
pub fn unused_text(detail: &Detail<'_>, found: &Dimensions) -> Vec<(String, Span)> {
    let tokens = detail.tokens();
    let mut unused = Vec::new();

    for (i, (token, span)) in tokens.iter().enumerate() {
        let Token::Number(value) = token else { continue };
        let angle = matches!(tokens.get(i + 1), Some((Token::Degree, _)));
        if !angle && !found.values().any(|(_, v)| v == *value) {
            unused.push((
                format!("value '{}' was not used", &detail.text[span.clone()]),
                span.clone(),
            ));
        }
    }

    for span in lexer::unrecognized(detail.text) {
        unused.push((
            format!("'{}' ignored", &detail.text[span.clone()]),
            span,
        ));
    }
    unused
}

/// `M10`, `M10×1.5`, `M10×1.5×20`, `M10×20`
pub fn thread_designation(detail: &Detail<'_>) -> Option<Dimensions> {
    let tokens = detail.tokens();
    let threading = detail.kind.family() == Family::Threading;
    let pos = tokens.iter().position(|(t, _)| match t {
        Token::Word(w) => w == "M" || (threading && w == "m"),
        _ => false,
    })?;

    let (_, m_span) = &tokens[pos];
    let (Token::Number(nominal), n_span) = tokens.get(pos + 1)? else {
        return None;
    };
    if n_span.start != m_span.end {
        return None;
    }

    let mut dims = Dimensions {
        diameter: Some(*nominal),
        ..Default::default()
    };

    let trailing = times_chain(tokens, pos + 2);
    match trailing.as_slice() {
        [] => {}
        // A value this small next to the nominal size can only be a pitch
        [first, rest @ ..] if *first < nominal * 0.5 => {
            dims.pitch = Some(*first);
            dims.length = rest.first().copied();
        }
        [first, ..] => dims.length = Some(*first),
    }

    Some(dims)
}

/// `ø60`, `Ø 25`, `⌀12`, `dia 8`, `D=30`
pub fn marked_diameter(detail: &Detail<'_>) -> Option<Dimensions> {
    let tokens = detail.tokens();
    tokens.iter().enumerate().find_map(|(i, (token, _))| {
        let marked = match token {
            Token::Diameter => true,
            Token::Word(w) => w == "D",
            _ => false,
        };
        if !marked {
            return None;
        }
        number_at(tokens, skip_equals(tokens, i + 1)).map(|d| Dimensions {
            diameter: Some(d),
            ..Default::default()
        })
    })
}

/// `L=100`, `W 20`, `depth: 12`, `P=1.5`, `wall=2`, `20 deep`
pub fn keyed_values(detail: &Detail<'_>) -> Option<Dimensions> {
    let tokens = detail.tokens();
    let mut dims = Dimensions::default();

    for (i, (token, _)) in tokens.iter().enumerate() {
        let Token::Word(word) = token else { continue };

        if let Some(field) = key_field(word, detail.kind) {
            if let Some(value) = number_at(tokens, skip_equals(tokens, i + 1)) {
                if dims.get(field).is_none() {
                    dims.set(field, value);
                }
            }
        } else if let Some(field) = postfix_field(word) {
            if let Some(value) = i.checked_sub(1).and_then(|prev| number_at(tokens, prev)) {
                if dims.get(field).is_none() {
                    dims.set(field, value);
                }
            }
        }
    }

    (!dims.is_empty()).then_some(dims)
}

/// `80×22×3.4mm` - values interpreted positionally per feature kind
pub fn separated_dimensions(detail: &Detail<'_>) -> Option<Dimensions> {
    let tokens = detail.tokens();
    let mut i = 0;

    while i < tokens.len() {
        if number_at(tokens, i).is_none() {
            i += 1;
            continue;
        }

        let values = times_chain(tokens, i);
        let consumed = values.len() * 2 - 1;
        let after_thread_mark = i > 0
            && tokens[i - 1].1.end == tokens[i].1.start
            && matches!(&tokens[i - 1].0, Token::Word(w) if w.eq_ignore_ascii_case("m"));

        if values.len() >= 2 && !after_thread_mark {
            let mut dims = Dimensions::default();
            for (field, value) in detail.kind.positional_layout().iter().zip(&values) {
                dims.set(*field, *value);
            }
            return Some(dims);
        }
        i += consumed;
    }

    None
}

/// A detail that is nothing but one number: the kind's primary dimension
pub fn bare_number(detail: &Detail<'_>) -> Option<Dimensions> {
    match detail.tokens() {
        [(Token::Number(value), _)] | [(Token::Number(value), _), (Token::Millimetre, _)] => {
            let mut dims = Dimensions::default();
            dims.set(detail.kind.positional_layout()[0], *value);
            Some(dims)
        }
        _ => None,
    }
}

fn number_at(tokens: &[(Token, Span)], i: usize) -> Option<f64> {
    match tokens.get(i) {
        Some((Token::Number(n), _)) => Some(*n),
        _ => None,
    }
}

fn skip_equals(tokens: &[(Token, Span)], i: usize) -> usize {
    match tokens.get(i) {
        Some((Token::Equals, _)) => i + 1,
        _ => i,
    }
}

/// Numbers joined by `×` starting at `start`, e.g. `80 × 22 × 3.4`
fn times_chain(tokens: &[(Token, Span)], start: usize) -> Vec<f64> {
    let mut values = Vec::new();
    let mut i = start;

    if let Some(first) = number_at(tokens, i) {
        values.push(first);
        i += 1;
    } else if !matches!(tokens.get(i), Some((Token::Times, _))) {
        return values;
    }

    while matches!(tokens.get(i), Some((Token::Times, _))) {
        match number_at(tokens, i + 1) {
            Some(v) => {
                values.push(v);
                i += 2;
            }
            None => break,
        }
    }
    values
}

fn key_field(word: &str, kind: FeatureKind) -> Option<Field> {
    match word {
        "L" | "l" => return Some(Field::Length),
        "W" | "w" => return Some(Field::Width),
        "T" => return Some(Field::Depth),
        "P" => return Some(Field::Pitch),
        "R" if kind.family() == Family::Simple => return Some(Field::Length),
        _ => {}
    }
    match word.to_ascii_lowercase().as_str() {
        "length" | "len" | "lg" => Some(Field::Length),
        "width" => Some(Field::Width),
        "depth" | "dp" | "tief" => Some(Field::Depth),
        "pitch" => Some(Field::Pitch),
        "wall" | "wt" => Some(Field::Wall),
        _ => None,
    }
}

fn postfix_field(word: &str) -> Option<Field> {
    match word.to_ascii_lowercase().as_str() {
        "deep" => Some(Field::Depth),
        "long" => Some(Field::Length),
        "wide" => Some(Field::Width),
        _ => None,
    }
}

/// ISO 286 fit letters: single case, one or two letters, not a dimension key
fn is_fit_letter(word: &str, kind: FeatureKind) -> bool {
    if word.is_empty() || word.len() > 2 {
        return false;
    }
    if key_field(word, kind).is_some() || word == "D" || word == "R" {
        return false;
    }
    if kind.family() == Family::Threading && word.eq_ignore_ascii_case("m") {
        return false;
    }
    word.chars().all(|c| c.is_ascii_lowercase()) || word.chars().all(|c| c.is_ascii_uppercase())
}

fn is_fit_grade(grade: f64) -> bool {
    grade.fract() == 0.0 && (1.0..=18.0).contains(&grade)
}

/// Drop tolerance designations such as `h9` or `H7`
fn strip_fit_classes(tokens: Vec<(Token, Span)>, kind: FeatureKind) -> Vec<(Token, Span)> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();

    while let Some((token, span)) = iter.next() {
        if let Token::Word(word) = &token {
            if is_fit_letter(word, kind) {
                if let Some((Token::Number(grade), next)) = iter.peek() {
                    if next.start == span.end && is_fit_grade(*grade) {
                        iter.next();
                        continue;
                    }
                }
            }
        }
        out.push((token, span));
    }
    out
}
