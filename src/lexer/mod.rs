use logos::Logos;

/// Tokens of a feature detail string
/// Covers the shorthand found on drawings and in CAD feature trees:
/// "ø60 h9", "M10×1.5", "80×22×3.4mm", "ø30, L=100", "1x45°"

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")] // Skip whitespace
#[logos(error = LexerError)]
pub enum Token {
    // Literals
    #[regex(r"\d+(\.\d+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r"[A-Za-z]+", |lex| lex.slice().to_string())]
    Word(String),

    // Diameter markers
    #[token("ø")]
    #[token("Ø")]
    #[token("⌀")]
    #[token("dia")]
    #[token("diameter")]
    Diameter,

    // Dimension separators
    #[token("x", priority = 3)]
    #[token("X", priority = 3)]
    #[token("×")]
    #[token("*")]
    Times,

    #[token("=")]
    #[token(":")]
    Equals,

    #[token(",")]
    #[token(";")]
    #[token("/")]
    Separator,

    #[token("mm")]
    Millimetre,

    #[token("°")]
    Degree,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LexerError;

impl std::fmt::Display for LexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lexer error")
    }
}

impl std::error::Error for LexerError {}

/// Lex the input string into tokens, dropping characters the lexer does not know
pub fn lex(input: &str) -> Vec<(Token, logos::Span)> {
    let tokens = Token::lexer(input)
        .spanned()
        .filter_map(|(result, span)| match result {
            Ok(token) => Some((token, span)),
            Err(_) => None,
        })
        .collect();
    merge_decimal_commas(input, tokens)
}

/// `12,5` is one number; `40,15,60` stays a list of three
fn merge_decimal_commas(input: &str, tokens: Vec<(Token, logos::Span)>) -> Vec<(Token, logos::Span)> {
    let integer = |i: usize| {
        matches!(tokens.get(i), Some((Token::Number(_), span))
            if input[span.clone()].bytes().all(|b| b.is_ascii_digit()))
    };
    let comma = |i: usize| {
        matches!(tokens.get(i), Some((Token::Separator, span)) if &input[span.clone()] == ",")
    };
    let touching = |i: usize| tokens[i].1.end == tokens[i + 1].1.start;

    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if !integer(i) {
            out.push(tokens[i].clone());
            i += 1;
            continue;
        }

        // Last index of a run `n,n,n` written without spaces
        let mut last = i;
        while integer(last + 2) && comma(last + 1) && touching(last) && touching(last + 1) {
            last += 2;
        }

        if last == i + 2 {
            let span = tokens[i].1.start..tokens[last].1.end;
            if let Ok(value) = input[span.clone()].replace(',', ".").parse::<f64>() {
                out.push((Token::Number(value), span));
                i = last + 1;
                continue;
            }
        }
        out.extend(tokens[i..=last].iter().cloned());
        i = last + 1;
    }
    out
}

/// Spans of input the lexer could not classify
pub fn unrecognized(input: &str) -> Vec<logos::Span> {
    Token::lexer(input)
        .spanned()
        .filter_map(|(result, span)| result.err().map(|_| span))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_diameter_with_fit() {
        assert_eq!(
            tokens("ø60 h9"),
            vec![
                Token::Diameter,
                Token::Number(60.0),
                Token::Word("h".to_string()),
                Token::Number(9.0),
            ]
        );
    }

    #[test]
    fn test_metric_thread() {
        assert_eq!(
            tokens("M10×1.5"),
            vec![
                Token::Word("M".to_string()),
                Token::Number(10.0),
                Token::Times,
                Token::Number(1.5),
            ]
        );
    }

    #[test]
    fn test_separated_dimensions() {
        assert_eq!(
            tokens("80x22x3.4mm"),
            vec![
                Token::Number(80.0),
                Token::Times,
                Token::Number(22.0),
                Token::Times,
                Token::Number(3.4),
                Token::Millimetre,
            ]
        );
    }

    #[test]
    fn test_keyed_length() {
        assert_eq!(
            tokens("ø30, L=100"),
            vec![
                Token::Diameter,
                Token::Number(30.0),
                Token::Separator,
                Token::Word("L".to_string()),
                Token::Equals,
                Token::Number(100.0),
            ]
        );
    }

    #[test]
    fn test_words_are_not_split_on_x() {
        assert_eq!(
            tokens("max 5"),
            vec![Token::Word("max".to_string()), Token::Number(5.0)]
        );
        assert_eq!(tokens("diagonal"), vec![Token::Word("diagonal".to_string())]);
    }

    #[test]
    fn test_spans_are_byte_offsets() {
        let lexed = lex("ø30");
        assert_eq!(lexed[0].1, 0..2);
        assert_eq!(lexed[1].1, 2..4);
    }

    #[test]
    fn test_decimal_comma() {
        assert_eq!(
            tokens("ø12,5 L=40"),
            vec![
                Token::Diameter,
                Token::Number(12.5),
                Token::Word("L".to_string()),
                Token::Equals,
                Token::Number(40.0),
            ]
        );
        assert_eq!(lex("ø12,5")[1].1, 2..6);
        assert_eq!(tokens("M10x1,5")[3], Token::Number(1.5));
    }

    #[test]
    fn test_comma_lists_and_spaced_commas_stay_separated() {
        assert_eq!(
            tokens("40,15,60"),
            vec![
                Token::Number(40.0),
                Token::Separator,
                Token::Number(15.0),
                Token::Separator,
                Token::Number(60.0),
            ]
        );
        assert_eq!(
            tokens("ø30, 100"),
            vec![Token::Diameter, Token::Number(30.0), Token::Separator, Token::Number(100.0)]
        );
        // A decimal before the comma is not extended
        assert_eq!(tokens("1.5,3")[1], Token::Separator);
    }

    #[test]
    fn test_unrecognized_characters_reported() {
        // "ø" is two bytes wide
        assert_eq!(unrecognized("ø30 #"), vec![5..6]);
        assert!(unrecognized("ø30, L=100").is_empty());
    }
}
