//! Request text parser.
//!
//! A request is a whitespace-separated token stream. The first token is always
//! a label. A token following a label is either a list expression, which
//! yields one offset reference per listed value for that label, or another
//! label, in which case the previous label is taken to be the name of a
//! single line. A label left at the end of the input is also a named line.
//!
//! ```text
//! gpio0 1,3-4 reset gpio1 2
//!   -> gpio0 1, gpio0 3, gpio0 4, reset (by name), gpio1 2
//! ```
//!
//! List expressions are comma-separated values or inclusive ranges
//! (`0,2-5,7`), offsets below [`MAX_LINES`]. A double-quoted token is always a
//! label, which is the way to name a line whose name looks like a number.

use dio_core::LineSelector;
use thiserror::Error;

/// Maximum number of lines in one aggregator, and the exclusive upper bound
/// on offsets accepted in a list expression.
pub const MAX_LINES: usize = 512;

/// Errors from [`parse_request`] and [`parse_list`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Empty request
    #[error("request names no lines")]
    NoLines,

    /// More than [`MAX_LINES`] lines requested
    #[error("request names more than {max} lines")]
    TooManyLines { max: usize },

    /// Numeric list with a descending range or an offset out of range
    #[error("cannot parse list '{token}': {reason}")]
    InvalidList { token: String, reason: String },

    /// Unquoted label that parses as a list
    #[error("'{token}' looks like a line list but is in label position (quote it to use it as a name)")]
    NumericLabel { token: String },

    /// A quoted token is not closed
    #[error("unterminated quote")]
    UnterminatedQuote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    quoted: bool,
}

/// Splits input on whitespace, honouring double quotes.
struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    fn new(input: &'a str) -> Self {
        Self { rest: input }
    }

    fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        let rest = self.rest.trim_start();
        if rest.is_empty() {
            self.rest = rest;
            return Ok(None);
        }

        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').ok_or(ParseError::UnterminatedQuote)?;
            self.rest = &quoted[end + 1..];
            return Ok(Some(Token {
                text: quoted[..end].to_string(),
                quoted: true,
            }));
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        self.rest = &rest[end..];
        Ok(Some(Token {
            text: rest[..end].to_string(),
            quoted: false,
        }))
    }
}

/// Outcome of trying a token as a list expression.
#[derive(Debug, PartialEq, Eq)]
enum ListParse {
    /// Not list syntax at all; the token is a label.
    NotAList,
    /// List syntax with unusable values (descending range, offset too large).
    Invalid(String),
    List(Vec<u32>),
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn classify(token: &str) -> ListParse {
    let mut ranges = Vec::new();
    for item in token.split(',') {
        let (start, end) = match item.split_once('-') {
            Some((start, end)) => (start, end),
            None => (item, item),
        };
        if !is_digits(start) || !is_digits(end) {
            return ListParse::NotAList;
        }
        ranges.push((start, end));
    }

    let mut offsets = Vec::new();
    for (start, end) in ranges {
        let (start, end) = match (start.parse::<u32>(), end.parse::<u32>()) {
            (Ok(start), Ok(end)) => (start, end),
            _ => return ListParse::Invalid("value out of range".to_string()),
        };
        if start > end {
            return ListParse::Invalid(format!("descending range {}-{}", start, end));
        }
        if end as usize >= MAX_LINES {
            return ListParse::Invalid(format!(
                "offset {} exceeds maximum {}",
                end,
                MAX_LINES - 1
            ));
        }
        offsets.extend(start..=end);
    }
    offsets.sort_unstable();
    ListParse::List(offsets)
}

/// Parse a bare list expression such as `0,2-5`.
///
/// Offsets come back in ascending order. Used by the console to select
/// positions on a composite device.
pub fn parse_list(token: &str) -> Result<Vec<u32>, ParseError> {
    match classify(token) {
        ListParse::List(offsets) => Ok(offsets),
        ListParse::Invalid(reason) => Err(ParseError::InvalidList {
            token: token.to_string(),
            reason,
        }),
        ListParse::NotAList => Err(ParseError::InvalidList {
            token: token.to_string(),
            reason: "not a list expression".to_string(),
        }),
    }
}

fn push(refs: &mut Vec<LineSelector>, reference: LineSelector) -> Result<(), ParseError> {
    if refs.len() >= MAX_LINES {
        return Err(ParseError::TooManyLines { max: MAX_LINES });
    }
    refs.push(reference);
    Ok(())
}

fn check_label(token: &Token) -> Result<(), ParseError> {
    if !token.quoted && classify(&token.text) != ListParse::NotAList {
        return Err(ParseError::NumericLabel {
            token: token.text.clone(),
        });
    }
    Ok(())
}

/// Parse request text into line selectors, in request order.
///
/// Duplicates are kept; rejecting them is the lookup table's job.
pub fn parse_request(input: &str) -> Result<Vec<LineSelector>, ParseError> {
    let mut tokens = Tokens::new(input);
    let mut refs = Vec::new();

    let Some(mut label) = tokens.next_token()? else {
        return Err(ParseError::NoLines);
    };

    loop {
        check_label(&label)?;

        let Some(next) = tokens.next_token()? else {
            push(&mut refs, LineSelector::named(label.text))?;
            break;
        };

        let parsed = if next.quoted {
            ListParse::NotAList
        } else {
            classify(&next.text)
        };

        match parsed {
            ListParse::List(offsets) => {
                for offset in offsets {
                    push(&mut refs, LineSelector::offset(label.text.clone(), offset))?;
                }
                match tokens.next_token()? {
                    Some(token) => label = token,
                    None => break,
                }
            }
            ListParse::Invalid(reason) => {
                return Err(ParseError::InvalidList {
                    token: next.text,
                    reason,
                });
            }
            ListParse::NotAList => {
                push(&mut refs, LineSelector::named(label.text))?;
                label = next;
            }
        }
    }

    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(label: &str, list: &[u32]) -> Vec<LineSelector> {
        list.iter()
            .map(|&o| LineSelector::offset(label, o))
            .collect()
    }

    #[test]
    fn test_chip_with_offsets() {
        let refs = parse_request("gpio0 1,3-4 gpio1 2").unwrap();
        let mut expected = offsets("gpio0", &[1, 3, 4]);
        expected.extend(offsets("gpio1", &[2]));
        assert_eq!(refs, expected);
    }

    #[test]
    fn test_named_lines() {
        let refs = parse_request("reset  enable\tgpio0 0").unwrap();
        assert_eq!(
            refs,
            vec![
                LineSelector::named("reset"),
                LineSelector::named("enable"),
                LineSelector::offset("gpio0", 0),
            ]
        );
    }

    #[test]
    fn test_trailing_label_is_named_line() {
        let refs = parse_request("gpio0 0 led").unwrap();
        assert_eq!(
            refs,
            vec![LineSelector::offset("gpio0", 0), LineSelector::named("led")]
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_request(""), Err(ParseError::NoLines));
        assert_eq!(parse_request("  \n\t "), Err(ParseError::NoLines));
    }

    #[test]
    fn test_list_is_sorted_and_keeps_duplicates() {
        let refs = parse_request("gpio0 5,1-2,1").unwrap();
        assert_eq!(refs, offsets("gpio0", &[1, 1, 2, 5]));
    }

    #[test]
    fn test_descending_range_is_rejected() {
        let err = parse_request("gpio0 4-2").unwrap_err();
        assert!(matches!(err, ParseError::InvalidList { ref token, .. } if token == "4-2"));
    }

    #[test]
    fn test_offset_limit() {
        assert!(parse_request("gpio0 511").is_ok());
        assert!(matches!(
            parse_request("gpio0 512"),
            Err(ParseError::InvalidList { .. })
        ));
        assert!(matches!(
            parse_request("gpio0 99999999999"),
            Err(ParseError::InvalidList { .. })
        ));
    }

    #[test]
    fn test_numeric_label_is_rejected() {
        assert_eq!(
            parse_request("3"),
            Err(ParseError::NumericLabel { token: "3".into() })
        );
        assert_eq!(
            parse_request("gpio0 1 2"),
            Err(ParseError::NumericLabel { token: "2".into() })
        );
    }

    #[test]
    fn test_quoted_tokens() {
        let refs = parse_request(r#""line 7" "42" gpio0 "1""#).unwrap();
        assert_eq!(
            refs,
            vec![
                LineSelector::named("line 7"),
                LineSelector::named("42"),
                LineSelector::named("gpio0"),
                LineSelector::named("1"),
            ]
        );
        assert_eq!(
            parse_request(r#"gpio0 "1"#),
            Err(ParseError::UnterminatedQuote)
        );
    }

    #[test]
    fn test_too_many_lines() {
        assert_eq!(parse_request("a 0-511").unwrap().len(), MAX_LINES);
        assert_eq!(
            parse_request("a 0-511 b 0"),
            Err(ParseError::TooManyLines { max: MAX_LINES })
        );
    }

    #[test]
    fn test_malformed_list_is_a_label() {
        // Not list syntax, so these are names rather than offsets.
        let refs = parse_request("gpio0 1- x 2,,3").unwrap();
        assert_eq!(
            refs,
            vec![
                LineSelector::named("gpio0"),
                LineSelector::named("1-"),
                LineSelector::named("x"),
                LineSelector::named("2,,3"),
            ]
        );
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("0,2-4").unwrap(), vec![0, 2, 3, 4]);
        assert!(parse_list("led").is_err());
        assert!(parse_list("3-1").is_err());
    }
}
