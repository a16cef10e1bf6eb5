//! Fuzz target for the request grammar.
//!
//! Tests:
//! - The parser never panics on arbitrary text
//! - Every accepted request names 1..=MAX_LINES lines
//! - Parsed requests that build a table get dense positions
//! - Creating from the same text on a mock provider leaks no line

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use dio_aggregator::lookup::build_table;
use dio_aggregator::{parse_request, AggregatorRegistry, MAX_LINES};
use dio_driver_mock::{MockChipConfig, MockLineProvider};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Input {
    /// Raw text
    Text(String),
    /// Tokens joined by spaces, biased toward the grammar
    Tokens(Vec<Token>),
}

#[derive(Debug, Arbitrary)]
enum Token {
    Label(u8),
    Offset(u16),
    Range(u16, u16),
    Quoted(String),
    Raw(String),
}

impl Token {
    fn render(&self) -> String {
        match self {
            Token::Label(n) => format!("gpio{}", n % 4),
            Token::Offset(o) => o.to_string(),
            Token::Range(a, b) => format!("{}-{}", a, b),
            Token::Quoted(s) => format!("\"{}\"", s.replace('"', "")),
            Token::Raw(s) => s.clone(),
        }
    }
}

fuzz_target!(|input: Input| {
    let text = match input {
        Input::Text(text) => text,
        Input::Tokens(tokens) => tokens
            .iter()
            .map(Token::render)
            .collect::<Vec<_>>()
            .join(" "),
    };

    let Ok(selectors) = parse_request(&text) else {
        return;
    };
    assert!(!selectors.is_empty());
    assert!(selectors.len() <= MAX_LINES);

    if let Ok(table) = build_table("fuzz.0", &selectors) {
        for (i, entry) in table.entries().iter().enumerate() {
            assert_eq!(entry.position as usize, i);
        }
    }

    let provider = Arc::new(
        MockLineProvider::from_configs((0..4).map(|n| MockChipConfig::new(format!("gpio{}", n), 64)))
            .unwrap(),
    );
    let registry = AggregatorRegistry::new(provider.clone());
    if let Ok(id) = registry.create(&text) {
        registry.destroy(id).unwrap();
    }
    assert_eq!(provider.claimed(), 0);
});
