//! Lookup table binding composite positions to line selectors.
//!
//! Position `i` of an aggregator is the `i`-th line of its request. The table
//! is built before any line is acquired, so a request naming the same line
//! twice fails here without touching the provider.

use std::collections::HashSet;

use dio_core::{HwIndex, LineSelector};
use tracing::debug;

use crate::error::{AggregatorError, AggregatorResult};
use crate::parser::ParseError;

/// One row of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEntry {
    /// Controller label, or the line name for named lines.
    pub key: String,
    /// Offset on the controller, or `Named` for a named line.
    pub hw_index: HwIndex,
    /// Position on the composite device.
    pub position: u32,
}

impl LookupEntry {
    /// Selector to acquire this entry's line with.
    pub fn selector(&self) -> LineSelector {
        LineSelector {
            key: self.key.clone(),
            hw_index: self.hw_index,
        }
    }
}

/// Ordered selector table for one composite device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTable {
    dev_id: String,
    entries: Vec<LookupEntry>,
}

impl LookupTable {
    /// Name of the device this table belongs to.
    pub fn dev_id(&self) -> &str {
        &self.dev_id
    }

    /// Entries in position order.
    pub fn entries(&self) -> &[LookupEntry] {
        &self.entries
    }

    /// Number of lines.
    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Whether there are no lines.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `position`.
    pub fn get(&self, position: u32) -> Option<&LookupEntry> {
        self.entries.get(position as usize)
    }
}

/// Incremental table builder. Each added line gets the next position.
#[derive(Debug)]
pub struct LookupTableBuilder {
    dev_id: String,
    entries: Vec<LookupEntry>,
    seen: HashSet<LineSelector>,
}

impl LookupTableBuilder {
    /// Empty builder for the device `dev_id`.
    pub fn new(dev_id: impl Into<String>) -> Self {
        Self {
            dev_id: dev_id.into(),
            entries: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Append `selector`, returning its position.
    pub fn add(&mut self, selector: &LineSelector) -> AggregatorResult<u32> {
        if self.seen.contains(selector) {
            return Err(AggregatorError::DuplicateLine {
                key: selector.key.clone(),
                hw_index: selector.hw_index,
            });
        }

        // Growth is one entry at a time; allocation failure is reported, not fatal.
        self.entries
            .try_reserve(1)
            .map_err(|_| AggregatorError::OutOfMemory)?;
        self.seen
            .try_reserve(1)
            .map_err(|_| AggregatorError::OutOfMemory)?;

        let position = self.entries.len() as u32;
        self.entries.push(LookupEntry {
            key: selector.key.clone(),
            hw_index: selector.hw_index,
            position,
        });
        self.seen.insert(selector.clone());
        Ok(position)
    }

    /// Entries added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no lines.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finished table. An empty builder is [`ParseError::NoLines`].
    pub fn finish(self) -> AggregatorResult<LookupTable> {
        if self.entries.is_empty() {
            return Err(ParseError::NoLines.into());
        }
        debug!(dev_id = %self.dev_id, lines = self.entries.len(), "Built lookup table");
        Ok(LookupTable {
            dev_id: self.dev_id,
            entries: self.entries,
        })
    }
}

/// Build the table for `dev_id` from parsed selectors.
pub fn build_table(dev_id: &str, selectors: &[LineSelector]) -> AggregatorResult<LookupTable> {
    let mut builder = LookupTableBuilder::new(dev_id);
    for selector in selectors {
        builder.add(selector)?;
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_request;

    #[test]
    fn test_positions_follow_request_order() {
        let selectors = parse_request("gpio0 1,3-4 gpio1 2").unwrap();
        let table = build_table("dio-aggregator.0", &selectors).unwrap();

        assert_eq!(table.dev_id(), "dio-aggregator.0");
        assert_eq!(table.len(), 4);
        let rows: Vec<_> = table
            .entries()
            .iter()
            .map(|e| (e.key.as_str(), e.hw_index, e.position))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("gpio0", HwIndex::Offset(1), 0),
                ("gpio0", HwIndex::Offset(3), 1),
                ("gpio0", HwIndex::Offset(4), 2),
                ("gpio1", HwIndex::Offset(2), 3),
            ]
        );
        assert_eq!(table.get(3).unwrap().selector(), LineSelector::offset("gpio1", 2));
        assert!(table.get(4).is_none());
    }

    #[test]
    fn test_duplicate_offset_is_rejected() {
        let selectors = parse_request("gpio0 1,1").unwrap();
        let err = build_table("x.0", &selectors).unwrap_err();
        assert!(matches!(
            err,
            AggregatorError::DuplicateLine { ref key, hw_index: HwIndex::Offset(1) } if key == "gpio0"
        ));
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let selectors = parse_request("reset gpio0 0 reset").unwrap();
        assert!(matches!(
            build_table("x.0", &selectors),
            Err(AggregatorError::DuplicateLine {
                hw_index: HwIndex::ByName,
                ..
            })
        ));
    }

    #[test]
    fn test_same_offset_on_different_chips() {
        let selectors = parse_request("gpio0 0 gpio1 0").unwrap();
        assert_eq!(build_table("x.0", &selectors).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_table() {
        assert!(matches!(
            build_table("x.0", &[]),
            Err(AggregatorError::Parse(ParseError::NoLines))
        ));
    }
}
