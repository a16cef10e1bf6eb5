//! Aggregator registry.
//!
//! The registry owns every live aggregator, keyed by a small numeric id. One
//! registry-wide lock serializes `create`, `destroy` and `drain`; forwarding
//! calls never take it, and the registry never waits on a forwarder while
//! holding it. Detaching a forwarder and releasing its lines happen after the
//! registry lock is dropped.
//!
//! # Lifecycle
//!
//! ```text
//! create:  parse -> build table -> acquire lines -> build forwarder
//!          -> allocate id -> publish
//! destroy: remove id -> unpublish -> (unlock) -> detach -> release lines (reverse)
//! ```
//!
//! Any failure during `create` releases the lines acquired so far, in reverse
//! order, and leaves the registry unchanged.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dio_aggregator::AggregatorRegistry;
//! use dio_core::LineDevice;
//! use dio_driver_mock::{MockChipConfig, MockLineProvider};
//!
//! let provider = Arc::new(MockLineProvider::from_configs([
//!     MockChipConfig::new("gpio0", 8),
//! ])?);
//! let registry = AggregatorRegistry::new(provider);
//!
//! let id = registry.create("gpio0 1,3-4")?;
//! let device = registry.device(id).unwrap();
//! assert_eq!(device.line_count(), 3);
//!
//! registry.destroy(id)?;
//! assert!(registry.is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use dio_core::{DevicePublisher, LineDevice, LineHandle, LineProvider};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{AggregatorError, AggregatorResult};
use crate::forwarder::{Forwarder, ForwarderFeatures};
use crate::lookup::{build_table, LookupTable};
use crate::parser::parse_request;

/// Device name prefix used when none is configured.
pub const DEFAULT_DEVICE_PREFIX: &str = "dio-aggregator";

/// Summary of one live aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatorInfo {
    /// Registry id.
    pub id: u32,
    /// Published device name, `<prefix>.<id>`.
    pub name: String,
    /// Request text the aggregator was created from.
    pub request: String,
    /// Number of positions.
    pub line_count: u32,
    /// Whether line operations may sleep.
    pub can_block: bool,
    /// Ramp delay table present.
    pub delay: bool,
}

struct Aggregator {
    name: String,
    request: String,
    table: LookupTable,
    forwarder: Arc<Forwarder>,
    /// In acquisition order.
    handles: Vec<Arc<dyn LineHandle>>,
}

impl Aggregator {
    fn info(&self, id: u32) -> AggregatorInfo {
        AggregatorInfo {
            id,
            name: self.name.clone(),
            request: self.request.clone(),
            line_count: self.forwarder.line_count(),
            can_block: self.forwarder.can_block(),
            delay: self.forwarder.has_delay(),
        }
    }
}

/// Registry of live aggregators over one line provider.
pub struct AggregatorRegistry {
    provider: Arc<dyn LineProvider>,
    publisher: Option<Arc<dyn DevicePublisher>>,
    prefix: String,
    aggregators: Mutex<BTreeMap<u32, Aggregator>>,
}

impl AggregatorRegistry {
    /// Empty registry acquiring lines from `provider`.
    pub fn new(provider: Arc<dyn LineProvider>) -> Self {
        Self {
            provider,
            publisher: None,
            prefix: DEFAULT_DEVICE_PREFIX.to_string(),
            aggregators: Mutex::new(BTreeMap::new()),
        }
    }

    /// Use `prefix` for device names instead of [`DEFAULT_DEVICE_PREFIX`].
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Publish every created device through `publisher`.
    pub fn with_publisher(mut self, publisher: Arc<dyn DevicePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Device name prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Device name for `id`: `<prefix>.<id>`.
    pub fn device_name(&self, id: u32) -> String {
        format!("{}.{}", self.prefix, id)
    }

    /// Create an aggregator from request text. Returns its id.
    pub fn create(&self, request: &str) -> AggregatorResult<u32> {
        self.create_with(request, ForwarderFeatures::empty())
    }

    /// Create an aggregator with optional forwarder features.
    pub fn create_with(&self, request: &str, features: ForwarderFeatures) -> AggregatorResult<u32> {
        let selectors = parse_request(request).map_err(|e| {
            error!(request, error = %e, "Cannot parse aggregation request");
            AggregatorError::from(e)
        })?;

        let mut aggregators = self.aggregators.lock();
        let id = smallest_free_id(&aggregators);
        let name = self.device_name(id);

        let table = build_table(&name, &selectors)?;
        let handles = self.acquire_all(&table, &name)?;

        let forwarder = match Forwarder::build(&name, table.len(), handles.clone(), features) {
            Ok(forwarder) => Arc::new(forwarder),
            Err(e) => {
                self.release_all(&handles);
                return Err(e.into());
            }
        };

        if let Some(publisher) = &self.publisher {
            let device: Arc<dyn LineDevice> = forwarder.clone();
            if let Err(source) = publisher.publish(&name, device) {
                drop(aggregators);
                forwarder.detach();
                self.release_all(&handles);
                return Err(AggregatorError::Publish { name, source });
            }
        }

        info!(
            id,
            device = %name,
            lines = table.len(),
            can_block = forwarder.can_block(),
            "Created aggregator"
        );
        aggregators.insert(
            id,
            Aggregator {
                name,
                request: request.to_string(),
                table,
                forwarder,
                handles,
            },
        );
        Ok(id)
    }

    /// Destroy the aggregator `id`.
    ///
    /// The id is free for reuse as soon as it leaves the map; the call
    /// returns once in-flight operations on the device have finished and its
    /// lines are released.
    pub fn destroy(&self, id: u32) -> AggregatorResult<()> {
        let aggregator = {
            let mut aggregators = self.aggregators.lock();
            let aggregator = aggregators
                .remove(&id)
                .ok_or(AggregatorError::NoSuchDevice { id })?;
            self.unpublish(&aggregator);
            aggregator
        };
        self.teardown(id, aggregator);
        Ok(())
    }

    /// Destroy every aggregator. Returns how many were destroyed.
    pub fn drain(&self) -> usize {
        let drained = {
            let mut aggregators = self.aggregators.lock();
            let drained = std::mem::take(&mut *aggregators);
            for aggregator in drained.values() {
                self.unpublish(aggregator);
            }
            drained
        };
        let count = drained.len();
        for (id, aggregator) in drained {
            self.teardown(id, aggregator);
        }
        if count > 0 {
            info!(count, "Drained aggregators");
        }
        count
    }

    /// Live ids, ascending.
    pub fn ids(&self) -> Vec<u32> {
        self.aggregators.lock().keys().copied().collect()
    }

    /// Number of live aggregators.
    pub fn len(&self) -> usize {
        self.aggregators.lock().len()
    }

    /// Whether no aggregator is live.
    pub fn is_empty(&self) -> bool {
        self.aggregators.lock().is_empty()
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: u32) -> bool {
        self.aggregators.lock().contains_key(&id)
    }

    /// Forwarder of aggregator `id`.
    pub fn device(&self, id: u32) -> Option<Arc<Forwarder>> {
        self.aggregators
            .lock()
            .get(&id)
            .map(|a| a.forwarder.clone())
    }

    /// Forwarder published as `name`.
    pub fn device_by_name(&self, name: &str) -> Option<Arc<Forwarder>> {
        self.aggregators
            .lock()
            .values()
            .find(|a| a.name == name)
            .map(|a| a.forwarder.clone())
    }

    /// Summary of aggregator `id`.
    pub fn info(&self, id: u32) -> Option<AggregatorInfo> {
        self.aggregators.lock().get(&id).map(|a| a.info(id))
    }

    /// Every live aggregator, by ascending id.
    pub fn list(&self) -> Vec<AggregatorInfo> {
        self.aggregators
            .lock()
            .iter()
            .map(|(id, a)| a.info(*id))
            .collect()
    }

    /// Lookup table of aggregator `id`.
    pub fn table(&self, id: u32) -> Option<LookupTable> {
        self.aggregators.lock().get(&id).map(|a| a.table.clone())
    }

    fn acquire_all(
        &self,
        table: &LookupTable,
        consumer: &str,
    ) -> AggregatorResult<Vec<Arc<dyn LineHandle>>> {
        let mut handles = Vec::with_capacity(table.entries().len());
        for entry in table.entries() {
            let selector = entry.selector();
            match self.provider.acquire(&selector, consumer) {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    warn!(
                        device = consumer,
                        line = %selector,
                        acquired = handles.len(),
                        error = %source,
                        "Cannot acquire line, unwinding"
                    );
                    self.release_all(&handles);
                    return Err(AggregatorError::Resolve {
                        selector: selector.to_string(),
                        source,
                    });
                }
            }
        }
        Ok(handles)
    }

    fn release_all(&self, handles: &[Arc<dyn LineHandle>]) {
        for handle in handles.iter().rev() {
            self.provider.release(handle);
        }
    }

    fn unpublish(&self, aggregator: &Aggregator) {
        if let Some(publisher) = &self.publisher {
            publisher.unpublish(&aggregator.name);
        }
    }

    /// Called without the registry lock held.
    fn teardown(&self, id: u32, aggregator: Aggregator) {
        aggregator.forwarder.detach();
        self.release_all(&aggregator.handles);
        info!(id, device = %aggregator.name, "Destroyed aggregator");
    }
}

impl Drop for AggregatorRegistry {
    fn drop(&mut self) {
        self.drain();
    }
}

impl std::fmt::Debug for AggregatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatorRegistry")
            .field("prefix", &self.prefix)
            .field("ids", &self.ids())
            .finish()
    }
}

fn smallest_free_id(aggregators: &BTreeMap<u32, Aggregator>) -> u32 {
    let mut id = 0;
    for &used in aggregators.keys() {
        if used != id {
            break;
        }
        id += 1;
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParseError;
    use dio_core::HwIndex;
    use dio_driver_mock::{MockChipConfig, MockLineProvider};

    fn setup() -> (Arc<MockLineProvider>, AggregatorRegistry) {
        let provider = Arc::new(
            MockLineProvider::from_configs([
                MockChipConfig::new("gpio0", 8).with_names(["reset", "enable"]),
                MockChipConfig::new("gpio1", 4),
            ])
            .unwrap(),
        );
        let registry = AggregatorRegistry::new(provider.clone());
        (provider, registry)
    }

    #[test]
    fn test_ids_are_smallest_free() {
        let (_p, registry) = setup();
        assert_eq!(registry.create("gpio0 0").unwrap(), 0);
        assert_eq!(registry.create("gpio0 1").unwrap(), 1);
        assert_eq!(registry.create("gpio0 2").unwrap(), 2);

        registry.destroy(1).unwrap();
        assert_eq!(registry.create("gpio0 3").unwrap(), 1);
        assert_eq!(registry.ids(), vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_request_allocates_nothing() {
        let (p, registry) = setup();
        assert!(matches!(
            registry.create(""),
            Err(AggregatorError::Parse(ParseError::NoLines))
        ));
        assert!(registry.is_empty());
        assert!(p.events().is_empty());
    }

    #[test]
    fn test_duplicate_rejected_before_acquire() {
        let (p, registry) = setup();
        let err = registry.create("gpio0 3,3").unwrap_err();
        assert!(matches!(
            err,
            AggregatorError::DuplicateLine {
                hw_index: HwIndex::Offset(3),
                ..
            }
        ));
        assert!(p.events().is_empty());
        assert_eq!(p.claimed(), 0);
    }

    #[test]
    fn test_missing_line_unwinds() {
        let (p, registry) = setup();
        let err = registry.create("gpio0 0,1 gpio1 9").unwrap_err();
        assert!(matches!(err, AggregatorError::Resolve { ref selector, .. } if selector == "gpio1 9"));
        assert!(err.line_error().is_some_and(|e| e.is_not_found()));
        assert_eq!(p.claimed(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_info_and_lookup() {
        let (_p, registry) = setup();
        let id = registry
            .create_with("reset gpio1 0-1", ForwarderFeatures::DELAY)
            .unwrap();
        let info = registry.info(id).unwrap();
        assert_eq!(
            info,
            AggregatorInfo {
                id,
                name: "dio-aggregator.0".into(),
                request: "reset gpio1 0-1".into(),
                line_count: 3,
                can_block: false,
                delay: true,
            }
        );
        assert!(registry.device_by_name("dio-aggregator.0").is_some());
        assert!(registry.device_by_name("dio-aggregator.1").is_none());
        assert_eq!(registry.table(id).unwrap().len(), 3);
        assert_eq!(registry.list(), vec![info]);
    }

    #[test]
    fn test_custom_prefix() {
        let (_p, registry) = setup();
        let registry = registry.with_prefix("bank");
        let id = registry.create("gpio0 0").unwrap();
        assert_eq!(registry.device_name(id), "bank.0");
        assert_eq!(registry.device(id).unwrap().label(), "bank.0");
    }

    #[test]
    fn test_destroy_unknown() {
        let (_p, registry) = setup();
        assert!(matches!(
            registry.destroy(7),
            Err(AggregatorError::NoSuchDevice { id: 7 })
        ));
    }

    #[test]
    fn test_drop_releases_lines() {
        let (p, registry) = setup();
        registry.create("gpio0 0-3").unwrap();
        assert_eq!(p.claimed(), 4);
        drop(registry);
        assert_eq!(p.claimed(), 0);
    }
}
