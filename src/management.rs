//! Text management interface.
//!
//! Two operations, both taking the raw text an operator wrote:
//!
//! - `new_device <request>` creates an aggregator and answers with its
//!   device name, `<prefix>.<id>`.
//! - `delete_device <prefix>.<id>` destroys it. A name that does not have
//!   that exact shape is refused before any lookup.

use std::sync::Arc;

use tracing::debug;

use crate::error::{AggregatorError, AggregatorResult};
use crate::forwarder::ForwarderFeatures;
use crate::registry::AggregatorRegistry;

/// Text management interface: create and delete devices by name.
#[derive(Debug, Clone)]
pub struct Management {
    registry: Arc<AggregatorRegistry>,
}

impl Management {
    /// Interface over `registry`.
    pub fn new(registry: Arc<AggregatorRegistry>) -> Self {
        Self { registry }
    }

    /// Underlying registry.
    pub fn registry(&self) -> &Arc<AggregatorRegistry> {
        &self.registry
    }

    /// Create a device from `request` and return its name.
    pub fn new_device(&self, request: &str) -> AggregatorResult<String> {
        self.new_device_with(request, ForwarderFeatures::empty())
    }

    /// Like [`Management::new_device`], with forwarder features.
    pub fn new_device_with(
        &self,
        request: &str,
        features: ForwarderFeatures,
    ) -> AggregatorResult<String> {
        let id = self.registry.create_with(request.trim(), features)?;
        Ok(self.registry.device_name(id))
    }

    /// Destroy the device called `name`.
    pub fn delete_device(&self, name: &str) -> AggregatorResult<()> {
        let id = parse_device_name(self.registry.prefix(), name)?;
        debug!(id, "Deleting device");
        self.registry.destroy(id)
    }
}

/// Extract the id from `<prefix>.<id>`.
///
/// Surrounding whitespace (a trailing newline from `echo`) is ignored. The id
/// must be plain decimal digits that fit in a `u32`.
pub fn parse_device_name(prefix: &str, name: &str) -> AggregatorResult<u32> {
    let trimmed = name.trim();
    let invalid = || AggregatorError::InvalidDeviceName {
        input: trimmed.to_string(),
    };

    let id = trimmed
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .ok_or_else(invalid)?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    id.parse().map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dio_driver_mock::{MockChipConfig, MockLineProvider};

    fn management() -> Management {
        let provider =
            Arc::new(MockLineProvider::from_configs([MockChipConfig::new("gpio0", 4)]).unwrap());
        Management::new(Arc::new(AggregatorRegistry::new(provider)))
    }

    #[test]
    fn test_parse_device_name() {
        let prefix = "dio-aggregator";
        assert_eq!(parse_device_name(prefix, "dio-aggregator.0").unwrap(), 0);
        assert_eq!(parse_device_name(prefix, "dio-aggregator.12\n").unwrap(), 12);

        for bad in [
            "dio-aggregator",
            "dio-aggregator.",
            "dio-aggregator.x",
            "dio-aggregator.-1",
            "dio-aggregator.+1",
            "dio-aggregator.99999999999",
            "other.0",
            "dio-aggregator0",
        ] {
            assert!(
                matches!(
                    parse_device_name(prefix, bad),
                    Err(AggregatorError::InvalidDeviceName { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_new_and_delete() {
        let mgmt = management();
        let name = mgmt.new_device("gpio0 0-1\n").unwrap();
        assert_eq!(name, "dio-aggregator.0");
        assert_eq!(mgmt.registry().len(), 1);

        mgmt.delete_device(&name).unwrap();
        assert!(mgmt.registry().is_empty());
    }

    #[test]
    fn test_delete_errors() {
        let mgmt = management();
        assert!(matches!(
            mgmt.delete_device("dio-aggregator.3"),
            Err(AggregatorError::NoSuchDevice { id: 3 })
        ));
        assert!(matches!(
            mgmt.delete_device("garbage"),
            Err(AggregatorError::InvalidDeviceName { .. })
        ));
    }
}
