//! In-memory [`LineProvider`] over a set of mock chips.
//!
//! Besides handing out lines of [`MockChip`]s, the provider implements
//! [`DevicePublisher`]: a published [`LineDevice`] becomes a chip of its own,
//! addressable by `<name> <offset>` selectors, so composite devices can be
//! stacked. Every acquire and release is appended to an event log.

use std::sync::Arc;

use dio_core::{
    DevicePublisher, DioError, DioResult, Direction, HwIndex, LineConfig, LineDevice, LineHandle,
    LineProvider, LineSelector,
};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::chip::{MockChip, MockChipConfig, MockLine, MockLineHandle};
use crate::faults::LineOp;

/// One entry of the provider's acquire/release log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// `consumer` acquired `line`
    Acquired { line: String, consumer: String },
    /// `line` was released
    Released { line: String },
}

/// A published composite device seen as a chip.
struct PublishedChip {
    name: String,
    device: Arc<dyn LineDevice>,
    owners: Mutex<Vec<Option<String>>>,
}

enum ChipEntry {
    Mock(Arc<MockChip>),
    Published(Arc<PublishedChip>),
}

impl ChipEntry {
    fn label(&self) -> &str {
        match self {
            ChipEntry::Mock(chip) => chip.label(),
            ChipEntry::Published(chip) => &chip.name,
        }
    }
}

/// What `release` has to undo.
enum Claim {
    Mock(Arc<MockLine>),
    Published { chip: Arc<PublishedChip>, offset: u32 },
}

struct ClaimRecord {
    handle: Arc<dyn LineHandle>,
    claim: Claim,
}

/// Simulated line provider.
#[derive(Default)]
pub struct MockLineProvider {
    chips: RwLock<Vec<ChipEntry>>,
    claims: Mutex<Vec<ClaimRecord>>,
    events: Mutex<Vec<ProviderEvent>>,
}

impl MockLineProvider {
    /// Provider without chips.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider populated from chip descriptions.
    pub fn from_configs(configs: impl IntoIterator<Item = MockChipConfig>) -> DioResult<Self> {
        let provider = Self::new();
        for config in configs {
            provider.add_chip(MockChip::new(config))?;
        }
        Ok(provider)
    }

    /// Add a chip. Labels must be unique.
    pub fn add_chip(&self, chip: MockChip) -> DioResult<Arc<MockChip>> {
        let mut chips = self.chips.write();
        if chips.iter().any(|c| c.label() == chip.label()) {
            return Err(DioError::InvalidArgument {
                message: format!("chip '{}' already exists", chip.label()),
            });
        }
        let chip = Arc::new(chip);
        debug!(label = chip.label(), lines = chip.n_lines(), "Added mock chip");
        chips.push(ChipEntry::Mock(chip.clone()));
        Ok(chip)
    }

    /// Look up a mock chip by label.
    pub fn chip(&self, label: &str) -> Option<Arc<MockChip>> {
        self.chips.read().iter().find_map(|c| match c {
            ChipEntry::Mock(chip) if chip.label() == label => Some(chip.clone()),
            _ => None,
        })
    }

    /// Names of every chip, mock and published.
    pub fn labels(&self) -> Vec<String> {
        self.chips
            .read()
            .iter()
            .map(|c| c.label().to_string())
            .collect()
    }

    /// Whether a device is currently published under `name`.
    pub fn is_published(&self, name: &str) -> bool {
        self.chips
            .read()
            .iter()
            .any(|c| matches!(c, ChipEntry::Published(p) if p.name == name))
    }

    /// Number of lines currently acquired.
    pub fn claimed(&self) -> usize {
        self.claims.lock().len()
    }

    /// Snapshot of the acquire/release log.
    pub fn events(&self) -> Vec<ProviderEvent> {
        self.events.lock().clone()
    }

    /// Forget recorded events.
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    fn claim(&self, selector: &LineSelector, consumer: &str) -> DioResult<ClaimRecord> {
        let chips = self.chips.read();
        match selector.hw_index {
            HwIndex::ByName => {
                let found = chips.iter().find_map(|c| match c {
                    ChipEntry::Mock(chip) => chip.find(&selector.key).map(|l| (chip, l)),
                    ChipEntry::Published(_) => None,
                });
                let (chip, line) = found.ok_or_else(|| DioError::NotFound {
                    selector: selector.to_string(),
                })?;
                claim_mock(chip, line.offset(), selector, consumer)
            }
            HwIndex::Offset(offset) => {
                let entry = chips
                    .iter()
                    .find(|c| c.label() == selector.key)
                    .ok_or_else(|| DioError::NotFound {
                        selector: selector.to_string(),
                    })?;
                match entry {
                    ChipEntry::Mock(chip) => claim_mock(chip, offset, selector, consumer),
                    ChipEntry::Published(chip) => {
                        claim_published(chip, offset, selector, consumer)
                    }
                }
            }
        }
    }
}

fn claim_mock(
    chip: &Arc<MockChip>,
    offset: u32,
    selector: &LineSelector,
    consumer: &str,
) -> DioResult<ClaimRecord> {
    let line = chip.line(offset).ok_or_else(|| DioError::NotFound {
        selector: selector.to_string(),
    })?;
    chip.faults().check(&selector.to_string(), LineOp::Acquire)?;

    let mut owner = line.owner.lock();
    if let Some(current) = owner.as_ref() {
        return Err(DioError::Busy {
            selector: selector.to_string(),
            owner: current.clone(),
        });
    }
    *owner = Some(consumer.to_string());

    let handle: Arc<dyn LineHandle> = Arc::new(MockLineHandle::new(chip.clone(), line.clone()));
    Ok(ClaimRecord {
        handle,
        claim: Claim::Mock(line.clone()),
    })
}

fn claim_published(
    chip: &Arc<PublishedChip>,
    offset: u32,
    selector: &LineSelector,
    consumer: &str,
) -> DioResult<ClaimRecord> {
    let mut owners = chip.owners.lock();
    let slot = owners
        .get_mut(offset as usize)
        .ok_or_else(|| DioError::NotFound {
            selector: selector.to_string(),
        })?;
    if let Some(current) = slot.as_ref() {
        return Err(DioError::Busy {
            selector: selector.to_string(),
            owner: current.clone(),
        });
    }
    chip.device.request(offset)?;
    *slot = Some(consumer.to_string());

    let handle: Arc<dyn LineHandle> = Arc::new(DeviceLineHandle {
        name: format!("{}-{}", chip.name, offset),
        device: chip.device.clone(),
        position: offset,
    });
    Ok(ClaimRecord {
        handle,
        claim: Claim::Published {
            chip: chip.clone(),
            offset,
        },
    })
}

impl LineProvider for MockLineProvider {
    fn acquire(&self, selector: &LineSelector, consumer: &str) -> DioResult<Arc<dyn LineHandle>> {
        let record = self.claim(selector, consumer)?;
        let handle = record.handle.clone();
        self.events.lock().push(ProviderEvent::Acquired {
            line: handle.name().to_string(),
            consumer: consumer.to_string(),
        });
        self.claims.lock().push(record);
        Ok(handle)
    }

    fn release(&self, handle: &Arc<dyn LineHandle>) {
        let record = {
            let mut claims = self.claims.lock();
            let index = claims.iter().position(|r| same_handle(&r.handle, handle));
            match index {
                Some(index) => claims.remove(index),
                None => {
                    debug!(line = handle.name(), "Release of unknown line ignored");
                    return;
                }
            }
        };

        match &record.claim {
            Claim::Mock(line) => {
                *line.owner.lock() = None;
            }
            Claim::Published { chip, offset } => {
                if let Some(slot) = chip.owners.lock().get_mut(*offset as usize) {
                    *slot = None;
                }
            }
        }
        self.events.lock().push(ProviderEvent::Released {
            line: handle.name().to_string(),
        });
    }
}

impl DevicePublisher for MockLineProvider {
    fn publish(&self, name: &str, device: Arc<dyn LineDevice>) -> DioResult<()> {
        let mut chips = self.chips.write();
        if chips.iter().any(|c| c.label() == name) {
            return Err(DioError::InvalidArgument {
                message: format!("device '{}' already published", name),
            });
        }
        let owners = vec![None; device.line_count() as usize];
        chips.push(ChipEntry::Published(Arc::new(PublishedChip {
            name: name.to_string(),
            device,
            owners: Mutex::new(owners),
        })));
        debug!(name, "Published device");
        Ok(())
    }

    fn unpublish(&self, name: &str) {
        let mut chips = self.chips.write();
        chips.retain(|c| !matches!(c, ChipEntry::Published(p) if p.name == name));
        debug!(name, "Unpublished device");
    }
}

fn same_handle(a: &Arc<dyn LineHandle>, b: &Arc<dyn LineHandle>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Line of a published composite device.
struct DeviceLineHandle {
    name: String,
    device: Arc<dyn LineDevice>,
    position: u32,
}

impl std::fmt::Debug for DeviceLineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLineHandle")
            .field("device", &self.device.label())
            .field("position", &self.position)
            .finish()
    }
}

impl LineHandle for DeviceLineHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn may_block(&self) -> bool {
        self.device.can_block()
    }

    fn active_low(&self) -> bool {
        false
    }

    fn direction(&self) -> DioResult<Direction> {
        self.device.get_direction(self.position)
    }

    fn set_direction_input(&self) -> DioResult<()> {
        self.device.set_direction_input(self.position)
    }

    fn set_direction_output(&self, value: bool) -> DioResult<()> {
        self.device.set_direction_output(self.position, value)
    }

    fn read(&self) -> DioResult<bool> {
        self.device.get(self.position)
    }

    fn write(&self, value: bool) -> DioResult<()> {
        self.device.set(self.position, value)
    }

    fn to_irq(&self) -> DioResult<u32> {
        self.device.to_irq(self.position)
    }

    fn set_config(&self, config: LineConfig) -> DioResult<()> {
        self.device.set_config(self.position, config)
    }
}
