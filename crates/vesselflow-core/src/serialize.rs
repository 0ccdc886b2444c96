//! Persistence of virtual pools.
//!
//! Physical pools live in the craft's storage units and are never saved by
//! the engine. Virtual pools have no units, so their amount, capacity and
//! title are written to a versioned `bitcode` blob instead.

use serde::{Deserialize, Serialize};

use crate::handler::VesselResourceHandler;
use crate::pool::ResourcePool;
use crate::storage::VirtualStorage;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a virtual-pool snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x5646_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
        }
    }
}

impl SnapshotHeader {
    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Persisted state of one virtual pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualPoolRecord {
    pub name: String,
    pub title: String,
    pub amount: f64,
    pub capacity: f64,
}

impl VirtualPoolRecord {
    fn from_pool(pool: &ResourcePool) -> Self {
        Self {
            name: pool.name().to_string(),
            title: pool.title().to_string(),
            amount: pool.amount(),
            capacity: pool.capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VirtualPoolSnapshot {
    header: SnapshotHeader,
    pools: Vec<VirtualPoolRecord>,
}

// ---------------------------------------------------------------------------
// Handler integration
// ---------------------------------------------------------------------------

impl VesselResourceHandler {
    /// Records for every virtual pool, in name order.
    pub fn virtual_pool_records(&self) -> Vec<VirtualPoolRecord> {
        self.pools()
            .iter()
            .filter(|p| p.is_virtual())
            .map(VirtualPoolRecord::from_pool)
            .collect()
    }

    /// Serialize every virtual pool to a binary blob.
    pub fn save_virtual_pools(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = VirtualPoolSnapshot {
            header: SnapshotHeader::default(),
            pools: self.virtual_pool_records(),
        };
        bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Restore virtual pools from a blob produced by
    /// [`save_virtual_pools`](Self::save_virtual_pools). Returns how many
    /// pools were restored. Records naming a physical pool are skipped.
    pub fn load_virtual_pools(&mut self, data: &[u8]) -> Result<usize, DeserializeError> {
        let snapshot: VirtualPoolSnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;

        let mut restored = 0;
        for record in snapshot.pools {
            self.restore_virtual_pool(record, &mut restored);
        }
        Ok(restored)
    }

    fn restore_virtual_pool(&mut self, record: VirtualPoolRecord, restored: &mut usize) {
        match self.pool_mut(&record.name) {
            Some(pool) if !pool.is_virtual() => {
                tracing::warn!(resource = %record.name, "skipping virtual record for physical pool");
            }
            Some(pool) => {
                // Both setters succeed on a virtual pool.
                let _ = pool.set_capacity(record.capacity);
                let _ = pool.set_amount(record.amount);
                pool.adapter_mut().settle();
                pool.set_title(record.title);
                *restored += 1;
            }
            None => {
                let storage = VirtualStorage::with_totals(record.amount, record.capacity);
                let mut pool = ResourcePool::new(record.name.as_str(), Box::new(storage));
                pool.set_title(record.title);
                self.insert_pool(pool);
                *restored += 1;
            }
        }
    }
}
