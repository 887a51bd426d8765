//! Persistent configuration record kept in the last flash page.
//!
//! The page holds a single 24-byte record (little-endian):
//!
//! ```text
//! 0  magic            u32  "SMM1"
//! 4  device id        u16
//! 6  moisture thresh  u32
//! 10 averaging factor u16
//! 12 wake code        u16
//! 14 packet counter   u32
//! 18 reserved         u16  0xFFFF
//! 20 checksum         u32  FNV-1a over bytes 0..20
//! ```
//!
//! An erased page means the node was never provisioned; it boots with the
//! default configuration and a zero counter. A record with a bad magic or
//! checksum is reported as corrupt.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt;

use meter_core::config::{ConfigStore, DeviceConfig};
use meter_core::wakeup::WakeIntervalCode;

/// Encoded record length; a multiple of the flash write granularity.
pub const RECORD_LEN: usize = 24;

const RECORD_MAGIC: u32 = u32::from_le_bytes(*b"SMM1");
const ERASED_WORD: u32 = u32::MAX;
const CHECKSUM_OFFSET: usize = 20;

/// Raw record bytes as stored in flash.
pub type RecordBytes = [u8; RECORD_LEN];

/// Decoded contents of the configuration page.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StoredRecord {
    pub config: DeviceConfig,
    pub packet_counter: u32,
}

/// Reasons a stored record could not be used.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordError {
    BadMagic(u32),
    BadChecksum { stored: u32, computed: u32 },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::BadMagic(magic) => write!(f, "bad record magic 0x{magic:08X}"),
            RecordError::BadChecksum { stored, computed } => write!(
                f,
                "record checksum 0x{stored:08X} does not match 0x{computed:08X}"
            ),
        }
    }
}

impl StoredRecord {
    /// Record used when the page has never been written.
    #[must_use]
    pub fn unprovisioned() -> Self {
        Self {
            config: DeviceConfig::default(),
            packet_counter: 0,
        }
    }

    #[must_use]
    pub fn encode(&self) -> RecordBytes {
        let mut bytes = [0xFF; RECORD_LEN];
        bytes[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.config.device_id.to_le_bytes());
        bytes[6..10].copy_from_slice(&self.config.moisture_threshold.to_le_bytes());
        bytes[10..12].copy_from_slice(&self.config.averaging_factor.to_le_bytes());
        bytes[12..14].copy_from_slice(&self.config.wake_interval.raw().to_le_bytes());
        bytes[14..18].copy_from_slice(&self.packet_counter.to_le_bytes());
        let checksum = fnv1a(&bytes[..CHECKSUM_OFFSET]);
        bytes[CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }

    /// Decodes a page image. `Ok(None)` means the page is erased.
    pub fn decode(bytes: &RecordBytes) -> Result<Option<Self>, RecordError> {
        let magic = read_u32(bytes, 0);
        if magic == ERASED_WORD {
            return Ok(None);
        }
        if magic != RECORD_MAGIC {
            return Err(RecordError::BadMagic(magic));
        }

        let stored = read_u32(bytes, CHECKSUM_OFFSET);
        let computed = fnv1a(&bytes[..CHECKSUM_OFFSET]);
        if stored != computed {
            return Err(RecordError::BadChecksum { stored, computed });
        }

        Ok(Some(Self {
            config: DeviceConfig::new(
                read_u16(bytes, 4),
                read_u32(bytes, 6),
                read_u16(bytes, 10),
                WakeIntervalCode::new(read_u16(bytes, 12)),
            ),
            packet_counter: read_u32(bytes, 14),
        }))
    }
}

fn read_u16(bytes: &RecordBytes, offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &RecordBytes, offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811C_9DC5, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(0x0100_0193)
    })
}

/// Page-sized storage region holding the record.
pub trait FlashRegion {
    type Error;

    fn read(&mut self, bytes: &mut RecordBytes) -> Result<(), Self::Error>;

    /// Erases the page and writes `bytes` at its start.
    fn rewrite(&mut self, bytes: &RecordBytes) -> Result<(), Self::Error>;
}

/// Storage failures.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StoreError<E> {
    Corrupt(RecordError),
    Flash(E),
}

impl<E: fmt::Debug> fmt::Display for StoreError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Corrupt(err) => err.fmt(f),
            StoreError::Flash(err) => write!(f, "flash error: {err:?}"),
        }
    }
}

/// [`ConfigStore`] backed by a [`FlashRegion`].
pub struct FlashConfigStore<F> {
    region: F,
    cached: Option<StoredRecord>,
}

impl<F: FlashRegion> FlashConfigStore<F> {
    pub const fn new(region: F) -> Self {
        Self {
            region,
            cached: None,
        }
    }

    fn record(&mut self) -> Result<StoredRecord, StoreError<F::Error>> {
        if let Some(record) = self.cached {
            return Ok(record);
        }
        let mut bytes = [0u8; RECORD_LEN];
        self.region.read(&mut bytes).map_err(StoreError::Flash)?;
        let record = StoredRecord::decode(&bytes)
            .map_err(StoreError::Corrupt)?
            .unwrap_or_else(StoredRecord::unprovisioned);
        self.cached = Some(record);
        Ok(record)
    }

    fn write_counter(&mut self, value: u32) -> Result<(), StoreError<F::Error>> {
        let mut record = self.record()?;
        record.packet_counter = value;
        self.region
            .rewrite(&record.encode())
            .map_err(StoreError::Flash)?;
        self.cached = Some(record);
        Ok(())
    }
}

impl<F: FlashRegion> ConfigStore for FlashConfigStore<F> {
    type Error = StoreError<F::Error>;

    fn load(&mut self) -> Result<DeviceConfig, Self::Error> {
        self.record().map(|record| record.config)
    }

    /// Wraps at `u32::MAX`, matching the in-memory counter.
    fn advance_and_persist_sequence_counter(&mut self, increment: u32) -> Result<u32, Self::Error> {
        let next = self.record()?.packet_counter.wrapping_add(increment);
        self.write_counter(next)?;
        Ok(next)
    }

    fn persist_sequence_counter(&mut self, value: u32) -> Result<(), Self::Error> {
        self.write_counter(value)
    }
}

#[cfg(target_os = "none")]
mod page {
    use embassy_stm32::flash::{Blocking, Error, Flash};

    use super::{FlashRegion, RecordBytes};

    /// Offset of the last 2 KiB page of the 512 KiB bank.
    const CONFIG_PAGE_OFFSET: u32 = 0x0007_F800;
    const PAGE_SIZE: u32 = 0x800;

    /// Last page of on-chip flash.
    pub struct ConfigPage<'d> {
        flash: Flash<'d, Blocking>,
    }

    impl<'d> ConfigPage<'d> {
        pub fn new(flash: Flash<'d, Blocking>) -> Self {
            Self { flash }
        }
    }

    impl FlashRegion for ConfigPage<'_> {
        type Error = Error;

        fn read(&mut self, bytes: &mut RecordBytes) -> Result<(), Self::Error> {
            self.flash.blocking_read(CONFIG_PAGE_OFFSET, bytes)
        }

        fn rewrite(&mut self, bytes: &RecordBytes) -> Result<(), Self::Error> {
            self.flash
                .blocking_erase(CONFIG_PAGE_OFFSET, CONFIG_PAGE_OFFSET + PAGE_SIZE)?;
            self.flash.blocking_write(CONFIG_PAGE_OFFSET, bytes)
        }
    }
}

#[cfg(target_os = "none")]
pub use page::ConfigPage;
