//! mdflasher-dummy - In-memory radio emulator for testing
//!
//! Emulates the radio bootloader's vendor-extended DFU behaviour behind the
//! [`DfuTransport`] trait: the DFU state machine, the command channel on
//! block 0, the SPI flash channel on block 1 and block-numbered internal
//! flash transfers. Every transport call is journaled so tests can assert
//! the exact request sequence the driver issued.

use std::collections::HashMap;

use mdflasher_core::error::{Error, Result};
use mdflasher_core::transport::{DfuState, DfuStatus, DfuTransport};

// Channel and opcode values mirrored from the driver's protocol contract.
const CONTROL_BLOCK: u16 = 0;
const SPI_BLOCK: u16 = 1;

const CMD_MODE: u8 = 0x91;
const CMD_SET_ADDRESS: u8 = 0x21;
const CMD_ERASE: u8 = 0x41;
const MODE_REBOOT: u8 = 0x05;

const SPI_READ: u8 = 0x01;
const SPI_ERASE: u8 = 0x03;
const SPI_WRITE: u8 = 0x04;
const SPI_ID: u8 = 0x05;

/// Configuration for the dummy radio.
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Manufacturer string served for descriptor index 1.
    pub manufacturer: String,
    /// Bytes served for the SPI id command (3-byte JEDEC id plus padding).
    pub spi_id: [u8; 4],
    /// Emulated SPI flash capacity in bytes.
    pub spi_size: usize,
    /// Erasable unit of the emulated SPI flash.
    pub erase_block_size: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            manufacturer: "AnyRoad Technology".into(),
            spi_id: [0xef, 0x40, 0x18, 0x00], // W25Q128FV
            spi_size: 16 * 1024 * 1024,
            erase_block_size: 64 * 1024,
        }
    }
}

/// One journaled transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `DFU_DNLOAD` with the full payload.
    Dnload {
        /// Target block number.
        block: u16,
        /// Downloaded bytes.
        data: Vec<u8>,
    },
    /// `DFU_UPLOAD` of `len` bytes.
    Upload {
        /// Source block number.
        block: u16,
        /// Requested length.
        len: usize,
    },
    /// `DFU_GETSTATUS`.
    GetStatus,
    /// `DFU_GETSTATE`.
    GetState,
    /// `DFU_CLRSTATUS`.
    ClrStatus,
    /// `DFU_ABORT`.
    Abort,
    /// `DFU_DETACH`.
    Detach,
    /// Configuration/interface/alternate selection.
    SelectConfiguration(u8, u8, u8),
    /// String descriptor read.
    StringDescriptor(u8),
}

enum SpiPending {
    None,
    Read(u32),
    Id,
}

/// In-memory radio behind the DFU transport seam.
///
/// Internal flash is modeled as a sparse store keyed by the base address the
/// driver selected plus the raw DFU block number, so round-trips work
/// without re-deriving the device's reserved-window layout, and tests can
/// assert the adjusted block numbers directly.
pub struct DummyRadio {
    config: DummyConfig,
    state: DfuState,
    base_address: u32,
    flash: HashMap<(u32, u16), Vec<u8>>,
    spi: Vec<u8>,
    spi_pending: SpiPending,
    wedge_opcode: Option<u8>,
    wedged: bool,
    journal: Vec<Call>,
}

impl DummyRadio {
    /// Creates a dummy radio with the given configuration.
    pub fn with_config(config: DummyConfig) -> Self {
        let spi = vec![0xff; config.spi_size];
        Self {
            config,
            state: DfuState::DfuIdle,
            base_address: 0,
            flash: HashMap::new(),
            spi,
            spi_pending: SpiPending::None,
            wedge_opcode: None,
            wedged: false,
            journal: Vec::new(),
        }
    }

    /// Creates a dummy radio with the default configuration (16 MiB
    /// W25Q128FV, bootloader manufacturer string).
    pub fn new() -> Self {
        Self::with_config(DummyConfig::default())
    }

    /// The journal of every transport call made so far.
    pub fn journal(&self) -> &[Call] {
        &self.journal
    }

    /// Emulated SPI flash contents.
    pub fn spi(&self) -> &[u8] {
        &self.spi
    }

    /// Mutable SPI flash contents, for seeding test fixtures.
    pub fn spi_mut(&mut self) -> &mut [u8] {
        &mut self.spi
    }

    /// Internal-flash data downloaded for `block` while `base` was the
    /// selected address, if any.
    pub fn flash_block(&self, base: u32, block: u16) -> Option<&[u8]> {
        self.flash.get(&(base, block)).map(Vec::as_slice)
    }

    /// Block numbers of all data downloads (blocks past the command
    /// channels), in order.
    pub fn data_dnload_blocks(&self) -> Vec<u16> {
        self.journal
            .iter()
            .filter_map(|call| match call {
                Call::Dnload { block, .. } if *block > SPI_BLOCK => Some(*block),
                _ => None,
            })
            .collect()
    }

    /// Once a control command with this opcode arrives, the device stops
    /// reporting write-idle and wedges in dfuUPLOAD-IDLE. Lets tests check
    /// the driver's state discipline.
    pub fn wedge_on_opcode(&mut self, opcode: u8) {
        self.wedge_opcode = Some(opcode);
    }

    fn reported_state(&self) -> DfuState {
        if self.wedged {
            DfuState::DfuReadIdle
        } else {
            self.state
        }
    }

    fn control_dnload(&mut self, data: &[u8]) -> Result<()> {
        let opcode = *data
            .first()
            .ok_or_else(|| Error::Transport("empty control command".into()))?;
        if self.wedge_opcode == Some(opcode) {
            self.wedged = true;
        }
        match opcode {
            CMD_MODE if data.get(1) == Some(&MODE_REBOOT) => {
                self.state = DfuState::DfuIdle;
            }
            CMD_SET_ADDRESS => {
                self.base_address = le_address(data)?;
                self.state = DfuState::DfuWriteIdle;
            }
            CMD_ERASE => {
                // The real device erases the whole region containing the
                // address; block writes overwrite wholesale here, so the
                // journal entry is all tests need.
                le_address(data)?;
                self.state = DfuState::DfuWriteIdle;
            }
            _ => {
                self.state = DfuState::DfuWriteIdle;
            }
        }
        Ok(())
    }

    fn spi_dnload(&mut self, data: &[u8]) -> Result<()> {
        let opcode = *data
            .first()
            .ok_or_else(|| Error::Transport("empty SPI command".into()))?;
        match opcode {
            SPI_READ => {
                self.spi_pending = SpiPending::Read(le_address(data)?);
                self.state = DfuState::DfuWriteIdle;
            }
            SPI_ERASE => {
                let addr = le_address(data)? as usize;
                let end = (addr + self.config.erase_block_size).min(self.spi.len());
                if addr < self.spi.len() {
                    self.spi[addr..end].fill(0xff);
                }
                self.state = DfuState::DfuWriteIdle;
            }
            SPI_WRITE => {
                if data.len() < 9 {
                    return Err(Error::Transport("truncated SPI write".into()));
                }
                let addr = le_address(data)? as usize;
                let len = u32::from_le_bytes(data[5..9].try_into().unwrap()) as usize;
                let payload = &data[9..];
                if payload.len() != len || addr + len > self.spi.len() {
                    return Err(Error::Transport("SPI write out of range".into()));
                }
                self.spi[addr..addr + len].copy_from_slice(payload);
                self.state = DfuState::DfuWriteBusy;
            }
            SPI_ID => {
                self.spi_pending = SpiPending::Id;
                self.state = DfuState::DfuWriteIdle;
            }
            _ => {
                return Err(Error::Transport(format!("unknown SPI opcode {opcode:02x}")));
            }
        }
        Ok(())
    }
}

impl Default for DummyRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl DfuTransport for DummyRadio {
    fn dnload(&mut self, block: u16, data: &[u8]) -> Result<()> {
        self.journal.push(Call::Dnload {
            block,
            data: data.to_vec(),
        });
        match block {
            CONTROL_BLOCK => self.control_dnload(data),
            SPI_BLOCK => self.spi_dnload(data),
            _ => {
                self.flash.insert((self.base_address, block), data.to_vec());
                self.state = DfuState::DfuWriteBusy;
                Ok(())
            }
        }
    }

    fn upload(&mut self, block: u16, buf: &mut [u8]) -> Result<()> {
        self.journal.push(Call::Upload {
            block,
            len: buf.len(),
        });
        match block {
            CONTROL_BLOCK => buf.fill(0),
            SPI_BLOCK => match std::mem::replace(&mut self.spi_pending, SpiPending::None) {
                SpiPending::Id => {
                    let n = buf.len().min(self.config.spi_id.len());
                    buf[..n].copy_from_slice(&self.config.spi_id[..n]);
                }
                SpiPending::Read(addr) => {
                    let addr = addr as usize;
                    let end = (addr + buf.len()).min(self.spi.len());
                    let n = end.saturating_sub(addr);
                    buf[..n].copy_from_slice(&self.spi[addr..end]);
                    buf[n..].fill(0xff);
                }
                SpiPending::None => {
                    return Err(Error::Transport("SPI upload without a command".into()));
                }
            },
            _ => match self.flash.get(&(self.base_address, block)) {
                Some(data) => {
                    let n = buf.len().min(data.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    buf[n..].fill(0xff);
                }
                None => buf.fill(0xff),
            },
        }
        Ok(())
    }

    fn get_status(&mut self) -> Result<DfuStatus> {
        self.journal.push(Call::GetStatus);
        let reported = self.reported_state();
        // Programming settles on the status poll after the one that saw it
        // busy, like the real bootloader.
        if self.state == DfuState::DfuWriteBusy {
            self.state = DfuState::DfuWriteIdle;
        }
        Ok(DfuStatus {
            status: 0,
            poll_timeout: 0,
            state: reported,
        })
    }

    fn get_state(&mut self) -> Result<DfuState> {
        self.journal.push(Call::GetState);
        Ok(self.reported_state())
    }

    fn clr_status(&mut self) -> Result<()> {
        self.journal.push(Call::ClrStatus);
        self.state = DfuState::DfuIdle;
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        self.journal.push(Call::Abort);
        self.state = DfuState::DfuIdle;
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        self.journal.push(Call::Detach);
        self.state = DfuState::DfuIdle;
        Ok(())
    }

    fn select_configuration(&mut self, config: u8, interface: u8, alt: u8) -> Result<()> {
        self.journal
            .push(Call::SelectConfiguration(config, interface, alt));
        Ok(())
    }

    fn string_descriptor(&mut self, index: u8) -> Result<String> {
        self.journal.push(Call::StringDescriptor(index));
        Ok(self.config.manufacturer.clone())
    }
}

fn le_address(data: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = data
        .get(1..5)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::Transport("truncated address command".into()))?;
    Ok(u32::from_le_bytes(bytes))
}
