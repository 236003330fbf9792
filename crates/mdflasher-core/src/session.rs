//! Radio session: transport ownership, DFU state normalization and the
//! vendor command layer.

use std::thread;
use std::time::Duration;

use crate::error::{Error, ErrorContext, Result};
use crate::progress::{Progress, ProgressCallback};
use crate::protocol::{self, Command};
use crate::transport::{DfuState, DfuTransport};

/// Manufacturer string the radio reports in bootloader mode.
pub(crate) const BOOTLOADER_MANUFACTURER: &str = "AnyRoad Technology";

/// A live driver session over one radio.
///
/// The session exclusively owns its transport; at most one operation may be
/// in flight. Callers lend readers and writers for the duration of a single
/// operation, the session never retains them.
///
/// Cancellation is cooperative through the progress callback. When an
/// operation is cancelled (or fails) mid-programming, no rollback is
/// attempted; the radio may be left with partially written memory.
pub struct Session<T> {
    pub(crate) transport: T,
    pub(crate) block_size: usize,
    pub(crate) erase_block_size: usize,
    pub(crate) progress: Progress,
}

impl<T: DfuTransport> Session<T> {
    /// Creates a session over `transport`.
    ///
    /// `block_size` is the device-reported DFU transfer size and
    /// `erase_block_size` the erasable unit of internal flash; both are
    /// treated as constant for the session's lifetime.
    pub fn new(transport: T, block_size: usize, erase_block_size: usize) -> Self {
        Session {
            transport,
            block_size,
            erase_block_size,
            progress: Progress::default(),
        }
    }

    /// Installs or clears the progress callback.
    ///
    /// The callback observes a monotone counter in
    /// [[`MIN_PROGRESS`](crate::MIN_PROGRESS), [`MAX_PROGRESS`](crate::MAX_PROGRESS)]
    /// and may cancel the running operation by returning an error.
    pub fn set_progress_callback(&mut self, callback: Option<ProgressCallback>) {
        self.progress.set_callback(callback);
    }

    /// Ends the session and releases the transport.
    pub fn close(self) -> T {
        self.transport
    }

    /// Normalizes the device into a clean dfuIDLE starting state and probes
    /// the manufacturer string.
    ///
    /// Idempotent; every high-level operation begins here. The doubled
    /// `GetStatus`/`ClrStatus` rounds drain any latched error status.
    pub(crate) fn init(&mut self) -> Result<String> {
        self.transport
            .select_configuration(0, 0, 0)
            .context("init")?;

        // First status read is discarded, clearing takes effect regardless.
        self.transport.get_status().context("init")?;
        self.transport.clr_status().context("init")?;

        let manufacturer = self.transport.string_descriptor(1).context("init")?;
        log::debug!("manufacturer string: {manufacturer:?}");

        self.transport.get_status().context("init")?;
        self.transport.clr_status().context("init")?;

        let status = self.transport.get_status().context("init")?;
        if status.state != DfuState::DfuIdle {
            return Err(Error::NotIdle).context("init");
        }

        Ok(manufacturer)
    }

    /// Drives the device into dfuIDLE from whatever state it is in.
    ///
    /// Re-reads the state after every nudge and loops unbounded; termination
    /// relies on the device eventually settling once the right request is
    /// applied.
    pub(crate) fn enter_dfu_mode(&mut self) -> Result<()> {
        loop {
            let state = self.transport.get_state().context("enter_dfu_mode")?;
            log::trace!("enter_dfu_mode: {state:?}");
            match state {
                DfuState::DfuIdle => return Ok(()),
                DfuState::DfuWriteSync
                | DfuState::DfuWriteIdle
                | DfuState::DfuManifestSync
                | DfuState::DfuManifest
                | DfuState::DfuReadIdle => self.transport.abort().context("enter_dfu_mode")?,
                DfuState::DfuError => self.transport.clr_status().context("enter_dfu_mode")?,
                DfuState::AppIdle => self.transport.detach().context("enter_dfu_mode")?,
                DfuState::AppDetach
                | DfuState::DfuWriteBusy
                | DfuState::DfuManifestWaitReset => self.sleep_ms(100)?,
            }
        }
    }

    /// Polls `GetStatus` until dfuIDLE, clearing any other status.
    pub(crate) fn wait_until_ready(&mut self) -> Result<()> {
        loop {
            let status = self.transport.get_status().context("wait_until_ready")?;
            if status.state == DfuState::DfuIdle {
                return Ok(());
            }
            self.transport.clr_status().context("wait_until_ready")?;
        }
    }

    /// Cancellable sleep: `ms` iterations of one progress tick plus a 4 ms
    /// pause.
    ///
    /// Wall time is therefore ~4x `ms`. The dilation is deliberate: it keeps
    /// cancellation latency under ~4 ms while spreading progress ticks over
    /// the radio's long erase waits, and every timing constant in this
    /// driver is calibrated against it.
    pub(crate) fn sleep_ms(&mut self, ms: u32) -> Result<()> {
        for _ in 0..ms {
            self.progress.tick()?;
            thread::sleep(Duration::from_millis(4));
        }
        Ok(())
    }

    /// Issues one two-byte vendor command on the control pipe and verifies
    /// the device lands in write-idle.
    ///
    /// The first `GetStatus` after the download is a transition trigger
    /// whose payload the device expects to be discarded; the second
    /// retrieves the real state. The bootloader requires this dance
    /// literally.
    fn custom_command(&mut self, op: u8, arg: u8) -> Result<()> {
        log::debug!("vendor command {op:02x} {arg:02x}");
        self.transport.dnload(protocol::CONTROL_BLOCK, &[op, arg])?;
        self.transport.get_status()?;
        self.sleep_ms(100)?;
        let status = self.transport.get_status()?;
        if status.state != DfuState::DfuWriteIdle {
            return Err(Error::UnexpectedState {
                expected: DfuState::DfuWriteIdle,
                actual: status.state,
            });
        }
        self.enter_dfu_mode()
    }

    /// Runs a command script; `Sleep` entries pause without touching the
    /// bus.
    pub(crate) fn run_script(&mut self, script: &[Command]) -> Result<()> {
        for command in script {
            match *command {
                Command::Sleep { ms } => self.sleep_ms(ms)?,
                Command::Custom { op, arg } => {
                    self.custom_command(op, arg).context("run_script")?
                }
            }
        }
        Ok(())
    }

    /// Downloads a 5-byte `opcode + little-endian address` control packet
    /// and verifies the post-command state.
    fn address_command(&mut self, opcode: u8, address: u32) -> Result<()> {
        let mut cmd = [0u8; 5];
        cmd[0] = opcode;
        cmd[1..].copy_from_slice(&address.to_le_bytes());
        self.transport.dnload(protocol::CONTROL_BLOCK, &cmd)?;
        self.transport.get_status()?;
        let status = self.transport.get_status()?;
        if status.state != DfuState::DfuWriteIdle {
            return Err(Error::UnexpectedState {
                expected: DfuState::DfuWriteIdle,
                actual: status.state,
            });
        }
        self.enter_dfu_mode()
    }

    /// Points subsequent block transfers at `address`.
    pub(crate) fn set_address(&mut self, address: u32) -> Result<()> {
        self.address_command(protocol::CMD_SET_ADDRESS, address)
            .context("set_address")
    }

    /// Erases the internal-flash erase block containing `address`.
    ///
    /// The address must already carry the reserved-window correction where
    /// applicable; firmware regions are passed through unadjusted.
    pub(crate) fn erase_flash_block(&mut self, address: u32) -> Result<()> {
        self.address_command(protocol::CMD_ERASE, address)
            .context("erase_flash_block")
    }

    /// Erases one SPI flash block.
    ///
    /// The SPI path asserts no state; the chip needs ~500 ms per block
    /// before it accepts the next command, waited out here.
    pub(crate) fn erase_spi_flash_block(&mut self, address: u32) -> Result<()> {
        let mut cmd = [0u8; 5];
        cmd[0] = protocol::SPI_ERASE;
        cmd[1..].copy_from_slice(&address.to_le_bytes());
        self.transport
            .dnload(protocol::SPI_BLOCK, &cmd)
            .context("erase_spi_flash_block")?;
        self.transport.get_status().context("erase_spi_flash_block")?;
        self.sleep_ms(protocol::SPI_ERASE_DELAY_MS)?;
        self.transport.get_status().context("erase_spi_flash_block")?;
        Ok(())
    }

    /// Reboots the radio.
    ///
    /// The trailing `GetStatus` kicks the device into its reset; its result
    /// is ignored, the device is already going away.
    pub(crate) fn reboot(&mut self) -> Result<()> {
        self.wait_until_ready().context("reboot")?;
        self.transport
            .dnload(
                protocol::CONTROL_BLOCK,
                &[protocol::CMD_MODE, protocol::MODE_REBOOT],
            )
            .context("reboot")?;
        let _ = self.transport.get_status();
        Ok(())
    }
}
