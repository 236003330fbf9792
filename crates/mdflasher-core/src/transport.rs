//! The lower-level DFU transport interface.
//!
//! The driver does not talk USB itself. It assumes a transport that speaks
//! standard DFU on a USB endpoint and only specifies the request sequences it
//! issues against it. Implementations live outside this crate (a `nusb`-based
//! one for real hardware, an in-memory emulator for tests).

use crate::error::Result;

/// DFU device states, as reported by `GetState`/`GetStatus`.
///
/// Names follow the DFU 1.1 state set, with the download states named after
/// their effect on the radio (the bootloader is an ST-style DFU variant where
/// "download" means a write to flash).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuState {
    /// Application is running, DFU interface idle.
    AppIdle,
    /// Application received a detach request and waits for a USB reset.
    AppDetach,
    /// DFU mode, no transfer in progress.
    DfuIdle,
    /// Block received, waiting for the host to solicit status.
    DfuWriteSync,
    /// Device is busy programming a block.
    DfuWriteBusy,
    /// Device is ready for the next download block.
    DfuWriteIdle,
    /// Final block received, waiting for status to start manifestation.
    DfuManifestSync,
    /// Device is in the manifestation phase.
    DfuManifest,
    /// Manifestation done, device waits for a USB reset.
    DfuManifestWaitReset,
    /// Device is processing an upload.
    DfuReadIdle,
    /// An error occurred; awaiting `ClrStatus`.
    DfuError,
}

/// Status report returned by `GetStatus`.
#[derive(Debug, Clone, Copy)]
pub struct DfuStatus {
    /// Raw `bStatus` error code.
    pub status: u8,
    /// Minimum time in milliseconds the host should wait before the next
    /// request (`bwPollTimeout`).
    pub poll_timeout: u32,
    /// State the device reports.
    pub state: DfuState,
}

/// Blocking DFU transport over one device.
///
/// Exclusively owned by a [`Session`](crate::Session) for its lifetime. All
/// methods map one-to-one onto DFU requests; implementations translate their
/// own failures into [`Error::Transport`](crate::Error::Transport).
pub trait DfuTransport {
    /// `DFU_DNLOAD`: send `data` for block `block`.
    fn dnload(&mut self, block: u16, data: &[u8]) -> Result<()>;

    /// `DFU_UPLOAD`: read `buf.len()` bytes from block `block`.
    fn upload(&mut self, block: u16, buf: &mut [u8]) -> Result<()>;

    /// `DFU_GETSTATUS`: poll status, advancing the device state machine.
    fn get_status(&mut self) -> Result<DfuStatus>;

    /// `DFU_GETSTATE`: read the current state without side effects.
    fn get_state(&mut self) -> Result<DfuState>;

    /// `DFU_CLRSTATUS`: clear a latched error status.
    fn clr_status(&mut self) -> Result<()>;

    /// `DFU_ABORT`: abandon the transfer in progress.
    fn abort(&mut self) -> Result<()>;

    /// `DFU_DETACH`: ask a running application to enter DFU mode.
    fn detach(&mut self) -> Result<()>;

    /// Select the USB configuration, interface and alternate setting.
    fn select_configuration(&mut self, config: u8, interface: u8, alt: u8) -> Result<()>;

    /// Read a USB string descriptor.
    fn string_descriptor(&mut self, index: u8) -> Result<String>;
}
