//! Vendor protocol constants and command scripts for the radio bootloader.
//!
//! The radio firmware overlays a small vendor command set on standard DFU.
//! Commands are short packets downloaded to well-known block numbers; the
//! opcode values are the device firmware's contract and are not derivable.

/// One element of a vendor command script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Two-byte vendor opcode downloaded to the control block.
    Custom {
        /// Command opcode.
        op: u8,
        /// Command argument.
        arg: u8,
    },
    /// Pause between commands; no transfer is issued.
    Sleep {
        /// Delay in milliseconds (dilated 4x by the cancellable sleep).
        ms: u32,
    },
}

impl Command {
    /// A two-byte vendor command.
    pub const fn custom(op: u8, arg: u8) -> Self {
        Command::Custom { op, arg }
    }

    /// An embedded delay.
    pub const fn sleep(ms: u32) -> Self {
        Command::Sleep { ms }
    }
}

// ============================================================================
// Block numbers
// ============================================================================

/// DFU block number carrying control commands.
pub const CONTROL_BLOCK: u16 = 0;
/// DFU block number addressing the external SPI flash.
pub const SPI_BLOCK: u16 = 1;
/// First DFU block number of a firmware region transfer.
pub const FLASH_BLOCK: u16 = 2;

// ============================================================================
// Control-block opcodes
// ============================================================================

/// Mode select; the argument picks the mode.
pub const CMD_MODE: u8 = 0x91;
/// Memory access select, part of the programming-mode entry sequences.
pub const CMD_ACCESS: u8 = 0xa2;
/// Set the base address for subsequent block transfers (LE address follows).
pub const CMD_SET_ADDRESS: u8 = 0x21;
/// Erase the internal-flash block containing the address that follows.
pub const CMD_ERASE: u8 = 0x41;

/// `CMD_MODE` argument: enter programming mode.
pub const MODE_PROGRAM: u8 = 0x01;
/// `CMD_MODE` argument: enter firmware upgrade mode.
pub const MODE_FIRMWARE: u8 = 0x31;
/// `CMD_MODE` argument: reboot the radio.
pub const MODE_REBOOT: u8 = 0x05;

// ============================================================================
// SPI-block opcodes
// ============================================================================

/// Read SPI flash at the LE address that follows.
pub const SPI_READ: u8 = 0x01;
/// Erase the SPI flash block containing the LE address that follows.
pub const SPI_ERASE: u8 = 0x03;
/// Write SPI flash: LE address, LE length, then the payload.
pub const SPI_WRITE: u8 = 0x04;
/// Read the 3-byte JEDEC id of the SPI flash chip.
pub const SPI_ID: u8 = 0x05;

/// Milliseconds the SPI flash needs per block erase before it accepts the
/// next command.
pub const SPI_ERASE_DELAY_MS: u32 = 500;

// ============================================================================
// Canonical command scripts
// ============================================================================

/// Programming-mode entry, ahead of SPI flash access.
pub const ENTER_PROGRAMMING_MODE: &[Command] = &[Command::custom(CMD_MODE, MODE_PROGRAM)];

/// Programming-mode entry plus the memory-access sequence preceding an
/// internal-flash read.
pub const PREPARE_FLASH_READ: &[Command] = &[
    Command::custom(CMD_MODE, MODE_PROGRAM),
    Command::custom(CMD_ACCESS, 0x02),
    Command::custom(CMD_ACCESS, 0x02),
    Command::custom(CMD_ACCESS, 0x03),
    Command::custom(CMD_ACCESS, 0x04),
    Command::custom(CMD_ACCESS, 0x07),
];

/// The write variant repeats mode entry and waits out the radio's internal
/// preparation before re-selecting the access sequence.
pub const PREPARE_FLASH_WRITE: &[Command] = &[
    Command::custom(CMD_MODE, MODE_PROGRAM),
    Command::custom(CMD_MODE, MODE_PROGRAM),
    Command::custom(CMD_ACCESS, 0x02),
    Command::sleep(2000),
    Command::custom(CMD_ACCESS, 0x02),
    Command::custom(CMD_ACCESS, 0x03),
    Command::custom(CMD_ACCESS, 0x04),
    Command::custom(CMD_ACCESS, 0x07),
];

/// Firmware-upgrade mode entry.
pub const ENTER_FIRMWARE_UPGRADE: &[Command] = &[
    Command::custom(CMD_MODE, MODE_PROGRAM),
    Command::custom(CMD_MODE, MODE_FIRMWARE),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_script_embeds_the_settle_delay() {
        assert_eq!(PREPARE_FLASH_WRITE.len(), 8);
        assert_eq!(PREPARE_FLASH_WRITE[3], Command::sleep(2000));
        // Mode entry is doubled on the write path.
        assert_eq!(PREPARE_FLASH_WRITE[0], PREPARE_FLASH_WRITE[1]);
    }

    #[test]
    fn read_script_selects_all_access_regions() {
        let args: Vec<u8> = PREPARE_FLASH_READ
            .iter()
            .filter_map(|cmd| match cmd {
                Command::Custom { op: CMD_ACCESS, arg } => Some(*arg),
                _ => None,
            })
            .collect();
        assert_eq!(args, [0x02, 0x02, 0x03, 0x04, 0x07]);
    }
}
