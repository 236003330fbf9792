//! Internal-flash address and block-number arithmetic.
//!
//! Internal flash is addressed by DFU block number, not byte address. Blocks
//! 0 and 1 carry the control and SPI channels, so data transfers start at
//! block 2. On top of that offset the device hides a reserved window of its
//! address map: logical blocks 256..1216 land 832 block numbers higher, and
//! erase addresses in `0x40000..0x130000` shift up by `0xd0000`. Both
//! corrections describe the same window, expressed in 1 KiB blocks and in
//! bytes. SPI flash is linear and needs neither.

use crate::protocol::FLASH_BLOCK;

/// First logical block inside the reserved window.
const WINDOW_START_BLOCK: u16 = 256;
/// Width of the reserved window in blocks.
const WINDOW_SKIP_BLOCKS: u16 = 832;
/// Logical blocks in the mapped region.
const TOTAL_BLOCKS: u16 = 2048;

/// Byte-address equivalents of the window, at the 1 KiB transfer size.
const WINDOW_START_ADDR: u32 = 0x4_0000;
/// Window width in bytes.
const WINDOW_SKIP_BYTES: u32 = 0xd_0000;
/// Mapped region size in bytes.
const TOTAL_BYTES: u32 = 0x20_0000;

/// Maps a logical block number onto the DFU block number that reaches it.
pub fn adjust_block_number(block: u16) -> u16 {
    let mut adjusted = block + FLASH_BLOCK;
    if (WINDOW_START_BLOCK..TOTAL_BLOCKS - WINDOW_SKIP_BLOCKS).contains(&block) {
        adjusted += WINDOW_SKIP_BLOCKS;
    }
    adjusted
}

/// Maps a logical erase address onto the device address of its erase block.
pub fn adjust_erase_address(addr: u32) -> u32 {
    if (WINDOW_START_ADDR..TOTAL_BYTES - WINDOW_SKIP_BYTES).contains(&addr) {
        addr + WINDOW_SKIP_BYTES
    } else {
        addr
    }
}
