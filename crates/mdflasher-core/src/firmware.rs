//! Firmware programming: region map, wrapped-image detection and the
//! erase-then-program flow.

use std::io::{self, BufReader, Read};

use crate::error::{Error, ErrorContext, Result};
use crate::flash::read_block;
use crate::protocol;
use crate::session::{Session, BOOTLOADER_MANUFACTURER};
use crate::transport::DfuTransport;

/// One programmable region of the application flash.
#[derive(Debug, Clone, Copy)]
struct Region {
    address: u32,
    size: u32,
}

/// The nine regions a firmware image occupies. Handing the bootloader a
/// region's head address erases the whole region.
const FIRMWARE_REGIONS: [Region; 9] = [
    Region { address: 0x0800_c000, size: 0x04000 },
    Region { address: 0x0801_0000, size: 0x10000 },
    Region { address: 0x0802_0000, size: 0x20000 },
    Region { address: 0x0804_0000, size: 0x20000 },
    Region { address: 0x0806_0000, size: 0x20000 },
    Region { address: 0x0808_0000, size: 0x20000 },
    Region { address: 0x080a_0000, size: 0x20000 },
    Region { address: 0x080c_0000, size: 0x20000 },
    Region { address: 0x080e_0000, size: 0x20000 },
];

/// Wrapped images produced by the vendor tool start with this marker and
/// carry a 0x100-byte header ahead of the payload.
const WRAPPED_MAGIC: &[u8] = b"OutSecurityBin";
const WRAPPED_HEADER_SIZE: usize = 0x100;

impl<T: DfuTransport> Session<T> {
    /// Programs a firmware image region by region.
    ///
    /// Requires the radio's bootloader personality; a radio booted normally
    /// is refused before anything is erased. An image shorter than the
    /// region table programs cleanly up to its end.
    pub(crate) fn write_firmware_from<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let manufacturer = self.init().context("write_firmware")?;
        if manufacturer != BOOTLOADER_MANUFACTURER {
            return Err(Error::NotBootloader);
        }

        self.run_script(protocol::ENTER_FIRMWARE_UPGRADE)
            .context("write_firmware")?;

        self.progress.set_max_count(FIRMWARE_REGIONS.len())?;
        let mut total_blocks = 0usize;
        for region in &FIRMWARE_REGIONS {
            self.progress.tick()?;
            self.erase_flash_block(region.address)
                .context("write_firmware")?;
            total_blocks += region.size as usize / self.block_size;
        }
        self.progress.finish();
        log::debug!(
            "erased {} firmware regions ({total_blocks} blocks to program)",
            FIRMWARE_REGIONS.len()
        );

        let mut reader = BufReader::new(reader);
        let mut input = skip_wrapped_header(&mut reader).context("write_firmware")?;

        let mut buf = vec![0u8; self.block_size];
        self.progress.set_max_count(total_blocks)?;

        for region in &FIRMWARE_REGIONS {
            self.set_address(region.address).context("write_firmware")?;

            let block_count = region.size as usize / self.block_size;
            for block in 0..block_count {
                self.progress.tick()?;

                if read_block(&mut input, &mut buf)
                    .map_err(Error::from)
                    .context("write_firmware")?
                    == 0
                {
                    break;
                }

                self.transport
                    .dnload(protocol::FLASH_BLOCK + block as u16, &buf)
                    .context("write_firmware")?;
                self.wait_until_ready().context("write_firmware")?;
            }
        }

        self.progress.finish();
        Ok(())
    }
}

/// Detects the vendor wrapper and discards its header, handing back a reader
/// positioned at the firmware payload.
///
/// The magic bytes are consumed either way; for a bare image they are
/// re-chained in front of the remaining stream.
fn skip_wrapped_header<R: Read>(reader: &mut R) -> Result<impl Read + '_> {
    let mut head = [0u8; WRAPPED_MAGIC.len()];
    reader.read_exact(&mut head).map_err(Error::from)?;

    let prefix = if head == *WRAPPED_MAGIC {
        let skip = (WRAPPED_HEADER_SIZE - head.len()) as u64;
        let copied = io::copy(&mut reader.by_ref().take(skip), &mut io::sink())
            .map_err(Error::from)?;
        if copied != skip {
            return Err(Error::ShortRead);
        }
        Vec::new()
    } else {
        head.to_vec()
    };

    Ok(io::Cursor::new(prefix).chain(reader))
}
