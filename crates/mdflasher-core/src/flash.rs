//! Block-paced flash I/O loops.
//!
//! Internal flash moves through standard DFU block transfers, with the
//! block-number correction from [`blockmap`]; the external SPI flash moves
//! through vendor opcodes on the SPI channel. Both sides reuse one
//! block-sized buffer per loop and tick progress between blocks.

use std::io::{self, BufReader, BufWriter, Read, Write};

use crate::blockmap;
use crate::chip::{self, SpiFlashChip};
use crate::error::{Error, ErrorContext, Result};
use crate::protocol;
use crate::session::Session;
use crate::transport::{DfuState, DfuTransport};

/// Tick budget for the internal-flash read setup: six vendor commands at 100
/// sleep-ticks each, plus slack for the status polling around them.
const READ_SETUP_TICKS: usize = 620;

/// Tick budget for the internal-flash write setup: seven vendor commands
/// plus the embedded 2000-tick settle sleep, plus slack.
const WRITE_SETUP_TICKS: usize = 2750;

/// Fills `buf` from `reader`, padding the tail with `0xff` after a mid-block
/// EOF. Returns the number of bytes actually read; 0 means EOF on the block
/// boundary and `buf` untouched.
pub(crate) fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    if filled > 0 {
        buf[filled..].fill(0xff);
    }
    Ok(filled)
}

/// Writes `buf` to the caller's stream; a writer that stops accepting bytes
/// fails the operation rather than truncating it.
fn write_stream<W: Write>(writer: &mut W, buf: &[u8]) -> Result<()> {
    writer.write_all(buf).map_err(|e| match e.kind() {
        io::ErrorKind::WriteZero => Error::ShortWrite,
        _ => Error::Io(e),
    })
}

impl<T: DfuTransport> Session<T> {
    /// Streams `size` bytes of internal flash starting at `address` into
    /// `writer`.
    pub(crate) fn read_flash_to<W: Write>(
        &mut self,
        address: u32,
        size: usize,
        writer: &mut W,
    ) -> Result<()> {
        if size % self.block_size != 0 {
            return Err(Error::BadAlignment("data size"));
        }
        if address as usize % self.block_size != 0 {
            return Err(Error::BadAlignment("address"));
        }

        self.progress.set_max_count(READ_SETUP_TICKS)?;
        self.init().context("read_flash_to")?;
        self.run_script(protocol::PREPARE_FLASH_READ)
            .context("read_flash_to")?;
        self.progress.finish();

        let mut writer = BufWriter::new(writer);
        let mut buf = vec![0u8; self.block_size];

        self.set_address(0).context("read_flash_to")?;

        let first_block = address as usize / self.block_size;
        let block_count = size / self.block_size;
        self.progress.set_max_count(block_count)?;

        for block in first_block..first_block + block_count {
            self.progress.tick()?;
            let adjusted = blockmap::adjust_block_number(block as u16);
            self.transport
                .upload(adjusted, &mut buf)
                .context("read_flash_to")?;
            write_stream(&mut writer, &buf).context("read_flash_to")?;
        }
        writer.flush().map_err(Error::from).context("read_flash_to")?;

        self.progress.finish();
        Ok(())
    }

    /// Erases then programs `size` bytes of internal flash starting at
    /// `address` from `reader`, block by block.
    pub(crate) fn write_flash_from<R: Read>(
        &mut self,
        address: u32,
        size: usize,
        reader: &mut R,
    ) -> Result<()> {
        if address as usize % self.block_size != 0 {
            return Err(Error::BadAlignment("address"));
        }
        if size % self.block_size != 0 {
            return Err(Error::BadAlignment("data size"));
        }

        self.progress.set_max_count(WRITE_SETUP_TICKS)?;
        self.run_script(protocol::PREPARE_FLASH_WRITE)
            .context("write_flash_from")?;
        self.progress.finish();

        let first_block = address as usize / self.block_size;
        let block_count = size.div_ceil(self.block_size);
        let size = block_count * self.block_size;

        let mut reader = BufReader::new(reader);
        let mut buf = vec![0u8; self.block_size];

        self.erase_flash_blocks(address, size)
            .context("write_flash_from")?;
        self.set_address(0).context("write_flash_from")?;
        self.transport.get_status().context("write_flash_from")?;

        self.progress.set_max_count(block_count)?;

        for block in first_block..first_block + block_count {
            self.progress.tick()?;

            if read_block(&mut reader, &mut buf).map_err(Error::from).context("write_flash_from")? == 0 {
                return Err(Error::ShortRead).context("write_flash_from");
            }

            let adjusted = blockmap::adjust_block_number(block as u16);
            self.transport
                .dnload(adjusted, &buf)
                .context("write_flash_from")?;

            loop {
                let status = self.transport.get_status().context("write_flash_from")?;
                if status.state == DfuState::DfuWriteIdle {
                    break;
                }
            }
        }

        self.progress.finish();
        Ok(())
    }

    /// Erases `size` bytes of internal flash starting at `address`, one
    /// erase block at a time, applying the reserved-window correction.
    pub(crate) fn erase_flash_blocks(&mut self, address: u32, size: usize) -> Result<()> {
        let count = size.div_ceil(self.erase_block_size);
        self.progress.set_max_count(count)?;

        let mut addr = address;
        for _ in 0..count {
            self.progress.tick()?;
            self.erase_flash_block(blockmap::adjust_erase_address(addr))?;
            addr += self.erase_block_size as u32;
        }

        self.progress.finish();
        Ok(())
    }

    /// Erases the SPI flash blocks covering `address..address + size`.
    ///
    /// The tick budget is inflated by the per-block erase delay so the
    /// callback keeps firing through the waits.
    pub(crate) fn erase_spi_flash_blocks(&mut self, address: u32, size: usize) -> Result<()> {
        let count = size.div_ceil(self.erase_block_size);
        self.progress
            .set_max_count(count * protocol::SPI_ERASE_DELAY_MS as usize)?;

        let mut addr = address;
        for _ in 0..count {
            self.progress.tick()?;
            self.erase_spi_flash_block(addr)?;
            addr += self.erase_block_size as u32;
        }

        self.progress.finish();
        Ok(())
    }

    /// Reads `buf.len()` bytes of SPI flash at `address`.
    pub(crate) fn read_spi_flash(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        let mut cmd = [0u8; 5];
        cmd[0] = protocol::SPI_READ;
        cmd[1..].copy_from_slice(&address.to_le_bytes());
        self.transport
            .dnload(protocol::SPI_BLOCK, &cmd)
            .context("read_spi_flash")?;
        self.transport.get_status().context("read_spi_flash")?;
        self.transport.get_status().context("read_spi_flash")?;
        self.transport
            .upload(protocol::SPI_BLOCK, buf)
            .context("read_spi_flash")
    }

    /// Writes `data` to SPI flash at `address`; the region must already be
    /// erased.
    pub(crate) fn write_spi_flash(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let mut cmd = Vec::with_capacity(9 + data.len());
        cmd.push(protocol::SPI_WRITE);
        cmd.extend_from_slice(&address.to_le_bytes());
        cmd.extend_from_slice(&(data.len() as u32).to_le_bytes());
        cmd.extend_from_slice(data);
        self.transport
            .dnload(protocol::SPI_BLOCK, &cmd)
            .context("write_spi_flash")?;
        self.transport.get_status().context("write_spi_flash")?;
        self.transport.get_status().context("write_spi_flash")?;
        Ok(())
    }

    /// Streams `size` bytes of SPI flash starting at `address` into
    /// `writer`.
    pub(crate) fn read_spi_flash_to<W: Write>(
        &mut self,
        address: u32,
        size: usize,
        writer: &mut W,
    ) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        let mut buf = vec![0u8; self.block_size];

        self.progress.set_max_count(size / self.block_size)?;
        self.run_script(protocol::ENTER_PROGRAMMING_MODE)
            .context("read_spi_flash_to")?;

        let end = address as usize + size;
        let mut addr = address as usize;
        while addr < end {
            self.progress.tick()?;

            let remaining = end - addr;
            if remaining < buf.len() {
                buf.truncate(remaining);
            }

            self.read_spi_flash(addr as u32, &mut buf)
                .context("read_spi_flash_to")?;
            write_stream(&mut writer, &buf).context("read_spi_flash_to")?;

            addr += self.block_size;
        }
        writer
            .flush()
            .map_err(Error::from)
            .context("read_spi_flash_to")?;

        self.progress.finish();
        Ok(())
    }

    /// Erases then programs `size` bytes of SPI flash starting at `address`
    /// from `reader`.
    pub(crate) fn write_spi_flash_from<R: Read>(
        &mut self,
        address: u32,
        size: usize,
        reader: &mut R,
    ) -> Result<()> {
        let flash_size = self.spi_flash_size().context("write_spi_flash_from")?;
        if address as usize + size > flash_size as usize {
            return Err(Error::OutOfBounds {
                addr: address,
                len: size,
            })
            .context("write_spi_flash_from");
        }

        self.run_script(protocol::ENTER_PROGRAMMING_MODE)
            .context("write_spi_flash_from")?;
        self.erase_spi_flash_blocks(address, size)
            .context("write_spi_flash_from")?;
        self.set_address(0).context("write_spi_flash_from")?;
        self.transport.get_status().context("write_spi_flash_from")?;

        let mut reader = BufReader::new(reader);
        let mut buf = vec![0u8; self.block_size];

        self.progress.set_max_count(size / self.block_size)?;

        let end = address as usize + size;
        let mut addr = address;
        while (addr as usize) < end {
            self.progress.tick()?;

            if read_block(&mut reader, &mut buf)
                .map_err(Error::from)
                .context("write_spi_flash_from")?
                == 0
            {
                return Err(Error::ShortRead).context("write_spi_flash_from");
            }

            self.write_spi_flash(addr, &buf)
                .context("write_spi_flash_from")?;

            loop {
                let status = self.transport.get_status().context("write_spi_flash_from")?;
                if status.state == DfuState::DfuWriteIdle {
                    break;
                }
            }

            addr += self.block_size as u32;
        }

        self.progress.finish();
        Ok(())
    }

    /// Identifies the SPI flash chip, retrying once behind a fresh `init`.
    pub(crate) fn spi_flash_id(&mut self) -> Result<&'static SpiFlashChip> {
        match self.probe_spi_flash_id() {
            Ok(chip) => Ok(chip),
            Err(first) => {
                log::warn!("SPI flash id probe failed ({first}), reinitializing and retrying");
                let _ = self.init();
                self.probe_spi_flash_id()
            }
        }
    }

    /// Capacity of the identified SPI flash chip, in bytes.
    pub(crate) fn spi_flash_size(&mut self) -> Result<u32> {
        Ok(self.spi_flash_id()?.size)
    }

    fn probe_spi_flash_id(&mut self) -> Result<&'static SpiFlashChip> {
        self.transport
            .dnload(protocol::SPI_BLOCK, &[protocol::SPI_ID])
            .context("spi_flash_id")?;
        self.transport.get_status().context("spi_flash_id")?;
        self.transport.get_status().context("spi_flash_id")?;

        let mut bytes = [0u8; 4];
        self.transport
            .upload(protocol::SPI_BLOCK, &mut bytes)
            .context("spi_flash_id")?;

        let id = u32::from(bytes[0]) << 16 | u32::from(bytes[1]) << 8 | u32::from(bytes[2]);
        log::debug!("SPI flash id: {id:06x}");
        chip::identify(id).context("spi_flash_id")
    }
}

#[cfg(test)]
mod tests {
    use super::read_block;

    #[test]
    fn read_block_pads_a_mid_block_eof_with_erased_bytes() {
        let mut input: &[u8] = &[1, 2, 3];
        let mut buf = [0u8; 8];
        assert_eq!(read_block(&mut input, &mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3, 0xff, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn read_block_reports_eof_on_the_block_boundary() {
        let mut input: &[u8] = &[];
        let mut buf = [7u8; 4];
        assert_eq!(read_block(&mut input, &mut buf).unwrap(), 0);
        assert_eq!(buf, [7, 7, 7, 7]);
    }
}
