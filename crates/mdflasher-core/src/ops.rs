//! The externally visible radio operations.
//!
//! Every verb starts from a fresh `init`, drives the flash engine, and
//! (except for firmware writes, where the device resets itself) finishes by
//! rebooting the radio back into its application.

use std::io::{Cursor, Read, Write};

use crate::error::{Error, ErrorContext, Result};
use crate::session::Session;
use crate::transport::DfuTransport;

/// SPI flash address of the user (contact) database.
const USER_DB_ADDR: u32 = 0x10_0000;

/// Internal-flash address of the user database on UV380-family radios.
const UV380_USER_DB_ADDR: u32 = 0x20_0000;

/// Smallest plausible user database, header included.
const MIN_DB_SIZE: usize = 40;
/// Largest plausible user database, header included.
const MAX_DB_SIZE: usize = 14 * 1024 * 1024;

impl<T: DfuTransport> Session<T> {
    /// Reads `data.len()` bytes of the codeplug from internal flash address
    /// 0 into `data`, then reboots the radio.
    pub fn read_codeplug(&mut self, data: &mut [u8]) -> Result<()> {
        let size = data.len();
        let mut cursor = Cursor::new(data);
        self.read_flash_to(0, size, &mut cursor)
            .context("read_codeplug")?;
        self.reboot().context("read_codeplug")
    }

    /// Programs `data` into internal flash starting at address 0, then
    /// reboots the radio.
    pub fn write_codeplug(&mut self, data: &[u8]) -> Result<()> {
        let mut reader = data;
        self.write_flash_from(0, data.len(), &mut reader)
            .context("write_codeplug")?;
        self.reboot().context("write_codeplug")
    }

    /// Streams the entire SPI flash (size detected from the chip id) into
    /// `writer`, then reboots the radio.
    pub fn dump_spi_flash<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        self.progress.set_max_count(100)?;
        self.init().context("dump_spi_flash")?;

        let size = self.spi_flash_size().context("dump_spi_flash")? as usize;
        self.progress.set_max_count(size / self.block_size)?;

        self.read_spi_flash_to(0, size, writer)
            .context("dump_spi_flash")?;
        self.progress.finish();

        self.reboot().context("dump_spi_flash")
    }

    /// Reads the user database from SPI flash into `writer`, then reboots
    /// the radio.
    ///
    /// The database announces its own size: the image starts with a
    /// newline-terminated decimal byte count. The count (header included) is
    /// validated against plausible bounds before anything is streamed.
    pub fn read_user_db<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        self.init().context("read_user_db")?;

        // The header probe runs with progress suspended so the visible
        // counter does not run up and then restart for the real transfer.
        let saved = self.progress.take_callback();
        let mut header = Vec::with_capacity(1024);
        let probe = self.read_spi_flash_to(USER_DB_ADDR, 1024, &mut header);
        self.progress.set_callback(saved);
        probe.context("read_user_db")?;

        let count = parse_db_size(&header).context("read_user_db")?;
        if !(MIN_DB_SIZE..=MAX_DB_SIZE).contains(&count) {
            return Err(Error::DbSizeOutOfRange(count)).context("read_user_db");
        }

        self.progress.set_max_count(100)?;
        self.progress.finish();

        self.read_spi_flash_to(USER_DB_ADDR, count, writer)
            .context("read_user_db")?;
        self.reboot().context("read_user_db")
    }

    /// Writes a rendered text-format user database, prefixing the image
    /// with its decimal length and a newline as the radio firmware expects.
    /// Reboots the radio.
    pub fn write_user_db(&mut self, users: &str) -> Result<()> {
        self.init().context("write_user_db")?;

        let image = format!("{}\n{}", users.len(), users);
        let mut reader = image.as_bytes();
        self.write_spi_flash_from(USER_DB_ADDR, image.len(), &mut reader)
            .context("write_user_db")?;

        self.reboot().context("write_user_db")
    }

    /// Writes a pre-rendered indexed binary user database image. Reboots
    /// the radio.
    pub fn write_user_db_indexed(&mut self, image: &[u8]) -> Result<()> {
        self.init().context("write_user_db_indexed")?;

        let mut reader = image;
        self.write_spi_flash_from(USER_DB_ADDR, image.len(), &mut reader)
            .context("write_user_db_indexed")?;

        self.reboot().context("write_user_db_indexed")
    }

    /// Streams `size` bytes from `reader` straight into the database area
    /// of SPI flash. Reboots the radio.
    pub fn write_user_db_raw<R: Read>(&mut self, reader: &mut R, size: usize) -> Result<()> {
        self.init().context("write_user_db_raw")?;

        self.write_spi_flash_from(USER_DB_ADDR, size, reader)
            .context("write_user_db_raw")?;

        self.reboot().context("write_user_db_raw")
    }

    /// Writes a user database image into internal flash, where the
    /// UV380-family radios (and the MD2017) keep it. Reboots the radio.
    pub fn write_uv380_user_db(&mut self, image: &[u8]) -> Result<()> {
        self.init().context("write_uv380_user_db")?;

        let mut reader = image;
        self.write_flash_from(UV380_USER_DB_ADDR, image.len(), &mut reader)
            .context("write_uv380_user_db")?;

        self.reboot().context("write_uv380_user_db")
    }

    /// Programs a firmware image read from `reader`.
    ///
    /// The radio must be powered on in bootloader mode (PTT plus the button
    /// above it held during power-on); otherwise the operation is refused
    /// before anything is touched. No reboot follows, the device resets
    /// itself when manifestation completes.
    pub fn write_firmware<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        self.init().context("write_firmware")?;
        self.write_firmware_from(reader)
    }
}

/// Parses the database header: a newline-terminated decimal payload size.
/// Returns the total byte count including the header line itself.
fn parse_db_size(header: &[u8]) -> Result<usize> {
    let newline = header
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(Error::BadDbHeader)?;
    let line = std::str::from_utf8(&header[..newline]).map_err(|_| Error::BadDbHeader)?;
    let payload: usize = line.parse().map_err(|_| Error::BadDbHeader)?;
    Ok(payload + newline + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_size_includes_the_header_line() {
        assert_eq!(parse_db_size(b"123\nxyz").unwrap(), 127);
        assert_eq!(parse_db_size(b"7\n").unwrap(), 9);
    }

    #[test]
    fn db_header_must_be_a_terminated_decimal() {
        assert!(matches!(parse_db_size(b"123"), Err(Error::BadDbHeader)));
        assert!(matches!(parse_db_size(b"abc\n"), Err(Error::BadDbHeader)));
        assert!(matches!(parse_db_size(b"\xff\xff\n"), Err(Error::BadDbHeader)));
    }
}
