//! External SPI flash identification.
//!
//! The radio reports a 3-byte JEDEC id through the vendor id command; the
//! chip determines how much external flash the bulk SPI operations may
//! address.

use crate::error::{Error, Result};

/// A recognized SPI flash part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiFlashChip {
    /// Part name, e.g. `"W25Q128FV"`.
    pub name: &'static str,
    /// Capacity in bytes.
    pub size: u32,
}

/// 16 MiB Winbond part found in most radios of the family.
pub const W25Q128FV: SpiFlashChip = SpiFlashChip {
    name: "W25Q128FV",
    size: 16 * 1024 * 1024,
};

/// 1 MiB part found in some early MD-380 units.
pub const W25Q80BL: SpiFlashChip = SpiFlashChip {
    name: "W25Q80BL",
    size: 1024 * 1024,
};

/// Id reported through a broken libusb stack rather than by a real chip.
const DEGRADED_USB_ID: u32 = 0x70f101;

/// Looks up a chip by the 3-byte JEDEC id the radio reports.
pub fn identify(id: u32) -> Result<&'static SpiFlashChip> {
    match id {
        // 0x10dc01 is an alternate id some W25Q128FV batches report.
        0xef4018 | 0x10dc01 => Ok(&W25Q128FV),
        0xef4014 => Ok(&W25Q80BL),
        DEGRADED_USB_ID => Err(Error::DegradedUsb),
        _ => Err(Error::UnknownFlash(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winbond_ids_resolve_to_their_parts() {
        assert_eq!(identify(0xef4018).unwrap().size, 16 * 1024 * 1024);
        assert_eq!(identify(0x10dc01).unwrap().name, "W25Q128FV");
        assert_eq!(identify(0xef4014).unwrap().size, 1024 * 1024);
    }

    #[test]
    fn degraded_usb_sentinel_is_reported_specifically() {
        assert!(matches!(identify(0x70f101), Err(Error::DegradedUsb)));
    }

    #[test]
    fn unknown_ids_carry_the_raw_value() {
        assert!(matches!(identify(0xc22018), Err(Error::UnknownFlash(0xc22018))));
    }
}
