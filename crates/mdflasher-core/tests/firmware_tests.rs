//! Firmware programming against the in-memory radio.

use mdflasher_core::{Error, Session};
use mdflasher_dummy::{Call, DummyConfig, DummyRadio};

const BLOCK_SIZE: usize = 1024;
const ERASE_BLOCK_SIZE: usize = 64 * 1024;

const REGION_ADDRESSES: [u32; 9] = [
    0x0800_c000,
    0x0801_0000,
    0x0802_0000,
    0x0804_0000,
    0x0806_0000,
    0x0808_0000,
    0x080a_0000,
    0x080c_0000,
    0x080e_0000,
];

fn erase_addresses(radio: &DummyRadio) -> Vec<u32> {
    radio
        .journal()
        .iter()
        .filter_map(|call| match call {
            Call::Dnload { block: 0, data } if data.first() == Some(&0x41) => {
                Some(u32::from_le_bytes(data[1..5].try_into().unwrap()))
            }
            _ => None,
        })
        .collect()
}

#[test]
fn wrapped_firmware_skips_its_header_and_programs_from_the_payload() {
    let payload: Vec<u8> = (0..2 * BLOCK_SIZE + 512).map(|i| (i % 241) as u8).collect();
    let mut image = Vec::new();
    image.extend_from_slice(b"OutSecurityBin");
    image.resize(0x100, 0x5a);
    image.extend_from_slice(&payload);

    let mut session = Session::new(DummyRadio::new(), BLOCK_SIZE, ERASE_BLOCK_SIZE);
    session.write_firmware(&mut &image[..]).unwrap();

    let radio = session.close();

    // All nine regions are erased up front, by their head addresses.
    assert_eq!(erase_addresses(&radio), REGION_ADDRESSES);

    // The first programmed block is payload, not header.
    assert_eq!(
        radio.flash_block(REGION_ADDRESSES[0], 2).unwrap(),
        &payload[..BLOCK_SIZE]
    );
    assert_eq!(
        radio.flash_block(REGION_ADDRESSES[0], 3).unwrap(),
        &payload[BLOCK_SIZE..2 * BLOCK_SIZE]
    );

    // The image ends mid-block: the tail is padded with erased bytes.
    let last = radio.flash_block(REGION_ADDRESSES[0], 4).unwrap();
    assert_eq!(&last[..512], &payload[2 * BLOCK_SIZE..]);
    assert!(last[512..].iter().all(|&b| b == 0xff));

    // Nothing reached the second region.
    assert!(radio.flash_block(REGION_ADDRESSES[1], 2).is_none());
}

#[test]
fn bare_firmware_images_program_from_their_first_byte() {
    let image: Vec<u8> = (0..BLOCK_SIZE).map(|i| (i % 199) as u8).collect();

    let mut session = Session::new(DummyRadio::new(), BLOCK_SIZE, ERASE_BLOCK_SIZE);
    session.write_firmware(&mut &image[..]).unwrap();

    let radio = session.close();
    assert_eq!(radio.flash_block(REGION_ADDRESSES[0], 2).unwrap(), &image[..]);
}

#[test]
fn firmware_write_is_refused_outside_bootloader_mode() {
    let radio = DummyRadio::with_config(DummyConfig {
        manufacturer: "Foo".into(),
        ..DummyConfig::default()
    });

    let mut session = Session::new(radio, BLOCK_SIZE, ERASE_BLOCK_SIZE);
    let image = vec![0u8; BLOCK_SIZE];
    let err = session.write_firmware(&mut &image[..]).unwrap_err();

    assert!(matches!(err.root(), Error::NotBootloader));
    let message = err.root().to_string();
    assert!(message.contains("PTT button"));

    // Refusal happens before anything is erased or programmed.
    let radio = session.close();
    assert!(erase_addresses(&radio).is_empty());
    assert!(radio.data_dnload_blocks().is_empty());
}
