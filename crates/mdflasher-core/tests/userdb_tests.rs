//! User (contact) database operations against the in-memory radio.

use mdflasher_core::{Error, Session};
use mdflasher_dummy::{Call, DummyRadio};

const BLOCK_SIZE: usize = 1024;
const ERASE_BLOCK_SIZE: usize = 64 * 1024;
const USER_DB_ADDR: usize = 0x10_0000;

fn seeded_radio(header: &[u8], payload: &[u8]) -> DummyRadio {
    let mut radio = DummyRadio::new();
    let spi = radio.spi_mut();
    spi[USER_DB_ADDR..USER_DB_ADDR + header.len()].copy_from_slice(header);
    let start = USER_DB_ADDR + header.len();
    spi[start..start + payload.len()].copy_from_slice(payload);
    radio
}

#[test]
fn read_user_db_streams_exactly_the_announced_count() {
    let payload: Vec<u8> = (0..123).map(|i| i as u8).collect();
    let radio = seeded_radio(b"123\n", &payload);

    let mut session = Session::new(radio, BLOCK_SIZE, ERASE_BLOCK_SIZE);
    let mut out = Vec::new();
    session.read_user_db(&mut out).unwrap();

    assert_eq!(out.len(), 4 + 123);
    assert_eq!(&out[..4], b"123\n");
    assert_eq!(&out[4..], &payload[..]);
}

#[test]
fn implausibly_small_db_is_rejected() {
    let radio = seeded_radio(b"7\n", &[0u8; 16]);
    let mut session = Session::new(radio, BLOCK_SIZE, ERASE_BLOCK_SIZE);

    let err = session.read_user_db(&mut Vec::new()).unwrap_err();
    assert!(matches!(err.root(), Error::DbSizeOutOfRange(9)));
}

#[test]
fn implausibly_large_db_is_rejected() {
    let radio = seeded_radio(b"20000000\n", &[0u8; 16]);
    let mut session = Session::new(radio, BLOCK_SIZE, ERASE_BLOCK_SIZE);

    let err = session.read_user_db(&mut Vec::new()).unwrap_err();
    assert!(matches!(err.root(), Error::DbSizeOutOfRange(20_000_009)));
}

#[test]
fn write_user_db_prefixes_the_length_header_and_pads_the_tail() {
    let users = "1023,N0CALL,Somewhere\n2047,N0SIGN,Elsewhere\n".repeat(30);

    let mut session = Session::new(DummyRadio::new(), BLOCK_SIZE, ERASE_BLOCK_SIZE);
    session.write_user_db(&users).unwrap();

    let radio = session.close();
    let expected_prefix = format!("{}\n", users.len());
    let image_len = expected_prefix.len() + users.len();

    let spi = radio.spi();
    assert_eq!(
        &spi[USER_DB_ADDR..USER_DB_ADDR + expected_prefix.len()],
        expected_prefix.as_bytes()
    );
    assert_eq!(
        &spi[USER_DB_ADDR + expected_prefix.len()..USER_DB_ADDR + image_len],
        users.as_bytes()
    );

    // The final SPI write carries a full block whose tail is erased bytes.
    let last_write = radio
        .journal()
        .iter()
        .rev()
        .find_map(|call| match call {
            Call::Dnload { block: 1, data } if data.first() == Some(&0x04) => Some(data),
            _ => None,
        })
        .expect("no SPI write issued");
    let payload = &last_write[9..];
    assert_eq!(payload.len(), BLOCK_SIZE);
    let tail_len = BLOCK_SIZE - image_len % BLOCK_SIZE;
    assert!(payload[BLOCK_SIZE - tail_len..].iter().all(|&b| b == 0xff));
}

#[test]
fn raw_user_db_write_streams_the_given_size() {
    let image: Vec<u8> = (0..1500).map(|i| (i % 200) as u8).collect();

    let mut session = Session::new(DummyRadio::new(), BLOCK_SIZE, ERASE_BLOCK_SIZE);
    session
        .write_user_db_raw(&mut &image[..], image.len())
        .unwrap();

    let radio = session.close();
    assert_eq!(
        &radio.spi()[USER_DB_ADDR..USER_DB_ADDR + image.len()],
        &image[..]
    );
    // Mid-block end of input pads the remainder of the last block.
    assert!(radio.spi()[USER_DB_ADDR + image.len()..USER_DB_ADDR + 2 * BLOCK_SIZE]
        .iter()
        .all(|&b| b == 0xff));
}
