//! Codeplug read/write against the in-memory radio.

use mdflasher_core::Session;
use mdflasher_dummy::{Call, DummyRadio};

const BLOCK_SIZE: usize = 1024;
const ERASE_BLOCK_SIZE: usize = 64 * 1024;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn codeplug_round_trips_across_the_reserved_window() {
    // 260 blocks spans the discontinuity at logical block 256.
    let data = pattern(260 * BLOCK_SIZE);

    let mut session = Session::new(DummyRadio::new(), BLOCK_SIZE, ERASE_BLOCK_SIZE);
    session.write_codeplug(&data).unwrap();

    let mut readback = vec![0u8; data.len()];
    session.read_codeplug(&mut readback).unwrap();
    assert_eq!(readback, data);

    let radio = session.close();

    // Downloads jump from block 257 straight to 1090 at the window edge.
    let dnloads = radio.data_dnload_blocks();
    assert_eq!(dnloads.len(), 260);
    assert_eq!(dnloads[0], 2);
    assert_eq!(dnloads[255], 257);
    assert_eq!(dnloads[256], 1090);
    assert_eq!(dnloads[259], 1093);

    // The read path uploads the exact same sequence.
    let uploads: Vec<u16> = radio
        .journal()
        .iter()
        .filter_map(|call| match call {
            Call::Upload { block, len } if *block > 1 && *len == BLOCK_SIZE => Some(*block),
            _ => None,
        })
        .collect();
    assert_eq!(uploads, dnloads);
}

#[test]
fn unaligned_codeplug_sizes_are_rejected_before_any_transfer() {
    let mut session = Session::new(DummyRadio::new(), BLOCK_SIZE, ERASE_BLOCK_SIZE);

    let mut buf = vec![0u8; BLOCK_SIZE + 1];
    let err = session.read_codeplug(&mut buf).unwrap_err();
    assert!(matches!(
        err.root(),
        mdflasher_core::Error::BadAlignment(_)
    ));

    let radio = session.close();
    assert!(radio.journal().is_empty());
}
