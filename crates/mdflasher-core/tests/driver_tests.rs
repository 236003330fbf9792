//! Cancellation and state-discipline behaviour of the driver loop.

use mdflasher_core::{Cancelled, Error, Session};
use mdflasher_dummy::DummyRadio;

const BLOCK_SIZE: usize = 1024;
const ERASE_BLOCK_SIZE: usize = 64 * 1024;

#[test]
fn cancellation_stops_the_operation_before_any_transfer() {
    let mut session = Session::new(DummyRadio::new(), BLOCK_SIZE, ERASE_BLOCK_SIZE);
    session.set_progress_callback(Some(Box::new(|_| Err(Cancelled))));

    let mut buf = vec![0u8; BLOCK_SIZE];
    let err = session.read_codeplug(&mut buf).unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    // The first tick fires while sizing the progress budget, before the
    // device is touched.
    assert!(session.close().journal().is_empty());
}

#[test]
fn unexpected_state_after_set_address_blocks_all_data_transfers() {
    let mut radio = DummyRadio::new();
    radio.wedge_on_opcode(0x21);

    let mut session = Session::new(radio, BLOCK_SIZE, ERASE_BLOCK_SIZE);
    let data = vec![0u8; 2 * BLOCK_SIZE];
    let err = session.write_codeplug(&data).unwrap_err();

    assert!(matches!(
        err.root(),
        Error::UnexpectedState { actual, .. } if *actual != mdflasher_core::DfuState::DfuWriteIdle
    ));

    // No codeplug block was downloaded after the failed address setup.
    assert!(session.close().data_dnload_blocks().is_empty());
}
