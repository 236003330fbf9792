//! Error types for the driver core.
//!
//! Every failure carries the name of the operation it arose in, so a fully
//! wrapped error reads as a colon-separated trail, e.g.
//! `write_codeplug: set_address: transport error: pipe stalled`.

use std::io;

use thiserror::Error;

use crate::transport::DfuState;

/// Errors produced while driving a radio.
#[derive(Debug, Error)]
pub enum Error {
    /// Failure reported by the lower DFU transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// Streamed I/O against a caller-supplied reader or writer failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The device did not land in the state a command sequence requires.
    #[error("radio is in state {actual:?}, expected {expected:?}")]
    UnexpectedState {
        /// State the protocol sequence requires.
        expected: DfuState,
        /// State the device actually reported.
        actual: DfuState,
    },

    /// `init` could not normalize the device into dfuIDLE.
    #[error("radio is not in the idle state")]
    NotIdle,

    /// Firmware writes require the bootloader personality.
    #[error(
        "The radio is not in bootloader mode. Enter bootloader mode by holding\n\
         down the PTT button and the button above it while turning on the radio.\n\
         The radio's LED will blink green and red."
    )]
    NotBootloader,

    /// Caller-supplied address or size is not a multiple of the block size.
    #[error("{0} is not a multiple of the block size")]
    BadAlignment(&'static str),

    /// A caller-supplied writer accepted fewer bytes than it was given.
    #[error("short write")]
    ShortWrite,

    /// A caller-supplied reader ended before the promised size.
    #[error("short read")]
    ShortRead,

    /// The requested range does not fit in the identified flash chip.
    #[error("flash too small to write {len} bytes at {addr:#x}")]
    OutOfBounds {
        /// Requested start address.
        addr: u32,
        /// Requested length in bytes.
        len: usize,
    },

    /// The user-database header is not a newline-terminated decimal count.
    #[error("bad user database header")]
    BadDbHeader,

    /// The user-database header advertises an implausible byte count.
    #[error("bad db size: {0}")]
    DbSizeOutOfRange(usize),

    /// The SPI flash JEDEC id is not in the known chip table.
    #[error("unknown SPI flash: {0:06x}, please report")]
    UnknownFlash(u32),

    /// The sentinel id a broken libusb stack produces instead of a chip id.
    #[error(
        "Bad LibUSB connection. Please see the advice from N6YN at \
         https://github.com/travisgoodspeed/md380tools/issues/186"
    )]
    DegradedUsb,

    /// The progress callback asked for the operation to stop.
    #[error("cancelled")]
    Cancelled,

    /// A failure wrapped with the operation it arose in.
    #[error("{op}: {source}")]
    Context {
        /// Name of the operation.
        op: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Walks the context chain down to the underlying failure.
    pub fn root(&self) -> &Error {
        let mut err = self;
        while let Error::Context { source, .. } = err {
            err = source;
        }
        err
    }

    /// Wraps `self` with an operation name. Cancellation is passed through
    /// untouched so callers can always match on it directly.
    pub(crate) fn wrap(self, op: &'static str) -> Error {
        match self {
            Error::Cancelled => Error::Cancelled,
            err => Error::Context {
                op,
                source: Box::new(err),
            },
        }
    }
}

/// Result type alias using the driver [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) trait ErrorContext<T> {
    /// Attaches the operation name `op` to the error, if any.
    fn context(self, op: &'static str) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn context(self, op: &'static str) -> Result<T> {
        self.map_err(|err| err.wrap(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_builds_a_colon_separated_trail() {
        let err: Result<()> = Err(Error::Transport("pipe stalled".into()));
        let err = err.context("set_address").context("write_codeplug");
        assert_eq!(
            err.unwrap_err().to_string(),
            "write_codeplug: set_address: transport error: pipe stalled"
        );
    }

    #[test]
    fn root_skips_the_context_layers() {
        let err = Error::NotIdle.wrap("init").wrap("read_codeplug");
        assert!(matches!(err.root(), Error::NotIdle));
    }

    #[test]
    fn cancellation_is_never_wrapped() {
        let err = Error::Cancelled.wrap("erase_flash_blocks");
        assert!(matches!(err, Error::Cancelled));
    }
}
