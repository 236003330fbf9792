//! mdflasher-core - Driver core for MD-380 family DMR radios
//!
//! This crate implements the protocol overlay these radios speak on top of
//! USB DFU: the state machine that coerces the device into dfuIDLE, the
//! vendor command scripts that unlock programming mode, the block-oriented
//! read/write loops against internal and external SPI flash (including the
//! irregular block-number mapping of internal flash), and the
//! erase/program choreography for firmware, codeplug and contact-database
//! images.
//!
//! The USB layer itself is not here. The driver consumes a
//! [`DfuTransport`], a blocking handle that speaks standard DFU on an
//! endpoint; hardware back-ends and the in-memory test emulator implement
//! it elsewhere.
//!
//! # Example
//!
//! ```ignore
//! use mdflasher_core::Session;
//!
//! let transport = open_radio()?; // any DfuTransport implementation
//! let mut session = Session::new(transport, 1024, 64 * 1024);
//! session.set_progress_callback(Some(Box::new(|counter| {
//!     eprint!("\r{:3}%", counter / 10_000);
//!     Ok(())
//! })));
//!
//! let mut codeplug = vec![0u8; 256 * 1024];
//! session.read_codeplug(&mut codeplug)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod blockmap;
pub mod chip;
pub mod error;
mod firmware;
mod flash;
pub mod progress;
pub mod protocol;
mod session;
pub mod transport;

mod ops;

pub use error::{Error, Result};
pub use progress::{Cancelled, ProgressCallback, MAX_PROGRESS, MIN_PROGRESS};
pub use session::Session;
pub use transport::{DfuState, DfuStatus, DfuTransport};
