//! Binary encoding of MDB peripheral commands and decoding of their answers.
//!
//! Everything in here is pure: a decoder takes the raw answer bytes of one
//! command and either returns the structured record or a [`DecodeError`].
//! Every decoder checks the payload length before looking at any byte.

use snafu::Snafu;

pub mod bill_validator;
pub mod poll;
mod util;

pub use poll::{
    decode_poll, BillRouting, FtlMessage, PollEvent, RecyclerEvent, ValidatorEvent,
};

/// Error type for the MDB decoders
#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum DecodeError {
    /// The payload length doesn't match the fixed length of the record.
    #[snafu(display("Invalid {record} length, expected {expected}, got {actual}"))]
    LengthMismatch {
        record: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A poll byte that doesn't map to any known status code.
    #[snafu(display("Unknown status code 0x{code:02X}"))]
    UnknownStatus { code: u8 },
    /// A field that should be binary coded decimal has a nibble above 9.
    #[snafu(display("Invalid BCD value in {field}"))]
    InvalidBcd { field: &'static str },
    /// A text field contains non-ASCII bytes.
    #[snafu(display("Invalid text in {field}"))]
    InvalidText { field: &'static str },
    /// The bytes could not be split into the fields of the record.
    #[snafu(display("Malformed {record}"))]
    Malformed { record: &'static str },
}
