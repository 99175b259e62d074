//! The contract between the controller and the peripherals it drives.

use snafu::Snafu;

use crate::device;
use crate::mdb::DecodeError;
use crate::message::Answer;

/// Raw access to the MDB bus.
///
/// The only path by which a peripheral reaches the bus. A call returns when
/// the peripheral answered or the adapter timed out, so transactions never
/// overlap.
pub trait Bus {
    /// Send `command` (address and command bits) followed by `data`.
    fn transceive(&mut self, command: u8, data: &[u8]) -> Result<Answer, device::Error>;
}

/// A peripheral driven by the controller.
pub trait Peripheral {
    fn name(&self) -> &'static str;

    /// Called once, after the controller enabled the generic master mode.
    fn prepare(&mut self, bus: &mut dyn Bus) -> Result<(), Error>;

    /// Called once per controller tick. Returning `false` stops the controller loop.
    fn tick(&mut self, bus: &mut dyn Bus) -> Result<bool, Error>;
}

/// Error type for peripheral command sequences
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// The bus transaction itself failed.
    #[snafu(display("{command} transaction failed"))]
    Transaction {
        command: &'static str,
        source: device::Error,
    },
    /// The peripheral answered with data that doesn't decode.
    #[snafu(display("Invalid {command} answer"))]
    Decode {
        command: &'static str,
        source: DecodeError,
    },
    /// The peripheral answered, but not in the expected form.
    #[snafu(display("Unexpected {command} answer {answer:?}"))]
    Protocol {
        command: &'static str,
        answer: Answer,
    },
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transaction { source, .. } if source.is_timeout())
    }
}
