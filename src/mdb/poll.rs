//! Decoding of bill validator POLL answers into events.
//!
//! A POLL answer is either a single file transport layer message, recognised
//! by a first byte in 0x1B..=0x1F, or a list of independent one byte events.

use arrayvec::ArrayVec;
use snafu::{ensure, OptionExt};

use super::util::ensure_len;
use super::{DecodeError, LengthMismatchSnafu, UnknownStatusSnafu};
use crate::types::BillType;

/// Maximum number of event bytes in one POLL answer.
pub const MAX_POLL_LEN: usize = 16;

/// Bill validator status codes, high nibble 0x0.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValidatorEvent {
    DefectiveMotor,
    SensorProblem,
    ValidatorBusy,
    RomChecksumError,
    ValidatorJammed,
    ValidatorWasReset,
    BillRemoved,
    CashBoxOutOfPosition,
    ValidatorDisabled,
    InvalidEscrowRequest,
    BillRejected,
    PossibleCreditedBillRemoval,
}

impl ValidatorEvent {
    pub fn from_code(code: u8) -> Option<Self> {
        use ValidatorEvent::*;
        Some(match code {
            0x01 => DefectiveMotor,
            0x02 => SensorProblem,
            0x03 => ValidatorBusy,
            0x04 => RomChecksumError,
            0x05 => ValidatorJammed,
            0x06 => ValidatorWasReset,
            0x07 => BillRemoved,
            0x08 => CashBoxOutOfPosition,
            0x09 => ValidatorDisabled,
            0x0A => InvalidEscrowRequest,
            0x0B => BillRejected,
            0x0C => PossibleCreditedBillRemoval,
            _ => return None,
        })
    }
}

/// Bill recycler status codes, high nibble 0x2.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RecyclerEvent {
    EscrowRequest,
    DispenserPayoutBusy,
    DispenserBusy,
    DefectiveDispenserSensor,
    DispenserDidNotStart,
    DispenserJam,
    RomChecksumError,
    DispenserDisabled,
    BillWaiting,
    FilledKeyPressed,
}

impl RecyclerEvent {
    pub fn from_code(code: u8) -> Option<Self> {
        use RecyclerEvent::*;
        Some(match code {
            0x21 => EscrowRequest,
            0x22 => DispenserPayoutBusy,
            0x23 => DispenserBusy,
            0x24 => DefectiveDispenserSensor,
            0x26 => DispenserDidNotStart,
            0x27 => DispenserJam,
            0x28 => RomChecksumError,
            0x29 => DispenserDisabled,
            0x2A => BillWaiting,
            0x2F => FilledKeyPressed,
            _ => return None,
        })
    }
}

/// Where an accepted bill went, bits 6..4 of the event byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BillRouting {
    Stacked,
    EscrowPosition,
    Returned,
    ToRecycler,
    DisabledBillRejected,
    ToRecyclerManualFill,
    ManualDispense,
    TransferredFromRecyclerToCashbox,
}

impl BillRouting {
    pub const fn from_bits(bits: u8) -> Self {
        use BillRouting::*;
        match bits & 0x07 {
            0 => Stacked,
            1 => EscrowPosition,
            2 => Returned,
            3 => ToRecycler,
            4 => DisabledBillRejected,
            5 => ToRecyclerManualFill,
            6 => ManualDispense,
            _ => TransferredFromRecyclerToCashbox,
        }
    }
}

/// Data block of an FTL SEND BLOCK message.
pub type FtlBlock = ArrayVec<u8, 31>;

/// File transport layer messages sent by the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtlMessage {
    RequestToReceive {
        destination: u8,
        source: u8,
        file_id: u8,
        max_length: u8,
        control: u8,
    },
    RetryDeny {
        destination: u8,
        source: u8,
        retry_delay: u8,
    },
    SendBlock {
        destination: u8,
        block: u8,
        data: FtlBlock,
    },
    OkToSend {
        destination: u8,
        source: u8,
    },
    RequestToSend {
        destination: u8,
        source: u8,
        file_id: u8,
        max_length: u8,
        control: u8,
    },
}

/// One event from a POLL answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    Validator(ValidatorEvent),
    Recycler(RecyclerEvent),
    /// Bills were inserted while the validator was disabled.
    InputWhileDisabled { attempts: u8 },
    BillsAccepted {
        routing: BillRouting,
        bill_type: BillType,
    },
    FileTransport(FtlMessage),
}

/// Decode a POLL answer into its events.
pub fn decode_poll(bytes: &[u8]) -> Result<Vec<PollEvent>, DecodeError> {
    if let Some(first) = bytes.first() {
        if first & 0xF0 == 0x10 {
            return decode_ftl(bytes).map(|message| vec![PollEvent::FileTransport(message)]);
        }
    }
    ensure!(
        !bytes.is_empty() && bytes.len() <= MAX_POLL_LEN,
        LengthMismatchSnafu {
            record: "poll",
            expected: MAX_POLL_LEN,
            actual: bytes.len(),
        }
    );
    bytes.iter().map(|byte| decode_event(*byte)).collect()
}

fn decode_event(byte: u8) -> Result<PollEvent, DecodeError> {
    let unknown = || UnknownStatusSnafu { code: byte };
    if byte & 0x80 != 0 {
        Ok(PollEvent::BillsAccepted {
            routing: BillRouting::from_bits(byte >> 4),
            bill_type: BillType::from_nibble(byte),
        })
    } else if byte & 0xE0 == 0x40 {
        Ok(PollEvent::InputWhileDisabled {
            attempts: byte & 0x1F,
        })
    } else if byte & 0xF0 == 0x00 {
        ValidatorEvent::from_code(byte)
            .map(PollEvent::Validator)
            .with_context(unknown)
    } else if byte & 0xF0 == 0x20 {
        RecyclerEvent::from_code(byte)
            .map(PollEvent::Recycler)
            .with_context(unknown)
    } else {
        unknown().fail()
    }
}

fn decode_ftl(bytes: &[u8]) -> Result<FtlMessage, DecodeError> {
    match bytes[0] {
        0x1B => {
            ensure_len(bytes, "ftl request to receive", 6)?;
            Ok(FtlMessage::RequestToReceive {
                destination: bytes[1],
                source: bytes[2],
                file_id: bytes[3],
                max_length: bytes[4],
                control: bytes[5],
            })
        }
        0x1C => {
            ensure_len(bytes, "ftl retry/deny", 4)?;
            Ok(FtlMessage::RetryDeny {
                destination: bytes[1],
                source: bytes[2],
                retry_delay: bytes[3],
            })
        }
        0x1D => {
            ensure!(
                (3..=34).contains(&bytes.len()),
                LengthMismatchSnafu {
                    record: "ftl send block",
                    expected: 34usize,
                    actual: bytes.len(),
                }
            );
            Ok(FtlMessage::SendBlock {
                destination: bytes[1],
                block: bytes[2],
                data: bytes[3..].iter().copied().collect(),
            })
        }
        0x1E => {
            ensure_len(bytes, "ftl ok to send", 3)?;
            Ok(FtlMessage::OkToSend {
                destination: bytes[1],
                source: bytes[2],
            })
        }
        0x1F => {
            ensure_len(bytes, "ftl request to send", 6)?;
            Ok(FtlMessage::RequestToSend {
                destination: bytes[1],
                source: bytes[2],
                file_id: bytes[3],
                max_length: bytes[4],
                control: bytes[5],
            })
        }
        code => UnknownStatusSnafu { code }.fail(),
    }
}
