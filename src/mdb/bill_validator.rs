//! Commands and answer records of the MDB bill validator, address 0x30.
//!
//! Multi-byte integers are big-endian. Bit arrays are expanded most
//! significant bit first, so index 0 of a 16 entry array is bit 15 of the word.

use arrayvec::ArrayVec;
use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::sequence::tuple;
use nom::IResult;

use super::util::{ascii, bcd, bcd_field, bits16, ensure_len, parse_fixed, words};
use super::DecodeError;
use crate::types::{addr, Address, BillType};

/// Bus address of the bill validator.
pub const ADDRESS: Address = addr(0x30);

/// Argument bytes of a command, without the command byte.
pub const MAX_DATA: usize = 35;
pub type Data = ArrayVec<u8, MAX_DATA>;

/// Feature bits for [`Expansion::FeatureEnable`].
pub const FEATURE_FILE_TRANSPORT_LAYER: u32 = 0x0000_0001;
pub const FEATURE_BILL_RECYCLING: u32 = 0x0000_0002;

/// Recycler enable value routing a bill type to the recycler.
pub const ROUTE_TO_RECYCLER: u8 = 0x03;

pub const SETUP_LEN: usize = 27;
pub const STACKER_LEN: usize = 2;
pub const LEVEL1_IDENTIFICATION_LEN: usize = 29;
pub const LEVEL2_IDENTIFICATION_LEN: usize = 33;
pub const RECYCLER_SETUP_LEN: usize = 2;
pub const BILL_DISPENSE_STATUS_LEN: usize = 34;
pub const PAYOUT_STATUS_LEN: usize = 32;
pub const PAYOUT_VALUE_POLL_LEN: usize = 2;

/// An encoded command, ready for a generic master transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub data: Data,
}

/// Bill validator commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reset,
    Setup,
    /// Bits set select high security for the bill type.
    Security { bill_types: u16 },
    Poll,
    BillType { enable: u16, escrow_enable: u16 },
    /// Stack the bill in escrow if `accept`, return it otherwise.
    Escrow { accept: bool },
    Stacker,
    Expansion(Expansion),
}

/// Sub-commands of the EXPANSION command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    Identification,
    FeatureEnable { features: u32 },
    IdentificationWithOptionBits,
    RecyclerSetup,
    RecyclerEnable {
        manual_dispense_enable: u16,
        routing: [u8; 16],
    },
    BillDispenseStatus,
    DispenseBill { bill_type: BillType, count: u16 },
    DispenseValue { value: u16 },
    PayoutStatus,
    PayoutValuePoll,
    PayoutCancel,
    Diagnostics { data: ArrayVec<u8, 34> },
}

impl Expansion {
    const fn sub_command(&self) -> u8 {
        match self {
            Self::Identification => 0x00,
            Self::FeatureEnable { .. } => 0x01,
            Self::IdentificationWithOptionBits => 0x02,
            Self::RecyclerSetup => 0x03,
            Self::RecyclerEnable { .. } => 0x04,
            Self::BillDispenseStatus => 0x05,
            Self::DispenseBill { .. } => 0x06,
            Self::DispenseValue { .. } => 0x07,
            Self::PayoutStatus => 0x08,
            Self::PayoutValuePoll => 0x09,
            Self::PayoutCancel => 0x0A,
            Self::Diagnostics { .. } => 0xFF,
        }
    }
}

impl Command {
    const fn offset(&self) -> u8 {
        match self {
            Self::Reset => 0,
            Self::Setup => 1,
            Self::Security { .. } => 2,
            Self::Poll => 3,
            Self::BillType { .. } => 4,
            Self::Escrow { .. } => 5,
            Self::Stacker => 6,
            Self::Expansion(_) => 7,
        }
    }

    /// Short name for logs and errors.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Reset => "RESET",
            Self::Setup => "SETUP",
            Self::Security { .. } => "SECURITY",
            Self::Poll => "POLL",
            Self::BillType { .. } => "BILL TYPE",
            Self::Escrow { .. } => "ESCROW",
            Self::Stacker => "STACKER",
            Self::Expansion(sub) => match sub {
                Expansion::Identification => "EXP.ID.1",
                Expansion::FeatureEnable { .. } => "EXP.FEATURE ENABLE",
                Expansion::IdentificationWithOptionBits => "EXP.ID.2",
                Expansion::RecyclerSetup => "EXP.RECYCLER SETUP",
                Expansion::RecyclerEnable { .. } => "EXP.RECYCLER ENABLE",
                Expansion::BillDispenseStatus => "EXP.BILL DISPENSE STATUS",
                Expansion::DispenseBill { .. } => "EXP.DISPENSE BILL",
                Expansion::DispenseValue { .. } => "EXP.DISPENSE VALUE",
                Expansion::PayoutStatus => "EXP.PAYOUT STATUS",
                Expansion::PayoutValuePoll => "EXP.PAYOUT VALUE POLL",
                Expansion::PayoutCancel => "EXP.PAYOUT CANCEL",
                Expansion::Diagnostics { .. } => "EXP.DIAGNOSTICS",
            },
        }
    }

    pub fn encode(&self) -> Frame {
        let mut data = Data::new();
        match self {
            Self::Reset | Self::Setup | Self::Poll | Self::Stacker => {}
            Self::Security { bill_types } => data.extend(bill_types.to_be_bytes()),
            Self::BillType {
                enable,
                escrow_enable,
            } => {
                data.extend(enable.to_be_bytes());
                data.extend(escrow_enable.to_be_bytes());
            }
            Self::Escrow { accept } => data.push(u8::from(*accept)),
            Self::Expansion(sub) => {
                data.push(sub.sub_command());
                match sub {
                    Expansion::FeatureEnable { features } => data.extend(features.to_be_bytes()),
                    Expansion::RecyclerEnable {
                        manual_dispense_enable,
                        routing,
                    } => {
                        data.extend(manual_dispense_enable.to_be_bytes());
                        data.extend(routing.iter().copied());
                    }
                    Expansion::DispenseBill { bill_type, count } => {
                        data.push(**bill_type);
                        data.extend(count.to_be_bytes());
                    }
                    Expansion::DispenseValue { value } => data.extend(value.to_be_bytes()),
                    Expansion::Diagnostics { data: payload } => data.extend(payload.iter().copied()),
                    _ => {}
                }
            }
        }
        Frame {
            command: ADDRESS.command(self.offset()),
            data,
        }
    }
}

/// Answer to SETUP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setup {
    pub feature_level: u8,
    /// Set if the BCD country/currency field is at most 999.
    pub country_code: Option<u16>,
    /// Set if the BCD country/currency field is in 1000..=1999, minus 1000.
    pub currency_code: Option<u16>,
    pub scaling_factor: u16,
    pub decimal_places: u8,
    pub stacker_capacity: u16,
    pub security_levels: [bool; 16],
    pub escrow: bool,
    pub bill_type_credit: [u8; 16],
}

/// Answer to STACKER.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Stacker {
    pub full: bool,
    pub bills: u16,
}

/// Answer to the identification expansion commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub manufacturer_code: String,
    pub serial_number: String,
    pub model_number: String,
    pub software_version: u16,
}

/// Optional features advertised in the level 2+ identification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct OptionalFeatures {
    pub file_transport_layer: bool,
    pub bill_recycling: bool,
}

impl OptionalFeatures {
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            file_transport_layer: bits & FEATURE_FILE_TRANSPORT_LAYER != 0,
            bill_recycling: bits & FEATURE_BILL_RECYCLING != 0,
        }
    }

    pub const fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.file_transport_layer {
            bits |= FEATURE_FILE_TRANSPORT_LAYER;
        }
        if self.bill_recycling {
            bits |= FEATURE_BILL_RECYCLING;
        }
        bits
    }
}

/// Answer to the recycler setup expansion command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RecyclerSetup {
    /// Bill types that can be routed to the recycler.
    pub routing: [bool; 16],
}

/// Answer to the bill dispense status expansion command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BillDispenseStatus {
    pub dispenser_full: [bool; 16],
    pub bill_counts: [u16; 16],
}

/// Answer to the payout status expansion command, bills paid out per type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PayoutStatus {
    pub dispensed: [u16; 16],
}

fn setup_fields(
    bytes: &[u8],
) -> IResult<&[u8], (u8, &[u8], u16, u8, u16, u16, u8, &[u8])> {
    tuple((
        be_u8,
        take(2usize),
        be_u16,
        be_u8,
        be_u16,
        be_u16,
        be_u8,
        take(16usize),
    ))(bytes)
}

pub fn decode_setup(bytes: &[u8]) -> Result<Setup, DecodeError> {
    let (feature_level, code, scaling_factor, decimal_places, stacker_capacity, security, escrow, credit) =
        parse_fixed(bytes, "setup", SETUP_LEN, setup_fields)?;

    // Non-BCD values leave both codes unset, like values of 2000 and up.
    let (country_code, currency_code) = match bcd(code) {
        Some(code @ 0..=999) => (Some(code as u16), None),
        Some(code @ 1000..=1999) => (None, Some((code - 1000) as u16)),
        _ => (None, None),
    };

    let mut bill_type_credit = [0; 16];
    bill_type_credit.copy_from_slice(credit);

    Ok(Setup {
        feature_level,
        country_code,
        currency_code,
        scaling_factor,
        decimal_places,
        stacker_capacity,
        security_levels: bits16(security),
        escrow: escrow == 0xFF,
        bill_type_credit,
    })
}

pub fn decode_stacker(bytes: &[u8]) -> Result<Stacker, DecodeError> {
    ensure_len(bytes, "stacker", STACKER_LEN)?;
    let word = u16::from_be_bytes([bytes[0], bytes[1]]);
    Ok(Stacker {
        full: word & 0x8000 != 0,
        bills: word & 0x7FFF,
    })
}

fn identification_fields(bytes: &[u8]) -> IResult<&[u8], (&[u8], &[u8], &[u8], &[u8])> {
    tuple((take(3usize), take(12usize), take(12usize), take(2usize)))(bytes)
}

fn identification(
    (manufacturer, serial, model, version): (&[u8], &[u8], &[u8], &[u8]),
) -> Result<Identification, DecodeError> {
    Ok(Identification {
        manufacturer_code: ascii(manufacturer, "manufacturer code")?,
        serial_number: ascii(serial, "serial number")?,
        model_number: ascii(model, "model number")?,
        software_version: bcd_field(version, "software version")? as u16,
    })
}

pub fn decode_level1_identification(bytes: &[u8]) -> Result<Identification, DecodeError> {
    identification(parse_fixed(
        bytes,
        "level 1 identification",
        LEVEL1_IDENTIFICATION_LEN,
        identification_fields,
    )?)
}

pub fn decode_level2_identification(
    bytes: &[u8],
) -> Result<(Identification, OptionalFeatures), DecodeError> {
    let (fields, option_bits) = parse_fixed(
        bytes,
        "level 2 identification",
        LEVEL2_IDENTIFICATION_LEN,
        tuple((identification_fields, be_u32)),
    )?;
    Ok((identification(fields)?, OptionalFeatures::from_bits(option_bits)))
}

pub fn decode_recycler_setup(bytes: &[u8]) -> Result<RecyclerSetup, DecodeError> {
    ensure_len(bytes, "recycler setup", RECYCLER_SETUP_LEN)?;
    Ok(RecyclerSetup {
        routing: bits16(u16::from_be_bytes([bytes[0], bytes[1]])),
    })
}

pub fn decode_bill_dispense_status(bytes: &[u8]) -> Result<BillDispenseStatus, DecodeError> {
    ensure_len(bytes, "bill dispense status", BILL_DISPENSE_STATUS_LEN)?;
    Ok(BillDispenseStatus {
        dispenser_full: bits16(u16::from_be_bytes([bytes[0], bytes[1]])),
        bill_counts: words(&bytes[2..]),
    })
}

pub fn decode_payout_status(bytes: &[u8]) -> Result<PayoutStatus, DecodeError> {
    ensure_len(bytes, "payout status", PAYOUT_STATUS_LEN)?;
    Ok(PayoutStatus {
        dispensed: words(bytes),
    })
}

pub fn decode_payout_value_poll(bytes: &[u8]) -> Result<u16, DecodeError> {
    ensure_len(bytes, "payout value poll", PAYOUT_VALUE_POLL_LEN)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}
