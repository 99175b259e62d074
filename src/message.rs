//! Typed requests to, and responses from, the MDB interface adapter.
//!
//! Requests render to a single ASCII command line, e.g. `R,33` or `M,1`.
//! Responses are parsed from lines of the form `<tag>,<field>,...`, and each
//! request knows the [`ResponseTag`] of the line that answers it.

use core::fmt;
use core::str::FromStr;

use snafu::Snafu;

use crate::nom_parser::parse_response;
use crate::types::Version;

/// Error type for inbound lines that can't be decoded
#[derive(Debug, Snafu, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The line starts with a tag this crate doesn't know.
    #[snafu(display("Unknown response tag {tag:?}"))]
    UnknownTag { tag: String },
    /// The tag is known, but the fields don't match its format.
    #[snafu(display("Malformed response line {line:?}"))]
    Malformed { line: String },
}

/// Relay outputs of the adapter (MDB-USB Plus only).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RelayState {
    Off = 0,
    Relay1 = 1,
    Relay2 = 2,
    Both = 3,
}

/// Operating mode of the adapter's cashless master.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CashlessMasterMode {
    Disabled = 0,
    /// Vending sessions are started by the cashless peripheral.
    AuthorizeFirst = 1,
    /// Vending sessions are started by a credit request from the master.
    AlwaysIdle = 2,
}

/// A command for the MDB interface adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RequestMessage {
    SoftwareVersion,
    HardwareVersion,
    /// Reboot into the bootloader. No answer is sent.
    UpdateFirmware,
    /// Reboot the adapter. No answer is sent.
    Reset,
    /// Revert to the default configuration.
    Revert,
    SetLicenseCode { code: String },
    ModifyRelayState(RelayState),
    SetMdbSniffing { enabled: bool },
    /// Set the RS232 baudrate, 0 disables the serial port.
    SetRs232Baudrate { baudrate: u32 },
    /// Time the adapter waits for a peripheral answer in master mode, 10..=1000 ms.
    SetResponseTimeout { timeout_ms: u16 },
    DisableCashlessSlave,
    SetCashlessSlaveParameter { parameter: String, value: String },
    SetCashlessMasterParameter { parameter: String, value: String },
    SetCashlessMaster(CashlessMasterMode),
    StartPollingCashlessReader,
    RequestCashlessCredit { amount: u32, product: u32 },
    CancelCashlessVendingRequest,
    /// The product id is only sent to adapters running software 3.8 or newer.
    EndCashlessTransaction { adapter_version: Version, product: u32 },
    RevertCashlessTransaction,
    CashlessMasterStatus,
    SetGenericMaster { enabled: bool },
    /// Send a raw MDB command byte with optional data to a peripheral.
    CommandGroup { command: u8, data: Vec<u8> },
    /// Issue a bus reset condition. No answer is sent.
    BusReset,
}

impl RequestMessage {
    /// The tag of the response line answering this request, or `None` for
    /// requests the adapter never answers.
    pub fn expected_tag(&self) -> Option<ResponseTag> {
        use RequestMessage::*;
        Some(match self {
            UpdateFirmware | Reset | BusReset => return None,
            SoftwareVersion => ResponseTag::SoftwareVersion,
            HardwareVersion => ResponseTag::HardwareVersion,
            Revert | SetLicenseCode { .. } | SetRs232Baudrate { .. } | SetResponseTimeout { .. } => {
                ResponseTag::Configuration
            }
            ModifyRelayState(_) => ResponseTag::Relay,
            SetMdbSniffing { .. } => ResponseTag::Sniff,
            DisableCashlessSlave | SetCashlessSlaveParameter { .. } => ResponseTag::CashlessSlave,
            SetCashlessMasterParameter { .. }
            | SetCashlessMaster(_)
            | StartPollingCashlessReader
            | RequestCashlessCredit { .. }
            | CancelCashlessVendingRequest
            | EndCashlessTransaction { .. }
            | RevertCashlessTransaction
            | CashlessMasterStatus => ResponseTag::CashlessMaster,
            SetGenericMaster { .. } => ResponseTag::GenericMaster,
            CommandGroup { .. } => ResponseTag::CommandGroup,
        })
    }

    /// The on-wire command line, including the line terminator.
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for RequestMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use RequestMessage::*;
        match self {
            SoftwareVersion => f.write_str("V"),
            HardwareVersion => f.write_str("H"),
            UpdateFirmware => f.write_str("F,UPDATE"),
            Reset => f.write_str("F,RESET"),
            Revert => f.write_str("F,REVERT"),
            SetLicenseCode { code } => write!(f, "F,SET,{}", code),
            ModifyRelayState(state) => write!(f, "L,{}", *state as u8),
            SetMdbSniffing { enabled } => write!(f, "X,{}", u8::from(*enabled)),
            SetRs232Baudrate { baudrate } => write!(f, "F,SERIAL,{}", baudrate),
            SetResponseTimeout { timeout_ms } => write!(f, "F,RESPTIMEOUT,{}", timeout_ms),
            DisableCashlessSlave => f.write_str("C,0"),
            SetCashlessSlaveParameter { parameter, value } => {
                write!(f, "C,SETCONF,{}={}", parameter, value)
            }
            SetCashlessMasterParameter { parameter, value } => {
                write!(f, "D,SETCONF,{}={}", parameter, value)
            }
            SetCashlessMaster(mode) => write!(f, "D,{}", *mode as u8),
            StartPollingCashlessReader => f.write_str("D,READER,1"),
            RequestCashlessCredit { amount, product } => write!(f, "D,REQ,{},{}", amount, product),
            CancelCashlessVendingRequest => f.write_str("D,REQ,-1"),
            EndCashlessTransaction {
                adapter_version,
                product,
            } => {
                if adapter_version.at_least(3, 8) {
                    write!(f, "D,END,{}", product)
                } else {
                    f.write_str("D,END")
                }
            }
            RevertCashlessTransaction => f.write_str("D,END,-1"),
            CashlessMasterStatus => f.write_str("D,STATUS"),
            SetGenericMaster { enabled } => write!(f, "M,{}", u8::from(*enabled)),
            CommandGroup { command, data } => {
                write!(f, "R,{:02X}", command)?;
                if !data.is_empty() {
                    f.write_str(",")?;
                    for byte in data {
                        write!(f, "{:02X}", byte)?;
                    }
                }
                Ok(())
            }
            BusReset => f.write_str("R,RESET"),
        }
    }
}

/// Tag character that starts each response line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResponseTag {
    SoftwareVersion,
    HardwareVersion,
    Configuration,
    Relay,
    Sniff,
    CashlessSlave,
    CashlessMaster,
    GenericMaster,
    CommandGroup,
}

impl ResponseTag {
    pub const fn as_char(self) -> char {
        match self {
            Self::SoftwareVersion => 'v',
            Self::HardwareVersion => 'h',
            Self::Configuration => 'f',
            Self::Relay => 'l',
            Self::Sniff => 'x',
            Self::CashlessSlave => 'c',
            Self::CashlessMaster => 'd',
            Self::GenericMaster => 'm',
            Self::CommandGroup => 'p',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'v' => Self::SoftwareVersion,
            'h' => Self::HardwareVersion,
            'f' => Self::Configuration,
            'l' => Self::Relay,
            'x' => Self::Sniff,
            'c' => Self::CashlessSlave,
            'd' => Self::CashlessMaster,
            'm' => Self::GenericMaster,
            'p' => Self::CommandGroup,
            _ => return None,
        })
    }
}

impl fmt::Display for ResponseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Result of a generic master command group transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// The peripheral acknowledged the command without data.
    Ack,
    /// The peripheral didn't answer the command.
    Nack,
    /// The peripheral answered with data.
    Data(Vec<u8>),
}

/// Line sent by the adapter while bus sniffing is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SniffFrame {
    Ack,
    Frame(Vec<String>),
}

/// A decoded adapter response line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResponseMessage {
    SoftwareVersion { version: Version, cpu_id: String },
    HardwareVersion { version: Version, capabilities: String },
    Configuration { success: bool },
    Relay { success: bool },
    Sniff(SniffFrame),
    CashlessSlave { fields: Vec<String> },
    CashlessMaster { fields: Vec<String> },
    GenericMaster { success: bool },
    CommandGroup(Answer),
}

impl ResponseMessage {
    pub fn tag(&self) -> ResponseTag {
        match self {
            Self::SoftwareVersion { .. } => ResponseTag::SoftwareVersion,
            Self::HardwareVersion { .. } => ResponseTag::HardwareVersion,
            Self::Configuration { .. } => ResponseTag::Configuration,
            Self::Relay { .. } => ResponseTag::Relay,
            Self::Sniff(_) => ResponseTag::Sniff,
            Self::CashlessSlave { .. } => ResponseTag::CashlessSlave,
            Self::CashlessMaster { .. } => ResponseTag::CashlessMaster,
            Self::GenericMaster { .. } => ResponseTag::GenericMaster,
            Self::CommandGroup(_) => ResponseTag::CommandGroup,
        }
    }
}

impl FromStr for ResponseMessage {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_response(s)
    }
}
