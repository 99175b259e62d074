//! Bill validator peripheral, driven through reset, setup, enable and polling.
//!
//! [`BillValidator::prepare`] only resets the validator. The validator
//! announces the completed reset in a later POLL answer, which triggers the
//! setup and enable sequences. The same happens whenever the validator resets
//! on its own.
//!
//! The sequences are explicit [`State`]s, so a failing sequence leaves the
//! validator in the state of the command that failed.

use arrayvec::ArrayVec;
use log::{debug, info, warn};
use snafu::ResultExt;

use crate::mdb::bill_validator::{
    decode_bill_dispense_status, decode_level1_identification, decode_level2_identification,
    decode_payout_status, decode_payout_value_poll, decode_recycler_setup, decode_setup,
    decode_stacker, BillDispenseStatus, Command, Expansion, Identification, OptionalFeatures,
    PayoutStatus, RecyclerSetup, Setup, Stacker, ROUTE_TO_RECYCLER,
};
use crate::mdb::{decode_poll, BillRouting, DecodeError, PollEvent, ValidatorEvent};
use crate::message::Answer;
use crate::peripheral::{Bus, DecodeSnafu, Error, Peripheral, ProtocolSnafu, TransactionSnafu};
use crate::types::BillType;

/// What to do with a bill waiting in escrow.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EscrowPolicy {
    Accept,
    Return,
}

/// Masks and routing sent during the setup and enable sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub escrow_policy: EscrowPolicy,
    /// Bill types accepted, bit 0 is bill type 0.
    pub bill_enable: u16,
    /// Bill types held in escrow before stacking.
    pub escrow_enable: u16,
    /// Bill types checked with high security.
    pub security: u16,
    /// Routing per bill type when recycling is supported.
    pub recycler_routing: [u8; 16],
    pub manual_dispense_enable: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            escrow_policy: EscrowPolicy::Return,
            bill_enable: 0xFFFF,
            escrow_enable: 0xFFFF,
            security: 0xFFFF,
            recycler_routing: [ROUTE_TO_RECYCLER; 16],
            manual_dispense_enable: 0x0000,
        }
    }
}

/// Everything learned about the validator since its last reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillValidatorStatus {
    pub setup: Option<Setup>,
    pub identification: Option<Identification>,
    pub optional_features: Option<OptionalFeatures>,
    pub stacker: Option<Stacker>,
    pub recycler_setup: Option<RecyclerSetup>,
    pub dispense_status: Option<BillDispenseStatus>,
}

impl BillValidatorStatus {
    pub fn bill_recycling(&self) -> bool {
        self.optional_features
            .map_or(false, |features| features.bill_recycling)
    }

    /// Value of a bill type in the smallest currency unit, if known and non-zero.
    pub fn bill_value(&self, bill_type: BillType) -> Option<u32> {
        let setup = self.setup.as_ref()?;
        let credit = u32::from(setup.bill_type_credit[usize::from(*bill_type)]);
        Some(credit * u32::from(setup.scaling_factor)).filter(|value| *value != 0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SetupStep {
    Setup,
    Security,
    Identification,
    IdentificationWithOptionBits,
    FeatureEnable,
    RecyclerSetup,
    RecyclerEnable,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EnableStep {
    Stacker,
    BillType,
    BillDispenseStatus,
}

/// Lifecycle of the validator. `Setup` and `Enable` name the next command
/// of the sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    /// RESET was acknowledged, waiting for the validator to report it.
    ResetPending,
    /// RESET wasn't answered.
    Absent,
    Setup(SetupStep),
    Enable(EnableStep),
    Polling,
}

pub struct BillValidator {
    config: Config,
    status: BillValidatorStatus,
    state: State,
}

impl BillValidator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            status: BillValidatorStatus::default(),
            state: State::Uninitialized,
        }
    }

    pub fn status(&self) -> &BillValidatorStatus {
        &self.status
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the setup and enable sequences, then continue in `Polling`.
    ///
    /// Any command failing is fatal. The state is left at the failed step.
    pub fn initialize(&mut self, bus: &mut dyn Bus) -> Result<(), Error> {
        self.state = State::Setup(SetupStep::Setup);
        loop {
            self.state = match self.state {
                State::Setup(step) => self.setup_step(bus, step)?,
                State::Enable(step) => self.enable_step(bus, step)?,
                _ => break,
            };
            debug!("Bill validator state {:?}", self.state);
        }
        debug!("Bill validator initialized: {:?}", self.status);
        Ok(())
    }

    fn setup_step(&mut self, bus: &mut dyn Bus, step: SetupStep) -> Result<State, Error> {
        Ok(match step {
            SetupStep::Setup => {
                self.status.setup = Some(query(bus, &Command::Setup, decode_setup)?);
                State::Setup(SetupStep::Security)
            }
            SetupStep::Security => {
                let command = Command::Security {
                    bill_types: self.config.security,
                };
                acknowledge(bus, &command)?;
                State::Setup(SetupStep::Identification)
            }
            SetupStep::Identification => {
                let command = Command::Expansion(Expansion::Identification);
                self.status.identification =
                    Some(query(bus, &command, decode_level1_identification)?);
                State::Setup(SetupStep::IdentificationWithOptionBits)
            }
            SetupStep::IdentificationWithOptionBits => {
                let command = Command::Expansion(Expansion::IdentificationWithOptionBits);
                let (identification, features) =
                    query(bus, &command, decode_level2_identification)?;
                self.status.identification = Some(identification);
                self.status.optional_features = Some(features);
                State::Setup(SetupStep::FeatureEnable)
            }
            SetupStep::FeatureEnable => {
                let features = OptionalFeatures {
                    bill_recycling: self.status.bill_recycling(),
                    ..Default::default()
                }
                .bits();
                acknowledge(
                    bus,
                    &Command::Expansion(Expansion::FeatureEnable { features }),
                )?;
                if self.status.bill_recycling() {
                    State::Setup(SetupStep::RecyclerSetup)
                } else {
                    State::Enable(EnableStep::Stacker)
                }
            }
            SetupStep::RecyclerSetup => {
                let command = Command::Expansion(Expansion::RecyclerSetup);
                self.status.recycler_setup = Some(query(bus, &command, decode_recycler_setup)?);
                State::Setup(SetupStep::RecyclerEnable)
            }
            SetupStep::RecyclerEnable => {
                let command = Command::Expansion(Expansion::RecyclerEnable {
                    manual_dispense_enable: self.config.manual_dispense_enable,
                    routing: self.config.recycler_routing,
                });
                acknowledge(bus, &command)?;
                State::Enable(EnableStep::Stacker)
            }
        })
    }

    fn enable_step(&mut self, bus: &mut dyn Bus, step: EnableStep) -> Result<State, Error> {
        Ok(match step {
            EnableStep::Stacker => {
                self.status.stacker = Some(query(bus, &Command::Stacker, decode_stacker)?);
                State::Enable(EnableStep::BillType)
            }
            EnableStep::BillType => {
                let command = Command::BillType {
                    enable: self.config.bill_enable,
                    escrow_enable: self.config.escrow_enable,
                };
                acknowledge(bus, &command)?;
                if self.status.bill_recycling() {
                    State::Enable(EnableStep::BillDispenseStatus)
                } else {
                    State::Polling
                }
            }
            EnableStep::BillDispenseStatus => {
                self.bill_dispense_status(bus)?;
                State::Polling
            }
        })
    }

    fn handle_event(&mut self, bus: &mut dyn Bus, event: PollEvent) -> Result<(), Error> {
        match event {
            PollEvent::Validator(ValidatorEvent::ValidatorWasReset) => {
                info!("Bill validator was reset");
                self.status = BillValidatorStatus::default();
                self.initialize(bus)
            }
            PollEvent::Validator(ValidatorEvent::ValidatorBusy) => Ok(()),
            PollEvent::BillsAccepted {
                routing: BillRouting::EscrowPosition,
                bill_type,
            } => self.escrow(bus, bill_type),
            event => {
                info!("Bill validator event {:?}", event);
                Ok(())
            }
        }
    }

    fn escrow(&mut self, bus: &mut dyn Bus, bill_type: BillType) -> Result<(), Error> {
        match self.status.bill_value(bill_type) {
            Some(value) => info!("Inserted bill of type {}, value {}", bill_type, value),
            None => info!("Inserted bill of type {}", bill_type),
        }
        let accept = self.config.escrow_policy == EscrowPolicy::Accept;
        let done = confirm(bus, &Command::Escrow { accept })?;
        match (accept, done) {
            (true, true) => info!("Accepted"),
            (true, false) => warn!("Failed to accept"),
            (false, true) => info!("Returned"),
            (false, false) => warn!("Failed to return"),
        }
        Ok(())
    }

    /// Query the dispenser fill state and bill counts of a recycler.
    pub fn bill_dispense_status(&mut self, bus: &mut dyn Bus) -> Result<BillDispenseStatus, Error> {
        let command = Command::Expansion(Expansion::BillDispenseStatus);
        let status = query(bus, &command, decode_bill_dispense_status)?;
        self.status.dispense_status = Some(status);
        Ok(status)
    }

    /// Pay out `count` bills of `bill_type` from the recycler.
    pub fn dispense_bill(
        &mut self,
        bus: &mut dyn Bus,
        bill_type: BillType,
        count: u16,
    ) -> Result<bool, Error> {
        confirm(
            bus,
            &Command::Expansion(Expansion::DispenseBill { bill_type, count }),
        )
    }

    /// Pay out `value` in scaled units using any bills in the recycler.
    pub fn dispense_value(&mut self, bus: &mut dyn Bus, value: u16) -> Result<bool, Error> {
        confirm(bus, &Command::Expansion(Expansion::DispenseValue { value }))
    }

    /// Bills paid out by the last dispense command, or `None` while it is busy.
    pub fn payout_status(&mut self, bus: &mut dyn Bus) -> Result<Option<PayoutStatus>, Error> {
        query_optional(
            bus,
            &Command::Expansion(Expansion::PayoutStatus),
            decode_payout_status,
        )
    }

    /// Value paid out so far, or `None` once the payout has finished.
    pub fn payout_value_poll(&mut self, bus: &mut dyn Bus) -> Result<Option<u16>, Error> {
        query_optional(
            bus,
            &Command::Expansion(Expansion::PayoutValuePoll),
            decode_payout_value_poll,
        )
    }

    pub fn payout_cancel(&mut self, bus: &mut dyn Bus) -> Result<bool, Error> {
        confirm(bus, &Command::Expansion(Expansion::PayoutCancel))
    }

    /// Send a manufacturer specific diagnostics command.
    pub fn diagnostics(
        &mut self,
        bus: &mut dyn Bus,
        data: ArrayVec<u8, 34>,
    ) -> Result<Answer, Error> {
        transact(bus, &Command::Expansion(Expansion::Diagnostics { data }))
    }
}

impl Default for BillValidator {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Peripheral for BillValidator {
    fn name(&self) -> &'static str {
        "bill validator"
    }

    fn prepare(&mut self, bus: &mut dyn Bus) -> Result<(), Error> {
        let present = match transact(bus, &Command::Reset) {
            Ok(Answer::Ack) => true,
            Ok(Answer::Nack) => false,
            Ok(answer) => {
                return ProtocolSnafu {
                    command: "RESET",
                    answer,
                }
                .fail()
            }
            Err(err) if err.is_timeout() => false,
            Err(err) => return Err(err),
        };
        info!("Has bill validator: {}", present);
        self.state = if present {
            State::ResetPending
        } else {
            State::Absent
        };
        Ok(())
    }

    fn tick(&mut self, bus: &mut dyn Bus) -> Result<bool, Error> {
        let events = match transact(bus, &Command::Poll) {
            Ok(Answer::Data(bytes)) => decode_poll(&bytes).context(DecodeSnafu { command: "POLL" })?,
            Ok(Answer::Ack) => return Ok(true),
            Ok(Answer::Nack) => {
                debug!("Bill validator didn't answer POLL");
                return Ok(false);
            }
            Err(err) if err.is_timeout() => {
                warn!("Bill validator POLL timed out");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        for event in events {
            self.handle_event(bus, event)?;
        }
        Ok(true)
    }
}

fn transact(bus: &mut dyn Bus, command: &Command) -> Result<Answer, Error> {
    let frame = command.encode();
    debug!(
        "{} {:02X} {:02X?}",
        command.name(),
        frame.command,
        frame.data.as_slice()
    );
    bus.transceive(frame.command, &frame.data)
        .context(TransactionSnafu {
            command: command.name(),
        })
}

/// Send a command that must be answered with data.
fn query<T>(
    bus: &mut dyn Bus,
    command: &Command,
    decode: impl FnOnce(&[u8]) -> Result<T, DecodeError>,
) -> Result<T, Error> {
    match transact(bus, command)? {
        Answer::Data(bytes) => decode(&bytes).context(DecodeSnafu {
            command: command.name(),
        }),
        answer => ProtocolSnafu {
            command: command.name(),
            answer,
        }
        .fail(),
    }
}

/// Like [`query`], but a plain ACK is a valid answer without data.
fn query_optional<T>(
    bus: &mut dyn Bus,
    command: &Command,
    decode: impl FnOnce(&[u8]) -> Result<T, DecodeError>,
) -> Result<Option<T>, Error> {
    match transact(bus, command)? {
        Answer::Ack => Ok(None),
        Answer::Data(bytes) => decode(&bytes).map(Some).context(DecodeSnafu {
            command: command.name(),
        }),
        answer => ProtocolSnafu {
            command: command.name(),
            answer,
        }
        .fail(),
    }
}

/// Send a command answered by ACK or NACK.
fn confirm(bus: &mut dyn Bus, command: &Command) -> Result<bool, Error> {
    match transact(bus, command)? {
        Answer::Ack => Ok(true),
        Answer::Nack => Ok(false),
        answer => ProtocolSnafu {
            command: command.name(),
            answer,
        }
        .fail(),
    }
}

/// Send a command that must be acknowledged.
fn acknowledge(bus: &mut dyn Bus, command: &Command) -> Result<(), Error> {
    match transact(bus, command)? {
        Answer::Ack => Ok(()),
        answer => ProtocolSnafu {
            command: command.name(),
            answer,
        }
        .fail(),
    }
}
