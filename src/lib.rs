//! MDB master controller for vending machine peripherals.
//!
//! This crate drives an MDB interface adapter (Qibixx MDB-USB style) over a
//! serial line. The adapter speaks a line based ASCII protocol; in generic
//! master mode it forwards raw MDB commands to the peripherals on the bus and
//! returns their answers as hex.
//!
//! The crate is layered:
//! * [`mdb`] encodes peripheral commands and decodes their binary answers.
//! * [`Channel`] matches command lines to their response lines.
//! * [`Device`] knows the adapter level command sequences.
//! * [`BillValidator`] is a [`Peripheral`] state machine.
//! * [`Vmc`] prepares and polls the attached peripherals.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use mdb_master::{BillValidator, Device, Vmc};
//! # fn open_serial_port() -> std::io::Cursor<Vec<u8>> { std::io::Cursor::new(Vec::new()) }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut vmc = Vmc::new(Device::new(open_serial_port()));
//! vmc.attach(Box::new(BillValidator::default()));
//! vmc.prepare()?;
//! vmc.run(Duration::from_millis(100));
//! # Ok(()) }
//! ```

mod buffer;
mod nom_parser;

pub mod bill_validator;
pub mod channel;
pub mod device;
pub mod mdb;
pub mod message;
pub mod peripheral;
pub mod types;
pub mod vmc;

pub use bill_validator::{BillValidator, BillValidatorStatus, EscrowPolicy};
pub use channel::Channel;
pub use device::Device;
pub use mdb::DecodeError;
pub use message::{Answer, RequestMessage, ResponseMessage, ResponseTag};
pub use peripheral::{Bus, Peripheral};
pub use types::{addr, Address, BillType, Version};
pub use vmc::Vmc;
