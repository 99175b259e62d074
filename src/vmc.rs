//! The vending machine controller.
//!
//! [`Vmc`] owns the [`Device`] and the attached peripherals. Peripherals only
//! reach the bus through the `&mut dyn Bus` handed to them, so all traffic is
//! serialized through the one channel.

use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use snafu::{ensure, ResultExt, Snafu};

use crate::device::{self, Device};
use crate::message::Answer;
use crate::peripheral::Peripheral;

/// Error type for the controller
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Adapter error"))]
    Device { source: device::Error },
    /// The adapter refused to enable the generic master mode.
    #[snafu(display("Generic master mode could not be enabled"))]
    GenericMaster,
    /// Every attached peripheral failed to prepare.
    #[snafu(display("No usable peripheral"))]
    AllPeripheralsUnusable,
}

struct Slot {
    peripheral: Box<dyn Peripheral>,
    usable: bool,
}

pub struct Vmc<IO> {
    device: Device<IO>,
    peripherals: Vec<Slot>,
    prepared: bool,
}

impl<IO> Vmc<IO>
where
    IO: Read + Write,
{
    pub fn new(device: Device<IO>) -> Self {
        Self {
            device,
            peripherals: Vec::new(),
            prepared: false,
        }
    }

    /// Attach a peripheral. Peripherals are prepared and polled in attach order.
    pub fn attach(&mut self, peripheral: Box<dyn Peripheral>) {
        self.peripherals.push(Slot {
            peripheral,
            usable: true,
        });
    }

    /// Connect to the adapter, enable the generic master mode and prepare
    /// the peripherals.
    ///
    /// A peripheral failing to prepare is marked unusable, the others carry
    /// on. Once the adapter is in generic master mode, further calls are
    /// no-ops. A call that failed before that point may be retried.
    pub fn prepare(&mut self) -> Result<(), Error> {
        if self.prepared {
            warn!("Controller already prepared");
            return Ok(());
        }
        let versions = self.device.connect().context(DeviceSnafu)?;
        info!(
            "Adapter software {} ({}), hardware {} ({})",
            versions.software, versions.cpu_id, versions.hardware, versions.capabilities
        );
        let enabled = self.device.set_generic_master(true).context(DeviceSnafu)?;
        ensure!(enabled, GenericMasterSnafu);
        self.prepared = true;

        for slot in self.peripherals.iter_mut() {
            if let Err(err) = slot.peripheral.prepare(&mut self.device) {
                error!("{} is unusable: {}", slot.peripheral.name(), err);
                slot.usable = false;
            }
        }
        ensure!(
            self.peripherals.is_empty() || self.peripherals.iter().any(|slot| slot.usable),
            AllPeripheralsUnusableSnafu
        );
        Ok(())
    }

    /// Poll every usable peripheral once.
    ///
    /// Returns false if any peripheral asked to stop, or if no usable
    /// peripheral is left.
    pub fn tick(&mut self) -> bool {
        let mut keep_going = true;
        for slot in self.peripherals.iter_mut().filter(|slot| slot.usable) {
            match slot.peripheral.tick(&mut self.device) {
                Ok(true) => {}
                Ok(false) => {
                    warn!("{} terminated the loop", slot.peripheral.name());
                    keep_going = false;
                }
                Err(err) => {
                    error!("{} is unusable: {}", slot.peripheral.name(), err);
                    slot.usable = false;
                }
            }
        }
        if !self.peripherals.iter().any(|slot| slot.usable) {
            warn!("No usable peripheral left");
            return false;
        }
        keep_going
    }

    /// Call [`tick`](Self::tick) every `period` until it returns false.
    pub fn run(&mut self, period: Duration) {
        loop {
            let started = Instant::now();
            if !self.tick() {
                break;
            }
            thread::sleep(period.saturating_sub(started.elapsed()));
        }
        info!("Controller loop stopped");
    }

    /// Send a raw MDB command to a peripheral.
    pub fn transceive(&mut self, command: u8, data: &[u8]) -> Result<Answer, Error> {
        self.device
            .send_generic_master(command, data)
            .context(DeviceSnafu)
    }

    pub fn device_mut(&mut self) -> &mut Device<IO> {
        &mut self.device
    }

    /// Names of the attached peripherals and whether they are still usable.
    pub fn peripherals(&self) -> impl Iterator<Item = (&'static str, bool)> + '_ {
        self.peripherals
            .iter()
            .map(|slot| (slot.peripheral.name(), slot.usable))
    }

    /// Drop the peripherals and give back the transport.
    pub fn terminate(self) -> IO {
        info!("Terminating controller");
        self.device.into_inner()
    }
}
