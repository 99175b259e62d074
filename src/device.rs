//! The MDB interface adapter, as seen from the host.
//!
//! [`Device`] wraps a [`Channel`] and knows the adapter level command
//! sequences: version queries, rebooting the adapter, and switching the
//! generic master mode, which needs a bus reset and a settle time before
//! peripherals can be addressed.

use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use snafu::{ResultExt, Snafu};

use crate::channel::{self, Channel};
use crate::message::{Answer, RequestMessage, ResponseMessage, ResponseTag};
use crate::peripheral::Bus;
use crate::types::Version;

/// Error type for adapter commands
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Adapter transaction failed"))]
    Channel { source: channel::Error },
    /// The channel returned a response of another kind than requested.
    #[snafu(display("Expected a '{expected}' response, got '{actual}'"))]
    UnexpectedResponse {
        expected: ResponseTag,
        actual: ResponseTag,
    },
}

impl Error {
    /// True if the adapter didn't answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Channel { source } if source.is_timeout())
    }
}

fn unexpected(expected: ResponseTag, response: &ResponseMessage) -> Error {
    UnexpectedResponseSnafu {
        expected,
        actual: response.tag(),
    }
    .build()
}

/// Timing configuration of a [`Device`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    /// Time to wait for the answer to an adapter command.
    pub timeout: Duration,
    /// Wait after a bus reset, t(break) plus t(setup).
    pub bus_reset_settle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: channel::DEFAULT_TIMEOUT,
            bus_reset_settle: Duration::from_millis(100 + 200),
        }
    }
}

/// Software and hardware versions reported by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versions {
    pub software: Version,
    pub cpu_id: String,
    pub hardware: Version,
    pub capabilities: String,
}

/// An MDB interface adapter connected through `IO`.
pub struct Device<IO> {
    channel: Channel<IO>,
    config: Config,
    versions: Option<Versions>,
}

impl<IO> Device<IO>
where
    IO: Read + Write,
{
    pub fn new(io: IO) -> Self {
        Self::with_config(io, Config::default())
    }

    pub fn with_config(io: IO, config: Config) -> Self {
        Self {
            channel: Channel::with_timeout(io, config.timeout),
            config,
            versions: None,
        }
    }

    /// Query and cache the adapter versions.
    pub fn connect(&mut self) -> Result<&Versions, Error> {
        let (software, cpu_id) = match self.request(&RequestMessage::SoftwareVersion)? {
            ResponseMessage::SoftwareVersion { version, cpu_id } => (version, cpu_id),
            other => return Err(unexpected(ResponseTag::SoftwareVersion, &other)),
        };
        let (hardware, capabilities) = match self.request(&RequestMessage::HardwareVersion)? {
            ResponseMessage::HardwareVersion {
                version,
                capabilities,
            } => (version, capabilities),
            other => return Err(unexpected(ResponseTag::HardwareVersion, &other)),
        };
        info!(
            "Connected to adapter, software {} hardware {}",
            software, hardware
        );
        Ok(&*self.versions.insert(Versions {
            software,
            cpu_id,
            hardware,
            capabilities,
        }))
    }

    /// Versions cached by the last [`connect`](Self::connect).
    pub fn versions(&self) -> Option<&Versions> {
        self.versions.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reboot the adapter.
    ///
    /// The adapter drops off the bus without answering. The transport has to be
    /// reopened before it can be used again.
    pub fn reset_adapter(&mut self) -> Result<(), Error> {
        info!("Resetting adapter");
        self.versions = None;
        self.channel.write(&RequestMessage::Reset).context(ChannelSnafu)
    }

    /// Reboot the adapter into its firmware update mode.
    pub fn update_firmware(&mut self) -> Result<(), Error> {
        info!("Rebooting adapter into firmware update mode");
        self.versions = None;
        self.channel
            .write(&RequestMessage::UpdateFirmware)
            .context(ChannelSnafu)
    }

    /// Switch the generic master mode. Returns the adapter's verdict.
    ///
    /// After a successful enable the bus is reset, and this blocks until the
    /// peripherals had time to come up.
    pub fn set_generic_master(&mut self, enabled: bool) -> Result<bool, Error> {
        let success = match self.request(&RequestMessage::SetGenericMaster { enabled })? {
            ResponseMessage::GenericMaster { success } => success,
            other => return Err(unexpected(ResponseTag::GenericMaster, &other)),
        };
        if !success {
            warn!("Adapter refused to switch generic master mode");
        } else if enabled {
            self.bus_reset()?;
        }
        Ok(success)
    }

    /// Issue a bus reset, then wait the settle time.
    pub fn bus_reset(&mut self) -> Result<(), Error> {
        debug!("Bus reset");
        self.channel
            .write(&RequestMessage::BusReset)
            .context(ChannelSnafu)?;
        thread::sleep(self.config.bus_reset_settle);
        Ok(())
    }

    /// Send an MDB command byte with data and return the peripheral's answer.
    pub fn send_generic_master(&mut self, command: u8, data: &[u8]) -> Result<Answer, Error> {
        let request = RequestMessage::CommandGroup {
            command,
            data: data.to_vec(),
        };
        match self.request(&request)? {
            ResponseMessage::CommandGroup(answer) => Ok(answer),
            other => Err(unexpected(ResponseTag::CommandGroup, &other)),
        }
    }

    /// End a cashless vending session, formatted for the connected adapter.
    pub fn end_cashless_transaction(&mut self, product: u32) -> Result<ResponseMessage, Error> {
        let adapter_version = self
            .versions
            .as_ref()
            .map(|versions| versions.software)
            .unwrap_or_default();
        self.request(&RequestMessage::EndCashlessTransaction {
            adapter_version,
            product,
        })
    }

    /// Send any request that is answered, using the configured timeout.
    pub fn request(&mut self, request: &RequestMessage) -> Result<ResponseMessage, Error> {
        self.channel
            .send_timeout(request, self.config.timeout)
            .context(ChannelSnafu)
    }

    pub fn channel_mut(&mut self) -> &mut Channel<IO> {
        &mut self.channel
    }

    pub fn into_inner(self) -> IO {
        self.channel.into_inner()
    }
}

impl<IO> Bus for Device<IO>
where
    IO: Read + Write,
{
    fn transceive(&mut self, command: u8, data: &[u8]) -> Result<Answer, Error> {
        self.send_generic_master(command, data)
    }
}
