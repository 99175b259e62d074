//! This module defines range-checked types for MDB peripheral addresses,
//! bill types and adapter versions, meant to simplify correct usage of the API.

use snafu::{ensure, OptionExt, Snafu};

use core::convert::{TryFrom, TryInto};
use core::fmt;
use core::ops::Deref;
use core::str::FromStr;

/// Error type for this module
#[derive(Debug, Snafu, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The value isn't a valid MDB peripheral address.
    #[snafu(display("Invalid address"))]
    InvalidAddress,
    /// The value isn't a valid bill type index.
    #[snafu(display("Invalid bill type"))]
    InvalidBillType,
    /// The string isn't a dot separated version number.
    #[snafu(display("Invalid version {text:?}"))]
    InvalidVersion { text: String },
}

const fn invalid_address() -> InvalidAddressSnafu {
    InvalidAddressSnafu
}

const fn invalid_bill_type() -> InvalidBillTypeSnafu {
    InvalidBillTypeSnafu
}

/// Address is an MDB peripheral address, the upper five bits of the address byte.
///
/// The lower three bits of the byte on the wire select the command, so a valid
/// address is a non-zero multiple of 8.
///
/// ## Example
/// ```
/// use mdb_master::Address;
/// let bill_validator = Address::new(0x30).unwrap();
/// assert_eq!(bill_validator.command(3), 0x33);
/// assert!(Address::new(0x31).is_err());
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct Address(u8);

/// Create a new [`Address`], panics if it is out of range.
pub const fn addr(a: u8) -> Address {
    if a != 0 && a & 0x07 == 0 {
        return Address(a);
    }
    panic!("Invalid address.")
}

impl Address {
    /// Create a new address, checking that it is a non-zero multiple of 8.
    /// # Errors
    /// Returns [`Error::InvalidAddress`] if `address` is out of range.
    pub fn new(address: impl TryInto<u8>) -> Result<Self, Error> {
        let address = address.try_into().ok().with_context(invalid_address)?;
        ensure!(address != 0 && address & 0x07 == 0, invalid_address());
        Ok(Self(address))
    }

    /// The command byte for the command with the given offset, 0..=7.
    pub const fn command(self, offset: u8) -> u8 {
        self.0 | (offset & 0x07)
    }
}

impl Deref for Address {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}


/// `BillType` is a range-checked \[0, 15\] index into the bill type credit table.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct BillType(u8);

impl BillType {
    /// Create a new `BillType`, checking that it is in the range [0, 15].
    /// # Errors
    /// Returns [`Error::InvalidBillType`] if `bill_type` is out of range.
    pub fn new(bill_type: impl TryInto<u8>) -> Result<Self, Error> {
        let bill_type = bill_type.try_into().ok().with_context(invalid_bill_type)?;
        ensure!(bill_type <= 15, invalid_bill_type());
        Ok(Self(bill_type))
    }

    /// Take the low nibble of a byte as bill type.
    pub(crate) const fn from_nibble(byte: u8) -> Self {
        Self(byte & 0x0F)
    }
}

impl Deref for BillType {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<u8> for BillType {
    fn eq(&self, other: &u8) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for BillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Version reported by the MDB adapter, `major.minor.patch.build`.
///
/// Components missing from the wire representation are zero, so `"1.2"` parses
/// as 1.2.0.0.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }

    /// True if this version is `major.minor` or newer.
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl FromStr for Version {
    type Err = Error;

    /// This is meant to be used for parsing the on-wire format
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidVersionSnafu { text: s }.build();
        let mut parts = [0u32; 4];
        let mut count = 0;
        for part in s.split('.') {
            let slot = parts.get_mut(count).ok_or_else(invalid)?;
            ensure!(
                !part.is_empty() && part.bytes().all(|c| c.is_ascii_digit()),
                InvalidVersionSnafu { text: s }
            );
            *slot = part.parse().map_err(|_| invalid())?;
            count += 1;
        }
        let [major, minor, patch, build] = parts;
        Ok(Self::new(major, minor, patch, build))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bill_type() {
        assert_eq!(BillType::new(15).unwrap(), 15);
        assert!(BillType::new(16).is_err());
        assert!(BillType::new(-1).is_err());
        assert_eq!(BillType::from_nibble(0x93), 3);
    }

    #[test]
    fn test_version() {
        assert_eq!("3.8.0.1".parse(), Ok(Version::new(3, 8, 0, 1)));
        assert_eq!("1.2".parse(), Ok(Version::new(1, 2, 0, 0)));
        assert!("1.2.3.4.5".parse::<Version>().is_err());
        assert!("1..2".parse::<Version>().is_err());
        assert!("a.b".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());

        let v: Version = "3.7.9.9".parse().unwrap();
        assert!(!v.at_least(3, 8));
        assert!(v.at_least(3, 7));
        assert_eq!(v.to_string(), "3.7.9.9");
    }
}
