use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// Identifies an attached device.  Identifiers are never reused
/// while the device manager exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DeviceId(pub(crate) usize);

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "device#{}", self.0)
    }
}

/// Failures in setting up the machine or its devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Equipment address 0 is reserved, and addresses are 4 bits.
    InvalidEquipmentAddress(u8),
    InvalidStation(u8),
    InvalidChannel(u8),
    EquipmentInUse {
        equipment: u8,
        station: Option<u8>,
        occupant: String,
    },
    ChannelInUse {
        channel: u8,
        occupant: String,
    },
    NoSuchDevice(DeviceId),
    /// The combination of options cannot be configured.
    IncompatibleOptions(String),
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ConfigurationError::InvalidEquipmentAddress(e) => {
                write!(f, "{e} is not a valid equipment address")
            }
            ConfigurationError::InvalidStation(s) => write!(f, "{s} is not a valid station"),
            ConfigurationError::InvalidChannel(c) => {
                write!(f, "{c} is not a valid buffered data channel")
            }
            ConfigurationError::EquipmentInUse {
                equipment,
                station: Some(station),
                occupant,
            } => write!(
                f,
                "equipment address {equipment} station {station} is already used by {occupant}"
            ),
            ConfigurationError::EquipmentInUse {
                equipment,
                station: None,
                occupant,
            } => write!(
                f,
                "equipment address {equipment} is already used by {occupant}"
            ),
            ConfigurationError::ChannelInUse { channel, occupant } => {
                write!(f, "channel {channel} is already used by {occupant}")
            }
            ConfigurationError::NoSuchDevice(id) => write!(f, "{id} is not attached"),
            ConfigurationError::IncompatibleOptions(msg) => f.write_str(msg),
        }
    }
}

impl Error for ConfigurationError {}
