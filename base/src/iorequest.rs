//! Layout of the Q register during I/O instructions.
//!
//! | Channel W | Equipment E | Station S | Command  |
//! |-----------|-------------|-----------|----------|
//! | 15-11     | 10-7        | 6-4       | 3-0      |
//!
//! A non-zero channel field routes the request through one of the
//! buffered data channels (numbered 1 to 3).  Equipment address 1
//! is shared by up to five stations selected by the S field; for
//! other equipment addresses the S field is part of the command.
//!
//! Bit 0 of the command selects the director/status register of the
//! device; when it is clear the data register is selected.

use std::fmt::{self, Display, Formatter};

/// The equipment address multiplexed by the station field.
pub const STATION_EQUIPMENT: u8 = 1;
/// Number of stations on the multiplexed equipment address.
pub const STATIONS: u8 = 5;
/// Number of buffered data channels.
pub const CHANNELS: u8 = 3;

/// Whether the instruction was INP or OUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// An I/O request decoded from the Q register.  The request is never
/// modified once decoded; `command` holds the bits not consumed by
/// routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoRequest {
    raw: u16,
    pub direction: Direction,
    pub channel: u8,
    pub equipment: u8,
    /// The station, for requests to the multiplexed equipment address.
    pub station: Option<u8>,
    /// Remaining bits, after removal of the routing fields.
    pub command: u16,
}

impl IoRequest {
    #[must_use]
    pub fn decode(q: u16, direction: Direction) -> IoRequest {
        let channel = ((q >> 11) & 0x1F) as u8;
        let equipment = ((q >> 7) & 0xF) as u8;
        let (station, command) = if equipment == STATION_EQUIPMENT {
            (Some(((q >> 4) & 0x7) as u8), q & 0x000F)
        } else {
            (None, q & 0x007F)
        };
        IoRequest {
            raw: q,
            direction,
            channel,
            equipment,
            station,
            command,
        }
    }

    /// Build the Q register contents addressing a device.
    #[must_use]
    pub fn encode(channel: u8, equipment: u8, station: u8, command: u16) -> u16 {
        (u16::from(channel & 0x1F) << 11)
            | (u16::from(equipment & 0xF) << 7)
            | (u16::from(station & 0x7) << 4)
            | (command & 0xF)
    }

    /// The Q register value this request was decoded from.
    #[must_use]
    pub fn raw(&self) -> u16 {
        self.raw
    }

    #[must_use]
    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }

    /// True when the director/status register is selected.
    #[must_use]
    pub fn selects_director(&self) -> bool {
        self.command & 1 != 0
    }

    /// Status reads are permitted even where protection would
    /// otherwise forbid access.
    #[must_use]
    pub fn is_status_read(&self) -> bool {
        self.direction == Direction::Input && self.selects_director()
    }

    #[must_use]
    pub fn via_channel(&self) -> bool {
        self.channel != 0
    }
}

impl Display for IoRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let dir = match self.direction {
            Direction::Input => "in",
            Direction::Output => "out",
        };
        write!(f, "{dir} W={} E={}", self.channel, self.equipment)?;
        if let Some(s) = self.station {
            write!(f, " S={s}")?;
        }
        write!(f, " cmd={:#04X}", self.command)
    }
}

#[test]
fn test_decode_plain_equipment() {
    let q = IoRequest::encode(0, 6, 0, 1);
    assert_eq!(q, 0x0301);
    let req = IoRequest::decode(q, Direction::Input);
    assert_eq!(req.channel, 0);
    assert_eq!(req.equipment, 6);
    assert_eq!(req.station, None);
    assert!(req.is_status_read());
    assert!(!req.via_channel());
}

#[test]
fn test_decode_station() {
    let req = IoRequest::decode(IoRequest::encode(0, 1, 3, 0), Direction::Output);
    assert_eq!(req.equipment, 1);
    assert_eq!(req.station, Some(3));
    assert_eq!(req.command, 0);
    assert!(req.is_output());
    assert!(!req.is_status_read());
}

#[test]
fn test_decode_channel() {
    let req = IoRequest::decode(IoRequest::encode(2, 9, 0, 0), Direction::Input);
    assert_eq!(req.channel, 2);
    assert_eq!(req.equipment, 9);
    assert!(req.via_channel());
    assert_eq!(req.to_string(), "in W=2 E=9 cmd=0x00");
}
