//! The registers every device controller presents to the program:
//! the director function register (written by OUT with the director
//! bit of Q set) and the status register (read by INP with the
//! director bit set).
//!
//! ## Director function
//!
//! | Bit | Meaning                           |
//! |-----|-----------------------------------|
//! | 0   | Clear controller                  |
//! | 1   | Clear interrupts                  |
//! | 2   | Interrupt on data                 |
//! | 3   | Interrupt on end of operation     |
//! | 4   | Interrupt on alarm                |
//!
//! Devices may define further director bits for their own purposes.
//!
//! ## Status
//!
//! | Bit | Meaning                           |
//! |-----|-----------------------------------|
//! | 0   | Ready                             |
//! | 1   | Busy                              |
//! | 2   | Interrupt                         |
//! | 3   | Data                              |
//! | 4   | End of operation                  |
//! | 5   | Alarm                             |
//! | 6   | Lost data                         |
//! | 7   | Protected                         |
//! | 8   | Parity error                      |
use serde::Serialize;
use tracing::{event, Level};

pub const DIR_CLEAR_CONTROLLER: u16 = 0x0001;
pub const DIR_CLEAR_INTERRUPTS: u16 = 0x0002;
pub const DIR_DATA_INTERRUPT: u16 = 0x0004;
pub const DIR_EOP_INTERRUPT: u16 = 0x0008;
pub const DIR_ALARM_INTERRUPT: u16 = 0x0010;

pub const STATUS_READY: u16 = 0x0001;
pub const STATUS_BUSY: u16 = 0x0002;
pub const STATUS_INTERRUPT: u16 = 0x0004;
pub const STATUS_DATA: u16 = 0x0008;
pub const STATUS_EOP: u16 = 0x0010;
pub const STATUS_ALARM: u16 = 0x0020;
pub const STATUS_LOST_DATA: u16 = 0x0040;
pub const STATUS_PROTECTED: u16 = 0x0080;
pub const STATUS_PARITY: u16 = 0x0100;

/// The conditions which may cause an interrupt.  Each is enabled by
/// the director bit one place to the right of its status bit.
const INTERRUPT_CONDITIONS: u16 = STATUS_DATA | STATUS_EOP | STATUS_ALARM;

const STANDARD_ENABLES: u16 = DIR_DATA_INTERRUPT | DIR_EOP_INTERRUPT | DIR_ALARM_INTERRUPT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRegisters {
    /// The most recent director function.
    pub director: u16,
    pub status: u16,
    /// Director bits currently enabling interrupts.
    pub interrupt_enable: u16,
    /// Status bits cleared by the clear interrupts director function.
    pub clearable: u16,
    /// Director bits which are interrupt enables.
    pub enable_mask: u16,
    /// Interrupt enables which survive a clear controller.
    pub sticky: u16,
    /// The device is protected: unprotected instructions may read its
    /// status, nothing else.
    pub protected: bool,
    /// The device may access protected memory and protected programs.
    pub protect_override: bool,
    /// The device computes its own interrupt status; raising an
    /// external interrupt for it does not touch the status register.
    pub manages_own_status: bool,
}

impl DeviceRegisters {
    #[must_use]
    pub fn new() -> DeviceRegisters {
        DeviceRegisters {
            director: 0,
            status: STATUS_READY,
            interrupt_enable: 0,
            clearable: INTERRUPT_CONDITIONS | STATUS_LOST_DATA,
            enable_mask: STANDARD_ENABLES,
            sticky: 0,
            protected: false,
            protect_override: false,
            manages_own_status: false,
        }
    }

    /// The status word as the program sees it.
    #[must_use]
    pub fn status_word(&self, protect_switch: bool) -> u16 {
        if protect_switch && self.protected {
            self.status | STATUS_PROTECTED
        } else {
            self.status & !STATUS_PROTECTED
        }
    }

    #[must_use]
    pub fn interrupting(&self) -> bool {
        self.status & STATUS_INTERRUPT != 0
    }

    /// Process the standard bits of a director function.  Clear
    /// controller is not handled here; see
    /// [`super::Device::director_function`].
    pub fn apply_director(&mut self, value: u16) {
        if value & DIR_CLEAR_INTERRUPTS != 0 {
            self.interrupt_enable = 0;
            self.status &= !(STATUS_INTERRUPT | self.clearable);
        }
        self.interrupt_enable |= value & self.enable_mask;
        self.director = value;
        self.update_interrupt();
    }

    /// Set the interrupt status bit if an enabled condition is
    /// present.  The bit is never cleared here: device interrupts
    /// persist until the program clears them.
    pub fn update_interrupt(&mut self) {
        if self.manages_own_status {
            return;
        }
        let enabled_conditions = (self.interrupt_enable << 1) & INTERRUPT_CONDITIONS;
        if self.status & enabled_conditions != 0 {
            if !self.interrupting() {
                event!(Level::TRACE, "device status {:#06X} raises interrupt", self.status);
            }
            self.status |= STATUS_INTERRUPT;
        }
    }

    /// An operation has started; an end of operation will follow.
    pub fn io_underway_eop(&mut self) {
        self.status |= STATUS_BUSY;
        self.status &= !(STATUS_EOP | STATUS_DATA);
    }

    pub fn io_complete_eop(&mut self) {
        self.status &= !STATUS_BUSY;
        self.status |= STATUS_EOP;
        self.update_interrupt();
    }

    pub fn io_data_ready(&mut self) {
        self.status |= STATUS_DATA;
        self.update_interrupt();
    }

    pub fn io_alarm(&mut self) {
        self.status &= !STATUS_BUSY;
        self.status |= STATUS_ALARM;
        self.update_interrupt();
    }

    /// The clear controller director function.
    pub fn clear_controller(&mut self) {
        self.interrupt_enable &= self.sticky;
        self.status &= !(STATUS_BUSY | STATUS_INTERRUPT | self.clearable);
        self.director = 0;
    }

    /// Power-on reset.
    pub fn reset(&mut self) {
        self.director = 0;
        self.interrupt_enable = 0;
        self.status = STATUS_READY;
    }
}

impl Default for DeviceRegisters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_needs_enable() {
        let mut r = DeviceRegisters::new();
        r.io_data_ready();
        assert!(!r.interrupting());
        r.apply_director(DIR_DATA_INTERRUPT);
        assert!(r.interrupting());
    }

    #[test]
    fn test_interrupt_is_level_triggered() {
        let mut r = DeviceRegisters::new();
        r.apply_director(DIR_EOP_INTERRUPT);
        r.io_underway_eop();
        assert_eq!(r.status & STATUS_BUSY, STATUS_BUSY);
        r.io_complete_eop();
        assert!(r.interrupting());
        // Starting another operation does not drop the interrupt.
        r.io_underway_eop();
        assert!(r.interrupting());
        r.apply_director(DIR_CLEAR_INTERRUPTS);
        assert!(!r.interrupting());
        assert_eq!(r.interrupt_enable, 0);
    }

    #[test]
    fn test_clear_controller_keeps_sticky_enables() {
        let mut r = DeviceRegisters::new();
        r.sticky = DIR_ALARM_INTERRUPT;
        r.apply_director(DIR_ALARM_INTERRUPT | DIR_DATA_INTERRUPT);
        r.io_alarm();
        assert!(r.interrupting());
        r.clear_controller();
        assert!(!r.interrupting());
        assert_eq!(r.interrupt_enable, DIR_ALARM_INTERRUPT);
        assert_eq!(r.status & STATUS_ALARM, 0);
        assert_eq!(r.status & STATUS_READY, STATUS_READY);
    }

    #[test]
    fn test_protected_status_bit() {
        let mut r = DeviceRegisters::new();
        r.protected = true;
        assert_eq!(r.status_word(false), STATUS_READY);
        assert_eq!(r.status_word(true), STATUS_READY | STATUS_PROTECTED);
    }

    #[test]
    fn test_self_managed_status() {
        let mut r = DeviceRegisters::new();
        r.manages_own_status = true;
        r.apply_director(DIR_DATA_INTERRUPT);
        r.io_data_ready();
        assert!(!r.interrupting());
    }
}
