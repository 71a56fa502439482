//! The priority interrupt system.
//!
//! There are 16 interrupt levels.  Level 0 is used for internal
//! conditions (protect faults); levels 1 to 15 correspond to
//! equipment addresses.  Lower numbered levels have higher priority.
//!
//! The pending interrupts are not stored incrementally.  Device
//! interrupt lines are recomputed from device status by
//! [`crate::DeviceManager::rebuild_pending`]; only the internal
//! (edge-triggered) condition is remembered here.
//!
//! ## Save areas
//!
//! Each level N has a four-word area at `0x0100 + 4N`.  When an
//! interrupt on level N is taken, P is saved in the first word of
//! the area and execution continues at the second.  In 32K mode the
//! overflow indicator is saved in bit 15 of the saved P.  The
//! `EXI` instruction names the save area to return through.
use tracing::{event, Level};

use base::prelude::AddressingMode;

use crate::control::ControlRegisters;
use crate::memory::MemoryUnit;

pub const INTERRUPT_LEVELS: usize = 16;

/// The pending bit of the internal interrupt (level 0).
pub const INTERNAL_INTERRUPT: u16 = 0x0001;

const SAVE_AREA_BASE: u16 = 0x0100;
const SAVE_AREA_SIZE: u16 = 4;
const SAVED_OVERFLOW: u16 = 0x8000;

/// The address at which P is saved for interrupt level `level`.
#[must_use]
pub const fn save_slot(level: u8) -> u16 {
    SAVE_AREA_BASE + SAVE_AREA_SIZE * level as u16
}

/// The address at which execution continues for interrupt level `level`.
#[must_use]
pub const fn vector(level: u8) -> u16 {
    save_slot(level) + 1
}

/// Select the interrupt to take: the lowest-numbered bit which is
/// both pending and enabled by the mask.
#[must_use]
pub fn highest_priority(pending: u16, mask: u16) -> Option<u8> {
    let candidates = pending & mask;
    if candidates == 0 {
        None
    } else {
        Some(candidates.trailing_zeros() as u8)
    }
}

/// The operand of EXI does not identify a save area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidExit(pub u8);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InterruptController {
    internal_pending: bool,
}

impl InterruptController {
    #[must_use]
    pub fn new() -> InterruptController {
        InterruptController::default()
    }

    /// Raise the internal interrupt.  It stays pending until level 0
    /// is entered.
    pub fn raise_internal(&mut self) {
        self.internal_pending = true;
    }

    #[must_use]
    pub fn internal_pending(&self) -> bool {
        self.internal_pending
    }

    /// Combine the internal condition with the device interrupt lines.
    #[must_use]
    pub fn pending(&self, device_lines: u16) -> u16 {
        let internal = if self.internal_pending() {
            INTERNAL_INTERRUPT
        } else {
            0
        };
        (device_lines & !INTERNAL_INTERRUPT) | internal
    }

    /// Decide whether an interrupt should be taken before the next
    /// instruction.  This is called exactly once per instruction.
    pub(crate) fn sample(&self, regs: &mut ControlRegisters, device_lines: u16) -> Option<u8> {
        if regs.defer_interrupts {
            regs.defer_interrupts = false;
            return None;
        }
        if !regs.interrupts_enabled {
            return None;
        }
        highest_priority(self.pending(device_lines), regs.m)
    }

    /// Take an interrupt on `level`.
    pub(crate) fn enter(
        &mut self,
        level: u8,
        regs: &mut ControlRegisters,
        mem: &mut MemoryUnit,
        mode: AddressingMode,
        character_addressing: bool,
    ) {
        let saved_p = match mode {
            AddressingMode::Addr32K => {
                let overflow_bit = if regs.overflow { SAVED_OVERFLOW } else { 0 };
                (regs.p & mode.mask()) | overflow_bit
            }
            AddressingMode::Addr64K => regs.p,
        };
        mem.write_unchecked(save_slot(level), saved_p);
        event!(
            Level::DEBUG,
            "interrupt on level {level}: saved P={saved_p:#06X}, continuing at {:#06X}",
            vector(level)
        );
        regs.p = vector(level);
        regs.interrupts_enabled = false;
        regs.level = regs.level.saturating_add(1);
        if character_addressing {
            regs.saved_character_mode[usize::from(level)] = regs.character_mode;
            regs.character_mode = false;
        }
        // The handler is entered as if it had been reached from a
        // protected instruction.
        regs.previous_protected = true;
        if level == 0 {
            self.internal_pending = false;
        }
    }

    /// Return from an interrupt through the save area at
    /// `0x0100 + offset`.  Returns the restored program counter.
    ///
    /// # Errors
    ///
    /// `InvalidExit` when the offset is not a multiple of four or is
    /// beyond the last save area.
    pub(crate) fn exit(
        &mut self,
        offset: u8,
        regs: &mut ControlRegisters,
        mem: &MemoryUnit,
        mode: AddressingMode,
        character_addressing: bool,
    ) -> Result<u16, InvalidExit> {
        let offset16 = u16::from(offset);
        if offset16 % SAVE_AREA_SIZE != 0
            || offset16 >= SAVE_AREA_SIZE * INTERRUPT_LEVELS as u16
        {
            return Err(InvalidExit(offset));
        }
        let level = (offset16 / SAVE_AREA_SIZE) as u8;
        let saved = mem.read(SAVE_AREA_BASE + offset16);
        let restored_p = match mode {
            AddressingMode::Addr32K => {
                regs.overflow = saved & SAVED_OVERFLOW != 0;
                saved & mode.mask()
            }
            AddressingMode::Addr64K => saved,
        };
        regs.level = regs.level.saturating_sub(1);
        regs.interrupts_enabled = true;
        if character_addressing {
            regs.character_mode = regs.saved_character_mode[usize::from(level)];
        }
        event!(
            Level::DEBUG,
            "exit from level {level} to {restored_p:#06X}, nesting now {}",
            regs.level
        );
        Ok(restored_p)
    }
}
