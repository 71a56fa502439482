//! Special instructions (F = 0): skips, register operations, shifts,
//! interrupt control and protection.
use tracing::{event, Level};

use base::instruction::{InterRegister, InterRegisterOp, Shift, ShiftRegisters, SkipCondition};
use base::onescomplement::{is_negative, sign_extend_8, PLUS_ZERO};
use base::subword::{join_halves, split_halves};

use super::{ControlUnit, OpcodeResult, ProgramCounterChange};
use crate::diagnostics::CurrentInstructionDiagnostics;
use crate::interrupt::InvalidExit;
use crate::memory::MemoryUnit;
use crate::protect::{privileged_operation_permitted, ProtectViolation};
use crate::stop::StopReason;

fn shift_word(value: u16, left: bool, count: u8) -> u16 {
    if left {
        value.rotate_left(u32::from(count))
    } else {
        ((value as i16) >> count.min(15)) as u16
    }
}

fn shift_long(value: u32, left: bool, count: u8) -> u32 {
    if left {
        value.rotate_left(u32::from(count))
    } else {
        ((value as i32) >> count.min(31)) as u32
    }
}

impl ControlUnit {
    /// SLS: stop if the selective stop switch is set.  After the stop,
    /// P addresses the following instruction, so that the program
    /// continues when the machine is restarted.
    pub(super) fn op_sls(&mut self, diagnostics: &CurrentInstructionDiagnostics) -> OpcodeResult {
        if self.config.selective_stop {
            self.regs.p = self.mask_address(self.regs.p.wrapping_add(1));
            Err(StopReason::SelectiveStop {
                diagnostics: *diagnostics,
            })
        } else {
            Ok(ProgramCounterChange::CounterUpdate)
        }
    }

    pub(super) fn op_enhanced(&mut self, diagnostics: &CurrentInstructionDiagnostics) -> OpcodeResult {
        Err(StopReason::UnimplementedInstruction {
            diagnostics: *diagnostics,
            message: "enhanced instructions are not implemented".to_string(),
        })
    }

    pub(super) fn op_skip(&mut self, condition: SkipCondition, count: u8) -> ProgramCounterChange {
        use SkipCondition::*;
        let (a, q) = (self.regs.a, self.regs.q);
        let skip = match condition {
            Saz => a == PLUS_ZERO,
            San => a != PLUS_ZERO,
            Sap => !is_negative(a),
            Sam => is_negative(a),
            Sqz => q == PLUS_ZERO,
            Sqn => q != PLUS_ZERO,
            Sqp => !is_negative(q),
            Sqm => is_negative(q),
            Sws => self.config.selective_skip,
            Swn => !self.config.selective_skip,
            Sov => std::mem::take(&mut self.regs.overflow),
            Sno => !std::mem::take(&mut self.regs.overflow),
            // Memory parity errors are not simulated.
            Spe => false,
            Snp => true,
            Spf => std::mem::take(&mut self.regs.protect_fault),
            Snf => !std::mem::take(&mut self.regs.protect_fault),
        };
        if skip {
            event!(Level::TRACE, "{condition}: skipping {count}");
            ProgramCounterChange::Skip(u16::from(count))
        } else {
            ProgramCounterChange::CounterUpdate
        }
    }

    pub(super) fn op_ein(&mut self) -> ProgramCounterChange {
        self.regs.interrupts_enabled = true;
        // Interrupts are recognised only after the next instruction.
        self.regs.defer_interrupts = true;
        ProgramCounterChange::CounterUpdate
    }

    pub(super) fn op_iin(&mut self) -> ProgramCounterChange {
        self.regs.interrupts_enabled = false;
        ProgramCounterChange::CounterUpdate
    }

    /// SPB and CPB: set or clear the protect bit of the word addressed by Q.
    pub(super) fn op_protect_bit(&mut self, mem: &mut MemoryUnit, protect: bool) -> ProgramCounterChange {
        let address = self.regs.q;
        if privileged_operation_permitted(mem, self.regs.protected_instruction) {
            mem.set_protect_bit(address, protect);
        } else {
            self.raise_protect_fault(ProtectViolation::ProtectBit { address });
        }
        ProgramCounterChange::CounterUpdate
    }

    pub(super) fn op_inter_register(&mut self, ir: InterRegister) -> ProgramCounterChange {
        let unselected = if ir.logical_product_selected() {
            0xFFFF
        } else {
            0
        };
        let op1 = if ir.from_a() { self.regs.a } else { unselected };
        let op2 = match (ir.from_q(), ir.from_m()) {
            (false, false) => unselected,
            (true, false) => self.regs.q,
            (false, true) => self.regs.m,
            (true, true) => self.regs.q | self.regs.m,
        };
        let result = match ir.op() {
            InterRegisterOp::Sum => self.regs.add(op1, op2),
            InterRegisterOp::ExclusiveOr => op1 ^ op2,
            InterRegisterOp::LogicalProduct => op1 & op2,
            InterRegisterOp::ComplementedProduct => !(op1 & op2),
        };
        if ir.to_a() {
            self.regs.a = result;
        }
        if ir.to_q() {
            self.regs.q = result;
        }
        if ir.to_m() {
            self.regs.m = result;
        }
        ProgramCounterChange::CounterUpdate
    }

    pub(super) fn op_ina(&mut self, delta: u8) -> ProgramCounterChange {
        let a = self.regs.a;
        self.regs.a = self.regs.add(a, sign_extend_8(delta));
        ProgramCounterChange::CounterUpdate
    }

    pub(super) fn op_ena(&mut self, delta: u8) -> ProgramCounterChange {
        self.regs.a = sign_extend_8(delta);
        ProgramCounterChange::CounterUpdate
    }

    pub(super) fn op_enq(&mut self, delta: u8) -> ProgramCounterChange {
        self.regs.q = sign_extend_8(delta);
        ProgramCounterChange::CounterUpdate
    }

    pub(super) fn op_inq(&mut self, delta: u8) -> ProgramCounterChange {
        let q = self.regs.q;
        self.regs.q = self.regs.add(q, sign_extend_8(delta));
        ProgramCounterChange::CounterUpdate
    }

    pub(super) fn op_exi(
        &mut self,
        offset: u8,
        mem: &MemoryUnit,
        diagnostics: &CurrentInstructionDiagnostics,
    ) -> OpcodeResult {
        match self.interrupts.exit(
            offset,
            &mut self.regs,
            mem,
            self.config.addressing,
            self.config.character_addressing,
        ) {
            Ok(p) => Ok(ProgramCounterChange::Jump(p)),
            Err(InvalidExit(offset)) => Err(StopReason::InvalidInterruptExit {
                diagnostics: *diagnostics,
                offset,
            }),
        }
    }

    pub(super) fn op_shift(&mut self, shift: Shift) -> ProgramCounterChange {
        let Shift {
            left,
            registers,
            count,
        } = shift;
        match registers {
            ShiftRegisters::Neither => (),
            ShiftRegisters::A => self.regs.a = shift_word(self.regs.a, left, count),
            ShiftRegisters::Q => self.regs.q = shift_word(self.regs.q, left, count),
            ShiftRegisters::Long => {
                let (q, a) = split_halves(shift_long(join_halves(self.regs.q, self.regs.a), left, count));
                self.regs.q = q;
                self.regs.a = a;
            }
        }
        ProgramCounterChange::CounterUpdate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_right_shift_is_arithmetic() {
        assert_eq!(shift_word(0x8000, false, 1), 0xC000);
        assert_eq!(shift_word(0x4000, false, 2), 0x1000);
        assert_eq!(shift_word(0x8000, false, 31), 0xFFFF);
        assert_eq!(shift_long(0x8000_0000, false, 31), 0xFFFF_FFFF);
    }

    #[test]
    fn test_left_shift_is_end_around() {
        assert_eq!(shift_word(0x8001, true, 1), 0x0003);
        assert_eq!(shift_word(0x1234, true, 16), 0x1234);
        assert_eq!(shift_long(0x8000_0001, true, 4), 0x0000_0018);
    }
}
