//! Storage reference instructions (F = 1 to F).
use tracing::{event, Level};

use base::instruction::{Instruction, Opcode};
use base::onescomplement::odd_parity;

use super::address::resolve_operand_address;
use super::{ControlUnit, OpcodeResult, ProgramCounterChange};
use crate::diagnostics::CurrentInstructionDiagnostics;
use crate::memory::MemoryUnit;
use crate::stop::StopReason;

impl ControlUnit {
    pub(super) fn op_storage_reference(
        &mut self,
        opcode: Opcode,
        inst: Instruction,
        mem: &mut MemoryUnit,
        diagnostics: &CurrentInstructionDiagnostics,
    ) -> OpcodeResult {
        let resolved = resolve_operand_address(
            inst,
            self.regs.p,
            self.regs.q,
            mem,
            self.config.addressing,
        )
        .map_err(|e| StopReason::AddressingLoop {
            diagnostics: *diagnostics,
            dereferences: e.dereferences,
        })?;
        let ea = resolved.address;
        event!(Level::TRACE, "effective address is {ea:#06X}");

        match opcode {
            Opcode::Jmp => return Ok(ProgramCounterChange::Jump(ea)),
            Opcode::Rtj => {
                let return_address = self.mask_address(self.regs.p.wrapping_add(resolved.length));
                self.store(mem, ea, return_address);
                self.regs.defer_interrupts = true;
                return Ok(ProgramCounterChange::Jump(ea.wrapping_add(1)));
            }
            Opcode::Mui => {
                let operand = mem.read(ea);
                self.regs.multiply(operand);
            }
            Opcode::Dvi => {
                let operand = mem.read(ea);
                self.regs.divide(operand);
            }
            Opcode::Stq => {
                let q = self.regs.q;
                self.store(mem, ea, q);
            }
            Opcode::Sta => {
                let a = self.regs.a;
                self.store(mem, ea, a);
            }
            Opcode::Spa => {
                let a = self.regs.a;
                self.store(mem, ea, a);
                self.regs.a = u16::from(odd_parity(a));
            }
            Opcode::Add => {
                let (a, operand) = (self.regs.a, mem.read(ea));
                self.regs.a = self.regs.add(a, operand);
            }
            Opcode::Sub => {
                let (a, operand) = (self.regs.a, mem.read(ea));
                self.regs.a = self.regs.subtract(a, operand);
            }
            Opcode::And => {
                self.regs.a &= mem.read(ea);
            }
            Opcode::Eor => {
                self.regs.a ^= mem.read(ea);
            }
            Opcode::Lda => {
                self.regs.a = mem.read(ea);
            }
            Opcode::Rao => {
                let value = self.regs.add(mem.read(ea), 1);
                self.store(mem, ea, value);
            }
            Opcode::Ldq => {
                self.regs.q = mem.read(ea);
            }
            Opcode::Adq => {
                let (q, operand) = (self.regs.q, mem.read(ea));
                self.regs.q = self.regs.add(q, operand);
            }
        }
        Ok(ProgramCounterChange::CounterUpdate)
    }
}
