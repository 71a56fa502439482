//! The control unit: the processor's registers and the instruction
//! engine.
//!
//! Each call to [`ControlUnit::step`] does one of three things:
//!
//! 1. takes an interrupt (interrupts are sampled once, before the
//!    instruction is fetched),
//! 2. aborts the instruction at P because an unprotected program has
//!    run into a protected word (a protect boundary fault), or
//! 3. fetches, decodes and executes the instruction at P.
//!
//! Instructions run to completion.  A failure which stops the
//! machine is returned as a [`StopReason`]; protect faults are not
//! failures, they are reported to the program through the interrupt
//! system.
use serde::Serialize;
use tracing::{event, span, Level};

use base::instruction::{decode, DecodedInstruction, Instruction};
use base::prelude::{AddressingMode, Direction, InstructionSet};

use crate::context::Context;
use crate::diagnostics::CurrentInstructionDiagnostics;
use crate::interrupt::{InterruptController, INTERRUPT_LEVELS};
use crate::io::DeviceManager;
use crate::memory::{MemoryUnit, ProtectedWord};
use crate::protect::{crosses_into_protected, ProtectViolation};
use crate::stop::StopReason;

mod address;
mod arith;
mod op_io;
mod op_special;
mod op_storage;
#[cfg(test)]
mod tests;

pub use address::{
    resolve_operand_address, AddressingLoop, ResolvedAddress, MAX_INDIRECT_REFERENCES,
};

#[derive(Debug, PartialEq, Eq)]
enum ProgramCounterChange {
    /// Continue with the instruction following this one.
    CounterUpdate,
    /// Skip the given number of words beyond the following instruction.
    Skip(u16),
    Jump(u16),
}

type OpcodeResult = Result<ProgramCounterChange, StopReason>;

/// The processor's registers and indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlRegisters {
    /// Program counter.
    pub p: u16,
    /// Accumulator.
    pub a: u16,
    /// Index register and accumulator extension; also addresses devices.
    pub q: u16,
    /// Interrupt mask register.
    pub m: u16,
    pub overflow: bool,
    pub interrupts_enabled: bool,
    /// Set by RTJ (and EIN): suppresses interrupt sampling before the
    /// next instruction.
    pub defer_interrupts: bool,
    /// The instruction being executed is held in a protected word.
    pub protected_instruction: bool,
    /// The previously executed instruction was protected.  The
    /// console counts as protected, so this is set after a master
    /// clear.
    pub previous_protected: bool,
    /// Protect fault indicator, tested and cleared by SPF/SNF.
    pub protect_fault: bool,
    /// Interrupt nesting level.
    pub level: u8,
    /// Character addressing mode (enhanced instruction set only).
    pub character_mode: bool,
    pub saved_character_mode: [bool; INTERRUPT_LEVELS],
}

impl ControlRegisters {
    #[must_use]
    pub fn new() -> ControlRegisters {
        ControlRegisters {
            p: 0,
            a: 0,
            q: 0,
            m: 0,
            overflow: false,
            interrupts_enabled: false,
            defer_interrupts: false,
            protected_instruction: false,
            previous_protected: true,
            protect_fault: false,
            level: 0,
            character_mode: false,
            saved_character_mode: [false; INTERRUPT_LEVELS],
        }
    }
}

impl Default for ControlRegisters {
    fn default() -> Self {
        // We're implementing this mainly to keep clippy happy.
        Self::new()
    }
}

/// Settings of the processor which are fixed by its configuration
/// or by console switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct ControlConfiguration {
    pub addressing: AddressingMode,
    pub instruction_set: InstructionSet,
    pub character_addressing: bool,
    /// The selective stop switch; SLS stops only when it is set.
    pub selective_stop: bool,
    /// The selective skip switch, tested by SWS and SWN.
    pub selective_skip: bool,
    /// Stop the machine when a device rejects an I/O instruction.
    pub stop_on_reject: bool,
}

/// What a call to [`ControlUnit::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Executed,
    InterruptTaken(u8),
    /// The instruction was abandoned because of a protect boundary fault.
    ProtectFault,
}

#[derive(Debug)]
pub struct ControlUnit {
    pub regs: ControlRegisters,
    interrupts: InterruptController,
    config: ControlConfiguration,
}

impl ControlUnit {
    #[must_use]
    pub fn new(config: ControlConfiguration) -> ControlUnit {
        ControlUnit {
            regs: ControlRegisters::new(),
            interrupts: InterruptController::new(),
            config,
        }
    }

    #[must_use]
    pub fn configuration(&self) -> &ControlConfiguration {
        &self.config
    }

    pub fn set_configuration(&mut self, config: ControlConfiguration) {
        event!(Level::INFO, "control unit configuration is now {config:?}");
        self.config = config;
    }

    /// Reset the registers and the interrupt system, as the MASTER
    /// CLEAR switch does.
    pub fn master_clear(&mut self) {
        self.regs = ControlRegisters::new();
        self.interrupts = InterruptController::new();
    }

    /// All pending interrupts, internal and external.
    #[must_use]
    pub fn pending_interrupts(&self, devices: &DeviceManager) -> u16 {
        self.interrupts.pending(devices.pending())
    }

    fn raise_protect_fault(&mut self, violation: ProtectViolation) {
        event!(Level::DEBUG, "protect fault: {violation}");
        self.regs.protect_fault = true;
        self.interrupts.raise_internal();
    }

    /// Store a word on behalf of the current instruction.  A
    /// protection failure raises a protect fault and the store does
    /// not happen.
    fn store(&mut self, mem: &mut MemoryUnit, address: u16, value: u16) {
        if let Err(ProtectedWord(address)) =
            mem.write_checked(address, value, self.regs.protected_instruction)
        {
            self.raise_protect_fault(ProtectViolation::Store { address });
        }
    }

    fn mask_address(&self, address: u16) -> u16 {
        address & self.config.addressing.mask()
    }

    fn set_program_counter(&mut self, change: ProgramCounterChange, length: u16) {
        let p = self.regs.p;
        self.regs.p = match change {
            ProgramCounterChange::CounterUpdate => self.mask_address(p.wrapping_add(length)),
            ProgramCounterChange::Skip(n) => {
                self.mask_address(arith::add_internal(arith::add_internal(p, 1), n))
            }
            ProgramCounterChange::Jump(target) => self.mask_address(target),
        };
    }

    /// Perform one step: take an interrupt, or execute an instruction.
    ///
    /// # Errors
    ///
    /// Returns the reason for which the machine stopped.
    pub fn step(
        &mut self,
        ctx: &Context,
        mem: &mut MemoryUnit,
        devices: &mut DeviceManager,
    ) -> Result<StepOutcome, StopReason> {
        if let Some(level) = self.interrupts.sample(&mut self.regs, devices.pending()) {
            let span = span!(Level::INFO, "interrupt", level = level);
            let _enter = span.enter();
            self.interrupts.enter(
                level,
                &mut self.regs,
                mem,
                self.config.addressing,
                self.config.character_addressing,
            );
            return Ok(StepOutcome::InterruptTaken(level));
        }
        self.execute_instruction(ctx, mem, devices)
    }

    /// Fetch, decode and execute the instruction at P, without
    /// sampling interrupts.
    ///
    /// # Errors
    ///
    /// Returns the reason for which the machine stopped.
    pub fn execute_instruction(
        &mut self,
        ctx: &Context,
        mem: &mut MemoryUnit,
        devices: &mut DeviceManager,
    ) -> Result<StepOutcome, StopReason> {
        let p = self.regs.p;
        let inst = Instruction::from(mem.read(p));
        let decoded = decode(inst.bits(), self.config.instruction_set);
        let diagnostics = CurrentInstructionDiagnostics {
            instruction: inst,
            decoded,
            address: p,
        };
        let span = span!(Level::INFO, "fetch", p = %format_args!("{p:#06X}"), op = %decoded);
        let _enter = span.enter();

        if crosses_into_protected(mem, self.regs.previous_protected, p) {
            // The instruction is abandoned.  For a two-word
            // instruction P is left pointing at the second word.
            if inst.is_two_word() {
                self.regs.p = self.mask_address(p.wrapping_add(1));
            }
            self.raise_protect_fault(ProtectViolation::Boundary { address: p });
            return Ok(StepOutcome::ProtectFault);
        }

        let protected = mem.is_protected(p);
        self.regs.protected_instruction = protected;
        let result = self.execute(decoded, inst, ctx, mem, devices, &diagnostics);
        self.regs.previous_protected = protected;
        match result {
            Ok(change) => {
                self.set_program_counter(change, inst.length());
                event!(
                    Level::TRACE,
                    "A={:#06X} Q={:#06X} next P={:#06X}",
                    self.regs.a,
                    self.regs.q,
                    self.regs.p
                );
                Ok(StepOutcome::Executed)
            }
            Err(stop) => {
                event!(Level::INFO, "execution stopped: {stop}");
                Err(stop)
            }
        }
    }

    fn execute(
        &mut self,
        decoded: DecodedInstruction,
        inst: Instruction,
        ctx: &Context,
        mem: &mut MemoryUnit,
        devices: &mut DeviceManager,
        diagnostics: &CurrentInstructionDiagnostics,
    ) -> OpcodeResult {
        use DecodedInstruction::*;
        match decoded {
            StorageReference { opcode, .. } => {
                self.op_storage_reference(opcode, inst, mem, diagnostics)
            }
            SelectiveStop => self.op_sls(diagnostics),
            Enhanced { .. } => self.op_enhanced(diagnostics),
            Skip { condition, count } => Ok(self.op_skip(condition, count)),
            Input { reject_delta } => self.op_io(
                Direction::Input,
                reject_delta,
                ctx,
                mem,
                devices,
                diagnostics,
            ),
            Output { reject_delta } => self.op_io(
                Direction::Output,
                reject_delta,
                ctx,
                mem,
                devices,
                diagnostics,
            ),
            EnableInterrupts => Ok(self.op_ein()),
            InhibitInterrupts => Ok(self.op_iin()),
            SetProtect => Ok(self.op_protect_bit(mem, true)),
            ClearProtect => Ok(self.op_protect_bit(mem, false)),
            InterRegister(ir) => Ok(self.op_inter_register(ir)),
            IncreaseA(n) => Ok(self.op_ina(n)),
            EnterA(n) => Ok(self.op_ena(n)),
            NoOperation => Ok(ProgramCounterChange::CounterUpdate),
            EnterQ(n) => Ok(self.op_enq(n)),
            IncreaseQ(n) => Ok(self.op_inq(n)),
            ExitInterrupt(offset) => self.op_exi(offset, mem, diagnostics),
            Shift(shift) => Ok(self.op_shift(shift)),
        }
    }
}
