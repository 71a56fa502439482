use base::prelude::*;

use super::{ControlConfiguration, ControlUnit, StepOutcome};
use crate::context::{Context, Tick};
use crate::interrupt::{save_slot, vector};
use crate::io::{Device, DeviceManager, DeviceRegisters, IoContext, Placement, Reject};
use crate::memory::{MemoryConfiguration, MemorySize, MemoryUnit};
use crate::stop::{StopKind, StopReason};

const COMPLAIN: &str = "failed to set up test data";

const NOP: u16 = 0x0B00;
const EIN: u16 = 0x0400;
const SPB: u16 = 0x0600;

fn special(d: DecodedInstruction) -> u16 {
    Instruction::from(&d).bits()
}

fn storage(opcode: Opcode, delta: u8) -> u16 {
    special(DecodedInstruction::StorageReference {
        opcode,
        address: OperandAddress::direct(delta),
    })
}

fn skip(condition: SkipCondition, count: u8) -> u16 {
    special(DecodedInstruction::Skip { condition, count })
}

/// A control unit with memory and devices, and a clock.
struct Rig {
    control: ControlUnit,
    mem: MemoryUnit,
    devices: DeviceManager,
    now: Tick,
}

impl Rig {
    fn with_config(config: ControlConfiguration, size: MemorySize) -> Rig {
        Rig {
            control: ControlUnit::new(config),
            mem: MemoryUnit::new(&MemoryConfiguration { size }),
            devices: DeviceManager::new(),
            now: 0,
        }
    }

    fn new() -> Rig {
        Rig::with_config(ControlConfiguration::default(), MemorySize::K32)
    }

    fn load(&mut self, origin: u16, program: &[u16]) {
        self.mem.load(origin, program);
        self.control.regs.p = origin;
    }

    fn step(&mut self) -> Result<StepOutcome, StopReason> {
        let ctx = Context::new(self.now);
        let result = self.control.step(&ctx, &mut self.mem, &mut self.devices);
        self.now += 1;
        result
    }

    fn steps(&mut self, n: usize) {
        for _ in 0..n {
            self.step().expect("program should not stop");
        }
    }

    fn enable_interrupts(&mut self, mask: u16) {
        self.control.regs.interrupts_enabled = true;
        self.control.regs.m = mask;
    }
}

/// A device which answers every read with a fixed word.
struct Echo {
    registers: DeviceRegisters,
    reply: u16,
    rejecting: bool,
    interrupting: bool,
}

impl Echo {
    fn new() -> Echo {
        Echo {
            registers: DeviceRegisters::new(),
            reply: 0xABCD,
            rejecting: false,
            interrupting: false,
        }
    }
}

impl Device for Echo {
    fn name(&self) -> String {
        "echo".to_string()
    }

    fn registers(&self) -> &DeviceRegisters {
        &self.registers
    }

    fn registers_mut(&mut self) -> &mut DeviceRegisters {
        &mut self.registers
    }

    fn reject(&self, _request: &IoRequest) -> bool {
        self.rejecting
    }

    fn read(&mut self, _ctx: &mut IoContext<'_>, _request: &IoRequest) -> Result<u16, Reject> {
        Ok(self.reply)
    }

    fn write(
        &mut self,
        _ctx: &mut IoContext<'_>,
        _request: &IoRequest,
        _value: u16,
    ) -> Result<(), Reject> {
        Ok(())
    }

    fn nonstandard_interrupt(&self) -> Option<bool> {
        Some(self.interrupting)
    }
}

#[test]
fn test_load_add_store() {
    let mut rig = Rig::new();
    rig.mem.load(0x50, &[5, 7]);
    rig.load(
        0x100,
        &[
            storage(Opcode::Lda, 0x50),
            storage(Opcode::Add, 0x51),
            storage(Opcode::Sta, 0x52),
            storage(Opcode::Sub, 0x50),
        ],
    );
    rig.steps(3);
    assert_eq!(rig.mem.read(0x52), 12);
    assert_eq!(rig.control.regs.p, 0x103);
    rig.steps(1);
    assert_eq!(rig.control.regs.a, 7);
    assert!(!rig.control.regs.overflow);
}

#[test]
fn test_two_word_instruction() {
    let mut rig = Rig::new();
    rig.mem.load(0x3000, &[0x4242]);
    // LDA with a zero displacement takes its address from the next word.
    rig.load(0x100, &[0xC000, 0x3000, NOP]);
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
    assert_eq!(rig.control.regs.a, 0x4242);
    assert_eq!(rig.control.regs.p, 0x102);
}

#[test]
fn test_logical_and_queue_instructions() {
    let mut rig = Rig::new();
    rig.mem.load(0x40, &[0x0FF0, 0x3C3C, 0x0002]);
    rig.load(
        0x100,
        &[
            storage(Opcode::Lda, 0x40),
            storage(Opcode::And, 0x41),
            storage(Opcode::Eor, 0x40),
            storage(Opcode::Ldq, 0x42),
            storage(Opcode::Adq, 0x42),
            storage(Opcode::Stq, 0x43),
        ],
    );
    rig.steps(6);
    assert_eq!(rig.control.regs.a, 0x0FF0 ^ 0x0C30);
    assert_eq!(rig.control.regs.q, 4);
    assert_eq!(rig.mem.read(0x43), 4);
}

#[test]
fn test_overflow_then_sov() {
    let mut rig = Rig::new();
    rig.mem.load(0x20, &[0x7FFF, 0x0001]);
    rig.load(
        0x100,
        &[
            storage(Opcode::Lda, 0x20),
            storage(Opcode::Add, 0x21),
            skip(SkipCondition::Sov, 1),
            NOP,
            skip(SkipCondition::Sno, 1),
        ],
    );
    rig.steps(2);
    assert_eq!(rig.control.regs.a, 0x8000);
    assert!(rig.control.regs.overflow);
    rig.steps(1);
    // The skip was taken, and testing cleared the indicator.
    assert_eq!(rig.control.regs.p, 0x104);
    assert!(!rig.control.regs.overflow);
    rig.steps(1);
    assert_eq!(rig.control.regs.p, 0x106);
}

#[test]
fn test_zero_skips_recognise_only_plus_zero() {
    let mut rig = Rig::new();
    rig.load(
        0x100,
        &[
            special(DecodedInstruction::EnterA(0xFF)),
            skip(SkipCondition::Saz, 1),
            skip(SkipCondition::San, 2),
        ],
    );
    rig.steps(1);
    assert_eq!(rig.control.regs.a, MINUS_ZERO);
    rig.steps(1);
    assert_eq!(rig.control.regs.p, 0x102);
    rig.steps(1);
    assert_eq!(rig.control.regs.p, 0x105);
}

#[test]
fn test_sign_and_switch_skips() {
    let config = ControlConfiguration {
        selective_skip: true,
        ..ControlConfiguration::default()
    };
    let mut rig = Rig::with_config(config, MemorySize::K32);
    rig.load(
        0x100,
        &[
            special(DecodedInstruction::EnterQ(0x80)),
            skip(SkipCondition::Sqm, 0),
            skip(SkipCondition::Sws, 3),
        ],
    );
    rig.steps(2);
    assert_eq!(rig.control.regs.q, 0xFF80);
    // A skip count of zero goes to the next instruction either way.
    assert_eq!(rig.control.regs.p, 0x102);
    rig.steps(1);
    assert_eq!(rig.control.regs.p, 0x106);
}

#[test]
fn test_register_immediates() {
    let mut rig = Rig::new();
    rig.load(
        0x100,
        &[
            special(DecodedInstruction::EnterA(0xFE)),
            special(DecodedInstruction::IncreaseA(0x01)),
            special(DecodedInstruction::EnterQ(0x05)),
            special(DecodedInstruction::IncreaseQ(0xFE)),
            special(DecodedInstruction::IncreaseQ(0xFF)),
        ],
    );
    rig.steps(1);
    assert_eq!(rig.control.regs.a, 0xFFFE);
    rig.steps(1);
    assert_eq!(rig.control.regs.a, PLUS_ZERO);
    rig.steps(2);
    assert_eq!(rig.control.regs.q, 4);
    // Δ = 0xFF is -0, so this leaves Q alone.
    rig.steps(1);
    assert_eq!(rig.control.regs.q, 4);
    assert!(!rig.control.regs.overflow);
}

#[test]
fn test_multiply_and_divide() {
    let mut rig = Rig::new();
    rig.mem.load(0x60, &[300, 7]);
    rig.load(
        0x100,
        &[
            storage(Opcode::Lda, 0x60),
            storage(Opcode::Mui, 0x60),
            storage(Opcode::Dvi, 0x61),
        ],
    );
    rig.steps(2);
    assert_eq!((rig.control.regs.q, rig.control.regs.a), (0x0001, 0x5F90));
    rig.steps(1);
    assert_eq!(rig.control.regs.a, 12857);
    assert_eq!(rig.control.regs.q, 1);
}

#[test]
fn test_spa_and_rao() {
    let mut rig = Rig::new();
    rig.mem.load(0x30, &[0x7FFF, 0x0007]);
    rig.load(
        0x100,
        &[
            storage(Opcode::Rao, 0x30),
            storage(Opcode::Lda, 0x31),
            storage(Opcode::Spa, 0x32),
        ],
    );
    rig.steps(1);
    assert_eq!(rig.mem.read(0x30), 0x8000);
    assert!(rig.control.regs.overflow);
    rig.steps(2);
    assert_eq!(rig.mem.read(0x32), 0x0007);
    assert_eq!(rig.control.regs.a, 1);
}

#[test]
fn test_inter_register() {
    let mut rig = Rig::new();
    let ir = |bits: u8| special(DecodedInstruction::InterRegister(InterRegister::new(bits)));
    rig.load(
        0x100,
        &[
            ir(InterRegister::XR | InterRegister::FROM_A | InterRegister::FROM_Q | InterRegister::TO_A),
            // LP with no origin registers: both operands are all ones.
            ir(InterRegister::LP | InterRegister::TO_Q),
            ir(InterRegister::FROM_A | InterRegister::FROM_M | InterRegister::TO_M),
        ],
    );
    rig.control.regs.a = 0x00F0;
    rig.control.regs.q = 0x0F00;
    rig.control.regs.m = 0x0001;
    rig.steps(1);
    assert_eq!(rig.control.regs.a, 0x0FF0);
    rig.steps(1);
    assert_eq!(rig.control.regs.q, 0xFFFF);
    rig.steps(1);
    assert_eq!(rig.control.regs.m, 0x0FF1);
}

#[test]
fn test_inter_register_sum_sets_overflow() {
    let mut rig = Rig::new();
    rig.load(
        0x100,
        &[special(DecodedInstruction::InterRegister(InterRegister::new(
            InterRegister::FROM_A | InterRegister::FROM_Q | InterRegister::TO_A,
        )))],
    );
    rig.control.regs.a = 0x7FFF;
    rig.control.regs.q = 0x0001;
    rig.steps(1);
    assert_eq!(rig.control.regs.a, 0x8000);
    assert!(rig.control.regs.overflow);
}

#[test]
fn test_shifts() {
    let mut rig = Rig::new();
    let shift = |left: bool, registers: ShiftRegisters, count: u8| {
        special(DecodedInstruction::Shift(Shift {
            left,
            registers,
            count,
        }))
    };
    rig.load(
        0x100,
        &[
            shift(true, ShiftRegisters::A, 1),
            shift(false, ShiftRegisters::Q, 1),
            shift(true, ShiftRegisters::Long, 4),
        ],
    );
    rig.control.regs.a = 0x8001;
    rig.control.regs.q = 0x8000;
    rig.steps(2);
    assert_eq!(rig.control.regs.a, 0x0003);
    assert_eq!(rig.control.regs.q, 0xC000);
    rig.steps(1);
    assert_eq!(rig.control.regs.q, 0x0000);
    assert_eq!(rig.control.regs.a, 0x003C);
}

#[test]
fn test_jump_and_counter_wrap() {
    let mut rig = Rig::new();
    rig.load(0x7FFF, &[NOP]);
    rig.steps(1);
    assert_eq!(rig.control.regs.p, 0x0000);

    let mut rig = Rig::with_config(
        ControlConfiguration {
            addressing: AddressingMode::Addr64K,
            ..ControlConfiguration::default()
        },
        MemorySize::K64,
    );
    rig.load(0xFFFF, &[NOP]);
    rig.steps(1);
    assert_eq!(rig.control.regs.p, 0x0000);
    rig.load(0x0010, &[storage(Opcode::Jmp, 0x80)]);
    rig.steps(1);
    assert_eq!(rig.control.regs.p, 0x0080);
}

#[test]
fn test_addressing_loop_stops() {
    let mut rig = Rig::new();
    rig.mem.load(0x12, &[0x8012]);
    // LDA* $12
    rig.load(0x100, &[0xC412]);
    match rig.step() {
        Err(stop @ StopReason::AddressingLoop { .. }) => {
            assert_eq!(stop.kind(), StopKind::ADDRLOOP);
        }
        other => panic!("expected an addressing loop, got {other:?}"),
    }
    assert_eq!(rig.control.regs.p, 0x100);
}

#[test]
fn test_selective_stop() {
    let mut rig = Rig::new();
    rig.load(0x100, &[special(DecodedInstruction::SelectiveStop), NOP]);
    rig.steps(1);
    assert_eq!(rig.control.regs.p, 0x101);

    let mut config = *rig.control.configuration();
    config.selective_stop = true;
    rig.control.set_configuration(config);
    rig.load(0x100, &[special(DecodedInstruction::SelectiveStop)]);
    assert!(matches!(rig.step(), Err(StopReason::SelectiveStop { .. })));
    assert_eq!(rig.control.regs.p, 0x101);
}

#[test]
fn test_enhanced_escape() {
    // In the basic instruction set the Δ of SLS is ignored.
    let mut rig = Rig::new();
    rig.load(0x100, &[0x0005]);
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));

    let mut rig = Rig::with_config(
        ControlConfiguration {
            instruction_set: InstructionSet::Enhanced,
            ..ControlConfiguration::default()
        },
        MemorySize::K32,
    );
    rig.load(0x100, &[0x0005]);
    assert!(matches!(
        rig.step(),
        Err(StopReason::UnimplementedInstruction { .. })
    ));
    assert_eq!(rig.control.regs.p, 0x100);
}

#[test]
fn test_rtj_defers_interrupts_for_one_instruction() {
    let mut rig = Rig::new();
    rig.load(0x200, &[storage(Opcode::Rtj, 0x40)]);
    rig.mem.load(0x41, &[NOP, NOP]);
    rig.enable_interrupts(0x0001);

    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
    assert_eq!(rig.mem.read(0x40), 0x201);
    assert_eq!(rig.control.regs.p, 0x41);
    // The interrupt becomes pending before the next fetch ...
    rig.control.interrupts.raise_internal();
    // ... but is not taken until after the next instruction.
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
    assert_eq!(rig.control.regs.p, 0x42);
    assert_eq!(rig.step(), Ok(StepOutcome::InterruptTaken(0)));
    assert_eq!(rig.mem.read(save_slot(0)), 0x42);
    assert_eq!(rig.control.regs.p, vector(0));
}

#[test]
fn test_interrupt_is_taken_immediately_without_rtj() {
    let mut rig = Rig::new();
    rig.load(0x200, &[NOP]);
    rig.enable_interrupts(0x0001);
    rig.control.interrupts.raise_internal();
    assert_eq!(rig.step(), Ok(StepOutcome::InterruptTaken(0)));
    assert!(!rig.control.interrupts.internal_pending());
}

#[test]
fn test_ein_latency() {
    let mut rig = Rig::new();
    rig.load(0x600, &[EIN, NOP, NOP]);
    rig.control.regs.m = 0x0001;
    rig.control.interrupts.raise_internal();
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
    assert!(rig.control.regs.interrupts_enabled);
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
    assert_eq!(rig.step(), Ok(StepOutcome::InterruptTaken(0)));
    assert_eq!(rig.mem.read(save_slot(0)), 0x602);
}

#[test]
fn test_iin_and_mask_block_interrupts() {
    let mut rig = Rig::new();
    rig.load(0x600, &[special(DecodedInstruction::InhibitInterrupts), NOP]);
    rig.enable_interrupts(0x0002);
    rig.control.interrupts.raise_internal();
    // Level 0 is masked off.
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
    assert!(!rig.control.regs.interrupts_enabled);
    rig.control.regs.m = 0xFFFF;
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
}

#[test]
fn test_lowest_level_is_taken_first() {
    let mut rig = Rig::new();
    for equipment in [7, 3] {
        let mut device = Echo::new();
        device.interrupting = true;
        rig.devices
            .attach(Box::new(device), Some(Placement::equipment(equipment)))
            .expect(COMPLAIN);
    }
    rig.load(0x500, &[NOP]);
    rig.enable_interrupts(0x0088);
    assert_eq!(rig.step(), Ok(StepOutcome::InterruptTaken(3)));
    assert_eq!(rig.control.regs.p, vector(3));
    assert_eq!(rig.control.regs.level, 1);
    assert!(!rig.control.regs.interrupts_enabled);
    // Only level 7 is enabled now.
    rig.control.regs.interrupts_enabled = true;
    rig.control.regs.m = 0x0080;
    assert_eq!(rig.step(), Ok(StepOutcome::InterruptTaken(7)));
    assert_eq!(rig.control.regs.level, 2);
}

#[test]
fn test_interrupt_round_trip_preserves_overflow() {
    let mut rig = Rig::new();
    rig.load(0x700, &[NOP]);
    rig.mem.load(vector(0), &[special(DecodedInstruction::ExitInterrupt(0))]);
    rig.control.regs.overflow = true;
    rig.enable_interrupts(0x0001);
    rig.control.interrupts.raise_internal();
    assert_eq!(rig.step(), Ok(StepOutcome::InterruptTaken(0)));
    assert_eq!(rig.mem.read(save_slot(0)), 0x8700);
    rig.control.regs.overflow = false;
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
    assert_eq!(rig.control.regs.p, 0x700);
    assert!(rig.control.regs.overflow);
    assert!(rig.control.regs.interrupts_enabled);
    assert_eq!(rig.control.regs.level, 0);
    // The internal interrupt was cleared on entry.
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
}

#[test]
fn test_invalid_exit() {
    let mut rig = Rig::new();
    rig.load(0x100, &[special(DecodedInstruction::ExitInterrupt(6))]);
    match rig.step() {
        Err(StopReason::InvalidInterruptExit { offset, .. }) => assert_eq!(offset, 6),
        other => panic!("expected an invalid exit, got {other:?}"),
    }
    assert_eq!(rig.control.regs.p, 0x100);
}

fn protected_rig() -> Rig {
    let mut rig = Rig::new();
    rig.mem.set_protect_switch(true);
    rig
}

#[test]
fn test_protected_store_faults() {
    let mut rig = protected_rig();
    rig.mem.load(0x60, &[0x5555]);
    rig.mem.set_protect_bit(0x60, true);
    rig.load(0x300, &[storage(Opcode::Sta, 0x60), NOP]);
    rig.control.regs.a = 0x1111;
    rig.enable_interrupts(0x0001);

    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
    assert_eq!(rig.mem.read(0x60), 0x5555);
    assert!(rig.control.regs.protect_fault);
    assert_eq!(rig.control.regs.p, 0x301);
    assert_eq!(rig.step(), Ok(StepOutcome::InterruptTaken(0)));
    assert_eq!(rig.control.regs.p, vector(0));
}

#[test]
fn test_protected_program_may_store() {
    let mut rig = protected_rig();
    rig.mem.set_protect_bit(0x60, true);
    rig.load(0x300, &[storage(Opcode::Sta, 0x60)]);
    rig.mem.set_protect_bit(0x300, true);
    rig.control.regs.a = 0x1111;
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
    assert_eq!(rig.mem.read(0x60), 0x1111);
    assert!(!rig.control.regs.protect_fault);
}

#[test]
fn test_boundary_fault() {
    let mut rig = protected_rig();
    rig.load(0x400, &[NOP, 0xC000, 0x0050, NOP]);
    rig.mem.set_protect_bit(0x401, true);
    rig.mem.set_protect_bit(0x402, true);
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
    assert_eq!(rig.step(), Ok(StepOutcome::ProtectFault));
    // P is left at the second word of the two-word instruction.
    assert_eq!(rig.control.regs.p, 0x402);
    assert!(rig.control.regs.protect_fault);
    assert!(rig.control.interrupts.internal_pending());
}

#[test]
fn test_boundary_fault_one_word() {
    let mut rig = protected_rig();
    rig.load(0x400, &[NOP, NOP]);
    rig.mem.set_protect_bit(0x401, true);
    rig.steps(1);
    assert_eq!(rig.step(), Ok(StepOutcome::ProtectFault));
    assert_eq!(rig.control.regs.p, 0x401);
    // Skip on protect fault tests and clears the indicator.
    rig.mem.set_protect_switch(false);
    rig.load(0x500, &[skip(SkipCondition::Spf, 1)]);
    rig.steps(1);
    assert_eq!(rig.control.regs.p, 0x502);
    assert!(!rig.control.regs.protect_fault);
}

#[test]
fn test_set_protect_bit_is_privileged() {
    let mut rig = protected_rig();
    rig.load(0x300, &[SPB]);
    rig.control.regs.q = 0x0070;
    rig.steps(1);
    assert!(!rig.mem.is_protected(0x70));
    assert!(rig.control.regs.protect_fault);

    let mut rig = Rig::new();
    rig.load(0x300, &[SPB, special(DecodedInstruction::ClearProtect)]);
    rig.control.regs.q = 0x0070;
    rig.steps(1);
    assert!(rig.mem.is_protected(0x70));
    rig.steps(1);
    assert!(!rig.mem.is_protected(0x70));
}

fn inp(reject_delta: u8) -> u16 {
    special(DecodedInstruction::Input { reject_delta })
}

fn out(reject_delta: u8) -> u16 {
    special(DecodedInstruction::Output { reject_delta })
}

#[test]
fn test_io_reply() {
    let mut rig = Rig::new();
    rig.devices
        .attach(Box::new(Echo::new()), Some(Placement::equipment(5)))
        .expect(COMPLAIN);
    rig.load(0x500, &[inp(0x10), out(0x10)]);
    rig.control.regs.q = IoRequest::encode(0, 5, 0, 0);
    rig.steps(1);
    assert_eq!(rig.control.regs.a, 0xABCD);
    assert_eq!(rig.control.regs.p, 0x501);
    rig.steps(1);
    assert_eq!(rig.control.regs.p, 0x502);
}

#[test]
fn test_io_internal_reject_takes_reject_exit() {
    let config = ControlConfiguration {
        stop_on_reject: true,
        ..ControlConfiguration::default()
    };
    let mut rig = Rig::with_config(config, MemorySize::K32);
    rig.load(0x500, &[inp(0x04)]);
    rig.control.regs.q = IoRequest::encode(0, 9, 0, 0);
    rig.control.regs.a = 0x1234;
    // Nothing at equipment address 9: no stop, even with stop on reject.
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
    assert_eq!(rig.control.regs.p, 0x504);
    assert_eq!(rig.control.regs.a, 0x1234);

    // A negative displacement goes backwards.
    rig.load(0x500, &[NOP, out(0xFE)]);
    rig.steps(2);
    assert_eq!(rig.control.regs.p, 0x500);
}

#[test]
fn test_device_reject() {
    let mut rig = Rig::new();
    let mut device = Echo::new();
    device.rejecting = true;
    rig.devices
        .attach(Box::new(device), Some(Placement::equipment(5)))
        .expect(COMPLAIN);
    rig.load(0x500, &[out(0x03)]);
    rig.control.regs.q = IoRequest::encode(0, 5, 0, 0);
    rig.steps(1);
    assert_eq!(rig.control.regs.p, 0x503);

    let mut config = *rig.control.configuration();
    config.stop_on_reject = true;
    rig.control.set_configuration(config);
    rig.load(0x500, &[out(0x03)]);
    match rig.step() {
        Err(StopReason::IoReject { q, .. }) => assert_eq!(q, IoRequest::encode(0, 5, 0, 0)),
        other => panic!("expected a reject stop, got {other:?}"),
    }
    assert_eq!(rig.control.regs.p, 0x500);
}

#[test]
fn test_protected_device_faults() {
    let mut rig = protected_rig();
    let mut device = Echo::new();
    device.registers.protected = true;
    rig.devices
        .attach(Box::new(device), Some(Placement::equipment(5)))
        .expect(COMPLAIN);
    rig.load(0x500, &[inp(0x02)]);
    rig.control.regs.q = IoRequest::encode(0, 5, 0, 0);
    rig.enable_interrupts(0x0001);
    rig.steps(1);
    assert_eq!(rig.control.regs.p, 0x502);
    assert!(rig.control.regs.protect_fault);
    assert_eq!(rig.step(), Ok(StepOutcome::InterruptTaken(0)));
}

#[test]
fn test_character_mode_saved_per_level() {
    let config = ControlConfiguration {
        instruction_set: InstructionSet::Enhanced,
        character_addressing: true,
        ..ControlConfiguration::default()
    };
    let mut rig = Rig::with_config(config, MemorySize::K32);
    rig.load(0x100, &[NOP]);
    rig.mem.load(vector(0), &[special(DecodedInstruction::ExitInterrupt(0))]);
    rig.control.regs.character_mode = true;
    rig.enable_interrupts(0x0001);
    rig.control.interrupts.raise_internal();
    rig.steps(1);
    assert!(!rig.control.regs.character_mode);
    rig.steps(1);
    assert!(rig.control.regs.character_mode);
}

#[test]
fn test_interrupt_round_trip_64k() {
    let config = ControlConfiguration {
        addressing: AddressingMode::Addr64K,
        ..ControlConfiguration::default()
    };
    let mut rig = Rig::with_config(config, MemorySize::K64);
    rig.load(0xC123, &[NOP]);
    rig.mem.load(vector(0), &[special(DecodedInstruction::ExitInterrupt(0))]);
    rig.control.regs.overflow = true;
    rig.enable_interrupts(0x0001);
    rig.control.interrupts.raise_internal();
    assert_eq!(rig.step(), Ok(StepOutcome::InterruptTaken(0)));
    // P is saved whole; overflow is not folded into the save slot.
    assert_eq!(rig.mem.read(save_slot(0)), 0xC123);
    assert!(rig.control.regs.overflow);
    rig.control.regs.overflow = false;
    assert_eq!(rig.step(), Ok(StepOutcome::Executed));
    assert_eq!(rig.control.regs.p, 0xC123);
    // Exit does not restore the overflow indicator.
    assert!(!rig.control.regs.overflow);
    assert!(rig.control.regs.interrupts_enabled);
}

#[test]
fn test_master_clear() {
    let mut rig = Rig::new();
    rig.control.regs.a = 5;
    rig.control.regs.level = 3;
    rig.control.interrupts.raise_internal();
    rig.control.master_clear();
    assert_eq!(rig.control.regs, super::ControlRegisters::new());
    assert_eq!(rig.control.pending_interrupts(&rig.devices), 0);
}
