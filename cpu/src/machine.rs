use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{event, span, Level};

use base::prelude::{AddressingMode, InstructionSet};

use super::context::{Context, Tick};
use super::control::{ControlConfiguration, ControlRegisters, ControlUnit, StepOutcome};
use super::io::{Device, DeviceManager, DeviceReport, Placement};
use super::memory::{MemoryConfiguration, MemorySize, MemoryUnit};
use super::stop::StopReason;
use super::types::{ConfigurationError, DeviceId};

/// The configuration of the whole machine.  Switch settings
/// (protect, selective stop and skip, stop on reject) may also be
/// changed while the machine is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct MachineConfiguration {
    pub memory: MemorySize,
    pub addressing: AddressingMode,
    pub instruction_set: InstructionSet,
    pub character_addressing: bool,
    pub protect_switch: bool,
    pub selective_stop: bool,
    pub selective_skip: bool,
    pub stop_on_reject: bool,
}

impl MachineConfiguration {
    /// # Errors
    ///
    /// `IncompatibleOptions` for combinations the hardware could not
    /// be built with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.memory == MemorySize::K64 && self.addressing != AddressingMode::Addr64K {
            return Err(ConfigurationError::IncompatibleOptions(
                "65K words of memory need 64K addressing mode".to_string(),
            ));
        }
        if self.character_addressing && self.instruction_set != InstructionSet::Enhanced {
            return Err(ConfigurationError::IncompatibleOptions(
                "character addressing needs the enhanced instruction set".to_string(),
            ));
        }
        Ok(())
    }

    fn control(&self) -> ControlConfiguration {
        ControlConfiguration {
            addressing: self.addressing,
            instruction_set: self.instruction_set,
            character_addressing: self.character_addressing,
            selective_stop: self.selective_stop,
            selective_skip: self.selective_skip,
            stop_on_reject: self.stop_on_reject,
        }
    }
}

/// Why [`Machine::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Stopped(StopReason),
    LimitReached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineStatus {
    pub now: Tick,
    pub configuration: MachineConfiguration,
    pub registers: ControlRegisters,
    pub pending_interrupts: u16,
    pub next_callback_due: Option<Tick>,
    pub breakpoints: Vec<u16>,
    pub devices: Vec<DeviceReport>,
}

/// The machine: control unit, memory and devices, and the passage of
/// simulated time.
#[derive(Debug)]
pub struct Machine {
    config: MachineConfiguration,
    control: ControlUnit,
    mem: MemoryUnit,
    devices: DeviceManager,
    now: Tick,
    breakpoints: BTreeSet<u16>,
    /// Set when the machine stopped at a breakpoint, so that the next
    /// step executes the instruction there.
    resume_past_breakpoint: bool,
}

impl Machine {
    /// # Errors
    ///
    /// Fails when the configuration is inconsistent.
    pub fn new(config: MachineConfiguration) -> Result<Machine, ConfigurationError> {
        config.validate()?;
        let control = ControlUnit::new(config.control());
        event!(Level::DEBUG, "initial control unit state is {:?}", &control);
        let mut mem = MemoryUnit::new(&MemoryConfiguration {
            size: config.memory,
        });
        mem.set_protect_switch(config.protect_switch);
        Ok(Machine {
            config,
            control,
            mem,
            devices: DeviceManager::new(),
            now: 0,
            breakpoints: BTreeSet::new(),
            resume_past_breakpoint: false,
        })
    }

    #[must_use]
    pub fn configuration(&self) -> &MachineConfiguration {
        &self.config
    }

    fn update_switches(&mut self) {
        self.control.set_configuration(self.config.control());
        self.mem.set_protect_switch(self.config.protect_switch);
    }

    pub fn set_protect_switch(&mut self, on: bool) {
        self.config.protect_switch = on;
        self.update_switches();
    }

    pub fn set_selective_stop(&mut self, on: bool) {
        self.config.selective_stop = on;
        self.update_switches();
    }

    pub fn set_selective_skip(&mut self, on: bool) {
        self.config.selective_skip = on;
        self.update_switches();
    }

    pub fn set_stop_on_reject(&mut self, on: bool) {
        self.config.stop_on_reject = on;
        self.update_switches();
    }

    #[must_use]
    pub fn now(&self) -> Tick {
        self.now
    }

    #[must_use]
    pub fn registers(&self) -> &ControlRegisters {
        &self.control.regs
    }

    pub fn registers_mut(&mut self) -> &mut ControlRegisters {
        &mut self.control.regs
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryUnit {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut MemoryUnit {
        &mut self.mem
    }

    #[must_use]
    pub fn devices(&self) -> &DeviceManager {
        &self.devices
    }

    /// # Errors
    ///
    /// See [`DeviceManager::attach`].
    pub fn attach(
        &mut self,
        device: Box<dyn Device>,
        placement: Option<Placement>,
    ) -> Result<DeviceId, ConfigurationError> {
        self.devices.attach(device, placement)
    }

    /// # Errors
    ///
    /// See [`DeviceManager::detach`].
    pub fn detach(&mut self, id: DeviceId) -> Result<Box<dyn Device>, ConfigurationError> {
        self.devices.detach(id)
    }

    /// # Errors
    ///
    /// See [`DeviceManager::set_placement`].
    pub fn set_placement(
        &mut self,
        id: DeviceId,
        placement: Option<Placement>,
    ) -> Result<(), ConfigurationError> {
        self.devices.set_placement(id, placement)
    }

    /// # Errors
    ///
    /// See [`DeviceManager::rebuild_routing_table`].
    pub fn rebuild_routing_table(&mut self) -> Result<(), ConfigurationError> {
        self.devices.rebuild_routing_table()
    }

    pub fn rebuild_pending(&mut self) -> u16 {
        self.devices.rebuild_pending()
    }

    /// # Errors
    ///
    /// `NoSuchDevice` when `id` is not attached.
    pub fn raise_external(&mut self, id: DeviceId) -> Result<(), ConfigurationError> {
        self.devices.raise_external(id)
    }

    /// All pending interrupts (internal and external).
    #[must_use]
    pub fn pending_interrupts(&self) -> u16 {
        self.control.pending_interrupts(&self.devices)
    }

    pub fn reset_devices(&mut self) {
        self.devices.reset_devices(self.now, &mut self.mem);
    }

    /// Reset the processor and every device.  Memory is unchanged.
    pub fn master_clear(&mut self) {
        event!(Level::INFO, "master clear");
        self.control.master_clear();
        self.resume_past_breakpoint = false;
        self.reset_devices();
    }

    pub fn set_breakpoint(&mut self, address: u16) {
        self.breakpoints.insert(address);
    }

    pub fn clear_breakpoint(&mut self, address: u16) -> bool {
        self.breakpoints.remove(&address)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = u16> + '_ {
        self.breakpoints.iter().copied()
    }

    /// Perform one step of the control unit, then run any device
    /// callbacks which have fallen due.
    ///
    /// # Errors
    ///
    /// Returns the reason the machine stopped.  After a
    /// `Breakpoint` stop, the next call executes the instruction at
    /// the breakpoint.
    pub fn step(&mut self) -> Result<StepOutcome, StopReason> {
        let p = self.control.regs.p;
        if self.breakpoints.contains(&p) && !self.resume_past_breakpoint {
            event!(Level::INFO, "breakpoint at {p:#06X}");
            self.resume_past_breakpoint = true;
            return Err(StopReason::Breakpoint { address: p });
        }
        self.resume_past_breakpoint = false;
        let ctx = Context::new(self.now);
        let outcome = self.control.step(&ctx, &mut self.mem, &mut self.devices)?;
        self.now += 1;
        self.devices.fire_due(self.now, &mut self.mem);
        Ok(outcome)
    }

    /// Step until the machine stops or `limit` steps have been taken.
    pub fn run(&mut self, limit: u64) -> RunOutcome {
        let span = span!(Level::INFO, "run", start = self.now);
        let _enter = span.enter();
        for _ in 0..limit {
            if let Err(stop) = self.step() {
                return RunOutcome::Stopped(stop);
            }
        }
        event!(Level::INFO, "instruction limit of {limit} reached");
        RunOutcome::LimitReached
    }

    #[must_use]
    pub fn device_state(&self) -> Vec<DeviceReport> {
        self.devices.state_dump()
    }

    #[must_use]
    pub fn status(&self) -> MachineStatus {
        MachineStatus {
            now: self.now,
            configuration: self.config,
            registers: self.control.regs.clone(),
            pending_interrupts: self.pending_interrupts(),
            next_callback_due: self.devices.next_due(),
            breakpoints: self.breakpoints.iter().copied().collect(),
            devices: self.device_state(),
        }
    }
}
