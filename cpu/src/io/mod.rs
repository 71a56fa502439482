//! I/O dispatch: routing INP and OUT instructions to device
//! controllers, and computing the external interrupt lines.
//!
//! ## Routing
//!
//! The equipment address field of Q selects one of 16 routing table
//! entries.  Address 0 is reserved for internal interrupts and never
//! holds a device.  Address 1 is multiplexed by the station field
//! between up to five devices.  A non-zero channel field sends the
//! request through one of the three buffered data channels to the
//! device at the equipment address; the target must accept channel
//! transfers.
//!
//! A request which cannot be routed gets an *internal reject*: no
//! device sees it.  A device may also reject a request itself; only
//! such a device-issued reject can stop the machine (when
//! stop-on-reject is set).
//!
//! ## Interrupts
//!
//! Device interrupts are level-triggered.  The pending mask is never
//! updated incrementally; [`DeviceManager::rebuild_pending`] recomputes
//! it from every routed device after anything which might have
//! changed a device's state.
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};

use serde::Serialize;
use tracing::{event, span, Level};

use base::prelude::*;

use crate::context::Tick;
use crate::memory::MemoryUnit;
use crate::types::{ConfigurationError, DeviceId};

mod registers;
mod schedule;

pub use registers::*;
pub use schedule::ScheduleKey;
use schedule::Scheduler;

/// A device refuses an I/O request (the program should try again).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reject;

/// What a device may do to the rest of the machine while handling a
/// request or a scheduled callback.
pub struct IoContext<'a> {
    pub now: Tick,
    pub memory: &'a mut MemoryUnit,
    scheduler: &'a mut Scheduler,
    device: DeviceId,
}

impl IoContext<'_> {
    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    #[must_use]
    pub fn protect_switch(&self) -> bool {
        self.memory.protect_switch()
    }

    /// Arrange for `service(unit)` to be called `delay` ticks from
    /// now, replacing any callback already pending for the unit.
    pub fn schedule(&mut self, unit: u8, delay: Tick) {
        self.scheduler.schedule(
            ScheduleKey {
                device: self.device,
                unit,
            },
            self.now + delay,
        );
    }

    pub fn cancel(&mut self, unit: u8) -> bool {
        self.scheduler.cancel(&ScheduleKey {
            device: self.device,
            unit,
        })
    }

    pub fn cancel_all(&mut self) {
        self.scheduler.cancel_device(self.device);
    }

    #[must_use]
    pub fn is_scheduled(&self, unit: u8) -> bool {
        self.scheduler.is_scheduled(&ScheduleKey {
            device: self.device,
            unit,
        })
    }
}

/// A snapshot of a device for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStateDump {
    pub label: String,
    pub registers: DeviceRegisters,
    /// Device-specific state, by name.
    pub details: BTreeMap<String, String>,
}

/// A device controller.
///
/// The provided methods implement the standard behaviour: the
/// director/status register pair, clear controller and reset.  A
/// device which only needs those has to implement just `name`,
/// `registers` and `registers_mut`, and usually `read` or `write` for
/// its data register.
pub trait Device {
    fn name(&self) -> String;
    fn registers(&self) -> &DeviceRegisters;
    fn registers_mut(&mut self) -> &mut DeviceRegisters;

    /// Decide whether to reject the request before any register is
    /// touched.
    fn reject(&self, _request: &IoRequest) -> bool {
        false
    }

    /// INP.  The default implementation returns the status word for
    /// the director register and rejects reads of the data register.
    fn read(&mut self, ctx: &mut IoContext<'_>, request: &IoRequest) -> Result<u16, Reject> {
        if request.selects_director() {
            Ok(self.registers().status_word(ctx.protect_switch()))
        } else {
            Err(Reject)
        }
    }

    /// OUT.  The default implementation performs director functions
    /// and rejects writes to the data register.
    fn write(
        &mut self,
        ctx: &mut IoContext<'_>,
        request: &IoRequest,
        value: u16,
    ) -> Result<(), Reject> {
        if request.selects_director() {
            self.director_function(ctx, value);
            Ok(())
        } else {
            Err(Reject)
        }
    }

    fn director_function(&mut self, ctx: &mut IoContext<'_>, value: u16) {
        if value & DIR_CLEAR_CONTROLLER != 0 {
            self.clear_controller(ctx);
        }
        self.registers_mut()
            .apply_director(value & !DIR_CLEAR_CONTROLLER);
    }

    /// Clear controller; devices override this when it differs from
    /// a power-on reset.
    fn clear_controller(&mut self, ctx: &mut IoContext<'_>) {
        ctx.cancel_all();
        self.registers_mut().clear_controller();
    }

    fn reset(&mut self, ctx: &mut IoContext<'_>) {
        ctx.cancel_all();
        self.registers_mut().reset();
    }

    /// True when the device accepts transfers through a buffered data
    /// channel.
    fn supports_buffered(&self) -> bool {
        false
    }

    fn buffered_read(
        &mut self,
        _ctx: &mut IoContext<'_>,
        _request: &IoRequest,
    ) -> Result<u16, Reject> {
        Err(Reject)
    }

    fn buffered_write(
        &mut self,
        _ctx: &mut IoContext<'_>,
        _request: &IoRequest,
        _value: u16,
    ) -> Result<(), Reject> {
        Err(Reject)
    }

    /// For devices whose interrupt condition is not the interrupt
    /// status bit.
    fn nonstandard_interrupt(&self) -> Option<bool> {
        None
    }

    /// Called when a callback scheduled through
    /// [`IoContext::schedule`] falls due.
    fn service(&mut self, _ctx: &mut IoContext<'_>, _unit: u8) {}

    fn state_dump(&self, label: &str) -> DeviceStateDump {
        DeviceStateDump {
            label: label.to_string(),
            registers: self.registers().clone(),
            details: BTreeMap::new(),
        }
    }
}

/// Where a device is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub equipment: u8,
    /// Set for the devices multiplexed on equipment address 1.
    pub station: Option<u8>,
    /// Set for buffered data channel controllers.  These are also
    /// addressed directly at their equipment address.
    pub channel: Option<u8>,
}

impl Placement {
    #[must_use]
    pub fn equipment(equipment: u8) -> Placement {
        Placement {
            equipment,
            station: None,
            channel: None,
        }
    }

    #[must_use]
    pub fn station(station: u8) -> Placement {
        Placement {
            equipment: STATION_EQUIPMENT,
            station: Some(station),
            channel: None,
        }
    }

    #[must_use]
    pub fn channel(channel: u8, equipment: u8) -> Placement {
        Placement {
            equipment,
            station: None,
            channel: Some(channel),
        }
    }

    /// # Errors
    ///
    /// Fails when an address is out of range or equipment address 1
    /// is used without a station (or a station without it).
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.equipment == 0 || self.equipment > 15 {
            return Err(ConfigurationError::InvalidEquipmentAddress(self.equipment));
        }
        match self.station {
            Some(s) if s >= STATIONS || self.equipment != STATION_EQUIPMENT => {
                return Err(ConfigurationError::InvalidStation(s));
            }
            None if self.equipment == STATION_EQUIPMENT => {
                return Err(ConfigurationError::IncompatibleOptions(format!(
                    "equipment address {STATION_EQUIPMENT} is multiplexed, so a station is required"
                )));
            }
            _ => (),
        }
        match self.channel {
            Some(c) if c == 0 || c > CHANNELS => Err(ConfigurationError::InvalidChannel(c)),
            _ => Ok(()),
        }
    }
}

/// Why a request was rejected without reaching a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InternalRejectReason {
    NoDevice,
    NoChannel,
    /// The target of a channel request does not do channel transfers.
    ChannelNotPermitted,
    /// An unprotected instruction addressed a protected device.
    ProtectViolation,
}

/// The outcome of dispatching an I/O request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// The device accepted the request; for input, the word read.
    Reply(Option<u16>),
    /// The device rejected the request.
    Reject,
    InternalReject(InternalRejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    NotPresent,
    Device(DeviceId),
    Stations,
}

const EQUIPMENT_ADDRESSES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
struct RoutingTable {
    routes: [Route; EQUIPMENT_ADDRESSES],
    stations: [Option<DeviceId>; STATIONS as usize],
    channels: [Option<DeviceId>; CHANNELS as usize],
}

impl RoutingTable {
    fn empty() -> RoutingTable {
        RoutingTable {
            routes: [Route::NotPresent; EQUIPMENT_ADDRESSES],
            stations: [None; STATIONS as usize],
            channels: [None; CHANNELS as usize],
        }
    }

    fn lookup(&self, request: &IoRequest) -> Option<DeviceId> {
        match self.routes[usize::from(request.equipment & 0xF)] {
            Route::NotPresent => None,
            Route::Device(id) => Some(id),
            Route::Stations => request
                .station
                .and_then(|s| self.stations.get(usize::from(s)).copied().flatten()),
        }
    }

    fn channel(&self, channel: u8) -> Option<DeviceId> {
        usize::from(channel)
            .checked_sub(1)
            .and_then(|i| self.channels.get(i).copied().flatten())
    }

    fn routed_devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.routes
            .iter()
            .filter_map(|r| match r {
                Route::Device(id) => Some(*id),
                _ => None,
            })
            .chain(self.stations.iter().flatten().copied())
            .chain(self.channels.iter().flatten().copied())
    }
}

pub struct AttachedDevice {
    inner: Box<dyn Device>,
    placement: Option<Placement>,
}

impl AttachedDevice {
    #[must_use]
    pub fn name(&self) -> String {
        self.inner.name()
    }

    #[must_use]
    pub fn placement(&self) -> Option<Placement> {
        self.placement
    }

    #[must_use]
    pub fn registers(&self) -> &DeviceRegisters {
        self.inner.registers()
    }

    pub fn registers_mut(&mut self) -> &mut DeviceRegisters {
        self.inner.registers_mut()
    }
}

impl Debug for AttachedDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("AttachedDevice")
            .field("inner", &format_args!("<device: {}>", self.name()))
            .field("placement", &self.placement)
            .finish()
    }
}

/// A device, with its identity and placement, for status reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    pub id: DeviceId,
    pub name: String,
    pub placement: Option<Placement>,
    pub state: DeviceStateDump,
}

/// Owns the attached devices, the routing table and the scheduler.
#[derive(Debug)]
pub struct DeviceManager {
    devices: BTreeMap<DeviceId, AttachedDevice>,
    next_id: usize,
    routing: RoutingTable,
    pending: u16,
    scheduler: Scheduler,
}

impl DeviceManager {
    #[must_use]
    pub fn new() -> DeviceManager {
        DeviceManager {
            devices: BTreeMap::new(),
            next_id: 0,
            routing: RoutingTable::empty(),
            pending: 0,
            scheduler: Scheduler::new(),
        }
    }

    #[must_use]
    pub fn get(&self, id: DeviceId) -> Option<&AttachedDevice> {
        self.devices.get(&id)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut AttachedDevice> {
        self.devices.get_mut(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.keys().copied()
    }

    /// Attach a device.  A device without a placement is attached but
    /// not addressable.
    ///
    /// # Errors
    ///
    /// Fails when the placement is invalid or already occupied; the
    /// device is then not attached.
    pub fn attach(
        &mut self,
        device: Box<dyn Device>,
        placement: Option<Placement>,
    ) -> Result<DeviceId, ConfigurationError> {
        if let Some(p) = placement.as_ref() {
            p.validate()?;
        }
        let id = DeviceId(self.next_id);
        let name = device.name();
        self.devices.insert(
            id,
            AttachedDevice {
                inner: device,
                placement,
            },
        );
        if let Err(e) = self.rebuild_routing_table() {
            self.devices.remove(&id);
            event!(Level::WARN, "cannot attach {name}: {e}");
            return Err(e);
        }
        self.next_id += 1;
        event!(Level::INFO, "attached {name} as {id} at {placement:?}");
        self.rebuild_pending();
        Ok(id)
    }

    /// Detach a device, cancelling its scheduled callbacks.
    ///
    /// # Errors
    ///
    /// `NoSuchDevice` when `id` is not attached.
    pub fn detach(&mut self, id: DeviceId) -> Result<Box<dyn Device>, ConfigurationError> {
        let cancelled = self.scheduler.cancel_device(id);
        let removed = self
            .devices
            .remove(&id)
            .ok_or(ConfigurationError::NoSuchDevice(id))?;
        event!(
            Level::INFO,
            "detached {} ({id}), cancelling {cancelled} callbacks",
            removed.name()
        );
        // Removing a device cannot create a conflict.
        self.rebuild_routing_table()?;
        self.rebuild_pending();
        Ok(removed.inner)
    }

    /// Move a device to a new placement (or make it unaddressable).
    ///
    /// # Errors
    ///
    /// Fails when the device is unknown or the placement invalid or
    /// occupied; the device then keeps its previous placement.
    pub fn set_placement(
        &mut self,
        id: DeviceId,
        placement: Option<Placement>,
    ) -> Result<(), ConfigurationError> {
        if let Some(p) = placement.as_ref() {
            p.validate()?;
        }
        let attached = self
            .devices
            .get_mut(&id)
            .ok_or(ConfigurationError::NoSuchDevice(id))?;
        let previous = std::mem::replace(&mut attached.placement, placement);
        if let Err(e) = self.rebuild_routing_table() {
            if let Some(attached) = self.devices.get_mut(&id) {
                attached.placement = previous;
            }
            return Err(e);
        }
        self.rebuild_pending();
        Ok(())
    }

    fn occupant(&self, id: DeviceId) -> String {
        self.devices
            .get(&id)
            .map(|d| d.name())
            .unwrap_or_else(|| id.to_string())
    }

    fn build_routing_table(&self) -> Result<RoutingTable, ConfigurationError> {
        let mut table = RoutingTable::empty();
        for (id, attached) in self.devices.iter() {
            let Some(p) = attached.placement else {
                continue;
            };
            if let Some(channel) = p.channel {
                let slot = &mut table.channels[usize::from(channel - 1)];
                if let Some(occupant) = slot {
                    return Err(ConfigurationError::ChannelInUse {
                        channel,
                        occupant: self.occupant(*occupant),
                    });
                }
                *slot = Some(*id);
            }
            let eq = usize::from(p.equipment);
            match (p.station, table.routes[eq]) {
                (Some(station), Route::NotPresent | Route::Stations) => {
                    table.routes[eq] = Route::Stations;
                    let slot = &mut table.stations[usize::from(station)];
                    if let Some(occupant) = slot {
                        return Err(ConfigurationError::EquipmentInUse {
                            equipment: p.equipment,
                            station: Some(station),
                            occupant: self.occupant(*occupant),
                        });
                    }
                    *slot = Some(*id);
                }
                (None, Route::NotPresent) => {
                    table.routes[eq] = Route::Device(*id);
                }
                (_, Route::Device(occupant)) => {
                    return Err(ConfigurationError::EquipmentInUse {
                        equipment: p.equipment,
                        station: p.station,
                        occupant: self.occupant(occupant),
                    });
                }
                (None, Route::Stations) => {
                    return Err(ConfigurationError::EquipmentInUse {
                        equipment: p.equipment,
                        station: None,
                        occupant: "stations".to_string(),
                    });
                }
            }
        }
        Ok(table)
    }

    /// Recompute the routing table from the device placements.
    ///
    /// # Errors
    ///
    /// Fails (leaving the previous table in place) when two devices
    /// claim the same address.
    pub fn rebuild_routing_table(&mut self) -> Result<(), ConfigurationError> {
        let table = self.build_routing_table()?;
        if table != self.routing {
            event!(Level::INFO, "routing table rebuilt");
        }
        self.routing = table;
        Ok(())
    }

    /// The interrupt line of a device: the bit for its equipment
    /// address if it is interrupting, else zero.
    #[must_use]
    pub fn query_interrupt_bit(&self, id: DeviceId) -> u16 {
        match self.devices.get(&id) {
            Some(AttachedDevice {
                inner,
                placement: Some(p),
            }) => {
                let interrupting = inner
                    .nonstandard_interrupt()
                    .unwrap_or_else(|| inner.registers().interrupting());
                if interrupting {
                    1 << p.equipment
                } else {
                    0
                }
            }
            _ => 0,
        }
    }

    /// Recompute the external interrupt lines from the state of every
    /// routed device.
    pub fn rebuild_pending(&mut self) -> u16 {
        let pending = self
            .routing
            .routed_devices()
            .fold(0, |acc, id| acc | self.query_interrupt_bit(id));
        if pending != self.pending {
            event!(
                Level::TRACE,
                "external interrupt lines changed from {:#06X} to {pending:#06X}",
                self.pending
            );
        }
        self.pending = pending;
        pending
    }

    /// The external interrupt lines as of the last rebuild.
    #[must_use]
    pub fn pending(&self) -> u16 {
        self.pending
    }

    /// Raise a device's interrupt, from outside the normal
    /// status-driven mechanism.
    ///
    /// # Errors
    ///
    /// `NoSuchDevice` when `id` is not attached.
    pub fn raise_external(&mut self, id: DeviceId) -> Result<(), ConfigurationError> {
        let attached = self
            .devices
            .get_mut(&id)
            .ok_or(ConfigurationError::NoSuchDevice(id))?;
        let registers = attached.inner.registers_mut();
        if !registers.manages_own_status {
            registers.status |= STATUS_INTERRUPT;
        }
        self.rebuild_pending();
        Ok(())
    }

    /// Power-on reset of every device.
    pub fn reset_devices(&mut self, now: Tick, memory: &mut MemoryUnit) {
        for (id, attached) in self.devices.iter_mut() {
            let mut ctx = IoContext {
                now,
                memory: &mut *memory,
                scheduler: &mut self.scheduler,
                device: *id,
            };
            attached.inner.reset(&mut ctx);
        }
        self.rebuild_pending();
    }

    /// The time of the next scheduled callback.
    #[must_use]
    pub fn next_due(&self) -> Option<Tick> {
        self.scheduler.next_due()
    }

    /// Run every callback which is due at `now`.  Returns the number
    /// of callbacks run.
    pub fn fire_due(&mut self, now: Tick, memory: &mut MemoryUnit) -> usize {
        let mut fired = 0;
        while let Some(key) = self.scheduler.pop_due(now) {
            let Some(attached) = self.devices.get_mut(&key.device) else {
                continue;
            };
            event!(
                Level::TRACE,
                "servicing {} unit {} at {now}",
                key.device,
                key.unit
            );
            let mut ctx = IoContext {
                now,
                memory: &mut *memory,
                scheduler: &mut self.scheduler,
                device: key.device,
            };
            attached.inner.service(&mut ctx, key.unit);
            fired += 1;
        }
        if fired > 0 {
            self.rebuild_pending();
        }
        fired
    }

    fn protect_violation(
        &self,
        id: DeviceId,
        request: &IoRequest,
        protect_switch: bool,
        instruction_protected: bool,
    ) -> bool {
        match self.devices.get(&id) {
            Some(attached) => {
                let regs = attached.inner.registers();
                protect_switch
                    && !instruction_protected
                    && regs.protected
                    && !regs.protect_override
                    && !request.is_status_read()
            }
            None => false,
        }
    }

    fn rejects(&self, id: DeviceId, request: &IoRequest) -> bool {
        self.devices
            .get(&id)
            .is_some_and(|attached| attached.inner.reject(request))
    }

    /// Deliver an INP or OUT request.  `data` is the word to be
    /// written (ignored for input).  The pending interrupt mask is
    /// rebuilt afterwards.
    pub fn dispatch(
        &mut self,
        now: Tick,
        memory: &mut MemoryUnit,
        request: &IoRequest,
        data: u16,
        instruction_protected: bool,
    ) -> Dispatched {
        let span = span!(Level::DEBUG, "dispatch", request = %request);
        let _enter = span.enter();
        let outcome = self.route_and_perform(now, memory, request, data, instruction_protected);
        event!(Level::DEBUG, "outcome: {outcome:?}");
        self.rebuild_pending();
        outcome
    }

    fn route_and_perform(
        &mut self,
        now: Tick,
        memory: &mut MemoryUnit,
        request: &IoRequest,
        data: u16,
        instruction_protected: bool,
    ) -> Dispatched {
        let protect_switch = memory.protect_switch();
        if request.via_channel() {
            let Some(channel) = self.routing.channel(request.channel) else {
                return Dispatched::InternalReject(InternalRejectReason::NoChannel);
            };
            let Some(target) = self.routing.lookup(request) else {
                return Dispatched::InternalReject(InternalRejectReason::NoDevice);
            };
            let buffered = self
                .devices
                .get(&target)
                .is_some_and(|attached| attached.inner.supports_buffered());
            if !buffered {
                return Dispatched::InternalReject(InternalRejectReason::ChannelNotPermitted);
            }
            if self.protect_violation(target, request, protect_switch, instruction_protected) {
                return Dispatched::InternalReject(InternalRejectReason::ProtectViolation);
            }
            if self.rejects(channel, request) || self.rejects(target, request) {
                return Dispatched::Reject;
            }
            self.perform(target, now, memory, request, data, true)
        } else {
            let Some(target) = self.routing.lookup(request) else {
                return Dispatched::InternalReject(InternalRejectReason::NoDevice);
            };
            if self.protect_violation(target, request, protect_switch, instruction_protected) {
                return Dispatched::InternalReject(InternalRejectReason::ProtectViolation);
            }
            if self.rejects(target, request) {
                return Dispatched::Reject;
            }
            self.perform(target, now, memory, request, data, false)
        }
    }

    fn perform(
        &mut self,
        id: DeviceId,
        now: Tick,
        memory: &mut MemoryUnit,
        request: &IoRequest,
        data: u16,
        buffered: bool,
    ) -> Dispatched {
        let Some(attached) = self.devices.get_mut(&id) else {
            return Dispatched::InternalReject(InternalRejectReason::NoDevice);
        };
        let mut ctx = IoContext {
            now,
            memory,
            scheduler: &mut self.scheduler,
            device: id,
        };
        let device = &mut attached.inner;
        let result = match (request.direction, buffered) {
            (Direction::Input, false) => device.read(&mut ctx, request).map(Some),
            (Direction::Input, true) => device.buffered_read(&mut ctx, request).map(Some),
            (Direction::Output, false) => device.write(&mut ctx, request, data).map(|()| None),
            (Direction::Output, true) => {
                device.buffered_write(&mut ctx, request, data).map(|()| None)
            }
        };
        match result {
            Ok(reply) => Dispatched::Reply(reply),
            Err(Reject) => Dispatched::Reject,
        }
    }

    /// Snapshots of every attached device.
    #[must_use]
    pub fn state_dump(&self) -> Vec<DeviceReport> {
        self.devices
            .iter()
            .map(|(id, attached)| DeviceReport {
                id: *id,
                name: attached.name(),
                placement: attached.placement,
                state: attached.inner.state_dump(&id.to_string()),
            })
            .collect()
    }
}

impl Default for DeviceManager {
    fn default() -> DeviceManager {
        DeviceManager::new()
    }
}
