//! INP and OUT.
//!
//! Q addresses the device (see [`base::iorequest`]).  INP loads the
//! word read into A; OUT sends A.  When the device replies, execution
//! continues with the next instruction.  When the request is
//! rejected, by the device or because nothing can accept it,
//! execution continues at P plus the sign-extended Δ of the
//! instruction.
use tracing::{event, Level};

use base::onescomplement::sign_extend_8;
use base::prelude::{Direction, IoRequest};

use super::arith::add_internal;
use super::{ControlUnit, OpcodeResult, ProgramCounterChange};
use crate::context::Context;
use crate::diagnostics::CurrentInstructionDiagnostics;
use crate::io::{DeviceManager, Dispatched, InternalRejectReason};
use crate::memory::MemoryUnit;
use crate::protect::ProtectViolation;
use crate::stop::StopReason;

impl ControlUnit {
    fn reject_exit(&self, reject_delta: u8) -> ProgramCounterChange {
        ProgramCounterChange::Jump(add_internal(self.regs.p, sign_extend_8(reject_delta)))
    }

    pub(super) fn op_io(
        &mut self,
        direction: Direction,
        reject_delta: u8,
        ctx: &Context,
        mem: &mut MemoryUnit,
        devices: &mut DeviceManager,
        diagnostics: &CurrentInstructionDiagnostics,
    ) -> OpcodeResult {
        let q = self.regs.q;
        let request = IoRequest::decode(q, direction);
        match devices.dispatch(
            ctx.now,
            mem,
            &request,
            self.regs.a,
            self.regs.protected_instruction,
        ) {
            Dispatched::Reply(Some(word)) => {
                self.regs.a = word;
                Ok(ProgramCounterChange::CounterUpdate)
            }
            Dispatched::Reply(None) => Ok(ProgramCounterChange::CounterUpdate),
            Dispatched::Reject => {
                if self.config.stop_on_reject {
                    Err(StopReason::IoReject {
                        diagnostics: *diagnostics,
                        q,
                    })
                } else {
                    Ok(self.reject_exit(reject_delta))
                }
            }
            Dispatched::InternalReject(reason) => {
                event!(Level::DEBUG, "{request} rejected internally: {reason:?}");
                if reason == InternalRejectReason::ProtectViolation {
                    self.raise_protect_fault(ProtectViolation::Device { q });
                }
                Ok(self.reject_exit(reject_delta))
            }
        }
    }
}
