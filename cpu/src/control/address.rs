//! Effective address computation for storage reference instructions.
//!
//! The resolver only reads memory.  The control unit uses it to find
//! operands and then advances P past the instruction itself; a
//! disassembler can call it with the same arguments and gets the same
//! address without disturbing anything.
use tracing::{event, Level};

use base::instruction::{Instruction, INDEX_CELL};
use base::onescomplement::sign_extend_8;
use base::prelude::AddressingMode;

use super::arith::add_internal;
use crate::memory::WordSource;

/// Indirect address chains are abandoned after this many
/// dereferences.  The hardware had no such limit; this just stops a
/// corrupt program from hanging the emulator.
pub const MAX_INDIRECT_REFERENCES: u32 = 10_000;

const MORE_INDIRECTION: u16 = 0x8000;

/// The result of resolving an operand address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub address: u16,
    /// Words occupied by the instruction (1 or 2).
    pub length: u16,
}

/// An indirect address chain was too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressingLoop {
    pub dereferences: u32,
}

/// Compute the effective address of the storage reference
/// instruction `inst`, located at `p`.
///
/// 1. With a non-zero displacement Δ, the base address is Δ itself,
///    or (when relative) P plus the sign-extended Δ.
/// 2. With Δ zero, the base address is the following word, or (when
///    relative) P plus the following word.
/// 3. If indirect, the base address is replaced by the word it
///    addresses.  In 32K mode this repeats while bit 15 of the
///    fetched word is set; in 64K mode there is a single level.
/// 4. Finally Q and/or the index cell are added.
///
/// All arithmetic uses the internal adder and is masked to the
/// width of an address.
///
/// # Errors
///
/// `AddressingLoop` when the indirect chain exceeds
/// [`MAX_INDIRECT_REFERENCES`].
pub fn resolve_operand_address<M: WordSource + ?Sized>(
    inst: Instruction,
    p: u16,
    q: u16,
    mem: &M,
    mode: AddressingMode,
) -> Result<ResolvedAddress, AddressingLoop> {
    let mask = mode.mask();
    let delta = inst.delta();
    let length = inst.length();
    let base: u16 = if delta != 0 {
        if inst.is_relative() {
            add_internal(p, sign_extend_8(delta)) & mask
        } else {
            u16::from(delta)
        }
    } else {
        let operand = mem.read_word(add_internal(p, 1) & mask);
        if inst.is_relative() {
            add_internal(p, operand) & mask
        } else {
            operand & mask
        }
    };

    let mut address = if inst.is_indirect() {
        follow_indirect_chain(base, mem, mode)?
    } else {
        base
    };
    if inst.is_indexed_by_q() {
        address = add_internal(address, q) & mask;
    }
    if inst.is_indexed_by_cell() {
        address = add_internal(address, mem.read_word(INDEX_CELL)) & mask;
    }
    Ok(ResolvedAddress { address, length })
}

fn follow_indirect_chain<M: WordSource + ?Sized>(
    start: u16,
    mem: &M,
    mode: AddressingMode,
) -> Result<u16, AddressingLoop> {
    let mut address = start;
    let mut dereferences: u32 = 0;
    loop {
        if dereferences == MAX_INDIRECT_REFERENCES {
            event!(
                Level::WARN,
                "indirect chain starting at {start:#06X} is longer than {MAX_INDIRECT_REFERENCES} words"
            );
            return Err(AddressingLoop { dereferences });
        }
        dereferences += 1;
        let word = mem.read_word(address);
        if mode.multi_level_indirect() && word & MORE_INDIRECTION != 0 {
            address = word & !MORE_INDIRECTION;
        } else {
            return Ok(word & mode.mask());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(word: u16) -> Instruction {
        Instruction::from(word)
    }

    fn memory() -> Vec<u16> {
        vec![0; 0x8000]
    }

    #[test]
    fn test_direct_and_relative() {
        let mem = memory();
        let m: &[u16] = &mem;
        // LDA $12
        assert_eq!(
            resolve_operand_address(inst(0xC012), 0x300, 0, m, AddressingMode::Addr32K),
            Ok(ResolvedAddress {
                address: 0x12,
                length: 1
            })
        );
        // LDA (P+5)
        assert_eq!(
            resolve_operand_address(inst(0xC805), 0x300, 0, m, AddressingMode::Addr32K),
            Ok(ResolvedAddress {
                address: 0x305,
                length: 1
            })
        );
        // LDA (P-2)
        assert_eq!(
            resolve_operand_address(inst(0xC8FD), 0x300, 0, m, AddressingMode::Addr32K),
            Ok(ResolvedAddress {
                address: 0x2FE,
                length: 1
            })
        );
    }

    #[test]
    fn test_two_word_forms() {
        let mut mem = memory();
        mem[0x301] = 0x1234;
        let m: &[u16] = &mem;
        assert_eq!(
            resolve_operand_address(inst(0xC000), 0x300, 0, m, AddressingMode::Addr32K),
            Ok(ResolvedAddress {
                address: 0x1234,
                length: 2
            })
        );
        assert_eq!(
            resolve_operand_address(inst(0xC800), 0x300, 0, m, AddressingMode::Addr32K),
            Ok(ResolvedAddress {
                address: 0x1534,
                length: 2
            })
        );
    }

    #[test]
    fn test_indexing() {
        let mut mem = memory();
        mem[usize::from(INDEX_CELL)] = 0x0100;
        let m: &[u16] = &mem;
        // LDA $12,Q,I with Q = 3
        let r = resolve_operand_address(inst(0xC312), 0x300, 3, m, AddressingMode::Addr32K)
            .expect("no indirection");
        assert_eq!(r.address, 0x115);
        // Q = -1 (one's complement)
        let r = resolve_operand_address(inst(0xC212), 0x300, 0xFFFE, m, AddressingMode::Addr32K)
            .expect("no indirection");
        assert_eq!(r.address, 0x11);
    }

    #[test]
    fn test_single_and_multi_level_indirect() {
        let mut mem = memory();
        mem[0x12] = 0x8200;
        mem[0x200] = 0x0345;
        let m: &[u16] = &mem;
        let r = resolve_operand_address(inst(0xC412), 0x300, 0, m, AddressingMode::Addr32K)
            .expect("chain is short");
        assert_eq!(r.address, 0x345);
        // In 64K mode bit 15 is part of the address.
        let r = resolve_operand_address(inst(0xC412), 0x300, 0, m, AddressingMode::Addr64K)
            .expect("single level");
        assert_eq!(r.address, 0x8200);
    }

    fn chain(links: usize) -> Vec<u16> {
        // A chain of `links` dereferences: the word at 0x12 points at
        // 0x1000, which points at 0x1001, and so on.  The last link
        // holds the final address.
        let mut mem = memory();
        mem[0x12] = MORE_INDIRECTION | 0x1000;
        for k in 0..(links - 1) {
            let here = 0x1000 + k;
            let next = (here + 1) as u16;
            mem[here] = if k + 2 == links {
                0x0042
            } else {
                MORE_INDIRECTION | next
            };
        }
        mem
    }

    #[test]
    fn test_chain_at_limit_succeeds() {
        let mem = chain(MAX_INDIRECT_REFERENCES as usize);
        let m: &[u16] = &mem;
        let r = resolve_operand_address(inst(0xC412), 0x300, 0, m, AddressingMode::Addr32K);
        assert_eq!(
            r,
            Ok(ResolvedAddress {
                address: 0x42,
                length: 1
            })
        );
    }

    #[test]
    fn test_chain_beyond_limit_fails() {
        let mem = chain(MAX_INDIRECT_REFERENCES as usize + 1);
        let m: &[u16] = &mem;
        let r = resolve_operand_address(inst(0xC412), 0x300, 0, m, AddressingMode::Addr32K);
        assert_eq!(
            r,
            Err(AddressingLoop {
                dereferences: MAX_INDIRECT_REFERENCES
            })
        );
    }

    #[test]
    fn test_self_loop_fails() {
        let mut mem = memory();
        mem[0x12] = MORE_INDIRECTION | 0x0012;
        let m: &[u16] = &mem;
        assert!(
            resolve_operand_address(inst(0xC412), 0x300, 0, m, AddressingMode::Addr32K).is_err()
        );
    }
}
