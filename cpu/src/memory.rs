//! Core memory, with a protect bit for each word.
//!
//! Memory is a flat array of 16-bit words.  The installed size is a
//! power of two between 4K and 64K words; addresses wrap modulo the
//! installed size.
//!
//! Each word also has a protect bit.  When the protect switch is on,
//! stores by unprotected instructions into protected words fail, and
//! an unprotected program which runs into a protected word takes a
//! protect fault.  Reads are never checked.
//!
//! Peripheral controllers write memory through
//! [`MemoryUnit::write_device_scoped`], which applies the device's own
//! notion of protection and never causes a CPU protect fault.
use std::error;
use std::fmt::{self, Debug, Display, Formatter};

use serde::Serialize;
use tracing::{event, Level};

/// The installed memory sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
pub enum MemorySize {
    K4,
    K8,
    K16,
    #[default]
    K32,
    K64,
}

impl MemorySize {
    #[must_use]
    pub const fn words(&self) -> usize {
        match self {
            MemorySize::K4 => 4096,
            MemorySize::K8 => 8192,
            MemorySize::K16 => 16384,
            MemorySize::K32 => 32768,
            MemorySize::K64 => 65536,
        }
    }

    #[must_use]
    pub fn from_words(words: usize) -> Option<MemorySize> {
        [
            MemorySize::K4,
            MemorySize::K8,
            MemorySize::K16,
            MemorySize::K32,
            MemorySize::K64,
        ]
        .into_iter()
        .find(|size| size.words() == words)
    }
}

impl Display for MemorySize {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}K", self.words() / 1024)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfiguration {
    pub size: MemorySize,
}

/// A store failed because the target word is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedWord(pub u16);

impl Display for ProtectedWord {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "word {:#06X} is protected", self.0)
    }
}

impl error::Error for ProtectedWord {}

/// Read-only access to memory words.  This is implemented by
/// [`MemoryUnit`] and may be implemented by other things (for example
/// a disassembler's view of a memory image) which need to resolve
/// operand addresses.
pub trait WordSource {
    fn read_word(&self, address: u16) -> u16;
}

impl WordSource for [u16] {
    fn read_word(&self, address: u16) -> u16 {
        if self.is_empty() {
            0
        } else {
            self[usize::from(address) % self.len()]
        }
    }
}

pub struct MemoryUnit {
    words: Vec<u16>,
    protect: Vec<bool>,
    mask: u16,
    protect_switch: bool,
}

impl Debug for MemoryUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("MemoryUnit")
            .field("words", &format_args!("<{} words>", self.words.len()))
            .field(
                "protected",
                &format_args!("<{} words>", self.protect.iter().filter(|p| **p).count()),
            )
            .field("protect_switch", &self.protect_switch)
            .finish()
    }
}

impl MemoryUnit {
    #[must_use]
    pub fn new(config: &MemoryConfiguration) -> MemoryUnit {
        let n = config.size.words();
        MemoryUnit {
            words: vec![0; n],
            protect: vec![false; n],
            mask: (n - 1) as u16,
            protect_switch: false,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.words.len()
    }

    fn index(&self, address: u16) -> usize {
        usize::from(address & self.mask)
    }

    /// Read a word.  Reads are never subject to protection.
    #[must_use]
    pub fn read(&self, address: u16) -> u16 {
        self.words[self.index(address)]
    }

    /// Store a word on behalf of an instruction.  `by_protected` is
    /// true when the instruction itself is protected.
    ///
    /// # Errors
    ///
    /// `ProtectedWord` when the protect switch is on, the target word
    /// is protected and the instruction is not.  The store does not
    /// take place.
    pub fn write_checked(
        &mut self,
        address: u16,
        value: u16,
        by_protected: bool,
    ) -> Result<(), ProtectedWord> {
        let i = self.index(address);
        if self.protect_switch && self.protect[i] && !by_protected {
            event!(
                Level::DEBUG,
                "unprotected store of {value:#06X} to protected word {address:#06X} suppressed"
            );
            return Err(ProtectedWord(address));
        }
        self.words[i] = value;
        Ok(())
    }

    /// Store a word on behalf of a peripheral.  Devices whose
    /// `protect_override` is set may write to protected words.
    /// Returns false (and leaves memory unchanged) when the write is
    /// not permitted; this never raises a protect fault, the device
    /// reports the failure in its own status instead.
    pub fn write_device_scoped(&mut self, address: u16, value: u16, protect_override: bool) -> bool {
        let i = self.index(address);
        if self.protect_switch && self.protect[i] && !protect_override {
            event!(
                Level::DEBUG,
                "device write of {value:#06X} to protected word {address:#06X} refused"
            );
            false
        } else {
            self.words[i] = value;
            true
        }
    }

    /// Store a word regardless of protection (used for loading
    /// images and by the interrupt system).
    pub fn write_unchecked(&mut self, address: u16, value: u16) {
        let i = self.index(address);
        self.words[i] = value;
    }

    /// Load a block of words starting at `origin`, wrapping at the
    /// end of memory.
    pub fn load(&mut self, origin: u16, words: &[u16]) {
        let mut address = origin;
        for w in words {
            self.write_unchecked(address, *w);
            address = address.wrapping_add(1);
        }
    }

    #[must_use]
    pub fn is_protected(&self, address: u16) -> bool {
        self.protect[self.index(address)]
    }

    pub fn set_protect_bit(&mut self, address: u16, protected: bool) {
        let i = self.index(address);
        self.protect[i] = protected;
    }

    #[must_use]
    pub fn protect_switch(&self) -> bool {
        self.protect_switch
    }

    pub fn set_protect_switch(&mut self, on: bool) {
        self.protect_switch = on;
    }
}

impl WordSource for MemoryUnit {
    fn read_word(&self, address: u16) -> u16 {
        self.read(address)
    }
}

#[cfg(test)]
fn small_memory() -> MemoryUnit {
    MemoryUnit::new(&MemoryConfiguration {
        size: MemorySize::K4,
    })
}

#[test]
fn test_addresses_wrap() {
    let mut mem = small_memory();
    assert_eq!(mem.size(), 4096);
    mem.write_unchecked(0x1005, 0xBEEF);
    assert_eq!(mem.read(0x0005), 0xBEEF);
    assert_eq!(mem.read(0xF005), 0xBEEF);
}

#[test]
fn test_write_checked() {
    let mut mem = small_memory();
    mem.set_protect_bit(0x10, true);
    // With the switch off, protection is not enforced.
    assert_eq!(mem.write_checked(0x10, 1, false), Ok(()));
    mem.set_protect_switch(true);
    assert_eq!(mem.write_checked(0x10, 2, false), Err(ProtectedWord(0x10)));
    assert_eq!(mem.read(0x10), 1);
    assert_eq!(mem.write_checked(0x10, 3, true), Ok(()));
    assert_eq!(mem.read(0x10), 3);
    // Unprotected words can be written by anybody.
    assert_eq!(mem.write_checked(0x11, 4, false), Ok(()));
}

#[test]
fn test_write_device_scoped() {
    let mut mem = small_memory();
    mem.set_protect_switch(true);
    mem.set_protect_bit(0x20, true);
    assert!(!mem.write_device_scoped(0x20, 7, false));
    assert_eq!(mem.read(0x20), 0);
    assert!(mem.write_device_scoped(0x20, 7, true));
    assert_eq!(mem.read(0x20), 7);
}

#[test]
fn test_memory_size_lookup() {
    assert_eq!(MemorySize::from_words(8192), Some(MemorySize::K8));
    assert_eq!(MemorySize::from_words(1000), None);
    assert_eq!(MemorySize::K64.to_string(), "64K");
}

#[test]
fn test_slice_word_source() {
    let image: &[u16] = &[1, 2, 3];
    assert_eq!(image.read_word(1), 2);
    assert_eq!(image.read_word(4), 2);
}
