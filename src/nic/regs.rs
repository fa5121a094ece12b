#![allow(non_snake_case)]

use std::fmt;
use std::ptr::NonNull;

use crate::volatile;

/// A device's memory-mapped register file (BAR 0).
/// The mapping lives as long as the process, it is never unmapped.
#[derive(Copy, Clone)]
pub struct RegisterWindow {
    base: NonNull<u8>,
    len: usize,
}

// The window is plain device memory; concurrent access rules are the register map's business
unsafe impl Send for RegisterWindow {}
unsafe impl Sync for RegisterWindow {}

impl RegisterWindow {
    /// # Safety
    /// `base` must point to `len` bytes of mapped device memory that stays mapped forever.
    pub unsafe fn from_raw(base: *mut u8, len: usize) -> Option<RegisterWindow> {
        NonNull::new(base).map(|base| RegisterWindow { base, len })
    }

    pub fn from_static(memory: &'static mut [u8]) -> RegisterWindow {
        let len = memory.len();
        RegisterWindow { base: NonNull::from(memory).cast::<u8>(), len }
    }

    pub fn base_address(&self) -> usize {
        self.base.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Panics if `reg` is outside the window or not aligned for `T`.
    #[inline(always)]
    fn at<T>(&self, reg: u32) -> *mut T {
        let offset = reg as usize;
        if offset.checked_add(std::mem::size_of::<T>()).map_or(true, |end| end > self.len) {
            panic!("Register {:#x} is outside the {:#x}-byte window", reg, self.len);
        }
        let ptr = unsafe { self.base.as_ptr().add(offset) as *mut T };
        if ptr as usize % std::mem::align_of::<T>() != 0 {
            panic!("Register {:#x} is misaligned for a {}-byte access", reg, std::mem::size_of::<T>());
        }
        ptr
    }
}

impl fmt::Debug for RegisterWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegisterWindow({:#x}, {} bytes)", self.base_address(), self.len)
    }
}

/// Raw register access for one port.
///
/// Only `configure` hands these out, so holding one means the port's register base was captured.
/// Offsets are checked against the window and panic when out of range; there are no retries, callers must know the register map.
#[derive(Clone, Debug)]
pub struct Registers {
    window: RegisterWindow,
}

impl Registers {
    pub(crate) fn new(window: RegisterWindow) -> Registers {
        Registers { window }
    }

    pub fn window(&self) -> RegisterWindow {
        self.window
    }

    #[inline(always)]
    pub fn read32(&self, reg: u32) -> u32 {
        u32::from_le(unsafe { volatile::read(self.window.at::<u32>(reg)) })
    }

    #[inline(always)]
    pub fn write32(&self, reg: u32, value: u32) {
        unsafe { volatile::write(self.window.at::<u32>(reg), u32::to_le(value)) }
    }

    #[inline(always)]
    pub fn read64(&self, reg: u32) -> u64 {
        u64::from_le(unsafe { volatile::read(self.window.at::<u64>(reg)) })
    }

    #[inline(always)]
    pub fn write64(&self, reg: u32, value: u64) {
        unsafe { volatile::write(self.window.at::<u64>(reg), u64::to_le(value)) }
    }

    pub fn read_field(&self, reg: u32, field: u32) -> u32 {
        let value = self.read32(reg);
        let shift = field.trailing_zeros();
        (value & field) >> shift
    }

    pub fn write_field(&self, reg: u32, field: u32, field_value: u32) {
        let old_value = self.read32(reg);
        let shift = field.trailing_zeros();
        let new_value = (old_value & !field) | ((field_value << shift) & field);
        self.write32(reg, new_value);
    }

    pub fn set_field(&self, reg: u32, field: u32) {
        let old_value = self.read32(reg);
        self.write32(reg, old_value | field);
    }

    pub fn clear_field(&self, reg: u32, field: u32) {
        self.write_field(reg, field, 0);
    }

    pub fn is_field_cleared(&self, reg: u32, field: u32) -> bool {
        self.read_field(reg, field) == 0
    }

    // --- IEEE 1588 ---

    /// SYSTIML latches SYSTIMH, so the low half must be read first.
    pub fn system_time(&self) -> u64 {
        let low = self.read32(SYSTIML);
        let high = self.read32(SYSTIMH);
        ((high as u64) << 32) | low as u64
    }

    pub fn enable_rx_timestamps(&self) {
        self.write_field(TSYNCRXCTL, TSYNCRXCTL_::TYPE, TSYNCRXCTL_::TYPE_ALL);
        self.set_field(TSYNCRXCTL, TSYNCRXCTL_::ENABLE);
    }

    pub fn enable_tx_timestamps(&self) {
        self.set_field(TSYNCTXCTL, TSYNCTXCTL_::ENABLE);
    }

    /// Reading the high half releases the latch for the next packet.
    pub fn rx_timestamp(&self) -> Option<u64> {
        if self.is_field_cleared(TSYNCRXCTL, TSYNCRXCTL_::VALID) {
            return None;
        }
        let low = self.read32(RXSTMPL);
        let high = self.read32(RXSTMPH);
        Some(((high as u64) << 32) | low as u64)
    }

    pub fn tx_timestamp(&self) -> Option<u64> {
        if self.is_field_cleared(TSYNCTXCTL, TSYNCTXCTL_::VALID) {
            return None;
        }
        let low = self.read32(TXSTMPL);
        let high = self.read32(TXSTMPH);
        Some(((high as u64) << 32) | low as u64)
    }
}

// Offsets are in bytes, for the ixgbe register map

pub const TSYNCRXCTL: u32 = 0x05188;
pub mod TSYNCRXCTL_ {
    pub const VALID: u32 = 1 << 0;
    pub const TYPE: u32 = 0b1110;
    pub const ENABLE: u32 = 1 << 4;

    pub const TYPE_ALL: u32 = 0b100;
}

pub const RXSTMPL: u32 = 0x051E8;

pub const RXSTMPH: u32 = 0x051A4;

pub const TSYNCTXCTL: u32 = 0x08C00;
pub mod TSYNCTXCTL_ {
    pub const VALID: u32 = 1 << 0;
    pub const ENABLE: u32 = 1 << 4;
}

pub const TXSTMPL: u32 = 0x08C04;

pub const TXSTMPH: u32 = 0x08C08;

pub const SYSTIML: u32 = 0x08C0C;

pub const SYSTIMH: u32 = 0x08C10;
