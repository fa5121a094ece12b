use std::ptr;

// Callers guarantee the pointer is valid and aligned for T
#[inline(always)]
pub unsafe fn read<T>(src: *const T) -> T {
    ptr::read_volatile(src)
}

#[inline(always)]
pub unsafe fn write<T>(dst: *mut T, value: T) {
    ptr::write_volatile(dst, value);
}
