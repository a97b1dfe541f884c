//! Program-break heap source
//!
//! Extends the arena with `sbrk(2)`, which moves the process data-segment
//! break. Memory obtained this way is never returned to the OS.

use core::ptr::NonNull;

use crate::config::ALIGNMENT;
use crate::error::AllocError;
use crate::traits::HeapSource;

/// Heap source backed by the program break
///
/// Construction aligns the break to [`ALIGNMENT`] once, so the first
/// extension starts on a block boundary.
pub struct SystemBreak {
    _priv: (),
}

impl SystemBreak {
    /// Create a break-backed source, aligning the current break
    ///
    /// # Returns
    /// The source, or [`AllocError::OutOfMemory`] if the break cannot be
    /// read or moved.
    pub fn new() -> Result<Self, AllocError> {
        // SAFETY: sbrk(0) only reads the current break
        let brk = unsafe { libc::sbrk(0) };
        if brk as isize == -1 {
            return Err(AllocError::OutOfMemory);
        }

        let misalign = (brk as usize) % ALIGNMENT;
        if misalign != 0 {
            let pad = (ALIGNMENT - misalign) as libc::intptr_t;
            // SAFETY: moving the break forward by less than ALIGNMENT bytes
            let prev = unsafe { libc::sbrk(pad) };
            if prev as isize == -1 {
                return Err(AllocError::OutOfMemory);
            }
        }

        Ok(Self { _priv: () })
    }
}

impl HeapSource for SystemBreak {
    type Error = AllocError;

    fn extend(&mut self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
        let delta =
            libc::intptr_t::try_from(bytes).map_err(|_| AllocError::OutOfMemory)?;

        // SAFETY: sbrk either moves the break by `delta` or fails; the
        // previous break it returns is the start of the new region
        let prev = unsafe { libc::sbrk(delta) };

        // sbrk signals failure with the pointer value -1, not via errno alone
        if prev as isize == -1 {
            return Err(AllocError::OutOfMemory);
        }

        NonNull::new(prev as *mut u8).ok_or(AllocError::OutOfMemory)
    }
}
