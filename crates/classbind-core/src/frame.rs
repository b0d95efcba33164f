//! Call frames: the argument and return storage of one native call.
//!
//! A [`Frame`] owns a word-aligned argument buffer, the array of argument
//! pointers handed to `object_method_bind_ptrcall`, and a separate return
//! region. Buffers come from a small thread-local pool and go back to it
//! when the frame is dropped, whichever way the caller leaves its scope.
//!
//! ```ignore
//! let mut frame = Frame::new();
//! frame.arg(true)?;
//! frame.arg(42i64)?;
//! let ret = frame.ret::<f64>()?;
//! bind.ptrcall(receiver, &mut frame)?;
//! let value = frame.get(ret)?;
//! ```

use crate::abi::{AbiKind, AbiValue};
use crate::error::FrameError;
use classbind_sys::{ConstTypePtr, TypePtr, WORD};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Words available for arguments in one frame.
pub const FRAME_WORDS: usize = 32;
/// Words available for the return value.
pub const RETURN_WORDS: usize = 8;
/// Maximum number of arguments in one frame.
pub const MAX_ARGS: usize = 16;
/// Default number of idle buffers kept per thread.
pub const DEFAULT_POOL_SIZE: usize = 8;

static POOL_LIMIT: AtomicUsize = AtomicUsize::new(DEFAULT_POOL_SIZE);

thread_local! {
    static POOL: RefCell<Vec<Box<FrameBuffer>>> = const { RefCell::new(Vec::new()) };
}

/// Sets how many idle frame buffers each thread keeps for reuse.
pub fn set_pool_limit(limit: usize) {
    POOL_LIMIT.store(limit, Ordering::Relaxed);
}

/// Number of idle buffers pooled on the current thread.
pub fn pooled_buffers() -> usize {
    POOL.try_with(|pool| pool.borrow().len()).unwrap_or(0)
}

#[repr(C, align(16))]
struct ArgStorage([usize; FRAME_WORDS]);

#[repr(C, align(16))]
struct ReturnStorage([usize; RETURN_WORDS]);

struct FrameBuffer {
    args: ArgStorage,
    ret: ReturnStorage,
    pointers: [ConstTypePtr; MAX_ARGS],
}

impl FrameBuffer {
    fn boxed() -> Box<FrameBuffer> {
        Box::new(FrameBuffer {
            args: ArgStorage([0; FRAME_WORDS]),
            ret: ReturnStorage([0; RETURN_WORDS]),
            pointers: [ptr::null(); MAX_ARGS],
        })
    }

    fn clear(&mut self, used_words: usize, used_args: usize) {
        self.args.0[..used_words].fill(0);
        self.ret.0.fill(0);
        self.pointers[..used_args].fill(ptr::null());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Building,
    Submitted,
}

/// Typed token for the return slot reserved with [`Frame::ret`].
pub struct RetSlot<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for RetSlot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RetSlot<T> {}

impl<T> fmt::Debug for RetSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RetSlot<{}>", std::any::type_name::<T>())
    }
}

/// Argument and return storage for a single native call.
pub struct Frame {
    buffer: ManuallyDrop<Box<FrameBuffer>>,
    cursor: usize,
    len: usize,
    kinds: [AbiKind; MAX_ARGS],
    offsets: [usize; MAX_ARGS],
    ret: Option<AbiKind>,
    state: FrameState,
}

impl Frame {
    /// Takes a zeroed buffer from the thread's pool, allocating if it is empty.
    pub fn new() -> Frame {
        let buffer = POOL
            .try_with(|pool| pool.borrow_mut().pop())
            .ok()
            .flatten()
            .unwrap_or_else(FrameBuffer::boxed);

        Frame {
            buffer: ManuallyDrop::new(buffer),
            cursor: 0,
            len: 0,
            kinds: [AbiKind::Nil; MAX_ARGS],
            offsets: [0; MAX_ARGS],
            ret: None,
            state: FrameState::Building,
        }
    }

    /// Appends one argument, encoded with its exact native layout.
    ///
    /// Each argument starts on a word boundary (or its own alignment if
    /// larger) and occupies `T::KIND.words()` consecutive words.
    pub fn arg<T: AbiValue>(&mut self, value: T) -> Result<(), FrameError> {
        self.ensure_building()?;
        if self.len == MAX_ARGS {
            return Err(FrameError::TooManyArguments { max: MAX_ARGS });
        }

        let kind = T::KIND;
        let offset = self.cursor.next_multiple_of(kind.align().max(WORD));
        let end = offset + kind.words() * WORD;
        let capacity = FRAME_WORDS * WORD;
        if end > capacity {
            return Err(FrameError::Overflow {
                needed: kind.words(),
                available: capacity.saturating_sub(offset) / WORD,
            });
        }

        unsafe {
            let dst = self.buffer.args.0.as_mut_ptr().cast::<u8>().add(offset);
            value.encode(dst);
            self.buffer.pointers[self.len] = dst as ConstTypePtr;
        }
        self.kinds[self.len] = kind;
        self.offsets[self.len] = offset;
        self.len += 1;
        self.cursor = end;
        Ok(())
    }

    /// Reserves the return slot, typed as `T`. At most once per frame.
    pub fn ret<T: AbiValue>(&mut self) -> Result<RetSlot<T>, FrameError> {
        self.ensure_building()?;
        if self.ret.is_some() {
            return Err(FrameError::ReturnAlreadyReserved);
        }
        if T::KIND.words() > RETURN_WORDS {
            return Err(FrameError::ReturnTooLarge(T::KIND));
        }
        self.ret = Some(T::KIND);
        Ok(RetSlot {
            _marker: PhantomData,
        })
    }

    /// Marks the frame as handed to a native call. No arguments may be
    /// added afterwards.
    pub fn submit(&mut self) -> Result<(), FrameError> {
        self.ensure_building()?;
        self.state = FrameState::Submitted;
        Ok(())
    }

    /// Decodes the return value written by the native call.
    pub fn get<T: AbiValue>(&self, _slot: RetSlot<T>) -> Result<T, FrameError> {
        if self.state != FrameState::Submitted {
            return Err(FrameError::NotSubmitted);
        }
        match self.ret {
            Some(kind) if kind == T::KIND => {
                Ok(unsafe { T::decode(self.buffer.ret.0.as_ptr().cast::<u8>()) })
            }
            _ => Err(FrameError::ReturnNotReserved),
        }
    }

    /// Pointer to the argument pointer array.
    pub fn args_ptr(&self) -> *const ConstTypePtr {
        self.buffer.pointers.as_ptr()
    }

    /// Pointer to the return region.
    pub fn ret_ptr(&mut self) -> TypePtr {
        self.buffer.ret.0.as_mut_ptr().cast()
    }

    /// ABI kinds of the arguments, in order.
    pub fn kinds(&self) -> &[AbiKind] {
        &self.kinds[..self.len]
    }

    /// Byte offsets of the arguments within the argument buffer.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets[..self.len]
    }

    pub fn ret_kind(&self) -> Option<AbiKind> {
        self.ret
    }

    pub fn arg_count(&self) -> usize {
        self.len
    }

    pub fn is_submitted(&self) -> bool {
        self.state == FrameState::Submitted
    }

    fn ensure_building(&self) -> Result<(), FrameError> {
        match self.state {
            FrameState::Building => Ok(()),
            FrameState::Submitted => Err(FrameError::AlreadySubmitted),
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        let mut buffer = unsafe { ManuallyDrop::take(&mut self.buffer) };
        buffer.clear(self.cursor.div_ceil(WORD), self.len);

        let limit = POOL_LIMIT.load(Ordering::Relaxed);
        // The pool may already be gone during thread teardown.
        let _ = POOL.try_with(|pool| {
            let mut pool = pool.borrow_mut();
            if pool.len() < limit {
                pool.push(buffer);
            }
        });
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("kinds", &self.kinds())
            .field("offsets", &self.offsets())
            .field("ret", &self.ret)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{Rect2, Transform2D};

    #[test]
    fn mixed_width_arguments_land_on_word_offsets() {
        let mut frame = Frame::new();
        frame.arg(true).unwrap();
        frame.arg(-5i64).unwrap();
        frame.arg(Rect2::new(1.0, 2.0, 3.0, 4.0)).unwrap();

        let int_offset = AbiKind::Bool.words() * WORD;
        let rect_offset = int_offset + AbiKind::Int64.words() * WORD;
        assert_eq!(frame.offsets(), &[0, int_offset, rect_offset]);
        assert_eq!(
            frame.kinds(),
            &[AbiKind::Bool, AbiKind::Int64, AbiKind::Rect2]
        );

        let pointers = unsafe { std::slice::from_raw_parts(frame.args_ptr(), 3) };
        let base = pointers[0] as usize;
        assert_eq!(pointers[1] as usize - base, int_offset);
        assert_eq!(pointers[2] as usize - base, rect_offset);

        let rect = unsafe { *(pointers[2] as *const Rect2) };
        assert_eq!(rect, Rect2::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(unsafe { *(pointers[1] as *const i64) }, -5);
    }

    #[test]
    fn arguments_are_rejected_after_submission() {
        let mut frame = Frame::new();
        frame.arg(1i32).unwrap();
        frame.submit().unwrap();

        assert_eq!(frame.arg(2i32), Err(FrameError::AlreadySubmitted));
        assert_eq!(frame.submit(), Err(FrameError::AlreadySubmitted));
        assert!(matches!(frame.ret::<i32>(), Err(FrameError::AlreadySubmitted)));
    }

    #[test]
    fn return_slot_is_reserved_once() {
        let mut frame = Frame::new();
        frame.ret::<f64>().unwrap();
        assert!(matches!(
            frame.ret::<f64>(),
            Err(FrameError::ReturnAlreadyReserved)
        ));
        assert_eq!(frame.ret_kind(), Some(AbiKind::Float64));
    }

    #[test]
    fn return_value_needs_submission_and_matching_type() {
        let mut frame = Frame::new();
        let slot = frame.ret::<i64>().unwrap();
        assert_eq!(frame.get(slot), Err(FrameError::NotSubmitted));

        unsafe { frame.ret_ptr().cast::<i64>().write(99) };
        frame.submit().unwrap();
        assert_eq!(frame.get(slot), Ok(99));

        let mistyped = RetSlot::<f64> {
            _marker: PhantomData,
        };
        assert_eq!(frame.get(mistyped), Err(FrameError::ReturnNotReserved));
    }

    #[test]
    fn too_many_arguments() {
        let mut frame = Frame::new();
        for _ in 0..MAX_ARGS {
            frame.arg(false).unwrap();
        }
        assert_eq!(
            frame.arg(true),
            Err(FrameError::TooManyArguments { max: MAX_ARGS })
        );
    }

    #[test]
    fn oversized_payload_overflows() {
        let mut frame = Frame::new();
        let mut pushed = 0;
        let err = loop {
            match frame.arg(Transform2D::IDENTITY) {
                Ok(()) => pushed += 1,
                Err(err) => break err,
            }
        };
        assert_eq!(pushed, FRAME_WORDS / AbiKind::Transform2D.words());
        assert!(matches!(err, FrameError::Overflow { .. }));
    }

    #[test]
    fn dropped_frames_return_zeroed_buffers_to_the_pool() {
        {
            let mut frame = Frame::new();
            frame.arg(i64::MAX).unwrap();
            let _ = frame.ret::<i64>().unwrap();
            unsafe { frame.ret_ptr().cast::<i64>().write(-1) };
        }
        assert!(pooled_buffers() >= 1);

        let mut reused = Frame::new();
        let slot = reused.ret::<i64>().unwrap();
        reused.submit().unwrap();
        assert_eq!(reused.get(slot), Ok(0));
        let first_word = unsafe { *reused.buffer.args.0.as_ptr() };
        assert_eq!(first_word, 0);
    }

    #[test]
    fn buffer_is_released_when_the_scope_unwinds() {
        let result = std::panic::catch_unwind(|| {
            let mut frame = Frame::new();
            frame.arg(3i64).unwrap();
            panic!("native call failed");
        });
        assert!(result.is_err());
        assert!(pooled_buffers() >= 1);
    }
}
