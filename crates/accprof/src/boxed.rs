//! Owning pointer whose storage is profiled.
//!
//! `ProfiledBox<T>` is how a type opts in: every instance allocated through it
//! gets its own protected pages, so each access to the value is counted
//! against `T`'s byte offsets.
//!
//! ```ignore
//! let profiler = Profiler::start(ProfilerConfig::default())?;
//! let mut node = ProfiledBox::new(Node::default());
//! node.hits += 1;
//! drop(node);
//! profiler.stop();
//! ```

use std::alloc::{Layout, handle_alloc_error};
use std::fmt;
use std::marker::PhantomData;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

use crate::hooks::{heap_alloc, heap_dealloc};
use crate::profiler::Profiler;
use crate::registry::TypeToken;

/// A `Box`-like owner allocated through the profiler's hooks.
///
/// Without an active profiler the value lives on the ordinary heap.
pub struct ProfiledBox<T: 'static> {
    ptr: NonNull<T>,
    token: TypeToken,
    profiler: Option<&'static Profiler>,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send + 'static> Send for ProfiledBox<T> {}
unsafe impl<T: Sync + 'static> Sync for ProfiledBox<T> {}

impl<T: 'static> ProfiledBox<T> {
    /// Move `value` into profiled storage of the active profiler.
    pub fn new(value: T) -> Self {
        Self::new_in(value, Profiler::active())
    }

    /// Move `value` into storage of `profiler` (heap if `None`).
    pub fn new_in(value: T, profiler: Option<&'static Profiler>) -> Self {
        let mut uninit = Self::new_uninit_in(profiler);
        uninit.write(value);
        unsafe { uninit.assume_init() }
    }

    /// Allocate uninitialized profiled storage for a `T`.
    ///
    /// Lets fields be initialized one at a time, so bytes the program never
    /// writes stay uncounted.
    #[must_use]
    pub fn new_uninit() -> ProfiledBox<MaybeUninit<T>> {
        Self::new_uninit_in(Profiler::active())
    }

    /// [`ProfiledBox::new_uninit`] against an explicit profiler.
    #[must_use]
    pub fn new_uninit_in(profiler: Option<&'static Profiler>) -> ProfiledBox<MaybeUninit<T>> {
        let layout = Layout::new::<T>();
        let (token, raw) = profiler.map_or_else(
            || (TypeToken::Untracked, heap_alloc(layout)),
            |p| {
                let token = p.register::<T>();
                (token, p.acquire(layout, token))
            },
        );
        let Some(raw) = raw else {
            handle_alloc_error(layout)
        };
        ProfiledBox {
            ptr: raw.cast(),
            token,
            profiler,
            _marker: PhantomData,
        }
    }

    /// Registration outcome for `T`.
    #[must_use]
    pub const fn token(&self) -> TypeToken {
        self.token
    }

    /// Whether this instance lives on protected, counted pages.
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.token.is_tracked()
            && self
                .profiler
                .is_some_and(|p| p.is_tracked_block(self.ptr.as_ptr() as usize))
    }

    #[must_use]
    pub const fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    #[must_use]
    pub const fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Move the value out and free the storage.
    #[must_use]
    pub fn into_inner(self) -> T {
        let this = ManuallyDrop::new(self);
        let value = unsafe { ptr::read(this.ptr.as_ptr()) };
        unsafe { this.free_storage() };
        value
    }

    /// # Safety
    ///
    /// The value must already be dropped or moved out, and the box not used
    /// afterwards.
    unsafe fn free_storage(&self) {
        let layout = Layout::new::<T>();
        let raw = self.ptr.cast::<u8>();
        unsafe {
            match self.profiler {
                Some(p) => p.release(raw, layout, self.token),
                None => heap_dealloc(raw, layout),
            }
        }
    }
}

impl<T: 'static> ProfiledBox<MaybeUninit<T>> {
    /// Convert to `ProfiledBox<T>`, keeping `T`'s registration.
    ///
    /// # Safety
    ///
    /// The value must be fully initialized.
    #[must_use]
    pub unsafe fn assume_init(self) -> ProfiledBox<T> {
        let this = ManuallyDrop::new(self);
        ProfiledBox {
            ptr: this.ptr.cast(),
            token: this.token,
            profiler: this.profiler,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Deref for ProfiledBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: 'static> DerefMut for ProfiledBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: 'static> Drop for ProfiledBox<T> {
    fn drop(&mut self) {
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            self.free_storage();
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ProfiledBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
