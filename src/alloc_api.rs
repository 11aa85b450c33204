use core::fmt;
use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};
use std::sync::Arc;

/// A memory source for chain-side storage.
///
/// The allocator given to [`Promise::with_allocator`] or [`Future::then_in`]
/// provides the backing storage for the continuation callables along the chain
/// and is handed to every [`Executor`] submission, so an executor may use it
/// for its own closure storage.
///
/// # Safety
///
/// A successful `allocate` must return a pointer that is valid for reads and
/// writes of `layout.size()` bytes at `layout.align()` alignment, and that
/// stays valid until it is passed to `deallocate` with the same layout.
///
/// [`Promise::with_allocator`]: crate::Promise::with_allocator
/// [`Future::then_in`]: crate::Future::then_in
/// [`Executor`]: crate::Executor
pub unsafe trait Allocator {
    /// Allocates a block of memory described by `layout`.
    ///
    /// `layout` always has a non-zero size.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, ()>;

    /// Deallocates a block previously returned by `allocate`.
    ///
    /// # Safety
    ///
    /// - `ptr` must have been returned by a previous call to `allocate` on
    ///   this allocator.
    /// - `layout` must be the same layout used in that `allocate` call.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global allocator.
#[derive(Copy, Clone, Debug, Default)]
pub struct Global;

unsafe impl Allocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, ()> {
        unsafe { NonNull::new(alloc(layout)).ok_or(()) }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        dealloc(ptr.as_ptr(), layout);
    }
}

/// A shareable handle to the allocator of a continuation chain.
///
/// Created from any [`Allocator`] and cloned into every stage that needs it,
/// including closures submitted to executors.
#[derive(Clone)]
pub struct AllocHandle {
    inner: Arc<dyn Allocator + Send + Sync>,
}

impl AllocHandle {
    /// Wraps `alloc` in a shareable handle.
    pub fn new<A>(alloc: A) -> AllocHandle
    where
        A: Allocator + Send + Sync + 'static,
    {
        AllocHandle {
            inner: Arc::new(alloc),
        }
    }

    /// A handle to the global allocator.
    pub fn global() -> AllocHandle {
        AllocHandle::new(Global)
    }

    /// Allocates a block of memory described by `layout`.
    pub fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, ()> {
        self.inner.allocate(layout)
    }

    /// Deallocates a block previously returned by [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// Same contract as [`Allocator::deallocate`].
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.inner.deallocate(ptr, layout);
    }
}

impl fmt::Debug for AllocHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocHandle").finish_non_exhaustive()
    }
}

/// A box whose storage comes from the chain's allocator.
///
/// Zero-sized values need no storage and never touch the allocator.
pub(crate) struct RawBox<T> {
    ptr: NonNull<T>,
    alloc: AllocHandle,
}

// Safety: `RawBox<T>` is a unique owner of `T`, like `Box<T>`. The allocator
// handle is `Send + Sync` by construction.
unsafe impl<T: Send> Send for RawBox<T> {}
unsafe impl<T: Sync> Sync for RawBox<T> {}

impl<T> RawBox<T> {
    pub(crate) fn new_in(value: T, alloc: AllocHandle) -> RawBox<T> {
        let layout = Layout::new::<T>();
        let ptr = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            match alloc.allocate(layout) {
                Ok(ptr) => ptr.cast::<T>(),
                Err(()) => handle_alloc_error(layout),
            }
        };
        unsafe { ptr::write(ptr.as_ptr(), value) }
        RawBox { ptr, alloc }
    }

    pub(crate) fn into_inner(self) -> T {
        let this = ManuallyDrop::new(self);
        let layout = Layout::new::<T>();
        unsafe {
            let value = ptr::read(this.ptr.as_ptr());
            let alloc = ptr::read(&this.alloc);
            if layout.size() != 0 {
                alloc.deallocate(this.ptr.cast(), layout);
            }
            value
        }
    }
}

impl<T> Drop for RawBox<T> {
    fn drop(&mut self) {
        let layout = Layout::new::<T>();
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            if layout.size() != 0 {
                self.alloc.deallocate(self.ptr.cast(), layout);
            }
        }
    }
}
