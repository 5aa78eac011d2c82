use core::{cell::UnsafeCell, mem::MaybeUninit};

pub use crate::hw::Mutex;
pub use avr_device::interrupt::CriticalSection;

macro_rules! define_context {
    ($name:ident) => {
        pub struct $name<'cs>(CriticalSection<'cs>);

        impl<'cs> $name<'cs> {
            /// Create a new context.
            ///
            /// # SAFETY
            ///
            /// This may only be called from the corresponding context.
            /// `MainCtx` may only be constructed from `main()`
            /// and `IrqCtx` may only be constructed from ISRs.
            #[inline(always)]
            pub unsafe fn new() -> Self {
                // SAFETY: This cs is used with the low level PAC primitives.
                //         The IRQ safety is upheld by the context machinery instead.
                //
                //         If a function takes a `MainCtx` argument, it can only be
                //         called from `main()` context. Correspondingly for `IrqCtx`.
                //
                //         At the low level `LazyMainInit::deref` ensures that it can
                //         only be used from the main context. With this mechanism we
                //         can run the main context with IRQs enabled. There cannot
                //         be any concurrency in safe code.
                let cs = unsafe { CriticalSection::new() };
                fence();
                Self(cs)
            }

            /// Get the `CriticalSection` that belongs to this context.
            #[inline(always)]
            #[allow(dead_code)]
            pub fn cs(&self) -> CriticalSection<'cs> {
                self.0
            }
        }

        impl<'cs> Drop for $name<'cs> {
            #[inline(always)]
            fn drop(&mut self) {
                fence();
            }
        }
    };
}

define_context!(MainCtx);
define_context!(IrqCtx);

/// Main context initialization marker.
///
/// This marker does not have a pub constructor.
/// It is only created by [MainCtx].
pub struct MainInitCtx(());

impl<'cs, 'a> MainCtx<'cs> {
    /// SAFETY: The safety contract of [MainCtx::new] must be upheld.
    #[inline(always)]
    pub unsafe fn new_with_init<F: FnOnce(&'a MainInitCtx)>(f: F) -> Self {
        // SAFETY: We are creating the MainCtx.
        // Therefore, it's safe to construct the MainInitCtx marker.
        f(&MainInitCtx(()));
        // SAFETY: Safety contract of MainCtx::new is upheld.
        unsafe { Self::new() }
    }
}

/// Lazy initialization of static variables.
pub struct LazyMainInit<T>(UnsafeCell<MaybeUninit<T>>);

impl<T> LazyMainInit<T> {
    /// # SAFETY
    ///
    /// It must be ensured that the returned instance is initialized
    /// with a call to [Self::init] during construction of the [MainCtx].
    /// See [MainCtx::new_with_init].
    ///
    /// Using this object in any way before initializing it will
    /// result in Undefined Behavior.
    #[inline(always)]
    pub const unsafe fn uninit() -> Self {
        Self(UnsafeCell::new(MaybeUninit::uninit()))
    }

    #[inline(always)]
    pub fn init(&self, _m: &MainInitCtx, inner: T) {
        // SAFETY: Initialization is required for the `assume_init` calls.
        unsafe { *self.0.get() = MaybeUninit::new(inner) };
    }

    #[inline(always)]
    pub fn deref(&self, _m: &MainCtx) -> &T {
        // SAFETY: the `Self::uninit` safety contract ensures that
        //         `Self::init` is called before us.
        unsafe { (*self.0.get()).assume_init_ref() }
    }

    /// Access without a context witness.
    ///
    /// # SAFETY
    ///
    /// Initialization must have completed and everything done with the
    /// reference must be safe w.r.t. the other execution context.
    #[inline(always)]
    #[allow(dead_code)]
    pub unsafe fn deref_unchecked(&self) -> &T {
        // SAFETY: Initialization is upheld by the caller.
        unsafe { (*self.0.get()).assume_init_ref() }
    }
}

// SAFETY: If T is Send, then we can Send the whole object. The object only contains T state.
unsafe impl<T: Send> Send for LazyMainInit<T> {}

// SAFETY: The `deref` function ensures that it can only be called
//         from `MainCtx` compatible contexts.
unsafe impl<T> Sync for LazyMainInit<T> {}

/// Optimization and reordering fence.
#[inline(always)]
pub fn fence() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

/// Cheaper Option::unwrap() alternative.
///
/// This is cheaper, because it doesn't call into the panic unwind path.
/// Therefore, it does not impose caller-saves overhead onto the calling function.
#[inline(always)]
#[allow(dead_code)]
pub fn unwrap_option<T>(value: Option<T>) -> T {
    match value {
        Some(value) => value,
        None => reset_system(),
    }
}

/// Reset the system.
///
/// There is no free running watchdog in this firmware. The command
/// protocol deliberately blocks for an unbounded time in the middle of
/// a command, which no sane watchdog interval can tolerate. Therefore
/// the watchdog is only armed here, right before dying.
#[inline(never)]
#[allow(clippy::empty_loop)]
pub fn reset_system() -> ! {
    avr_device::interrupt::disable();
    // SAFETY: The asm code only accesses the WDT registers.
    //         We never return, so the forced reset cannot be observed.
    unsafe {
        // Timed sequence: WDCE+WDE, then WDE with the 16 ms timeout.
        core::arch::asm!(
            "ldi {tmp}, 0x18",
            "sts 0x60, {tmp}",
            "ldi {tmp}, 0x08",
            "sts 0x60, {tmp}",
            tmp = out(reg_upper) _,
            options(nostack, preserves_flags)
        );
    }
    loop {
        // Wait for the watchdog timer to trigger and reset the system.
    }
}

#[inline(always)]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    reset_system();
}

// vim: ts=4 sw=4 expandtab
