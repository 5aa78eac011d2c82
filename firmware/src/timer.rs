use crate::{
    hw::{interrupt, mcu},
    mutex::{CriticalSection, IrqCtx, LazyMainInit, MainCtx, Mutex},
};
use core::cell::Cell;
use triaclight_core::zerocross::ZeroCross;

/// Timers 1, 3 and 4 run at F_CPU/8 = 2 MHz.
/// One half wave of the 60 Hz mains is 16667 ticks.
pub const HALF_PERIOD_TICKS: u16 = 16667;

#[allow(non_snake_case)]
pub struct Dp {
    pub TC1: mcu::TC1,
    pub TC3: mcu::TC3,
    pub TC4: mcu::TC4,
}

// SAFETY: Is initialized when constructing the MainCtx.
pub static DP: LazyMainInit<Dp> = unsafe { LazyMainInit::uninit() };

static ZEROCROSS: Mutex<Cell<ZeroCross>> = Mutex::new(Cell::new(ZeroCross::new()));

#[rustfmt::skip]
pub fn timer_init(m: &MainCtx<'_>) {
    let dp = DP.deref(m);

    // Timers 1 and 3: phase shift delay.
    // CTC mode with ICR as TOP = the half wave length, fcpu/8.
    // The compare interrupts stay off until a channel is bound.
    dp.TC1.tccr1a().write(|w| w);
    dp.TC1.tccr1c().write(|w| w);
    dp.TC1.icr1().write(|w| w.set(HALF_PERIOD_TICKS));
    dp.TC1.tcnt1().write(|w| w.set(0));
    dp.TC1.tccr1b().write(|w| {
        w.wgm1().set(0b11)
         .cs1().prescale_8()
    });

    dp.TC3.tccr3a().write(|w| w);
    dp.TC3.tccr3c().write(|w| w);
    dp.TC3.icr3().write(|w| w.set(HALF_PERIOD_TICKS));
    dp.TC3.tcnt3().write(|w| w.set(0));
    dp.TC3.tccr3b().write(|w| {
        w.wgm3().set(0b11)
         .cs3().prescale_8()
    });

    // Timer 4: zero-cross input capture on ICP4.
    // Normal mode, fcpu/8, noise canceller, edge sense starts on the
    // falling edge (matching the tracker's initial polarity).
    dp.TC4.tccr4a().write(|w| w);
    dp.TC4.tcnt4().write(|w| w.set(0));
    dp.TC4.tccr4b().write(|w| {
        w.icnc4().set_bit()
         .cs4().prescale_8()
    });
    dp.TC4.timsk4().write(|w| w.icie4().set_bit());
}

/// Program a channel's firing compare register.
///
/// All 16 bit timer accesses go through the hardware TEMP register,
/// which the capture interrupt also uses for the counter resync.
/// Callers therefore hold a critical section for the two byte access.
pub fn set_compare_cs(_cs: CriticalSection<'_>, ch: usize, value: u16) {
    // SAFETY: DP is initialized before interrupts are enabled and
    //         we are inside a critical section.
    let dp = unsafe { DP.deref_unchecked() };
    match ch {
        0 => dp.TC1.ocr1a().write(|w| w.set(value)),
        1 => dp.TC1.ocr1b().write(|w| w.set(value)),
        2 => dp.TC1.ocr1c().write(|w| w.set(value)),
        3 => dp.TC3.ocr3a().write(|w| w.set(value)),
        4 => dp.TC3.ocr3b().write(|w| w.set(value)),
        5 => dp.TC3.ocr3c().write(|w| w.set(value)),
        _ => unreachable!(),
    }
}

/// Mask or unmask a channel's firing compare interrupt.
pub fn compare_irq_cs(_cs: CriticalSection<'_>, ch: usize, enable: bool) {
    // SAFETY: DP is initialized before interrupts are enabled and
    //         we are inside a critical section.
    let dp = unsafe { DP.deref_unchecked() };
    match ch {
        0 => dp.TC1.timsk1().modify(|_, w| w.ocie1a().bit(enable)),
        1 => dp.TC1.timsk1().modify(|_, w| w.ocie1b().bit(enable)),
        2 => dp.TC1.timsk1().modify(|_, w| w.ocie1c().bit(enable)),
        3 => dp.TC3.timsk3().modify(|_, w| w.ocie3a().bit(enable)),
        4 => dp.TC3.timsk3().modify(|_, w| w.ocie3b().bit(enable)),
        5 => dp.TC3.timsk3().modify(|_, w| w.ocie3c().bit(enable)),
        _ => unreachable!(),
    }
}

/// Read a channel's running phase timer count.
pub fn counter_cs(_cs: CriticalSection<'_>, ch: usize) -> u16 {
    // SAFETY: DP is initialized before interrupts are enabled and
    //         we are inside a critical section.
    let dp = unsafe { DP.deref_unchecked() };
    match ch {
        0..=2 => dp.TC1.tcnt1().read().bits(),
        3..=5 => dp.TC3.tcnt3().read().bits(),
        _ => unreachable!(),
    }
}

/// The last (falling, rising) zero-cross capture stamps.
pub fn zc_stamps(_m: &MainCtx<'_>) -> (u16, u16) {
    interrupt::free(|cs| ZEROCROSS.borrow(cs).get().stamps())
}

/// Zero-cross edge capture.
///
/// Records the capture stamp and, once per full mains cycle, loads the
/// recomputed synchronized count into both phase timers so they stay
/// locked to the mains despite independent drift. A handful of
/// register operations, nothing more.
pub fn irq_handler_timer4_capt(c: &IrqCtx) {
    let cs = c.cs();
    // SAFETY: DP is initialized before interrupts are enabled and
    //         ISRs run with the global interrupt flag cleared.
    let dp = unsafe { DP.deref_unchecked() };

    let stamp = dp.TC4.icr4().read().bits();
    let mut zc = ZEROCROSS.borrow(cs).get();
    if let Some(count) = zc.capture(stamp, HALF_PERIOD_TICKS) {
        dp.TC1.tcnt1().write(|w| w.set(count));
        dp.TC3.tcnt3().write(|w| w.set(count));
    }
    ZEROCROSS.borrow(cs).set(zc);

    // Measure the next half wave from zero and flip the edge sense.
    dp.TC4.tcnt4().write(|w| w.set(0));
    dp.TC4.tccr4b().modify(|r, w| w.ices4().bit(!r.ices4().bit()));
}

// vim: ts=4 sw=4 expandtab
