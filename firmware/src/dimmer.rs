use crate::{
    hw::{interrupt, Mutex},
    mutex::IrqCtx,
    ports::{PORTB, PORTG},
    timer,
};
use core::cell::Cell;
use triaclight_core::control::DimmerHw;
use triaclight_core::proto::{DIMMER_COUNT, UNIT_COUNT};

/// Power unit index to PORTG output bit.
const UNIT_PIN: [usize; UNIT_COUNT] = [0, 1, 2];

/// Firing routing table: dimmer channel to PORTG output bit.
///
/// Written from the foreground only while the channel's compare
/// interrupt is masked, read by the firing interrupts.
static FIRING: [Mutex<Cell<Option<u8>>>; DIMMER_COUNT] =
    [const { Mutex::new(Cell::new(None)) }; DIMMER_COUNT];

/// Triac gate pulse width: 3 us = 48 cycles at 16 MHz.
/// The dec/brne pair burns 3 cycles per round.
#[inline(always)]
fn pulse_width_delay() {
    // SAFETY: Only clobbers the declared scratch register and flags.
    unsafe {
        core::arch::asm!(
            "ldi {cnt}, 16",
            "1:",
            "dec {cnt}",
            "brne 1b",
            cnt = out(reg_upper) _,
            options(nostack)
        );
    }
}

/// Fire one gate pulse for a channel whose compare just matched.
fn fire(c: &IrqCtx, ch: usize) {
    if let Some(pin) = FIRING[ch].borrow(c.cs()).get() {
        let pin = pin as usize;
        PORTG.set(pin, true);
        pulse_width_delay();
        PORTG.set(pin, false);
    }
}

pub fn irq_handler_fire0(c: &IrqCtx) {
    fire(c, 0);
}

pub fn irq_handler_fire1(c: &IrqCtx) {
    fire(c, 1);
}

pub fn irq_handler_fire2(c: &IrqCtx) {
    fire(c, 2);
}

pub fn irq_handler_fire3(c: &IrqCtx) {
    fire(c, 3);
}

pub fn irq_handler_fire4(c: &IrqCtx) {
    fire(c, 4);
}

pub fn irq_handler_fire5(c: &IrqCtx) {
    fire(c, 5);
}

/// The real hardware behind the dimmer pool.
///
/// Every operation runs with interrupts masked. That covers the 16 bit
/// timer TEMP register, the routing table and the PORTG read-modify-
/// writes that the firing interrupts also touch.
pub struct Hw;

impl DimmerHw for Hw {
    fn set_compare(&mut self, ch: usize, value: u16) {
        interrupt::free(|cs| timer::set_compare_cs(cs, ch, value));
    }

    fn counter(&self, ch: usize) -> u16 {
        interrupt::free(|cs| timer::counter_cs(cs, ch))
    }

    fn bind(&mut self, ch: usize, unit: usize) {
        interrupt::free(|cs| {
            FIRING[ch].borrow(cs).set(Some(UNIT_PIN[unit] as u8));
            timer::compare_irq_cs(cs, ch, true);
        });
    }

    fn unbind(&mut self, ch: usize) {
        interrupt::free(|cs| {
            timer::compare_irq_cs(cs, ch, false);
            FIRING[ch].borrow(cs).set(None);
        });
    }

    fn drive(&mut self, unit: usize, on: bool) {
        interrupt::free(|_| PORTG.set(UNIT_PIN[unit], on));
    }

    fn pulse(&mut self, unit: usize) {
        interrupt::free(|_| {
            // The board LED latches on once a catch-up pulse was
            // ever needed. Visible from across the room.
            PORTB.set(7, true);
            PORTG.set(UNIT_PIN[unit], true);
            pulse_width_delay();
            PORTG.set(UNIT_PIN[unit], false);
        });
    }
}

// vim: ts=4 sw=4 expandtab
