pub use atmega::{self as mcu, Peripherals};
pub use avr_device::atmega2560 as atmega;
pub use avr_device::interrupt::{self, Mutex};

use crate::mutex::IrqCtx;

macro_rules! define_isr {
    ($name:ident, $handler:path) => {
        #[avr_device::interrupt(atmega2560)]
        fn $name() {
            // SAFETY: We are inside of an interrupt handler.
            // Therefore, it is safe to construct an `IrqCtx`.
            let c = unsafe { IrqCtx::new() };
            $handler(&c);
        }
    };
}

// Zero-cross input capture.
define_isr!(TIMER4_CAPT, crate::timer::irq_handler_timer4_capt);

// Triac firing, one per dimmer channel.
define_isr!(TIMER1_COMPA, crate::dimmer::irq_handler_fire0);
define_isr!(TIMER1_COMPB, crate::dimmer::irq_handler_fire1);
define_isr!(TIMER1_COMPC, crate::dimmer::irq_handler_fire2);
define_isr!(TIMER3_COMPA, crate::dimmer::irq_handler_fire3);
define_isr!(TIMER3_COMPB, crate::dimmer::irq_handler_fire4);
define_isr!(TIMER3_COMPC, crate::dimmer::irq_handler_fire5);

// Command byte reception.
define_isr!(USART0_RX, crate::serial::irq_handler_usart0_rx);

// vim: ts=4 sw=4 expandtab
