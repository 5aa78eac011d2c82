#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]
#![feature(asm_experimental_arch)]

mod dimmer;
mod hw;
mod mutex;
mod ports;
mod ring;
mod serial;
mod timer;

use crate::{
    hw::{interrupt, Peripherals},
    mutex::{unwrap_option, MainCtx},
    ports::{PORTB, PORTG, PORTL, PortB, PortG, PortL},
    serial::SerialChannel,
    timer::{timer_init, HALF_PERIOD_TICKS},
};
use triaclight_core::proto::{handle_lead_byte, Channel as _, Ctl, IDENT};

#[avr_device::entry]
fn main() -> ! {
    let dp = unwrap_option(Peripherals::take());

    let init_static_vars = |ctx| {
        let p = PortB { PORTB: dp.PORTB };
        p.setup(ctx);
        PORTB.init(ctx, p);

        let p = PortG { PORTG: dp.PORTG };
        p.setup(ctx);
        PORTG.init(ctx, p);

        let p = PortL { PORTL: dp.PORTL };
        p.setup(ctx);
        PORTL.init(ctx, p);

        let s = serial::Dp { USART0: dp.USART0 };
        s.setup(ctx);
        serial::DP.init(ctx, s);

        timer::DP.init(
            ctx,
            timer::Dp {
                TC1: dp.TC1,
                TC3: dp.TC3,
                TC4: dp.TC4,
            },
        );
    };

    // # SAFETY
    //
    // This is the context handle for the main() function.
    // Holding a reference to this object proves that the holder
    // is running in main() context.
    let m = unsafe { MainCtx::new_with_init(init_static_vars) };

    timer_init(&m);

    let mut ctl: Ctl<dimmer::Hw> = Ctl::new(dimmer::Hw, HALF_PERIOD_TICKS);
    let mut chan = SerialChannel::new(&m);

    // SAFETY: This must be after construction of MainCtx
    //         and after initialization of static MainInit variables.
    unsafe { interrupt::enable() };

    // Announce ourselves to the peer.
    chan.send(&IDENT);

    loop {
        if serial::RX_OVERFLOW.load() {
            // The receive ring overran. Whatever request was in flight
            // is unparsable now, so drop it all and start over.
            chan.purge();
        }
        if serial::rx_available() {
            let lead = chan.recv();
            handle_lead_byte(lead, &mut chan, &mut ctl, timer::zc_stamps(&m));
        }
    }
}

// vim: ts=4 sw=4 expandtab
