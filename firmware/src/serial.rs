use crate::{
    hw::{interrupt, mcu},
    mutex::{IrqCtx, LazyMainInit, MainCtx, MainInitCtx, Mutex},
    ring::Ring,
};
use avr_atomic::AvrAtomic;
use core::cell::Cell;
use triaclight_core::proto::Channel;

/// 38400 baud at F_CPU = 16 MHz, U2X off.
const UBRR: u16 = 25;

/// Must fit the u8 ring cursors and be a power of two.
const RX_BUF_SIZE: usize = 64;

#[allow(non_snake_case)]
pub struct Dp {
    pub USART0: mcu::USART0,
}

// SAFETY: Is initialized when constructing the MainCtx.
pub static DP: LazyMainInit<Dp> = unsafe { LazyMainInit::uninit() };

/// Command receive buffer. Filled by the receive interrupt,
/// drained by the foreground loop.
static RX_RING: Ring<u8, RX_BUF_SIZE> =
    Ring::new([const { Mutex::new(Cell::new(0)) }; RX_BUF_SIZE]);

/// Sticky flag: the receive interrupt found the ring full and had to
/// drop a byte. Anything in flight is unparsable from that point on,
/// so the foreground loop purges the channel when it sees this.
pub static RX_OVERFLOW: AvrAtomic<bool> = AvrAtomic::new();

impl Dp {
    pub fn setup(&self, _: &MainInitCtx) {
        self.USART0.ubrr0().write(|w| w.set(UBRR));
        // 8N1. Receiver, transmitter and the receive interrupt on.
        self.USART0.ucsr0c().write(|w| w.ucsz0().chr8());
        self.USART0.ucsr0b().write(|w| {
            w.rxen0().set_bit()
                .txen0().set_bit()
                .rxcie0().set_bit()
        });
    }
}

fn send_byte(m: &MainCtx<'_>, data: u8) {
    let dp = DP.deref(m);
    while dp.USART0.ucsr0a().read().udre0().bit_is_clear() {}
    dp.USART0.udr0().write(|w| w.set(data));
}

/// Send one response frame, prefixed with its length byte.
pub fn send_frame(m: &MainCtx<'_>, frame: &[u8]) {
    send_byte(m, frame.len() as u8);
    for &data in frame {
        send_byte(m, data);
    }
}

/// Drain the transmitter and restart the receiver.
pub fn port_flush(m: &MainCtx<'_>) {
    let dp = DP.deref(m);
    dp.USART0.ucsr0b().modify(|_, w| {
        w.rxcie0().clear_bit()
            .rxen0().clear_bit()
            .txen0().clear_bit()
    });
    // Wait for any transmission still in flight.
    while dp.USART0.ucsr0a().read().udre0().bit_is_clear() {}
    dp.USART0.ucsr0b().modify(|_, w| {
        w.rxcie0().set_bit()
            .rxen0().set_bit()
            .txen0().set_bit()
    });
}

/// True, if a received byte is waiting in the ring.
pub fn rx_available() -> bool {
    interrupt::free(|cs| !RX_RING.is_empty(cs))
}

pub fn irq_handler_usart0_rx(c: &IrqCtx) {
    let cs = c.cs();
    // SAFETY: DP is initialized before interrupts are enabled and
    //         reading the data register is atomic.
    let dp = unsafe { DP.deref_unchecked() };
    let data = dp.USART0.udr0().read().bits();
    if !RX_RING.insert(cs, data) {
        RX_OVERFLOW.store(true);
    }
}

/// The protocol's byte channel: the USART plus the receive ring.
pub struct SerialChannel<'m, 'cs> {
    m: &'m MainCtx<'cs>,
}

impl<'m, 'cs> SerialChannel<'m, 'cs> {
    pub fn new(m: &'m MainCtx<'cs>) -> Self {
        Self { m }
    }
}

impl Channel for SerialChannel<'_, '_> {
    /// Busy-wait until the receive interrupt delivers the next byte.
    /// Unbounded by design; the remote peer owns timeout policy.
    fn recv(&mut self) -> u8 {
        loop {
            if let Some(data) = interrupt::free(|cs| RX_RING.get(cs)) {
                return data;
            }
        }
    }

    fn send(&mut self, frame: &[u8]) {
        send_frame(self.m, frame);
    }

    fn purge(&mut self) {
        port_flush(self.m);
        interrupt::free(|cs| RX_RING.reset(cs));
        RX_OVERFLOW.store(false);
    }
}

// vim: ts=4 sw=4 expandtab
