use crate::{
    hw::mcu,
    mutex::{LazyMainInit, MainInitCtx},
};

macro_rules! impl_port {
    (
        $struct:ident,
        $name:ident,
        $port:ident,
        $pin:ident,
        $ddr:ident,
        $($num:literal => $bit:ident),+ $(,)?
    ) => {
        #[allow(non_snake_case)]
        pub struct $struct {
            pub $name: mcu::$name,
        }

        // SAFETY: Is initialized when constructing the MainCtx.
        pub static $name: LazyMainInit<$struct> = unsafe { LazyMainInit::uninit() };

        impl LazyMainInit<$struct> {
            #[inline(always)]
            #[allow(dead_code)]
            pub fn get(&self, bit: usize) -> bool {
                // SAFETY: Initialized before IRQs are enabled.
                //         Reading a pin register is atomic.
                let p = unsafe { self.deref_unchecked() };
                match bit {
                    $($num => p.$name.$pin().read().$bit().bit(),)+
                    _ => unreachable!(),
                }
            }

            /// Single bit read-modify-write. Every caller that can race
            /// with the other context must mask the interrupt source
            /// around the call.
            #[inline(always)]
            #[allow(dead_code)]
            pub fn set(&self, bit: usize, value: bool) {
                // SAFETY: Initialized before IRQs are enabled.
                //         Race freedom is upheld by the caller.
                let p = unsafe { self.deref_unchecked() };
                match bit {
                    $($num => p.$name.$port().modify(|_, w| w.$bit().bit(value)),)+
                    _ => unreachable!(),
                };
            }
        }
    };
}

impl_port!(
    PortB, PORTB, portb, pinb, ddrb,
    0 => pb0, 1 => pb1, 2 => pb2, 3 => pb3, 4 => pb4, 5 => pb5, 6 => pb6, 7 => pb7,
);
impl_port!(
    PortG, PORTG, portg, ping, ddrg,
    0 => pg0, 1 => pg1, 2 => pg2, 3 => pg3, 4 => pg4, 5 => pg5,
);
impl_port!(
    PortL, PORTL, portl, pinl, ddrl,
    0 => pl0, 1 => pl1, 2 => pl2, 3 => pl3, 4 => pl4, 5 => pl5, 6 => pl6, 7 => pl7,
);

impl PortB {
    pub fn setup(&self, _: &MainInitCtx) {
        // PB7: on-board LED, output, off.
        // Everything else: input, floating (ISP pins among them).
        self.PORTB.portb().write(|w| w.pb7().clear_bit());
        self.PORTB.ddrb().write(|w| w.pb7().set_bit());
    }
}

impl PortG {
    pub fn setup(&self, _: &MainInitCtx) {
        // PG0..PG2: triac gate outputs, low.
        //   Light 1 -> PG0 (Arduino Mega pin 41)
        //   Light 2 -> PG1 (Arduino Mega pin 40)
        //   Receptacle -> PG2 (Arduino Mega pin 39)
        self.PORTG.portg().write(|w| {
            w.pg0().clear_bit()
                .pg1().clear_bit()
                .pg2().clear_bit()
        });
        self.PORTG.ddrg().write(|w| {
            w.pg0().set_bit()
                .pg1().set_bit()
                .pg2().set_bit()
        });
    }
}

impl PortL {
    pub fn setup(&self, _: &MainInitCtx) {
        // PL0: zero-cross input capture ICP4 (Arduino Mega pin 49),
        // input with the internal pull-up.
        self.PORTL.ddrl().write(|w| w.pl0().clear_bit());
        self.PORTL.portl().write(|w| w.pl0().set_bit());
    }
}

// vim: ts=4 sw=4 expandtab
