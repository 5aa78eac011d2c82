use crate::levels::{LEVEL_FULL, LEVEL_OFF, compare_value};

/// State of one power unit.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum UnitState {
    Off = 1,
    On = 2,
    Dimming = 3,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
    /// All dimmer channels are bound to other units.
    NoDimmerAvailable,
}

/// Hardware seam of the dimmer pool.
///
/// The firmware implements this against the real timers and pins.
/// The trait methods carry the interrupt masking contract:
///
/// - [DimmerHw::bind] routes the channel firing interrupt to the unit
///   output pin and enables it. It is only called after the compare
///   value has been programmed with [DimmerHw::set_compare].
/// - [DimmerHw::unbind] disables the channel firing interrupt. It is
///   always called *before* the owner link is severed, so an in-flight
///   firing interrupt can never observe a half torn link.
/// - Mutations of an already enabled channel (compare rewrites) must be
///   guarded against that channel's interrupt by the implementation.
pub trait DimmerHw {
    /// Program the channel's compare register.
    fn set_compare(&mut self, ch: usize, value: u16);

    /// Read the channel's running phase timer count.
    fn counter(&self, ch: usize) -> u16;

    /// Attach the channel firing interrupt to a unit and enable it.
    fn bind(&mut self, ch: usize, unit: usize);

    /// Disable the channel firing interrupt.
    fn unbind(&mut self, ch: usize);

    /// Latch the unit output pin continuously high or low.
    fn drive(&mut self, unit: usize, on: bool);

    /// Fire one short triac pulse on the unit output pin.
    fn pulse(&mut self, unit: usize);
}

/// One controllable AC output.
struct PowerUnit {
    /// Fixed 1-based wire id.
    id: u8,
    state: UnitState,
    /// Index of the bound dimmer channel, if any.
    dimmer: Option<u8>,
}

/// One phase timer compare channel.
struct DimmerChannel {
    level: u8,
    /// Last programmed compare value, kept for telemetry.
    compare: u16,
    /// Index of the owning power unit, if any.
    owner: Option<u8>,
}

/// The dimmer pool and all power unit state machines.
///
/// Owns the fixed unit and channel inventories by value. The
/// bidirectional unit<->channel links are small indices; the invariant
/// is that they are always either both set or both empty.
pub struct Controller<H, const CHANNELS: usize, const UNITS: usize> {
    hw: H,
    half_period: u16,
    units: [PowerUnit; UNITS],
    channels: [DimmerChannel; CHANNELS],
}

impl<H: DimmerHw, const CHANNELS: usize, const UNITS: usize> Controller<H, CHANNELS, UNITS> {
    /// All units start out `Off` and all channels unbound.
    pub fn new(hw: H, half_period: u16) -> Self {
        Self {
            hw,
            half_period,
            units: core::array::from_fn(|i| PowerUnit {
                id: i as u8 + 1,
                state: UnitState::Off,
                dimmer: None,
            }),
            channels: core::array::from_fn(|_| DimmerChannel {
                level: 0,
                compare: 0,
                owner: None,
            }),
        }
    }

    /// Request a new level for a unit.
    ///
    /// Level 0 latches the pin low, levels >= 100 latch it high. Both
    /// release a bound channel back to the pool. Levels 1..=99 dim:
    /// either by reprogramming the already bound channel in place or by
    /// acquiring a free one. On `NoDimmerAvailable` nothing is mutated.
    pub fn set_level(&mut self, unit: usize, level: u8) -> Result<(), Error> {
        if level >= LEVEL_FULL {
            self.latch(unit, true);
            Ok(())
        } else if level == LEVEL_OFF {
            self.latch(unit, false);
            Ok(())
        } else if let Some(ch) = self.units[unit].dimmer {
            self.reprogram(unit, ch as usize, level);
            Ok(())
        } else {
            self.acquire(unit, level)
        }
    }

    fn latch(&mut self, unit: usize, on: bool) {
        if let Some(ch) = self.units[unit].dimmer {
            self.release(unit, ch as usize);
        }
        self.hw.drive(unit, on);
        self.units[unit].state = if on { UnitState::On } else { UnitState::Off };
    }

    /// First-fit scan for a free channel and bind it.
    fn acquire(&mut self, unit: usize, level: u8) -> Result<(), Error> {
        let Some(ch) = self.channels.iter().position(|c| c.owner.is_none()) else {
            return Err(Error::NoDimmerAvailable);
        };

        let compare = compare_value(level, self.half_period);
        let c = &mut self.channels[ch];
        c.level = level;
        c.compare = compare;
        c.owner = Some(unit as u8);

        // Program the compare value before the firing interrupt can hit.
        self.hw.set_compare(ch, compare);
        self.hw.bind(ch, unit);

        self.units[unit].dimmer = Some(ch as u8);
        self.units[unit].state = UnitState::Dimming;
        Ok(())
    }

    /// Unbind a channel and return it to the pool.
    ///
    /// The firing interrupt is disabled first, then the link is torn
    /// down. The output pin is left as is; the caller latches it.
    fn release(&mut self, unit: usize, ch: usize) {
        self.hw.unbind(ch);
        self.channels[ch].level = 0;
        self.channels[ch].owner = None;
        self.units[unit].dimmer = None;
    }

    /// Rewrite the compare value of an already bound channel.
    fn reprogram(&mut self, unit: usize, ch: usize, level: u8) {
        let compare = compare_value(level, self.half_period);

        // When stepping up, the new firing point lies earlier in the
        // half wave. If the timer already ran past it, this half wave
        // would skip one step, which is visible on a lamp. Fire one
        // catch-up pulse by hand. Best effort: some timing races still
        // produce a short flicker.
        if level > self.channels[ch].level && self.hw.counter(ch) >= compare {
            self.hw.pulse(unit);
        }

        self.channels[ch].level = level;
        self.channels[ch].compare = compare;
        self.hw.set_compare(ch, compare);
    }

    pub fn unit_count(&self) -> usize {
        UNITS
    }

    pub fn channel_count(&self) -> usize {
        CHANNELS
    }

    pub fn unit_state(&self, unit: usize) -> UnitState {
        self.units[unit].state
    }

    /// Channel index bound to a unit, if any.
    pub fn dimmer_of(&self, unit: usize) -> Option<usize> {
        self.units[unit].dimmer.map(|ch| ch as usize)
    }

    /// Unit index owning a channel, if any.
    pub fn owner_of(&self, ch: usize) -> Option<usize> {
        self.channels[ch].owner.map(|u| u as usize)
    }

    /// Telemetry snapshot of one channel: (owner id, level, compare).
    /// `None` for an unbound channel.
    pub fn channel_info(&self, ch: usize) -> Option<(u8, u8, u16)> {
        let c = &self.channels[ch];
        c.owner
            .map(|u| (self.units[u as usize].id, c.level, c.compare))
    }

    /// Telemetry snapshot of one unit: (id, state, level).
    /// The level is the bound channel's level, 0 when not dimming.
    pub fn unit_info(&self, unit: usize) -> (u8, u8, u8) {
        let u = &self.units[unit];
        let level = match u.dimmer {
            Some(ch) => self.channels[ch as usize].level,
            None => 0,
        };
        (u.id, u.state as u8, level)
    }

    pub fn hw(&self) -> &H {
        &self.hw
    }

    pub fn hw_mut(&mut self) -> &mut H {
        &mut self.hw
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::DimmerHw;

    /// Recording fake for the hardware seam.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub enum Op {
        SetCompare(usize, u16),
        Bind(usize, usize),
        Unbind(usize),
        Drive(usize, bool),
        Pulse(usize),
    }

    pub struct FakeHw {
        pub ops: [Option<Op>; 64],
        pub nr_ops: usize,
        /// Value returned by [DimmerHw::counter].
        pub counter: u16,
    }

    impl FakeHw {
        pub fn new() -> Self {
            Self {
                ops: [None; 64],
                nr_ops: 0,
                counter: 0,
            }
        }

        fn record(&mut self, op: Op) {
            self.ops[self.nr_ops] = Some(op);
            self.nr_ops += 1;
        }

        pub fn take_ops(&mut self) -> ([Option<Op>; 64], usize) {
            let ret = (self.ops, self.nr_ops);
            self.ops = [None; 64];
            self.nr_ops = 0;
            ret
        }
    }

    impl DimmerHw for FakeHw {
        fn set_compare(&mut self, ch: usize, value: u16) {
            self.record(Op::SetCompare(ch, value));
        }

        fn counter(&self, ch: usize) -> u16 {
            let _ = ch;
            self.counter
        }

        fn bind(&mut self, ch: usize, unit: usize) {
            self.record(Op::Bind(ch, unit));
        }

        fn unbind(&mut self, ch: usize) {
            self.record(Op::Unbind(ch));
        }

        fn drive(&mut self, unit: usize, on: bool) {
            self.record(Op::Drive(unit, on));
        }

        fn pulse(&mut self, unit: usize) {
            self.record(Op::Pulse(unit));
        }
    }
}


// vim: ts=4 sw=4 expandtab
