/// Polarity of the next expected zero-crossing edge.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Edge {
    Falling,
    Rising,
}

/// Compute the synchronized phase timer counter value.
///
/// `falling` and `rising` are the captured half wave lengths of the
/// mains cycle that just completed, `half_period` is the nominal half
/// wave length. All arithmetic is wrapping integer math:
///
/// `counter = (falling + rising + 2 * half_period) >> 2`
///
/// Loading this into the free running phase timers right after the
/// rising edge keeps them locked to the mains despite clock drift.
#[inline]
pub const fn resync_counter(falling: u16, rising: u16, half_period: u16) -> u16 {
    falling
        .wrapping_add(rising)
        .wrapping_add(half_period << 1)
        >> 2
}

/// Mains zero-crossing tracker.
///
/// Fed with raw capture timer stamps from the zero-cross input capture
/// interrupt. Stores the stamp into the falling or rising slot depending
/// on the tracked polarity and flips the polarity. The caller must reset
/// the capture counter after every edge so that each stamp measures one
/// half wave from zero.
#[derive(Clone, Copy)]
pub struct ZeroCross {
    falling: u16,
    rising: u16,
    edge: Edge,
}

impl ZeroCross {
    pub const fn new() -> Self {
        Self {
            falling: 0,
            rising: 0,
            edge: Edge::Falling,
        }
    }

    /// Record one captured edge.
    ///
    /// Returns the resynchronization counter value on the rising edge,
    /// i.e. once per full mains cycle. `None` on the falling edge.
    pub fn capture(&mut self, stamp: u16, half_period: u16) -> Option<u16> {
        match self.edge {
            Edge::Falling => {
                self.falling = stamp;
                self.edge = Edge::Rising;
                None
            }
            Edge::Rising => {
                self.rising = stamp;
                self.edge = Edge::Falling;
                Some(resync_counter(self.falling, self.rising, half_period))
            }
        }
    }

    /// The last recorded (falling, rising) stamps, for telemetry.
    pub fn stamps(&self) -> (u16, u16) {
        (self.falling, self.rising)
    }

    pub fn edge(&self) -> Edge {
        self.edge
    }
}

impl Default for ZeroCross {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_resync_formula() {
        // No wrap: the sum stays below 2^16.
        assert_eq!(resync_counter(16000, 17000, 15000), (16000 + 17000 + 2 * 15000) >> 2);
        // 16000 + 17000 + 2 * 16667 = 66334, which wraps the u16 sum.
        assert_eq!(
            resync_counter(16000, 17000, 16667),
            (((16000u32 + 17000 + 2 * 16667) & 0xFFFF) >> 2) as u16
        );
        assert_eq!(resync_counter(0, 0, 0), 0);
        // Wrapping, not saturating.
        assert_eq!(
            resync_counter(0xFFFF, 0xFFFF, 0x8000),
            0xFFFFu16
                .wrapping_add(0xFFFF)
                .wrapping_add(0x8000u16 << 1)
                >> 2
        );
    }

    #[test]
    fn test_edge_alternation() {
        let mut zc = ZeroCross::new();
        assert_eq!(zc.edge(), Edge::Falling);

        // Falling edge: stamp stored, no resync yet.
        assert_eq!(zc.capture(16600, 16667), None);
        assert_eq!(zc.edge(), Edge::Rising);
        assert_eq!(zc.stamps(), (16600, 0));

        // Rising edge: full cycle complete, resync value returned.
        let resync = zc.capture(16700, 16667);
        assert_eq!(resync, Some(resync_counter(16600, 16700, 16667)));
        assert_eq!(zc.edge(), Edge::Falling);
        assert_eq!(zc.stamps(), (16600, 16700));

        // Next cycle overwrites the slots.
        assert_eq!(zc.capture(16500, 16667), None);
        assert_eq!(zc.stamps(), (16500, 16700));
    }

    #[test]
    fn test_resync_once_per_cycle() {
        let mut zc = ZeroCross::new();
        let mut resyncs = 0;
        for _ in 0..10 {
            if zc.capture(16667, 16667).is_some() {
                resyncs += 1;
            }
        }
        assert_eq!(resyncs, 5);
    }
}

// vim: ts=4 sw=4 expandtab
