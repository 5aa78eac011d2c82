//! The command/response protocol spoken over the serial byte channel.
//!
//! Requests are `[ESCAPE, opcode, payload...]`. Every response frame is
//! length prefixed on the wire. There is no out-of-band framing
//! recovery: any error response is followed by a channel purge and the
//! peer has to start over with a fresh escape byte.

use crate::control::{Controller, DimmerHw, Error};

/// Lead byte of every request frame.
pub const ESCAPE: u8 = b'\\';

/// Identity string sent unsolicited after boot, as one frame.
pub const IDENT: [u8; 6] = [0, 0, 0, b'B', b'e', b'n'];

/// Number of phase timer compare channels.
pub const DIMMER_COUNT: usize = 6;
/// Number of controllable power units. Unit ids are 1-based.
pub const UNIT_COUNT: usize = 3;
/// Payload size of the Info telemetry block.
pub const INFO_SIZE: usize = 4 + 4 * DIMMER_COUNT + 3 * UNIT_COUNT;

/// The production controller configuration the firmware drives.
pub type Ctl<H> = Controller<H, DIMMER_COUNT, UNIT_COUNT>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Opcode {
    Nothing = 0,
    Info = 1,
    On = 2,
    Off = 3,
    Level = 4,
}

impl Opcode {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Nothing),
            1 => Some(Self::Info),
            2 => Some(Self::On),
            3 => Some(Self::Off),
            4 => Some(Self::Level),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ResultCode {
    Success = 0,
    InvalidStart = 1,
    InvalidCommand = 2,
    InvalidId = 3,
    NoDimmerAvailable = 4,
    /// Reserved in the protocol vocabulary. Never produced.
    NoClockAvailable = 5,
    Failure = 126,
}

/// The byte channel the protocol runs on.
///
/// [Channel::recv] is the bounded suspension primitive: the consumer
/// blocks until the producer delivers the next byte. There is no
/// timeout in the firmware; the remote peer owns retry policy.
pub trait Channel {
    /// Block until the next request byte is available.
    fn recv(&mut self) -> u8;

    /// Send one response frame, prefixed with its length byte.
    fn send(&mut self, frame: &[u8]);

    /// Flush the transport and reset the receive cursors,
    /// discarding anything already queued.
    fn purge(&mut self);
}

/// Process one request, starting from its lead byte.
///
/// A non-escape lead byte is a framing error: a fixed status is sent
/// and the channel purged. Otherwise the opcode and its payload are
/// consumed from the channel and dispatched. Any result other than
/// `Success` purges the channel afterwards.
///
/// Generic over the controller dimensions; the firmware instantiates
/// it with [Ctl]. The Info frame buffer is sized for at most
/// [DIMMER_COUNT] channels and [UNIT_COUNT] units.
///
/// `zc_stamps` are the last (falling, rising) zero-cross capture
/// stamps, reported by the Info telemetry block.
pub fn handle_lead_byte<C: Channel, H: DimmerHw, const CHANNELS: usize, const UNITS: usize>(
    lead: u8,
    chan: &mut C,
    ctl: &mut Controller<H, CHANNELS, UNITS>,
    zc_stamps: (u16, u16),
) -> ResultCode {
    if lead != ESCAPE {
        chan.send(&[ResultCode::InvalidStart as u8, lead, 0]);
        chan.purge();
        return ResultCode::InvalidStart;
    }

    let opcode = chan.recv();
    let res = dispatch(opcode, chan, ctl, zc_stamps);
    if res != ResultCode::Success {
        chan.purge();
    }
    res
}

fn dispatch<C: Channel, H: DimmerHw, const CHANNELS: usize, const UNITS: usize>(
    opcode: u8,
    chan: &mut C,
    ctl: &mut Controller<H, CHANNELS, UNITS>,
    zc_stamps: (u16, u16),
) -> ResultCode {
    match Opcode::from_raw(opcode) {
        Some(Opcode::Nothing) => ResultCode::Success,
        Some(Opcode::On) => unit_request(chan, ctl, opcode, Some(100)),
        Some(Opcode::Off) => unit_request(chan, ctl, opcode, Some(0)),
        Some(Opcode::Level) => unit_request(chan, ctl, opcode, None),
        Some(Opcode::Info) => send_info(chan, ctl, zc_stamps),
        None => {
            chan.send(&[ResultCode::InvalidCommand as u8, opcode, 0]);
            ResultCode::InvalidCommand
        }
    }
}

/// On/Off/Level: validate the 1-based unit id, run the state machine,
/// echo a `(result, opcode, id)` status.
fn unit_request<C: Channel, H: DimmerHw, const CHANNELS: usize, const UNITS: usize>(
    chan: &mut C,
    ctl: &mut Controller<H, CHANNELS, UNITS>,
    opcode: u8,
    fixed_level: Option<u8>,
) -> ResultCode {
    let id = chan.recv();
    let level = match fixed_level {
        Some(level) => level,
        None => chan.recv(),
    };

    let res = if id == 0 || id as usize > ctl.unit_count() {
        ResultCode::InvalidId
    } else {
        match ctl.set_level(id as usize - 1, level) {
            Ok(()) => ResultCode::Success,
            Err(Error::NoDimmerAvailable) => ResultCode::NoDimmerAvailable,
        }
    };

    chan.send(&[res as u8, opcode, id]);
    res
}

/// Assemble and send the fixed size telemetry block.
fn send_info<C: Channel, H: DimmerHw, const CHANNELS: usize, const UNITS: usize>(
    chan: &mut C,
    ctl: &mut Controller<H, CHANNELS, UNITS>,
    zc_stamps: (u16, u16),
) -> ResultCode {
    let mut info = [0u8; 3 + INFO_SIZE];
    info[0] = ResultCode::Success as u8;
    info[1] = Opcode::Info as u8;
    info[2] = 0;
    info[3] = zc_stamps.0 as u8;
    info[4] = (zc_stamps.0 >> 8) as u8;
    info[5] = zc_stamps.1 as u8;
    info[6] = (zc_stamps.1 >> 8) as u8;

    let mut pos = 7;
    for ch in 0..ctl.channel_count() {
        let (id, level, compare) = ctl.channel_info(ch).unwrap_or((0, 0, 0));
        info[pos] = id;
        info[pos + 1] = level;
        info[pos + 2] = compare as u8;
        info[pos + 3] = (compare >> 8) as u8;
        pos += 4;
    }
    for unit in 0..ctl.unit_count() {
        let (id, state, level) = ctl.unit_info(unit);
        info[pos] = id;
        info[pos + 1] = state;
        info[pos + 2] = level;
        pos += 3;
    }

    chan.send(&info[..pos]);
    ResultCode::Success
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::control::UnitState;
    use crate::control::fake::FakeHw;
    use crate::levels::compare_value;

    const HALF_PERIOD: u16 = 16667;

    /// Scripted byte channel. Panics if a request underruns its
    /// scripted bytes, which would mean the engine blocked forever.
    struct FakeChannel {
        rx: [u8; 16],
        rx_len: usize,
        rx_pos: usize,
        tx: [u8; 64],
        tx_len: usize,
        purges: usize,
    }

    impl FakeChannel {
        fn new(rx: &[u8]) -> Self {
            let mut c = Self {
                rx: [0; 16],
                rx_len: rx.len(),
                rx_pos: 0,
                tx: [0; 64],
                tx_len: 0,
                purges: 0,
            };
            c.rx[..rx.len()].copy_from_slice(rx);
            c
        }

        fn sent(&self) -> &[u8] {
            &self.tx[..self.tx_len]
        }
    }

    impl Channel for FakeChannel {
        fn recv(&mut self) -> u8 {
            assert!(self.rx_pos < self.rx_len, "engine blocked on an empty channel");
            let byte = self.rx[self.rx_pos];
            self.rx_pos += 1;
            byte
        }

        fn send(&mut self, frame: &[u8]) {
            self.tx[self.tx_len] = frame.len() as u8;
            self.tx[self.tx_len + 1..self.tx_len + 1 + frame.len()].copy_from_slice(frame);
            self.tx_len += 1 + frame.len();
        }

        fn purge(&mut self) {
            self.purges += 1;
        }
    }

    fn run<const C: usize, const U: usize>(
        ctl: &mut Controller<FakeHw, C, U>,
        request: &[u8],
        zc: (u16, u16),
    ) -> FakeChannel {
        let mut chan = FakeChannel::new(&request[1..]);
        handle_lead_byte(request[0], &mut chan, ctl, zc);
        chan
    }

    fn controller() -> Ctl<FakeHw> {
        Controller::new(FakeHw::new(), HALF_PERIOD)
    }

    #[test]
    fn test_ident_framing() {
        // The boot handshake is 7 bytes on the wire.
        let mut chan = FakeChannel::new(&[]);
        chan.send(&IDENT);
        assert_eq!(chan.sent(), &[6, 0, 0, 0, b'B', b'e', b'n']);
    }

    #[test]
    fn test_on_command() {
        let mut ctl = controller();
        let chan = run(&mut ctl, &[ESCAPE, 2, 1], (0, 0));
        assert_eq!(ctl.unit_state(0), UnitState::On);
        assert_eq!(chan.sent(), &[3, 0, 2, 1]);
        assert_eq!(chan.purges, 0);
    }

    #[test]
    fn test_off_command() {
        let mut ctl = controller();
        ctl.set_level(2, 100).unwrap();
        let chan = run(&mut ctl, &[ESCAPE, 3, 3], (0, 0));
        assert_eq!(ctl.unit_state(2), UnitState::Off);
        assert_eq!(chan.sent(), &[3, 0, 3, 3]);
    }

    #[test]
    fn test_level_command() {
        let mut ctl = controller();
        let chan = run(&mut ctl, &[ESCAPE, 4, 1, 50], (0, 0));
        assert_eq!(ctl.unit_state(0), UnitState::Dimming);
        assert_eq!(ctl.dimmer_of(0), Some(0));
        assert_eq!(chan.sent(), &[3, 0, 4, 1]);
    }

    #[test]
    fn test_invalid_id() {
        let mut ctl = controller();
        let chan = run(&mut ctl, &[ESCAPE, 4, 99, 50], (0, 0));
        // Status echoes the bad id, the channel is purged and no
        // hardware was touched.
        assert_eq!(chan.sent(), &[3, 3, 4, 99]);
        assert_eq!(chan.purges, 1);
        assert_eq!(ctl.hw().nr_ops, 0);
        for unit in 0..UNIT_COUNT {
            assert_eq!(ctl.unit_state(unit), UnitState::Off);
        }

        // Id 0 is invalid too (ids are 1-based).
        let chan = run(&mut ctl, &[ESCAPE, 2, 0], (0, 0));
        assert_eq!(chan.sent(), &[3, 3, 2, 0]);
        assert_eq!(chan.purges, 1);
    }

    #[test]
    fn test_no_dimmer_available() {
        // A pool smaller than the unit count makes exhaustion
        // reachable over the wire.
        let mut ctl: Controller<FakeHw, 2, 3> = Controller::new(FakeHw::new(), HALF_PERIOD);
        let chan = run(&mut ctl, &[ESCAPE, 4, 1, 40], (0, 0));
        assert_eq!(chan.sent(), &[3, 0, 4, 1]);
        let chan = run(&mut ctl, &[ESCAPE, 4, 2, 40], (0, 0));
        assert_eq!(chan.sent(), &[3, 0, 4, 2]);

        // Pool exhausted: the status echoes the request and the
        // channel is purged. Unit 3 stays untouched.
        let chan = run(&mut ctl, &[ESCAPE, 4, 3, 40], (0, 0));
        assert_eq!(chan.sent(), &[3, 4, 4, 3]);
        assert_eq!(chan.purges, 1);
        assert_eq!(ctl.unit_state(2), UnitState::Off);
        assert_eq!(ctl.dimmer_of(2), None);
    }

    #[test]
    fn test_invalid_start() {
        let mut ctl = controller();
        let chan = run(&mut ctl, &[0x41], (0, 0));
        assert_eq!(chan.sent(), &[3, 1, 0x41, 0]);
        assert_eq!(chan.purges, 1);
    }

    #[test]
    fn test_invalid_command() {
        let mut ctl = controller();
        let chan = run(&mut ctl, &[ESCAPE, 9], (0, 0));
        assert_eq!(chan.sent(), &[3, 2, 9, 0]);
        assert_eq!(chan.purges, 1);
    }

    #[test]
    fn test_nothing_command() {
        let mut ctl = controller();
        let chan = run(&mut ctl, &[ESCAPE, 0], (0, 0));
        assert!(chan.sent().is_empty());
        assert_eq!(chan.purges, 0);
    }

    #[test]
    fn test_info_layout() {
        let mut ctl = controller();
        ctl.set_level(0, 50).unwrap(); // unit 1 -> channel 0
        ctl.set_level(1, 100).unwrap(); // unit 2 on, no channel

        let chan = run(&mut ctl, &[ESCAPE, 1], (0x1234, 0x5678));
        let tx = chan.sent();
        assert_eq!(tx.len(), 1 + 3 + INFO_SIZE);
        assert_eq!(tx[0] as usize, 3 + INFO_SIZE);
        assert_eq!(&tx[1..4], &[0, 1, 0]);

        // Zero-cross stamps, little endian.
        assert_eq!(&tx[4..8], &[0x34, 0x12, 0x78, 0x56]);

        // Channel 0 is bound to unit id 1 at level 50.
        let cv = compare_value(50, HALF_PERIOD);
        assert_eq!(&tx[8..12], &[1, 50, cv as u8, (cv >> 8) as u8]);
        // Channels 1..5 are unbound and report all zeros.
        for ch in 1..DIMMER_COUNT {
            assert_eq!(&tx[8 + 4 * ch..12 + 4 * ch], &[0, 0, 0, 0]);
        }

        // Per-unit records: id, state, level.
        let units = 8 + 4 * DIMMER_COUNT;
        assert_eq!(&tx[units..units + 3], &[1, UnitState::Dimming as u8, 50]);
        assert_eq!(&tx[units + 3..units + 6], &[2, UnitState::On as u8, 0]);
        assert_eq!(&tx[units + 6..units + 9], &[3, UnitState::Off as u8, 0]);
    }

    #[test]
    fn test_sequential_reprogram() {
        let mut ctl = controller();
        let chan = run(&mut ctl, &[ESCAPE, 4, 1, 30], (0, 0));
        assert_eq!(chan.sent(), &[3, 0, 4, 1]);
        let chan = run(&mut ctl, &[ESCAPE, 4, 1, 70], (0, 0));
        assert_eq!(chan.sent(), &[3, 0, 4, 1]);

        // One channel, reprogrammed in place.
        assert_eq!(ctl.dimmer_of(0), Some(0));
        let cv = compare_value(70, HALF_PERIOD);
        assert_eq!(ctl.channel_info(0), Some((1, 70, cv)));
    }

    #[test]
    fn test_opcode_round_trip() {
        for raw in 0..=255u8 {
            match Opcode::from_raw(raw) {
                Some(op) => assert_eq!(op as u8, raw),
                None => assert!(raw > 4),
            }
        }
    }
}

// vim: ts=4 sw=4 expandtab
