//! The line based format spoken by serial adapters.
//!
//! The host sends CR terminated [commands](crate::command::Command). The
//! adapter answers every event on the bus with a bracketed line,
//!
//! ```text
//! {TTTTTTTT C LL DDDDDDDD}
//! ```
//!
//! where `T` is the adapter's millisecond tick, `C` the class of the line,
//! `LL` either the bit length of a frame or a [status code](super::status_code),
//! and `D` the data. Current firmware prints the fields without separators
//! between the tick, class and length, e.g. `{0000abcd>10 0000ff00}`; spaces
//! between any of the fields are accepted.

use super::status_code;
use crate::{
    command::Command,
    frame::{now, Frame, Status, TxFrame},
};

/// Class of a line echoing a frame the adapter placed on the bus.
pub const LOOPBACK_MARKER: u8 = b'>';
/// Class of a line carrying a frame from another bus participant.
pub const FRAME_MARKER: u8 = b':';
/// Class used by older firmware for every successfully received frame.
pub const OK_MARKER: u8 = b'-';
/// Class of a line reporting an error condition.
pub const ERROR_MARKER: u8 = b'*';
/// Lengths above this value are status codes rather than bit counts.
pub const MAX_DATA_LENGTH: u8 = 0x20;

/// Encode a frame as a send (or send twice) command line.
pub(crate) fn encode(frame: &TxFrame) -> Vec<u8> {
    let command = if frame.send_twice() {
        Command::SendTwice {
            priority: frame.priority(),
            length: frame.length(),
            data: frame.data(),
        }
    } else {
        Command::Send {
            priority: frame.priority(),
            length: frame.length(),
            data: frame.data(),
        }
    };
    command.to_bytes()
}

/// Decode one line of adapter output.
pub(crate) fn decode(raw: &[u8]) -> Frame {
    parse(raw).unwrap_or_else(|| {
        log::debug!("unrecognized line {:?}", String::from_utf8_lossy(raw));
        Frame::event(now(), Status::General, 0)
    })
}

fn parse(raw: &[u8]) -> Option<Frame> {
    let start = raw.iter().position(|&b| b == b'{')? + 1;
    let end = start + raw[start..].iter().position(|&b| b == b'}')?;
    let mut fields = Fields(&raw[start..end]);

    let ticks = fields.hex(8)?;
    let class = fields.byte()?;
    let length = fields.hex(2)? as u8;
    let data = fields.hex(8)?;
    fields.end()?;

    let timestamp = f64::from(ticks) / 1000.0;
    if class == ERROR_MARKER || length > MAX_DATA_LENGTH {
        let status = status_code::status(length);
        return Some(Frame::event(timestamp, status, data).with_code(length));
    }
    let status = match class {
        LOOPBACK_MARKER => Status::Loopback,
        FRAME_MARKER | OK_MARKER => Status::Frame,
        _ => return None,
    };
    Some(Frame::data_frame(timestamp, status, length, data))
}

/// Cursor over the fields between the brackets.
struct Fields<'a>(&'a [u8]);

impl Fields<'_> {
    fn skip_spaces(&mut self) {
        while let Some((&b' ', rest)) = self.0.split_first() {
            self.0 = rest;
        }
    }

    /// Take the next non-space byte.
    fn byte(&mut self) -> Option<u8> {
        self.skip_spaces();
        let (&first, rest) = self.0.split_first()?;
        self.0 = rest;
        Some(first)
    }

    /// Take exactly `digits` hex digits.
    fn hex(&mut self, digits: usize) -> Option<u32> {
        self.skip_spaces();
        if self.0.len() < digits {
            return None;
        }
        let (number, rest) = self.0.split_at(digits);
        if !number.iter().all(u8::is_ascii_hexdigit) {
            return None;
        }
        self.0 = rest;
        u32::from_str_radix(std::str::from_utf8(number).ok()?, 16).ok()
    }

    /// Succeed only if nothing but spaces remains.
    fn end(&mut self) -> Option<()> {
        self.skip_spaces();
        self.0.is_empty().then_some(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::Priority;

    #[test]
    fn encode_send() {
        assert_eq!(encode(&TxFrame::new(16, 0xFF00)), b"S1 10 FF00\r");
        assert_eq!(
            encode(&TxFrame::new(8, 0x0A).with_priority(Priority::P5)),
            b"S5 8 A\r"
        );
        assert_eq!(
            encode(&TxFrame::new(24, 0x01_FE_00).with_send_twice(true)),
            b"T1 18 1FE00\r"
        );
    }

    #[test]
    fn decode_loopback() {
        let frame = decode(b"{000003e8>10 0000ff00}\r\n");
        assert_eq!(frame.status(), Status::Loopback);
        assert_eq!(frame.length(), 16);
        assert_eq!(frame.data(), 0xFF00);
        assert!((frame.timestamp() - 1.0).abs() < 1e-9);
        assert_eq!(frame.code(), None);
        assert_eq!(frame.sequence(), None);
    }

    #[test]
    fn decode_accepts_separators() {
        let frame = decode(b"{000003e8 : 08 000000ab}");
        assert_eq!(frame.status(), Status::Frame);
        assert_eq!((frame.length(), frame.data()), (8, 0xAB));

        let frame = decode(b"{00000001-18 00fffffe}");
        assert_eq!(frame.status(), Status::Frame);
        assert_eq!((frame.length(), frame.data()), (24, 0xFF_FF_FE));
    }

    #[test]
    fn decode_status_codes() {
        let frame = decode(b"{00001000*91 00000000}");
        assert_eq!(frame.status(), Status::Failure);
        assert_eq!(frame.code(), Some(status_code::SYSTEM_FAILURE));
        assert_eq!(frame.length(), 0);

        let frame = decode(b"{00001258*92 0927c000}");
        assert_eq!(frame.status(), Status::Recover);
        assert_eq!(frame.elapsed_us(), 600_000);

        let frame = decode(b"{00000010*82 00015e01}");
        assert_eq!(frame.status(), Status::Timing);
        assert_eq!(frame.elapsed_us(), 350);
        assert_eq!(frame.bit(), 1);

        // A length beyond 32 bits is a status code regardless of the class.
        let frame = decode(b"{00000010>a2 00000000}");
        assert_eq!(frame.status(), Status::Interface);
        assert_eq!(frame.code(), Some(status_code::QUEUE_FULL));

        let frame = decode(b"{00000010*13 00000000}");
        assert_eq!(frame.status(), Status::General);
        assert_eq!(frame.code(), Some(0x13));
    }

    #[test]
    fn malformed_lines_are_general() {
        for line in [
            &b"Version 2.1.0\r\n"[..],
            b"",
            b"{}",
            b"{000003e8>10 0000ff00",
            b"{000003e8?10 0000ff00}",
            b"{000003e8>1g 0000ff00}",
            b"{000003e8>10 0000ff}",
            b"{000003e8>10 0000ff00 12}",
        ] {
            let frame = decode(line);
            assert_eq!(frame.status(), Status::General, "{line:?}");
            assert_eq!(frame.length(), 0);
        }
    }
}
