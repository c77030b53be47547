//! Frames exchanged with an adapter and the bus conditions they report.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The wire format a link speaks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WireFormat {
    /// CR terminated ASCII commands and bracketed reply lines (serial adapters).
    Text,
    /// Fixed size 64 byte packets carrying a sequence number (USB adapters).
    Binary,
}

impl WireFormat {
    /// Whether frames in this format carry a sequence number that can be used
    /// to correlate a transmission with its acknowledgement.
    pub fn is_sequenced(self) -> bool {
        matches!(self, WireFormat::Binary)
    }
}

/// The condition a received [`Frame`] reports.
///
/// These are legitimate bus conditions that callers assert on, which is why
/// they are returned in frames rather than raised as errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    /// The adapter's local echo of a frame it just placed on the bus.
    Loopback,
    /// A frame received from another participant on the bus, such as a backframe.
    Frame,
    /// Nothing arrived within the requested window.
    Timeout,
    /// The adapter saw a bus timing violation.
    Timing,
    /// The bus lost power.
    Failure,
    /// The bus recovered from a power failure.
    Recover,
    /// The adapter rejected a host command or ran out of buffer space.
    Interface,
    /// A malformed reply or an unrecognized adapter code.
    General,
}

impl Status {
    /// Whether a frame with this status carries bus data.
    pub fn is_data(self) -> bool {
        matches!(self, Status::Loopback | Status::Frame)
    }
}

/// A frame decoded from an adapter's output, or a synthetic timeout.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    timestamp: f64,
    length: u8,
    data: u32,
    status: Status,
    code: Option<u8>,
    sequence: Option<u8>,
}

impl Frame {
    /// Create a frame carrying `length` bits of bus `data`.
    pub fn data_frame(timestamp: f64, status: Status, length: u8, data: u32) -> Self {
        Frame {
            timestamp,
            length,
            data,
            status,
            code: None,
            sequence: None,
        }
    }

    /// Create a frame for a non-data event, such as a timing violation.
    ///
    /// `data` carries the adapter's event value, see [`elapsed_us`](Frame::elapsed_us).
    pub fn event(timestamp: f64, status: Status, data: u32) -> Self {
        Frame {
            timestamp,
            length: 0,
            data,
            status,
            code: None,
            sequence: None,
        }
    }

    /// Create the frame returned when nothing arrived in time.
    pub fn timeout() -> Self {
        Frame::event(now(), Status::Timeout, 0)
    }

    /// Attach the raw adapter status code.
    pub(crate) fn with_code(mut self, code: u8) -> Self {
        self.code = Some(code);
        self
    }

    /// Replace the status, keeping everything else.
    pub(crate) fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Attach a sequence number echoed by the adapter.
    pub(crate) fn with_sequence(mut self, sequence: u8) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// When the frame was seen, in seconds.
    ///
    /// Serial adapters stamp frames with their own millisecond clock, which
    /// makes differences between frames precise. Frames from USB adapters and
    /// synthetic timeouts carry the host's time since the Unix epoch.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// The number of data bits, or `0` for non-data events.
    pub fn length(&self) -> u8 {
        self.length
    }

    /// The raw data value.
    pub fn data(&self) -> u32 {
        self.data
    }

    /// The bus condition this frame reports.
    pub fn status(&self) -> Status {
        self.status
    }

    /// The adapter's status code, for events the adapter reported with one.
    pub fn code(&self) -> Option<u8> {
        self.code
    }

    /// The sequence number echoed by the adapter, if the link is sequenced.
    pub fn sequence(&self) -> Option<u8> {
        self.sequence
    }

    /// The elapsed time, in microseconds, attached to timing, failure and
    /// recover reports.
    pub fn elapsed_us(&self) -> u32 {
        self.data >> 8
    }

    /// The bit position attached to timing reports.
    pub fn bit(&self) -> u8 {
        (self.data & 0xFF) as u8
    }

    /// Whether this frame is the adapter's echo of `sent`.
    pub fn is_echo_of(&self, sent: &TxFrame) -> bool {
        self.status == Status::Loopback && self.length == sent.length && self.data == sent.data
    }
}

/// The priority of a forward frame, which selects the settling time the
/// adapter waits before sending it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    /// A backframe, sent with the shortest settling time.
    Backward,
    /// Priority 1.
    #[default]
    P1,
    /// Priority 2.
    P2,
    /// Priority 3.
    P3,
    /// Priority 4.
    P4,
    /// Priority 5.
    P5,
}

impl Priority {
    /// The digit used for this priority on the wire.
    pub fn value(self) -> u8 {
        match self {
            Priority::Backward => 0,
            Priority::P1 => 1,
            Priority::P2 => 2,
            Priority::P3 => 3,
            Priority::P4 => 4,
            Priority::P5 => 5,
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = u8;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Priority::Backward,
            1 => Priority::P1,
            2 => Priority::P2,
            3 => Priority::P3,
            4 => Priority::P4,
            5 => Priority::P5,
            other => return Err(other),
        })
    }
}

/// A frame to place on the bus.
///
/// ```
/// use dali_adapter::frame::{Priority, TxFrame};
///
/// let off = TxFrame::new(16, 0xFF00)
///     .with_priority(Priority::P2)
///     .with_send_twice(true);
/// assert_eq!(off.length(), 16);
/// assert!(off.send_twice());
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TxFrame {
    length: u8,
    data: u32,
    priority: Priority,
    send_twice: bool,
}

impl TxFrame {
    /// Create a frame of `length` bits with the default priority.
    pub fn new(length: u8, data: u32) -> Self {
        TxFrame {
            length,
            data,
            priority: Priority::default(),
            send_twice: false,
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set whether the adapter should send the frame twice.
    #[must_use]
    pub fn with_send_twice(mut self, send_twice: bool) -> Self {
        self.send_twice = send_twice;
        self
    }

    /// The number of data bits.
    pub fn length(&self) -> u8 {
        self.length
    }

    /// The data bits.
    pub fn data(&self) -> u32 {
        self.data
    }

    /// The frame's priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Whether the frame is sent twice.
    pub fn send_twice(&self) -> bool {
        self.send_twice
    }
}

/// The host's time in seconds since the Unix epoch.
pub(crate) fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn timing_report_fields() {
        let frame = Frame::event(1.0, Status::Timing, (600 << 8) | 3);
        assert_eq!(frame.elapsed_us(), 600);
        assert_eq!(frame.bit(), 3);
        assert_eq!(frame.length(), 0);
        assert!(!frame.status().is_data());
    }

    #[test]
    fn timeout_frame_is_stamped_now() {
        let before = now();
        let frame = Frame::timeout();
        assert_eq!(frame.status(), Status::Timeout);
        assert!(frame.timestamp() >= before);
        assert_eq!(frame.sequence(), None);
    }

    #[test]
    fn echo_detection() {
        let sent = TxFrame::new(16, 0xFF01);
        let echo = Frame::data_frame(0.0, Status::Loopback, 16, 0xFF01);
        let other = Frame::data_frame(0.0, Status::Frame, 16, 0xFF01);
        assert!(echo.is_echo_of(&sent));
        assert!(!other.is_echo_of(&sent));
    }

    #[test]
    fn priority_digits() {
        assert_eq!(Priority::try_from(0), Ok(Priority::Backward));
        assert_eq!(Priority::try_from(5).map(Priority::value), Ok(5));
        assert_eq!(Priority::try_from(6), Err(6));
        assert_eq!(Priority::default(), Priority::P1);
    }
}
