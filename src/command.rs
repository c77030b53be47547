//! Commands of the serial adapter's text protocol.
//!
//! Every command is a single line of ASCII text terminated by a carriage
//! return. All numbers are hexadecimal.
//!
//! | Command | Line | Effect |
//! |---------|------|--------|
//! | [`Send`](Command::Send) | `S<p> <length> <data>` | Send a forward frame with priority `p` |
//! | [`SendTwice`](Command::SendTwice) | `T<p> <length> <data>` | Send a forward frame twice |
//! | [`Repeat`](Command::Repeat) | `R<p> <repeat> <length> <data>` | Send a forward frame `repeat + 1` times |
//! | [`Backframe`](Command::Backframe) | `Y<data>` | Send an 8 bit backframe |
//! | [`SequenceStart`](Command::SequenceStart) | `W<period>` | Start a raw sequence of half bit periods, in µs |
//! | [`SequenceNext`](Command::SequenceNext) | `N<period>` | Append a period to the sequence |
//! | [`SequenceExecute`](Command::SequenceExecute) | `X` | Put the sequence on the bus |
//! | [`Version`](Command::Version) | `?` | Report the firmware version |
//!
//! Commands are usually sent with [`Session::send`](crate::session::Session::send),
//! and parse from their text form:
//!
//! ```
//! use dali_adapter::{command::Command, frame::Priority};
//!
//! let command: Command = "S2 10 FF00".parse()?;
//! assert_eq!(command, Command::send(Priority::P2, 16, 0xFF00)?);
//! assert_eq!(command.to_bytes(), b"S2 10 FF00\r");
//! # Ok::<(), dali_adapter::error::ProtocolError>(())
//! ```

use std::{fmt, str::FromStr};

use crate::{error::ProtocolError, frame::Priority};

/// The longest frame, in bits, the adapter can send.
pub const MAX_LENGTH: u8 = 0x20;

/// The character terminating every command.
pub const TERMINATOR: u8 = b'\r';

/// A command understood by serial adapters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Command {
    /// Send a forward frame.
    Send {
        /// Selects the settling time before sending.
        priority: Priority,
        /// Number of bits, `1..=32`.
        length: u8,
        /// The frame's bits.
        data: u32,
    },
    /// Send a forward frame twice.
    SendTwice {
        /// Selects the settling time before sending.
        priority: Priority,
        /// Number of bits, `1..=32`.
        length: u8,
        /// The frame's bits.
        data: u32,
    },
    /// Send a forward frame once and then `repeat` more times.
    Repeat {
        /// Selects the settling time before sending.
        priority: Priority,
        /// Additional transmissions.
        repeat: u8,
        /// Number of bits, `1..=32`.
        length: u8,
        /// The frame's bits.
        data: u32,
    },
    /// Send an 8 bit backframe.
    Backframe(u8),
    /// Start a raw sequence with its first half bit period, in µs.
    SequenceStart(u32),
    /// Append a half bit period, in µs, to the raw sequence.
    SequenceNext(u32),
    /// Put the raw sequence on the bus.
    SequenceExecute,
    /// Ask for the firmware version.
    Version,
}

impl Command {
    /// Create a [`Send`](Command::Send) command.
    ///
    /// ## Errors
    ///
    /// A [`ProtocolError`] is returned if the length is out of range or the
    /// data does not fit in it.
    pub fn send(priority: Priority, length: u8, data: u32) -> Result<Self, ProtocolError> {
        check_frame(length, data)?;
        Ok(Command::Send {
            priority,
            length,
            data,
        })
    }

    /// Create a [`SendTwice`](Command::SendTwice) command.
    ///
    /// ## Errors
    ///
    /// A [`ProtocolError`] is returned if the length is out of range or the
    /// data does not fit in it.
    pub fn send_twice(priority: Priority, length: u8, data: u32) -> Result<Self, ProtocolError> {
        check_frame(length, data)?;
        Ok(Command::SendTwice {
            priority,
            length,
            data,
        })
    }

    /// Create a [`Repeat`](Command::Repeat) command.
    ///
    /// ## Errors
    ///
    /// A [`ProtocolError`] is returned if the length is out of range or the
    /// data does not fit in it.
    pub fn repeat(
        priority: Priority,
        repeat: u8,
        length: u8,
        data: u32,
    ) -> Result<Self, ProtocolError> {
        check_frame(length, data)?;
        Ok(Command::Repeat {
            priority,
            repeat,
            length,
            data,
        })
    }

    /// Build the commands that put a raw sequence of half bit periods, in µs,
    /// on the bus.
    ///
    /// An empty slice produces no commands.
    ///
    /// ```
    /// use dali_adapter::command::Command;
    ///
    /// let commands = Command::sequence(&[417, 833]);
    /// assert_eq!(
    ///     commands,
    ///     [
    ///         Command::SequenceStart(417),
    ///         Command::SequenceNext(833),
    ///         Command::SequenceExecute
    ///     ]
    /// );
    /// ```
    pub fn sequence(periods: &[u32]) -> Vec<Command> {
        let Some((&first, rest)) = periods.split_first() else {
            return Vec::new();
        };
        std::iter::once(Command::SequenceStart(first))
            .chain(rest.iter().map(|&period| Command::SequenceNext(period)))
            .chain(std::iter::once(Command::SequenceExecute))
            .collect()
    }

    /// The command line, including the terminator.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.to_string().into_bytes();
        bytes.push(TERMINATOR);
        bytes
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Command::Send {
                priority,
                length,
                data,
            } => write!(f, "S{} {length:X} {data:X}", priority.value()),
            Command::SendTwice {
                priority,
                length,
                data,
            } => write!(f, "T{} {length:X} {data:X}", priority.value()),
            Command::Repeat {
                priority,
                repeat,
                length,
                data,
            } => write!(f, "R{} {repeat:X} {length:X} {data:X}", priority.value()),
            Command::Backframe(data) => write!(f, "Y{data:X}"),
            Command::SequenceStart(period) => write!(f, "W{period:X}"),
            Command::SequenceNext(period) => write!(f, "N{period:X}"),
            Command::SequenceExecute => f.write_str("X"),
            Command::Version => f.write_str("?"),
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    /// Parse a command line. Surrounding whitespace and the terminator are
    /// ignored, and `+` is accepted as a separator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let mut chars = line.chars();
        let Some(kind) = chars.next() else {
            return Err(ProtocolError::new("empty command"));
        };
        let rest = chars.as_str();

        match kind {
            'S' | 'T' | 'R' => {
                let (priority, rest) = split_priority(line, rest)?;
                let numbers = parse_numbers(line, rest)?;
                match (kind, numbers.as_slice()) {
                    ('S', &[length, data]) => Command::send(priority, narrow(line, length)?, data),
                    ('T', &[length, data]) => {
                        Command::send_twice(priority, narrow(line, length)?, data)
                    }
                    ('R', &[repeat, length, data]) => Command::repeat(
                        priority,
                        narrow(line, repeat)?,
                        narrow(line, length)?,
                        data,
                    ),
                    _ => Err(malformed(line)),
                }
            }
            'Y' => match parse_numbers(line, rest)?.as_slice() {
                &[data] => Ok(Command::Backframe(narrow(line, data)?)),
                _ => Err(malformed(line)),
            },
            'W' | 'N' => match parse_numbers(line, rest)?.as_slice() {
                &[period] if kind == 'W' => Ok(Command::SequenceStart(period)),
                &[period] => Ok(Command::SequenceNext(period)),
                _ => Err(malformed(line)),
            },
            'X' if rest.trim().is_empty() => Ok(Command::SequenceExecute),
            '?' if rest.trim().is_empty() => Ok(Command::Version),
            _ => Err(malformed(line)),
        }
    }
}

pub(crate) fn check_frame(length: u8, data: u32) -> Result<(), ProtocolError> {
    if length == 0 || length > MAX_LENGTH {
        return Err(ProtocolError::new(format!(
            "frame length must be 1 to {MAX_LENGTH} bits, not {length}"
        )));
    }
    if length < 32 && data >> length != 0 {
        return Err(ProtocolError::new(format!(
            "data {data:#X} does not fit in {length} bits"
        )));
    }
    Ok(())
}

fn split_priority<'a>(line: &str, rest: &'a str) -> Result<(Priority, &'a str), ProtocolError> {
    let mut chars = rest.chars();
    let priority = chars
        .next()
        .and_then(|c| c.to_digit(10))
        .ok_or_else(|| malformed(line))?;
    let priority = Priority::try_from(priority as u8).map_err(|p| {
        ProtocolError::new(format!("priority must be 0 to 5, not {p} in {line:?}"))
    })?;
    Ok((priority, chars.as_str()))
}

fn parse_numbers(line: &str, rest: &str) -> Result<Vec<u32>, ProtocolError> {
    rest.split(|c: char| c.is_ascii_whitespace() || c == '+')
        .filter(|token| !token.is_empty())
        .map(|token| u32::from_str_radix(token, 16).map_err(|_| malformed(line)))
        .collect()
}

fn narrow(line: &str, value: u32) -> Result<u8, ProtocolError> {
    u8::try_from(value)
        .map_err(|_| ProtocolError::new(format!("value {value:#X} out of range in {line:?}")))
}

fn malformed(line: &str) -> ProtocolError {
    ProtocolError::new(format!("malformed command {line:?}"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn render() {
        let cases = [
            (Command::send(Priority::P1, 16, 0xFF00).unwrap(), "S1 10 FF00\r"),
            (Command::send_twice(Priority::P3, 8, 0x5).unwrap(), "T3 8 5\r"),
            (
                Command::repeat(Priority::P1, 2, 24, 0xFF_FF_FE).unwrap(),
                "R1 2 18 FFFFFE\r",
            ),
            (Command::send(Priority::Backward, 32, u32::MAX).unwrap(), "S0 20 FFFFFFFF\r"),
            (Command::Backframe(0xAB), "YAB\r"),
            (Command::SequenceStart(600_000), "W927C0\r"),
            (Command::SequenceNext(417), "N1A1\r"),
            (Command::SequenceExecute, "X\r"),
            (Command::Version, "?\r"),
        ];
        for (command, line) in cases {
            assert_eq!(command.to_bytes(), line.as_bytes());
            assert_eq!(line.parse::<Command>().unwrap(), command);
        }
    }

    #[test]
    fn frame_bounds() {
        assert!(Command::send(Priority::P1, 0, 0).is_err());
        assert!(Command::send(Priority::P1, 33, 0).is_err());
        assert!(Command::send(Priority::P1, 8, 0x100).is_err());
        assert!(Command::send(Priority::P1, 1, 1).is_ok());
        assert!(Command::repeat(Priority::P1, 3, 40, 0).is_err());
    }

    #[test]
    fn parse_variants() {
        assert_eq!(
            "S1 10+00FF".parse::<Command>().unwrap(),
            Command::send(Priority::P1, 16, 0xFF).unwrap()
        );
        assert_eq!(
            "  n1a1\r\n".parse::<Command>().unwrap_err().message(),
            "malformed command \"n1a1\""
        );
        assert!("S6 10 FF00".parse::<Command>().unwrap_err().message().contains("priority"));
        assert!("S1 10".parse::<Command>().is_err());
        assert!("Y100".parse::<Command>().is_err());
        assert!("X1".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
        assert_eq!(Command::sequence(&[]), []);
    }
}
