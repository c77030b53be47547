//! Encoding frames for, and decoding frames from, an adapter.
//!
//! Serial adapters speak a line based [text](WireFormat::Text) format, USB
//! adapters exchange fixed size [binary](WireFormat::Binary) packets. Both are
//! reached through [`encode`] and [`decode`] so that callers never depend on
//! either format directly.
//!
//! ```
//! use dali_adapter::{codec::{self, Exchange}, frame::{Status, TxFrame, WireFormat}};
//!
//! let bytes = codec::encode(WireFormat::Text, &TxFrame::new(16, 0xFF00), 0, Exchange::Send)?;
//! assert_eq!(bytes, b"S1 10 FF00\r");
//!
//! let frame = codec::decode(WireFormat::Text, b"{000003e8>10 0000ff00}\r\n")?;
//! assert_eq!(frame.status(), Status::Loopback);
//! assert_eq!((frame.length(), frame.data()), (16, 0xFF00));
//! # Ok::<(), dali_adapter::error::ProtocolError>(())
//! ```

pub mod binary;
pub mod text;

use crate::{
    command,
    error::ProtocolError,
    frame::{Frame, TxFrame, WireFormat},
};

/// The payload lengths, in bits, that can be encoded.
pub const SUPPORTED_LENGTHS: [u8; 3] = [8, 16, 24];

/// What the host expects back after sending a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Exchange {
    /// A command; only the adapter's echo is expected.
    #[default]
    Send,
    /// A query; a backframe from a bus participant may follow the echo.
    Query,
}

/// Encode `frame` for a link speaking `format`.
///
/// `sequence` is only used by formats that carry one.
///
/// ## Errors
///
/// A [`ProtocolError`] is returned if the frame's length is not one of
/// [`SUPPORTED_LENGTHS`] or its data does not fit in that length.
pub fn encode(
    format: WireFormat,
    frame: &TxFrame,
    sequence: u8,
    exchange: Exchange,
) -> Result<Vec<u8>, ProtocolError> {
    if !SUPPORTED_LENGTHS.contains(&frame.length()) {
        return Err(ProtocolError::new(format!(
            "frames must be 8, 16 or 24 bits long, this one is {} bits long",
            frame.length()
        )));
    }
    command::check_frame(frame.length(), frame.data())?;
    Ok(match format {
        WireFormat::Text => text::encode(frame),
        WireFormat::Binary => binary::encode(frame, sequence, exchange).to_vec(),
    })
}

/// Decode bytes read from a link speaking `format`.
///
/// Text lines that cannot be parsed decode to a
/// [`General`](crate::frame::Status::General) frame.
///
/// ## Errors
///
/// A [`ProtocolError`] is returned if a binary packet is too short to hold a
/// reply.
pub fn decode(format: WireFormat, raw: &[u8]) -> Result<Frame, ProtocolError> {
    match format {
        WireFormat::Text => Ok(text::decode(raw)),
        WireFormat::Binary => binary::decode(raw),
    }
}

macro_rules! define_status_codes {
    // Entry point.
    //
    // Serves to concatenate the parts of the name before defining the constants.
    (
        $(
            $num:literal: $($name_word:ident)+ => $status:ident
        ),+
        $(,)?
    ) => {
        paste::paste! {
            define_status_codes!{@with_concatenated_name
                $(
                    $num: $($name_word)+, [< $($name_word:camel)+ >] => $status
                ),+
            }
        }
    };
    (@with_concatenated_name
        $(
            $num:literal: $($name_word:ident)+, $name:ident => $status:ident
        ),+
    ) => {
        paste::paste! {
            pub mod status_code {
                //! Status codes serial adapters report in place of a frame length.
                //!
                //! The codes in numerical order are:
                #![doc =
                $( "* `" $num "`: [`" $name:snake:upper "`]\n\n" )+
                ]

                use crate::frame::Status;

                $(
                    #[doc = $(" " $name_word " ")+ "(code `" $num "`)." ]
                    pub const [< $name:snake:upper >] : u8 = $num;
                )+

                /// Get the name of a status code.
                ///
                /// If the code is not recognized, `None` is returned.
                pub const fn name(code: u8) -> Option<&'static str> {
                    match code {
                        $(
                            $num => Some(stringify!($($name_word)+)),
                        )+
                        _ => None,
                    }
                }

                /// Get the bus condition a status code reports.
                ///
                /// Unrecognized codes report [`Status::General`].
                pub fn status(code: u8) -> Status {
                    match code {
                        $(
                            $num => Status::$status,
                        )+
                        _ => Status::General,
                    }
                }
            }
        }
    };
}

define_status_codes! {
    0x81: Timeout => Timeout,
    0x82: Receive Start Timing => Timing,
    0x83: Receive Data Timing => Timing,
    0x84: Collision Loopback Time => Timing,
    0x85: Collision No Change => Timing,
    0x86: Collision Wrong State => Timing,
    0x87: Settling Time Violation => Timing,
    0x90: System Idle => Recover,
    0x91: System Failure => Failure,
    0x92: System Recover => Recover,
    0xA0: Can Not Process => Interface,
    0xA1: Bad Argument => Interface,
    0xA2: Queue Full => Interface,
    0xA3: Bad Command => Interface,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::Status;

    #[test]
    fn unsupported_lengths_are_rejected() {
        for length in [0, 1, 17, 25, 32] {
            for format in [WireFormat::Text, WireFormat::Binary] {
                let err = encode(format, &TxFrame::new(length, 0), 1, Exchange::Send).unwrap_err();
                assert!(err.message().contains(&length.to_string()), "{err}");
            }
        }
    }

    #[test]
    fn oversized_data_is_rejected() {
        for (length, data) in [(8, 0x1FF), (16, 0x1_0000), (24, 0x100_0000)] {
            for format in [WireFormat::Text, WireFormat::Binary] {
                let frame = TxFrame::new(length, data);
                let err = encode(format, &frame, 1, Exchange::Send).unwrap_err();
                assert!(err.message().contains("does not fit"), "{err}");
            }
        }
        // The widest value of each length is fine.
        for (length, data) in [(8, 0xFF), (16, 0xFFFF), (24, 0xFF_FFFF)] {
            for format in [WireFormat::Text, WireFormat::Binary] {
                assert!(encode(format, &TxFrame::new(length, data), 1, Exchange::Send).is_ok());
            }
        }
    }

    #[test]
    fn status_code_names() {
        assert_eq!(status_code::name(status_code::QUEUE_FULL), Some("Queue Full"));
        assert_eq!(
            status_code::name(status_code::SETTLING_TIME_VIOLATION),
            Some("Settling Time Violation")
        );
        assert_eq!(status_code::name(0x42), None);
    }

    #[test]
    fn status_code_table() {
        use status_code::*;
        assert_eq!(status(TIMEOUT), Status::Timeout);
        for code in RECEIVE_START_TIMING..=SETTLING_TIME_VIOLATION {
            assert_eq!(status(code), Status::Timing, "code {code:#x}");
        }
        assert_eq!(status(SYSTEM_IDLE), Status::Recover);
        assert_eq!(status(SYSTEM_FAILURE), Status::Failure);
        assert_eq!(status(SYSTEM_RECOVER), Status::Recover);
        for code in CAN_NOT_PROCESS..=BAD_COMMAND {
            assert_eq!(status(code), Status::Interface, "code {code:#x}");
        }
        assert_eq!(status(0x00), Status::General);
        assert_eq!(status(0xFF), Status::General);
    }
}
