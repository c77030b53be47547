//! Error types.
//!
//! Each error is represented by a unique type that implements [`std::error::Error`].
//! Most APIs can fail in more than one way and so return the higher level
//! [`Error`] enum. Every error type is convertible into it, allowing them to be
//! used with `?`, and it can be converted back into a specific error with
//! [`TryFrom`]:
//!
//! ```
//! use dali_adapter::error::{Error, SequenceMismatchError};
//!
//! fn inspect(error: Error) {
//!     match SequenceMismatchError::try_from(error) {
//!         Ok(mismatch) => println!("sent {} got {:?}", mismatch.sent(), mismatch.received()),
//!         Err(other) => println!("{other}"),
//!     }
//! }
//! ```
//!
//! Note that bus conditions such as a missing backframe, a timing violation or
//! a bus power failure are *not* errors. They are reported through the
//! [`Status`](crate::frame::Status) of the received frames.

use std::io;

/// Implement Error and Display traits for the specified type.
///
/// After the type define the format string and any arguments it should
/// reference after `self =>` (to abide by macro hygiene rules).
macro_rules! impl_error_display {
    (
        $name:path,
        $self:ident =>
        $display:literal
        $(,
            $($arg:expr),+
        )?
    ) => {
        impl std::error::Error for $name {}

        impl std::fmt::Display for $name {
            fn fmt(&$self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    $display
                    $(,
                        $($arg),+
                    )?
                )
            }
        }
    };
}

/// Implement the `new()` and `message()` methods for errors storing a description.
///
/// Attributes before the type name are applied to `new()`, for errors only
/// constructed by some bindings.
macro_rules! impl_for_type_containing_message {
    ($(#[$new_attr:meta])* $name:ident) => {
        impl $name {
            /// Create an instance of the error.
            $(#[$new_attr])*
            pub(crate) fn new<S: Into<String>>(message: S) -> Self {
                $name(message.into().into_boxed_str())
            }

            /// Get the description of the error.
            pub fn message(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Define an error enum that contains concrete error types.
///
/// From and TryFrom traits will be implemented for the enum and its underlying
/// errors. The enum's Display implementation will defer to the underlying errors'
/// Display implementations.
macro_rules! error_enum {
    (
        $(#[$attr:meta])*
        pub enum $name:ident {
            $(
                $variant:ident($inner:path)
            ),+
            $(,)?
        }
    ) => {
        $(
            #[$attr]
        )*
        #[allow(missing_docs)]
        pub enum $name {
            $(
                $variant($inner)
            ),+
        }

        impl std::error::Error for $name {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                match self {
                    $(
                        $name::$variant(e) => Some(e)
                    ),+
                }
            }
        }

        // Defer the display to the inner error type
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        $name::$variant(e) => e.fmt(f)
                    ),+
                }
            }
        }

        // Allow the enum to be convertible from an infallible error
        impl From<std::convert::Infallible> for $name {
            fn from(_: std::convert::Infallible) -> Self {
                unreachable!();
            }
        }

        $(
            impl From<$inner> for $name {
                fn from(other: $inner) -> Self {
                    $name::$variant(other)
                }
            }

            impl TryFrom<$name> for $inner {
                type Error = $name;
                fn try_from(other: $name) -> Result<Self, Self::Error> {
                    match other {
                        $name::$variant(value) => Ok(value),
                        value => Err(value)
                    }
                }
            }
        )+
    };
}

/// No serial port or USB device matching the requested address could be found.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DeviceNotFoundError(Box<str>);

impl_error_display! {
    DeviceNotFoundError,
    self => "adapter not found: {}", self.0
}
impl_for_type_containing_message! { #[cfg(any(feature = "serial", feature = "usb"))] DeviceNotFoundError }

/// The USB device lacks the IN or OUT endpoint needed to talk to it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EndpointError(Box<str>);

impl_error_display! {
    EndpointError,
    self => "could not determine read or write endpoint: {}", self.0
}
impl_for_type_containing_message! { #[cfg(feature = "usb")] EndpointError }

/// A frame could not be encoded, or a reply could not be decoded at all.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ProtocolError(Box<str>);

impl_error_display! {
    ProtocolError,
    self => "protocol error: {}", self.0
}
impl_for_type_containing_message! { ProtocolError }

/// The reply to a blocking transmit carried a different sequence number than
/// the one that was sent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SequenceMismatchError {
    sent: u8,
    received: Option<u8>,
}

impl SequenceMismatchError {
    /// Create an instance of the error.
    pub(crate) const fn new(sent: u8, received: Option<u8>) -> Self {
        SequenceMismatchError { sent, received }
    }

    /// The sequence number that was transmitted.
    pub fn sent(&self) -> u8 {
        self.sent
    }

    /// The sequence number of the reply, if it had one.
    ///
    /// A reply without a sequence number is typically a synthetic timeout.
    pub fn received(&self) -> Option<u8> {
        self.received
    }
}

impl_error_display! {
    SequenceMismatchError,
    self => "expected reply with sequence number {}, received {}",
    self.sent,
    self.received.map_or_else(|| "none".to_string(), |seq| seq.to_string())
}

/// A blocking transmit was requested but the session is not receiving.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct NotReceivingError;

impl_error_display! {
    NotReceivingError,
    self => "receive must be active for a blocking transmit"
}

error_enum! {
    /// Any error returned by this library.
    ///
    /// The `Io` variant covers a link that broke after it was opened.
    /// Expected read timeouts never surface as errors.
    #[derive(Debug)]
    #[non_exhaustive]
    pub enum Error {
        DeviceNotFound(DeviceNotFoundError),
        Endpoint(EndpointError),
        Protocol(ProtocolError),
        SequenceMismatch(SequenceMismatchError),
        NotReceiving(NotReceivingError),
        Io(io::Error),
    }
}

impl Error {
    /// A convenience function for determining if the error is due to the
    /// link timing out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::TimedOut)
    }

    /// A convenience function for determining if the error is due to the
    /// adapter being unplugged or otherwise disappearing.
    pub fn is_device_removed(&self) -> bool {
        matches!(self, Error::Io(e) if crate::backend::is_device_removed(e))
    }
}

#[cfg(feature = "serial")]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "serial")))]
impl From<serialport::Error> for Error {
    fn from(other: serialport::Error) -> Self {
        match other.kind() {
            serialport::ErrorKind::NoDevice
            | serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
                Error::DeviceNotFound(DeviceNotFoundError::new(other.description))
            }
            serialport::ErrorKind::InvalidInput => Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                other.description,
            )),
            serialport::ErrorKind::Unknown => {
                Error::Io(io::Error::new(io::ErrorKind::Other, other.description))
            }
            serialport::ErrorKind::Io(kind) => Error::Io(io::Error::new(kind, other.description)),
        }
    }
}

#[cfg(feature = "usb")]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "usb")))]
impl From<rusb::Error> for Error {
    fn from(other: rusb::Error) -> Self {
        match other {
            rusb::Error::NoDevice | rusb::Error::NotFound => {
                Error::DeviceNotFound(DeviceNotFoundError::new(other.to_string()))
            }
            other => Error::Io(crate::backend::usb::io_error(other)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use static_assertions::{assert_impl_all, const_assert};

    // Make sure the error enum is at most 3 words large (the same size as a String).
    // This will minimize the size of Result<R, Error>.
    const _WORD_SIZE: usize = std::mem::size_of::<&usize>();
    const_assert!(std::mem::size_of::<Error>() <= 3 * _WORD_SIZE);

    assert_impl_all!(Error: From<ProtocolError>, From<io::Error>, Send, Sync);
    #[cfg(feature = "serial")]
    assert_impl_all!(Error: From<serialport::Error>);
    assert_impl_all!(SequenceMismatchError: TryFrom<Error>);
    assert_impl_all!(NotReceivingError: TryFrom<Error>);

    #[test]
    #[cfg(feature = "serial")]
    fn serialport_errors_are_classified() {
        let err: Error = serialport::Error::new(serialport::ErrorKind::NoDevice, "gone").into();
        assert!(matches!(err, Error::DeviceNotFound(_)));

        let err: Error =
            serialport::Error::new(serialport::ErrorKind::Io(io::ErrorKind::NotFound), "nope")
                .into();
        assert!(matches!(err, Error::DeviceNotFound(_)));

        let err: Error =
            serialport::Error::new(serialport::ErrorKind::Io(io::ErrorKind::TimedOut), "slow")
                .into();
        assert!(err.is_timeout());
        assert!(!err.is_device_removed());
    }

    #[test]
    fn device_removed_is_detected() {
        let err = Error::from(io::Error::new(io::ErrorKind::NotConnected, "unplugged"));
        assert!(err.is_device_removed());
        let err = Error::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(!err.is_device_removed());
    }

    #[test]
    #[cfg(feature = "usb")]
    fn endpoint_error_display() {
        let err = Error::from(EndpointError::new("adapter 1"));
        assert_eq!(
            err.to_string(),
            "could not determine read or write endpoint: adapter 1"
        );
    }

    #[test]
    fn sequence_mismatch_display() {
        let err = SequenceMismatchError::new(4, Some(7));
        assert_eq!(
            err.to_string(),
            "expected reply with sequence number 4, received 7"
        );
        let err = SequenceMismatchError::new(4, None);
        assert_eq!(
            err.to_string(),
            "expected reply with sequence number 4, received none"
        );
    }

    #[test]
    fn round_trip_through_enum() {
        let err: Error = ProtocolError::new("bad length").into();
        let err = NotReceivingError::try_from(err).unwrap_err();
        let err = ProtocolError::try_from(err).unwrap();
        assert_eq!(err.message(), "bad length");
    }
}
