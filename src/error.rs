use std::fmt;

/// A basic error type from this library.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A generic error message.
    Msg(String),

    /// The daemon command channel is full, try again later.
    Again,

    /// The message is too short or does not match its own header counts.
    MalformedMessage(String),

    /// Too many compression pointers were followed while reading a name.
    TooManyIterations,

    /// A compression pointer at this offset is missing its second byte.
    IncompletePointer(usize),

    /// A label starting at this offset would read past the end of the buffer.
    LabelOutOfBounds(usize),

    /// A name was to be read at an offset beyond the end of the buffer.
    OffsetOutOfBounds(usize),

    /// A label is longer than 63 bytes.
    LabelTooLong(String),

    /// An empty label inside a domain name, e.g. `a..local`.
    EmptyLabel(String),

    /// A TXT entry is longer than 255 bytes. Carries the entry length.
    EntryTooLong(usize),

    /// The string is not a valid IPv4 or IPv6 address.
    InvalidAddress(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Msg(s) => write!(f, "{}", s),
            Self::Again => write!(f, "try again"),
            Self::MalformedMessage(s) => write!(f, "malformed message: {}", s),
            Self::TooManyIterations => write!(f, "too many compression pointers in name"),
            Self::IncompletePointer(offset) => {
                write!(f, "incomplete compression pointer at offset {}", offset)
            }
            Self::LabelOutOfBounds(offset) => {
                write!(f, "label at offset {} exceeds the message", offset)
            }
            Self::OffsetOutOfBounds(offset) => {
                write!(f, "name offset {} is beyond the message", offset)
            }
            Self::LabelTooLong(label) => {
                write!(f, "label '{}' is longer than 63 bytes", label)
            }
            Self::EmptyLabel(name) => write!(f, "empty label in name '{}'", name),
            Self::EntryTooLong(len) => {
                write!(f, "TXT entry of {} bytes exceeds 255 bytes", len)
            }
            Self::InvalidAddress(s) => write!(f, "invalid ip address: {}", s),
        }
    }
}

impl std::error::Error for Error {}

/// One and only `Result` type from this library crate.
pub type Result<T> = core::result::Result<T, Error>;

/// A simple macro to report all kinds of errors.
macro_rules! e_fmt {
  ($($arg:tt)+) => {
      $crate::Error::Msg(format!($($arg)+))
  };
}
