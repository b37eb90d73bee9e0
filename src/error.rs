use std::error;
use std::fmt::{self, Debug, Display, Formatter};
use std::io;
use std::result;

/// Error produced while filling a record or decoding one of its fields.
///
/// # Variants
///
/// * `NotFilled` - a decoding accessor was called on an empty record,
/// * `ShortBuffer` - the input buffer is smaller than the record claims to be,
/// * `MalformedLine` - a text record line contains fewer than 11 mandatory fields,
/// * `Missing(field)` - the field is explicitly absent (`*`, `0` or `255`
/// depending on the field) although the caller asked for its value,
/// * `Unmapped` - the operation requires a mapping position, but the record
/// is unmapped,
/// * `NoReader` - reference name resolution was requested, but no header is
/// attached, or its owner already dropped it,
/// * `UnknownTag(name)` - the requested auxiliary tag is not present,
/// * `UnknownAuxType(ty)` - an auxiliary field carries a type byte outside
/// the defined set,
/// * `UnsupportedCigarOp(op)` - the alignment walk encountered an operation
/// that consumes neither the query nor the reference,
/// * `Corrupted(s)` - the record bytes are malformed. `s` contains
/// additional information about the problem.
/// * `Io(e)` - writing the record was interrupted by `io::Error`.
pub enum Error {
    NotFilled,
    ShortBuffer,
    MalformedLine,
    Missing(&'static str),
    Unmapped,
    NoReader,
    UnknownTag([u8; 2]),
    UnknownAuxType(u8),
    UnsupportedCigarOp(char),
    Corrupted(String),
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Error {
        Error::Corrupted(e.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Error::NotFilled => write!(f, "Record is not filled"),
            Error::ShortBuffer => write!(f, "Buffer is shorter than the record claims"),
            Error::MalformedLine => write!(f, "Line contains fewer than 11 mandatory fields"),
            Error::Missing(field) => write!(f, "Record has no {}", field),
            Error::Unmapped => write!(f, "Record is unmapped"),
            Error::NoReader => write!(f, "Record has no attached header"),
            Error::UnknownTag(name) => {
                write!(f, "Record has no tag {}{}", name[0] as char, name[1] as char)
            }
            Error::UnknownAuxType(ty) => write!(f, "Unexpected tag type: {}", *ty as char),
            Error::UnsupportedCigarOp(op) => write!(f, "Unsupported CIGAR operation: {}", op),
            Error::Corrupted(e) => write!(f, "Corrupted record: {}", e),
            Error::Io(e) => write!(f, "Failed to write record: {}", e),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter) -> result::Result<(), fmt::Error> {
        Display::fmt(self, f)
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;
