use std::fmt;
use std::io;

/// Errors produced while parsing, editing, or re-emitting a class file
#[derive(Debug)]
pub enum Error {
    /// The input violates the class file format (unknown constant tag,
    /// inconsistent pool count, bad magic, malformed modified UTF-8, ...)
    MalformedFormat(String),

    /// The input stream ended in the middle of a structure
    UnexpectedEndOfInput,

    /// A constant pool or local/table index is outside the valid bounds
    /// (0, a wide-entry placeholder slot, or past the end)
    IndexOutOfRange { index: usize, size: usize },

    /// An instruction pointer resolves to no instruction
    ///
    /// `offset` is the unresolvable byte offset, or `None` when the pointer
    /// referenced an instruction that has since been removed from its code
    /// block without being redirected.
    DanglingTarget { offset: Option<u32> },

    /// An operation was attempted on an invalidated or incomplete entity,
    /// or would leave the containing structure inconsistent
    InvalidOperation(&'static str),

    /// The constant pool has no room for another entry (indices are `u16`)
    PoolOverflow,

    /// A branch or switch-case offset does not fit its encoded field
    JumpOffsetOverflow(i64),

    /// A byte position does not fit the `u16` program-counter fields used
    /// by exception and debug tables
    MethodCodeOverflow(u32),

    IoError(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedFormat(msg) => write!(f, "malformed class file: {}", msg),
            Error::UnexpectedEndOfInput => write!(f, "unexpected end of input"),
            Error::IndexOutOfRange { index, size } => {
                write!(f, "index {} out of range (size {})", index, size)
            }
            Error::DanglingTarget { offset: Some(off) } => {
                write!(f, "no instruction at byte offset {}", off)
            }
            Error::DanglingTarget { offset: None } => {
                write!(f, "target instruction was removed and never redirected")
            }
            Error::InvalidOperation(msg) => write!(f, "invalid operation: {}", msg),
            Error::PoolOverflow => write!(f, "constant pool overflow"),
            Error::JumpOffsetOverflow(off) => {
                write!(f, "jump offset {} does not fit its encoding", off)
            }
            Error::MethodCodeOverflow(pc) => {
                write!(f, "byte position {} does not fit a u16 program counter", pc)
            }
            Error::IoError(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEndOfInput
        } else {
            Error::IoError(err)
        }
    }
}
