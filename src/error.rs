use std::borrow::Cow;
use std::fmt::Display;

/// Result alias used throughout this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Fatal errors that abort the link.
///
/// Each variant carries a message and, where meaningful, the name of the
/// offending symbol. These correspond to the "Fatal, abort link" category;
/// everything recoverable is instead recorded into [`crate::Diagnostics`]
/// and does not produce an `Error`.
#[derive(Debug)]
pub enum Error {
    /// A relocation referenced a symbol that could not be resolved, or
    /// produced a value that did not fit the target field.
    Relocation {
        msg: Cow<'static, str>,
    },

    /// The classifier or layout engine encountered a symbol whose kind,
    /// size, or section placement violates an invariant it relies on.
    Layout {
        msg: Cow<'static, str>,
    },

    /// Address assignment could not satisfy an alignment or overlap
    /// constraint (e.g. a segment's computed length went negative).
    Address {
        msg: Cow<'static, str>,
    },

    /// A caller-supplied collaborator (`ArchReloc`, `DynRelHandler`, ...)
    /// reported failure.
    Custom {
        msg: Cow<'static, str>,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Relocation { msg } => write!(f, "relocation error: {msg}"),
            Error::Layout { msg } => write!(f, "layout error: {msg}"),
            Error::Address { msg } => write!(f, "address assignment error: {msg}"),
            Error::Custom { msg } => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

#[cold]
#[inline(never)]
pub(crate) fn relocation_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Relocation { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn layout_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Layout { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn address_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Address { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub fn custom_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Custom { msg: msg.into() }
}

#[inline]
#[cold]
fn cold() {}

/// Branch hint: `b` is expected to be `true`.
#[inline]
pub(crate) fn likely(b: bool) -> bool {
    if !b {
        cold()
    }
    b
}

/// Branch hint: `b` is expected to be `false`.
#[inline]
pub(crate) fn unlikely(b: bool) -> bool {
    if b {
        cold()
    }
    b
}
