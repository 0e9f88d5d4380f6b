use std::fmt;

/// Errors raised by a [`FitsFile`](crate::FitsFile) handle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("negative file position: {0}")]
    NegativePosition(i64),

    #[error("end of file reached at block {block}")]
    EndOfFile { block: u64 },

    #[error("device error: {0}")]
    Device(#[from] std::io::Error),

    #[error("attempted to write to a read-only file")]
    ReadOnly,

    #[error("{what} value {value} does not fit in the target integer type")]
    Overflow { what: &'static str, value: i128 },

    #[error("descriptor in row {row}, column {column} has an invalid heap address")]
    BadHeap { column: usize, row: u64 },

    #[error("row {row} is beyond the last row of the table ({rows} rows)")]
    BadRow { row: u64, rows: u64 },

    #[error("column {0} does not exist in the current HDU")]
    BadColumn(usize),

    #[error("column {0} is not a variable-length array column")]
    NotVarColumn(usize),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no buffer slot is available")]
    NoFreeSlot,

    #[error("a previous operation failed with {0}; clear the status before retrying")]
    Failed(Status),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Condition code recorded on a handle when an operation fails.
///
/// Once a handle holds a status every public operation returns
/// [`Error::Failed`] until [`clear_status`](crate::FitsFile::clear_status) is
/// called.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    NegativePosition,
    EndOfFile,
    Device,
    ReadOnly,
    Overflow,
    BadHeap,
    BadRow,
    BadColumn,
    NotVarColumn,
    InvalidArgument,
    NoFreeSlot,
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::NegativePosition(_) => Status::NegativePosition,
            Error::EndOfFile { .. } => Status::EndOfFile,
            Error::Device(_) => Status::Device,
            Error::ReadOnly => Status::ReadOnly,
            Error::Overflow { .. } => Status::Overflow,
            Error::BadHeap { .. } => Status::BadHeap,
            Error::BadRow { .. } => Status::BadRow,
            Error::BadColumn(_) => Status::BadColumn,
            Error::NotVarColumn(_) => Status::NotVarColumn,
            Error::InvalidArgument(_) => Status::InvalidArgument,
            Error::NoFreeSlot => Status::NoFreeSlot,
            Error::Failed(status) => *status,
        }
    }

    pub(crate) fn overflow(what: &'static str, value: impl Into<i128>) -> Self {
        Error::Overflow {
            what,
            value: value.into(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::NegativePosition => "negative position",
            Status::EndOfFile => "end of file",
            Status::Device => "device error",
            Status::ReadOnly => "read-only file",
            Status::Overflow => "numeric overflow",
            Status::BadHeap => "bad heap descriptor",
            Status::BadRow => "bad row number",
            Status::BadColumn => "bad column number",
            Status::NotVarColumn => "not a variable-length column",
            Status::InvalidArgument => "invalid argument",
            Status::NoFreeSlot => "no free buffer slot",
        };
        f.write_str(name)
    }
}

/// Narrows a byte count to `usize`, reporting the value instead of truncating.
pub(crate) fn to_usize(what: &'static str, value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::overflow(what, value))
}

/// The position `len` bytes after `pos`.
pub(crate) fn offset_by(pos: u64, len: u64) -> Result<u64> {
    pos.checked_add(len)
        .ok_or_else(|| Error::overflow("file position", i128::from(pos) + i128::from(len)))
}

/// Widens a signed offset into an unsigned file position.
pub(crate) fn to_position(value: i128) -> Result<u64> {
    if value < 0 {
        let clamped = i64::try_from(value).unwrap_or(i64::MIN);
        return Err(Error::NegativePosition(clamped));
    }
    u64::try_from(value).map_err(|_| Error::overflow("file position", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_the_error_variant() {
        assert_eq!(Error::ReadOnly.status(), Status::ReadOnly);
        assert_eq!(Error::EndOfFile { block: 3 }.status(), Status::EndOfFile);
        assert_eq!(Error::Failed(Status::BadHeap).status(), Status::BadHeap);
    }

    #[test]
    fn narrowing_reports_overflow() {
        assert!(matches!(to_position(-4), Err(Error::NegativePosition(-4))));
        assert_eq!(to_position(2880).unwrap(), 2880);
        assert_eq!(to_usize("count", 12).unwrap(), 12);
        assert_eq!(offset_by(2880, 80).unwrap(), 2960);
        assert!(matches!(
            offset_by(u64::MAX - 1, 2),
            Err(Error::Overflow { what: "file position", .. })
        ));
    }
}
