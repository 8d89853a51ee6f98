use derive_more::Display;
use std::str::FromStr;

use crate::error::{Error, ErrorKind};

/// How a repository is opened. Fixed for the lifetime of the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Mode {
    /// Every mutation is refused.
    #[display("ro")]
    ReadOnly,
    /// Writes are durable immediately, unless the deployment is
    /// transactional, in which case they're staged like
    /// [`TransactionalReadWrite`](Mode::TransactionalReadWrite).
    #[display("rw")]
    ReadWrite,
    /// Writes are staged in a temporary directory until committed. Only
    /// available in transactional deployments.
    #[display("transactional")]
    TransactionalReadWrite,
}

impl Mode {
    pub fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode.to_ascii_lowercase().as_str() {
            "ro" | "readonly" | "read-only" => Ok(Self::ReadOnly),
            "rw" | "readwrite" | "read-write" => Ok(Self::ReadWrite),
            "transactional" | "transactional-rw" | "transactional-read-write" => Ok(Self::TransactionalReadWrite),
            _ => exn::bail!(ErrorKind::ModeNotSupported(mode.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ro", Mode::ReadOnly)]
    #[case("Read-Only", Mode::ReadOnly)]
    #[case("rw", Mode::ReadWrite)]
    #[case("readwrite", Mode::ReadWrite)]
    #[case("transactional", Mode::TransactionalReadWrite)]
    #[case("TRANSACTIONAL-RW", Mode::TransactionalReadWrite)]
    fn test_parse(#[case] input: &str, #[case] expected: Mode) {
        assert_eq!(input.parse::<Mode>().unwrap(), expected);
        assert_eq!(expected.to_string().parse::<Mode>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("append")]
    #[case("wo")]
    fn test_not_supported(#[case] input: &str) {
        let err = input.parse::<Mode>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::ModeNotSupported(m) if m == input));
    }

    #[rstest]
    #[case(Mode::ReadOnly, false)]
    #[case(Mode::ReadWrite, true)]
    #[case(Mode::TransactionalReadWrite, true)]
    fn test_is_writable(#[case] mode: Mode, #[case] writable: bool) {
        assert_eq!(mode.is_writable(), writable);
    }
}
