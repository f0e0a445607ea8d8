//! The HTTP/1.x version line.

use std::fmt;

/// Either of the two HTTP versions this engine understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    /// The literal wire token, e.g. `"HTTP/1.1"`.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }

    /// Maps from httparse's `0`/`1` version number.
    pub(crate) fn from_httparse(v: u8) -> Option<Version> {
        match v {
            0 => Some(Version::Http10),
            1 => Some(Version::Http11),
            _ => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
