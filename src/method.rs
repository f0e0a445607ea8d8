//! The HTTP request method.

use std::fmt;

/// The method of a request initial.
///
/// Unlike some HTTP libraries, this enum has no "extension" variant: the
/// wire format only ever carries one of these nine tokens, exactly
/// uppercase. Anything else fails to parse as
/// [`crate::error::ParseError::InvalidMethod`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Connect,
    Trace,
    Patch,
}

/// Returned by [`Method::from_bytes`] when the token does not match one of
/// the nine known methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidMethod(());

impl fmt::Display for InvalidMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid HTTP method")
    }
}

impl std::error::Error for InvalidMethod {}

impl Method {
    /// Parses a method token. The token must be exactly uppercase ASCII,
    /// matching one of the nine known methods.
    pub fn from_bytes(b: &[u8]) -> Result<Method, InvalidMethod> {
        match b {
            b"GET" => Ok(Method::Get),
            b"POST" => Ok(Method::Post),
            b"PUT" => Ok(Method::Put),
            b"DELETE" => Ok(Method::Delete),
            b"HEAD" => Ok(Method::Head),
            b"OPTIONS" => Ok(Method::Options),
            b"CONNECT" => Ok(Method::Connect),
            b"TRACE" => Ok(Method::Trace),
            b"PATCH" => Ok(Method::Patch),
            _ => Err(InvalidMethod(())),
        }
    }

    /// The canonical wire representation, e.g. `"GET"`.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = InvalidMethod;

    fn from_str(s: &str) -> Result<Method, InvalidMethod> {
        Method::from_bytes(s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::Method;

    #[test]
    fn known_methods_round_trip() {
        for m in [
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Head,
            Method::Options,
            Method::Connect,
            Method::Trace,
            Method::Patch,
        ] {
            assert_eq!(Method::from_bytes(m.as_str().as_bytes()), Ok(m));
        }
    }

    #[test]
    fn lowercase_is_rejected() {
        assert!(Method::from_bytes(b"get").is_err());
    }

    #[test]
    fn unknown_token_is_rejected() {
        assert!(Method::from_bytes(b"MOVE").is_err());
    }
}
