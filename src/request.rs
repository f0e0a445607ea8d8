//! The request initial.

use crate::headers::HeaderMap;
use crate::method::Method;
use crate::version::Version;

/// A request initial: the request line plus headers. Immutable once
/// constructed; the parser and the composer both hand out frozen copies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestInitial {
    method: Method,
    version: Version,
    uri: Vec<u8>,
    authority: Option<String>,
    scheme: Option<String>,
    headers: HeaderMap,
}

impl RequestInitial {
    pub fn new(method: Method, version: Version, uri: impl Into<Vec<u8>>) -> RequestInitial {
        RequestInitial {
            method,
            version,
            uri: uri.into(),
            authority: None,
            scheme: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> RequestInitial {
        self.headers = headers;
        self
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> RequestInitial {
        self.authority = Some(authority.into());
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> RequestInitial {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn uri(&self) -> &[u8] {
        &self.uri
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Consumes this initial and returns a copy whose header map rejects
    /// further mutation. The parser and composer call this before handing
    /// an initial to application code.
    pub fn freeze(mut self) -> RequestInitial {
        self.headers = self.headers.freeze();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_round_trips_fields() {
        let req = RequestInitial::new(Method::Get, Version::Http11, "/index")
            .with_authority("example.com")
            .with_scheme("https");
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.version(), Version::Http11);
        assert_eq!(req.uri(), b"/index");
        assert_eq!(req.authority(), Some("example.com"));
        assert_eq!(req.scheme(), Some("https"));
    }
}
