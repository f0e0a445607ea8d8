//! The response initial.

use crate::headers::HeaderMap;
use crate::status::StatusCode;
use crate::version::Version;

/// A response initial: the status line plus headers. Immutable once
/// constructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseInitial {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
}

impl ResponseInitial {
    pub fn new(status: StatusCode, version: Version) -> ResponseInitial {
        ResponseInitial {
            status,
            version,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> ResponseInitial {
        self.headers = headers;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn freeze(mut self) -> ResponseInitial {
        self.headers = self.headers.freeze();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_round_trips_fields() {
        let resp = ResponseInitial::new(StatusCode::OK, Version::Http11);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.version(), Version::Http11);
        assert!(resp.headers().is_empty());
    }
}
