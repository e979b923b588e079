use std::fmt;

/// HTTP version used on the wire.
///
/// Only 1.0 and 1.1 are recognized; anything else is rejected by the
/// status-line parser before a `Version` is ever constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Version::Http10 => write!(f, "HTTP/1.0"),
            Version::Http11 => write!(f, "HTTP/1.1"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Version;

    #[test]
    fn display() {
        assert_eq!(Version::Http10.to_string(), "HTTP/1.0");
        assert_eq!(Version::Http11.to_string(), "HTTP/1.1");
    }
}
