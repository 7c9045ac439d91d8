//! Generalized endpoint strings.
//!
//! An endpoint is written `[host|path][,port]`. The split happens at the
//! right-most separator so that host parts may themselves contain commas.
//! A single component is a port on the wildcard host, unless it starts with
//! `/`, in which case it names a local (unix) socket.

use std::ffi::CString;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;

use crate::defaults::{ENDPOINT_SEPARATOR, PATH_SEPARATOR};

/// Errors produced while parsing or resolving an endpoint string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("invalid endpoint: {0:?}")]
    InvalidEndpoint(String),

    #[error("out of memory while parsing endpoint")]
    ResourceExhausted,

    #[error("unknown service: {0}")]
    UnknownService(String),
}

/// A parsed endpoint: an optional host (or socket path) and optional port.
///
/// At least one component is always present.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: Option<String>,
    port: Option<String>,
}

impl Endpoint {
    /// Parse a generalized endpoint token.
    ///
    /// Pure and deterministic: the same token always yields the same result.
    pub fn parse(token: &str) -> Result<Self, EndpointError> {
        if token.is_empty() {
            return Err(EndpointError::InvalidEndpoint(String::new()));
        }

        let (left, right) = match token.rfind(ENDPOINT_SEPARATOR) {
            Some(idx) => (&token[..idx], &token[idx + ENDPOINT_SEPARATOR.len_utf8()..]),
            None => (token, ""),
        };

        if !right.is_empty() {
            let host = if left.is_empty() {
                None
            } else {
                Some(duplicate(left)?)
            };
            return Ok(Self {
                host,
                port: Some(duplicate(right)?),
            });
        }

        // A single component, possibly followed by an empty port.
        if left.is_empty() {
            return Err(EndpointError::InvalidEndpoint(token.to_string()));
        }

        if left.starts_with(PATH_SEPARATOR) {
            Ok(Self {
                host: Some(duplicate(left)?),
                port: None,
            })
        } else {
            Ok(Self {
                host: None,
                port: Some(duplicate(left)?),
            })
        }
    }

    /// Parse an optional token; an absent token is invalid.
    pub fn parse_opt(token: Option<&str>) -> Result<Self, EndpointError> {
        match token {
            Some(token) => Self::parse(token),
            None => Err(EndpointError::InvalidEndpoint(String::new())),
        }
    }

    /// Host name, address literal or socket path.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Port number or service name.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Whether this endpoint names a local socket path.
    pub fn is_local_socket(&self) -> bool {
        self.host
            .as_deref()
            .is_some_and(|h| h.starts_with(PATH_SEPARATOR))
    }

    /// Resolve the port/service component and classify the endpoint.
    ///
    /// Host names are left unresolved; address lookup happens where the
    /// endpoint is bound or connected.
    pub fn target(&self) -> Result<Target, EndpointError> {
        if self.is_local_socket() {
            let path = self.host.as_deref().unwrap_or_default();
            return Ok(Target::Local(PathBuf::from(path)));
        }

        let service = self
            .port
            .as_deref()
            .ok_or_else(|| EndpointError::InvalidEndpoint(self.to_string()))?;
        let port = resolve_service(service)?;

        Ok(Target::Network {
            host: self.host.clone(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.host, &self.port) {
            (Some(host), Some(port)) => write!(f, "{host}{ENDPOINT_SEPARATOR}{port}"),
            (Some(host), None) => f.write_str(host),
            (None, Some(port)) => write!(f, "{ENDPOINT_SEPARATOR}{port}"),
            (None, None) => Ok(()),
        }
    }
}

/// A classified endpoint, ready for binding or connecting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// Unix domain socket path.
    Local(PathBuf),
    /// Network endpoint; `None` host means the wildcard (bind) or loopback
    /// (connect) address.
    Network { host: Option<String>, port: u16 },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Local(path) => write!(f, "{}", path.display()),
            Target::Network {
                host: Some(host),
                port,
            } => write!(f, "{host}{ENDPOINT_SEPARATOR}{port}"),
            Target::Network { host: None, port } => write!(f, "*{ENDPOINT_SEPARATOR}{port}"),
        }
    }
}

/// Copy a component, reporting allocation failure instead of aborting.
fn duplicate(part: &str) -> Result<String, EndpointError> {
    let mut owned = String::new();
    owned
        .try_reserve_exact(part.len())
        .map_err(|_| EndpointError::ResourceExhausted)?;
    owned.push_str(part);
    Ok(owned)
}

/// Serializes access to the services database; `getservbyname` returns a
/// pointer into storage shared by every caller in the process.
static SERVICES_DB: Mutex<()> = Mutex::new(());

/// Map a numeric port or a service name from the services database.
///
/// Safe to call from several threads at once.
pub fn resolve_service(service: &str) -> Result<u16, EndpointError> {
    if let Ok(port) = service.parse::<u16>() {
        return Ok(port);
    }
    lookup_service(service).ok_or_else(|| EndpointError::UnknownService(service.to_string()))
}

fn lookup_service(name: &str) -> Option<u16> {
    use nix::libc;

    let name = CString::new(name).ok()?;
    // A panic while holding the guard cannot leave the database inconsistent.
    let _guard = SERVICES_DB.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // SAFETY: both arguments are valid NUL-terminated strings. The returned
    // entry lives in static storage; the lock keeps other callers in this
    // process from overwriting it before the port is copied out.
    let port = unsafe {
        let entry = libc::getservbyname(name.as_ptr(), c"tcp".as_ptr());
        if entry.is_null() {
            return None;
        }
        (*entry).s_port
    };
    Some(u16::from_be(port as u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(token: &str) -> (Option<String>, Option<String>) {
        let ep = Endpoint::parse(token).unwrap();
        (ep.host().map(String::from), ep.port().map(String::from))
    }

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn empty_or_absent_token_is_invalid() {
        assert!(matches!(
            Endpoint::parse(""),
            Err(EndpointError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Endpoint::parse_opt(None),
            Err(EndpointError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn lone_separator_is_invalid() {
        assert!(matches!(
            Endpoint::parse(","),
            Err(EndpointError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn unix_socket_with_port() {
        assert_eq!(
            parts("/var/run/gunnel,hej"),
            (some("/var/run/gunnel"), some("hej"))
        );
    }

    #[test]
    fn unix_socket_with_trailing_separator() {
        assert_eq!(parts("/var/run/gunnel,"), (some("/var/run/gunnel"), None));
        assert_eq!(parts("/var/run/gunnel"), (some("/var/run/gunnel"), None));
    }

    #[test]
    fn trailing_separator_after_name_rescues_port() {
        assert_eq!(parts("ipv6.example.com,"), (None, some("ipv6.example.com")));
    }

    #[test]
    fn bare_component_is_port() {
        assert_eq!(parts("https"), (None, some("https")));
        assert_eq!(parts("8443"), (None, some("8443")));
    }

    #[test]
    fn empty_host_side() {
        assert_eq!(parts(",smtp"), (None, some("smtp")));
    }

    #[test]
    fn host_and_port() {
        assert_eq!(parts("::1,smtp"), (some("::1"), some("smtp")));
        assert_eq!(parts("localhost,80"), (some("localhost"), some("80")));
    }

    #[test]
    fn splits_at_rightmost_separator() {
        assert_eq!(
            parts("adam,bero,caesar"),
            (some("adam,bero"), some("caesar"))
        );
    }

    #[test]
    fn parsing_is_deterministic() {
        for token in ["adam,bero,caesar", "/tmp/s,", "https", ",smtp", "::1,25"] {
            assert_eq!(Endpoint::parse(token), Endpoint::parse(token));
        }
    }

    #[test]
    fn display_round_trips_parsed_components() {
        for token in ["adam,bero,caesar", "/tmp/sock", ",smtp", "::1,25"] {
            let ep = Endpoint::parse(token).unwrap();
            assert_eq!(Endpoint::parse(&ep.to_string()).unwrap(), ep);
        }
    }

    #[test]
    fn target_classifies_local_socket() {
        let target = Endpoint::parse("/run/gunnel.sock,ignored")
            .unwrap()
            .target()
            .unwrap();
        assert_eq!(target, Target::Local(PathBuf::from("/run/gunnel.sock")));
    }

    #[test]
    fn target_resolves_numeric_port() {
        let target = Endpoint::parse("127.0.0.1,8080").unwrap().target().unwrap();
        assert_eq!(
            target,
            Target::Network {
                host: some("127.0.0.1"),
                port: 8080
            }
        );

        let wildcard = Endpoint::parse("993").unwrap().target().unwrap();
        assert_eq!(
            wildcard,
            Target::Network {
                host: None,
                port: 993
            }
        );
    }

    #[test]
    fn service_lookup_is_consistent_across_threads() {
        let expected = resolve_service("smtp");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..200)
                        .map(|i| {
                            if i % 2 == 0 {
                                resolve_service("smtp")
                            } else {
                                resolve_service("no-such-service-gunnel")
                            }
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            for (i, result) in handle.join().unwrap().into_iter().enumerate() {
                if i % 2 == 0 {
                    assert_eq!(result, expected);
                } else {
                    assert!(result.is_err());
                }
            }
        }
    }

    #[test]
    fn target_rejects_unknown_service() {
        let err = Endpoint::parse("localhost,no-such-service-gunnel")
            .unwrap()
            .target()
            .unwrap_err();
        assert_eq!(
            err,
            EndpointError::UnknownService("no-such-service-gunnel".into())
        );
    }
}
