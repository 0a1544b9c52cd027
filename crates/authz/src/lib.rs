//! Authentication and route access policy.
//!
//! Shelf knows exactly one user, configured in settings. Requests prove who
//! they are with HTTP Basic credentials; an [`AccessPolicy`] lists the routes
//! that anyone may call.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("unsupported authorization scheme")]
    UnsupportedScheme,
    #[error("malformed credentials")]
    Malformed,
    #[error("invalid username or password")]
    InvalidCredentials,
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
}

/// Verifies Basic credentials against the single configured user.
#[derive(Clone)]
pub struct Authenticator {
    username: String,
    password: String,
}

impl Authenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check an `Authorization` header value.
    pub fn verify(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let header = authorization.ok_or(AuthError::Missing)?;
        let (scheme, encoded) = header
            .trim()
            .split_once(' ')
            .ok_or(AuthError::Malformed)?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(AuthError::UnsupportedScheme);
        }

        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::Malformed)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Malformed)?;
        let (username, password) = decoded.split_once(':').ok_or(AuthError::Malformed)?;

        let user_ok = username.as_bytes().ct_eq(self.username.as_bytes());
        let pass_ok = password.as_bytes().ct_eq(self.password.as_bytes());
        if bool::from(user_ok & pass_ok) {
            Ok(Principal {
                username: username.to_string(),
            })
        } else {
            tracing::warn!(target: "shelf-authz", %username, "rejected credentials");
            Err(AuthError::InvalidCredentials)
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
enum PathMatch {
    Exact(String),
    Prefix(String),
}

#[derive(Debug, Clone)]
struct Rule {
    method: Option<String>,
    path: PathMatch,
}

/// Routes that skip authentication. Everything else requires a principal.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    public: Vec<Rule>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `method` on exactly `path` without credentials.
    pub fn permit(mut self, method: &str, path: &str) -> Self {
        self.public.push(Rule {
            method: Some(method.to_ascii_uppercase()),
            path: PathMatch::Exact(normalize(path).to_string()),
        });
        self
    }

    /// Allow any method on every path under `prefix` without credentials.
    pub fn permit_prefix(mut self, prefix: &str) -> Self {
        self.public.push(Rule {
            method: None,
            path: PathMatch::Prefix(prefix.to_string()),
        });
        self
    }

    pub fn is_public(&self, method: &str, path: &str) -> bool {
        let path = normalize(path);
        self.public.iter().any(|rule| {
            let method_ok = rule
                .method
                .as_deref()
                .map_or(true, |m| m.eq_ignore_ascii_case(method));
            let path_ok = match &rule.path {
                PathMatch::Exact(exact) => exact == path,
                PathMatch::Prefix(prefix) => path.starts_with(prefix.as_str()),
            };
            method_ok && path_ok
        })
    }
}

fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// Authentication plus policy, the unit the HTTP layer installs.
#[derive(Debug, Clone)]
pub struct Guard {
    authenticator: Authenticator,
    policy: AccessPolicy,
}

impl Guard {
    pub fn new(authenticator: Authenticator, policy: AccessPolicy) -> Self {
        Self {
            authenticator,
            policy,
        }
    }

    /// `Ok(None)` for public routes, `Ok(Some(_))` for authenticated callers.
    pub fn check(
        &self,
        method: &str,
        path: &str,
        authorization: Option<&str>,
    ) -> Result<Option<Principal>, AuthError> {
        if self.policy.is_public(method, path) {
            return Ok(None);
        }
        self.authenticator.verify(authorization).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
    }

    fn guard() -> Guard {
        Guard::new(
            Authenticator::new("librarian", "changeme"),
            AccessPolicy::new()
                .permit("GET", "/api/books")
                .permit_prefix("/swagger-ui"),
        )
    }

    #[test]
    fn accepts_configured_user() {
        let auth = Authenticator::new("librarian", "changeme");
        let principal = auth.verify(Some(&basic("librarian", "changeme"))).unwrap();
        assert_eq!(principal.username, "librarian");
    }

    #[test]
    fn rejects_wrong_password_and_user() {
        let auth = Authenticator::new("librarian", "changeme");
        assert_eq!(
            auth.verify(Some(&basic("librarian", "wrong"))),
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            auth.verify(Some(&basic("someone", "changeme"))),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn rejects_missing_and_malformed_headers() {
        let auth = Authenticator::new("librarian", "changeme");
        assert_eq!(auth.verify(None), Err(AuthError::Missing));
        assert_eq!(auth.verify(Some("Bearer abc")), Err(AuthError::UnsupportedScheme));
        assert_eq!(auth.verify(Some("Basic !!!")), Err(AuthError::Malformed));
        assert_eq!(
            auth.verify(Some(&format!("Basic {}", STANDARD.encode("no-colon")))),
            Err(AuthError::Malformed)
        );
    }

    #[test]
    fn listing_is_public_but_mutations_are_not() {
        let guard = guard();
        assert_eq!(guard.check("GET", "/api/books", None), Ok(None));
        assert_eq!(guard.check("GET", "/api/books/", None), Ok(None));
        assert_eq!(guard.check("GET", "/swagger-ui/index.html", None), Ok(None));
        assert_eq!(guard.check("POST", "/api/books", None), Err(AuthError::Missing));
        assert_eq!(guard.check("GET", "/api/books/1", None), Err(AuthError::Missing));
    }

    #[test]
    fn protected_route_with_credentials_yields_principal() {
        let guard = guard();
        let header = basic("librarian", "changeme");
        let principal = guard.check("DELETE", "/api/books/1", Some(&header)).unwrap();
        assert_eq!(
            principal,
            Some(Principal {
                username: "librarian".to_string()
            })
        );
    }
}
