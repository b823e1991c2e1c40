//! Backing-store endpoint descriptor.
//!
//! The descriptor is opaque to pooldb: it is handed to the [`Connector`]
//! untouched and never parsed or validated here.
//!
//! [`Connector`]: crate::Connector

use std::fmt;

/// Credentials presented to the backing store.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password or token.
    pub password: String,
}

impl Credentials {
    /// Create credentials from a user name and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Address of the store, in whatever form the connector understands.
    pub address: String,
    /// Credentials, if the store requires them.
    pub credentials: Option<Credentials>,
}

impl Endpoint {
    /// Create an endpoint without credentials.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: None,
        }
    }

    /// Attach credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let endpoint = Endpoint::new("db:1").credentials("game", "hunter2");
        let debug = format!("{endpoint:?}");
        assert!(debug.contains("game"));
        assert!(!debug.contains("hunter2"));
    }
}
