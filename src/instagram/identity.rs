// Session identity: who is logged in, according to the session cookie.
//
// The logged-in user's id travels in the `ds_user_id` cookie. Reading it is
// abstracted behind IdentityProvider so tests (and callers that track a
// fixed account) don't need a real browser session.

/// Name of the cookie carrying the logged-in user's id.
pub const SESSION_USER_COOKIE: &str = "ds_user_id";

/// Source of the ambient session identity.
pub trait IdentityProvider: Send + Sync {
    /// The logged-in user's id, or `None` if there is no session.
    fn session_user_id(&self) -> Option<String>;
}

/// Identity read from a raw `Cookie` header copied out of a browser.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    header: String,
}

impl SessionCookie {
    pub fn new(header: &str) -> Self {
        Self {
            header: header.trim().to_string(),
        }
    }

    /// The header value to send with every request.
    pub fn header_value(&self) -> &str {
        &self.header
    }

    /// Look up a single cookie by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| key.trim() == name)
            .map(|(_, value)| value.trim().trim_matches('"'))
            .filter(|value| !value.is_empty())
    }
}

impl IdentityProvider for SessionCookie {
    fn session_user_id(&self) -> Option<String> {
        self.get(SESSION_USER_COOKIE).map(str::to_string)
    }
}

/// A fixed identity, for tests and for tracking a known account.
#[derive(Debug, Clone, Default)]
pub struct FixedIdentity(pub Option<String>);

impl IdentityProvider for FixedIdentity {
    fn session_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}
