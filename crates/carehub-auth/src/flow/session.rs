//! Authorize flow session state.
//!
//! # Lifecycle
//!
//! 1. Created on the first `/oauth/authorize` request without a session cookie
//! 2. `login` stores the user id and advances to `chooseProgram`
//! 3. `chooseProgram` stores the program id and advances to `chooseFacility`
//! 4. `chooseFacility` mints the authorization code and the session is destroyed
//!
//! The session is serialized as JSON under [`SESSION_KEY`]. A payload that
//! fails to decode, or carries a different schema version, is treated as
//! absent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Session store key holding the encoded [`AuthorizationSession`].
pub const SESSION_KEY: &str = "authorization";

/// Current schema version of the session payload.
pub const SESSION_VERSION: u32 = 1;

/// Authorize flow pages, in the only order they may be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Page {
    Login,
    ChooseProgram,
    ChooseFacility,
    /// Terminal. No handler accepts it.
    Done,
}

impl Page {
    /// Returns the form value naming this page.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::ChooseProgram => "chooseProgram",
            Self::ChooseFacility => "chooseFacility",
            Self::Done => "",
        }
    }

    /// Parses a form value. The empty string is the terminal page.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "login" => Some(Self::Login),
            "chooseProgram" => Some(Self::ChooseProgram),
            "chooseFacility" => Some(Self::ChooseFacility),
            "" => Some(Self::Done),
            _ => None,
        }
    }

    /// The page that follows this one.
    #[must_use]
    pub fn next(&self) -> Self {
        match self {
            Self::Login => Self::ChooseProgram,
            Self::ChooseProgram => Self::ChooseFacility,
            Self::ChooseFacility | Self::Done => Self::Done,
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-request state of one authorize flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationSession {
    pub version: u32,

    pub page: Page,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<String>,

    /// The original authorize query, kept verbatim and re-validated before
    /// the code is minted.
    pub query_params: BTreeMap<String, String>,
}

impl AuthorizationSession {
    /// Starts a flow at the login page.
    #[must_use]
    pub fn new(query_params: BTreeMap<String, String>) -> Self {
        Self {
            version: SESSION_VERSION,
            page: Page::Login,
            user_id: None,
            program_id: None,
            facility_id: None,
            query_params,
        }
    }

    /// Moves to the next page. Pages never move backwards.
    pub fn advance(&mut self) {
        self.page = self.page.next();
    }

    /// Serializes the session for the store.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserializes a stored session. Anything unreadable is `None`.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        match serde_json::from_slice::<Self>(bytes) {
            Ok(session) if session.version == SESSION_VERSION => Some(session),
            Ok(session) => {
                tracing::warn!(version = session.version, "Discarding session with unknown version");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable session");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("client_id".to_string(), "web".to_string()),
            ("state".to_string(), "xyz".to_string()),
        ])
    }

    #[test]
    fn test_pages_only_advance() {
        let mut session = AuthorizationSession::new(params());
        assert_eq!(session.page, Page::Login);
        session.advance();
        assert_eq!(session.page, Page::ChooseProgram);
        session.advance();
        assert_eq!(session.page, Page::ChooseFacility);
        session.advance();
        assert_eq!(session.page, Page::Done);
        session.advance();
        assert_eq!(session.page, Page::Done);
        assert!(Page::Login < Page::ChooseProgram);
    }

    #[test]
    fn test_page_names() {
        assert_eq!(Page::ChooseProgram.as_str(), "chooseProgram");
        assert_eq!(Page::parse("chooseFacility"), Some(Page::ChooseFacility));
        assert_eq!(Page::parse(""), Some(Page::Done));
        assert_eq!(Page::parse("consent"), None);
    }

    #[test]
    fn test_encode_decode_preserves_query() {
        let mut session = AuthorizationSession::new(params());
        session.user_id = Some("u1".to_string());
        session.advance();
        let bytes = session.encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["page"], "chooseProgram");
        assert_eq!(json["userId"], "u1");

        let decoded = AuthorizationSession::decode(&bytes).unwrap();
        assert_eq!(decoded, session);
        assert_eq!(decoded.query_params, params());
    }

    #[test]
    fn test_garbage_is_absent() {
        assert!(AuthorizationSession::decode(b"not json").is_none());
        assert!(AuthorizationSession::decode(br#"{"page":"login"}"#).is_none());
    }

    #[test]
    fn test_unknown_version_is_absent() {
        let mut session = AuthorizationSession::new(params());
        session.version = SESSION_VERSION + 1;
        let bytes = session.encode().unwrap();
        assert!(AuthorizationSession::decode(&bytes).is_none());
    }
}
