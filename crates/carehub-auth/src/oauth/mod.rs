//! OAuth 2.0 authorization server.
//!
//! - `authorize` - authorization endpoint request/response types
//! - `token` - token, revocation and introspection types
//! - `client` - client registrations and client authentication
//! - `provider` - the [`OAuth2Provider`] capability used by the handlers
//! - `jwt` - HS256 JWT implementation of the provider

pub mod authorize;
pub mod client;
pub mod jwt;
pub mod provider;
pub mod token;

pub use authorize::{AuthorizationError, AuthorizationErrorCode, AuthorizeRequest, AuthorizeResponse};
pub use client::{GrantType, PresentedClient, RegisteredClient, extract_client_credentials};
pub use jwt::{AccessTokenClaims, INTERNAL_CLIENT_ID, JwtProvider};
pub use provider::{AccessRequest, InternalTokenIssuer, OAuth2Provider, TokenSession};
pub use token::{
    IntrospectionResponse, TokenError, TokenErrorCode, TokenForm, TokenRequest, TokenResponse,
};
