//! OAuth 2.0 authorization code flow.
//!
//! - [`authorize`] - Authorization endpoint pipeline
//! - [`state`] - Session-bound, single-use CSRF state
//! - [`redirect`] - Exact redirect URI matching
//! - [`pkce`] - PKCE challenge/verifier and downgrade protection
//! - [`code`] - Authorization code records
//! - [`exchange`] - Code-for-token exchange
//! - [`client_auth`] - Client authentication at the token endpoint
//! - [`token`] - Token endpoint request/response types
//!
//! # Example
//!
//! ```
//! use keyward_auth::oauth::{PkceChallenge, PkceChallengeMethod, PkceVerifier};
//!
//! // Client generates PKCE verifier and challenge
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//! assert_eq!(challenge.method(), PkceChallengeMethod::S256);
//!
//! // Server checks the verifier presented at the token endpoint
//! assert!(challenge.verify(&verifier).is_ok());
//! ```

pub mod authorize;
pub mod client_auth;
pub mod code;
pub mod exchange;
pub mod pkce;
pub mod redirect;
pub mod state;
pub mod token;

// Authorization endpoint
pub use authorize::{
    AuthorizationConfig, AuthorizationError, AuthorizationErrorCode, AuthorizationGrant,
    AuthorizationRequest, AuthorizationResponse, AuthorizationService, AuthorizeRejection,
};

// Client authentication
pub use client_auth::{
    AuthenticatedClient, ClientCredentials, TokenEndpointAuthMethod, authenticate_client,
    parse_basic_auth,
};

// Codes and exchange
pub use code::{AuthorizationCode, CodeStatus};
pub use exchange::{CodeExchange, CodeExchangeRequest};

// PKCE
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkcePolicyEnforcer, PkceVerifier};

// Redirect and state
pub use redirect::{RedirectError, RedirectUriMatcher};
pub use state::{CsrfError, CsrfState, StateValidator};

// Token endpoint types
pub use token::{TokenError, TokenErrorCode, TokenRequest, TokenResponse, TokenType};
