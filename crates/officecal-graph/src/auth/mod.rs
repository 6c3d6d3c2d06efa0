//! Sign-in and token management.

mod authenticator;
pub mod oauth;

pub use authenticator::{AuthStatus, Authenticator};
pub use oauth::{OAuthClient, OAuthError, TokenGrant, account_from_id_token};
