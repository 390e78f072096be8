//! Identity primitives used by the authorization gate.
//!
//! Everything in this crate is pure in-memory computation: nothing here
//! touches the store, so callers may use it freely on the request path.

pub mod cipher;
pub mod credentials;
pub mod settings;
pub mod token;

pub use cipher::{CipherError, FieldCipher};
pub use credentials::{CredentialError, hash_password, reject_missing_account, verify_password};
pub use settings::{AuthSettings, MAX_TOKEN_TTL_MINUTES};
pub use token::{SessionClaims, SessionTokens, TokenError, TokenSubject};
