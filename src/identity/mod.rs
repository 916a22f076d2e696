//! Identity and session management: token lifecycle, user normalization, the credential
//! exchange and the session state machine built on top of them.
//! Keep the public surface thin and split implementation across sub-modules.

mod flags;
mod provider;
mod session;
mod token;
mod user;

pub use flags::SessionFlags;
pub use provider::{ApiAuthBackend, AuthBackend, LoginRequest, LoginResponse};
pub use session::{LoginResult, Redirect, RouteAccess, SessionAuthority, SessionStatus};
pub use token::{decode_claims, validate_at, Claims, TokenAuthority, TokenDecodeError, TokenValidation};
pub use user::User;
