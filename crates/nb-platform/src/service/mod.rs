//! Service Layer
//!
//! Session tokens, request authentication, and the user and note use cases.

pub mod auth;
pub mod clock;
pub mod notes;
pub mod password;
pub mod token;
pub mod users;

pub use auth::{extract_bearer_token, AuthFailure, AuthGate, IdentityLookup};
pub use clock::{Clock, ManualClock, SystemClock};
pub use notes::{NoteInput, NotePage, NoteService, NoteView, PageRequest};
pub use password::PasswordService;
pub use token::{TokenClaims, TokenError, TokenKind, TokenService};
pub use users::{LoginOutcome, RefreshOutcome, Registered, Registration, UserService};
