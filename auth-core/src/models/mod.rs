pub mod role;
pub mod token;
pub mod user;

pub use role::{Action, Permission, RequiredPermission, Role, Scope};
pub use token::{TokenClaims, TokenKind, TokenPair};
pub use user::{SanitizedUser, User};
