pub mod password;

pub use password::{hash_password, matches, verify_password, Password, PasswordHashString};
