//! Token authentication: salted pseudonymized lookup of bearer tokens.

pub mod resolver;
pub mod salt;

pub use resolver::TokenResolver;
pub use salt::TokenSalt;
