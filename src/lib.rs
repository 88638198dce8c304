pub mod builder;
pub mod cache;
pub mod claims;
pub mod codec;
pub mod error;
pub mod header;
pub mod kms;
pub mod provider;
pub mod secret;
pub mod signer;
pub mod time;
pub mod token;

pub use builder::TokenBuilder;
pub use error::TokenError;
pub use token::Token;
