pub mod assets;
pub mod compact;
pub mod config;
pub mod encrypt;
pub mod error;
pub mod fs_util;
pub mod netutil;
pub mod pki;
pub mod render;
pub mod token;

pub use error::{CredentialError, EncryptionError};
