//! Security module - Encryption of stored user credentials

pub mod secret_codec;

pub use secret_codec::{EncryptedSecret, SecretCodec};
