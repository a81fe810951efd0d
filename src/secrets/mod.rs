//! secrets
//!
//! Password encoding seam for shared objects.
//!
//! # Design
//!
//! Database connections and slave servers carry credentials. The codec is
//! an injected strategy so the client never depends on ambient encryption
//! helpers: production embeds whatever scheme the deployment mandates,
//! tests substitute a deterministic fake.
//!
//! Implementations MUST:
//! - Never log, print, or include decoded passwords in error messages
//! - Round-trip: `decode(encode(p)) == p`
//! - Be thread-safe (Send + Sync)

use thiserror::Error;

/// Errors from password decoding.
///
/// Note: error messages intentionally never include password material.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stored form is not something this codec produced.
    #[error("malformed stored password")]
    Malformed,
}

/// Encodes passwords for storage and decodes them on load.
pub trait PasswordCodec: Send + Sync {
    /// Encode a clear password into its stored form.
    fn encode(&self, clear: &str) -> String;

    /// Decode a stored form back into the clear password.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Malformed` if the stored form is not decodable.
    fn decode(&self, stored: &str) -> Result<String, CodecError>;
}

/// Stores passwords as-is. For deployments where the store itself
/// encrypts at rest.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCodec;

impl PasswordCodec for PlainCodec {
    fn encode(&self, clear: &str) -> String {
        clear.to_string()
    }

    fn decode(&self, stored: &str) -> Result<String, CodecError> {
        Ok(stored.to_string())
    }
}

/// Hex-obfuscates passwords with a marker prefix.
///
/// Obfuscation, not encryption: it keeps credentials out of casual string
/// dumps and makes accidental double-encoding detectable via the prefix.
///
/// # Example
///
/// ```
/// use strata::secrets::{HexCodec, PasswordCodec};
///
/// let codec = HexCodec;
/// let stored = codec.encode("hunter2");
/// assert!(stored.starts_with("hex:"));
/// assert_eq!(codec.decode(&stored).unwrap(), "hunter2");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct HexCodec;

impl HexCodec {
    const PREFIX: &'static str = "hex:";
}

impl PasswordCodec for HexCodec {
    fn encode(&self, clear: &str) -> String {
        format!("{}{}", Self::PREFIX, hex::encode(clear.as_bytes()))
    }

    fn decode(&self, stored: &str) -> Result<String, CodecError> {
        let payload = stored
            .strip_prefix(Self::PREFIX)
            .ok_or(CodecError::Malformed)?;
        let bytes = hex::decode(payload).map_err(|_| CodecError::Malformed)?;
        String::from_utf8(bytes).map_err(|_| CodecError::Malformed)
    }
}
