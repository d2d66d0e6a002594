use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};

/// Mints opaque rotation tokens. No state beyond entropy consumption.
pub trait TokenGenerator: Send + Sync {
    /// # Errors
    /// Returns an error if entropy is unavailable.
    fn generate(&self) -> Result<String>;
}

/// 32 bytes from the OS RNG, base64 URL-safe without padding.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomTokenGenerator;

impl TokenGenerator for RandomTokenGenerator {
    fn generate(&self) -> Result<String> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate rotation token")?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }
}
