use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::{LockError, LockResult};

/// Raw entropy per token, before encoding
pub const TOKEN_BYTES: usize = 32;

/// Mint a fresh single-use ownership token from the OS CSPRNG.
pub fn generate_token() -> LockResult<String> {
    let mut raw = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut raw)
        .map_err(|e| LockError::TokenGeneration(e.to_string()))?;
    Ok(STANDARD.encode(raw))
}
