//! Anti-forgery state tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

/// Bytes of entropy in a state token
const STATE_BYTES: usize = 32;

/// Generate an unguessable, URL-safe state token.
pub fn generate_state_token() -> String {
    let mut buf = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
