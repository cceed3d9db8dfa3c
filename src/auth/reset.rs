use rand::RngCore;
use time::Duration;

/// Reset tokens are redeemable for one hour from issuance.
pub const RESET_TOKEN_TTL: Duration = Duration::hours(1);

/// 32 random bytes, hex-encoded. Deliberately a different shape from the
/// signed session tokens.
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
