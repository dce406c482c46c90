use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const TOKEN_MIN_LEN: usize = 16;
pub const TOKEN_MAX_LEN: usize = 128;

const ADJECTIVES: &[&str] = &[
    "Quiet", "Gentle", "Bright", "Calm", "Curious", "Drifting", "Hidden", "Kind",
    "Lucky", "Mellow", "Patient", "Soft", "Steady", "Sunny", "Warm", "Wandering",
];

const ANIMALS: &[&str] = &[
    "Otter", "Heron", "Fox", "Lynx", "Sparrow", "Badger", "Owl", "Hare",
    "Moth", "Seal", "Wren", "Deer", "Koala", "Finch", "Panda", "Robin",
];

/// Tokens are opaque to the server but must look like something we minted.
pub fn is_valid_token(token: &str) -> bool {
    (TOKEN_MIN_LEN..=TOKEN_MAX_LEN).contains(&token.len())
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// 256 bits from the thread CSPRNG, URL-safe base64 without padding.
pub fn mint_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Stable anonymous handle shown to other members.
pub fn display_name(device_id: Uuid) -> String {
    let digest = Sha256::digest(device_id.as_bytes());
    let adjective = ADJECTIVES[digest[0] as usize % ADJECTIVES.len()];
    let animal = ANIMALS[digest[1] as usize % ANIMALS.len()];
    format!("{} {}", adjective, animal)
}

/// One-way identifier used by the letter flow in place of the device id.
pub fn device_hash(salt: &str, device_id: Uuid) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(device_id.as_bytes());
    hex::encode(hasher.finalize())
}
