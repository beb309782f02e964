use asmref_identity::PublicKeyToken;
use sha1::{Digest, Sha1};

/// Derive the 8-byte public key token from a full public key: the last
/// eight bytes of its SHA-1 hash, in reverse order.
pub fn public_key_token(public_key: &[u8]) -> PublicKeyToken {
    let digest = Sha1::digest(public_key);
    let token: Vec<u8> = digest[digest.len() - 8..].iter().rev().copied().collect();
    PublicKeyToken::new(token)
}
