//! Long-term node identity keys, distinct from the per-epoch [`crate::Share`].
//!
//! A node's identity is a plain (non-threshold) BLS keypair on the same
//! curve the vault signs partials on: a G1 signature verified against a G2
//! public key. It is generated once at node setup and persisted by the
//! `keys` crate; the DKG/reshare engine uses it to authenticate `propose` /
//! `accept` / `deal` / `response` packets, and a `Node`'s `self_signature`
//! (§3) is produced by [`IdentityKeyPair::sign`].

use blstrs::{G1Affine, G2Affine, Scalar};
use ff::Field;
use group::Curve;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::vault::{g1_from_bytes, g2_from_bytes, hash_to_g1, scalar_from_bytes, verify_pairing};

/// A node's long-term identity keypair.
pub struct IdentityKeyPair {
    secret: Scalar,
    public: G2Affine,
}

impl Drop for IdentityKeyPair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl IdentityKeyPair {
    /// Draws a fresh keypair from `rng`. Callers performing DKG may mix
    /// operator-supplied entropy into `rng` beforehand (§4.6 "User entropy");
    /// this function itself only ever consumes what `rng` yields.
    pub fn generate(mut rng: impl RngCore) -> Self {
        let secret = Scalar::random(&mut rng);
        let public = (G2Affine::generator() * secret).to_affine();
        IdentityKeyPair { secret, public }
    }

    /// Reconstructs a keypair from its persisted secret scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = scalar_from_bytes(bytes)?;
        let public = (G2Affine::generator() * secret).to_affine();
        Ok(IdentityKeyPair { secret, public })
    }

    pub fn secret_bytes(&self) -> Vec<u8> {
        self.secret.to_bytes_le().to_vec()
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.public.to_compressed().to_vec()
    }

    /// Signs an arbitrary message with this node's long-term key. Used to
    /// produce a `Node::self_signature` and to authenticate DKG packets.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        let h = hash_to_g1(msg);
        (h * self.secret).to_affine().to_compressed().to_vec()
    }
}

/// Verifies `sig` over `msg` under `public_key`. Used both to check a
/// `Node::self_signature` and to authenticate inbound DKG packets.
pub fn verify(public_key: &[u8], msg: &[u8], sig: &[u8]) -> Result<()> {
    let public = g2_from_bytes(public_key)?;
    let sig: G1Affine = g1_from_bytes(sig).map_err(|_| Error::MalformedEncoding)?;
    verify_pairing(&sig, &public, msg).map_err(|_| Error::InvalidIdentitySignature)
}

/// The canonical byte string a `Node`'s `self_signature` is computed over:
/// `public_key || address || index_be`. Shared by signer and verifier so the
/// two never drift out of sync on field ordering.
pub fn node_identity_message(public_key: &[u8], address: &str, index: u32) -> Vec<u8> {
    let mut msg = Vec::with_capacity(public_key.len() + address.len() + 4);
    msg.extend_from_slice(public_key);
    msg.extend_from_slice(address.as_bytes());
    msg.extend_from_slice(&index.to_be_bytes());
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn sign_and_verify_roundtrip() {
        let rng = ChaCha20Rng::seed_from_u64(1);
        let kp = IdentityKeyPair::generate(rng);
        let msg = node_identity_message(&kp.public_key(), "127.0.0.1:9000", 2);
        let sig = kp.sign(&msg);
        verify(&kp.public_key(), &msg, &sig).unwrap();
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let rng = ChaCha20Rng::seed_from_u64(2);
        let kp = IdentityKeyPair::generate(rng);
        let msg = node_identity_message(&kp.public_key(), "127.0.0.1:9001", 0);
        let mut sig = kp.sign(&msg);
        sig[0] ^= 0xff;
        assert!(verify(&kp.public_key(), &msg, &sig).is_err());
    }

    #[test]
    fn from_secret_bytes_reproduces_public_key() {
        let rng = ChaCha20Rng::seed_from_u64(3);
        let kp = IdentityKeyPair::generate(rng);
        let restored = IdentityKeyPair::from_secret_bytes(&kp.secret_bytes()).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
    }
}
