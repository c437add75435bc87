//! Point-to-point deal encryption (§4.6.1: "the leader never learns any
//! other participant's share"). Each evaluation is sealed to its
//! recipient's long-term identity key via an ephemeral-ECDH-derived key
//! and `xsalsa20poly1305` AEAD.

use blstrs::{G2Affine, Scalar};
use ff::Field;
use group::Curve;
use rand::RngCore;
use sha2::{Digest, Sha256};
use xsalsa20poly1305::aead::{Aead, KeyInit};
use xsalsa20poly1305::{Key, Nonce, XSalsa20Poly1305};

use crate::error::{Error, Result};
use crate::message::EncryptedShare;

fn derive_key(shared_point: &G2Affine) -> Key {
    let digest = Sha256::digest(shared_point.to_compressed());
    Key::clone_from_slice(&digest)
}

/// Seals `scalar` (a share evaluation) to `recipient_public` (the
/// recipient's long-term identity public key, a compressed G2 point).
pub fn encrypt_share(
    recipient_public: &G2Affine,
    scalar: &Scalar,
    recipient_index: u32,
    rng: &mut impl RngCore,
) -> EncryptedShare {
    let ephemeral_secret = Scalar::random(&mut *rng);
    let ephemeral_public = (G2Affine::generator() * ephemeral_secret).to_affine();
    let shared_point = (*recipient_public * ephemeral_secret).to_affine();

    let key = derive_key(&shared_point);
    let cipher = XSalsa20Poly1305::new(&key);
    let mut nonce_bytes = [0u8; 24];
    rng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = scalar.to_bytes_le();
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_ref())
        .expect("xsalsa20poly1305 encryption is infallible for well-formed input");

    EncryptedShare {
        recipient_index,
        ephemeral_public: ephemeral_public.to_compressed().to_vec(),
        nonce: nonce_bytes.to_vec(),
        ciphertext,
    }
}

/// Opens an [`EncryptedShare`] using this node's long-term identity
/// secret scalar.
pub fn decrypt_share(my_secret: &Scalar, share: &EncryptedShare) -> Result<Scalar> {
    let ephemeral_public_bytes: [u8; 96] = share
        .ephemeral_public
        .as_slice()
        .try_into()
        .map_err(|_| Error::DealDecryption(share.recipient_index))?;
    let ephemeral_public: G2Affine = Option::from(G2Affine::from_compressed(&ephemeral_public_bytes))
        .ok_or(Error::DealDecryption(share.recipient_index))?;
    let shared_point = (ephemeral_public * my_secret).to_affine();
    let key = derive_key(&shared_point);
    let cipher = XSalsa20Poly1305::new(&key);
    let nonce = Nonce::from_slice(&share.nonce);
    let plaintext = cipher
        .decrypt(nonce, share.ciphertext.as_ref())
        .map_err(|_| Error::DealDecryption(share.recipient_index))?;
    let repr: [u8; 32] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| Error::DealDecryption(share.recipient_index))?;
    Option::from(Scalar::from_bytes_le(&repr)).ok_or(Error::DealDecryption(share.recipient_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use group::Group;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let recipient_secret = Scalar::random(&mut rng);
        let recipient_public = (G2Affine::generator() * recipient_secret).to_affine();

        let share_value = Scalar::random(&mut rng);
        let sealed = encrypt_share(&recipient_public, &share_value, 3, &mut rng);
        let opened = decrypt_share(&recipient_secret, &sealed).unwrap();
        assert_eq!(share_value, opened);
    }

    #[test]
    fn wrong_recipient_fails_to_decrypt() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let recipient_secret = Scalar::random(&mut rng);
        let recipient_public = (G2Affine::generator() * recipient_secret).to_affine();
        let other_secret = Scalar::random(&mut rng);

        let share_value = Scalar::random(&mut rng);
        let sealed = encrypt_share(&recipient_public, &share_value, 1, &mut rng);
        assert!(decrypt_share(&other_secret, &sealed).is_err());
    }
}
