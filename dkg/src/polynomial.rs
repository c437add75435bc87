//! Shamir/Feldman polynomial helpers for the DKG engine. Small and
//! self-contained, mirroring the shape of `crypto::vault`'s commitment
//! math but scoped to dealing rather than signing.

use blstrs::{G2Affine, G2Projective, Scalar};
use ff::Field;
use group::{Curve, Group};
use rand::RngCore;

use crate::error::{Error, Result};

pub fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar> {
    let repr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Encoding("scalar must be 32 bytes"))?;
    Option::from(Scalar::from_bytes_le(&repr)).ok_or(Error::Encoding("invalid scalar encoding"))
}

pub fn g2_from_bytes(bytes: &[u8]) -> Result<G2Affine> {
    let repr: [u8; 96] = bytes
        .try_into()
        .map_err(|_| Error::Encoding("g2 point must be 96 bytes"))?;
    Option::from(G2Affine::from_compressed(&repr)).ok_or(Error::Encoding("invalid g2 point encoding"))
}

/// A random polynomial of degree `t - 1` with a caller-chosen constant
/// term (the secret being shared). Fresh DKG draws a fully random constant
/// term; resharing fixes it to a dealer's weighted old share (§4.6
/// "Resharing").
pub fn sample_polynomial(t: usize, constant_term: Scalar, rng: &mut impl RngCore) -> Vec<Scalar> {
    let mut coeffs = Vec::with_capacity(t);
    coeffs.push(constant_term);
    for _ in 1..t {
        coeffs.push(Scalar::random(&mut *rng));
    }
    coeffs
}

pub fn eval_polynomial(coeffs: &[Scalar], x: Scalar) -> Scalar {
    let mut acc = Scalar::ZERO;
    for c in coeffs.iter().rev() {
        acc = acc * x + c;
    }
    acc
}

pub fn commit_polynomial(coeffs: &[Scalar]) -> Vec<G2Affine> {
    coeffs.iter().map(|c| (G2Affine::generator() * c).to_affine()).collect()
}

/// Evaluates a commitment polynomial (G2 points, lowest degree first) at
/// `x` via Horner's method; `x = 0` recovers the shared constant term's
/// public commitment.
pub fn eval_commitment(commitments: &[G2Affine], x: Scalar) -> G2Projective {
    let mut acc = G2Projective::identity();
    for c in commitments.iter().rev() {
        acc = acc * x + G2Projective::from(*c);
    }
    acc
}

/// `lambda_i(0)` for the participant set `indices` (1-based x-coordinates
/// are `index + 1`), weighting `indices[at]`'s contribution so that
/// `sum_i lambda_i(0) * f_i(0) == f(0)` for any polynomial `f` the set
/// jointly interpolates — the identity resharing leans on to preserve the
/// group public key across epochs.
pub fn lagrange_at_zero(indices: &[u32], at: usize) -> Scalar {
    let xi = Scalar::from((indices[at] + 1) as u64);
    let mut num = Scalar::ONE;
    let mut den = Scalar::ONE;
    for (j, &idx) in indices.iter().enumerate() {
        if j == at {
            continue;
        }
        let xj = Scalar::from((idx + 1) as u64);
        num *= xj;
        den *= xj - xi;
    }
    num * den.invert().expect("participant indices are pairwise distinct")
}
