//! pedersen hash over baby jubjub
//!
//! the circom flavour: message bits are read lsb-first per byte and cut into
//! 4-bit windows (3 magnitude bits, 1 sign bit), 50 windows per segment. each
//! segment gets its own generator derived from a blake256 digest. the hash is
//! the x coordinate of the accumulated point.
//!
//! curve: a*x^2 + y^2 = 1 + d*x^2*y^2 over the bn254 scalar field with
//! a = 168700, d = 168696.

use alloy_primitives::{uint, U256};
use ark_bn254::Fr;
use ark_ff::{Field, One, PrimeField, Zero};
use blake_hash::{Blake256, Digest};
use num_bigint::{BigInt, BigUint, Sign};

use crate::error::{CoreError, Result};
use crate::field::{from_fr, FIELD_SIZE};

const CURVE_A: u64 = 168700;
const CURVE_D: u64 = 168696;

const WINDOW_SIZE: usize = 4;
const WINDOWS_PER_SEGMENT: usize = 50;
const BITS_PER_SEGMENT: usize = WINDOW_SIZE * WINDOWS_PER_SEGMENT;

const GENERATOR_PREFIX: &str = "PedersenGenerator";
const MAX_GENERATOR_TRIES: u32 = 256;

/// order of the prime subgroup
pub const SUB_ORDER: U256 =
    uint!(2736030358979909402780800718157159386076813972158567259200215660948447373041_U256);

fn sub_order() -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, &SUB_ORDER.to_be_bytes::<32>())
}

/// affine point on baby jubjub
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdwardsPoint {
    pub x: Fr,
    pub y: Fr,
}

impl EdwardsPoint {
    pub fn identity() -> Self {
        Self {
            x: Fr::zero(),
            y: Fr::one(),
        }
    }

    pub fn is_on_curve(&self) -> bool {
        let x2 = self.x.square();
        let y2 = self.y.square();
        Fr::from(CURVE_A) * x2 + y2 == Fr::one() + Fr::from(CURVE_D) * x2 * y2
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        let a = Fr::from(CURVE_A);
        let d = Fr::from(CURVE_D);

        let beta = self.x * other.y;
        let gamma = self.y * other.x;
        let delta = (self.y - a * self.x) * (other.x + other.y);
        let dtau = d * beta * gamma;

        let x_den = (Fr::one() + dtau)
            .inverse()
            .ok_or_else(|| CoreError::Pedersen("degenerate point addition".into()))?;
        let y_den = (Fr::one() - dtau)
            .inverse()
            .ok_or_else(|| CoreError::Pedersen("degenerate point addition".into()))?;

        Ok(Self {
            x: (beta + gamma) * x_den,
            y: (delta + a * beta - gamma) * y_den,
        })
    }

    /// double-and-add, lsb first
    pub fn mul(&self, scalar: &BigUint) -> Result<Self> {
        let mut acc = Self::identity();
        let mut base = *self;
        for i in 0..scalar.bits() {
            if scalar.bit(i) {
                acc = acc.add(&base)?;
            }
            base = base.add(&base)?;
        }
        Ok(acc)
    }

    pub fn in_subgroup(&self) -> Result<bool> {
        let order = BigUint::from_bytes_be(&SUB_ORDER.to_be_bytes::<32>());
        Ok(self.mul(&order)? == Self::identity())
    }

    /// inverse of circom packPoint: little-endian y, sign of x in the top bit
    pub fn unpack(packed: &[u8; 32]) -> Option<Self> {
        let mut bytes = *packed;
        let negative = bytes[31] & 0x80 != 0;
        bytes[31] &= 0x7f;

        let y_int = U256::from_le_bytes(bytes);
        if y_int >= FIELD_SIZE {
            return None;
        }
        let y = Fr::from_le_bytes_mod_order(&bytes);
        let y2 = y.square();
        let num = Fr::one() - y2;
        let den = Fr::from(CURVE_A) - Fr::from(CURVE_D) * y2;
        let mut x = (num * den.inverse()?).sqrt()?;

        // circom picks the root in the lower half of the field
        if x.into_bigint() > Fr::MODULUS_MINUS_ONE_DIV_TWO {
            x = -x;
        }
        if negative {
            x = -x;
        }
        Some(Self { x, y })
    }
}

/// generator for segment `index`
pub fn base_point(index: usize) -> Result<EdwardsPoint> {
    for attempt in 0..MAX_GENERATOR_TRIES {
        let seed = format!("{}_{:0>32}_{:0>32}", GENERATOR_PREFIX, index, attempt);
        let digest = Blake256::digest(seed.as_bytes());
        let mut packed = [0u8; 32];
        packed.copy_from_slice(&digest);
        // keep y below 2^254
        packed[31] &= 0xbf;

        if let Some(point) = EdwardsPoint::unpack(&packed) {
            return point.mul(&BigUint::from(8u8));
        }
    }
    Err(CoreError::Pedersen(format!(
        "no generator found for segment {}",
        index
    )))
}

fn message_bits(msg: &[u8]) -> Vec<bool> {
    msg.iter()
        .flat_map(|byte| (0..8).map(move |j| (byte >> j) & 1 == 1))
        .collect()
}

fn segment_scalar(bits: &[bool], segment: usize, windows: usize) -> BigInt {
    let mut scalar = BigInt::from(0u8);
    let mut exp = BigInt::from(1u8);

    for w in 0..windows {
        let mut o = segment * BITS_PER_SEGMENT + w * WINDOW_SIZE;
        let mut acc = BigInt::from(1u8);
        let mut b = 0;
        while b < WINDOW_SIZE - 1 && o < bits.len() {
            if bits[o] {
                acc += BigInt::from(1u8) << b;
            }
            o += 1;
            b += 1;
        }
        if o < bits.len() && bits[o] {
            acc = -acc;
        }
        scalar += &acc * &exp;
        exp = exp << (WINDOW_SIZE + 1);
    }

    if scalar.sign() == Sign::Minus {
        scalar += sub_order();
    }
    scalar
}

pub fn pedersen_hash(msg: &[u8]) -> Result<U256> {
    if msg.is_empty() {
        return Err(CoreError::Pedersen("empty message".into()));
    }
    let bits = message_bits(msg);
    let segments = (bits.len() - 1) / BITS_PER_SEGMENT + 1;

    let mut acc = EdwardsPoint::identity();
    for s in 0..segments {
        let windows = if s == segments - 1 {
            (bits.len() - (segments - 1) * BITS_PER_SEGMENT - 1) / WINDOW_SIZE + 1
        } else {
            WINDOWS_PER_SEGMENT
        };
        let scalar = segment_scalar(&bits, s, windows)
            .to_biguint()
            .ok_or_else(|| CoreError::Pedersen("negative segment scalar".into()))?;
        acc = acc.add(&base_point(s)?.mul(&scalar)?)?;
    }
    Ok(from_fr(acc.x))
}
