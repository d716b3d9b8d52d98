//! Encoding and decoding of BN254 scalar-field elements and Groth16 curve points.
//!
//! Pure, no I/O. Every malformed input maps to exactly one named error.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FIELD_SIZE: usize = 32;
pub const G1_SIZE: usize = 64;
pub const G2_SIZE: usize = 128;

/// BN254 scalar-field modulus r.
const MODULUS: U256 = U256([
    0x43e1_f593_f000_0001,
    0x2833_e848_79b9_7091,
    0xb850_45b6_8181_585d,
    0x3064_4e72_e131_a029,
]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("hex string has odd length")]
    OddLength,
    #[error("invalid hex character in input")]
    InvalidHexCharacter,
    #[error("hex string decodes to {len} bytes, expected at most {max}")]
    TooLong { len: usize, max: usize },
    #[error("field value is out of range for the scalar field")]
    FieldRange,
    #[error("encoded point is the point at infinity")]
    PointAtInfinity,
}

/// A validated 32-byte big-endian scalar-field element, strictly less than the modulus.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Field([u8; FIELD_SIZE]);

impl Field {
    pub fn as_bytes(&self) -> &[u8; FIELD_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Serialize for Field {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        encode_field(&hex).map_err(serde::de::Error::custom)
    }
}

/// A Groth16 G1 point: `be(X) || be(Y)`, 64 bytes, not the point at infinity.
#[derive(Clone, PartialEq, Eq)]
pub struct G1([u8; G1_SIZE]);

impl G1 {
    pub fn as_bytes(&self) -> &[u8; G1_SIZE] {
        &self.0
    }
}

/// A Groth16 G2 point: `be(X_c1) || be(X_c0) || be(Y_c1) || be(Y_c0)`, 128 bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct G2([u8; G2_SIZE]);

impl G2 {
    pub fn as_bytes(&self) -> &[u8; G2_SIZE] {
        &self.0
    }
}

#[derive(Clone)]
pub struct Proof {
    pub a: G1,
    pub b: G2,
    pub c: G1,
}

/// Strips an optional `0x` prefix, validates hex, and returns normalized lowercase hex
/// with no prefix (the canonical wire form).
fn normalize_hex(input: &str) -> Result<String, FieldError> {
    let stripped = input.strip_prefix("0x").unwrap_or(input);
    if stripped.len() % 2 != 0 {
        return Err(FieldError::OddLength);
    }
    if !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FieldError::InvalidHexCharacter);
    }
    Ok(stripped.to_ascii_lowercase())
}

fn decode_padded(input: &str, width_bytes: usize) -> Result<Vec<u8>, FieldError> {
    let normalized = normalize_hex(input)?;
    let max_chars = width_bytes * 2;
    if normalized.len() > max_chars {
        return Err(FieldError::TooLong {
            len: normalized.len() / 2,
            max: width_bytes,
        });
    }
    let padded = format!("{:0>width$}", normalized, width = max_chars);
    hex::decode(&padded).map_err(|_| FieldError::InvalidHexCharacter)
}

/// Encodes a hex string as a canonical 32-byte big-endian scalar-field element.
/// Rejects values greater than or equal to the BN254 scalar-field modulus.
pub fn encode_field(input: &str) -> Result<Field, FieldError> {
    let bytes = decode_padded(input, FIELD_SIZE)?;
    let mut buf = [0u8; FIELD_SIZE];
    buf.copy_from_slice(&bytes);
    if U256::from_big_endian(&buf) >= MODULUS {
        return Err(FieldError::FieldRange);
    }
    Ok(Field(buf))
}

/// Inverse of `encode_field`: returns normalized (zero-padded, lowercase, unprefixed) hex.
pub fn decode_field(field: &Field) -> String {
    field.to_hex()
}

/// Encodes a 128-hex-character string as a 64-byte G1 point, rejecting the point at
/// infinity (all-zero encoding).
pub fn encode_g1(input: &str) -> Result<G1, FieldError> {
    let bytes = decode_padded(input, G1_SIZE)?;
    if bytes.iter().all(|b| *b == 0) {
        return Err(FieldError::PointAtInfinity);
    }
    let mut buf = [0u8; G1_SIZE];
    buf.copy_from_slice(&bytes);
    Ok(G1(buf))
}

/// Encodes a 256-hex-character string as a 128-byte G2 point, rejecting the point at
/// infinity (all-zero encoding).
pub fn encode_g2(input: &str) -> Result<G2, FieldError> {
    let bytes = decode_padded(input, G2_SIZE)?;
    if bytes.iter().all(|b| *b == 0) {
        return Err(FieldError::PointAtInfinity);
    }
    let mut buf = [0u8; G2_SIZE];
    buf.copy_from_slice(&bytes);
    Ok(G2(buf))
}

/// Raw hex-string shape of a proof as received from clients.
pub struct ProofHex<'a> {
    pub a: &'a str,
    pub b: &'a str,
    pub c: &'a str,
}

/// Encodes the three proof components. The components are individually validated as
/// non-infinity G1/G1/G2 points; `a`/`c` zero-check is per-point, matching §4.1's
/// "jointly non-zero" requirement via the per-component infinity rejection.
pub fn encode_proof(raw: ProofHex<'_>) -> Result<Proof, FieldError> {
    let a = encode_g1(raw.a)?;
    let b = encode_g2(raw.b)?;
    let c = encode_g1(raw.c)?;
    Ok(Proof { a, b, c })
}

/// Inverse of `encode_proof`, returning the three components as canonical hex.
pub fn decode_proof(proof: &Proof) -> (String, String, String) {
    (
        hex::encode(proof.a.as_bytes()),
        hex::encode(proof.b.as_bytes()),
        hex::encode(proof.c.as_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_of(value: U256) -> String {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        hex::encode(bytes)
    }

    #[test]
    fn encode_field_zero_is_accepted() {
        let field = encode_field("0").unwrap();
        assert_eq!(field.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn encode_field_rejects_modulus() {
        let err = encode_field(&hex_of(MODULUS)).unwrap_err();
        assert_eq!(err, FieldError::FieldRange);
    }

    #[test]
    fn encode_field_accepts_modulus_minus_one() {
        let r_minus_one = MODULUS - U256::one();
        assert!(encode_field(&hex_of(r_minus_one)).is_ok());
    }

    #[test]
    fn encode_field_round_trips_through_decode() {
        let field = encode_field("0xAB").unwrap();
        let decoded = decode_field(&field);
        assert_eq!(decoded, format!("{:0>64}", "ab"));
    }

    #[test]
    fn encode_g1_rejects_all_zero() {
        let zeros = "0".repeat(G1_SIZE * 2);
        let err = encode_g1(&zeros).unwrap_err();
        assert_eq!(err, FieldError::PointAtInfinity);
    }

    #[test]
    fn encode_proof_round_trips() {
        let a = "11".repeat(G1_SIZE);
        let b = "22".repeat(G2_SIZE);
        let c = "33".repeat(G1_SIZE);
        let proof = encode_proof(ProofHex { a: &a, b: &b, c: &c }).unwrap();
        let (da, db, dc) = decode_proof(&proof);
        assert_eq!(da, a);
        assert_eq!(db, b);
        assert_eq!(dc, c);
    }

    #[test]
    fn odd_length_hex_is_rejected() {
        assert_eq!(encode_field("abc").unwrap_err(), FieldError::OddLength);
    }

    #[test]
    fn non_hex_characters_are_rejected() {
        assert_eq!(
            encode_field("zz").unwrap_err(),
            FieldError::InvalidHexCharacter
        );
    }
}
