//! Content identifiers and the XOR overlay metric
//!
//! Feynman: every node gets a 160-bit "phone number". XOR of two numbers
//! tells you how far apart they live in the overlay: similar bit patterns
//! are neighbors, wildly different ones are strangers. Everything else in
//! the node is built on that one trick.

use std::fmt;
use std::str::FromStr;

use rand::{Rng, RngCore};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

use crate::error::Error;

pub mod wire;

/// Width of a content identifier in bits.
pub const CID_BITS: usize = 160;
/// Width of a content identifier in bytes.
pub const CID_LEN: usize = 20;

/// 160-bit content identifier, rendered as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cid([u8; CID_LEN]);

impl Cid {
    /// Self-assign an identity: SHA-1 over 20 bytes of OS randomness.
    pub fn generate() -> Self {
        let mut seed = [0u8; CID_LEN];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self(Sha1::digest(seed).into())
    }

    pub const fn from_bytes(bytes: [u8; CID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CID_LEN] {
        &self.0
    }

    /// XOR distance to another identifier.
    pub fn distance(&self, other: &Cid) -> Distance {
        let mut out = [0u8; CID_LEN];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self)
    }
}

impl FromStr for Cid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != CID_LEN * 2 {
            return Err(Error::InvalidCid(format!(
                "expected {} hex characters, got {}",
                CID_LEN * 2,
                s.len()
            )));
        }
        let raw = hex::decode(s).map_err(|e| Error::InvalidCid(e.to_string()))?;
        let mut id = [0u8; CID_LEN];
        id.copy_from_slice(&raw);
        Ok(Self(id))
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CidVisitor;

        impl de::Visitor<'_> for CidVisitor {
            type Value = Cid;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 40-character hex content identifier")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Cid, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(CidVisitor)
    }
}

/// XOR distance metric, ordered as a 160-bit unsigned integer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance([u8; CID_LEN]);

impl Distance {
    /// Count leading zero bits.
    pub fn leading_zeros(&self) -> usize {
        for (i, &byte) in self.0.iter().enumerate() {
            if byte != 0 {
                return i * 8 + byte.leading_zeros() as usize;
            }
        }
        CID_BITS
    }

    /// Position of the highest set bit plus one; zero for equal identifiers.
    pub fn bit_length(&self) -> usize {
        CID_BITS - self.leading_zeros()
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({})", hex::encode(self.0))
    }
}

/// Which bucket `other` belongs to relative to `local`: the index of the
/// highest differing bit. `None` when the identifiers are equal.
pub fn bucket_index(local: &Cid, other: &Cid) -> Option<usize> {
    local.distance(other).bit_length().checked_sub(1)
}

/// Draw a random identifier guaranteed to land in bucket `index` of `local`:
/// a delta uniform in [2^index, 2^(index+1) - 1], XORed onto the local CID.
/// Used to probe sparsely populated regions of the identifier space.
pub fn random_cid_in_bucket(local: &Cid, index: usize) -> Cid {
    debug_assert!(index < CID_BITS);
    let mut delta = [0u8; CID_LEN];
    rand::thread_rng().fill(&mut delta[..]);

    let byte = CID_LEN - 1 - index / 8;
    let bit = index % 8;
    for b in delta.iter_mut().take(byte) {
        *b = 0;
    }
    delta[byte] &= (1u8 << bit).wrapping_sub(1);
    delta[byte] |= 1 << bit;

    let mut out = [0u8; CID_LEN];
    for (i, b) in out.iter_mut().enumerate() {
        *b = local.0[i] ^ delta[i];
    }
    Cid(out)
}

/// A reachable peer: identifier plus transport address. Equality is by CID.
#[derive(Debug, Clone)]
pub struct Contact {
    pub cid: Cid,
    pub addr: String,
}

impl Contact {
    pub fn new(cid: Cid, addr: impl Into<String>) -> Self {
        Self {
            cid,
            addr: addr.into(),
        }
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.cid == other.cid
    }
}

impl Eq for Contact {}

impl std::hash::Hash for Contact {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.cid.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cid_from_hex(s: &str) -> Cid {
        s.parse().expect("valid test cid")
    }

    #[test]
    fn generated_cid_renders_as_40_hex_chars() {
        let cid = Cid::generate();
        let hex = cid.to_string();
        assert_eq!(hex.len(), 40);
        assert!(hex
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(hex.parse::<Cid>().expect("round trip"), cid);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!("abcd".parse::<Cid>().is_err());
        assert!("zz".repeat(20).parse::<Cid>().is_err());
    }

    #[test]
    fn bucket_index_extremes() {
        let local = Cid::from_bytes([0u8; CID_LEN]);
        let mut low = [0u8; CID_LEN];
        low[CID_LEN - 1] = 0x01;
        let mut high = [0u8; CID_LEN];
        high[0] = 0x80;

        assert_eq!(bucket_index(&local, &Cid::from_bytes(low)), Some(0));
        assert_eq!(bucket_index(&local, &Cid::from_bytes(high)), Some(159));
        assert_eq!(bucket_index(&local, &local), None);
    }

    #[test]
    fn distance_orders_as_big_endian_integer() {
        let zero = Cid::from_bytes([0u8; CID_LEN]);
        let one = cid_from_hex("0000000000000000000000000000000000000001");
        let two = cid_from_hex("0000000000000000000000000000000000000002");
        assert!(zero.distance(&one) < zero.distance(&two));
        assert_eq!(zero.distance(&one).bit_length(), 1);
        assert_eq!(zero.distance(&two).bit_length(), 2);
    }

    #[test]
    fn random_target_in_low_bucket_keeps_high_bits() {
        // For local = 0, bucket 5 targets must have bit 5 set and bits 6..160 clear.
        let local = Cid::from_bytes([0u8; CID_LEN]);
        for _ in 0..64 {
            let target = random_cid_in_bucket(&local, 5);
            let bytes = target.as_bytes();
            assert!(bytes[..CID_LEN - 1].iter().all(|&b| b == 0));
            assert_eq!(bytes[CID_LEN - 1] & 0x20, 0x20);
            assert_eq!(bytes[CID_LEN - 1] & 0xc0, 0);
            assert_eq!(bucket_index(&local, &target), Some(5));
        }
    }

    #[test]
    fn random_target_lands_in_every_bucket() {
        let local = Cid::generate();
        for index in 0..CID_BITS {
            let target = random_cid_in_bucket(&local, index);
            assert_eq!(bucket_index(&local, &target), Some(index), "bucket {index}");
        }
    }

    proptest! {
        #[test]
        fn bucket_index_is_symmetric(a in any::<[u8; 20]>(), b in any::<[u8; 20]>()) {
            let (a, b) = (Cid::from_bytes(a), Cid::from_bytes(b));
            prop_assert_eq!(bucket_index(&a, &b), bucket_index(&b, &a));
        }

        #[test]
        fn random_target_respects_its_bucket(seed in any::<[u8; 20]>(), index in 0usize..160) {
            let local = Cid::from_bytes(seed);
            let target = random_cid_in_bucket(&local, index);
            prop_assert_eq!(bucket_index(&local, &target), Some(index));
        }
    }
}
