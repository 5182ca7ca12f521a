// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The node-identifier algebra: XOR distance and bucket indexing over a
//! fixed-width, opaque bit string.
//!
//! `NodeId` is generic over its byte width via a const generic rather than a
//! runtime-sized buffer, so the common widths (160 and 256 bit) monomorphize
//! to plain fixed-size arrays with no heap allocation and no dynamic dispatch.

use std::fmt;

use crate::error::{Error, Result};

/// A node or key identifier: an opaque, fixed-width bit string of `N` bytes.
///
/// Identifiers are not interpreted beyond their bits: this crate performs no
/// hashing and no cryptographic verification of identifiers (see Non-goals).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId<const N: usize>([u8; N]);

/// 160-bit identifiers, the classic Kademlia width (e.g. SHA-1-sized keys).
pub type Kad160 = NodeId<20>;

/// 256-bit identifiers, for deployments keying off a SHA-256-sized space.
pub type Kad256 = NodeId<32>;

impl<const N: usize> NodeId<N> {
    /// Number of bits in this identifier space. `RoutingTable` allocates
    /// exactly this many buckets.
    pub const BITS: usize = N * 8;

    /// Wrap a fixed-size byte array as a `NodeId`.
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Identifier consisting of all-zero bits.
    pub const fn zero() -> Self {
        Self([0u8; N])
    }

    /// Borrow the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// The XOR metric: `d(a, b) = a ⊕ b`.
    pub fn distance(&self, other: &Self) -> Distance<N> {
        let mut out = [0u8; N];
        for i in 0..N {
            out[i] = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }

    /// The bucket index `self`'s routing table would place `other` in.
    ///
    /// `index = B - leading_zeros(self ⊕ other) - 1`, so bucket 0 holds the
    /// closest peers (distance in `[2^0, 2^1)`-ish shell) and bucket `B-1`
    /// the farthest. Fails with [`Error::SelfReference`] when `other == self`,
    /// since the distance is then zero and has no well-defined leading-zero
    /// count short of `B` (there is no such bucket).
    pub fn bucket_index(&self, other: &Self) -> Result<usize> {
        if self == other {
            return Err(Error::SelfReference);
        }
        let z = self.distance(other).leading_zeros() as usize;
        Ok(Self::BITS - z - 1)
    }

    /// Generate a random id whose `bucket_index(self, _)` equals `index`, for
    /// bucket-refresh lookups. `index` must be `< Self::BITS`.
    pub fn random_in_bucket(&self, index: usize, rng: &mut impl rand::Rng) -> Self {
        debug_assert!(index < Self::BITS);
        let mut out = self.0;
        // `bucket_index` is `BITS - leading_zeros - 1`, so landing in bucket
        // `index` means the first differing bit (MSB-first) must sit at
        // MSB-position `p = BITS - 1 - index`, giving `leading_zeros == p`.
        let p = Self::BITS - 1 - index;
        let byte = p / 8;
        let bit_in_byte = 7 - (p % 8);

        // Bytes more significant than `byte` already match `self` (out == self.0).
        // Flip the bit that fixes the leading-zero count to exactly `p`, then
        // randomize every bit less significant than it.
        out[byte] ^= 1 << bit_in_byte;
        if bit_in_byte > 0 {
            let mask: u8 = (1 << bit_in_byte) - 1;
            let random_bits: u8 = rng.gen::<u8>() & mask;
            out[byte] = (out[byte] & !mask) | random_bits;
        }
        for b in out.iter_mut().skip(byte + 1) {
            *b = rng.gen();
        }
        Self(out)
    }
}

impl<const N: usize> fmt::Debug for NodeId<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

impl<const N: usize> fmt::Display for NodeId<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// The XOR distance between two [`NodeId`]s, ordered the same as the unsigned
/// big-endian integer it represents (lexicographic byte order suffices,
/// since `NodeId` stores its most-significant byte first).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance<const N: usize>([u8; N]);

impl<const N: usize> Distance<N> {
    /// Count of leading zero bits, `0..=N*8`.
    pub fn leading_zeros(&self) -> u32 {
        let mut zeros = 0u32;
        for byte in &self.0 {
            if *byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros();
                break;
            }
        }
        zeros
    }

    /// True when the distance is zero, i.e. the two identifiers are equal.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl<const N: usize> fmt::Debug for Distance<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    type Id = NodeId<4>;

    fn id(bytes: [u8; 4]) -> Id {
        NodeId::new(bytes)
    }

    #[test]
    fn bucket_index_of_self_errors() {
        let s = id([1, 2, 3, 4]);
        assert_eq!(s.bucket_index(&s), Err(Error::SelfReference));
    }

    #[test]
    fn bucket_index_matches_leading_zero_count() {
        let s = id([0, 0, 0, 0]);
        let o = id([0, 0, 0, 1]);
        // distance = 0x00000001, 31 msb zero bits in a 32-bit space -> index = 32 - 31 - 1 = 0
        assert_eq!(s.bucket_index(&o).unwrap(), 0);

        let o2 = id([0x80, 0, 0, 0]);
        // distance = 0x80000000, 0 leading zeros -> index = 32 - 0 - 1 = 31
        assert_eq!(s.bucket_index(&o2).unwrap(), 31);
    }

    #[test]
    fn random_in_bucket_round_trips_index() {
        let s = id([0x12, 0x34, 0x56, 0x78]);
        let mut rng = rand::thread_rng();
        for index in 0..Id::BITS {
            let candidate = s.random_in_bucket(index, &mut rng);
            assert_eq!(s.bucket_index(&candidate).unwrap(), index);
        }
    }

    quickcheck! {
        fn distance_is_identity(a: u32) -> bool {
            let a = id(a.to_be_bytes());
            a.distance(&a).is_zero()
        }

        fn distance_is_symmetric(a: u32, b: u32) -> bool {
            let a = id(a.to_be_bytes());
            let b = id(b.to_be_bytes());
            a.distance(&b) == b.distance(&a)
        }

        fn distance_satisfies_triangle_inequality(a: u32, b: u32, c: u32) -> bool {
            let a = id(a.to_be_bytes());
            let b = id(b.to_be_bytes());
            let c = id(c.to_be_bytes());
            // XOR distance as an unsigned integer satisfies the triangle
            // inequality: d(a,c) <= d(a,b) + d(b,c). Compare as u32 via the
            // big-endian byte representation.
            let d = |x: &Distance<4>| u32::from_be_bytes(x.0);
            d(&a.distance(&c)) <= d(&a.distance(&b)).saturating_add(d(&b.distance(&c)))
        }
    }
}
