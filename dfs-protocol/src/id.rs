// Copyright 2023 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! 160-bit identifiers and the XOR distance metric (spec C1).

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

/// Number of bytes in an [`Id`].
pub const ID_LEN: usize = 20;

/// A 160-bit opaque identifier: a string key, a chunk's content address,
/// or a node's random id, all live in the same namespace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id([u8; ID_LEN]);

impl Id {
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Id(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// SHA-1 of the UTF-8 encoding of `s`.
    pub fn from_str_key(s: &str) -> Self {
        digest(s.as_bytes())
    }

    /// The number of bits shared as a common prefix with `other`.
    pub fn shared_prefix_len(&self, other: &Id) -> u32 {
        for (i, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            if a != b {
                return (i as u32) * 8 + (a ^ b).leading_zeros();
            }
        }
        (ID_LEN as u32) * 8
    }

    /// XOR distance to `other`, as a big-endian 160-bit unsigned integer.
    pub fn distance(&self, other: &Id) -> Distance {
        let mut out = [0u8; ID_LEN];
        for (o, (a, b)) in out.iter_mut().zip(self.0.iter().zip(other.0.iter())) {
            *o = a ^ b;
        }
        Distance(out)
    }

    /// `true` iff every bit in `self` is at or below `bit`'s most significant
    /// differing position, i.e. `self` falls within `[lo, hi]` expressed as
    /// big-endian byte arrays.
    pub fn in_range(&self, lo: &Id, hi: &Id) -> bool {
        self.0 >= lo.0 && self.0 <= hi.0
    }

    /// The midpoint of `[lo, hi]`, computed as big-endian unsigned integers.
    pub fn midpoint(lo: &Id, hi: &Id) -> Id {
        let mut sum = [0u16; ID_LEN];
        let mut carry = 0u16;
        for i in (0..ID_LEN).rev() {
            let total = lo.0[i] as u16 + hi.0[i] as u16 + carry;
            sum[i] = total & 0xff;
            carry = total >> 8;
        }
        // divide (carry:sum) by 2, big-endian
        let mut out = [0u8; ID_LEN];
        let mut rem = carry;
        for i in 0..ID_LEN {
            let cur = (rem << 8) | sum[i];
            out[i] = (cur / 2) as u8;
            rem = cur % 2;
        }
        Id(out)
    }

    pub const ZERO: Id = Id([0u8; ID_LEN]);
    pub const MAX: Id = Id([0xffu8; ID_LEN]);

    /// `self + 1`, saturating at [`Id::MAX`]. Used to derive the lower
    /// bound of the upper half after a bucket split.
    pub fn next(&self) -> Id {
        let mut out = self.0;
        for byte in out.iter_mut().rev() {
            if *byte == 0xff {
                *byte = 0;
            } else {
                *byte += 1;
                return Id(out);
            }
        }
        Id::MAX
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", hex::encode(self.0))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// The XOR distance between two [`Id`]s, ordered as a big-endian unsigned
/// integer (byte-wise comparison is equivalent to integer comparison).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance([u8; ID_LEN]);

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({})", hex::encode(self.0))
    }
}

/// SHA-1 digest of arbitrary bytes, truncated to nothing (SHA-1 already
/// produces 20 bytes, i.e. exactly [`ID_LEN`]).
pub fn digest(bytes: &[u8]) -> Id {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut id = [0u8; ID_LEN];
    id.copy_from_slice(&out);
    Id(id)
}

/// Longest common bit-prefix shared by every id in `ids`. Used for
/// bucket-depth decisions (spec C1, `KBucket::depth`).
pub fn shared_prefix(ids: &[Id]) -> u32 {
    match ids.split_first() {
        None => 0,
        Some((first, rest)) => rest
            .iter()
            .map(|id| first.shared_prefix_len(id))
            .min()
            .unwrap_or(ID_LEN as u32 * 8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic_and_20_bytes() {
        let a = digest(b"hello");
        let b = digest(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.as_bytes().len(), ID_LEN);
    }

    #[test]
    fn distance_is_reflexive_and_symmetric() {
        let a = digest(b"a");
        let b = digest(b"b");
        assert_eq!(a.distance(&a).0, [0u8; ID_LEN]);
        assert_eq!(a.distance(&b).0, b.distance(&a).0);
    }

    fn add(a: &[u8; ID_LEN], b: &[u8; ID_LEN]) -> [u8; ID_LEN + 1] {
        let mut out = [0u8; ID_LEN + 1];
        let mut carry = 0u16;
        for i in (0..ID_LEN).rev() {
            let total = a[i] as u16 + b[i] as u16 + carry;
            out[i + 1] = (total & 0xff) as u8;
            carry = total >> 8;
        }
        out[0] = carry as u8;
        out
    }

    fn leq(a: &[u8; ID_LEN + 1], b: &[u8; ID_LEN + 1]) -> bool {
        a <= b
    }

    #[test]
    fn xor_metric_triangle_inequality() {
        for seed in ["x", "y", "z", "alpha", "beta", "gamma", "", "1234"] {
            let a = digest(seed.as_bytes());
            let b = digest(format!("{seed}-b").as_bytes());
            let c = digest(format!("{seed}-c").as_bytes());
            let d_ac = a.distance(&c).0;
            let d_ab = a.distance(&b).0;
            let d_bc = b.distance(&c).0;
            let mut rhs = [0u8; ID_LEN + 1];
            rhs[1..].copy_from_slice(&d_ac);
            let sum = add(&d_ab, &d_bc);
            assert!(leq(&rhs, &sum), "triangle inequality violated for {seed}");
        }
    }

    #[test]
    fn shared_prefix_counts_matching_bits() {
        let a = Id([0b1111_1111; ID_LEN]);
        let mut bytes = [0b1111_1111; ID_LEN];
        bytes[0] = 0b0111_1111;
        let b = Id(bytes);
        assert_eq!(a.shared_prefix_len(&b), 0);
        assert_eq!(shared_prefix(&[a, a]), ID_LEN as u32 * 8);
    }

    #[test]
    fn midpoint_of_full_range_is_strictly_between() {
        let mid = Id::midpoint(&Id::ZERO, &Id::MAX);
        assert!(mid > Id::ZERO);
        assert!(mid < Id::MAX);
    }
}
