//! 160-bit identifiers used for node ids, message ids, and hashed keys.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Number of bits in an [`Identifier`].
pub const BITS: usize = 160;

/// Number of bytes in an [`Identifier`].
pub const BYTES: usize = BITS / 8;

/// Sentinel returned by [`Identifier::bucket_index`] when compared against itself.
///
/// Never a valid index into a 160-bucket routing table; callers must not use it to
/// index a bucket array.
pub const SELF_BUCKET: usize = BITS;

/// A 160-bit identifier: a node id, a message id, or a hashed key.
///
/// Stored big-endian. Distances and bucket indices are computed over the full
/// fixed-width representation, so there is no separate bounds check at use time —
/// any value that exists as an `Identifier` is already in `[0, 2^160)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier([u8; BYTES]);

/// Error constructing an [`Identifier`] from untrusted bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier must be {BYTES} bytes, got {0}")]
    InvalidLength(usize),
}

impl Identifier {
    /// Wrap a caller-supplied 20-byte array directly. Infallible: the type itself is
    /// the proof the length is right.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; BYTES]) -> Self {
        Self(bytes)
    }

    /// Parse an identifier out of a byte slice of arbitrary length, as when decoding
    /// a wire frame or a hex-encoded CLI argument.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, IdentifierError> {
        let arr: [u8; BYTES] = bytes
            .try_into()
            .map_err(|_| IdentifierError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Borrow the big-endian byte representation.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; BYTES] {
        &self.0
    }

    /// Hash arbitrary bytes (a key, or 160 freshly drawn random bits) down to an
    /// identifier via SHA-1.
    ///
    /// # Examples
    ///
    /// ```
    /// use kademlia_node::identifier::Identifier;
    /// let a = Identifier::hash_key(b"hello");
    /// let b = Identifier::hash_key(b"hello");
    /// assert_eq!(a, b);
    /// ```
    #[must_use]
    pub fn hash_key(bytes: &[u8]) -> Self {
        let digest = Sha1::digest(bytes);
        Self(digest.into())
    }

    /// Draw 160 random bits and hash them, matching the reference node-id
    /// distribution: the extra hash step is part of the wire-visible contract, not
    /// an implementation detail to be optimized away.
    #[must_use]
    pub fn random() -> Self {
        let mut seed = [0u8; BYTES];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::hash_key(&seed)
    }

    /// Bitwise XOR distance to another identifier.
    #[must_use]
    pub fn distance(&self, other: &Self) -> Self {
        let mut out = [0u8; BYTES];
        for i in 0..BYTES {
            out[i] = self.0[i] ^ other.0[i];
        }
        Self(out)
    }

    /// Number of leading zero bits across the full 160-bit representation.
    /// `leading_zeros` of the zero identifier is [`BITS`].
    #[must_use]
    pub fn leading_zeros(&self) -> usize {
        let mut zeros = 0;
        for byte in self.0 {
            if byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros() as usize;
                break;
            }
        }
        zeros
    }

    /// `160 - bit_length(self XOR local_id)`, i.e. the routing-table bucket that
    /// `self` belongs in from `local_id`'s point of view. Reduces algebraically to
    /// `leading_zeros(self XOR local_id)` over the full 160-bit width: when `p ==
    /// local_id` the XOR is zero and `leading_zeros` naturally yields
    /// [`SELF_BUCKET`], so there is no special case to write.
    #[must_use]
    pub fn bucket_index(&self, local_id: &Self) -> usize {
        self.distance(local_id).leading_zeros()
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", hex::encode(self.0))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
