#![no_std]

/// Maximum encoded length of a name TLV-VALUE, in octets
pub const MAX_NAME_LENGTH: usize = 2048;

/// Number of leading name prefixes whose hash is computed when a name is built
pub const NAME_CACHED_PREFIXES: usize = 8;

/// Implicit SHA-256 digest length
pub const DIGEST_LENGTH: usize = 32;

/// Face identifier. Zero is never a valid face.
pub type FaceId = u16;

/// Invalid face id
pub const FACE_INVALID: FaceId = 0;

/// Maximum number of forwarding cores addressable by the token core-id field
pub const MAX_FWD_CORES: usize = 255;

/// Bits of a forwarding token that carry the PCC entry token
pub const PCC_TOKEN_BITS: u32 = 48;

/// Mask of the PCC entry token inside a forwarding token
pub const PCC_TOKEN_MASK: u64 = (1 << PCC_TOKEN_BITS) - 1;

/// Shift of the forwarding core id inside a forwarding token
pub const FW_TOKEN_CORE_SHIFT: u32 = 56;

/// Build the 64-bit token carried in the PIT token field of upstream Interests.
#[inline]
pub const fn fw_token_new(core: u8, pcc_token: u64) -> u64 {
    ((core as u64) << FW_TOKEN_CORE_SHIFT) | (pcc_token & PCC_TOKEN_MASK)
}

/// Forwarding core id encoded in a token
#[inline]
pub const fn fw_token_core(token: u64) -> u8 {
    (token >> FW_TOKEN_CORE_SHIFT) as u8
}

/// PCC entry token encoded in a token
#[inline]
pub const fn fw_token_pcc(token: u64) -> u64 {
    token & PCC_TOKEN_MASK
}

/// Default PCCT slab capacity per forwarding core
pub const DEFAULT_PCCT_CAPACITY: usize = 131_071;

/// Default number of extension blocks per PCCT shard
pub const DEFAULT_PCCT_EXT_CAPACITY: usize = 16_383;

/// Name bytes stored inline in a PCC key before extension blocks are needed
pub const PCC_KEY_INLINE_LEN: usize = 240;

/// Name bytes stored per PCC key extension block
pub const PCC_KEY_EXT_LEN: usize = 680;

/// Downstream records stored inline in a PIT entry
pub const PIT_DN_INLINE: usize = 6;

/// Upstream records stored inline in a PIT entry
pub const PIT_UP_INLINE: usize = 2;

/// Downstream records per PIT extension block
pub const PIT_DN_EXT: usize = 16;

/// Upstream records per PIT extension block
pub const PIT_UP_EXT: usize = 8;

/// Maximum extension blocks chained to one PIT entry
pub const PIT_MAX_EXT_HOPS: usize = 8;

/// Nonces remembered as rejected by one upstream
pub const PIT_UP_REJECTED_NONCES: usize = 6;

/// Maximum Interest lifetime accepted into the PIT, in milliseconds
pub const PIT_MAX_LIFETIME_MS: u64 = 120_000;

/// Interest lifetime when the Interest carries none, in milliseconds
pub const DEFAULT_INTEREST_LIFETIME_MS: u64 = 4_000;

/// Retransmission suppression bounds, in milliseconds
pub const PIT_SUPPRESS_MIN_MS: u64 = 10;
pub const PIT_SUPPRESS_MAX_MS: u64 = 100;
pub const PIT_SUPPRESS_MULTIPLIER: f64 = 2.0;

/// PIT strategy scratch area, in octets
pub const PIT_SG_SCRATCH: usize = 64;

/// FIB strategy scratch area, in octets
pub const FIB_SG_SCRATCH: usize = 96;

/// Default CS capacity (ARC `c`)
pub const DEFAULT_CS_CAPACITY: usize = 32_768;

/// Default capacity of the indirect entry LRU
pub const DEFAULT_CS_INDIRECT_CAPACITY: usize = 32_768;

/// Indirect entries allowed per direct entry
pub const CS_MAX_INDIRECTS: usize = 4;

/// Deleted CS entries are released once this many accumulate
pub const CS_EVICT_BULK: usize = 64;

/// Disk slot 0 is reserved as invalid
pub const DISK_SLOT_INVALID: u64 = 0;

/// UDCN packet types
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Interest packet requesting content
    Interest = 0x01,
    /// Data packet containing content
    Data = 0x02,
    /// Nack packet indicating failure
    Nack = 0x03,
}

/// Nack reason. Numerically smaller values are less severe.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NackReason {
    Congestion = 50,
    Duplicate = 100,
    NoRoute = 150,
    Unspecified = 255,
}

impl NackReason {
    pub const ALL: [NackReason; 4] = [
        NackReason::Congestion,
        NackReason::Duplicate,
        NackReason::NoRoute,
        NackReason::Unspecified,
    ];

    /// Least severe of two reasons
    #[inline]
    pub fn least_severe(self, other: NackReason) -> NackReason {
        if self <= other {
            self
        } else {
            other
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            NackReason::Congestion => "Congestion",
            NackReason::Duplicate => "Duplicate",
            NackReason::NoRoute => "NoRoute",
            NackReason::Unspecified => "Unspecified",
        }
    }

    /// Decode a wire reason; unknown values map to `Unspecified`.
    pub const fn from_u8(v: u8) -> NackReason {
        match v {
            50 => NackReason::Congestion,
            100 => NackReason::Duplicate,
            150 => NackReason::NoRoute,
            _ => NackReason::Unspecified,
        }
    }

    /// Dense index, for per-reason counter arrays
    pub const fn index(self) -> usize {
        match self {
            NackReason::Congestion => 0,
            NackReason::Duplicate => 1,
            NackReason::NoRoute => 2,
            NackReason::Unspecified => 3,
        }
    }
}

impl core::fmt::Display for NackReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_layout() {
        let token = fw_token_new(7, 0x1234_5678_9abc);
        assert_eq!(fw_token_core(token), 7);
        assert_eq!(fw_token_pcc(token), 0x1234_5678_9abc);
        assert_eq!(token >> 48 & 0xFF, 0);
    }

    #[test]
    fn test_token_masks_oversized_pcc() {
        let token = fw_token_new(1, u64::MAX);
        assert_eq!(fw_token_core(token), 1);
        assert_eq!(fw_token_pcc(token), PCC_TOKEN_MASK);
    }

    #[test]
    fn test_nack_severity() {
        assert_eq!(NackReason::NoRoute.least_severe(NackReason::Congestion), NackReason::Congestion);
        assert_eq!(NackReason::Duplicate.least_severe(NackReason::Unspecified), NackReason::Duplicate);
        assert_eq!(NackReason::from_u8(42), NackReason::Unspecified);
        assert_eq!(NackReason::from_u8(NackReason::Duplicate as u8), NackReason::Duplicate);
    }
}
