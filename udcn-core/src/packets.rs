use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use sha2::{Digest, Sha256};
use udcn_common::{FaceId, NackReason, PacketType, DEFAULT_INTEREST_LIFETIME_MS, DIGEST_LENGTH};

use crate::name::{tt as name_tt, Name, NameError};
use crate::tlv::{decode_nni, decode_tlv, encode_nni_tlv, encode_tlv, TlvError, TlvIter};

/// TLV Type constants for NDN packets
pub mod tlv_types {
    pub const INTEREST: u32 = 0x05;
    pub const DATA: u32 = 0x06;
    pub const NAME: u32 = 0x07;
    pub const NONCE: u32 = 0x0A;
    pub const INTEREST_LIFETIME: u32 = 0x0C;
    pub const MUST_BE_FRESH: u32 = 0x12;
    pub const META_INFO: u32 = 0x14;
    pub const CONTENT: u32 = 0x15;
    pub const SIGNATURE_INFO: u32 = 0x16;
    pub const SIGNATURE_VALUE: u32 = 0x17;
    pub const CONTENT_TYPE: u32 = 0x18;
    pub const FRESHNESS_PERIOD: u32 = 0x19;
    pub const SIGNATURE_TYPE: u32 = 0x1B;
    pub const FORWARDING_HINT: u32 = 0x1E;
    pub const CAN_BE_PREFIX: u32 = 0x21;
    pub const HOP_LIMIT: u32 = 0x22;
    pub const APPLICATION_PARAMETERS: u32 = 0x24;
}

use tlv_types as tt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error(transparent)]
    Tlv(#[from] TlvError),
    #[error(transparent)]
    Name(#[from] NameError),
}

/// Interest packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    pub name: Name,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
    pub fwhints: Vec<Name>,
    /// Index into `fwhints` of the hint used for forwarding, if any
    pub active_fh: Option<usize>,
    pub nonce: u32,
    pub lifetime: Duration,
    pub hop_limit: Option<u8>,
    pub app_params: Option<Bytes>,
}

impl Interest {
    /// Interest with a random nonce and the default lifetime
    pub fn new(name: Name) -> Self {
        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            fwhints: Vec::new(),
            active_fh: None,
            nonce: rand::thread_rng().gen(),
            lifetime: Duration::from_millis(DEFAULT_INTEREST_LIFETIME_MS),
            hop_limit: None,
            app_params: None,
        }
    }

    pub fn with_can_be_prefix(mut self, can_be_prefix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self
    }

    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = Some(hop_limit);
        self
    }

    pub fn with_fwhint(mut self, hint: Name) -> Self {
        self.fwhints.push(hint);
        self
    }

    /// Forwarding hint selected for forwarding
    pub fn active_fwhint(&self) -> Option<&Name> {
        self.active_fh.and_then(|i| self.fwhints.get(i))
    }

    /// Copy for transmission upstream with the given guiders
    pub fn modify_guiders(&self, nonce: u32, lifetime: Duration, hop_limit: Option<u8>) -> Interest {
        let mut copy = self.clone();
        copy.nonce = nonce;
        copy.lifetime = lifetime;
        copy.hop_limit = hop_limit;
        copy
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut inner = Vec::with_capacity(self.name.value().len() + 32);
        self.name.encode_to(&mut inner);
        if self.can_be_prefix {
            encode_tlv(&mut inner, tt::CAN_BE_PREFIX, &[]);
        }
        if self.must_be_fresh {
            encode_tlv(&mut inner, tt::MUST_BE_FRESH, &[]);
        }
        if !self.fwhints.is_empty() {
            let mut hints = Vec::new();
            for hint in &self.fwhints {
                hint.encode_to(&mut hints);
            }
            encode_tlv(&mut inner, tt::FORWARDING_HINT, &hints);
        }
        encode_tlv(&mut inner, tt::NONCE, &self.nonce.to_be_bytes());
        encode_nni_tlv(&mut inner, tt::INTEREST_LIFETIME, self.lifetime.as_millis() as u64);
        if let Some(hop_limit) = self.hop_limit {
            encode_tlv(&mut inner, tt::HOP_LIMIT, &[hop_limit]);
        }
        if let Some(params) = &self.app_params {
            encode_tlv(&mut inner, tt::APPLICATION_PARAMETERS, params);
        }

        let mut buf = Vec::with_capacity(inner.len() + 4);
        encode_tlv(&mut buf, tt::INTEREST, &inner);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<(Self, usize), PacketError> {
        let (type_, value, consumed) = decode_tlv(data)?;
        if type_ != tt::INTEREST {
            return Err(TlvError::InvalidType(type_).into());
        }

        let mut interest = Interest::new(Name::new());
        let mut has_name = false;
        for item in TlvIter::new(value) {
            let (t, v) = item?;
            match t {
                tt::NAME => {
                    interest.name = Name::from_value(Bytes::copy_from_slice(v))?;
                    has_name = true;
                }
                tt::CAN_BE_PREFIX => interest.can_be_prefix = true,
                tt::MUST_BE_FRESH => interest.must_be_fresh = true,
                tt::FORWARDING_HINT => {
                    let mut pos = 0;
                    while pos < v.len() {
                        let (hint, used) = Name::decode(&v[pos..])?;
                        interest.fwhints.push(hint);
                        pos += used;
                    }
                }
                tt::NONCE => {
                    let bytes: [u8; 4] = v.try_into().map_err(|_| TlvError::ValueLengthMismatch {
                        expected: 4,
                        actual: v.len(),
                    })?;
                    interest.nonce = u32::from_be_bytes(bytes);
                }
                tt::INTEREST_LIFETIME => interest.lifetime = Duration::from_millis(decode_nni(v)?),
                tt::HOP_LIMIT => {
                    interest.hop_limit = Some(*v.first().ok_or(TlvError::BufferTooShort)?);
                }
                tt::APPLICATION_PARAMETERS => interest.app_params = Some(Bytes::copy_from_slice(v)),
                _ => {}
            }
        }
        if !has_name {
            return Err(TlvError::Missing(tt::NAME).into());
        }
        Ok((interest, consumed))
    }
}

/// Outcome of matching a Data against an Interest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSatisfyResult {
    No,
    Yes,
    /// The Interest names an implicit digest that has not been computed yet
    NeedDigest,
}

/// Data packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub name: Name,
    pub freshness_period: Duration,
    pub content: Bytes,
    signature: Bytes,
    digest: Option<[u8; DIGEST_LENGTH]>,
}

impl Data {
    pub fn new(name: Name, content: impl Into<Bytes>) -> Self {
        Self {
            name,
            freshness_period: Duration::ZERO,
            content: content.into(),
            signature: Bytes::new(),
            digest: None,
        }
    }

    pub fn with_freshness_period(mut self, freshness_period: Duration) -> Self {
        self.freshness_period = freshness_period;
        self.digest = None;
        self
    }

    /// Implicit digest, if computed
    pub fn digest(&self) -> Option<&[u8; DIGEST_LENGTH]> {
        self.digest.as_ref()
    }

    /// Compute the implicit SHA-256 digest over the encoded packet
    pub fn compute_digest(&mut self) -> [u8; DIGEST_LENGTH] {
        let digest: [u8; DIGEST_LENGTH] = Sha256::digest(self.encode()).into();
        self.digest = Some(digest);
        digest
    }

    /// Name with the implicit digest component appended
    pub fn full_name(&mut self) -> Result<Name, NameError> {
        let digest = match self.digest {
            Some(d) => d,
            None => self.compute_digest(),
        };
        self.name.append(name_tt::IMPLICIT_SHA256_DIGEST_COMPONENT, &digest)
    }

    /// Whether this Data can satisfy `interest`
    pub fn can_satisfy(&self, interest: &Interest) -> DataSatisfyResult {
        self.can_satisfy_with(interest, interest.can_be_prefix)
    }

    /// Like `can_satisfy`, with CanBePrefix taken from the caller instead of
    /// the Interest
    pub fn can_satisfy_with(&self, interest: &Interest, can_be_prefix: bool) -> DataSatisfyResult {
        if interest.must_be_fresh && self.freshness_period.is_zero() {
            return DataSatisfyResult::No;
        }

        let iname = &interest.name;
        if iname.has_digest_comp() {
            if iname.len() != self.name.len() + 1 || iname.prefix_value(self.name.len()) != self.name.value() {
                return DataSatisfyResult::No;
            }
            let Some(digest) = &self.digest else {
                return DataSatisfyResult::NeedDigest;
            };
            return match iname.component(iname.len() - 1) {
                Some(c) if c.value == digest.as_slice() => DataSatisfyResult::Yes,
                _ => DataSatisfyResult::No,
            };
        }

        if iname.len() < self.name.len() {
            if can_be_prefix && iname.is_prefix_of(&self.name) {
                DataSatisfyResult::Yes
            } else {
                DataSatisfyResult::No
            }
        } else if *iname == self.name {
            DataSatisfyResult::Yes
        } else {
            DataSatisfyResult::No
        }
    }

    fn signed_portion(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.name.value().len() + self.content.len() + 32);
        self.name.encode_to(&mut buf);
        if !self.freshness_period.is_zero() {
            let mut meta = Vec::new();
            encode_nni_tlv(&mut meta, tt::FRESHNESS_PERIOD, self.freshness_period.as_millis() as u64);
            encode_tlv(&mut buf, tt::META_INFO, &meta);
        }
        encode_tlv(&mut buf, tt::CONTENT, &self.content);
        // SignatureType 0: DigestSha256
        encode_tlv(&mut buf, tt::SIGNATURE_INFO, &[tt::SIGNATURE_TYPE as u8, 1, 0]);
        buf
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut inner = self.signed_portion();
        if self.signature.is_empty() {
            let sig = Sha256::digest(&inner);
            encode_tlv(&mut inner, tt::SIGNATURE_VALUE, &sig);
        } else {
            encode_tlv(&mut inner, tt::SIGNATURE_VALUE, &self.signature);
        }
        let mut buf = Vec::with_capacity(inner.len() + 4);
        encode_tlv(&mut buf, tt::DATA, &inner);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<(Self, usize), PacketError> {
        let (type_, value, consumed) = decode_tlv(data)?;
        if type_ != tt::DATA {
            return Err(TlvError::InvalidType(type_).into());
        }

        let mut name = None;
        let mut packet = Data::new(Name::new(), Bytes::new());
        for item in TlvIter::new(value) {
            let (t, v) = item?;
            match t {
                tt::NAME => name = Some(Name::from_value(Bytes::copy_from_slice(v))?),
                tt::META_INFO => {
                    for meta in TlvIter::new(v) {
                        let (mt, mv) = meta?;
                        if mt == tt::FRESHNESS_PERIOD {
                            packet.freshness_period = Duration::from_millis(decode_nni(mv)?);
                        }
                    }
                }
                tt::CONTENT => packet.content = Bytes::copy_from_slice(v),
                tt::SIGNATURE_VALUE => packet.signature = Bytes::copy_from_slice(v),
                _ => {}
            }
        }
        packet.name = name.ok_or(TlvError::Missing(tt::NAME))?;
        Ok((packet, consumed))
    }
}

/// Nack packet: an Interest returned with a reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nack {
    pub reason: NackReason,
    pub interest: Interest,
}

impl Nack {
    pub fn new(interest: Interest, reason: NackReason) -> Self {
        Self { reason, interest }
    }
}

/// Link-layer envelope fields the forwarder reads and writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LpHeader {
    pub pit_token: Option<u64>,
    pub cong_mark: u8,
}

/// Network-layer packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L3 {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

/// A packet with its envelope and receiving face
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub rx_face: FaceId,
    pub lp: LpHeader,
    pub l3: L3,
}

impl Packet {
    pub fn interest(rx_face: FaceId, interest: Interest) -> Self {
        Self {
            rx_face,
            lp: LpHeader::default(),
            l3: L3::Interest(interest),
        }
    }

    pub fn data(rx_face: FaceId, data: Data, pit_token: Option<u64>) -> Self {
        Self {
            rx_face,
            lp: LpHeader {
                pit_token,
                cong_mark: 0,
            },
            l3: L3::Data(data),
        }
    }

    pub fn nack(rx_face: FaceId, nack: Nack, pit_token: Option<u64>) -> Self {
        Self {
            rx_face,
            lp: LpHeader {
                pit_token,
                cong_mark: 0,
            },
            l3: L3::Nack(nack),
        }
    }

    pub fn packet_type(&self) -> PacketType {
        match self.l3 {
            L3::Interest(_) => PacketType::Interest,
            L3::Data(_) => PacketType::Data,
            L3::Nack(_) => PacketType::Nack,
        }
    }

    pub fn name(&self) -> &Name {
        match &self.l3 {
            L3::Interest(i) => &i.name,
            L3::Data(d) => &d.name,
            L3::Nack(n) => &n.interest.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    #[test]
    fn test_interest_encode_decode() {
        let interest = Interest::new(name("/hello/world"))
            .with_can_be_prefix(true)
            .with_must_be_fresh(true)
            .with_nonce(0xA0A1A2A3)
            .with_lifetime(Duration::from_millis(2500))
            .with_hop_limit(32)
            .with_fwhint(name("/isp"));
        let encoded = interest.encode();
        assert_eq!(encoded[0], 0x05);
        let (decoded, consumed) = Interest::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, interest);
    }

    #[test]
    fn test_data_decode_keeps_digest_stable() {
        let mut data = Data::new(name("/a/b"), &b"payload"[..]).with_freshness_period(Duration::from_secs(1));
        let digest = data.compute_digest();
        let (mut decoded, _) = Data::decode(&data.encode()).unwrap();
        assert_eq!(decoded.freshness_period, Duration::from_secs(1));
        assert_eq!(decoded.content, Bytes::from_static(b"payload"));
        assert_eq!(decoded.compute_digest(), digest);
    }

    #[test]
    fn test_can_satisfy_exact_and_prefix() {
        let data = Data::new(name("/a/b/c"), Bytes::new());
        assert_eq!(data.can_satisfy(&Interest::new(name("/a/b/c"))), DataSatisfyResult::Yes);
        assert_eq!(data.can_satisfy(&Interest::new(name("/a/b"))), DataSatisfyResult::No);
        assert_eq!(
            data.can_satisfy(&Interest::new(name("/a/b")).with_can_be_prefix(true)),
            DataSatisfyResult::Yes
        );
        assert_eq!(
            data.can_satisfy(&Interest::new(name("/a/x")).with_can_be_prefix(true)),
            DataSatisfyResult::No
        );

        let exact = Interest::new(name("/a/b"));
        assert_eq!(data.can_satisfy_with(&exact, true), DataSatisfyResult::Yes);
        let prefix = Interest::new(name("/a/b")).with_can_be_prefix(true);
        assert_eq!(data.can_satisfy_with(&prefix, false), DataSatisfyResult::No);
    }

    #[test]
    fn test_can_satisfy_must_be_fresh() {
        let stale = Data::new(name("/a"), Bytes::new());
        let interest = Interest::new(name("/a")).with_must_be_fresh(true);
        assert_eq!(stale.can_satisfy(&interest), DataSatisfyResult::No);
        let fresh = stale.with_freshness_period(Duration::from_millis(100));
        assert_eq!(fresh.can_satisfy(&interest), DataSatisfyResult::Yes);
    }

    #[test]
    fn test_can_satisfy_implicit_digest() {
        let mut data = Data::new(name("/a/b"), &b"x"[..]);
        let full_name = data.clone().full_name().unwrap();
        let interest = Interest::new(full_name);
        assert_eq!(data.can_satisfy(&interest), DataSatisfyResult::NeedDigest);
        data.compute_digest();
        assert_eq!(data.can_satisfy(&interest), DataSatisfyResult::Yes);

        let other = Interest::new(name("/a/b").append(name_tt::IMPLICIT_SHA256_DIGEST_COMPONENT, &[0u8; 32]).unwrap());
        assert_eq!(data.can_satisfy(&other), DataSatisfyResult::No);
    }

    #[test]
    fn test_modify_guiders() {
        let interest = Interest::new(name("/a")).with_nonce(1).with_hop_limit(5);
        let copy = interest.modify_guiders(2, Duration::from_millis(100), Some(4));
        assert_eq!(copy.nonce, 2);
        assert_eq!(copy.hop_limit, Some(4));
        assert_eq!(copy.name, interest.name);
    }
}
