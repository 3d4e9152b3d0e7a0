use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use bytes::Bytes;
use udcn_common::{DIGEST_LENGTH, MAX_NAME_LENGTH, NAME_CACHED_PREFIXES};

use crate::tlv::{decode_tlv, encode_tlv, TlvError};

/// TLV-TYPE numbers of name components
pub mod tt {
    pub const NAME: u32 = 0x07;
    pub const IMPLICIT_SHA256_DIGEST_COMPONENT: u32 = 0x01;
    pub const PARAMETERS_SHA256_DIGEST_COMPONENT: u32 = 0x02;
    pub const GENERIC_NAME_COMPONENT: u32 = 0x08;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name exceeds {} octets", MAX_NAME_LENGTH)]
    TooLong,
    #[error("malformed name: {0}")]
    Tlv(#[from] TlvError),
    #[error("invalid name component type {0}")]
    InvalidComponentType(u32),
    #[error("invalid name URI component: {0}")]
    InvalidUri(String),
}

/// A borrowed name component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component<'a> {
    pub type_: u32,
    pub value: &'a [u8],
}

/// NDN name, kept in its TLV-encoded form.
///
/// `value` is the Name TLV-VALUE (concatenated component TLVs). Equality and
/// ordering-free comparisons are exact byte comparisons of that buffer.
/// Component boundaries are parsed once, and the hashes of the first
/// `NAME_CACHED_PREFIXES` prefixes are cached so that FIB lookups and NDT
/// dispatching never rehash.
#[derive(Clone)]
pub struct Name {
    value: Bytes,
    ends: Vec<u16>,
    prefix_hashes: [u64; NAME_CACHED_PREFIXES + 1],
}

impl Name {
    /// The empty name `/`
    pub fn new() -> Self {
        let mut prefix_hashes = [0u64; NAME_CACHED_PREFIXES + 1];
        prefix_hashes[0] = DefaultHasher::new().finish();
        Self {
            value: Bytes::new(),
            ends: Vec::new(),
            prefix_hashes,
        }
    }

    /// Build a name from its TLV-VALUE
    pub fn from_value(value: impl Into<Bytes>) -> Result<Self, NameError> {
        let value: Bytes = value.into();
        if value.len() > MAX_NAME_LENGTH {
            return Err(NameError::TooLong);
        }

        let mut name = Name::new();
        let mut hasher = DefaultHasher::new();
        let mut pos = 0;
        while pos < value.len() {
            let (type_, comp, consumed) = decode_tlv(&value[pos..])?;
            if type_ > u16::MAX as u32 {
                return Err(NameError::InvalidComponentType(type_));
            }
            if type_ == tt::IMPLICIT_SHA256_DIGEST_COMPONENT && comp.len() != DIGEST_LENGTH {
                return Err(NameError::InvalidComponentType(type_));
            }
            hasher.write(&value[pos..pos + consumed]);
            pos += consumed;
            name.ends.push(pos as u16);
            if name.ends.len() <= NAME_CACHED_PREFIXES {
                name.prefix_hashes[name.ends.len()] = hasher.finish();
            }
        }
        name.value = value;
        Ok(name)
    }

    /// Decode a Name TLV from the front of `data`
    pub fn decode(data: &[u8]) -> Result<(Self, usize), NameError> {
        let (type_, value, consumed) = decode_tlv(data)?;
        if type_ != tt::NAME {
            return Err(TlvError::InvalidType(type_).into());
        }
        Ok((Name::from_value(Bytes::copy_from_slice(value))?, consumed))
    }

    /// Build a name from generic components
    pub fn from_components<I, C>(components: I) -> Result<Self, NameError>
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let mut value = Vec::new();
        for comp in components {
            encode_tlv(&mut value, tt::GENERIC_NAME_COMPONENT, comp.as_ref());
        }
        Name::from_value(value)
    }

    /// Parse a URI such as `/hello/world` or `/a/sha256digest=<hex>`
    pub fn from_uri(uri: &str) -> Result<Self, NameError> {
        let uri = uri.strip_prefix("ndn:").unwrap_or(uri);
        let mut value = Vec::new();
        for part in uri.split('/').filter(|p| !p.is_empty()) {
            if let Some(hex) = part.strip_prefix("sha256digest=") {
                let digest = decode_hex(hex).ok_or_else(|| NameError::InvalidUri(part.to_string()))?;
                encode_tlv(&mut value, tt::IMPLICIT_SHA256_DIGEST_COMPONENT, &digest);
            } else if let Some(hex) = part.strip_prefix("params-sha256=") {
                let digest = decode_hex(hex).ok_or_else(|| NameError::InvalidUri(part.to_string()))?;
                encode_tlv(&mut value, tt::PARAMETERS_SHA256_DIGEST_COMPONENT, &digest);
            } else {
                let comp = percent_decode(part).ok_or_else(|| NameError::InvalidUri(part.to_string()))?;
                encode_tlv(&mut value, tt::GENERIC_NAME_COMPONENT, &comp);
            }
        }
        Name::from_value(value)
    }

    /// Copy of this name with one more component
    pub fn append(&self, type_: u32, comp: &[u8]) -> Result<Self, NameError> {
        let mut value = Vec::with_capacity(self.value.len() + comp.len() + 4);
        value.extend_from_slice(&self.value);
        encode_tlv(&mut value, type_, comp);
        Name::from_value(value)
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Name TLV-VALUE
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// TLV-VALUE of the prefix with `n` components (clamped)
    pub fn prefix_value(&self, n: usize) -> &[u8] {
        &self.value[..self.prefix_end(n)]
    }

    fn prefix_end(&self, n: usize) -> usize {
        match n.min(self.ends.len()) {
            0 => 0,
            n => self.ends[n - 1] as usize,
        }
    }

    /// Prefix with `n` components (clamped); shares the underlying buffer
    pub fn prefix(&self, n: usize) -> Name {
        let n = n.min(self.ends.len());
        let mut prefix_hashes = self.prefix_hashes;
        for h in prefix_hashes.iter_mut().skip(n + 1) {
            *h = 0;
        }
        Name {
            value: self.value.slice(..self.prefix_end(n)),
            ends: self.ends[..n].to_vec(),
            prefix_hashes,
        }
    }

    /// Hash of the prefix with `n` components (clamped)
    pub fn prefix_hash(&self, n: usize) -> u64 {
        let n = n.min(self.ends.len());
        if n <= NAME_CACHED_PREFIXES {
            return self.prefix_hashes[n];
        }
        let mut hasher = DefaultHasher::new();
        let mut start = 0;
        for &end in &self.ends[..n] {
            hasher.write(&self.value[start..end as usize]);
            start = end as usize;
        }
        hasher.finish()
    }

    /// Hash of the whole name
    pub fn hash_value(&self) -> u64 {
        self.prefix_hash(self.ends.len())
    }

    /// Component at index `i`
    pub fn component(&self, i: usize) -> Option<Component<'_>> {
        let end = *self.ends.get(i)? as usize;
        let start = if i == 0 { 0 } else { self.ends[i - 1] as usize };
        // boundaries were validated at construction
        let (type_, value, _) = decode_tlv(&self.value[start..end]).ok()?;
        Some(Component { type_, value })
    }

    pub fn components(&self) -> impl Iterator<Item = Component<'_>> + '_ {
        (0..self.len()).filter_map(move |i| self.component(i))
    }

    /// Whether this name is a prefix of (or equal to) `other`
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.len() <= other.len() && other.value.starts_with(&self.value)
    }

    /// Whether the last component is an implicit SHA-256 digest
    pub fn has_digest_comp(&self) -> bool {
        self.len() > 0
            && self
                .component(self.len() - 1)
                .map_or(false, |c| c.type_ == tt::IMPLICIT_SHA256_DIGEST_COMPONENT)
    }

    /// Encode as a complete Name TLV
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.value.len() + 4);
        self.encode_to(&mut buf);
        buf
    }

    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        encode_tlv(buf, tt::NAME, &self.value);
    }

    pub fn to_uri(&self) -> String {
        if self.is_empty() {
            return "/".to_string();
        }
        let mut uri = String::new();
        for comp in self.components() {
            uri.push('/');
            match comp.type_ {
                tt::GENERIC_NAME_COMPONENT => percent_encode(&mut uri, comp.value),
                tt::IMPLICIT_SHA256_DIGEST_COMPONENT => {
                    uri.push_str("sha256digest=");
                    encode_hex(&mut uri, comp.value);
                }
                tt::PARAMETERS_SHA256_DIGEST_COMPONENT => {
                    uri.push_str("params-sha256=");
                    encode_hex(&mut uri, comp.value);
                }
                t => {
                    uri.push_str(&t.to_string());
                    uri.push('=');
                    percent_encode(&mut uri, comp.value);
                }
            }
        }
        uri
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_value());
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Name::from_uri(s)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.to_uri())
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

fn percent_encode(out: &mut String, value: &[u8]) {
    if !value.is_empty() && value.iter().all(|&b| b == b'.') {
        // a component of only periods gets three extra periods
        out.push_str("...");
    }
    for &b in value {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
}

fn percent_decode(s: &str) -> Option<Vec<u8>> {
    let bytes = s.as_bytes();
    if !bytes.is_empty() && bytes.iter().all(|&b| b == b'.') {
        return if bytes.len() < 3 { None } else { Some(bytes[3..].to_vec()) };
    }
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex_val(*bytes.get(i + 1)?)?;
            let lo = hex_val(*bytes.get(i + 2)?)?;
            out.push(hi << 4 | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let bytes = s.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    bytes
        .chunks(2)
        .map(|pair| Some(hex_val(pair[0])? << 4 | hex_val(pair[1])?))
        .collect()
}

fn encode_hex(out: &mut String, value: &[u8]) {
    for b in value {
        out.push_str(&format!("{:02x}", b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_creation() {
        let name = Name::from_uri("/hello/world/test").unwrap();
        assert_eq!(name.len(), 3);
        assert_eq!(name.component(0).unwrap().value, b"hello");
        assert_eq!(name.component(2).unwrap().value, b"test");
        assert_eq!(name.to_uri(), "/hello/world/test");
    }

    #[test]
    fn test_empty_name() {
        let name = Name::from_uri("").unwrap();
        assert!(name.is_empty());
        assert_eq!(name.to_uri(), "/");
        assert_eq!(name, Name::new());
    }

    #[test]
    fn test_value_is_tlv() {
        let name = Name::from_uri("/a/bc").unwrap();
        assert_eq!(name.value(), &[0x08, 1, b'a', 0x08, 2, b'b', b'c']);
        assert_eq!(name.encode(), vec![0x07, 7, 0x08, 1, b'a', 0x08, 2, b'b', b'c']);
        let (decoded, consumed) = Name::decode(&name.encode()).unwrap();
        assert_eq!(decoded, name);
        assert_eq!(consumed, 9);
    }

    #[test]
    fn test_prefix_and_prefix_of() {
        let name = Name::from_uri("/hello/world/test").unwrap();
        let prefix = name.prefix(2);
        assert_eq!(prefix.to_uri(), "/hello/world");
        assert!(prefix.is_prefix_of(&name));
        assert!(!name.is_prefix_of(&prefix));
        assert!(Name::new().is_prefix_of(&name));
        assert_eq!(name.prefix(10), name);
    }

    #[test]
    fn test_prefix_hash_matches_prefix_name() {
        let long: Vec<String> = (0..12).map(|i| format!("c{}", i)).collect();
        let name = Name::from_components(&long).unwrap();
        for n in 0..=name.len() {
            let prefix = name.prefix(n);
            assert_eq!(name.prefix_hash(n), prefix.hash_value(), "prefix {}", n);
        }
        assert_ne!(name.prefix_hash(1), name.prefix_hash(2));
    }

    #[test]
    fn test_digest_component() {
        let hex = "00".repeat(32);
        let name = Name::from_uri(&format!("/a/sha256digest={}", hex)).unwrap();
        assert!(name.has_digest_comp());
        assert_eq!(name.component(1).unwrap().type_, tt::IMPLICIT_SHA256_DIGEST_COMPONENT);
        assert_eq!(name.to_uri(), format!("/a/sha256digest={}", hex));
        assert!(!Name::from_uri("/a").unwrap().has_digest_comp());
    }

    #[test]
    fn test_bad_digest_length_rejected() {
        assert!(Name::from_uri("/a/sha256digest=0011").is_err());
    }

    #[test]
    fn test_percent_encoding() {
        let name = Name::from_components([&b"a b"[..], &b"..."[..]]).unwrap();
        assert_eq!(name.to_uri(), "/a%20b/......");
        assert_eq!(Name::from_uri(&name.to_uri()).unwrap(), name);
    }

    #[test]
    fn test_too_long() {
        let comp = vec![b'x'; MAX_NAME_LENGTH];
        assert_eq!(Name::from_components([comp]).unwrap_err(), NameError::TooLong);
    }
}
