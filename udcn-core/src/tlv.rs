use bytes::Bytes;

/// NDN TLV codec.
///
/// Wire format:
/// - Type: variable-length number (1, 3, 5 or 9 bytes)
/// - Length: variable-length number (1, 3, 5 or 9 bytes)
/// - Value: `Length` octets
///
/// Variable-length numbers are big-endian: values below 253 take one octet,
/// otherwise a marker (0xFD, 0xFE, 0xFF) precedes a 2, 4 or 8 octet integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvElement {
    pub type_: u32,
    pub value: Bytes,
}

/// Errors that can occur during TLV encoding/decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TlvError {
    #[error("Buffer too short")]
    BufferTooShort,
    #[error("Invalid variable-length number")]
    InvalidVarNum,
    #[error("Invalid TLV type: {0}")]
    InvalidType(u32),
    #[error("Missing required element: {0}")]
    Missing(u32),
    #[error("Value length mismatch: expected {expected}, got {actual}")]
    ValueLengthMismatch { expected: usize, actual: usize },
}

impl TlvElement {
    pub fn new(type_: u32, value: impl Into<Bytes>) -> Self {
        Self {
            type_,
            value: value.into(),
        }
    }

    /// Total encoded length of this element
    pub fn encoded_length(&self) -> usize {
        varnum_size(self.type_ as u64) + varnum_size(self.value.len() as u64) + self.value.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_length());
        self.encode_to(&mut buffer);
        buffer
    }

    pub fn encode_to(&self, buffer: &mut Vec<u8>) {
        encode_tlv(buffer, self.type_, &self.value);
    }

    /// Decode one element from the front of `data`, returning it and the consumed length
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (type_, value, consumed) = decode_tlv(data)?;
        Ok((TlvElement::new(type_, Bytes::copy_from_slice(value)), consumed))
    }
}

/// Append a TLV with the given type and value
pub fn encode_tlv(buffer: &mut Vec<u8>, type_: u32, value: &[u8]) {
    encode_varnum(buffer, type_ as u64);
    encode_varnum(buffer, value.len() as u64);
    buffer.extend_from_slice(value);
}

/// Append a non-negative integer TLV using the shortest of 1, 2, 4 or 8 octets
pub fn encode_nni_tlv(buffer: &mut Vec<u8>, type_: u32, n: u64) {
    if n <= u8::MAX as u64 {
        encode_tlv(buffer, type_, &[n as u8]);
    } else if n <= u16::MAX as u64 {
        encode_tlv(buffer, type_, &(n as u16).to_be_bytes());
    } else if n <= u32::MAX as u64 {
        encode_tlv(buffer, type_, &(n as u32).to_be_bytes());
    } else {
        encode_tlv(buffer, type_, &n.to_be_bytes());
    }
}

/// Decode a non-negative integer from a TLV-VALUE
pub fn decode_nni(value: &[u8]) -> Result<u64, TlvError> {
    match value.len() {
        1 => Ok(value[0] as u64),
        2 => Ok(u16::from_be_bytes([value[0], value[1]]) as u64),
        4 => Ok(u32::from_be_bytes([value[0], value[1], value[2], value[3]]) as u64),
        8 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(value);
            Ok(u64::from_be_bytes(b))
        }
        n => Err(TlvError::ValueLengthMismatch {
            expected: 8,
            actual: n,
        }),
    }
}

/// Append a variable-length number
pub fn encode_varnum(buffer: &mut Vec<u8>, n: u64) {
    if n < 253 {
        buffer.push(n as u8);
    } else if n <= u16::MAX as u64 {
        buffer.push(0xFD);
        buffer.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= u32::MAX as u64 {
        buffer.push(0xFE);
        buffer.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buffer.push(0xFF);
        buffer.extend_from_slice(&n.to_be_bytes());
    }
}

/// Size needed to encode a variable-length number
pub fn varnum_size(n: u64) -> usize {
    if n < 253 {
        1
    } else if n <= u16::MAX as u64 {
        3
    } else if n <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

/// Decode a variable-length number, returning it and the consumed length
pub fn decode_varnum(data: &[u8]) -> Result<(u64, usize), TlvError> {
    let first = *data.first().ok_or(TlvError::BufferTooShort)?;
    let width = match first {
        0xFD => 2,
        0xFE => 4,
        0xFF => 8,
        v => return Ok((v as u64, 1)),
    };
    if data.len() < 1 + width {
        return Err(TlvError::BufferTooShort);
    }
    let mut b = [0u8; 8];
    b[8 - width..].copy_from_slice(&data[1..1 + width]);
    let n = u64::from_be_bytes(b);
    // reject non-minimal encodings
    let minimal = match width {
        2 => n >= 253,
        4 => n > u16::MAX as u64,
        _ => n > u32::MAX as u64,
    };
    if !minimal {
        return Err(TlvError::InvalidVarNum);
    }
    Ok((n, 1 + width))
}

/// Decode one TLV without copying, returning type, borrowed value and consumed length
pub fn decode_tlv(data: &[u8]) -> Result<(u32, &[u8], usize), TlvError> {
    let (type_, t_len) = decode_varnum(data)?;
    if type_ == 0 || type_ > u32::MAX as u64 {
        return Err(TlvError::InvalidType(type_ as u32));
    }
    let (length, l_len) = decode_varnum(&data[t_len..])?;
    let start = t_len + l_len;
    let end = start
        .checked_add(length as usize)
        .ok_or(TlvError::BufferTooShort)?;
    if data.len() < end {
        return Err(TlvError::BufferTooShort);
    }
    Ok((type_ as u32, &data[start..end], end))
}

/// Borrowing iterator over a sequence of TLVs
pub struct TlvIter<'a> {
    data: &'a [u8],
}

impl<'a> TlvIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<(u32, &'a [u8]), TlvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        match decode_tlv(self.data) {
            Ok((type_, value, consumed)) => {
                self.data = &self.data[consumed..];
                Some(Ok((type_, value)))
            }
            Err(e) => {
                self.data = &[];
                Some(Err(e))
            }
        }
    }
}

/// Decode multiple TLV elements from a buffer
pub fn decode_tlv_sequence(data: &[u8]) -> Result<Vec<TlvElement>, TlvError> {
    TlvIter::new(data)
        .map(|r| r.map(|(t, v)| TlvElement::new(t, Bytes::copy_from_slice(v))))
        .collect()
}
