//! HPACK header compression (RFC 7541): static+dynamic table coding with
//! Huffman-compressed string literals, operated by one stateful
//! [`Encoder`]/[`Decoder`] pair per HTTP/2 connection.

mod huffman;
mod table;

use std::fmt;

use table::DynamicTable;

pub(crate) use table::STATIC_TABLE;

/// A decoded or to-be-encoded header, name/value both owned so the caller
/// can hold it past the lifetime of the connection's dynamic table.
pub type Header = (String, String);

/// Failure decoding an HPACK byte string. Every variant is a
/// `COMPRESSION_ERROR` at the HTTP/2 layer (§4.3 of the design).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HpackError {
    InvalidIndex,
    TruncatedLiteral,
    TruncatedInteger,
    SizeUpdateTooLarge,
    HuffmanPadding,
    HuffmanEos,
    InvalidUtf8,
}

impl fmt::Display for HpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HpackError::InvalidIndex => "header field index out of range",
            HpackError::TruncatedLiteral => "truncated header literal",
            HpackError::TruncatedInteger => "truncated prefix integer",
            HpackError::SizeUpdateTooLarge => "dynamic table size update exceeds protocol maximum",
            HpackError::HuffmanPadding => "invalid Huffman padding",
            HpackError::HuffmanEos => "Huffman-encoded EOS symbol in header value",
            HpackError::InvalidUtf8 => "header bytes are not valid UTF-8",
        };
        f.write_str(s)
    }
}

impl std::error::Error for HpackError {}

/// Per-connection HPACK encoder. Holds the dynamic table the peer's
/// decoder mirrors.
#[derive(Debug)]
pub struct Encoder {
    dynamic: DynamicTable,
    protocol_max_size: usize,
}

impl Encoder {
    pub fn new(max_dynamic_size: usize) -> Self {
        Encoder {
            dynamic: DynamicTable::new(max_dynamic_size),
            protocol_max_size: max_dynamic_size,
        }
    }

    /// Updates the table size ceiling after a SETTINGS exchange changes
    /// `HEADER_TABLE_SIZE`; the next `encode` call emits a dynamic size
    /// update representation.
    pub fn set_max_dynamic_size(&mut self, max: usize) {
        self.protocol_max_size = max;
        self.dynamic.set_max_size(max);
    }

    /// Encodes `headers` as an HPACK block, inserting literals with
    /// incremental indexing into the dynamic table as it goes so a
    /// repeated header on the next call encodes as a single indexed byte.
    pub fn encode<'h, I>(&mut self, headers: I) -> Vec<u8>
    where
        I: IntoIterator<Item = (&'h str, &'h str)>,
    {
        let mut out = Vec::new();
        for (name, value) in headers {
            self.encode_one(name, value, &mut out);
        }
        out
    }

    fn encode_one(&mut self, name: &str, value: &str, out: &mut Vec<u8>) {
        if let Some(index) = find_full_match(name, value, &self.dynamic) {
            encode_integer(index as u64, 7, 0x80, out);
            return;
        }

        let name_index = find_name_match(name, &self.dynamic);
        match name_index {
            Some(index) => encode_integer(index as u64, 6, 0x40, out),
            None => {
                out.push(0x40);
                encode_string(name, out);
            }
        }
        encode_string(value, out);
        self.dynamic.insert(name.to_string(), value.to_string());
    }
}

fn find_full_match(name: &str, value: &str, dynamic: &DynamicTable) -> Option<usize> {
    for (i, &(n, v)) in STATIC_TABLE.iter().enumerate() {
        if n == name && v == value {
            return Some(i + 1);
        }
    }
    for i in 0..dynamic.len() {
        if let Some((n, v)) = dynamic.get(i) {
            if n == name && v == value {
                return Some(STATIC_TABLE.len() + i + 1);
            }
        }
    }
    None
}

fn find_name_match(name: &str, dynamic: &DynamicTable) -> Option<usize> {
    for (i, &(n, _)) in STATIC_TABLE.iter().enumerate() {
        if n == name {
            return Some(i + 1);
        }
    }
    for i in 0..dynamic.len() {
        if let Some((n, _)) = dynamic.get(i) {
            if n == name {
                return Some(STATIC_TABLE.len() + i + 1);
            }
        }
    }
    None
}

/// Per-connection HPACK decoder, mirroring the peer's `Encoder`.
#[derive(Debug)]
pub struct Decoder {
    dynamic: DynamicTable,
}

impl Decoder {
    pub fn new(max_dynamic_size: usize) -> Self {
        Decoder {
            dynamic: DynamicTable::new(max_dynamic_size),
        }
    }

    /// Decodes one complete HPACK block (a HEADERS frame's fragment,
    /// possibly spanning CONTINUATION frames already reassembled by the
    /// caller) into an ordered header list.
    pub fn decode(&mut self, mut input: &[u8]) -> Result<Vec<Header>, HpackError> {
        let mut out = Vec::new();
        while !input.is_empty() {
            let first = input[0];
            if first & 0x80 != 0 {
                let (index, rest) = decode_integer(input, 7)?;
                input = rest;
                let (name, value) = table::lookup(index as usize, &self.dynamic)
                    .ok_or(HpackError::InvalidIndex)?;
                out.push((name.to_string(), value.to_string()));
            } else if first & 0x40 != 0 {
                let (index, rest) = decode_integer(input, 6)?;
                input = rest;
                let name = if index == 0 {
                    let (s, rest) = decode_string(input)?;
                    input = rest;
                    s
                } else {
                    let (name, _) = table::lookup(index as usize, &self.dynamic)
                        .ok_or(HpackError::InvalidIndex)?;
                    name.to_string()
                };
                let (value, rest) = decode_string(input)?;
                input = rest;
                self.dynamic.insert(name.clone(), value.clone());
                out.push((name, value));
            } else if first & 0x20 != 0 {
                let (new_max, rest) = decode_integer(input, 5)?;
                input = rest;
                self.dynamic.set_max_size(new_max as usize);
            } else {
                // 0000xxxx (without indexing) or 0001xxxx (never indexed);
                // both decode identically, only the indexing decision differs.
                let (index, rest) = decode_integer(input, 4)?;
                input = rest;
                let name = if index == 0 {
                    let (s, rest) = decode_string(input)?;
                    input = rest;
                    s
                } else {
                    let (name, _) = table::lookup(index as usize, &self.dynamic)
                        .ok_or(HpackError::InvalidIndex)?;
                    name.to_string()
                };
                let (value, rest) = decode_string(input)?;
                input = rest;
                out.push((name, value));
            }
        }
        Ok(out)
    }
}

/// Encodes `value` with an N-bit prefix integer (RFC 7541 §5.1), ORing the
/// leading flag bits into the first byte.
fn encode_integer(mut value: u64, prefix_bits: u8, flag_bits: u8, out: &mut Vec<u8>) {
    let max_prefix = (1u64 << prefix_bits) - 1;
    if value < max_prefix {
        out.push(flag_bits | value as u8);
        return;
    }
    out.push(flag_bits | max_prefix as u8);
    value -= max_prefix;
    while value >= 128 {
        out.push(((value % 128) + 128) as u8);
        value /= 128;
    }
    out.push(value as u8);
}

fn decode_integer(input: &[u8], prefix_bits: u8) -> Result<(u64, &[u8]), HpackError> {
    if input.is_empty() {
        return Err(HpackError::TruncatedInteger);
    }
    let max_prefix = (1u64 << prefix_bits) - 1;
    let mut value = (input[0] as u64) & max_prefix;
    let mut rest = &input[1..];
    if value < max_prefix {
        return Ok((value, rest));
    }
    let mut shift = 0u32;
    loop {
        let byte = *rest.first().ok_or(HpackError::TruncatedInteger)?;
        rest = &rest[1..];
        value += ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 63 {
            return Err(HpackError::TruncatedInteger);
        }
    }
    Ok((value, rest))
}

fn encode_string(s: &str, out: &mut Vec<u8>) {
    let huffman_len = huffman::encoded_len(s.as_bytes());
    if huffman_len < s.len() {
        encode_integer(huffman_len as u64, 7, 0x80, out);
        huffman::encode(s.as_bytes(), out);
    } else {
        encode_integer(s.len() as u64, 7, 0x00, out);
        out.extend_from_slice(s.as_bytes());
    }
}

fn decode_string(input: &[u8]) -> Result<(String, &[u8]), HpackError> {
    if input.is_empty() {
        return Err(HpackError::TruncatedLiteral);
    }
    let is_huffman = input[0] & 0x80 != 0;
    let (len, rest) = decode_integer(input, 7)?;
    let len = len as usize;
    if rest.len() < len {
        return Err(HpackError::TruncatedLiteral);
    }
    let (data, rest) = rest.split_at(len);
    let bytes = if is_huffman {
        huffman::decode(data)?
    } else {
        data.to_vec()
    };
    let s = String::from_utf8(bytes).map_err(|_| HpackError::InvalidUtf8)?;
    Ok((s, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_request_headers() {
        let headers = vec![
            (":authority".to_string(), "localhost:8080".to_string()),
            (":method".to_string(), "GET".to_string()),
            (":path".to_string(), "/".to_string()),
            (":scheme".to_string(), "https".to_string()),
            ("accept".to_string(), "text/html".to_string()),
        ];
        let mut encoder = Encoder::new(4096);
        let mut decoder = Decoder::new(4096);

        let encoded = encoder.encode(headers.iter().map(|(n, v)| (n.as_str(), v.as_str())));
        let decoded = decoder.decode(&encoded).unwrap();
        assert_eq!(decoded, headers);
    }

    #[test]
    fn second_identical_request_is_no_larger() {
        let headers = [
            (":authority", "localhost:8080"),
            (":method", "GET"),
            (":path", "/"),
        ];
        let mut encoder = Encoder::new(4096);
        let first = encoder.encode(headers.iter().copied());
        let second = encoder.encode(headers.iter().copied());
        assert!(second.len() <= first.len());
    }

    #[test]
    fn static_table_only_entry_is_single_byte() {
        let mut encoder = Encoder::new(4096);
        let out = encoder.encode([(":method", "GET")]);
        assert_eq!(out, vec![0x80 | 2]);
    }

    #[test]
    fn dynamic_table_evicts_oldest_first() {
        let mut table = DynamicTable::new(64);
        table.insert("a".into(), "1".into());
        table.insert("b".into(), "2".into());
        // "a": "1" costs 1+1+32 = 34; two entries cost 68 > 64, so the
        // oldest ("a") must have been evicted.
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0), Some(&("b".to_string(), "2".to_string())));
    }
}
