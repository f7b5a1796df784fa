//! HPACK header compression (RFC 7541).
//!
//! Decoding is stateful and order-sensitive: one [`Decoder`] spans an
//! entire connection and must see header blocks in wire order, or its
//! dynamic table silently diverges from the peer's. The engine therefore
//! keeps the decoder on the frame-loop task and the [`Encoder`] under the
//! connection's write lock.

mod huffman;
mod prim;
mod table;

use prim::{decode_int, encode_int};
use table::{static_entry, static_find, static_find_name, DynamicTable, STATIC_TABLE_SIZE};

/// HPACK coding errors. A decode failure is a protocol error scoped to
/// the stream that carried the block.
#[derive(Debug, thiserror::Error)]
pub enum HpackError {
    #[error("unexpected end of header block")]
    UnexpectedEof,

    #[error("prefixed integer overflow")]
    IntegerOverflow,

    #[error("invalid Huffman code")]
    InvalidHuffmanCode,

    #[error("invalid table index {0}")]
    InvalidIndex(usize),

    #[error("invalid field representation 0x{0:02x}")]
    InvalidRepresentation(u8),
}

/// Connection-scoped HPACK decoder.
pub struct Decoder {
    table: DynamicTable,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            table: DynamicTable::new(4096),
        }
    }

    /// Decode one complete header block into `(name, value)` strings in
    /// wire order. Non-UTF-8 octets are replaced rather than rejected;
    /// fingerprinting wants to observe whatever the client sent.
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<(String, String)>, HpackError> {
        let mut headers = Vec::new();
        let mut pos = 0;

        while pos < block.len() {
            let byte = block[pos];

            if byte & 0x80 != 0 {
                // Indexed field (Section 6.1).
                let (index, extra) = decode_int(&block[pos..], 7)?;
                pos += 1 + extra;
                let (name, value) = self.lookup(index)?;
                headers.push((to_string(name), to_string(value)));
            } else if byte & 0xc0 == 0x40 {
                // Literal with incremental indexing (Section 6.2.1).
                let (name_index, extra) = decode_int(&block[pos..], 6)?;
                pos += 1 + extra;
                let name = self.read_name(block, &mut pos, name_index)?;
                let value = self.read_string(block, &mut pos)?;
                headers.push((to_string(&name), to_string(&value)));
                self.table.insert(name, value);
            } else if byte & 0xe0 == 0x20 {
                // Dynamic table size update (Section 6.3).
                let (size, extra) = decode_int(&block[pos..], 5)?;
                pos += 1 + extra;
                self.table.set_max_size(size);
            } else if byte & 0xf0 == 0x00 || byte & 0xf0 == 0x10 {
                // Literal without indexing / never indexed (6.2.2, 6.2.3).
                let (name_index, extra) = decode_int(&block[pos..], 4)?;
                pos += 1 + extra;
                let name = self.read_name(block, &mut pos, name_index)?;
                let value = self.read_string(block, &mut pos)?;
                headers.push((to_string(&name), to_string(&value)));
            } else {
                return Err(HpackError::InvalidRepresentation(byte));
            }
        }

        Ok(headers)
    }

    fn lookup(&self, index: usize) -> Result<(&[u8], &[u8]), HpackError> {
        if index == 0 {
            return Err(HpackError::InvalidIndex(0));
        }
        if index <= STATIC_TABLE_SIZE {
            static_entry(index).ok_or(HpackError::InvalidIndex(index))
        } else {
            self.table
                .get(index - STATIC_TABLE_SIZE)
                .ok_or(HpackError::InvalidIndex(index))
        }
    }

    fn read_name(
        &self,
        block: &[u8],
        pos: &mut usize,
        name_index: usize,
    ) -> Result<Vec<u8>, HpackError> {
        if name_index == 0 {
            self.read_string(block, pos)
        } else {
            Ok(self.lookup(name_index)?.0.to_vec())
        }
    }

    fn read_string(&self, block: &[u8], pos: &mut usize) -> Result<Vec<u8>, HpackError> {
        let rest = block.get(*pos..).ok_or(HpackError::UnexpectedEof)?;
        if rest.is_empty() {
            return Err(HpackError::UnexpectedEof);
        }
        let huffman = rest[0] & 0x80 != 0;
        let (len, extra) = decode_int(rest, 7)?;
        let start = 1 + extra;
        let end = start + len;
        if end > rest.len() {
            return Err(HpackError::UnexpectedEof);
        }
        let raw = &rest[start..end];
        *pos += end;
        if huffman {
            huffman::decode(raw)
        } else {
            Ok(raw.to_vec())
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Connection-scoped response encoder. Its dynamic table mirrors the
/// peer's decoder, so all encoding for a connection must run under the
/// same write lock that serialises the frames themselves.
pub struct Encoder {
    table: DynamicTable,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            table: DynamicTable::new(4096),
        }
    }

    /// Encode response headers. Names must already be lowercase.
    pub fn encode(&mut self, headers: &[(&str, &str)]) -> Vec<u8> {
        let mut output = Vec::new();
        for (name, value) in headers {
            self.encode_field(name.as_bytes(), value.as_bytes(), &mut output);
        }
        output
    }

    fn encode_field(&mut self, name: &[u8], value: &[u8], output: &mut Vec<u8>) {
        if let Some(index) = static_find(name, value) {
            output.push(0x80);
            encode_int(index, 7, output);
            return;
        }
        if let Some(index) = self.table.find(name, value) {
            output.push(0x80);
            encode_int(STATIC_TABLE_SIZE + index, 7, output);
            return;
        }

        let name_index = static_find_name(name)
            .or_else(|| self.table.find_name(name).map(|i| STATIC_TABLE_SIZE + i));

        output.push(0x40);
        encode_int(name_index.unwrap_or(0), 6, output);
        if name_index.is_none() {
            self.encode_string(name, output);
        }
        self.encode_string(value, output);
        self.table.insert(name.to_vec(), value.to_vec());
    }

    fn encode_string(&self, input: &[u8], output: &mut Vec<u8>) {
        let (encoded, huffman) = huffman::encode_if_smaller(input);
        output.push(if huffman { 0x80 } else { 0x00 });
        encode_int(encoded.len(), 7, output);
        output.extend_from_slice(&encoded);
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
