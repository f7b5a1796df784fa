//! HPACK indexing tables (RFC 7541 Sections 2.3 and 4).

use std::collections::VecDeque;

/// The 61 predefined header fields of RFC 7541 Appendix A. Index 0 is
/// reserved; valid indices are 1-61.
pub const STATIC_TABLE: [(&[u8], &[u8]); 61] = [
    (b":authority", b""),
    (b":method", b"GET"),
    (b":method", b"POST"),
    (b":path", b"/"),
    (b":path", b"/index.html"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"200"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"304"),
    (b":status", b"400"),
    (b":status", b"404"),
    (b":status", b"500"),
    (b"accept-charset", b""),
    (b"accept-encoding", b"gzip, deflate"),
    (b"accept-language", b""),
    (b"accept-ranges", b""),
    (b"accept", b""),
    (b"access-control-allow-origin", b""),
    (b"age", b""),
    (b"allow", b""),
    (b"authorization", b""),
    (b"cache-control", b""),
    (b"content-disposition", b""),
    (b"content-encoding", b""),
    (b"content-language", b""),
    (b"content-length", b""),
    (b"content-location", b""),
    (b"content-range", b""),
    (b"content-type", b""),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"expect", b""),
    (b"expires", b""),
    (b"from", b""),
    (b"host", b""),
    (b"if-match", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"if-range", b""),
    (b"if-unmodified-since", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"max-forwards", b""),
    (b"proxy-authenticate", b""),
    (b"proxy-authorization", b""),
    (b"range", b""),
    (b"referer", b""),
    (b"refresh", b""),
    (b"retry-after", b""),
    (b"server", b""),
    (b"set-cookie", b""),
    (b"strict-transport-security", b""),
    (b"transfer-encoding", b""),
    (b"user-agent", b""),
    (b"vary", b""),
    (b"via", b""),
    (b"www-authenticate", b""),
];

/// Number of static entries; dynamic indices start just past it.
pub const STATIC_TABLE_SIZE: usize = STATIC_TABLE.len();

/// Static entry by 1-based index.
pub fn static_entry(index: usize) -> Option<(&'static [u8], &'static [u8])> {
    if (1..=STATIC_TABLE_SIZE).contains(&index) {
        Some(STATIC_TABLE[index - 1])
    } else {
        None
    }
}

/// Static index for an exact (name, value) match.
pub fn static_find(name: &[u8], value: &[u8]) -> Option<usize> {
    STATIC_TABLE
        .iter()
        .position(|&(n, v)| n == name && v == value)
        .map(|i| i + 1)
}

/// Static index for the first entry with a matching name.
pub fn static_find_name(name: &[u8]) -> Option<usize> {
    STATIC_TABLE
        .iter()
        .position(|&(n, _)| n == name)
        .map(|i| i + 1)
}

/// The dynamic table: newest entry at index 1, FIFO eviction by the
/// RFC 7541 Section 4.1 size rule (32 bytes overhead per entry).
pub struct DynamicTable {
    entries: VecDeque<(Vec<u8>, Vec<u8>)>,
    max_size: usize,
    size: usize,
}

impl DynamicTable {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_size,
            size: 0,
        }
    }

    fn entry_size(name: &[u8], value: &[u8]) -> usize {
        32 + name.len() + value.len()
    }

    /// Change the size limit, evicting as needed.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict();
    }

    /// Entry by 1-based dynamic index (1 = newest).
    pub fn get(&self, index: usize) -> Option<(&[u8], &[u8])> {
        if index == 0 {
            return None;
        }
        self.entries
            .get(index - 1)
            .map(|(n, v)| (n.as_slice(), v.as_slice()))
    }

    /// Dynamic index for an exact match.
    pub fn find(&self, name: &[u8], value: &[u8]) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, v)| n == name && v == value)
            .map(|i| i + 1)
    }

    /// Dynamic index for the first name match.
    pub fn find_name(&self, name: &[u8]) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| i + 1)
    }

    /// Insert at the head, evicting from the tail. An entry larger than
    /// the whole table clears it (RFC 7541 Section 4.4).
    pub fn insert(&mut self, name: Vec<u8>, value: Vec<u8>) {
        let entry_size = Self::entry_size(&name, &value);
        if entry_size > self.max_size {
            self.entries.clear();
            self.size = 0;
            return;
        }
        self.size += entry_size;
        self.entries.push_front((name, value));
        self.evict();
    }

    fn evict(&mut self) {
        while self.size > self.max_size {
            if let Some((name, value)) = self.entries.pop_back() {
                self.size -= Self::entry_size(&name, &value);
            } else {
                self.size = 0;
                break;
            }
        }
    }
}
