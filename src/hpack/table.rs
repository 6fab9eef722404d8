//! The 61 static entries of RFC 7541 Appendix A, and the dynamic table
//! shared by one connection's encoder/decoder pair.

use std::collections::VecDeque;

pub(crate) static STATIC_TABLE: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

/// An ordered FIFO of (name, value) pairs, evicted from the oldest end
/// once the configured size budget is exceeded. Entry cost is
/// `len(name) + len(value) + 32` per RFC 7541 §4.1.
#[derive(Debug, Default)]
pub(crate) struct DynamicTable {
    entries: VecDeque<(String, String)>,
    size: usize,
    max_size: usize,
}

fn entry_size(name: &str, value: &str) -> usize {
    name.len() + value.len() + 32
}

impl DynamicTable {
    pub(crate) fn new(max_size: usize) -> Self {
        DynamicTable {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    pub(crate) fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict_to_budget();
    }

    pub(crate) fn max_size(&self) -> usize {
        self.max_size
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Inserts at dynamic index 62 (the newest entry, front of the deque),
    /// evicting from the oldest end until back under budget.
    pub(crate) fn insert(&mut self, name: String, value: String) {
        let added = entry_size(&name, &value);
        if added > self.max_size {
            self.entries.clear();
            self.size = 0;
            return;
        }
        self.entries.push_front((name, value));
        self.size += added;
        self.evict_to_budget();
    }

    fn evict_to_budget(&mut self) {
        while self.size > self.max_size {
            if let Some((name, value)) = self.entries.pop_back() {
                self.size -= entry_size(&name, &value);
            } else {
                break;
            }
        }
    }

    /// Dynamic-table portion of the combined index space: index 1 is the
    /// newest entry (dynamic index 62 in the combined space).
    pub(crate) fn get(&self, dyn_index: usize) -> Option<&(String, String)> {
        self.entries.get(dyn_index)
    }
}

/// Resolves a combined static+dynamic index (1-based, per RFC 7541 §2.3.3)
/// to a borrowed name/value pair.
pub(crate) fn lookup<'a>(
    index: usize,
    dynamic: &'a DynamicTable,
) -> Option<(&'a str, &'a str)> {
    if index == 0 {
        return None;
    }
    if index <= STATIC_TABLE.len() {
        let (name, value) = STATIC_TABLE[index - 1];
        return Some((name, value));
    }
    dynamic
        .get(index - STATIC_TABLE.len() - 1)
        .map(|(n, v)| (n.as_str(), v.as_str()))
}
