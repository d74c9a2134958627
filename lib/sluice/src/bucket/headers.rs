//! An ordered, case-insensitive header multimap that can also emit itself
//! as HTTP header bytes.

use crate::bucket::{scan_line, Bucket, Chunk, Fill, Line};
use crate::status::Result;
use indexmap::map::IndexMap;
use indexmap::Equivalent;
use std::hash::{Hash, Hasher};

/// Stored header name. Preserves the spelling it was first set with;
/// hashing and equality fold ASCII case.
#[derive(Clone, Debug)]
struct HeaderName(String);

impl PartialEq for HeaderName {
    #[inline]
    fn eq(&self, other: &HeaderName) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for HeaderName {}

impl Hash for HeaderName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_folded(&self.0, state);
    }
}

/// Borrowed lookup key with the same hash scheme as `HeaderName`.
struct Lookup<'a>(&'a str);

impl<'a> Hash for Lookup<'a> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_folded(self.0, state);
    }
}

impl<'a> Equivalent<HeaderName> for Lookup<'a> {
    #[inline]
    fn equivalent(&self, key: &HeaderName) -> bool {
        self.0.eq_ignore_ascii_case(&key.0)
    }
}

fn hash_folded<H: Hasher>(name: &str, state: &mut H) {
    for &byte in name.as_bytes() {
        state.write_u8(byte.to_ascii_lowercase());
    }
    state.write_u8(0xff);
}

/// Ordered multimap of HTTP headers. Insertion order is preserved for
/// emission; setting an existing key joins the values with a comma.
/// Reading through the bucket protocol drains the serialized form:
/// `Name: value CRLF` per entry plus the terminating blank line.
pub struct HeadersBucket {
    entries: IndexMap<HeaderName, String>,
    serialized: Option<Vec<u8>>,
    pos: usize,
}

impl HeadersBucket {
    #[inline]
    pub fn new() -> HeadersBucket {
        HeadersBucket {
            entries: IndexMap::new(),
            serialized: None,
            pos: 0,
        }
    }

    /// Set a header. A repeated name (any casing) appends the new value to
    /// the existing one, comma-separated. Mutating after emission began
    /// restarts emission from the top.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.get_mut(&Lookup(name)) {
            Some(existing) => {
                existing.push(',');
                existing.push_str(value);
            }
            None => {
                self.entries.insert(HeaderName(name.to_owned()), value.to_owned());
            }
        }

        self.serialized = None;
        self.pos = 0;
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&Lookup(name)).map(String::as_str)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&Lookup(name))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.0.as_str(), value.as_str()))
    }

    /// The full serialized block, terminator line included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, value) in &self.entries {
            out.extend_from_slice(name.0.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    fn remaining(&mut self) -> &[u8] {
        if self.serialized.is_none() {
            self.serialized = Some(self.to_bytes());
        }

        let serialized = self
            .serialized
            .as_ref()
            .expect("Serialized headers must be present");
        &serialized[self.pos..]
    }

    #[inline]
    fn fill_state(&self) -> Fill {
        match &self.serialized {
            Some(serialized) if self.pos == serialized.len() => Fill::Eof,
            _ => Fill::More,
        }
    }
}

impl Bucket for HeadersBucket {
    fn read(&mut self, max: usize) -> Result<Chunk<'_>> {
        let take = self.remaining().len().min(max);
        self.pos += take;

        let fill = self.fill_state();
        let serialized = self
            .serialized
            .as_ref()
            .expect("Serialized headers must be present");

        Ok(Chunk {
            data: &serialized[self.pos - take..self.pos],
            fill,
        })
    }

    fn readline(&mut self, accept: u8) -> Result<Line<'_>> {
        let (take, end) = scan_line(self.remaining(), accept);
        self.pos += take;

        let fill = self.fill_state();
        let serialized = self
            .serialized
            .as_ref()
            .expect("Serialized headers must be present");

        Ok(Line {
            data: &serialized[self.pos - take..self.pos],
            end,
            fill,
        })
    }

    fn peek(&mut self) -> Result<Chunk<'_>> {
        let _ = self.remaining();
        let serialized = self
            .serialized
            .as_ref()
            .expect("Serialized headers must be present");

        Ok(Chunk {
            data: &serialized[self.pos..],
            fill: Fill::Eof,
        })
    }
}
