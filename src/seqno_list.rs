// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `SeqnoList`: a compact, run-length-encoded ordered set of sequence
//! numbers, used both as the in-memory result of `Window::get_missing()`
//! and as the wire payload of an XMIT_REQ (§6.1).

use crate::header::{read_varlong, write_varlong, ByteReader};

/// Ordered, non-overlapping, non-adjacent set of inclusive `[start, end]`
/// ranges. Adjacent single seqnos collapse into one range so a long run of
/// missing messages costs a handful of bytes instead of one per seqno.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeqnoList {
    ranges: Vec<(u64, u64)>,
}

impl SeqnoList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a strictly ascending slice of distinct seqnos.
    pub fn from_sorted(seqnos: &[u64]) -> Self {
        let mut ranges: Vec<(u64, u64)> = Vec::new();
        for &s in seqnos {
            match ranges.last_mut() {
                Some((_, end)) if *end + 1 == s => *end = s,
                _ => ranges.push((s, s)),
            }
        }
        Self { ranges }
    }

    /// Expand back into an ascending `Vec<u64>`.
    pub fn to_seqnos(&self) -> Vec<u64> {
        let mut out = Vec::new();
        for &(start, end) in &self.ranges {
            out.extend(start..=end);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.iter().map(|(s, e)| (e - s + 1) as usize).sum()
    }

    /// Largest seqno in the list, if any.
    pub fn last(&self) -> Option<u64> {
        self.ranges.last().map(|&(_, end)| end)
    }

    /// Keep only entries `<= bound`.
    pub fn retain_le(&self, bound: u64) -> Self {
        let mut ranges = Vec::new();
        for &(start, end) in &self.ranges {
            if start > bound {
                break;
            }
            ranges.push((start, end.min(bound)));
        }
        Self { ranges }
    }

    /// Encode as `count` ranges, each `(start, run_length - 1)` varlong-pairs.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        write_varlong(buf, self.ranges.len() as u64);
        for &(start, end) in &self.ranges {
            write_varlong(buf, start);
            write_varlong(buf, end - start);
        }
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut r = ByteReader::new(bytes);
        let count = read_varlong(&mut r)?;
        let mut ranges = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let start = read_varlong(&mut r)?;
            let run = read_varlong(&mut r)?;
            ranges.push((start, start.checked_add(run)?));
        }
        Some(Self { ranges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_contiguous_runs() {
        let list = SeqnoList::from_sorted(&[4, 5, 6, 9, 10, 20]);
        assert_eq!(list.to_seqnos(), vec![4, 5, 6, 9, 10, 20]);
        assert_eq!(list.len(), 6);
    }

    #[test]
    fn roundtrip_encode_decode() {
        let list = SeqnoList::from_sorted(&[1, 2, 3, 100, 101, 500]);
        let mut buf = Vec::new();
        list.encode(&mut buf);
        let decoded = SeqnoList::decode(&buf).expect("decode");
        assert_eq!(decoded, list);
    }

    #[test]
    fn empty_roundtrip() {
        let list = SeqnoList::new();
        let mut buf = Vec::new();
        list.encode(&mut buf);
        assert_eq!(SeqnoList::decode(&buf), Some(list));
    }

    #[test]
    fn retain_le_truncates_ranges() {
        let list = SeqnoList::from_sorted(&[4, 5, 6, 9, 10]);
        let truncated = list.retain_le(5);
        assert_eq!(truncated.to_seqnos(), vec![4, 5]);
    }

    #[test]
    fn last_returns_max() {
        let list = SeqnoList::from_sorted(&[4, 5, 9]);
        assert_eq!(list.last(), Some(9));
    }
}
