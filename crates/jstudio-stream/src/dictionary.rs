//! BRRES indexed dictionary: a bit-trie over name bytes.
//!
//! Every sub-resource group (`3DModels(NW4R)`, `Textures(NW4R)`, the nested
//! groups inside a `MDL0`, ...) is stored on disk as one of these: a root
//! record followed by one record per entry, where each record doubles as
//! both a leaf (holding a name/data pair) and, for all but the very first
//! inserted entry, a branch point distinguishing some later entry from an
//! earlier one. The split bit chosen at each insertion is exactly the
//! highest bit position at which the new name and its nearest existing
//! neighbor differ, tested MSB-first over the raw name bytes. Because the
//! split bit is a function of insertion history, not just the final name
//! set, two implementations that insert in a different order - or pick a
//! different tie-break when two candidate neighbors are equally close -
//! produce different (but equally valid) trees.

use crate::error::{StreamError, StreamResult};
use crate::writer::Writer;

const HEADER_SIZE: usize = 8;
const NODE_SIZE: usize = 20;

/// Byte size of an encoded dictionary with `n` entries, header included.
pub const fn calc_dictionary_size(n: usize) -> usize {
    HEADER_SIZE + NODE_SIZE * (n + 1)
}

fn bit_at(name: &[u8], bit_pos: u32) -> u8 {
    let byte_idx = (bit_pos / 8) as usize;
    let Some(&byte) = name.get(byte_idx) else {
        return 0;
    };
    let bit_in_byte = 7 - (bit_pos % 8);
    (byte >> bit_in_byte) & 1
}

fn first_diff_bit(a: &[u8], b: &[u8]) -> StreamResult<u16> {
    let bound = (a.len().max(b.len()) as u32 + 1) * 8;
    for pos in 0..bound {
        if bit_at(a, pos) != bit_at(b, pos) {
            return u16::try_from(pos).map_err(|_| StreamError::Malformed {
                site: "dictionary".to_string(),
                why: "name too long to index".to_string(),
            });
        }
    }
    Err(StreamError::Malformed {
        site: "dictionary".to_string(),
        why: "duplicate name inserted into dictionary".to_string(),
    })
}

#[derive(Debug, Clone, Copy)]
struct RawNode {
    id: u16,
    left: u32,
    right: u32,
}

/// One resolved node as it will be written to disk.
#[derive(Debug, Clone, Copy)]
pub struct DictNode {
    /// Bit position this node tests (meaningless for self-referencing
    /// leaf sides, but always present in the on-disk record).
    pub id: u16,
    /// Index of the left (bit = 0) child. Equal to this node's own index
    /// when the left side is this node's own entry.
    pub left: u32,
    /// Index of the right (bit = 1) child, same convention as `left`.
    pub right: u32,
}

/// An in-progress dictionary: names and opaque payloads, inserted in the
/// order they should be committed to the tree.
#[derive(Debug, Default)]
pub struct Dictionary<T> {
    entries: Vec<(String, T)>,
}

/// A dictionary after tree construction, ready to traverse or encode.
#[derive(Debug)]
pub struct BuiltDictionary<T> {
    /// `nodes[0]` is the root; `nodes[i]` for `i >= 1` corresponds to
    /// `entries[i - 1]`.
    pub nodes: Vec<DictNode>,
    /// Entries indexed the same way they were pushed.
    pub entries: Vec<(String, T)>,
}

impl<T> Dictionary<T> {
    /// An empty dictionary.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Queue `name`/`data` for insertion. Insertion order affects the
    /// resulting tree shape (see module docs) even though traversal order
    /// is always sorted by name bits.
    pub fn push(&mut self, name: impl Into<String>, data: T) {
        self.entries.push((name.into(), data));
    }

    /// Number of entries queued so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries have been queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the bit-trie. Root-relative sentinel id is `u16::MAX`; it is
    /// never compared against a real bit position because the root's only
    /// meaningful pointer (`left`) is followed unconditionally.
    pub fn build(self) -> StreamResult<BuiltDictionary<T>> {
        const ROOT: u32 = 0;
        let mut raw: Vec<RawNode> = vec![RawNode {
            id: u16::MAX,
            left: ROOT,
            right: ROOT,
        }];

        for (i, (name, _)) in self.entries.iter().enumerate() {
            let my_index = (i + 1) as u32;
            if i == 0 {
                raw[ROOT as usize].left = my_index;
                raw.push(RawNode {
                    id: u16::MAX,
                    left: my_index,
                    right: my_index,
                });
                continue;
            }

            // Pass 1: descend by name bits to the nearest existing entry.
            // The root's pointer is taken unconditionally; from then on we
            // stop as soon as we land on a leaf or the id stops increasing
            // (a back-reference, meaning we've gone as deep as this path
            // goes).
            let mut cur = ROOT;
            let mut next = raw[ROOT as usize].left;
            loop {
                let is_leaf = raw[next as usize].left == next && raw[next as usize].right == next;
                if is_leaf {
                    break;
                }
                if cur != ROOT && raw[next as usize].id <= raw[cur as usize].id {
                    break;
                }
                cur = next;
                let bit = bit_at(name.as_bytes(), u32::from(raw[cur as usize].id));
                next = if bit == 0 { raw[cur as usize].left } else { raw[cur as usize].right };
            }
            let neighbor = &self.entries[(next - 1) as usize].0;
            let diff_bit = first_diff_bit(name.as_bytes(), neighbor.as_bytes())?;

            // Pass 2: re-descend to find where diff_bit belongs in the chain.
            let mut cur = ROOT;
            loop {
                let child = raw[cur as usize].left;
                let is_first_step = cur == ROOT;
                let child = if is_first_step {
                    child
                } else {
                    let bit = bit_at(name.as_bytes(), u32::from(raw[cur as usize].id));
                    if bit == 0 { raw[cur as usize].left } else { raw[cur as usize].right }
                };
                let child_is_leaf = raw[child as usize].left == child && raw[child as usize].right == child;
                if child_is_leaf || raw[child as usize].id > diff_bit {
                    let new_bit = bit_at(name.as_bytes(), u32::from(diff_bit));
                    let node = if new_bit == 0 {
                        RawNode { id: diff_bit, left: my_index, right: child }
                    } else {
                        RawNode { id: diff_bit, left: child, right: my_index }
                    };
                    if is_first_step {
                        raw[ROOT as usize].left = my_index;
                    } else {
                        let bit = bit_at(name.as_bytes(), u32::from(raw[cur as usize].id));
                        if bit == 0 {
                            raw[cur as usize].left = my_index;
                        } else {
                            raw[cur as usize].right = my_index;
                        }
                    }
                    raw.push(node);
                    break;
                }
                cur = child;
            }
        }

        let nodes = raw
            .into_iter()
            .map(|n| DictNode { id: n.id, left: n.left, right: n.right })
            .collect();
        Ok(BuiltDictionary { nodes, entries: self.entries })
    }
}

impl<T> BuiltDictionary<T> {
    /// Visit every entry in bit-sorted (on-disk traversal) order.
    pub fn in_order(&self) -> Vec<&(String, T)> {
        let mut out = Vec::with_capacity(self.entries.len());
        if !self.nodes.is_empty() {
            self.visit(self.nodes[0].left, &mut out);
        }
        out
    }

    fn visit<'a>(&'a self, idx: u32, out: &mut Vec<&'a (String, T)>) {
        let node = &self.nodes[idx as usize];
        if node.left == idx && node.right == idx {
            out.push(&self.entries[(idx - 1) as usize]);
            return;
        }
        if node.left == idx {
            out.push(&self.entries[(idx - 1) as usize]);
        } else {
            self.visit(node.left, out);
        }
        if node.right == idx {
            out.push(&self.entries[(idx - 1) as usize]);
        } else {
            self.visit(node.right, out);
        }
    }

    /// Write the header and node table. `write_entry` is called once per
    /// node in storage order (root first) and must append the 8 remaining
    /// bytes of that node's record (name offset, then data offset) itself,
    /// since those references depend on sections this crate doesn't own.
    pub fn emit(
        &self,
        w: &mut Writer,
        mut write_entry_refs: impl FnMut(&mut Writer, usize) -> StreamResult<()>,
    ) -> StreamResult<()> {
        w.u32(calc_dictionary_size(self.entries.len()) as u32);
        w.u32(self.entries.len() as u32);
        for (index, node) in self.nodes.iter().enumerate() {
            w.u16(node.id);
            w.u16(0); // reserved flag field, unused by this tree shape
            w.u32(node.left);
            w.u32(node.right);
            write_entry_refs(w, index)?;
        }
        Ok(())
    }
}

impl<T> Default for Dictionary<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calc_size_matches_header_plus_nodes() {
        assert_eq!(calc_dictionary_size(3), 8 + 20 * 4);
    }

    #[test]
    fn traversal_matches_insertion_order_for_a_ab_b() {
        let mut dict = Dictionary::new();
        dict.push("a", 1u32);
        dict.push("ab", 2u32);
        dict.push("b", 3u32);
        let built = dict.build().unwrap();
        let order: Vec<&str> = built.in_order().iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(order, vec!["a", "ab", "b"]);
    }

    #[test]
    fn single_entry_builds_a_pure_leaf() {
        let mut dict = Dictionary::new();
        dict.push("only", 0u32);
        let built = dict.build().unwrap();
        assert_eq!(built.nodes.len(), 2);
        let order: Vec<&str> = built.in_order().iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(order, vec!["only"]);
    }
}
