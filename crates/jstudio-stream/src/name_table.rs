//! Deferred string table with back-patched references.
//!
//! Several formats (J3D's `INF1`/`JNT1`/`MAT3`, BRRES dictionaries) store
//! object names in one contiguous table and reference them elsewhere in the
//! file by offset. Writing that table requires knowing, before any bytes of
//! the table exist, how many forward references will eventually point into
//! it. `NameTable` decouples "I need a slot for this name" (available while
//! walking the in-memory model) from "lay the table out" (done once, after
//! every name has been seen), using [`crate::Writer::write_link`] for the
//! references themselves.

use crate::error::StreamResult;
use crate::writer::{FixupKind, Writer};

/// A handle identifying one reserved name slot. Pass it to
/// [`NameTable::link_label`] to get the label to use with
/// [`Writer::write_link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameSlot(usize);

/// Collects names in first-seen order and emits them as one NUL-separated
/// run, resolving earlier-reserved references as it goes.
#[derive(Debug, Default)]
pub struct NameTable {
    names: Vec<String>,
}

impl NameTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot for `name`, returning a handle to reference it with
    /// before the table itself is written. Does not deduplicate: formats
    /// that intentionally repeat a name (e.g. multiple bones named `"_"`)
    /// get one table entry per occurrence, matching on-disk behavior.
    pub fn reserve_name_slot(&mut self, name: impl Into<String>) -> NameSlot {
        let index = self.names.len();
        self.names.push(name.into());
        NameSlot(index)
    }

    /// Number of names reserved so far.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no names have been reserved.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The label to pass to [`Writer::write_link`] for a previously
    /// reserved slot.
    pub fn link_label(&self, slot: NameSlot) -> String {
        format!("nametable:{}", slot.0)
    }

    /// Write every reserved name, in reservation order, as NUL-terminated
    /// strings, defining each slot's label immediately before its bytes so
    /// that outstanding `write_link` calls resolve to the start of the
    /// string (not the table as a whole).
    pub fn emit(&self, w: &mut Writer) -> StreamResult<()> {
        for (index, name) in self.names.iter().enumerate() {
            w.define_label(format!("nametable:{index}"));
            w.c_string(name);
        }
        Ok(())
    }

    /// Reserve a slot and immediately write a forward link to it, returning
    /// the slot for later use with a second reference if needed. Width is
    /// always 4 here: no supported format back-references the name table
    /// with a 16-bit offset.
    pub fn reserve_and_link(&mut self, w: &mut Writer, name: impl Into<String>, base: u64) -> NameSlot {
        let slot = self.reserve_name_slot(name);
        w.write_link(self.link_label(slot), 4, FixupKind::Relative { base });
        slot
    }

    /// Names in reservation order, for read-side reconstruction where the
    /// on-disk order is already the decoded order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::Endian;

    #[test]
    fn emits_in_reservation_order() {
        let mut table = NameTable::new();
        table.reserve_name_slot("alpha");
        table.reserve_name_slot("beta");
        let mut w = Writer::new(Endian::Big);
        table.emit(&mut w).unwrap();
        let buf = w.finalize().unwrap();
        assert_eq!(buf, b"alpha\0beta\0");
    }

    #[test]
    fn reserved_links_resolve_to_string_start() {
        let mut table = NameTable::new();
        let mut w = Writer::new(Endian::Big);
        table.reserve_and_link(&mut w, "one", 0);
        let slot_two = table.reserve_and_link(&mut w, "two", 0);
        table.emit(&mut w).unwrap();
        assert_eq!(table.link_label(slot_two), "nametable:1");
        let buf = w.finalize().unwrap();
        let mut r = crate::Reader::new(&buf, Endian::Big);
        let first_offset = r.u32().unwrap();
        let second_offset = r.u32().unwrap();
        assert_eq!(first_offset, 8);
        assert_eq!(second_offset, 8 + 4);
        assert_eq!(r.c_string_at(first_offset as usize).unwrap(), "one");
        assert_eq!(r.c_string_at(second_offset as usize).unwrap(), "two");
    }

    #[test]
    fn allows_duplicate_names() {
        let mut table = NameTable::new();
        table.reserve_name_slot("dup");
        table.reserve_name_slot("dup");
        assert_eq!(table.len(), 2);
    }
}
