//! Endian-aware binary stream primitives shared by every GameCube/Wii
//! asset codec in this workspace.
//!
//! This crate has no notion of any particular file format. It provides
//! the four pieces every format-specific crate builds on:
//!
//! - [`Reader`]/[`Writer`]: checked, position-tracked byte access with
//!   big/little endian primitives, checkpointed positions, and (on
//!   the write side) deferred offset fixups via [`writer::FixupKind`].
//! - [`NameTable`]: a deferred string table used by BMD, BRRES, and KMP.
//! - [`Dictionary`]: BRRES's indexed, bit-trie name lookup structure.
//! - [`display_list`]: the GX vertex command stream shared by J3D `SHP1`
//!   and G3D `MDL0` polygon data.
//!
//! ```
//! use binrw::Endian;
//! use jstudio_stream::Writer;
//!
//! let mut w = Writer::new(Endian::Big);
//! w.u32(0xCAFE_BABE);
//! let bytes = w.finalize().unwrap();
//! assert_eq!(bytes, 0xCAFE_BABEu32.to_be_bytes());
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod dictionary;
pub mod display_list;
mod error;
mod name_table;
mod reader;
mod writer;

pub use binrw::Endian;
pub use dictionary::{calc_dictionary_size, BuiltDictionary, DictNode, Dictionary};
pub use error::{StreamError, StreamResult};
pub use name_table::{NameSlot, NameTable};
pub use reader::Reader;
pub use writer::{FixupKind, Writer};
