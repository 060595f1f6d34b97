//! Codecs for GameCube/Wii J3D (BMD/BDL), Wii G3D (BRRES), Mario Kart Wii
//! course data (KMP/KCL), the small EGG lighting/fog binaries, and the
//! U8/RARC/Yaz0 container formats that wrap them.
//!
//! Every format module exposes one plain-data top-level type and
//! implements [`FormatCodec`] for it. A file read unchanged and written
//! back reproduces the source byte-for-byte, modulo the padding each
//! format's own writer is required to reproduce (see each module's docs).
//!
//! ```
//! use jstudio_formats::szs;
//!
//! let packed = szs::encode(b"ABABABABABAB");
//! let unpacked = szs::decode(&packed).unwrap();
//! assert_eq!(unpacked, b"ABABABABABAB");
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod bmd;
pub mod brres;
pub mod egg;
mod error;
pub mod gx_material;
pub mod kcl;
pub mod kmp;
pub mod szs;

pub use error::{ArchiveError, BmdError, BrresError, EggError, Error, KclError, KmpError, SzsError};

/// A format with a symmetric, round-trip-oriented read/write contract.
///
/// Named `read`/`write` rather than `parse`/`build` to match this domain's
/// own vocabulary ("a file read unchanged in memory and written back
/// reproduces the source file byte-for-byte"), but the shape mirrors any
/// parse/build pair: decode a byte buffer into a typed value, and encode
/// that value back into bytes.
pub trait FormatCodec: Sized {
    /// The error type this format's codec reports.
    type Error;

    /// Decode `data` into this type.
    fn read(data: &[u8]) -> Result<Self, Self::Error>;

    /// Encode this value back to bytes.
    fn write(&self) -> Result<Vec<u8>, Self::Error>;

    /// Decode then re-encode `data`, failing if the result differs.
    /// Default implementation is byte comparison; formats with
    /// known-lossy padding may override this.
    fn verify_round_trip(data: &[u8]) -> Result<(), String>
    where
        Self::Error: std::fmt::Display,
    {
        let parsed = Self::read(data).map_err(|e| e.to_string())?;
        let rebuilt = parsed.write().map_err(|e| e.to_string())?;
        if data != rebuilt.as_slice() {
            return Err("round-trip verification failed: bytes differ".to_string());
        }
        Ok(())
    }
}
