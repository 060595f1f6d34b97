//! Command-line surface: two invocation forms, one for importing a source
//! file into a supported document format and one for converting (rebuild,
//! optionally checked) between two files already in supported formats.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jstudio_document::MipmapPolicy;

#[derive(Parser)]
#[command(
    name = "jstudio",
    about = "Import and convert GameCube/Wii model, archive, and track binaries",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import `from` into a document, writing the result to `to` (defaults
    /// to `from` with its extension's canonical form).
    Import {
        from: PathBuf,
        to: Option<PathBuf>,

        #[command(flatten)]
        flags: ImportFlags,
    },

    /// Rebuild `from` into `to`, same format on both sides. With `check`,
    /// the rebuilt bytes are compared back against a fresh parse of `from`
    /// instead of just being written out.
    Convert {
        from: PathBuf,
        to: PathBuf,

        #[arg(long)]
        check: bool,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct ImportFlags {
    /// Emit debug-level logging in addition to the default.
    #[arg(long)]
    pub verbose: bool,

    #[arg(long)]
    pub scale: Option<f32>,

    #[arg(long)]
    pub brawlbox_scale: bool,

    /// `on`, `off`, or `min:<count>`.
    #[arg(long, value_parser = parse_mipmaps)]
    pub mipmaps: Option<MipmapPolicy>,

    #[arg(long)]
    pub auto_transparency: bool,

    #[arg(long)]
    pub merge_mats: bool,

    #[arg(long)]
    pub bake_uvs: bool,

    /// `#RRGGBB`.
    #[arg(long, value_parser = parse_tint)]
    pub tint: Option<[u8; 3]>,

    #[arg(long)]
    pub cull_degenerates: bool,

    #[arg(long)]
    pub cull_invalid: bool,

    #[arg(long)]
    pub recompute_normals: bool,

    #[arg(long)]
    pub fuse_vertices: bool,
}

impl ImportFlags {
    pub fn to_config(&self) -> jstudio_document::ImportConfig {
        let mut config = jstudio_document::ImportConfig { verbose: self.verbose, ..Default::default() };
        if let Some(scale) = self.scale {
            config.scale = scale;
        }
        config.brawlbox_scale = self.brawlbox_scale;
        if let Some(mipmaps) = self.mipmaps {
            config.mipmaps = mipmaps;
        }
        config.auto_transparency = self.auto_transparency;
        config.merge_mats = self.merge_mats;
        config.bake_uvs = self.bake_uvs;
        config.tint = self.tint;
        config.cull_degenerates = self.cull_degenerates;
        config.cull_invalid = self.cull_invalid;
        config.recompute_normals = self.recompute_normals;
        config.fuse_vertices = self.fuse_vertices;
        config
    }
}

fn parse_mipmaps(s: &str) -> Result<MipmapPolicy, String> {
    match s {
        "on" => Ok(MipmapPolicy::On),
        "off" => Ok(MipmapPolicy::Off),
        _ => {
            let count = s
                .strip_prefix("min:")
                .ok_or_else(|| format!("expected `on`, `off`, or `min:<count>`, got `{s}`"))?;
            let count: u32 = count.parse().map_err(|_| format!("invalid mipmap count in `{s}`"))?;
            Ok(MipmapPolicy::Min(count))
        }
    }
}

fn parse_tint(s: &str) -> Result<[u8; 3], String> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 {
        return Err(format!("expected `#RRGGBB`, got `{s}`"));
    }
    let byte = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|_| format!("invalid hex color `{s}`"))
    };
    Ok([byte(0..2)?, byte(2..4)?, byte(4..6)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mipmap_variants() {
        assert_eq!(parse_mipmaps("on").unwrap(), MipmapPolicy::On);
        assert_eq!(parse_mipmaps("off").unwrap(), MipmapPolicy::Off);
        assert_eq!(parse_mipmaps("min:4").unwrap(), MipmapPolicy::Min(4));
        assert!(parse_mipmaps("garbage").is_err());
    }

    #[test]
    fn parses_hex_tint_with_or_without_hash() {
        assert_eq!(parse_tint("#FF8000").unwrap(), [0xFF, 0x80, 0x00]);
        assert_eq!(parse_tint("00FF00").unwrap(), [0x00, 0xFF, 0x00]);
        assert!(parse_tint("#ZZZZZZ").is_err());
        assert!(parse_tint("#FFF").is_err());
    }
}
