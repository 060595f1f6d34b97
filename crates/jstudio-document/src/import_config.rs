//! Caller-supplied import properties, fed to the `Configure` transaction
//! state. These mirror the CLI's import flags one-to-one; nothing here is
//! read from the environment.

/// Mipmap generation policy for imported textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MipmapPolicy {
    On,
    #[default]
    Off,
    Min(u32),
}

/// Properties an import transaction may consult. Every field defaults to
/// the behavior of importing with no flags at all.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    pub verbose: bool,
    pub scale: f32,
    pub brawlbox_scale: bool,
    pub mipmaps: MipmapPolicy,
    pub auto_transparency: bool,
    pub merge_mats: bool,
    pub bake_uvs: bool,
    pub tint: Option<[u8; 3]>,
    pub cull_degenerates: bool,
    pub cull_invalid: bool,
    pub recompute_normals: bool,
    pub fuse_vertices: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            scale: 1.0,
            brawlbox_scale: false,
            mipmaps: MipmapPolicy::default(),
            auto_transparency: false,
            merge_mats: false,
            bake_uvs: false,
            tint: None,
            cull_degenerates: false,
            cull_invalid: false,
            recompute_normals: false,
            fuse_vertices: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_a_flagless_import() {
        let config = ImportConfig::default();
        assert_eq!(config.scale, 1.0);
        assert_eq!(config.mipmaps, MipmapPolicy::Off);
        assert!(config.tint.is_none());
        assert!(!config.verbose);
    }
}
