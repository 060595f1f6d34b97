//! Small EGG (Wii runtime library) configuration binaries: lighting
//! (`BLIGHT`), light-projected textures (`BLMAP`), fog (`BFG`), depth of
//! field (`BDOF`), and billboard lens flares (`BBLM`). Each is a fixed
//! header plus an array of fixed-size records; every field is read and
//! written in declaration order with no derived or optional data.

use jstudio_stream::{Reader, StreamResult, Writer};

use crate::error::EggError;

fn read_color(r: &mut Reader<'_>) -> StreamResult<(u8, u8, u8, u8)> {
    Ok((r.u8()?, r.u8()?, r.u8()?, r.u8()?))
}

fn write_color(w: &mut Writer, c: (u8, u8, u8, u8)) {
    w.u8(c.0);
    w.u8(c.1);
    w.u8(c.2);
    w.u8(c.3);
}

/// A single light entry (`LOBJ`) inside a `Blight`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightObject {
    pub spot_function: u8,
    pub dist_atten_function: u8,
    pub coord_space: u8,
    pub light_type: u8,
    pub ambient_light_index: u16,
    pub flags: u16,
    pub position: (f32, f32, f32),
    pub aim: (f32, f32, f32),
    pub intensity: f32,
    pub color: (u8, u8, u8, u8),
    pub specular_color: (u8, u8, u8, u8),
    pub spot_cutoff_angle: f32,
    pub ref_dist: f32,
    pub ref_brightness: f32,
    pub snap_target_index: u16,
}

impl LightObject {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        r.magic(b"LOBJ")?;
        let _size = r.u32()?;
        let _version = r.u8()?;
        r.skip(3)?;
        let _reserved = r.u32()?;
        let spot_function = r.u8()?;
        let dist_atten_function = r.u8()?;
        let coord_space = r.u8()?;
        let light_type = r.u8()?;
        let ambient_light_index = r.u16()?;
        let flags = r.u16()?;
        let position = (r.f32()?, r.f32()?, r.f32()?);
        let aim = (r.f32()?, r.f32()?, r.f32()?);
        let intensity = r.f32()?;
        let color = read_color(r)?;
        let specular_color = read_color(r)?;
        let spot_cutoff_angle = r.f32()?;
        let ref_dist = r.f32()?;
        let ref_brightness = r.f32()?;
        r.skip(4)?;
        let snap_target_index = r.u16()?;
        r.skip(2)?;
        Ok(Self {
            spot_function,
            dist_atten_function,
            coord_space,
            light_type,
            ambient_light_index,
            flags,
            position,
            aim,
            intensity,
            color,
            specular_color,
            spot_cutoff_angle,
            ref_dist,
            ref_brightness,
            snap_target_index,
        })
    }

    fn write(self, w: &mut Writer) {
        w.bytes(b"LOBJ");
        w.u32(0x50);
        w.u8(2);
        w.pad(3, |_| 0);
        w.u32(0);
        w.u8(self.spot_function);
        w.u8(self.dist_atten_function);
        w.u8(self.coord_space);
        w.u8(self.light_type);
        w.u16(self.ambient_light_index);
        w.u16(self.flags);
        w.f32(self.position.0);
        w.f32(self.position.1);
        w.f32(self.position.2);
        w.f32(self.aim.0);
        w.f32(self.aim.1);
        w.f32(self.aim.2);
        w.f32(self.intensity);
        write_color(w, self.color);
        write_color(w, self.specular_color);
        w.f32(self.spot_cutoff_angle);
        w.f32(self.ref_dist);
        w.f32(self.ref_brightness);
        w.u32(0);
        w.u16(self.snap_target_index);
        w.u16(0);
    }
}

/// An ambient light color paired with each [`LightObject::ambient_light_index`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientObject {
    pub color: (u8, u8, u8, u8),
}

impl AmbientObject {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        let color = read_color(r)?;
        r.skip(4)?;
        Ok(Self { color })
    }

    fn write(self, w: &mut Writer) {
        write_color(w, self.color);
        w.pad(4, |_| 0);
    }
}

/// A scene lighting set (`LGHT`).
#[derive(Debug, Clone, PartialEq)]
pub struct Blight {
    pub light_objects: Vec<LightObject>,
    pub ambient_objects: Vec<AmbientObject>,
    pub back_color: (u8, u8, u8, u8),
}

impl Blight {
    /// Decode a `.blight` file.
    pub fn read(data: &[u8]) -> Result<Self, EggError> {
        let mut r = Reader::new(data, binrw::Endian::Big);
        r.magic(b"LGHT")?;
        let _file_size = r.u32()?;
        let version = r.u8()?;
        if version != 2 {
            return Err(EggError::UnsupportedVersion { kind: "BLIGHT", version: u32::from(version) });
        }
        r.skip(7)?;
        let light_object_count = r.u16()?;
        let ambient_object_count = r.u16()?;
        let back_color = read_color(&mut r)?;
        r.skip(16)?;

        r.seek_to(0x28)?;
        let light_objects = r.read_array(light_object_count as usize, LightObject::read)?;
        let ambient_objects = r.read_array(ambient_object_count as usize, AmbientObject::read)?;
        Ok(Self { light_objects, ambient_objects, back_color })
    }

    /// Encode back to a `.blight` file.
    pub fn write(&self) -> Vec<u8> {
        let mut w = Writer::new(binrw::Endian::Big);
        w.bytes(b"LGHT");
        let size = 0x28 + 0x50 * self.light_objects.len() as u32 + 8 * self.ambient_objects.len() as u32;
        w.u32(size);
        w.u8(2);
        w.pad(7, |_| 0);
        w.u16(self.light_objects.len() as u16);
        w.u16(self.ambient_objects.len() as u16);
        write_color(&mut w, self.back_color);
        w.pad(16, |_| 0);
        for light in &self.light_objects {
            light.write(&mut w);
        }
        for ambient in &self.ambient_objects {
            ambient.write(&mut w);
        }
        w.finalize().expect("blight encoding defines no deferred links")
    }
}

/// One drawing pass of a light-projected texture (`BLMAP`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlmapDrawSetting {
    pub norm_effect_scale: f32,
    pub pattern: u8,
}

/// A single light-projected texture entry (`BLMAP`).
#[derive(Debug, Clone, PartialEq)]
pub struct LightTexture {
    pub base_layer: u8,
    pub active_draw_settings: u8,
    pub texture_name: String,
    pub draw_settings: Vec<BlmapDrawSetting>,
}

/// A `.blmap` file: one texture-name-keyed table of light projections.
#[derive(Debug, Clone, PartialEq)]
pub struct Blmap {
    pub textures: Vec<LightTexture>,
}

const BLMAP_NAME_LEN: usize = 0x14;
const BLMAP_MAX_DRAW_SETTINGS: usize = 4;

impl Blmap {
    /// Decode a `.blmap` file.
    pub fn read(data: &[u8]) -> Result<Self, EggError> {
        let mut r = Reader::new(data, binrw::Endian::Big);
        r.magic(b"LMAP")?;
        let _file_size = r.u32()?;
        let version = r.u8()?;
        if version != 1 {
            return Err(EggError::UnsupportedVersion { kind: "BLMAP", version: u32::from(version) });
        }
        r.skip(3)?;
        let texture_count = r.u32()?;
        let textures = r.read_array(texture_count as usize, |r| {
            let base_layer = r.u8()?;
            let active_draw_settings = r.u8()?;
            r.skip(2)?;
            let name_bytes = r.bytes(BLMAP_NAME_LEN)?;
            let texture_name = String::from_utf8_lossy(
                &name_bytes[..name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len())],
            )
            .into_owned();
            let draw_settings = r.read_array(BLMAP_MAX_DRAW_SETTINGS, |r| {
                Ok(BlmapDrawSetting { norm_effect_scale: r.f32()?, pattern: { let p = r.u8()?; r.skip(3)?; p } })
            })?;
            Ok(LightTexture { base_layer, active_draw_settings, texture_name, draw_settings })
        })?;
        Ok(Self { textures })
    }

    /// Encode back to a `.blmap` file.
    pub fn write(&self) -> Vec<u8> {
        let mut w = Writer::new(binrw::Endian::Big);
        w.bytes(b"LMAP");
        let size = 0xC + self.textures.len() as u32 * (4 + BLMAP_NAME_LEN as u32 + BLMAP_MAX_DRAW_SETTINGS as u32 * 8);
        w.u32(size);
        w.u8(1);
        w.pad(3, |_| 0);
        w.u32(self.textures.len() as u32);
        for tex in &self.textures {
            w.u8(tex.base_layer);
            w.u8(tex.active_draw_settings);
            w.pad(2, |_| 0);
            let mut name_bytes = tex.texture_name.clone().into_bytes();
            name_bytes.resize(BLMAP_NAME_LEN, 0);
            w.bytes(&name_bytes);
            for i in 0..BLMAP_MAX_DRAW_SETTINGS {
                let setting = tex.draw_settings.get(i).copied().unwrap_or(BlmapDrawSetting { norm_effect_scale: 0.0, pattern: 0 });
                w.f32(setting.norm_effect_scale);
                w.u8(setting.pattern);
                w.pad(3, |_| 0);
            }
        }
        w.finalize().expect("blmap encoding defines no deferred links")
    }
}

/// One fog configuration (`BFG`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogEntry {
    pub fog_type: i32,
    pub enabled: bool,
    pub start_z: f32,
    pub end_z: f32,
    pub color: u32,
    pub center: i32,
    pub fade_speed: f32,
}

/// A `.bfg` file: a flat array of fog configurations.
#[derive(Debug, Clone, PartialEq)]
pub struct Bfg {
    pub entries: Vec<FogEntry>,
}

impl Bfg {
    /// Decode a `.bfg` file.
    pub fn read(data: &[u8]) -> Result<Self, EggError> {
        let mut r = Reader::new(data, binrw::Endian::Big);
        r.magic(b"bfg1")?;
        let _file_size = r.u32()?;
        let entry_count = r.u32()?;
        let entries = r.read_array(entry_count as usize, |r| {
            Ok(FogEntry {
                fog_type: r.i32()?,
                enabled: r.u32()? != 0,
                start_z: r.f32()?,
                end_z: r.f32()?,
                color: r.u32()?,
                center: r.i32()?,
                fade_speed: r.f32()?,
            })
        })?;
        Ok(Self { entries })
    }

    /// Encode back to a `.bfg` file.
    pub fn write(&self) -> Vec<u8> {
        let mut w = Writer::new(binrw::Endian::Big);
        w.bytes(b"bfg1");
        w.u32(0xC + self.entries.len() as u32 * 28);
        w.u32(self.entries.len() as u32);
        for entry in &self.entries {
            w.i32(entry.fog_type);
            w.u32(u32::from(entry.enabled));
            w.f32(entry.start_z);
            w.f32(entry.end_z);
            w.u32(entry.color);
            w.i32(entry.center);
            w.f32(entry.fade_speed);
        }
        w.finalize().expect("bfg encoding defines no deferred links")
    }
}

/// One depth-of-field keyframe (`BDOF`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DofEntry {
    pub enabled: bool,
    pub near_z: f32,
    pub far_z: f32,
    pub fuzziness: f32,
}

/// A `.bdof` file.
#[derive(Debug, Clone, PartialEq)]
pub struct Bdof {
    pub entries: Vec<DofEntry>,
}

impl Bdof {
    /// Decode a `.bdof` file.
    pub fn read(data: &[u8]) -> Result<Self, EggError> {
        let mut r = Reader::new(data, binrw::Endian::Big);
        r.magic(b"bdf1")?;
        let _file_size = r.u32()?;
        let entry_count = r.u32()?;
        let entries = r.read_array(entry_count as usize, |r| {
            Ok(DofEntry { enabled: r.u32()? != 0, near_z: r.f32()?, far_z: r.f32()?, fuzziness: r.f32()? })
        })?;
        Ok(Self { entries })
    }

    /// Encode back to a `.bdof` file.
    pub fn write(&self) -> Vec<u8> {
        let mut w = Writer::new(binrw::Endian::Big);
        w.bytes(b"bdf1");
        w.u32(0xC + self.entries.len() as u32 * 16);
        w.u32(self.entries.len() as u32);
        for entry in &self.entries {
            w.u32(u32::from(entry.enabled));
            w.f32(entry.near_z);
            w.f32(entry.far_z);
            w.f32(entry.fuzziness);
        }
        w.finalize().expect("bdof encoding defines no deferred links")
    }
}

/// One billboard lens-flare layer (`BBLM`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlmEntry {
    pub texture_index: u16,
    pub flags: u16,
    pub scale: f32,
    pub color: (u8, u8, u8, u8),
}

/// A `.bblm` file.
#[derive(Debug, Clone, PartialEq)]
pub struct Bblm {
    pub entries: Vec<BlmEntry>,
}

impl Bblm {
    /// Decode a `.bblm` file.
    pub fn read(data: &[u8]) -> Result<Self, EggError> {
        let mut r = Reader::new(data, binrw::Endian::Big);
        r.magic(b"blm1")?;
        let _file_size = r.u32()?;
        let entry_count = r.u32()?;
        let entries = r.read_array(entry_count as usize, |r| {
            Ok(BlmEntry { texture_index: r.u16()?, flags: r.u16()?, scale: r.f32()?, color: read_color(r)? })
        })?;
        Ok(Self { entries })
    }

    /// Encode back to a `.bblm` file.
    pub fn write(&self) -> Vec<u8> {
        let mut w = Writer::new(binrw::Endian::Big);
        w.bytes(b"blm1");
        w.u32(0xC + self.entries.len() as u32 * 12);
        w.u32(self.entries.len() as u32);
        for entry in &self.entries {
            w.u16(entry.texture_index);
            w.u16(entry.flags);
            w.f32(entry.scale);
            write_color(&mut w, entry.color);
        }
        w.finalize().expect("bblm encoding defines no deferred links")
    }
}

impl crate::FormatCodec for Blight {
    type Error = EggError;

    fn read(data: &[u8]) -> Result<Self, Self::Error> {
        Self::read(data)
    }

    fn write(&self) -> Result<Vec<u8>, Self::Error> {
        Ok(self.write())
    }
}

impl crate::FormatCodec for Blmap {
    type Error = EggError;

    fn read(data: &[u8]) -> Result<Self, Self::Error> {
        Self::read(data)
    }

    fn write(&self) -> Result<Vec<u8>, Self::Error> {
        Ok(self.write())
    }
}

impl crate::FormatCodec for Bfg {
    type Error = EggError;

    fn read(data: &[u8]) -> Result<Self, Self::Error> {
        Self::read(data)
    }

    fn write(&self) -> Result<Vec<u8>, Self::Error> {
        Ok(self.write())
    }
}

impl crate::FormatCodec for Bdof {
    type Error = EggError;

    fn read(data: &[u8]) -> Result<Self, Self::Error> {
        Self::read(data)
    }

    fn write(&self) -> Result<Vec<u8>, Self::Error> {
        Ok(self.write())
    }
}

impl crate::FormatCodec for Bblm {
    type Error = EggError;

    fn read(data: &[u8]) -> Result<Self, Self::Error> {
        Self::read(data)
    }

    fn write(&self) -> Result<Vec<u8>, Self::Error> {
        Ok(self.write())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blight_roundtrips_lights_and_ambients() {
        let blight = Blight {
            light_objects: vec![LightObject {
                spot_function: 0,
                dist_atten_function: 0,
                coord_space: 0,
                light_type: 1,
                ambient_light_index: 0,
                flags: 0x0AE3,
                position: (-10000.0, 10000.0, 10000.0),
                aim: (0.0, 0.0, 0.0),
                intensity: 1.0,
                color: (0xFF, 0xFF, 0xFF, 0xFF),
                specular_color: (0, 0, 0, 0xFF),
                spot_cutoff_angle: 90.0,
                ref_dist: 0.5,
                ref_brightness: 0.5,
                snap_target_index: 0,
            }],
            ambient_objects: vec![AmbientObject { color: (0x64, 0x64, 0x64, 0xFF) }],
            back_color: (0, 0, 0, 0xFF),
        };
        let bytes = blight.write();
        let decoded = Blight::read(&bytes).unwrap();
        assert_eq!(decoded, blight);
    }

    #[test]
    fn blight_rejects_unsupported_version() {
        let mut w = Writer::new(binrw::Endian::Big);
        w.bytes(b"LGHT");
        w.u32(0x28);
        w.u8(9);
        w.pad(7, |_| 0);
        w.u16(0);
        w.u16(0);
        write_color(&mut w, (0, 0, 0, 0xFF));
        w.pad(16, |_| 0);
        let bytes = w.finalize().unwrap();
        assert!(Blight::read(&bytes).is_err());
    }

    #[test]
    fn blmap_roundtrips_texture_and_draw_settings() {
        let blmap = Blmap {
            textures: vec![LightTexture {
                base_layer: 1,
                active_draw_settings: 0b0101,
                texture_name: "proj01".to_string(),
                draw_settings: vec![
                    BlmapDrawSetting { norm_effect_scale: 0.5, pattern: 2 },
                    BlmapDrawSetting { norm_effect_scale: 0.0, pattern: 0 },
                ],
            }],
        };
        let bytes = blmap.write();
        let decoded = Blmap::read(&bytes).unwrap();
        assert_eq!(decoded, blmap);
    }

    #[test]
    fn bfg_roundtrips() {
        let bfg = Bfg {
            entries: vec![FogEntry {
                fog_type: 1,
                enabled: true,
                start_z: 100.0,
                end_z: 10000.0,
                color: 0x0000_00FF,
                center: 0,
                fade_speed: 0.1,
            }],
        };
        let bytes = bfg.write();
        assert_eq!(Bfg::read(&bytes).unwrap(), bfg);
    }

    #[test]
    fn bdof_roundtrips() {
        let bdof = Bdof { entries: vec![DofEntry { enabled: true, near_z: 1.0, far_z: 1000.0, fuzziness: 0.2 }] };
        let bytes = bdof.write();
        assert_eq!(Bdof::read(&bytes).unwrap(), bdof);
    }

    #[test]
    fn bblm_roundtrips() {
        let bblm = Bblm { entries: vec![BlmEntry { texture_index: 0, flags: 1, scale: 1.0, color: (255, 255, 255, 255) }] };
        let bytes = bblm.write();
        assert_eq!(Bblm::read(&bytes).unwrap(), bblm);
    }
}
