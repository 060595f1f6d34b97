//! GX material configuration: the cull/Z state, TEV color-combiner stages,
//! and texture-coordinate generators shared by J3D `MAT3` and BRRES `MDL0`
//! materials.
//!
//! This module stores the GPU configuration bit-for-bit; it does not
//! evaluate the TEV math. A renderer would need to interpret `TevStage`
//! against actual texture/rasterizer state, but no renderer lives in this
//! crate, so every field here exists purely to round-trip.

use jstudio_stream::{Reader, StreamResult, Writer};

/// Which polygon faces are culled before rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    /// Draw both faces.
    #[default]
    None,
    /// Cull faces wound clockwise in screen space.
    Front,
    /// Cull faces wound counter-clockwise in screen space.
    Back,
    /// Draw nothing.
    All,
}

impl CullMode {
    fn from_u32(v: u32) -> StreamResult<Self> {
        Ok(match v {
            0 => Self::None,
            1 => Self::Front,
            2 => Self::Back,
            3 => Self::All,
            other => {
                return Err(jstudio_stream::StreamError::InvalidEnumValue {
                    name: "CullMode".to_string(),
                    value: other,
                    offset: 0,
                })
            }
        })
    }

    fn to_u32(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Front => 1,
            Self::Back => 2,
            Self::All => 3,
        }
    }
}

/// GX depth-compare function, shared by `ZMode` and TEV alpha-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

impl CompareFunction {
    fn from_u8(v: u8) -> StreamResult<Self> {
        Ok(match v {
            0 => Self::Never,
            1 => Self::Less,
            2 => Self::Equal,
            3 => Self::LessOrEqual,
            4 => Self::Greater,
            5 => Self::NotEqual,
            6 => Self::GreaterOrEqual,
            7 => Self::Always,
            other => {
                return Err(jstudio_stream::StreamError::InvalidEnumValue {
                    name: "CompareFunction".to_string(),
                    value: u32::from(other),
                    offset: 0,
                })
            }
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Never => 0,
            Self::Less => 1,
            Self::Equal => 2,
            Self::LessOrEqual => 3,
            Self::Greater => 4,
            Self::NotEqual => 5,
            Self::GreaterOrEqual => 6,
            Self::Always => 7,
        }
    }
}

/// Depth-test configuration: compare function plus whether a passing
/// fragment updates the depth buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZMode {
    pub compare_enable: bool,
    pub function: CompareFunction,
    pub update_enable: bool,
}

impl Default for ZMode {
    fn default() -> Self {
        Self { compare_enable: true, function: CompareFunction::LessOrEqual, update_enable: true }
    }
}

impl ZMode {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        let compare_enable = r.u8()? != 0;
        let function = CompareFunction::from_u8(r.u8()?)?;
        let update_enable = r.u8()? != 0;
        Ok(Self { compare_enable, function, update_enable })
    }

    fn write(self, w: &mut Writer) {
        w.u8(u8::from(self.compare_enable));
        w.u8(self.function.to_u8());
        w.u8(u8::from(self.update_enable));
    }
}

/// Source a texture-coordinate generator reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexGenSource {
    Position,
    Normal,
    Tex(u8),
    Color0,
    Color1,
}

impl TexGenSource {
    fn from_u8(v: u8) -> StreamResult<Self> {
        Ok(match v {
            0 => Self::Position,
            1 => Self::Normal,
            2..=9 => Self::Tex(v - 2),
            10 => Self::Color0,
            11 => Self::Color1,
            other => {
                return Err(jstudio_stream::StreamError::InvalidEnumValue {
                    name: "TexGenSource".to_string(),
                    value: u32::from(other),
                    offset: 0,
                })
            }
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Position => 0,
            Self::Normal => 1,
            Self::Tex(n) => n + 2,
            Self::Color0 => 10,
            Self::Color1 => 11,
        }
    }
}

/// Dimensionality and projection of a texture-coordinate generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexGenType {
    Matrix3x4,
    Matrix2x4,
    Bump(u8),
    SRTG,
}

impl TexGenType {
    fn from_u8(v: u8) -> StreamResult<Self> {
        Ok(match v {
            0 => Self::Matrix3x4,
            1 => Self::Matrix2x4,
            2..=9 => Self::Bump(v - 2),
            10 => Self::SRTG,
            other => {
                return Err(jstudio_stream::StreamError::InvalidEnumValue {
                    name: "TexGenType".to_string(),
                    value: u32::from(other),
                    offset: 0,
                })
            }
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Matrix3x4 => 0,
            Self::Matrix2x4 => 1,
            Self::Bump(n) => n + 2,
            Self::SRTG => 10,
        }
    }
}

/// One texture-coordinate generator: which input it projects and with
/// which matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexGen {
    pub source: TexGenSource,
    pub ty: TexGenType,
    pub matrix: u8,
}

impl TexGen {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        let ty = TexGenType::from_u8(r.u8()?)?;
        let source = TexGenSource::from_u8(r.u8()?)?;
        let matrix = r.u8()?;
        Ok(Self { source, ty, matrix })
    }

    fn write(self, w: &mut Writer) {
        w.u8(self.ty.to_u8());
        w.u8(self.source.to_u8());
        w.u8(self.matrix);
    }
}

/// Color input selector for a TEV color-combiner stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TevColorArg {
    CPrev,
    APrev,
    C0,
    A0,
    C1,
    A1,
    C2,
    A2,
    TexColor,
    TexAlpha,
    RasColor,
    RasAlpha,
    One,
    Half,
    Konst,
    Zero,
}

impl TevColorArg {
    const ORDER: [Self; 16] = [
        Self::CPrev,
        Self::APrev,
        Self::C0,
        Self::A0,
        Self::C1,
        Self::A1,
        Self::C2,
        Self::A2,
        Self::TexColor,
        Self::TexAlpha,
        Self::RasColor,
        Self::RasAlpha,
        Self::One,
        Self::Half,
        Self::Konst,
        Self::Zero,
    ];

    fn from_u8(v: u8) -> StreamResult<Self> {
        Self::ORDER.get(v as usize).copied().ok_or_else(|| jstudio_stream::StreamError::InvalidEnumValue {
            name: "TevColorArg".to_string(),
            value: u32::from(v),
            offset: 0,
        })
    }

    fn to_u8(self) -> u8 {
        Self::ORDER.iter().position(|x| *x == self).expect("every variant is in ORDER") as u8
    }
}

/// Alpha input selector for a TEV alpha-combiner stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TevAlphaArg {
    APrev,
    A0,
    A1,
    A2,
    TexAlpha,
    RasAlpha,
    Konst,
    Zero,
}

impl TevAlphaArg {
    const ORDER: [Self; 8] =
        [Self::APrev, Self::A0, Self::A1, Self::A2, Self::TexAlpha, Self::RasAlpha, Self::Konst, Self::Zero];

    fn from_u8(v: u8) -> StreamResult<Self> {
        Self::ORDER.get(v as usize).copied().ok_or_else(|| jstudio_stream::StreamError::InvalidEnumValue {
            name: "TevAlphaArg".to_string(),
            value: u32::from(v),
            offset: 0,
        })
    }

    fn to_u8(self) -> u8 {
        Self::ORDER.iter().position(|x| *x == self).expect("every variant is in ORDER") as u8
    }
}

/// `a op b` before scale/bias in a TEV stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TevOp {
    Add,
    Subtract,
}

impl TevOp {
    fn from_u8(v: u8) -> StreamResult<Self> {
        Ok(match v {
            0 => Self::Add,
            1 => Self::Subtract,
            other => {
                return Err(jstudio_stream::StreamError::InvalidEnumValue {
                    name: "TevOp".to_string(),
                    value: u32::from(other),
                    offset: 0,
                })
            }
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Subtract => 1,
        }
    }
}

/// One TEV combiner stage: `out = ((a*(1-c) + b*c) + bias) * scale`,
/// separately for color and alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TevStage {
    pub color_a: TevColorArg,
    pub color_b: TevColorArg,
    pub color_c: TevColorArg,
    pub color_d: TevColorArg,
    pub color_op: TevOp,
    pub color_clamp: bool,
    pub color_out: u8,
    pub alpha_a: TevAlphaArg,
    pub alpha_b: TevAlphaArg,
    pub alpha_c: TevAlphaArg,
    pub alpha_d: TevAlphaArg,
    pub alpha_op: TevOp,
    pub alpha_clamp: bool,
    pub alpha_out: u8,
    pub tex_map: u8,
    pub tex_coord: u8,
    pub ras_swap: u8,
    pub tex_map_swap: u8,
}

impl Default for TevStage {
    fn default() -> Self {
        Self {
            color_a: TevColorArg::Zero,
            color_b: TevColorArg::Zero,
            color_c: TevColorArg::Zero,
            color_d: TevColorArg::CPrev,
            color_op: TevOp::Add,
            color_clamp: true,
            color_out: 0,
            alpha_a: TevAlphaArg::Zero,
            alpha_b: TevAlphaArg::Zero,
            alpha_c: TevAlphaArg::Zero,
            alpha_d: TevAlphaArg::APrev,
            alpha_op: TevOp::Add,
            alpha_clamp: true,
            alpha_out: 0,
            tex_map: 0,
            tex_coord: 0,
            ras_swap: 0,
            tex_map_swap: 0,
        }
    }
}

impl TevStage {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        let tex_map = r.u8()?;
        let tex_coord = r.u8()?;
        let ras_swap = r.u8()?;
        let tex_map_swap = r.u8()?;
        let color_a = TevColorArg::from_u8(r.u8()?)?;
        let color_b = TevColorArg::from_u8(r.u8()?)?;
        let color_c = TevColorArg::from_u8(r.u8()?)?;
        let color_d = TevColorArg::from_u8(r.u8()?)?;
        let color_op = TevOp::from_u8(r.u8()?)?;
        let color_clamp = r.u8()? != 0;
        let color_out = r.u8()?;
        let alpha_a = TevAlphaArg::from_u8(r.u8()?)?;
        let alpha_b = TevAlphaArg::from_u8(r.u8()?)?;
        let alpha_c = TevAlphaArg::from_u8(r.u8()?)?;
        let alpha_d = TevAlphaArg::from_u8(r.u8()?)?;
        let alpha_op = TevOp::from_u8(r.u8()?)?;
        let alpha_clamp = r.u8()? != 0;
        let alpha_out = r.u8()?;
        Ok(Self {
            color_a,
            color_b,
            color_c,
            color_d,
            color_op,
            color_clamp,
            color_out,
            alpha_a,
            alpha_b,
            alpha_c,
            alpha_d,
            alpha_op,
            alpha_clamp,
            alpha_out,
            tex_map,
            tex_coord,
            ras_swap,
            tex_map_swap,
        })
    }

    fn write(self, w: &mut Writer) {
        w.u8(self.tex_map);
        w.u8(self.tex_coord);
        w.u8(self.ras_swap);
        w.u8(self.tex_map_swap);
        w.u8(self.color_a.to_u8());
        w.u8(self.color_b.to_u8());
        w.u8(self.color_c.to_u8());
        w.u8(self.color_d.to_u8());
        w.u8(self.color_op.to_u8());
        w.u8(u8::from(self.color_clamp));
        w.u8(self.color_out);
        w.u8(self.alpha_a.to_u8());
        w.u8(self.alpha_b.to_u8());
        w.u8(self.alpha_c.to_u8());
        w.u8(self.alpha_d.to_u8());
        w.u8(self.alpha_op.to_u8());
        w.u8(u8::from(self.alpha_clamp));
        w.u8(self.alpha_out);
    }
}

/// One material's GPU pipeline state: cull mode, depth test, up to eight
/// TEV stages, and up to eight texture-coordinate generators.
#[derive(Debug, Clone, PartialEq)]
pub struct GxMaterial {
    pub name: String,
    pub cull_mode: CullMode,
    pub z_mode: ZMode,
    pub tex_gens: Vec<TexGen>,
    pub tev_stages: Vec<TevStage>,
}

impl GxMaterial {
    /// Read a material's shared GX state. The caller has already consumed
    /// any format-specific header fields (name, texture references) before
    /// this point; `name` is passed in rather than read here.
    pub fn read(r: &mut Reader<'_>, name: String) -> StreamResult<Self> {
        let cull_mode = CullMode::from_u32(r.u32()?)?;
        let z_mode = ZMode::read(r)?;
        let tex_gen_count = r.u8()?;
        let tex_gens = r.read_array(tex_gen_count as usize, TexGen::read)?;
        let stage_count = r.u8()?;
        let tev_stages = r.read_array(stage_count as usize, TevStage::read)?;
        Ok(Self { name, cull_mode, z_mode, tex_gens, tev_stages })
    }

    /// Write the shared GX state, not including `name` (the caller owns
    /// name-table placement).
    pub fn write(&self, w: &mut Writer) {
        w.u32(self.cull_mode.to_u32());
        self.z_mode.write(w);
        w.u8(self.tex_gens.len() as u8);
        for tex_gen in &self.tex_gens {
            tex_gen.write(w);
        }
        w.u8(self.tev_stages.len() as u8);
        for stage in &self.tev_stages {
            stage.write(w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::Endian;

    fn sample() -> GxMaterial {
        GxMaterial {
            name: "mat_0".to_string(),
            cull_mode: CullMode::Back,
            z_mode: ZMode::default(),
            tex_gens: vec![TexGen { source: TexGenSource::Tex(0), ty: TexGenType::Matrix2x4, matrix: 30 }],
            tev_stages: vec![TevStage::default()],
        }
    }

    #[test]
    fn roundtrips_through_reader_writer() {
        let material = sample();
        let mut w = Writer::new(Endian::Big);
        material.write(&mut w);
        let buf = w.finalize().unwrap();
        let mut r = Reader::new(&buf, Endian::Big);
        let decoded = GxMaterial::read(&mut r, "mat_0".to_string()).unwrap();
        assert_eq!(decoded, material);
    }

    #[test]
    fn cull_mode_rejects_out_of_range_value() {
        let mut w = Writer::new(Endian::Big);
        w.u32(9);
        ZMode::default().write(&mut w);
        w.u8(0);
        w.u8(0);
        let buf = w.finalize().unwrap();
        let mut r = Reader::new(&buf, Endian::Big);
        assert!(GxMaterial::read(&mut r, "bad".to_string()).is_err());
    }
}
