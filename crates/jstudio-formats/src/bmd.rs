//! J3D binary models (`BMD`/`BDL`): GameCube/Wii's hierarchical model
//! format, built from a fixed sequence of named sections.
//!
//! Read is two-phase, matching the retail loader: `lex` scans the
//! section table without interpreting any payload, then each section is
//! decoded independently by jumping to its recorded offset. This lets
//! sections that forward-reference each other (`SHP1` vertex indices
//! depend on `VTX1`'s real array lengths, which in turn can only be
//! known after every shape has been scanned) resolve in whatever order
//! is convenient rather than the order they're stored in.

use std::collections::HashMap;

use jstudio_stream::display_list::{self, DrawCommand, VertexAttribute, VertexDescriptor};
use jstudio_stream::{Reader, StreamResult, Writer};

use crate::error::BmdError;
use crate::gx_material::GxMaterial;

const J3D_PAD_STRING: &[u8] = b"This is padding data to alignment.....";

fn j3d_pad_byte(i: usize) -> u8 {
    J3D_PAD_STRING[i % J3D_PAD_STRING.len()]
}

/// Which convention joint scale compounds under, per `INF1`'s info block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingRule {
    Basic,
    Xsi,
    Maya,
}

impl ScalingRule {
    fn from_u32(v: u32) -> StreamResult<Self> {
        Ok(match v {
            0 => Self::Basic,
            1 => Self::Xsi,
            2 => Self::Maya,
            other => {
                return Err(jstudio_stream::StreamError::InvalidEnumValue {
                    name: "ScalingRule".to_string(),
                    value: other,
                    offset: 0,
                })
            }
        })
    }

    fn to_u32(self) -> u32 {
        match self {
            Self::Basic => 0,
            Self::Xsi => 1,
            Self::Maya => 2,
        }
    }
}

/// A joint's billboard behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillboardMode {
    Standard,
    BillboardXY,
    BillboardY,
}

impl BillboardMode {
    fn from_u8(v: u8) -> StreamResult<Self> {
        Ok(match v {
            0 => Self::Standard,
            1 => Self::BillboardXY,
            2 => Self::BillboardY,
            other => {
                return Err(jstudio_stream::StreamError::InvalidEnumValue {
                    name: "BillboardMode".to_string(),
                    value: u32::from(other),
                    offset: 0,
                })
            }
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Standard => 0,
            Self::BillboardXY => 1,
            Self::BillboardY => 2,
        }
    }
}

/// One joint's transform and bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joint {
    pub scale: (f32, f32, f32),
    pub rotation: (f32, f32, f32),
    pub translation: (f32, f32, f32),
    pub bounding_sphere_radius: f32,
    pub bbox_min: (f32, f32, f32),
    pub bbox_max: (f32, f32, f32),
    pub billboard_mode: BillboardMode,
    pub maya_ssc: bool,
}

impl Default for Joint {
    fn default() -> Self {
        Self {
            scale: (1.0, 1.0, 1.0),
            rotation: (0.0, 0.0, 0.0),
            translation: (0.0, 0.0, 0.0),
            bounding_sphere_radius: 0.0,
            bbox_min: (0.0, 0.0, 0.0),
            bbox_max: (0.0, 0.0, 0.0),
            billboard_mode: BillboardMode::Standard,
            maya_ssc: false,
        }
    }
}

fn read_vec3(r: &mut Reader<'_>) -> StreamResult<(f32, f32, f32)> {
    Ok((r.f32()?, r.f32()?, r.f32()?))
}

fn write_vec3(w: &mut Writer, v: (f32, f32, f32)) {
    w.f32(v.0);
    w.f32(v.1);
    w.f32(v.2);
}

impl Joint {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        let maya_ssc = r.u8()? != 0;
        let billboard_mode = BillboardMode::from_u8(r.u8()?)?;
        r.skip(2)?;
        let scale = read_vec3(r)?;
        let rotation = read_vec3(r)?;
        let translation = read_vec3(r)?;
        let bounding_sphere_radius = r.f32()?;
        let bbox_min = read_vec3(r)?;
        let bbox_max = read_vec3(r)?;
        Ok(Self { scale, rotation, translation, bounding_sphere_radius, bbox_min, bbox_max, billboard_mode, maya_ssc })
    }

    fn write(self, w: &mut Writer) {
        w.u8(u8::from(self.maya_ssc));
        w.u8(self.billboard_mode.to_u8());
        w.u16(0);
        write_vec3(w, self.scale);
        write_vec3(w, self.rotation);
        write_vec3(w, self.translation);
        w.f32(self.bounding_sphere_radius);
        write_vec3(w, self.bbox_min);
        write_vec3(w, self.bbox_max);
    }
}

/// A node in the `INF1` hierarchy byte-code tree: a joint (which may have
/// children) or a material/shape binding attached to its parent joint.
#[derive(Debug, Clone, PartialEq)]
pub enum HierarchyNode {
    Joint { joint_index: u16, children: Vec<HierarchyNode> },
    Material { material_index: u16 },
    Shape { shape_index: u16 },
}

const OP_END: u16 = 0x00;
const OP_OPEN: u16 = 0x01;
const OP_CLOSE: u16 = 0x02;
const OP_JOINT: u16 = 0x10;
const OP_MATERIAL: u16 = 0x11;
const OP_SHAPE: u16 = 0x12;

fn read_hierarchy_children(r: &mut Reader<'_>) -> StreamResult<Vec<HierarchyNode>> {
    let mut out = Vec::new();
    loop {
        let kind = r.u16()?;
        let index = r.u16()?;
        match kind {
            OP_END | OP_CLOSE => break,
            OP_OPEN => {
                let Some(HierarchyNode::Joint { children, .. }) = out.last_mut() else {
                    return Err(jstudio_stream::StreamError::Malformed {
                        site: "inf1".to_string(),
                        why: "Open opcode with no preceding Joint node".to_string(),
                    });
                };
                *children = read_hierarchy_children(r)?;
            }
            OP_JOINT => out.push(HierarchyNode::Joint { joint_index: index, children: Vec::new() }),
            OP_MATERIAL => out.push(HierarchyNode::Material { material_index: index }),
            OP_SHAPE => out.push(HierarchyNode::Shape { shape_index: index }),
            other => {
                return Err(jstudio_stream::StreamError::Malformed {
                    site: "inf1".to_string(),
                    why: format!("unrecognized hierarchy opcode {other:#x}"),
                })
            }
        }
    }
    Ok(out)
}

fn write_hierarchy_children(w: &mut Writer, nodes: &[HierarchyNode]) {
    for node in nodes {
        match node {
            HierarchyNode::Joint { joint_index, children } => {
                w.u16(OP_JOINT);
                w.u16(*joint_index);
                if !children.is_empty() {
                    w.u16(OP_OPEN);
                    w.u16(0);
                    write_hierarchy_children(w, children);
                    w.u16(OP_CLOSE);
                    w.u16(0);
                }
            }
            HierarchyNode::Material { material_index } => {
                w.u16(OP_MATERIAL);
                w.u16(*material_index);
            }
            HierarchyNode::Shape { shape_index } => {
                w.u16(OP_SHAPE);
                w.u16(*shape_index);
            }
        }
    }
}

/// The on-disk component type of a `VTX1` attribute array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    U8,
    S8,
    U16,
    S16,
    F32,
}

impl ComponentType {
    fn from_u8(v: u8) -> StreamResult<Self> {
        Ok(match v {
            0 => Self::U8,
            1 => Self::S8,
            2 => Self::U16,
            3 => Self::S16,
            4 => Self::F32,
            other => {
                return Err(jstudio_stream::StreamError::InvalidEnumValue {
                    name: "ComponentType".to_string(),
                    value: u32::from(other),
                    offset: 0,
                })
            }
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::U8 => 0,
            Self::S8 => 1,
            Self::U16 => 2,
            Self::S16 => 3,
            Self::F32 => 4,
        }
    }

    fn byte_width(self) -> usize {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::F32 => 4,
        }
    }
}

/// One `VTX1` array's quantization and (after truncation) its real data.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexArray {
    pub attribute: VertexAttribute,
    pub component_count: u8,
    pub component_type: ComponentType,
    pub shift: u8,
    /// Raw per-element bytes, already truncated to the real used count.
    pub raw: Vec<u8>,
}

impl VertexArray {
    fn element_size(&self) -> usize {
        self.component_count as usize * self.component_type.byte_width()
    }
}

fn attribute_order_index(attr: VertexAttribute) -> u8 {
    VertexAttribute::ORDER.iter().position(|a| *a == attr).expect("every attribute is in ORDER") as u8
}

fn attribute_from_order_index(index: u8) -> StreamResult<VertexAttribute> {
    VertexAttribute::ORDER.get(index as usize).copied().ok_or(jstudio_stream::StreamError::InvalidEnumValue {
        name: "VertexAttribute".to_string(),
        value: u32::from(index),
        offset: 0,
    })
}

/// Claim `VTX1` arrays greedily (padded to 32-byte boundaries), to be
/// truncated once shape data is available. See [`truncate_vertex_arrays`].
fn read_vtx1(r: &mut Reader<'_>, section_end: usize) -> StreamResult<Vec<VertexArray>> {
    let section_start = r.position();
    let descriptor_count = r.u16()?;
    struct Descriptor {
        attribute: VertexAttribute,
        component_count: u8,
        component_type: ComponentType,
        shift: u8,
    }
    let descriptors = r.read_array(descriptor_count as usize, |r| {
        let attribute = attribute_from_order_index(r.u8()?)?;
        let component_count = r.u8()?;
        let component_type = ComponentType::from_u8(r.u8()?)?;
        let shift = r.u8()?;
        Ok(Descriptor { attribute, component_count, component_type, shift })
    })?;
    r.seek_to(align_up(r.position(), 32))?;
    let offsets = r.read_array(descriptors.len(), |r| r.u32())?;
    r.seek_to(align_up(r.position(), 32))?;

    let mut arrays = Vec::with_capacity(descriptors.len());
    for (i, descriptor) in descriptors.into_iter().enumerate() {
        let start = section_start + offsets[i] as usize;
        let end = if i + 1 < offsets.len() { section_start + offsets[i + 1] as usize } else { section_end };
        let raw = r.at(start, |r| r.bytes(end - start))?;
        arrays.push(VertexArray {
            attribute: descriptor.attribute,
            component_count: descriptor.component_count,
            component_type: descriptor.component_type,
            shift: descriptor.shift,
            raw,
        });
    }
    Ok(arrays)
}

fn align_up(pos: usize, align: usize) -> usize {
    let rem = pos % align;
    if rem == 0 {
        pos
    } else {
        pos + (align - rem)
    }
}

/// The named post-read pass the greedy `VTX1` claim requires: scan every
/// shape's decoded display-list vertices for the highest index used per
/// channel, then cut each array down to `max_index + 1` elements.
fn truncate_vertex_arrays(arrays: &mut [VertexArray], shapes: &[Shape]) -> Result<(), BmdError> {
    let mut max_index: HashMap<VertexAttribute, u32> = HashMap::new();
    for shape in shapes {
        for primitive in &shape.matrix_primitives {
            for command in &primitive.commands {
                for vertex in &command.vertices {
                    for &(attr, value) in &vertex.values {
                        if attr == VertexAttribute::PositionNormalMatrixIndex {
                            continue;
                        }
                        max_index.entry(attr).and_modify(|m| *m = (*m).max(value)).or_insert(value);
                    }
                }
            }
        }
    }
    for array in arrays.iter_mut() {
        let element_size = array.element_size();
        let used = match max_index.get(&array.attribute) {
            Some(&max) => (max as usize + 1) * element_size,
            None => 0,
        };
        if used > array.raw.len() {
            return Err(BmdError::VertexIndexOutOfRange {
                channel: channel_name(array.attribute),
                index: (used / element_size.max(1)) as u32,
                len: array.raw.len() / element_size.max(1),
            });
        }
        array.raw.truncate(used);
    }
    Ok(())
}

fn channel_name(attr: VertexAttribute) -> &'static str {
    match attr {
        VertexAttribute::Position => "Position",
        VertexAttribute::Normal => "Normal",
        VertexAttribute::Color0 => "Color0",
        VertexAttribute::Color1 => "Color1",
        VertexAttribute::TexCoord0 => "TexCoord0",
        VertexAttribute::TexCoord1 => "TexCoord1",
        VertexAttribute::TexCoord2 => "TexCoord2",
        VertexAttribute::TexCoord3 => "TexCoord3",
        VertexAttribute::TexCoord4 => "TexCoord4",
        VertexAttribute::TexCoord5 => "TexCoord5",
        VertexAttribute::TexCoord6 => "TexCoord6",
        VertexAttribute::TexCoord7 => "TexCoord7",
        _ => "Other",
    }
}

fn write_vtx1(w: &mut Writer, arrays: &[VertexArray]) {
    let section_start = w.position();
    w.u16(arrays.len() as u16);
    for array in arrays {
        w.u8(attribute_order_index(array.attribute));
        w.u8(array.component_count);
        w.u8(array.component_type.to_u8());
        w.u8(array.shift);
    }
    w.align_with(32, j3d_pad_byte);
    let offsets_site = w.position();
    for _ in arrays {
        w.u32(0);
    }
    w.align_with(32, j3d_pad_byte);

    let mut offsets = Vec::with_capacity(arrays.len());
    for array in arrays {
        offsets.push((w.position() - section_start) as u32);
        w.bytes(&array.raw);
        w.align_with(32, j3d_pad_byte);
    }
    for (i, offset) in offsets.into_iter().enumerate() {
        w.patch_at(offsets_site + i * 4, &offset.to_be_bytes())
            .expect("offsets_site was reserved for exactly this many u32s");
    }
}

/// One envelope: joints and normalized weights contributing to a vertex's
/// skin position.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub joint_indices: Vec<u16>,
    pub weights: Vec<f32>,
}

/// A `DRW1` draw-matrix entry, unified from the on-disk `(isWeighted,
/// index)` pair into the envelope it actually denotes (a single joint at
/// weight 1.0 when unweighted).
#[derive(Debug, Clone, PartialEq)]
pub struct DrawMatrix {
    pub weights: Vec<(u16, f32)>,
}

fn read_evp1_drw1(
    r: &mut Reader<'_>,
    evp1_pos: usize,
    drw1_pos: usize,
) -> StreamResult<(Vec<Envelope>, Vec<[f32; 12]>, Vec<DrawMatrix>)> {
    let (envelopes, inverse_bind_matrices) = r.at(evp1_pos, |r| {
        let count = r.u16()?;
        r.skip(2)?;
        let counts = r.read_array(count as usize, Reader::u8)?;
        let total: usize = counts.iter().map(|&c| c as usize).sum();
        let joint_indices_flat = r.read_array(total, Reader::u16)?;
        let weights_flat = r.read_array(total, Reader::f32)?;
        let mut envelopes = Vec::with_capacity(count as usize);
        let mut cursor = 0;
        for &n in &counts {
            let n = n as usize;
            envelopes.push(Envelope {
                joint_indices: joint_indices_flat[cursor..cursor + n].to_vec(),
                weights: weights_flat[cursor..cursor + n].to_vec(),
            });
            cursor += n;
        }
        let unique_joint_count =
            envelopes.iter().flat_map(|e| e.joint_indices.iter()).copied().max().map_or(0, |m| m as usize + 1);
        let inverse_bind_matrices = r.read_array(unique_joint_count, |r| {
            let mut m = [0.0f32; 12];
            for slot in &mut m {
                *slot = r.f32()?;
            }
            Ok(m)
        })?;
        Ok((envelopes, inverse_bind_matrices))
    })?;

    let draw_matrices = r.at(drw1_pos, |r| {
        let count = r.u16()?;
        r.skip(2)?;
        let is_weighted = r.read_array(count as usize, |r| Ok(r.u8()? != 0))?;
        let indices = r.read_array(count as usize, Reader::u16)?;
        let mut out = Vec::with_capacity(count as usize);
        for (weighted, index) in is_weighted.into_iter().zip(indices) {
            if weighted {
                out.push(DrawMatrix { weights: envelopes[index as usize].joint_indices.iter().copied().zip(
                    envelopes[index as usize].weights.iter().copied(),
                ).collect() });
            } else {
                out.push(DrawMatrix { weights: vec![(index, 1.0)] });
            }
        }
        Ok(out)
    })?;

    Ok((envelopes, inverse_bind_matrices, draw_matrices))
}

fn write_evp1(w: &mut Writer, envelopes: &[Envelope], inverse_bind_matrices: &[[f32; 12]]) {
    w.u16(envelopes.len() as u16);
    w.u16(0);
    for envelope in envelopes {
        w.u8(envelope.joint_indices.len() as u8);
    }
    w.align_with(4, |_| 0xFF);
    for envelope in envelopes {
        for &idx in &envelope.joint_indices {
            w.u16(idx);
        }
    }
    for envelope in envelopes {
        for &weight in &envelope.weights {
            w.f32(weight);
        }
    }
    for matrix in inverse_bind_matrices {
        for &v in matrix {
            w.f32(v);
        }
    }
}

/// A draw matrix indexes either a lone joint (unweighted) or, here, the
/// envelope it was expanded from; we always write back the more general
/// `isWeighted` form when an entry has more than one influence.
fn write_drw1(w: &mut Writer, draw_matrices: &[DrawMatrix], envelope_of: impl Fn(&DrawMatrix) -> Option<u16>) {
    w.u16(draw_matrices.len() as u16);
    w.u16(0);
    for dm in draw_matrices {
        w.u8(u8::from(envelope_of(dm).is_some()));
    }
    for dm in draw_matrices {
        match envelope_of(dm) {
            Some(envelope_index) => w.u16(envelope_index),
            None => w.u16(dm.weights.first().map_or(0, |(j, _)| *j)),
        }
    }
}

/// One matrix primitive: a display-list chunk bound to a small table of
/// skinning matrices, addressed by index into `draw_matrix_indices`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixPrimitive {
    pub current_matrix_index: i16,
    pub draw_matrix_indices: Vec<u16>,
    pub commands: Vec<DrawCommand>,
}

/// One shape: a vertex descriptor and the matrix primitives that draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub mode: u8,
    pub bbox_min: (f32, f32, f32),
    pub bbox_max: (f32, f32, f32),
    pub bounding_sphere_radius: f32,
    pub descriptor: VertexDescriptor,
    pub matrix_primitives: Vec<MatrixPrimitive>,
}

fn read_shp1(r: &mut Reader<'_>) -> StreamResult<Vec<Shape>> {
    let shape_count = r.u16()?;
    r.skip(2)?;
    let mut shapes = Vec::with_capacity(shape_count as usize);
    for _ in 0..shape_count {
        let mode = r.u8()?;
        r.skip(1)?;
        let _matrix_primitive_count = r.u16()?;
        r.skip(2)?;
        let bbox_min = read_vec3(r)?;
        let bbox_max = read_vec3(r)?;
        let bounding_sphere_radius = r.f32()?;

        let mut descriptor = VertexDescriptor::new();
        loop {
            let attr_index = r.u8()?;
            if attr_index == 0xFF {
                break;
            }
            let format = r.u8()?;
            let format = match format {
                0 => display_list::AttributeFormat::None,
                1 => display_list::AttributeFormat::Byte,
                2 => display_list::AttributeFormat::Short,
                3 => display_list::AttributeFormat::Direct,
                other => {
                    return Err(jstudio_stream::StreamError::Malformed {
                        site: "shp1/vcd".to_string(),
                        why: format!("invalid attribute format {other}"),
                    })
                }
            };
            descriptor.set(attribute_from_order_index(attr_index)?, format);
        }

        let primitive_count = r.u16()?;
        r.skip(2)?;
        let mut matrix_primitives = Vec::with_capacity(primitive_count as usize);
        for _ in 0..primitive_count {
            let current_matrix_index = r.i16()?;
            let indices_count = r.u16()?;
            let mut draw_matrix_indices = r.read_array(indices_count as usize, Reader::u16)?;
            draw_matrix_indices.retain(|&v| v != 0xFFFF);
            let display_list_len = r.u32()? as usize;
            let display_list_bytes = r.bytes(display_list_len)?;
            let mut dl_reader = Reader::new(&display_list_bytes, r.endian());
            let commands = display_list::decode(&mut dl_reader, &descriptor)?;
            matrix_primitives.push(MatrixPrimitive { current_matrix_index, draw_matrix_indices, commands });
        }
        shapes.push(Shape { mode, bbox_min, bbox_max, bounding_sphere_radius, descriptor, matrix_primitives });
    }
    Ok(shapes)
}

fn write_shp1(w: &mut Writer, shapes: &[Shape]) -> Result<(), BmdError> {
    w.u16(shapes.len() as u16);
    w.u16(0);
    for shape in shapes {
        w.u8(shape.mode);
        w.u8(0);
        w.u16(shape.matrix_primitives.len() as u16);
        w.u16(0xFFFF);
        write_vec3(w, shape.bbox_min);
        write_vec3(w, shape.bbox_max);
        w.f32(shape.bounding_sphere_radius);
        for (attr, format) in shape.descriptor.present() {
            w.u8(attribute_order_index(attr));
            w.u8(match format {
                display_list::AttributeFormat::None => 0,
                display_list::AttributeFormat::Byte => 1,
                display_list::AttributeFormat::Short => 2,
                display_list::AttributeFormat::Direct => 3,
            });
        }
        w.u8(0xFF);
        w.u8(0);

        w.u16(shape.matrix_primitives.len() as u16);
        w.u16(0);
        for primitive in &shape.matrix_primitives {
            w.i16(primitive.current_matrix_index);
            w.u16(primitive.draw_matrix_indices.len() as u16);
            for &idx in &primitive.draw_matrix_indices {
                w.u16(idx);
            }
            let mut dl_writer = Writer::new(binrw::Endian::Big);
            display_list::encode(&mut dl_writer, &shape.descriptor, &primitive.commands)?;
            let bytes = dl_writer.finalize().expect("display list encoding defines no deferred links");
            w.u32(bytes.len() as u32);
            w.bytes(&bytes);
        }
    }
    Ok(())
}

/// A texture resource (`TEX1`). The image data's internal compression
/// format is preserved as an opaque byte blob; only the header fields a
/// converter needs to inspect are modeled.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: String,
    pub format: u8,
    pub width: u16,
    pub height: u16,
    pub wrap_s: u8,
    pub wrap_t: u8,
    pub mipmap_count: u8,
    pub data: Vec<u8>,
}

/// A full J3D scene, decoded from a `BMD`/`BDL` file.
#[derive(Debug, Clone, PartialEq)]
pub struct BmdModel {
    pub is_bdl: bool,
    pub scaling_rule: ScalingRule,
    pub joints: Vec<Joint>,
    pub hierarchy: Vec<HierarchyNode>,
    pub vertex_arrays: Vec<VertexArray>,
    pub envelopes: Vec<Envelope>,
    pub inverse_bind_matrices: Vec<[f32; 12]>,
    pub draw_matrices: Vec<DrawMatrix>,
    pub shapes: Vec<Shape>,
    pub materials: Vec<GxMaterial>,
    pub textures: Vec<Texture>,
    pub mdl3: Option<Vec<u8>>,
}

impl BmdModel {
    /// Decode a `.bmd`/`.bdl` file.
    pub fn read(data: &[u8]) -> Result<Self, BmdError> {
        let mut r = Reader::new(data, binrw::Endian::Big);
        r.magic(b"J3D2")?;
        let version = {
            let mut buf = [0u8; 4];
            for b in &mut buf {
                *b = r.u8()?;
            }
            buf
        };
        let is_bdl = match &version {
            b"bmd3" => false,
            b"bdl4" => true,
            other => return Err(BmdError::UnsupportedVersion(*other)),
        };
        let _file_size = r.u32()?;
        let section_count = r.u32()?;
        r.skip(16)?;

        let mut sections: HashMap<[u8; 4], (usize, usize)> = HashMap::new();
        for _ in 0..section_count {
            let start = r.position();
            let mut magic = [0u8; 4];
            for b in &mut magic {
                *b = r.u8()?;
            }
            let size = r.u32()? as usize;
            if sections.insert(magic, (start, size)).is_some() {
                tracing::warn!(?magic, "duplicate J3D section, keeping the last one");
            }
            r.seek_to(start + size)?;
        }

        let required = |m: &[u8; 4]| sections.get(m).copied().ok_or(BmdError::MissingSection(*m));

        let (inf1_pos, _) = required(b"INF1")?;
        let (scaling_rule, hierarchy) = r.at(inf1_pos + 8, |r| {
            let section_start = r.position();
            let scaling_rule = ScalingRule::from_u32(r.u32()?)?;
            r.skip(2)?;
            let _packet_count = r.u16()?;
            let _vertex_count = r.u32()?;
            let hierarchy_offset = r.u32()?;
            r.seek_to(section_start + hierarchy_offset as usize)?;
            Ok((scaling_rule, read_hierarchy_children(r)?))
        })?;

        let (vtx1_pos, vtx1_size) = required(b"VTX1")?;
        let mut vertex_arrays = r.at(vtx1_pos + 8, |r| read_vtx1(r, vtx1_pos + vtx1_size))?;

        let (evp1_pos, _) = required(b"EVP1")?;
        let (drw1_pos, _) = required(b"DRW1")?;
        let (envelopes, inverse_bind_matrices, draw_matrices) =
            read_evp1_drw1(&mut r, evp1_pos + 8, drw1_pos + 8)?;

        let (jnt1_pos, _) = required(b"JNT1")?;
        let joints = r.at(jnt1_pos + 8, |r| {
            let count = r.u16()?;
            r.skip(6)?;
            r.read_array(count as usize, Joint::read)
        })?;

        let (shp1_pos, _) = required(b"SHP1")?;
        let shapes = r.at(shp1_pos + 8, |r| read_shp1(r))?;

        truncate_vertex_arrays(&mut vertex_arrays, &shapes)?;

        let (mat3_pos, _) = required(b"MAT3")?;
        let materials = r.at(mat3_pos + 8, |r| {
            let material_count = r.u16()?;
            r.skip(2)?;
            let lut = r.read_array(material_count as usize, Reader::u16)?;
            let max_body = lut.iter().copied().max().map_or(0, |m| m as usize + 1);
            let bodies = r.read_array(max_body, |r| {
                let name = r.c_string()?;
                GxMaterial::read(r, name)
            })?;
            Ok(lut.into_iter().map(|i| bodies[i as usize].clone()).collect::<Vec<_>>())
        })?;

        let (tex1_pos, _) = required(b"TEX1")?;
        let textures = r.at(tex1_pos + 8, |r| {
            let count = r.u16()?;
            r.skip(2)?;
            r.read_array(count as usize, |r| {
                let name = r.c_string()?;
                let format = r.u8()?;
                let width = r.u16()?;
                let height = r.u16()?;
                let wrap_s = r.u8()?;
                let wrap_t = r.u8()?;
                let mipmap_count = r.u8()?;
                let data_len = r.u32()? as usize;
                let data = r.bytes(data_len)?;
                Ok(Texture { name, format, width, height, wrap_s, wrap_t, mipmap_count, data })
            })
        })?;

        let mdl3 = sections.get(b"MDL3").map(|&(pos, size)| r.at(pos + 8, |r| r.bytes(size - 8))).transpose()?;

        Ok(Self {
            is_bdl,
            scaling_rule,
            joints,
            hierarchy,
            vertex_arrays,
            envelopes,
            inverse_bind_matrices,
            draw_matrices,
            shapes,
            materials,
            textures,
            mdl3,
        })
    }

    /// Encode back to a `.bmd`/`.bdl` file.
    pub fn write(&self) -> Result<Vec<u8>, BmdError> {
        let mut w = Writer::new(binrw::Endian::Big);
        w.bytes(b"J3D2");
        w.bytes(if self.is_bdl { b"bdl4" } else { b"bmd3" });
        let file_size_site = w.position();
        w.u32(0);
        let section_count_site = w.position();
        let mut section_count = 0u32;
        w.u32(0);
        w.align_with(16, j3d_pad_byte);

        let mut write_section = |w: &mut Writer, magic: &[u8; 4], body: impl FnOnce(&mut Writer)| {
            let start = w.position();
            w.bytes(magic);
            let size_site = w.position();
            w.u32(0);
            body(w);
            w.align_with(32, j3d_pad_byte);
            let size = (w.position() - start) as u32;
            w.patch_at(size_site, &size.to_be_bytes()).expect("size_site was just reserved");
            section_count += 1;
        };

        write_section(&mut w, b"INF1", |w| {
            let section_start = w.position();
            w.u32(self.scaling_rule.to_u32());
            w.u16(0xFFFF);
            let packet_count: u16 =
                self.shapes.iter().map(|s| s.matrix_primitives.len() as u16).sum();
            w.u16(packet_count);
            let vertex_count = self
                .vertex_arrays
                .iter()
                .find(|a| a.attribute == VertexAttribute::Position)
                .map_or(0, |a| (a.raw.len() / a.element_size().max(1)) as u32);
            w.u32(vertex_count);
            let offset_site = w.position();
            w.u32(0);
            w.align_with(4, |_| 0);
            let hierarchy_start = w.position();
            write_hierarchy_children(w, &self.hierarchy);
            w.u16(OP_END);
            w.u16(0);
            let offset = (hierarchy_start - section_start) as u32;
            w.patch_at(offset_site, &offset.to_be_bytes()).expect("offset_site was just reserved");
        });

        write_section(&mut w, b"VTX1", |w| write_vtx1(w, &self.vertex_arrays));
        write_section(&mut w, b"EVP1", |w| write_evp1(w, &self.envelopes, &self.inverse_bind_matrices));
        write_section(&mut w, b"DRW1", |w| {
            write_drw1(w, &self.draw_matrices, |dm| {
                if dm.weights.len() > 1 {
                    self.envelopes.iter().position(|e| {
                        e.joint_indices.len() == dm.weights.len()
                            && e.joint_indices.iter().zip(&dm.weights).all(|(ji, (wj, _))| ji == wj)
                    }).map(|i| i as u16)
                } else {
                    None
                }
            });
        });
        write_section(&mut w, b"JNT1", |w| {
            w.u16(self.joints.len() as u16);
            w.u16(0xFFFF);
            w.u16(0xFFFF);
            w.u16(0xFFFF);
            for joint in &self.joints {
                joint.write(w);
            }
        });
        let mut shp1_err = Ok(());
        write_section(&mut w, b"SHP1", |w| {
            shp1_err = write_shp1(w, &self.shapes);
        });
        shp1_err?;
        write_section(&mut w, b"MAT3", |w| {
            let mut bodies: Vec<&GxMaterial> = Vec::new();
            let mut lut = Vec::with_capacity(self.materials.len());
            for material in &self.materials {
                let index = bodies.iter().position(|m| *m == material).unwrap_or_else(|| {
                    bodies.push(material);
                    bodies.len() - 1
                });
                lut.push(index as u16);
            }
            w.u16(self.materials.len() as u16);
            w.u16(0xFFFF);
            for index in lut {
                w.u16(index);
            }
            for body in bodies {
                w.c_string(&body.name);
                body.write(w);
            }
        });
        write_section(&mut w, b"TEX1", |w| {
            w.u16(self.textures.len() as u16);
            w.u16(0xFFFF);
            for texture in &self.textures {
                w.c_string(&texture.name);
                w.u8(texture.format);
                w.u16(texture.width);
                w.u16(texture.height);
                w.u8(texture.wrap_s);
                w.u8(texture.wrap_t);
                w.u8(texture.mipmap_count);
                w.u32(texture.data.len() as u32);
                w.bytes(&texture.data);
            }
        });
        if let Some(mdl3) = &self.mdl3 {
            write_section(&mut w, b"MDL3", |w| w.bytes(mdl3));
        }

        let file_size = w.position() as u32;
        w.patch_at(file_size_site, &file_size.to_be_bytes()).expect("file_size_site was reserved first");
        w.patch_at(section_count_site, &section_count.to_be_bytes()).expect("section_count_site was reserved first");
        Ok(w.finalize().expect("bmd encoding defines no deferred links"))
    }
}

impl crate::FormatCodec for BmdModel {
    type Error = BmdError;

    fn read(data: &[u8]) -> Result<Self, Self::Error> {
        Self::read(data)
    }

    fn write(&self) -> Result<Vec<u8>, Self::Error> {
        self.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_model_with_one_joint() -> BmdModel {
        BmdModel {
            is_bdl: false,
            scaling_rule: ScalingRule::Basic,
            joints: vec![Joint::default()],
            hierarchy: vec![HierarchyNode::Joint { joint_index: 0, children: Vec::new() }],
            vertex_arrays: Vec::new(),
            envelopes: Vec::new(),
            inverse_bind_matrices: Vec::new(),
            draw_matrices: Vec::new(),
            shapes: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            mdl3: None,
        }
    }

    #[test]
    fn empty_model_with_one_joint_roundtrips() {
        let model = empty_model_with_one_joint();
        let bytes = model.write().unwrap();
        let decoded = BmdModel::read(&bytes).unwrap();
        assert_eq!(decoded, model);
        assert_eq!(decoded.joints.len(), 1);
        assert_eq!(decoded.joints[0].translation, (0.0, 0.0, 0.0));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut w = Writer::new(binrw::Endian::Big);
        w.bytes(b"J3D2");
        w.bytes(b"xxxx");
        w.u32(0);
        w.u32(0);
        w.pad(16, |_| 0);
        let bytes = w.finalize().unwrap();
        assert!(matches!(BmdModel::read(&bytes), Err(BmdError::UnsupportedVersion(_))));
    }

    #[test]
    fn missing_required_section_is_reported() {
        let mut w = Writer::new(binrw::Endian::Big);
        w.bytes(b"J3D2");
        w.bytes(b"bmd3");
        w.u32(0);
        w.u32(0);
        w.pad(16, |_| 0);
        let bytes = w.finalize().unwrap();
        assert!(matches!(BmdModel::read(&bytes), Err(BmdError::MissingSection(_))));
    }

    #[test]
    fn mat3_dedups_identical_material_bodies_through_the_lut() {
        let mut model = empty_model_with_one_joint();
        let material = GxMaterial {
            name: "shared".to_string(),
            cull_mode: crate::gx_material::CullMode::Back,
            z_mode: Default::default(),
            tex_gens: vec![],
            tev_stages: vec![],
        };
        model.materials = vec![material.clone(), material];
        let bytes = model.write().unwrap();
        let decoded = BmdModel::read(&bytes).unwrap();
        assert_eq!(decoded.materials.len(), 2);
        assert_eq!(decoded.materials[0], decoded.materials[1]);
    }
}
