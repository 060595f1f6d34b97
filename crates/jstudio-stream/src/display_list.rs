//! GX display list decode/encode: the per-shape vertex command stream
//! shared by J3D `SHP1` and G3D `MDL0` polygon data.

use crate::error::{StreamError, StreamResult};
use crate::reader::Reader;
use crate::writer::Writer;

/// GX primitive opcode, read from the low 3 bits of a draw opcode byte;
/// the high 5 bits are always `0b00001` (`0x80 >> 3`) for draw commands,
/// checked by [`Opcode::from_byte`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Quads,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Lines,
    LineStrip,
    Points,
}

impl PrimitiveType {
    fn from_opcode(byte: u8) -> Option<Self> {
        Some(match byte {
            0x80 => Self::Quads,
            0x90 => Self::Triangles,
            0x98 => Self::TriangleStrip,
            0xA0 => Self::TriangleFan,
            0xA8 => Self::Lines,
            0xB0 => Self::LineStrip,
            0xB8 => Self::Points,
            _ => return None,
        })
    }

    fn to_opcode(self) -> u8 {
        match self {
            Self::Quads => 0x80,
            Self::Triangles => 0x90,
            Self::TriangleStrip => 0x98,
            Self::TriangleFan => 0xA0,
            Self::Lines => 0xA8,
            Self::LineStrip => 0xB0,
            Self::Points => 0xB8,
        }
    }
}

/// Which attributes a shape's vertices carry, and in what order they
/// appear in each vertex record. Order matches GX's fixed attribute id
/// sequence, not insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    PositionNormalMatrixIndex,
    Tex0MatrixIndex,
    Tex1MatrixIndex,
    Tex2MatrixIndex,
    Tex3MatrixIndex,
    Tex4MatrixIndex,
    Tex5MatrixIndex,
    Tex6MatrixIndex,
    Tex7MatrixIndex,
    Position,
    Normal,
    Color0,
    Color1,
    TexCoord0,
    TexCoord1,
    TexCoord2,
    TexCoord3,
    TexCoord4,
    TexCoord5,
    TexCoord6,
    TexCoord7,
}

impl VertexAttribute {
    /// Fixed GX attribute order: matrix indices first, then position and
    /// normal, then colors, then texcoords.
    pub const ORDER: [Self; 21] = [
        Self::PositionNormalMatrixIndex,
        Self::Tex0MatrixIndex,
        Self::Tex1MatrixIndex,
        Self::Tex2MatrixIndex,
        Self::Tex3MatrixIndex,
        Self::Tex4MatrixIndex,
        Self::Tex5MatrixIndex,
        Self::Tex6MatrixIndex,
        Self::Tex7MatrixIndex,
        Self::Position,
        Self::Normal,
        Self::Color0,
        Self::Color1,
        Self::TexCoord0,
        Self::TexCoord1,
        Self::TexCoord2,
        Self::TexCoord3,
        Self::TexCoord4,
        Self::TexCoord5,
        Self::TexCoord6,
        Self::TexCoord7,
    ];
}

/// How one present attribute is encoded per vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeFormat {
    None,
    Byte,
    Short,
    Direct,
}

impl AttributeFormat {
    fn from_bits(bits: u32) -> StreamResult<Self> {
        Ok(match bits {
            0 => Self::None,
            1 => Self::Byte,
            2 => Self::Short,
            3 => Self::Direct,
            other => {
                return Err(StreamError::InvalidEnumValue {
                    name: "AttributeFormat".to_string(),
                    value: other,
                    offset: 0,
                })
            }
        })
    }

    fn to_bits(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Byte => 1,
            Self::Short => 2,
            Self::Direct => 3,
        }
    }

    /// Byte width of one value in this format, for non-PNM attributes.
    fn index_width(self) -> StreamResult<usize> {
        match self {
            Self::Byte => Ok(1),
            Self::Short => Ok(2),
            Self::None | Self::Direct => Err(StreamError::Malformed {
                site: "display_list".to_string(),
                why: "attribute has no index width in this format".to_string(),
            }),
        }
    }
}

/// The vertex descriptor: which attributes a shape's vertices carry, and
/// how each one is encoded. Built once per shape from `SHP1`/`MDL0` header
/// data and threaded through every matrix primitive's display list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexDescriptor {
    formats: Vec<(VertexAttribute, AttributeFormat)>,
}

impl VertexDescriptor {
    /// An empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `attr` as present, encoded as `format`.
    pub fn set(&mut self, attr: VertexAttribute, format: AttributeFormat) {
        self.formats.retain(|(a, _)| *a != attr);
        if format != AttributeFormat::None {
            self.formats.push((attr, format));
        }
    }

    /// Attributes in fixed GX order, paired with their format.
    pub fn present(&self) -> Vec<(VertexAttribute, AttributeFormat)> {
        VertexAttribute::ORDER
            .iter()
            .filter_map(|attr| self.formats.iter().find(|(a, _)| a == attr).copied())
            .collect()
    }
}

/// One decoded vertex's raw, un-dereferenced attribute values: either an
/// index into a shared array (`Byte`/`Short`) or, for `PositionNormalMatrixIndex`
/// in `Direct` form, the matrix index itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vertex {
    pub values: Vec<(VertexAttribute, u32)>,
}

/// One decoded draw command: a primitive type and its vertices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCommand {
    pub primitive: PrimitiveType,
    pub vertices: Vec<Vertex>,
}

/// Decode a display list until the buffer is exhausted. `0x00` bytes
/// between commands are padding and are skipped.
pub fn decode(r: &mut Reader<'_>, descriptor: &VertexDescriptor) -> StreamResult<Vec<DrawCommand>> {
    let mut commands = Vec::new();
    let present = descriptor.present();
    while r.remaining() > 0 {
        let opcode = r.peek_at(r.position(), |r| r.u8())?;
        if opcode == 0x00 {
            r.u8()?;
            continue;
        }
        let Some(primitive) = PrimitiveType::from_opcode(opcode) else {
            return Err(StreamError::Malformed {
                site: "display_list".to_string(),
                why: format!("unrecognized opcode {opcode:#x}"),
            });
        };
        r.u8()?;
        let count = r.u16()?;
        let mut vertices = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut values = Vec::with_capacity(present.len());
            for &(attr, format) in &present {
                let value = read_attribute(r, attr, format)?;
                values.push((attr, value));
            }
            vertices.push(Vertex { values });
        }
        commands.push(DrawCommand { primitive, vertices });
    }
    Ok(commands)
}

fn read_attribute(r: &mut Reader<'_>, attr: VertexAttribute, format: AttributeFormat) -> StreamResult<u32> {
    if attr == VertexAttribute::PositionNormalMatrixIndex {
        return match format {
            AttributeFormat::Direct => Ok(u32::from(r.u8()?)),
            other => Err(StreamError::Malformed {
                site: "display_list".to_string(),
                why: format!("PositionNormalMatrixIndex read as {other:?}, only Direct is valid"),
            }),
        };
    }
    match format {
        AttributeFormat::Byte => Ok(u32::from(r.u8()?)),
        AttributeFormat::Short => Ok(u32::from(r.u16()?)),
        AttributeFormat::Direct => Err(StreamError::Malformed {
            site: "display_list".to_string(),
            why: format!("{attr:?} cannot use Direct format"),
        }),
        AttributeFormat::None => unreachable!("None attributes are filtered out of the descriptor"),
    }
}

/// Encode `commands` back into a raw display list, in the same shape the
/// read side expects: one opcode byte, a u16 count, then per-vertex
/// attribute values in descriptor order. Does not attempt to merge or
/// restructure primitives; callers choose the primitive breakdown.
pub fn encode(w: &mut Writer, descriptor: &VertexDescriptor, commands: &[DrawCommand]) -> StreamResult<()> {
    let present = descriptor.present();
    for command in commands {
        w.u8(command.primitive.to_opcode());
        w.u16(command.vertices.len() as u16);
        for vertex in &command.vertices {
            for &(attr, format) in &present {
                let value = vertex
                    .values
                    .iter()
                    .find(|(a, _)| *a == attr)
                    .map(|(_, v)| *v)
                    .ok_or_else(|| StreamError::Malformed {
                        site: "display_list".to_string(),
                        why: format!("vertex missing required attribute {attr:?}"),
                    })?;
                write_attribute(w, attr, format, value)?;
            }
        }
    }
    Ok(())
}

fn write_attribute(w: &mut Writer, attr: VertexAttribute, format: AttributeFormat, value: u32) -> StreamResult<()> {
    if attr == VertexAttribute::PositionNormalMatrixIndex {
        if format != AttributeFormat::Direct {
            return Err(StreamError::Malformed {
                site: "display_list".to_string(),
                why: "PositionNormalMatrixIndex must encode as Direct".to_string(),
            });
        }
        w.u8(value as u8);
        return Ok(());
    }
    match format.index_width()? {
        1 => w.u8(value as u8),
        2 => w.u16(value as u16),
        _ => unreachable!("index_width only returns 1 or 2"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::Endian;

    fn triangle_descriptor() -> VertexDescriptor {
        let mut d = VertexDescriptor::new();
        d.set(VertexAttribute::Position, AttributeFormat::Short);
        d.set(VertexAttribute::Color0, AttributeFormat::Byte);
        d
    }

    #[test]
    fn roundtrips_a_single_triangle() {
        let descriptor = triangle_descriptor();
        let commands = vec![DrawCommand {
            primitive: PrimitiveType::Triangles,
            vertices: vec![
                Vertex { values: vec![(VertexAttribute::Position, 0), (VertexAttribute::Color0, 1)] },
                Vertex { values: vec![(VertexAttribute::Position, 1), (VertexAttribute::Color0, 2)] },
                Vertex { values: vec![(VertexAttribute::Position, 2), (VertexAttribute::Color0, 3)] },
            ],
        }];
        let mut w = Writer::new(Endian::Big);
        encode(&mut w, &descriptor, &commands).unwrap();
        let buf = w.finalize().unwrap();
        let mut r = Reader::new(&buf, Endian::Big);
        let decoded = decode(&mut r, &descriptor).unwrap();
        assert_eq!(decoded, commands);
    }

    #[test]
    fn skips_zero_padding_between_commands() {
        let descriptor = VertexDescriptor::new();
        let mut w = Writer::new(Endian::Big);
        w.u8(PrimitiveType::Points.to_opcode());
        w.u16(0);
        w.u8(0);
        w.u8(0);
        let buf = w.finalize().unwrap();
        let mut r = Reader::new(&buf, Endian::Big);
        let decoded = decode(&mut r, &descriptor).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].vertices.len(), 0);
    }

    #[test]
    fn direct_format_required_for_pnm_index() {
        let mut descriptor = VertexDescriptor::new();
        descriptor.set(VertexAttribute::PositionNormalMatrixIndex, AttributeFormat::Byte);
        let commands = vec![DrawCommand {
            primitive: PrimitiveType::Triangles,
            vertices: vec![Vertex { values: vec![(VertexAttribute::PositionNormalMatrixIndex, 0)] }],
        }];
        let mut w = Writer::new(Endian::Big);
        assert!(encode(&mut w, &descriptor, &commands).is_err());
    }

    #[test]
    fn unrecognized_opcode_is_malformed() {
        let data = [0xFFu8, 0, 0];
        let mut r = Reader::new(&data, Endian::Big);
        let descriptor = VertexDescriptor::new();
        assert!(decode(&mut r, &descriptor).is_err());
    }
}
