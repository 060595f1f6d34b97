//! Mario Kart Wii collision data (KCL): a spatial hash over collision
//! triangles ("prisms").
//!
//! The header and the three flat attribute arrays it points to (vertex
//! positions, face normals, prism records) have a well-known layout; the
//! octree-style "block data" that follows does not, it is a run of
//! per-cell prism-index lists whose length is only discoverable by
//! walking the tree from the root. This crate parses the header and
//! attribute arrays into typed fields, matching a complete implementation
//! for everything a converter pipeline needs (prism thickness, area
//! bounds, the prism table itself), and keeps the block data as an opaque
//! blob so an unchanged file round-trips exactly without reimplementing
//! the octree walk.

use jstudio_stream::{Reader, StreamResult, Writer};

use crate::error::KclError;

const HEADER_SIZE: usize = 0x3C;
const PRISM_RECORD_SIZE: usize = 0x10;

/// One collision triangle: thickness plus indices into the position/normal
/// arrays (face normal, then the three edge normals), plus an attribute
/// bitfield (surface type, effects, etc.) left opaque.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prism {
    pub height: f32,
    pub position_index: u16,
    pub face_normal_index: u16,
    pub edge_normal_indices: [u16; 3],
    pub attribute: u16,
}

impl Prism {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        Ok(Self {
            height: r.f32()?,
            position_index: r.u16()?,
            face_normal_index: r.u16()?,
            edge_normal_indices: [r.u16()?, r.u16()?, r.u16()?],
            attribute: r.u16()?,
        })
    }

    fn write(self, w: &mut Writer) {
        w.f32(self.height);
        w.u16(self.position_index);
        w.u16(self.face_normal_index);
        for idx in self.edge_normal_indices {
            w.u16(idx);
        }
        w.u16(self.attribute);
    }
}

/// A decoded collision model.
#[derive(Debug, Clone, PartialEq)]
pub struct Kcl {
    pub positions: Vec<(f32, f32, f32)>,
    pub normals: Vec<(f32, f32, f32)>,
    pub prisms: Vec<Prism>,
    pub prism_thickness: f32,
    pub area_min_position: (f32, f32, f32),
    pub area_x_width_mask: u32,
    pub area_y_width_mask: u32,
    pub area_z_width_mask: u32,
    pub block_width_shift: i32,
    pub area_x_blocks_shift: i32,
    pub area_xy_blocks_shift: i32,
    pub sphere_radius: f32,
    /// The octree/block-index data this crate does not interpret,
    /// preserved byte-for-byte between the end of the prism table and
    /// end of file.
    pub block_data: Vec<u8>,
}

fn read_vec3(r: &mut Reader<'_>) -> StreamResult<(f32, f32, f32)> {
    Ok((r.f32()?, r.f32()?, r.f32()?))
}

fn write_vec3(w: &mut Writer, v: (f32, f32, f32)) {
    w.f32(v.0);
    w.f32(v.1);
    w.f32(v.2);
}

impl Kcl {
    /// Decode a `.kcl` file.
    pub fn read(data: &[u8]) -> StreamResult<Self> {
        let mut r = Reader::new(data, binrw::Endian::Big);
        let pos_data_offset = r.u32()?;
        let nrm_data_offset = r.u32()?;
        let prism_data_offset = r.u32()?;
        let block_data_offset = r.u32()?;
        let prism_thickness = r.f32()?;
        let area_min_position = read_vec3(&mut r)?;
        let area_x_width_mask = r.u32()?;
        let area_y_width_mask = r.u32()?;
        let area_z_width_mask = r.u32()?;
        let block_width_shift = r.i32()?;
        let area_x_blocks_shift = r.i32()?;
        let area_xy_blocks_shift = r.i32()?;
        let sphere_radius = r.f32()?;
        debug_assert_eq!(r.position(), HEADER_SIZE);

        // `prism_data_offset` is conventionally one record short of the
        // true start (the format reserves index 0 as "no prism"), so the
        // real table begins one `Prism`'s width later.
        let prism_table_start = prism_data_offset as usize + PRISM_RECORD_SIZE;
        let prism_count = (block_data_offset as usize - prism_table_start) / PRISM_RECORD_SIZE;

        let position_count = (prism_table_start - pos_data_offset as usize) / 12;
        let normal_count = (pos_data_offset as usize - nrm_data_offset as usize) / 12;

        let positions =
            r.at(pos_data_offset as usize, |r| r.read_array(position_count, read_vec3))?;
        let normals = r.at(nrm_data_offset as usize, |r| r.read_array(normal_count, read_vec3))?;
        let prisms = r.at(prism_table_start, |r| r.read_array(prism_count, Prism::read))?;
        let block_data = data[block_data_offset as usize..].to_vec();

        Ok(Self {
            positions,
            normals,
            prisms,
            prism_thickness,
            area_min_position,
            area_x_width_mask,
            area_y_width_mask,
            area_z_width_mask,
            block_width_shift,
            area_x_blocks_shift,
            area_xy_blocks_shift,
            sphere_radius,
            block_data,
        })
    }

    /// Encode back to a `.kcl` file.
    pub fn write(&self) -> Vec<u8> {
        let normals_offset = HEADER_SIZE as u32;
        let positions_offset = normals_offset + self.normals.len() as u32 * 12;
        let prism_table_offset = positions_offset + self.positions.len() as u32 * 12;
        let prism_data_offset = prism_table_offset - PRISM_RECORD_SIZE as u32;
        let block_data_offset = prism_table_offset + self.prisms.len() as u32 * PRISM_RECORD_SIZE as u32;

        let mut w = Writer::new(binrw::Endian::Big);
        w.u32(positions_offset);
        w.u32(normals_offset);
        w.u32(prism_data_offset);
        w.u32(block_data_offset);
        w.f32(self.prism_thickness);
        write_vec3(&mut w, self.area_min_position);
        w.u32(self.area_x_width_mask);
        w.u32(self.area_y_width_mask);
        w.u32(self.area_z_width_mask);
        w.i32(self.block_width_shift);
        w.i32(self.area_x_blocks_shift);
        w.i32(self.area_xy_blocks_shift);
        w.f32(self.sphere_radius);
        for n in &self.normals {
            write_vec3(&mut w, *n);
        }
        for p in &self.positions {
            write_vec3(&mut w, *p);
        }
        // The record at `prism_data_offset` is a dummy, skipped on read.
        for _ in 0..PRISM_RECORD_SIZE {
            w.u8(0);
        }
        for prism in &self.prisms {
            prism.write(&mut w);
        }
        w.bytes(&self.block_data);
        w.finalize().expect("kcl encoding defines no deferred links")
    }
}

impl crate::FormatCodec for Kcl {
    type Error = KclError;

    fn read(data: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self::read(data)?)
    }

    fn write(&self) -> Result<Vec<u8>, Self::Error> {
        Ok(self.write())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Kcl {
        Kcl {
            positions: vec![(0.0, 0.0, 0.0), (10.0, 0.0, 0.0), (0.0, 10.0, 0.0)],
            normals: vec![(0.0, 1.0, 0.0)],
            prisms: vec![Prism {
                height: 300.0,
                position_index: 0,
                face_normal_index: 0,
                edge_normal_indices: [0, 0, 0],
                attribute: 0,
            }],
            prism_thickness: 300.0,
            area_min_position: (-1000.0, -1000.0, -1000.0),
            area_x_width_mask: 0xFFFF,
            area_y_width_mask: 0xFFFF,
            area_z_width_mask: 0xFFFF,
            block_width_shift: 10,
            area_x_blocks_shift: 4,
            area_xy_blocks_shift: 8,
            sphere_radius: 250.0,
            block_data: vec![0u8; 16],
        }
    }

    #[test]
    fn roundtrips_header_and_tables() {
        let kcl = sample();
        let bytes = kcl.write();
        let decoded = Kcl::read(&bytes).unwrap();
        assert_eq!(decoded, kcl);
    }

    #[test]
    fn opaque_block_data_survives_unchanged() {
        let mut kcl = sample();
        kcl.block_data = vec![1, 2, 3, 4, 5];
        let bytes = kcl.write();
        let decoded = Kcl::read(&bytes).unwrap();
        assert_eq!(decoded.block_data, vec![1, 2, 3, 4, 5]);
    }
}
