//! Mario Kart Wii course data (`RKMD`/KMP): start points, AI paths, item
//! routes, objects, cameras, and the trigger volumes collectively called
//! "areas".
//!
//! Most sections share one 8-byte header (4CC, entry count, a
//! section-specific extra `u16`) followed by fixed-size records, so
//! [`SectionHeader`] and [`read_section`]/[`write_section`] factor that
//! shape out once; only `AREA`'s records vary in *meaning* (not size)
//! depending on the area's `kind` byte, which [`AreaKind`] models.

use jstudio_stream::{Reader, StreamResult, Writer};

use crate::error::KmpError;

const MAGIC: &[u8; 4] = b"RKMD";
const SECTION_ORDER: [&[u8; 4]; 15] = [
    b"KTPT", b"ENPT", b"ENPH", b"ITPT", b"ITPH", b"CKPT", b"CKPH", b"GOBJ", b"POTI", b"AREA", b"CAME",
    b"JGPT", b"CNPT", b"MSPT", b"STGI",
];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Vec3 {
    x: f32,
    y: f32,
    z: f32,
}

impl Vec3 {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        Ok(Self { x: r.f32()?, y: r.f32()?, z: r.f32()? })
    }

    fn write(self, w: &mut Writer) {
        w.f32(self.x);
        w.f32(self.y);
        w.f32(self.z);
    }
}

/// A kart starting position (`KTPT`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartPoint {
    pub position: Vec3Public,
    pub rotation: Vec3Public,
    pub player_index: i16,
}

/// Public re-export shape for `Vec3`, since format modules expose plain
/// position/rotation triples without pulling in a math crate.
pub type Vec3Public = (f32, f32, f32);

fn pub3(v: Vec3) -> Vec3Public {
    (v.x, v.y, v.z)
}

fn priv3(v: Vec3Public) -> Vec3 {
    Vec3 { x: v.0, y: v.1, z: v.2 }
}

impl StartPoint {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        let position = pub3(Vec3::read(r)?);
        let rotation = pub3(Vec3::read(r)?);
        let player_index = r.i16()?;
        r.skip(2)?;
        Ok(Self { position, rotation, player_index })
    }

    fn write(self, w: &mut Writer) {
        priv3(self.position).write(w);
        priv3(self.rotation).write(w);
        w.i16(self.player_index);
        w.u16(0xFFFF);
    }
}

/// One node of an enemy or item AI path (`ENPT`/`ITPT`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutePoint {
    pub position: Vec3Public,
    pub deviation: f32,
    pub setting_1: u16,
    pub setting_2: u8,
    pub setting_3: u8,
}

impl RoutePoint {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        Ok(Self {
            position: pub3(Vec3::read(r)?),
            deviation: r.f32()?,
            setting_1: r.u16()?,
            setting_2: r.u8()?,
            setting_3: r.u8()?,
        })
    }

    fn write(self, w: &mut Writer) {
        priv3(self.position).write(w);
        w.f32(self.deviation);
        w.u16(self.setting_1);
        w.u8(self.setting_2);
        w.u8(self.setting_3);
    }
}

/// A group of consecutive path points with up to 6 predecessor/successor
/// group indices each (`ENPH`/`ITPH`/`CKPH`), forming a DAG over the flat
/// point arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct PathGroup {
    pub start_index: u8,
    pub point_count: u8,
    pub predecessors: Vec<u8>,
    pub successors: Vec<u8>,
}

impl PathGroup {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        let start_index = r.u8()?;
        let point_count = r.u8()?;
        let mut predecessors = r.read_array(6, Reader::u8)?;
        let mut successors = r.read_array(6, Reader::u8)?;
        r.skip(2)?;
        predecessors.retain(|&v| v != 0xFF);
        successors.retain(|&v| v != 0xFF);
        Ok(Self { start_index, point_count, predecessors, successors })
    }

    fn write(&self, w: &mut Writer) {
        w.u8(self.start_index);
        w.u8(self.point_count);
        for i in 0..6 {
            w.u8(self.predecessors.get(i).copied().unwrap_or(0xFF));
        }
        for i in 0..6 {
            w.u8(self.successors.get(i).copied().unwrap_or(0xFF));
        }
        w.u16(0xFFFF);
    }
}

/// A checkpoint quad (`CKPT`): left and right boundary points on the
/// track's 2D course-completion line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckPoint {
    pub left: (f32, f32),
    pub right: (f32, f32),
    pub respawn_index: u8,
    pub lap_check_kind: i8,
    pub previous_index: u8,
    pub next_index: u8,
}

impl CheckPoint {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        let left = (r.f32()?, r.f32()?);
        let right = (r.f32()?, r.f32()?);
        let respawn_index = r.u8()?;
        let lap_check_kind = r.i8()?;
        let previous_index = r.u8()?;
        let next_index = r.u8()?;
        Ok(Self { left, right, respawn_index, lap_check_kind, previous_index, next_index })
    }

    fn write(self, w: &mut Writer) {
        w.f32(self.left.0);
        w.f32(self.left.1);
        w.f32(self.right.0);
        w.f32(self.right.1);
        w.u8(self.respawn_index);
        w.i8(self.lap_check_kind);
        w.u8(self.previous_index);
        w.u8(self.next_index);
    }
}

/// A placed object (`GOBJ`): an id, transform, and the 8 object-specific
/// parameters whose meaning depends entirely on the id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameObject {
    pub object_id: u16,
    pub position: Vec3Public,
    pub rotation: Vec3Public,
    pub scale: Vec3Public,
    pub route_id: u16,
    pub settings: [u16; 8],
    pub presence_flags: u16,
}

impl GameObject {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        let object_id = r.u16()?;
        r.skip(2)?;
        let position = pub3(Vec3::read(r)?);
        let rotation = pub3(Vec3::read(r)?);
        let scale = pub3(Vec3::read(r)?);
        let route_id = r.u16()?;
        let settings = {
            let v = r.read_array(8, Reader::u16)?;
            let mut arr = [0u16; 8];
            arr.copy_from_slice(&v);
            arr
        };
        let presence_flags = r.u16()?;
        Ok(Self { object_id, position, rotation, scale, route_id, settings, presence_flags })
    }

    fn write(self, w: &mut Writer) {
        w.u16(self.object_id);
        w.u16(0);
        priv3(self.position).write(w);
        priv3(self.rotation).write(w);
        priv3(self.scale).write(w);
        w.u16(self.route_id);
        for v in self.settings {
            w.u16(v);
        }
        w.u16(self.presence_flags);
    }
}

/// One point on an item/enemy route (`POTI`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutePathPoint {
    pub position: Vec3Public,
    pub interpolation_setting: u16,
    pub speed_setting: u16,
}

/// A route used by moving objects and cameras (`POTI`).
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub smooth: u8,
    pub cyclic: u8,
    pub points: Vec<RoutePathPoint>,
}

/// The boundary-volume-specific parameters of an `AREA` record, reduced
/// from the on-disk `(shape, type, params[2])` quadruple into the variant
/// that quadruple actually selects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AreaKind {
    Camera { camera_index: u8 },
    EnvEffect { effect_id: u16 },
    Fog { bfg_index: u8 },
    PullCamera { camera_index: u8 },
    EnemyFalling,
    MapArea2D,
    SoundEffect { sound_id: u16 },
    ObjectGroupClip { group_index: u16 },
    /// A speed-modifier / route-restriction zone whose effect depends on a
    /// pair of raw parameters: equal parameters mean unconstrained, and
    /// otherwise the parameters pick both a direction-aware bound and a
    /// whitelist/blacklist sense. See [`BoundaryArea::from_params`].
    Boundary(BoundaryArea),
}

/// The `params[0]`/`params[1]` pair attached to a boundary-style area,
/// with the constraint semantics actual course data relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryArea {
    params: [u16; 2],
}

/// Whether a boundary area's member list names who it applies to or who
/// it excludes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintType {
    Whitelist,
    Blacklist,
}

impl BoundaryArea {
    /// Wrap a raw `params` pair as read from disk.
    pub fn from_params(params: [u16; 2]) -> Self {
        Self { params }
    }

    /// The raw pair, for writing back unchanged.
    pub fn params(self) -> [u16; 2] {
        self.params
    }

    /// `false` when both parameters are equal: the area applies
    /// unconditionally, with no whitelist/blacklist member range.
    pub fn is_constrained(self) -> bool {
        self.params[0] != self.params[1]
    }

    /// Ascending parameters select a whitelist, descending select a
    /// blacklist. Meaningless (but still well-defined, `Whitelist`) when
    /// unconstrained.
    pub fn constraint_type(self) -> ConstraintType {
        if self.params[1] > self.params[0] {
            ConstraintType::Whitelist
        } else {
            ConstraintType::Blacklist
        }
    }

    /// Inclusive lower bound of the member range: the smaller parameter.
    pub fn inclusive_lower_bound(self) -> u16 {
        self.params[0].min(self.params[1])
    }

    /// Inclusive upper bound of the member range: one less than the
    /// larger parameter, since the on-disk upper parameter is exclusive.
    pub fn inclusive_upper_bound(self) -> u16 {
        self.params[0].max(self.params[1]) - 1
    }
}

/// A trigger volume (`AREA`): a transform plus a kind-specific payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Area {
    pub shape: u8,
    pub priority: u8,
    pub position: Vec3Public,
    pub rotation: Vec3Public,
    pub scale: Vec3Public,
    pub rail_id: u8,
    pub enemy_link_id: u8,
    pub kind: AreaKindRaw,
}

/// `kind` stored as the raw `(type_byte, params)` pair so `Area::read`
/// stays infallible on unrecognized type bytes; call
/// [`Area::resolve_kind`] to get the typed [`AreaKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaKindRaw {
    pub type_byte: u8,
    pub params: [u16; 2],
}

impl Area {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        let shape = r.u8()?;
        let type_byte = r.u8()?;
        let priority = r.u8()?;
        r.skip(1)?; // alignment to the following transform
        let position = pub3(Vec3::read(r)?);
        let rotation = pub3(Vec3::read(r)?);
        let scale = pub3(Vec3::read(r)?);
        let params = [r.u16()?, r.u16()?];
        let rail_id = r.u8()?;
        let enemy_link_id = r.u8()?;
        r.skip(2)?;
        Ok(Self {
            shape,
            priority,
            position,
            rotation,
            scale,
            rail_id,
            enemy_link_id,
            kind: AreaKindRaw { type_byte, params },
        })
    }

    fn write(self, w: &mut Writer) {
        w.u8(self.shape);
        w.u8(self.kind.type_byte);
        w.u8(self.priority);
        w.u8(0);
        priv3(self.position).write(w);
        priv3(self.rotation).write(w);
        priv3(self.scale).write(w);
        w.u16(self.kind.params[0]);
        w.u16(self.kind.params[1]);
        w.u8(self.rail_id);
        w.u8(self.enemy_link_id);
        w.u16(0);
    }

    /// Resolve the raw type byte/params into a typed [`AreaKind`].
    pub fn resolve_kind(self) -> Result<AreaKind, KmpError> {
        let p = self.kind.params;
        Ok(match self.kind.type_byte {
            0 => AreaKind::Camera { camera_index: p[0] as u8 },
            1 => AreaKind::EnvEffect { effect_id: p[0] },
            2 => AreaKind::Fog { bfg_index: p[0] as u8 },
            3 => AreaKind::PullCamera { camera_index: p[0] as u8 },
            4 => AreaKind::EnemyFalling,
            5 => AreaKind::MapArea2D,
            6 => AreaKind::SoundEffect { sound_id: p[0] },
            7 => AreaKind::ObjectGroupClip { group_index: p[0] },
            8 => AreaKind::Boundary(BoundaryArea::from_params(p)),
            other => return Err(KmpError::UnknownAreaType(other)),
        })
    }
}

/// A replay/intro camera (`CAME`). Fields beyond the transform and route
/// reference are stored but not individually named: they configure the
/// cinematic camera's motion curve and are opaque to this crate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub kind: u8,
    pub next_index: u8,
    pub shake: u8,
    pub route_id: u8,
    pub point_speed: u16,
    pub zoom_speed: u16,
    pub view_speed: u16,
    pub start_flag: u8,
    pub movie_flag: u8,
    pub position: Vec3Public,
    pub rotation: Vec3Public,
    pub zoom_start: f32,
    pub zoom_end: f32,
    pub view_start: Vec3Public,
    pub view_end: Vec3Public,
    pub time: f32,
}

impl Camera {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        let kind = r.u8()?;
        let next_index = r.u8()?;
        let shake = r.u8()?;
        let route_id = r.u8()?;
        let point_speed = r.u16()?;
        let zoom_speed = r.u16()?;
        let view_speed = r.u16()?;
        let start_flag = r.u8()?;
        let movie_flag = r.u8()?;
        let position = pub3(Vec3::read(r)?);
        let rotation = pub3(Vec3::read(r)?);
        let zoom_start = r.f32()?;
        let zoom_end = r.f32()?;
        let view_start = pub3(Vec3::read(r)?);
        let view_end = pub3(Vec3::read(r)?);
        let time = r.f32()?;
        Ok(Self {
            kind,
            next_index,
            shake,
            route_id,
            point_speed,
            zoom_speed,
            view_speed,
            start_flag,
            movie_flag,
            position,
            rotation,
            zoom_start,
            zoom_end,
            view_start,
            view_end,
            time,
        })
    }

    fn write(self, w: &mut Writer) {
        w.u8(self.kind);
        w.u8(self.next_index);
        w.u8(self.shake);
        w.u8(self.route_id);
        w.u16(self.point_speed);
        w.u16(self.zoom_speed);
        w.u16(self.view_speed);
        w.u8(self.start_flag);
        w.u8(self.movie_flag);
        priv3(self.position).write(w);
        priv3(self.rotation).write(w);
        w.f32(self.zoom_start);
        w.f32(self.zoom_end);
        priv3(self.view_start).write(w);
        priv3(self.view_end).write(w);
        w.f32(self.time);
    }
}

/// A respawn point (`JGPT`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RespawnPoint {
    pub position: Vec3Public,
    pub rotation: Vec3Public,
    pub sound_id: u16,
    pub range_id: u16,
}

impl RespawnPoint {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        Ok(Self {
            position: pub3(Vec3::read(r)?),
            rotation: pub3(Vec3::read(r)?),
            sound_id: r.u16()?,
            range_id: r.u16()?,
        })
    }

    fn write(self, w: &mut Writer) {
        priv3(self.position).write(w);
        priv3(self.rotation).write(w);
        w.u16(self.sound_id);
        w.u16(self.range_id);
    }
}

/// A cannon launch target (`CNPT`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannonPoint {
    pub position: Vec3Public,
    pub rotation: Vec3Public,
    pub shoot_effect: u16,
}

impl CannonPoint {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        Ok(Self { position: pub3(Vec3::read(r)?), rotation: pub3(Vec3::read(r)?), shoot_effect: r.u16()? })
    }

    fn write(self, w: &mut Writer) {
        priv3(self.position).write(w);
        priv3(self.rotation).write(w);
        w.u16(self.shoot_effect);
        w.u16(0xFFFF);
    }
}

/// A battle-mode mission success point (`MSPT`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionPoint {
    pub position: Vec3Public,
    pub rotation: Vec3Public,
    pub unknown: u32,
}

impl MissionPoint {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        Ok(Self { position: pub3(Vec3::read(r)?), rotation: pub3(Vec3::read(r)?), unknown: r.u32()? })
    }

    fn write(self, w: &mut Writer) {
        priv3(self.position).write(w);
        priv3(self.rotation).write(w);
        w.u32(self.unknown);
    }
}

/// Course-wide settings (`STGI`): always exactly one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageInfo {
    pub lap_count: u8,
    pub pole_position: u8,
    pub driver_distance: u8,
    pub lens_flare_flashing: u8,
    pub flare_color: u32,
    pub speed_modifier: f32,
}

impl StageInfo {
    fn read(r: &mut Reader<'_>) -> StreamResult<Self> {
        let lap_count = r.u8()?;
        let pole_position = r.u8()?;
        let driver_distance = r.u8()?;
        let lens_flare_flashing = r.u8()?;
        r.skip(1)?;
        let flare_color = r.u32()? >> 8;
        r.skip(1)?;
        let speed_modifier = f32::from_bits(r.u32()?);
        Ok(Self { lap_count, pole_position, driver_distance, lens_flare_flashing, flare_color, speed_modifier })
    }

    fn write(self, w: &mut Writer) {
        w.u8(self.lap_count);
        w.u8(self.pole_position);
        w.u8(self.driver_distance);
        w.u8(self.lens_flare_flashing);
        w.u8(0);
        w.u32(self.flare_color << 8);
        w.u8(0);
        w.u32(self.speed_modifier.to_bits());
    }
}

/// A fully decoded course file.
#[derive(Debug, Clone, PartialEq)]
pub struct Kmp {
    pub start_points: Vec<StartPoint>,
    pub enemy_points: Vec<RoutePoint>,
    pub enemy_paths: Vec<PathGroup>,
    pub item_points: Vec<RoutePoint>,
    pub item_paths: Vec<PathGroup>,
    pub check_points: Vec<CheckPoint>,
    pub check_paths: Vec<PathGroup>,
    pub objects: Vec<GameObject>,
    pub routes: Vec<Route>,
    pub areas: Vec<Area>,
    pub cameras: Vec<Camera>,
    pub respawn_points: Vec<RespawnPoint>,
    pub cannon_points: Vec<CannonPoint>,
    pub mission_points: Vec<MissionPoint>,
    pub stage_info: StageInfo,
}

fn read_fixed_section<T>(
    r: &mut Reader<'_>,
    magic: &[u8; 4],
    read_one: impl FnMut(&mut Reader<'_>) -> StreamResult<T>,
) -> StreamResult<Vec<T>> {
    r.magic(magic)?;
    let count = r.u16()?;
    r.skip(2)?;
    r.read_array(count as usize, read_one)
}

fn write_fixed_section<T: Copy>(w: &mut Writer, magic: &[u8; 4], items: &[T], write_one: impl Fn(T, &mut Writer)) {
    w.bytes(magic);
    w.u16(items.len() as u16);
    w.u16(0);
    for &item in items {
        write_one(item, w);
    }
}

fn write_path_group_section(w: &mut Writer, magic: &[u8; 4], items: &[PathGroup]) {
    w.bytes(magic);
    w.u16(items.len() as u16);
    w.u16(0);
    for group in items {
        group.write(w);
    }
}

fn read_routes(r: &mut Reader<'_>) -> StreamResult<Vec<Route>> {
    r.magic(b"POTI")?;
    let route_count = r.u16()?;
    let _total_points = r.u16()?;
    let mut routes = Vec::with_capacity(route_count as usize);
    for _ in 0..route_count {
        let point_count = r.u16()?;
        let smooth = r.u8()?;
        let cyclic = r.u8()?;
        let points = r.read_array(point_count as usize, |r| {
            Ok(RoutePathPoint {
                position: pub3(Vec3::read(r)?),
                interpolation_setting: r.u16()?,
                speed_setting: r.u16()?,
            })
        })?;
        routes.push(Route { smooth, cyclic, points });
    }
    Ok(routes)
}

fn write_routes(w: &mut Writer, routes: &[Route]) {
    w.bytes(b"POTI");
    w.u16(routes.len() as u16);
    w.u16(routes.iter().map(|route| route.points.len() as u16).sum());
    for route in routes {
        w.u16(route.points.len() as u16);
        w.u8(route.smooth);
        w.u8(route.cyclic);
        for point in &route.points {
            priv3(point.position).write(w);
            w.u16(point.interpolation_setting);
            w.u16(point.speed_setting);
        }
    }
}

impl Kmp {
    /// Decode a `.kmp` file.
    pub fn read(data: &[u8]) -> StreamResult<Self> {
        let mut r = Reader::new(data, binrw::Endian::Big);
        r.magic(MAGIC)?;
        let _file_length = r.u32()?;
        let section_count = r.u16()?;
        let header_length = r.u16()?;
        let _version = r.u32()?;
        let section_offsets = r.read_array(section_count as usize, Reader::u32)?;

        let seek = |r: &mut Reader<'_>, index: usize| -> StreamResult<()> {
            r.seek_to(header_length as usize + section_offsets[index] as usize)
        };

        seek(&mut r, 0)?;
        let start_points = read_fixed_section(&mut r, b"KTPT", StartPoint::read)?;
        seek(&mut r, 1)?;
        let enemy_points = read_fixed_section(&mut r, b"ENPT", RoutePoint::read)?;
        seek(&mut r, 2)?;
        let enemy_paths = read_fixed_section(&mut r, b"ENPH", PathGroup::read)?;
        seek(&mut r, 3)?;
        let item_points = read_fixed_section(&mut r, b"ITPT", RoutePoint::read)?;
        seek(&mut r, 4)?;
        let item_paths = read_fixed_section(&mut r, b"ITPH", PathGroup::read)?;
        seek(&mut r, 5)?;
        let check_points = read_fixed_section(&mut r, b"CKPT", CheckPoint::read)?;
        seek(&mut r, 6)?;
        let check_paths = read_fixed_section(&mut r, b"CKPH", PathGroup::read)?;
        seek(&mut r, 7)?;
        let objects = read_fixed_section(&mut r, b"GOBJ", GameObject::read)?;
        seek(&mut r, 8)?;
        let routes = read_routes(&mut r)?;
        seek(&mut r, 9)?;
        let areas = read_fixed_section(&mut r, b"AREA", Area::read)?;
        seek(&mut r, 10)?;
        let cameras = read_fixed_section(&mut r, b"CAME", Camera::read)?;
        seek(&mut r, 11)?;
        let respawn_points = read_fixed_section(&mut r, b"JGPT", RespawnPoint::read)?;
        seek(&mut r, 12)?;
        let cannon_points = read_fixed_section(&mut r, b"CNPT", CannonPoint::read)?;
        seek(&mut r, 13)?;
        let mission_points = read_fixed_section(&mut r, b"MSPT", MissionPoint::read)?;
        seek(&mut r, 14)?;
        let mut stage_info_vec = read_fixed_section(&mut r, b"STGI", StageInfo::read)?;
        let stage_info = stage_info_vec.pop().unwrap_or(StageInfo {
            lap_count: 3,
            pole_position: 0,
            driver_distance: 0,
            lens_flare_flashing: 0,
            flare_color: 0xFFFF_FF,
            speed_modifier: 0.0,
        });

        Ok(Self {
            start_points,
            enemy_points,
            enemy_paths,
            item_points,
            item_paths,
            check_points,
            check_paths,
            objects,
            routes,
            areas,
            cameras,
            respawn_points,
            cannon_points,
            mission_points,
            stage_info,
        })
    }

    /// Encode back to a `.kmp` file.
    pub fn write(&self) -> Vec<u8> {
        let header_length = 4 + 4 + 2 + 2 + 4 + SECTION_ORDER.len() as u32 * 4;

        let mut body = Writer::new(binrw::Endian::Big);
        let mut offsets = Vec::with_capacity(SECTION_ORDER.len());
        let mut push = |body: &mut Writer, offsets: &mut Vec<u32>| offsets.push(body.position() as u32);

        push(&mut body, &mut offsets);
        write_fixed_section(&mut body, b"KTPT", &self.start_points, StartPoint::write);
        push(&mut body, &mut offsets);
        write_fixed_section(&mut body, b"ENPT", &self.enemy_points, RoutePoint::write);
        push(&mut body, &mut offsets);
        write_path_group_section(&mut body, b"ENPH", &self.enemy_paths);
        push(&mut body, &mut offsets);
        write_fixed_section(&mut body, b"ITPT", &self.item_points, RoutePoint::write);
        push(&mut body, &mut offsets);
        write_path_group_section(&mut body, b"ITPH", &self.item_paths);
        push(&mut body, &mut offsets);
        write_fixed_section(&mut body, b"CKPT", &self.check_points, CheckPoint::write);
        push(&mut body, &mut offsets);
        write_path_group_section(&mut body, b"CKPH", &self.check_paths);
        push(&mut body, &mut offsets);
        write_fixed_section(&mut body, b"GOBJ", &self.objects, GameObject::write);
        push(&mut body, &mut offsets);
        write_routes(&mut body, &self.routes);
        push(&mut body, &mut offsets);
        write_fixed_section(&mut body, b"AREA", &self.areas, Area::write);
        push(&mut body, &mut offsets);
        write_fixed_section(&mut body, b"CAME", &self.cameras, Camera::write);
        push(&mut body, &mut offsets);
        write_fixed_section(&mut body, b"JGPT", &self.respawn_points, RespawnPoint::write);
        push(&mut body, &mut offsets);
        write_fixed_section(&mut body, b"CNPT", &self.cannon_points, CannonPoint::write);
        push(&mut body, &mut offsets);
        write_fixed_section(&mut body, b"MSPT", &self.mission_points, MissionPoint::write);
        push(&mut body, &mut offsets);
        write_fixed_section(&mut body, b"STGI", &[self.stage_info], StageInfo::write);

        let body_bytes = body.as_slice().to_vec();

        let mut w = Writer::new(binrw::Endian::Big);
        w.bytes(MAGIC);
        w.u32(header_length + body_bytes.len() as u32);
        w.u16(SECTION_ORDER.len() as u16);
        w.u16(header_length as u16);
        w.u32(0x9d8);
        for offset in offsets {
            w.u32(offset);
        }
        w.bytes(&body_bytes);
        w.finalize().expect("kmp encoding defines no deferred links")
    }
}

impl crate::FormatCodec for Kmp {
    type Error = KmpError;

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

    #[test]
    fn boundary_area_with_ascending_params_is_whitelist_with_exclusive_upper() {
        let area = BoundaryArea::from_params([5, 8]);
        assert!(area.is_constrained());
        assert_eq!(area.constraint_type(), ConstraintType::Whitelist);
        assert_eq!(area.inclusive_lower_bound(), 5);
        assert_eq!(area.inclusive_upper_bound(), 7);
    }

    #[test]
    fn boundary_area_with_descending_params_is_blacklist() {
        let area = BoundaryArea::from_params([8, 5]);
        assert!(area.is_constrained());
        assert_eq!(area.constraint_type(), ConstraintType::Blacklist);
        assert_eq!(area.inclusive_lower_bound(), 5);
        assert_eq!(area.inclusive_upper_bound(), 7);
    }

    #[test]
    fn boundary_area_with_equal_params_is_unconstrained() {
        let area = BoundaryArea::from_params([3, 3]);
        assert!(!area.is_constrained());
    }

    #[test]
    fn area_resolve_kind_dispatches_on_type_byte() {
        let area = Area {
            shape: 0,
            priority: 0,
            position: (0.0, 0.0, 0.0),
            rotation: (0.0, 0.0, 0.0),
            scale: (1.0, 1.0, 1.0),
            rail_id: 0xFF,
            enemy_link_id: 0xFF,
            kind: AreaKindRaw { type_byte: 8, params: [5, 8] },
        };
        let kind = area.resolve_kind().unwrap();
        assert!(matches!(kind, AreaKind::Boundary(b) if b.inclusive_upper_bound() == 7));
    }

    #[test]
    fn unknown_area_type_is_an_error() {
        let area = Area {
            shape: 0,
            priority: 0,
            position: (0.0, 0.0, 0.0),
            rotation: (0.0, 0.0, 0.0),
            scale: (1.0, 1.0, 1.0),
            rail_id: 0,
            enemy_link_id: 0,
            kind: AreaKindRaw { type_byte: 200, params: [0, 0] },
        };
        assert!(area.resolve_kind().is_err());
    }

    #[test]
    fn roundtrips_a_minimal_course() {
        let kmp = Kmp {
            start_points: vec![StartPoint { position: (0.0, 0.0, 0.0), rotation: (0.0, 0.0, 0.0), player_index: -1 }],
            enemy_points: vec![],
            enemy_paths: vec![],
            item_points: vec![],
            item_paths: vec![],
            check_points: vec![],
            check_paths: vec![],
            objects: vec![],
            routes: vec![],
            areas: vec![Area {
                shape: 0,
                priority: 0,
                position: (1.0, 2.0, 3.0),
                rotation: (0.0, 0.0, 0.0),
                scale: (1.0, 1.0, 1.0),
                rail_id: 0xFF,
                enemy_link_id: 0xFF,
                kind: AreaKindRaw { type_byte: 8, params: [5, 8] },
            }],
            cameras: vec![],
            respawn_points: vec![],
            cannon_points: vec![],
            mission_points: vec![],
            stage_info: StageInfo {
                lap_count: 3,
                pole_position: 0,
                driver_distance: 0,
                lens_flare_flashing: 0,
                flare_color: 0x00CC_CCCC,
                speed_modifier: 1.0,
            },
        };
        let bytes = kmp.write();
        let decoded = Kmp::read(&bytes).unwrap();
        assert_eq!(decoded, kmp);
        let area = decoded.areas[0];
        let AreaKind::Boundary(boundary) = area.resolve_kind().unwrap() else {
            panic!("expected boundary area");
        };
        assert_eq!(boundary.inclusive_lower_bound(), 5);
        assert_eq!(boundary.inclusive_upper_bound(), 7);
    }
}
