//! Static world geometry.
//!
//! A [`WorldDescription`] is the parsed, read-only map: dimensions, obstacle
//! rectangles, the creep flow field and the special zones. [`WorldMap`]
//! validates it once and adds the per-cell obstacle buckets used by movement
//! checks and line-of-sight rays.
//!
//! Coordinates are map cells; `(0, 0)` is the top-left corner of the map and
//! y grows downwards. Fixed-point fields serialise as raw 16.16 bits.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::{fixed_serde, ratio, Fixed, Orientation, Rect, Vec2Fixed};
use crate::tuning::{MAX_MAP_DIMENSION, MAX_NUM_PLAYERS, NUM_SPAWN_ZONES};

/// Cap on the per-cell ray parameters of the grid traversal.
const LOS_MAX_T: Fixed = Fixed::const_from_int(1000);

/// Half of a cell, used for cell centres.
pub const HALF_CELL: Fixed = ratio(1, 2);

/// Parsed map as produced by the map tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldDescription {
    /// Map width in cells.
    pub width: u32,
    /// Map height in cells.
    pub height: u32,
    /// Impassable, line-of-sight blocking rectangles.
    #[serde(default)]
    pub obstacles: Vec<Rect>,
    /// Row-major flow field, `width * height` entries. Empty means no flow anywhere.
    #[serde(default)]
    pub flow_field: Vec<Option<Orientation>>,
    /// Initial player positions, indexed by player ID.
    pub player_spawn_positions: Vec<Vec2Fixed>,
    /// Creep spawn zones in activation order.
    pub creep_spawn_zones: Vec<Rect>,
    /// Where dead players reappear.
    pub respawn_zone: Rect,
    /// Players regenerate here.
    pub healing_zone: Rect,
    /// Players buy items here.
    pub shop: Rect,
    /// Creeps entering this zone cost a life.
    pub creep_goal: Rect,
}

impl WorldDescription {
    /// Load from a RON string. `source` names the origin in error messages.
    pub fn from_ron_str(ron: &str, source: &str) -> Result<Self> {
        ron::from_str(ron).map_err(|e| GameError::DataParseError {
            path: source.to_string(),
            message: e.to_string(),
        })
    }

    /// Load a world description from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_ron_str(&contents, &path.display().to_string())
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GameError::Config(format!("failed to serialize world: {e}")))
    }

    /// An obstacle-free rectangular field.
    ///
    /// Creeps spawn at the right edge in three horizontal bands and flow
    /// west (`-x`) into a goal strip at the left edge. Players start in the
    /// middle column, next to the healing zone, shop and respawn zone.
    #[must_use]
    pub fn open_field(width: u32, height: u32) -> Self {
        let w = width as i32;
        let h = height as i32;
        let band = (h / 3).max(1);
        let mid_x = w / 2;
        let mid_y = h / 2;

        let player_spawn_positions = (0..MAX_NUM_PLAYERS as i32)
            .map(|i| {
                Vec2Fixed::new(
                    Fixed::from_num(mid_x) + HALF_CELL,
                    Fixed::from_num((mid_y - 2 + i).clamp(0, h - 1)) + HALF_CELL,
                )
            })
            .collect();

        let creep_spawn_zones = (0..NUM_SPAWN_ZONES as i32)
            .map(|i| Rect::from_ints((w - 3).max(0), (i * band).min(h - 1), 2.min(w), band))
            .collect();

        Self {
            width,
            height,
            obstacles: Vec::new(),
            flow_field: vec![Some(Orientation::NW); (width * height) as usize],
            player_spawn_positions,
            creep_spawn_zones,
            respawn_zone: Rect::from_ints((mid_x - 1).max(0), (mid_y - 1).max(0), 2, 2),
            healing_zone: Rect::from_ints((mid_x - 2).max(0), (mid_y - 2).max(0), 4, 4),
            shop: Rect::from_ints((mid_x - 2).max(0), (mid_y + 2).min(h - 1), 2, 1),
            creep_goal: Rect::from_ints(0, 0, 1, h),
        }
    }

    /// Add an obstacle rectangle.
    #[must_use]
    pub fn with_obstacle(mut self, obstacle: Rect) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    /// Check structural consistency. Returns one message per problem.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.width == 0 || self.width > MAX_MAP_DIMENSION {
            errors.push(format!(
                "map width {} outside 1..={MAX_MAP_DIMENSION}",
                self.width
            ));
        }
        if self.height == 0 || self.height > MAX_MAP_DIMENSION {
            errors.push(format!(
                "map height {} outside 1..={MAX_MAP_DIMENSION}",
                self.height
            ));
        }

        if !self.flow_field.is_empty()
            && self.flow_field.len() != (self.width * self.height) as usize
        {
            errors.push(format!(
                "flow field has {} entries, expected {}",
                self.flow_field.len(),
                self.width * self.height
            ));
        }

        if self.player_spawn_positions.len() < MAX_NUM_PLAYERS as usize {
            errors.push(format!(
                "expected at least {MAX_NUM_PLAYERS} player spawn positions, found {}",
                self.player_spawn_positions.len()
            ));
        }
        for (i, p) in self.player_spawn_positions.iter().enumerate() {
            if !self.contains_point(*p) {
                errors.push(format!("player spawn position {i} lies outside the map"));
            }
        }

        if self.creep_spawn_zones.len() != NUM_SPAWN_ZONES {
            errors.push(format!(
                "expected {NUM_SPAWN_ZONES} creep spawn zones, found {}",
                self.creep_spawn_zones.len()
            ));
        }

        let zones = self
            .creep_spawn_zones
            .iter()
            .enumerate()
            .map(|(i, z)| (format!("creep spawn zone {i}"), z))
            .chain([
                ("respawn zone".to_string(), &self.respawn_zone),
                ("healing zone".to_string(), &self.healing_zone),
                ("shop".to_string(), &self.shop),
                ("creep goal".to_string(), &self.creep_goal),
            ]);
        for (name, zone) in zones {
            if zone.width <= Fixed::ZERO || zone.height <= Fixed::ZERO {
                errors.push(format!("{name} has an empty area"));
            }
        }

        for (i, o) in self.obstacles.iter().enumerate() {
            if o.width <= Fixed::ZERO || o.height <= Fixed::ZERO {
                errors.push(format!("obstacle {i} has an empty area"));
            }
        }

        errors
    }

    fn contains_point(&self, p: Vec2Fixed) -> bool {
        p.x >= Fixed::ZERO
            && p.y >= Fixed::ZERO
            && p.x < Fixed::saturating_from_num(self.width)
            && p.y < Fixed::saturating_from_num(self.height)
    }
}

/// Result of a blocked line-of-sight ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayHit {
    /// Point where the ray enters the obstacle.
    pub position: Vec2Fixed,
    /// Outward unit normal of the entered edge.
    pub normal: Vec2Fixed,
}

/// Validated world with obstacle lookup structures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldMap {
    description: WorldDescription,
    /// Obstacle indices per cell of the map grown by a one-cell border,
    /// plus a trailing overflow bucket.
    obstacle_buckets: Vec<Vec<usize>>,
    #[serde(with = "fixed_serde")]
    width_fixed: Fixed,
    #[serde(with = "fixed_serde")]
    height_fixed: Fixed,
}

impl WorldMap {
    /// Validate a description and build the lookup structures.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Config`] listing every validation problem.
    pub fn new(description: WorldDescription) -> Result<Self> {
        let errors = description.validate();
        if !errors.is_empty() {
            return Err(GameError::Config(errors.join("; ")));
        }

        let bordered_w = description.width as usize + 2;
        let bordered_h = description.height as usize + 2;
        let overflow = bordered_w * bordered_h;
        let mut obstacle_buckets = vec![Vec::new(); overflow + 1];

        for (index, obstacle) in description.obstacles.iter().enumerate() {
            let x0 = obstacle.left.floor().to_num::<i32>();
            let x1 = obstacle.right().ceil().to_num::<i32>();
            let y0 = obstacle.top.floor().to_num::<i32>();
            let y1 = obstacle.bottom().ceil().to_num::<i32>();
            let mut spilled = false;
            for y in y0..y1 {
                for x in x0..x1 {
                    match bordered_index(x, y, bordered_w, bordered_h) {
                        Some(cell) => obstacle_buckets[cell].push(index),
                        None => spilled = true,
                    }
                }
            }
            if spilled {
                obstacle_buckets[overflow].push(index);
            }
        }

        Ok(Self {
            width_fixed: Fixed::from_num(description.width),
            height_fixed: Fixed::from_num(description.height),
            description,
            obstacle_buckets,
        })
    }

    /// The underlying description.
    #[must_use]
    pub fn description(&self) -> &WorldDescription {
        &self.description
    }

    /// Width in cells.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.description.width
    }

    /// Height in cells.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.description.height
    }

    /// Initial player positions.
    #[must_use]
    pub fn player_spawn_positions(&self) -> &[Vec2Fixed] {
        &self.description.player_spawn_positions
    }

    /// Creep spawn zones in activation order.
    #[must_use]
    pub fn creep_spawn_zones(&self) -> &[Rect] {
        &self.description.creep_spawn_zones
    }

    /// Player respawn zone.
    #[must_use]
    pub fn respawn_zone(&self) -> &Rect {
        &self.description.respawn_zone
    }

    /// Healing zone.
    #[must_use]
    pub fn healing_zone(&self) -> &Rect {
        &self.description.healing_zone
    }

    /// Shop zone.
    #[must_use]
    pub fn shop(&self) -> &Rect {
        &self.description.shop
    }

    /// Creep goal zone.
    #[must_use]
    pub fn creep_goal(&self) -> &Rect {
        &self.description.creep_goal
    }

    /// True if `p` lies on the map (half-open bounds).
    #[must_use]
    pub fn in_map(&self, p: Vec2Fixed) -> bool {
        p.x >= Fixed::ZERO && p.y >= Fixed::ZERO && p.x < self.width_fixed && p.y < self.height_fixed
    }

    /// Obstacles registered for the cell containing `p`.
    ///
    /// Positions more than one cell outside the map share the overflow bucket.
    pub fn obstacles_at(&self, p: Vec2Fixed) -> impl Iterator<Item = &Rect> + '_ {
        self.obstacle_buckets[self.bucket_of(p)]
            .iter()
            .map(move |&i| &self.description.obstacles[i])
    }

    /// True if `p` lies inside an obstacle.
    #[must_use]
    pub fn is_blocked(&self, p: Vec2Fixed) -> bool {
        self.obstacles_at(p).any(|o| o.contains(p))
    }

    /// Flow direction of the cell containing `p`; `None` off-map or where
    /// the field is empty.
    #[must_use]
    pub fn flow_at(&self, p: Vec2Fixed) -> Option<Orientation> {
        if !self.in_map(p) {
            return None;
        }
        let x = p.x.to_num::<i32>() as usize;
        let y = p.y.to_num::<i32>() as usize;
        self.description
            .flow_field
            .get(y * self.description.width as usize + x)
            .copied()
            .flatten()
    }

    /// Cast a ray of `length` cells from `start` along the unit vector
    /// `direction` and report the first obstacle it enters.
    ///
    /// Walks the grid cell by cell and slab-tests the obstacles registered
    /// in each visited cell. A zero direction never hits anything.
    #[must_use]
    pub fn line_of_sight_check(
        &self,
        start: Vec2Fixed,
        direction: Vec2Fixed,
        length: Fixed,
    ) -> Option<RayHit> {
        if direction.is_zero() {
            return None;
        }
        let end = start + direction * length;
        let (step_x, mut t_max_x, t_delta_x) = traversal_axis(start.x, end.x);
        let (step_y, mut t_max_y, t_delta_y) = traversal_axis(start.y, end.y);
        let mut cell = Vec2Fixed::new(start.x.floor(), start.y.floor());

        loop {
            if let Some(hit) = self.closest_hit_in_cell(cell, start, direction, length) {
                return Some(hit);
            }
            if t_max_x > Fixed::ONE && t_max_y > Fixed::ONE {
                return None;
            }
            if t_max_x < t_max_y {
                cell.x += step_x;
                t_max_x += t_delta_x;
            } else {
                cell.y += step_y;
                t_max_y += t_delta_y;
            }
        }
    }

    fn closest_hit_in_cell(
        &self,
        cell: Vec2Fixed,
        start: Vec2Fixed,
        direction: Vec2Fixed,
        length: Fixed,
    ) -> Option<RayHit> {
        let mut best: Option<(Fixed, Vec2Fixed)> = None;
        for obstacle in self.obstacles_at(cell) {
            let Some((t_min, t_max, normal)) = ray_box(start, direction, obstacle) else {
                continue;
            };
            let hit = t_min <= t_max && t_min <= length && t_max >= Fixed::ZERO;
            if hit && best.map_or(true, |(t, _)| t_min < t) {
                best = Some((t_min, normal));
            }
        }
        best.map(|(t, normal)| RayHit {
            position: Vec2Fixed::new(
                start.x.saturating_add(direction.x.saturating_mul(t)),
                start.y.saturating_add(direction.y.saturating_mul(t)),
            ),
            normal,
        })
    }

    fn bucket_of(&self, p: Vec2Fixed) -> usize {
        let bordered_w = self.description.width as usize + 2;
        let bordered_h = self.description.height as usize + 2;
        bordered_index(
            p.x.floor().to_num::<i32>(),
            p.y.floor().to_num::<i32>(),
            bordered_w,
            bordered_h,
        )
        .unwrap_or(bordered_w * bordered_h)
    }
}

/// Index of cell `(x, y)` in the bordered grid, which spans `-1..=width`.
fn bordered_index(x: i32, y: i32, bordered_w: usize, bordered_h: usize) -> Option<usize> {
    let bx = usize::try_from(x + 1).ok()?;
    let by = usize::try_from(y + 1).ok()?;
    (bx < bordered_w && by < bordered_h).then_some(by * bordered_w + bx)
}

/// Step direction, first crossing and crossing interval of one axis, in
/// units of the whole ray.
fn traversal_axis(from: Fixed, to: Fixed) -> (Fixed, Fixed, Fixed) {
    let delta = to - from;
    let step = delta.signum();
    let t_delta = if step == Fixed::ZERO {
        LOS_MAX_T
    } else {
        step.saturating_div(delta).clamp(Fixed::DELTA, LOS_MAX_T)
    };
    let into_cell = from - from.floor();
    let t_max = if step > Fixed::ZERO {
        t_delta.saturating_mul(Fixed::ONE - into_cell)
    } else {
        t_delta.saturating_mul(into_cell)
    };
    (step, t_max, t_delta)
}

/// Slab test. Returns entry and exit distances plus the normal of the
/// entered edge, or `None` when an axis-parallel ray misses the slab.
fn ray_box(start: Vec2Fixed, direction: Vec2Fixed, obstacle: &Rect) -> Option<(Fixed, Fixed, Vec2Fixed)> {
    let left = Vec2Fixed::new(-Fixed::ONE, Fixed::ZERO);
    let right = Vec2Fixed::new(Fixed::ONE, Fixed::ZERO);
    let top = Vec2Fixed::new(Fixed::ZERO, -Fixed::ONE);
    let bottom = Vec2Fixed::new(Fixed::ZERO, Fixed::ONE);

    let x = slab(start.x, direction.x, obstacle.left, obstacle.right(), left, right)?;
    let y = slab(start.y, direction.y, obstacle.top, obstacle.bottom(), top, bottom)?;

    let (t_min, normal) = if x.0 >= y.0 { (x.0, x.2) } else { (y.0, y.2) };
    let t_max = x.1.min(y.1);
    Some((t_min, t_max, normal))
}

/// One axis of the slab test: `(entry, exit, entry normal)`.
fn slab(
    origin: Fixed,
    dir: Fixed,
    low: Fixed,
    high: Fixed,
    low_normal: Vec2Fixed,
    high_normal: Vec2Fixed,
) -> Option<(Fixed, Fixed, Vec2Fixed)> {
    if dir == Fixed::ZERO {
        return (origin >= low && origin <= high).then_some((Fixed::MIN, Fixed::MAX, low_normal));
    }
    let t_low = (low - origin).saturating_div(dir);
    let t_high = (high - origin).saturating_div(dir);
    if t_low <= t_high {
        Some((t_low, t_high, low_normal))
    } else {
        Some((t_high, t_low, high_normal))
    }
}
