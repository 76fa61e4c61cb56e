//! Grid-bucketed spatial index over living entities.
//!
//! Each entity is registered in every cell touched by the square of side
//! `2 * tolerance` around its position, so queries over-include and callers
//! filter by exact distance. Registration doubles as the liveness record:
//! an entity is alive exactly while it has a footprint here.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, Fixed, Rect, Vec2Fixed};
use crate::rng::SeededRandom;

/// Registered ground circle of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    /// Center.
    pub position: Vec2Fixed,
    /// Radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
}

/// Inclusive cell range covered by a square around a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellBox {
    left: i32,
    right: i32,
    top: i32,
    bottom: i32,
}

impl CellBox {
    fn around(position: Vec2Fixed, tolerance: Fixed) -> Self {
        Self {
            left: (position.x - tolerance).floor().to_num::<i32>(),
            right: (position.x + tolerance).floor().to_num::<i32>(),
            top: (position.y - tolerance).floor().to_num::<i32>(),
            bottom: (position.y + tolerance).floor().to_num::<i32>(),
        }
    }

    fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

/// Per-cell entity lists with an overflow bucket for off-map lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialIndex {
    width: i32,
    height: i32,
    /// `width * height` cells followed by the overflow bucket.
    cells: Vec<Vec<EntityId>>,
    footprints: BTreeMap<EntityId, Footprint>,
}

impl SpatialIndex {
    /// Empty index for a `width x height` map.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as i32,
            height: height as i32,
            cells: vec![Vec::new(); (width * height) as usize + 1],
            footprints: BTreeMap::new(),
        }
    }

    fn cell_index(&self, x: i32, y: i32) -> Option<usize> {
        (x >= 0 && y >= 0 && x < self.width && y < self.height)
            .then(|| (y * self.width + x) as usize)
    }

    /// Entities registered in the cell containing `position`.
    ///
    /// Off-map positions read the overflow bucket, which nothing is ever
    /// inserted into.
    #[must_use]
    pub fn at(&self, position: Vec2Fixed) -> &[EntityId] {
        let x = position.x.floor().to_num::<i32>();
        let y = position.y.floor().to_num::<i32>();
        let index = self.cell_index(x, y).unwrap_or(self.cells.len() - 1);
        &self.cells[index]
    }

    /// Union of the cells covered by the square of half-side `tolerance`
    /// around `position`, skipping cells outside the map.
    #[must_use]
    pub fn at_with_tolerance(&self, position: Vec2Fixed, tolerance: Fixed) -> BTreeSet<EntityId> {
        let area = CellBox::around(position, tolerance);
        let mut found = BTreeSet::new();
        for y in area.top.max(0)..=area.bottom.min(self.height - 1) {
            for x in area.left.max(0)..=area.right.min(self.width - 1) {
                if let Some(index) = self.cell_index(x, y) {
                    found.extend(self.cells[index].iter().copied());
                }
            }
        }
        found
    }

    /// Register `id` around `position`.
    pub fn insert(&mut self, id: EntityId, position: Vec2Fixed, tolerance: Fixed) {
        self.footprints.insert(
            id,
            Footprint {
                position,
                radius: tolerance,
            },
        );
        self.for_each_cell(CellBox::around(position, tolerance), |cell| {
            if !cell.contains(&id) {
                cell.push(id);
            }
        });
    }

    /// Unregister `id` from the cells around `position`.
    pub fn remove(&mut self, id: EntityId, position: Vec2Fixed, tolerance: Fixed) {
        self.footprints.remove(&id);
        self.for_each_cell(CellBox::around(position, tolerance), |cell| {
            cell.retain(|&e| e != id);
        });
    }

    /// Move `id` from `old` to `new`, touching only the cells that enter or
    /// leave its covered box.
    pub fn update(&mut self, id: EntityId, old: Vec2Fixed, new: Vec2Fixed, tolerance: Fixed) {
        let before = CellBox::around(old, tolerance);
        let after = CellBox::around(new, tolerance);
        if let Some(footprint) = self.footprints.get_mut(&id) {
            footprint.position = new;
        }
        if before == after {
            return;
        }
        let y_range = before.top.min(after.top).max(0)..=before.bottom.max(after.bottom).min(self.height - 1);
        let x_range = before.left.min(after.left).max(0)..=before.right.max(after.right).min(self.width - 1);
        for y in y_range {
            for x in x_range.clone() {
                let Some(index) = self.cell_index(x, y) else {
                    continue;
                };
                match (before.contains(x, y), after.contains(x, y)) {
                    (false, true) => {
                        if !self.cells[index].contains(&id) {
                            self.cells[index].push(id);
                        }
                    }
                    (true, false) => self.cells[index].retain(|&e| e != id),
                    _ => {}
                }
            }
        }
    }

    fn for_each_cell(&mut self, area: CellBox, mut f: impl FnMut(&mut Vec<EntityId>)) {
        for y in area.top.max(0)..=area.bottom.min(self.height - 1) {
            for x in area.left.max(0)..=area.right.min(self.width - 1) {
                if let Some(index) = self.cell_index(x, y) {
                    f(&mut self.cells[index]);
                }
            }
        }
    }

    /// True if `id` is registered, i.e. alive.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.footprints.contains_key(&id)
    }

    /// Registered footprint of `id`.
    #[must_use]
    pub fn footprint(&self, id: EntityId) -> Option<&Footprint> {
        self.footprints.get(&id)
    }

    /// Registered IDs in ascending order.
    pub fn registered(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.footprints.keys().copied()
    }

    /// True if a circle at `position` overlaps any registered footprint
    /// other than `exclude`.
    #[must_use]
    pub fn collides(&self, position: Vec2Fixed, radius: Fixed, exclude: Option<EntityId>) -> bool {
        self.at_with_tolerance(position, radius)
            .into_iter()
            .filter(|id| Some(*id) != exclude)
            .filter_map(|id| self.footprints.get(&id))
            .any(|fp| {
                let reach = fp.radius + radius;
                fp.position.distance_squared(position) < reach * reach
            })
    }

    /// Sample up to `trials` positions in `zone` until one is collision free.
    ///
    /// Each coordinate is `edge + extent * k / 1000` with `k` drawn from
    /// `0..=1000`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NoFreeSpawnPosition`] if every sample collides.
    pub fn find_free_spawn_position(
        &self,
        zone: &Rect,
        radius: Fixed,
        rng: &mut SeededRandom,
        trials: u32,
    ) -> Result<Vec2Fixed> {
        for _ in 0..trials {
            let kx = Fixed::from_num(rng.range_inclusive(0, 1000)) / 1000;
            let ky = Fixed::from_num(rng.range_inclusive(0, 1000)) / 1000;
            let candidate = Vec2Fixed::new(zone.left + zone.width * kx, zone.top + zone.height * ky);
            if !self.collides(candidate, radius, None) {
                return Ok(candidate);
            }
        }
        Err(GameError::NoFreeSpawnPosition { trials })
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn radius() -> Fixed {
        Fixed::from_num(0.35)
    }

    fn p(x: f64, y: f64) -> Vec2Fixed {
        Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    #[test]
    fn test_insert_covers_neighbouring_cells() {
        let mut index = SpatialIndex::new(10, 10);
        index.insert(1, p(2.9, 2.5), radius());
        assert!(index.at(p(2.5, 2.5)).contains(&1));
        assert!(index.at(p(3.1, 2.5)).contains(&1));
        assert!(!index.at(p(4.5, 2.5)).contains(&1));
        assert!(index.is_alive(1));
    }

    #[test]
    fn test_out_of_bounds_reads_overflow() {
        let mut index = SpatialIndex::new(4, 4);
        index.insert(1, p(0.1, 0.1), radius());
        assert!(index.at(p(-3.0, 0.5)).is_empty());
        assert!(index.at(p(0.5, 9.0)).is_empty());
    }

    #[test]
    fn test_remove_unregisters() {
        let mut index = SpatialIndex::new(10, 10);
        index.insert(1, p(5.5, 5.5), radius());
        index.remove(1, p(5.5, 5.5), radius());
        assert!(!index.is_alive(1));
        assert!(index.at_with_tolerance(p(5.5, 5.5), Fixed::from_num(2)).is_empty());
    }

    #[test]
    fn test_update_moves_between_cells() {
        let mut index = SpatialIndex::new(10, 10);
        index.insert(3, p(1.5, 1.5), radius());
        index.update(3, p(1.5, 1.5), p(6.5, 6.5), radius());
        assert!(index.at(p(1.5, 1.5)).is_empty());
        assert_eq!(index.at(p(6.5, 6.5)), &[3]);
        assert_eq!(index.footprint(3).unwrap().position, p(6.5, 6.5));
    }

    #[test]
    fn test_tolerance_query_is_ordered_set() {
        let mut index = SpatialIndex::new(10, 10);
        index.insert(9, p(4.5, 4.5), radius());
        index.insert(2, p(5.5, 4.5), radius());
        let found: Vec<_> = index.at_with_tolerance(p(5.0, 4.5), Fixed::ONE).into_iter().collect();
        assert_eq!(found, vec![2, 9]);
    }

    #[test]
    fn test_collides_excludes_self() {
        let mut index = SpatialIndex::new(10, 10);
        index.insert(1, p(5.0, 5.0), radius());
        assert!(index.collides(p(5.3, 5.0), radius(), None));
        assert!(!index.collides(p(5.3, 5.0), radius(), Some(1)));
        assert!(!index.collides(p(6.0, 5.0), radius(), None));
    }

    #[test]
    fn test_free_spawn_avoids_occupied_spot() {
        let mut index = SpatialIndex::new(10, 10);
        index.insert(1, p(2.0, 2.0), radius());
        let zone = Rect::from_ints(1, 1, 2, 2);
        let mut rng = SeededRandom::new(5);
        let spot = index
            .find_free_spawn_position(&zone, radius(), &mut rng, 50)
            .unwrap();
        assert!(zone.contains(spot) || spot.x == Fixed::from_num(3) || spot.y == Fixed::from_num(3));
        assert!(!index.collides(spot, radius(), None));
    }

    #[test]
    fn test_free_spawn_with_zero_trials_fails() {
        let index = SpatialIndex::new(10, 10);
        let mut rng = SeededRandom::new(5);
        let result = index.find_free_spawn_position(&Rect::from_ints(0, 0, 5, 5), radius(), &mut rng, 0);
        assert!(matches!(
            result,
            Err(GameError::NoFreeSpawnPosition { trials: 0 })
        ));
    }

    /// Map coordinate in hundredths, biased towards both map edges.
    fn coord() -> impl Strategy<Value = i32> {
        prop_oneof![0i32..2000, 0i32..40, 1960i32..2000]
    }

    #[test]
    fn test_tolerance_query_finds_circle_with_center_outside() {
        let mut index = SpatialIndex::new(20, 20);
        index.insert(1, p(0.1, 0.1), Fixed::from_num(0.4));
        index.insert(2, p(19.9, 19.9), Fixed::from_num(0.4));
        index.insert(3, p(10.0, 10.0), Fixed::from_num(0.4));

        let near_origin = index.at_with_tolerance(p(0.6, 0.6), Fixed::from_num(0.35));
        assert!(near_origin.contains(&1));
        assert!(!near_origin.contains(&3));

        let near_far_corner = index.at_with_tolerance(p(19.4, 19.4), Fixed::from_num(0.35));
        assert!(near_far_corner.contains(&2));
        assert!(!near_far_corner.contains(&3));
    }

    proptest! {
        #[test]
        fn prop_tolerance_query_over_includes(
            entities in prop::collection::vec((coord(), coord(), 1i32..150), 1..20),
            qx in coord(),
            qy in coord(),
            q_r in 1i32..300,
        ) {
            let mut index = SpatialIndex::new(20, 20);
            let hundredths = |v: i32| Fixed::from_num(v) / 100;
            for (i, (x, y, r)) in entities.iter().enumerate() {
                index.insert(i as EntityId, Vec2Fixed::new(hundredths(*x), hundredths(*y)), hundredths(*r));
            }
            let query = Vec2Fixed::new(hundredths(qx), hundredths(qy));
            let tolerance = hundredths(q_r);
            let found = index.at_with_tolerance(query, tolerance);
            for (i, (x, y, r)) in entities.iter().enumerate() {
                let pos = Vec2Fixed::new(hundredths(*x), hundredths(*y));
                let reach = tolerance + hundredths(*r);
                // Overlapping circles have touching bounding squares.
                if (pos.x - query.x).abs() <= reach && (pos.y - query.y).abs() <= reach {
                    prop_assert!(found.contains(&(i as EntityId)), "entity {} at {:?} missed", i, pos);
                }
            }
        }

        #[test]
        fn prop_update_matches_fresh_insert(
            ax in 0i32..1000, ay in 0i32..1000, bx in 0i32..1000, by in 0i32..1000,
        ) {
            let a = Vec2Fixed::new(Fixed::from_num(ax) / 100, Fixed::from_num(ay) / 100);
            let b = Vec2Fixed::new(Fixed::from_num(bx) / 100, Fixed::from_num(by) / 100);
            let mut moved = SpatialIndex::new(10, 10);
            moved.insert(1, a, radius());
            moved.update(1, a, b, radius());
            let mut fresh = SpatialIndex::new(10, 10);
            fresh.insert(1, b, radius());
            prop_assert_eq!(moved, fresh);
        }
    }
}
