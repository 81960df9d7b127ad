//! Write-region guard for structure placement.
//!
//! Each structure invocation gets a box that starts as the tile's own
//! footprint. Structures may grow or move it, but every mutation is checked
//! against the tile plus `radius` tiles on each side. Leaving that area is
//! logged and recorded; under [`BoundsPolicy::Clamp`] the box is also pulled
//! back inside.

use glam::IVec3;
use strata_config::BoundsPolicy;
use strata_math::{BlockBox, TILE_MASK, TileCoord};
use tracing::warn;

/// A structure moved its region box outside the allowed area.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundsViolation {
    pub identity: String,
    pub allowed: BlockBox,
    pub before: BlockBox,
    pub after: BlockBox,
}

#[derive(Debug)]
pub struct RegionBoundsGuard {
    footprint: BlockBox,
    allowed: BlockBox,
    current: BlockBox,
    identity: String,
    policy: BoundsPolicy,
    violations: Vec<BoundsViolation>,
}

impl RegionBoundsGuard {
    /// Guard for `tile`, allowing `radius` tiles of slack on each side.
    pub fn new(tile: TileCoord, radius: i32, min_y: i32, max_y: i32, policy: BoundsPolicy) -> Self {
        let footprint = BlockBox::tile_footprint(tile, min_y, max_y);
        let radius = radius.max(0);
        let allowed = BlockBox::new(
            tile.offset(-radius, -radius).origin(min_y),
            tile.offset(radius, radius).origin(max_y) + IVec3::new(TILE_MASK, 0, TILE_MASK),
        );
        Self {
            footprint,
            allowed,
            current: footprint,
            identity: "unknown".to_string(),
            policy,
            violations: Vec::new(),
        }
    }

    /// Restores the tile footprint before the next structure runs.
    pub fn reset(&mut self, identity: &str) {
        self.current = self.footprint;
        self.identity.clear();
        self.identity.push_str(identity);
    }

    /// Grows the box to include `other`. Returns `false` on a violation.
    pub fn encompass(&mut self, other: &BlockBox) -> bool {
        let before = self.current;
        self.current.encompass(other);
        self.validate(before)
    }

    /// Moves the box by `offset`. Returns `false` on a violation.
    pub fn move_by(&mut self, offset: IVec3) -> bool {
        let before = self.current;
        self.current.translate(offset);
        self.validate(before)
    }

    pub fn current(&self) -> &BlockBox {
        &self.current
    }

    pub fn allowed(&self) -> &BlockBox {
        &self.allowed
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Whether `pos` lies in the current box. Placement routines clip their
    /// writes with this.
    pub fn permits(&self, pos: IVec3) -> bool {
        self.current.contains(pos)
    }

    pub fn violations(&self) -> &[BoundsViolation] {
        &self.violations
    }

    pub fn take_violations(&mut self) -> Vec<BoundsViolation> {
        std::mem::take(&mut self.violations)
    }

    fn validate(&mut self, before: BlockBox) -> bool {
        if self.allowed.encloses_xz(&self.current) {
            return true;
        }
        warn!(
            structure = %self.identity,
            allowed = %self.allowed,
            before = %before,
            after = %self.current,
            "Structure attempted to change the world-gen region bounds to an unsafe location/size"
        );
        self.violations.push(BoundsViolation {
            identity: self.identity.clone(),
            allowed: self.allowed,
            before,
            after: self.current,
        });
        if self.policy == BoundsPolicy::Clamp {
            self.current.clamp_xz(&self.allowed);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(policy: BoundsPolicy) -> RegionBoundsGuard {
        let mut g = RegionBoundsGuard::new(TileCoord::new(2, -1), 1, 0, 255, policy);
        g.reset("test_structure");
        g
    }

    #[test]
    fn test_reset_restores_footprint() {
        let mut g = guard(BoundsPolicy::Log);
        g.move_by(IVec3::new(8, 0, 0));
        g.reset("next");
        assert_eq!(*g.current(), BlockBox::tile_footprint(TileCoord::new(2, -1), 0, 255));
        assert_eq!(g.identity(), "next");
    }

    #[test]
    fn test_allowed_region_spans_radius() {
        let g = guard(BoundsPolicy::Log);
        assert_eq!(g.allowed().min, IVec3::new(16, 0, -32));
        assert_eq!(g.allowed().max, IVec3::new(63, 255, 15));
    }

    #[test]
    fn test_encompass_within_radius_is_fine() {
        let mut g = guard(BoundsPolicy::Log);
        let neighbour = BlockBox::tile_footprint(TileCoord::new(3, 0), 10, 20);
        assert!(g.encompass(&neighbour));
        assert!(g.violations().is_empty());
        assert_eq!(g.current().max.x, 63);
    }

    #[test]
    fn test_encompass_beyond_radius_logs_and_keeps_box() {
        let mut g = guard(BoundsPolicy::Log);
        let far = BlockBox::tile_footprint(TileCoord::new(5, -1), 0, 10);
        assert!(!g.encompass(&far));
        assert_eq!(g.violations().len(), 1);
        let v = &g.violations()[0];
        assert_eq!(v.identity, "test_structure");
        assert_eq!(v.before, BlockBox::tile_footprint(TileCoord::new(2, -1), 0, 255));
        assert_eq!(v.after.max.x, 95);
        assert_eq!(g.current().max.x, 95, "log policy leaves the box as mutated");
    }

    #[test]
    fn test_clamp_policy_pulls_box_back() {
        let mut g = guard(BoundsPolicy::Clamp);
        assert!(!g.move_by(IVec3::new(-64, 0, 0)));
        assert!(g.allowed().encloses_xz(g.current()));
        assert_eq!(g.violations().len(), 1);
    }

    #[test]
    fn test_boundary_cells_are_legal() {
        let mut g = guard(BoundsPolicy::Log);
        assert!(g.move_by(IVec3::new(16, 0, 16)));
        assert!(!g.move_by(IVec3::new(1, 0, 0)));
    }

    #[test]
    fn test_permits_tracks_current_box() {
        let mut g = guard(BoundsPolicy::Log);
        assert!(g.permits(IVec3::new(32, 64, -16)));
        assert!(!g.permits(IVec3::new(48, 64, -16)));
        g.encompass(&BlockBox::tile_footprint(TileCoord::new(3, -1), 0, 255));
        assert!(g.permits(IVec3::new(48, 64, -16)));
        assert_eq!(g.take_violations().len(), 0);
    }
}
