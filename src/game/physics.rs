//! Hit-test world: ray queries against player hitboxes and static obstacles

use std::collections::BTreeMap;

use glam::Vec3;

use super::PlayerId;

/// Bit set of collision layers a query considers
pub type LayerMask = u32;

pub const LAYER_PLAYERS: LayerMask = 1 << 0;
pub const LAYER_WORLD: LayerMask = 1 << 1;
pub const LAYER_ALL: LayerMask = LAYER_PLAYERS | LAYER_WORLD;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Normalized on construction
    pub direction: Vec3,
    pub max_distance: f32,
    pub mask: LayerMask,
    /// Player whose hitbox the query passes through (the shooter)
    pub ignore: Option<PlayerId>,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3, max_distance: f32, mask: LayerMask) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            max_distance,
            mask,
            ignore: None,
        }
    }

    pub fn ignoring(mut self, player: PlayerId) -> Self {
        self.ignore = Some(player);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Player(PlayerId),
    World,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub target: HitTarget,
}

impl RayHit {
    pub fn player(&self) -> Option<PlayerId> {
        match self.target {
            HitTarget::Player(id) => Some(id),
            HitTarget::World => None,
        }
    }
}

/// Collision provider seam used by lag compensation and client prediction
pub trait HitTestWorld {
    /// Nearest hit along the ray within its layers, if any
    fn raycast(&self, ray: &Ray) -> Option<RayHit>;

    /// Current hit-test position of a player's hitbox
    fn hitbox(&self, player: PlayerId) -> Option<Vec3>;

    /// Move a player's hitbox; returns `false` if the player has none
    fn set_hitbox(&mut self, player: PlayerId, position: Vec3) -> bool;
}

/// Static obstacle sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub center: Vec3,
    pub radius: f32,
}

/// Sphere hitboxes for players plus static sphere obstacles.
///
/// Equal-distance hits resolve to the lowest player id, then to players
/// over obstacles, so every peer agrees on the same target.
#[derive(Debug, Clone)]
pub struct SphereWorld {
    hitbox_radius: f32,
    hitboxes: BTreeMap<PlayerId, Vec3>,
    obstacles: Vec<Obstacle>,
}

impl SphereWorld {
    pub fn new(hitbox_radius: f32) -> Self {
        Self {
            hitbox_radius,
            hitboxes: BTreeMap::new(),
            obstacles: Vec::new(),
        }
    }

    pub fn with_obstacle(mut self, center: Vec3, radius: f32) -> Self {
        self.obstacles.push(Obstacle { center, radius });
        self
    }

    pub fn hitbox_radius(&self) -> f32 {
        self.hitbox_radius
    }

    /// Create or move a hitbox
    pub fn upsert_hitbox(&mut self, player: PlayerId, position: Vec3) {
        self.hitboxes.insert(player, position);
    }

    pub fn remove_hitbox(&mut self, player: PlayerId) -> Option<Vec3> {
        self.hitboxes.remove(&player)
    }

    pub fn clear_hitboxes(&mut self) {
        self.hitboxes.clear();
    }
}

impl HitTestWorld for SphereWorld {
    fn raycast(&self, ray: &Ray) -> Option<RayHit> {
        if ray.direction == Vec3::ZERO {
            return None;
        }

        let mut best: Option<RayHit> = None;
        let mut consider = |center: Vec3, radius: f32, target: HitTarget| {
            if let Some(distance) = ray_sphere(ray.origin, ray.direction, center, radius) {
                if distance <= ray.max_distance && best.map_or(true, |b| distance < b.distance) {
                    let point = ray.origin + ray.direction * distance;
                    best = Some(RayHit {
                        point,
                        normal: (point - center).normalize_or_zero(),
                        distance,
                        target,
                    });
                }
            }
        };

        if ray.mask & LAYER_PLAYERS != 0 {
            for (&id, &center) in &self.hitboxes {
                if ray.ignore == Some(id) {
                    continue;
                }
                consider(center, self.hitbox_radius, HitTarget::Player(id));
            }
        }
        if ray.mask & LAYER_WORLD != 0 {
            for obstacle in &self.obstacles {
                consider(obstacle.center, obstacle.radius, HitTarget::World);
            }
        }

        best
    }

    fn hitbox(&self, player: PlayerId) -> Option<Vec3> {
        self.hitboxes.get(&player).copied()
    }

    fn set_hitbox(&mut self, player: PlayerId, position: Vec3) -> bool {
        match self.hitboxes.get_mut(&player) {
            Some(slot) => {
                *slot = position;
                true
            }
            None => false,
        }
    }
}

/// Distance along a unit `direction` to the first intersection with a sphere.
///
/// A ray starting inside the sphere hits at distance 0.
fn ray_sphere(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let to_origin = origin - center;
    let c = to_origin.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some(0.0);
    }

    let b = to_origin.dot(direction);
    if b > 0.0 {
        // pointing away
        return None;
    }

    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    Some(-b - discriminant.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn hits_nearest_sphere() {
        let mut world = SphereWorld::new(0.5);
        world.upsert_hitbox(1, Vec3::new(10.0, 0.0, 0.0));
        world.upsert_hitbox(2, Vec3::new(5.0, 0.0, 0.0));

        let hit = world
            .raycast(&Ray::new(Vec3::ZERO, Vec3::X, 100.0, LAYER_ALL))
            .unwrap();
        assert_eq!(hit.target, HitTarget::Player(2));
        assert_approx_eq!(hit.distance, 4.5, 1e-5);
        assert_approx_eq!(hit.normal.x, -1.0, 1e-5);
    }

    #[test]
    fn respects_range_and_mask() {
        let world = SphereWorld::new(0.5).with_obstacle(Vec3::new(0.0, 0.0, 20.0), 1.0);

        assert!(world
            .raycast(&Ray::new(Vec3::ZERO, Vec3::Z, 10.0, LAYER_ALL))
            .is_none());
        assert!(world
            .raycast(&Ray::new(Vec3::ZERO, Vec3::Z, 50.0, LAYER_PLAYERS))
            .is_none());
        let hit = world
            .raycast(&Ray::new(Vec3::ZERO, Vec3::Z, 50.0, LAYER_WORLD))
            .unwrap();
        assert_eq!(hit.target, HitTarget::World);
    }

    #[test]
    fn ray_pointing_away_misses() {
        let mut world = SphereWorld::new(0.5);
        world.upsert_hitbox(1, Vec3::new(-5.0, 0.0, 0.0));
        assert!(world
            .raycast(&Ray::new(Vec3::ZERO, Vec3::X, 100.0, LAYER_ALL))
            .is_none());
    }

    #[test]
    fn shooter_inside_own_hitbox_is_skipped() {
        let mut world = SphereWorld::new(0.5);
        world.upsert_hitbox(1, Vec3::ZERO);
        world.upsert_hitbox(2, Vec3::new(8.0, 0.0, 0.0));

        let ray = Ray::new(Vec3::ZERO, Vec3::X, 100.0, LAYER_ALL);
        assert_eq!(world.raycast(&ray).unwrap().player(), Some(1));
        assert_eq!(world.raycast(&ray.ignoring(1)).unwrap().player(), Some(2));
    }

    #[test]
    fn equidistant_players_resolve_to_lowest_id() {
        let spot = Vec3::new(6.0, 0.0, 0.0);
        let ray = Ray::new(Vec3::ZERO, Vec3::X, 100.0, LAYER_ALL);

        for order in [[4, 9], [9, 4]] {
            let mut world = SphereWorld::new(0.5).with_obstacle(spot, 0.5);
            for id in order {
                world.upsert_hitbox(id, spot);
            }
            let hit = world.raycast(&ray).unwrap();
            assert_eq!(hit.target, HitTarget::Player(4));
            assert_eq!(world.raycast(&ray.ignoring(4)).unwrap().player(), Some(9));
        }
    }

    #[test]
    fn set_hitbox_requires_existing_player() {
        let mut world = SphereWorld::new(0.5);
        assert!(!world.set_hitbox(3, Vec3::ONE));
        world.upsert_hitbox(3, Vec3::ZERO);
        assert!(world.set_hitbox(3, Vec3::ONE));
        assert_eq!(world.hitbox(3), Some(Vec3::ONE));
    }
}
