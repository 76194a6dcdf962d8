//! Geometry: vector/quaternion algebra and ray-quad intersection.
//!
//! Conventions follow OpenXR: right-handed, +Y up, controllers and quads
//! face along -Z in their local frame. A quad spans
//! [-w/2, w/2] x [-h/2, h/2] in its local XY plane.
//!
//! Everything here is pure: no state, no allocation.

// ── Vec2 ─────────────────────────────────────────────────────

/// 2D vector, used for thumbstick/trackpad axes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }
}

// ── Vec3 ─────────────────────────────────────────────────────

/// 3D vector (meters when used as a position).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    /// OpenXR forward axis.
    pub const FORWARD: Self = Self {
        x: 0.0,
        y: 0.0,
        z: -1.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction. Degenerate input yields
    /// [`Vec3::FORWARD`] rather than NaN.
    pub fn normalize(self) -> Self {
        let len_sq = self.dot(self);
        if len_sq <= 1.0e-8 {
            return Self::FORWARD;
        }
        self.scale(1.0 / len_sq.sqrt())
    }
}

// ── Quat ─────────────────────────────────────────────────────

/// Unit quaternion (x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians around a (not necessarily unit) axis.
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = axis.normalize();
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    /// Shortest rotation taking unit vector `from` onto unit vector `to`.
    pub fn from_rotation_arc(from: Vec3, to: Vec3) -> Self {
        let from = from.normalize();
        let to = to.normalize();
        let d = from.dot(to);
        if d >= 1.0 - 1.0e-6 {
            return Self::IDENTITY;
        }
        if d <= -1.0 + 1.0e-6 {
            // Opposite vectors: any perpendicular axis works.
            let mut axis = Vec3::new(1.0, 0.0, 0.0).cross(from);
            if axis.dot(axis) < 1.0e-6 {
                axis = Vec3::new(0.0, 1.0, 0.0).cross(from);
            }
            return Self::from_axis_angle(axis, std::f32::consts::PI);
        }
        let c = from.cross(to);
        Self::new(c.x, c.y, c.z, 1.0 + d).normalized()
    }

    pub fn normalized(self) -> Self {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if len < 1.0e-8 {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Inverse of a unit quaternion.
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Hamilton product `self * rhs`: applies `rhs` first, then `self`.
    pub fn mul(self, rhs: Self) -> Self {
        Self {
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        }
    }

    /// Rotate a vector: q * v * q^-1.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let qv = Vec3::new(self.x, self.y, self.z);
        let term1 = qv.scale(2.0 * qv.dot(v));
        let term2 = v.scale(self.w * self.w - qv.dot(qv));
        let term3 = qv.cross(v).scale(2.0 * self.w);
        term1.add(term2).add(term3)
    }
}

// ── Pose ─────────────────────────────────────────────────────

/// Rigid transform from a local frame into the reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self::new(Vec3::new(x, y, z), Quat::IDENTITY)
    }

    /// A pose at `origin` whose forward (-Z) axis points at `target`.
    pub fn looking_at(origin: Vec3, target: Vec3) -> Self {
        let dir = target.sub(origin).normalize();
        Self::new(origin, Quat::from_rotation_arc(Vec3::FORWARD, dir))
    }

    /// World-space forward direction (unit length).
    pub fn forward(&self) -> Vec3 {
        self.orientation.rotate(Vec3::FORWARD).normalize()
    }
}

// ── Ray-quad intersection ────────────────────────────────────

/// Where a ray crosses a quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadHit {
    /// Ray parameter at the hit; equals meters for a unit direction.
    pub distance: f32,
    /// Horizontal surface coordinate, 0 at the left edge.
    pub u: f64,
    /// Vertical surface coordinate, 0 at the top edge (grows downward).
    pub v: f64,
}

/// Intersect a world-space ray with a quad of `width` x `height` meters
/// placed at `quad_pose`.
///
/// Returns `None` for a zero-size quad, a ray (nearly) parallel to the
/// quad plane, a crossing at or behind the ray origin, or a crossing
/// outside the quad bounds.
pub fn intersect_ray_with_quad(
    ray_origin: Vec3,
    ray_direction: Vec3,
    quad_pose: &Pose,
    width: f32,
    height: f32,
) -> Option<QuadHit> {
    if !(width > 0.0 && height > 0.0) {
        return None;
    }

    let inv = quad_pose.orientation.conjugate();
    let local_origin = inv.rotate(ray_origin.sub(quad_pose.position));
    let local_dir = inv.rotate(ray_direction);

    if local_dir.z.abs() < 1.0e-6 {
        return None;
    }

    let t = -local_origin.z / local_dir.z;
    if !(t > 0.0) {
        return None;
    }

    let hit = local_origin.add(local_dir.scale(t));
    if hit.x.abs() > width * 0.5 || hit.y.abs() > height * 0.5 {
        return None;
    }

    Some(QuadHit {
        distance: t,
        u: f64::from(hit.x / width + 0.5),
        v: f64::from(0.5 - hit.y / height),
    })
}
