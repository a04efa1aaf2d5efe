//! Rotation math with exact quadrant handling
//!
//! `f64::sin(PI)` returns `1.2246e-16`, which would leak into exported files
//! as `-0.000000` or as a jitter between exports. All rotation math in the
//! exporter goes through [`stable_sin_cos`], which reduces the angle to the
//! nearest multiple of π/2 first and returns exact 0/±1 components there.

use std::f64::consts::FRAC_PI_2;

use crate::types::{Transform, Vec3};

/// Remainders below this (radians) are treated as an exact quadrant angle.
///
/// Covers angles authored in `f32` (`f32::consts::PI` is 8.7e-8 away from π).
pub const QUADRANT_SNAP: f64 = 1e-6;

/// Turn `-0.0` into `0.0`, leave everything else untouched
#[inline]
pub fn clean_zero(value: f64) -> f64 {
    value + 0.0
}

/// Sine and cosine of `angle` (radians), exact at multiples of π/2
pub fn stable_sin_cos(angle: f64) -> (f64, f64) {
    if !angle.is_finite() {
        return angle.sin_cos();
    }

    let quadrant = (angle / FRAC_PI_2).round();
    let remainder = angle - quadrant * FRAC_PI_2;
    let (s, c) = if remainder.abs() <= QUADRANT_SNAP {
        (0.0, 1.0)
    } else {
        remainder.sin_cos()
    };

    let (sin, cos) = match (quadrant as i64).rem_euclid(4) {
        0 => (s, c),
        1 => (c, -s),
        2 => (-s, -c),
        _ => (-c, s),
    };
    (clean_zero(sin), clean_zero(cos))
}

/// Radians to degrees without producing `-0`
pub fn to_degrees(radians: f64) -> f64 {
    clean_zero(radians.to_degrees())
}

/// 3x3 rotation matrix, row major
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3 {
    pub m: [[f64; 3]; 3],
}

impl Mat3 {
    pub const IDENTITY: Self = Self {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    /// Rotation about X
    pub fn rotation_x(angle: f64) -> Self {
        let (s, c) = stable_sin_cos(angle);
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]],
        }
    }

    /// Rotation about Y
    pub fn rotation_y(angle: f64) -> Self {
        let (s, c) = stable_sin_cos(angle);
        Self {
            m: [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]],
        }
    }

    /// Rotation about Z
    pub fn rotation_z(angle: f64) -> Self {
        let (s, c) = stable_sin_cos(angle);
        Self {
            m: [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// XYZ Euler angles (X applied first): `Rz * Ry * Rx`
    pub fn from_euler_xyz(euler: Vec3) -> Self {
        Self::rotation_z(euler.z)
            .mul(&Self::rotation_y(euler.y))
            .mul(&Self::rotation_x(euler.x))
    }

    /// Inverse of [`Mat3::from_euler_xyz`]
    pub fn to_euler_xyz(&self) -> Vec3 {
        let m = &self.m;
        let sy = (-m[2][0]).clamp(-1.0, 1.0);
        let euler = if sy.abs() < 1.0 - 1e-12 {
            Vec3::new(m[2][1].atan2(m[2][2]), sy.asin(), m[1][0].atan2(m[0][0]))
        } else {
            // Gimbal lock: fold Z into X
            Vec3::new((-m[1][2]).atan2(m[1][1]), sy.signum() * FRAC_PI_2, 0.0)
        };
        Vec3::new(clean_zero(euler.x), clean_zero(euler.y), clean_zero(euler.z))
    }

    pub fn mul(&self, other: &Self) -> Self {
        let mut out = [[0.0; 3]; 3];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.m[r][k] * other.m[k][c]).sum();
            }
        }
        Self { m: out }
    }

    pub fn transpose(&self) -> Self {
        let m = &self.m;
        Self {
            m: [
                [m[0][0], m[1][0], m[2][0]],
                [m[0][1], m[1][1], m[2][1]],
                [m[0][2], m[1][2], m[2][2]],
            ],
        }
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Inverse via the adjugate, `None` when singular
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() < 1e-12 {
            return None;
        }
        let m = &self.m;
        let inv = 1.0 / det;
        Some(Self {
            m: [
                [
                    (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv,
                    (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv,
                    (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv,
                ],
                [
                    (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv,
                    (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv,
                    (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv,
                ],
                [
                    (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv,
                    (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv,
                    (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv,
                ],
            ],
        })
    }

    pub fn transform(&self, v: Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }
}

/// Rotation/scale plus translation, used for world transforms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub linear: Mat3,
    pub translation: Vec3,
}

impl Affine {
    pub const IDENTITY: Self = Self {
        linear: Mat3::IDENTITY,
        translation: Vec3::ZERO,
    };

    /// `T * R * S` of a local transform
    pub fn from_transform(transform: &Transform) -> Self {
        let s = transform.scale;
        let scale = Mat3 {
            m: [[s.x, 0.0, 0.0], [0.0, s.y, 0.0], [0.0, 0.0, s.z]],
        };
        Self {
            linear: Mat3::from_euler_xyz(transform.rotation).mul(&scale),
            translation: transform.translation,
        }
    }

    /// `self * other` (apply `other` first)
    pub fn mul(&self, other: &Self) -> Self {
        Self {
            linear: self.linear.mul(&other.linear),
            translation: self.linear.transform(other.translation).add(&self.translation),
        }
    }

    /// Inverse, `None` when the linear part is singular
    pub fn inverse(&self) -> Option<Self> {
        let linear = self.linear.inverse()?;
        let translation = linear.transform(self.translation).scale(-1.0);
        Some(Self {
            linear,
            translation: Vec3::new(
                clean_zero(translation.x),
                clean_zero(translation.y),
                clean_zero(translation.z),
            ),
        })
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Split back into translation, XYZ Euler rotation and scale.
    ///
    /// Exact for `T * R * S` products; shear from non-uniform parent scale
    /// is dropped. A mirrored basis is expressed as a negative X scale.
    pub fn to_transform(&self) -> Transform {
        let m = &self.linear.m;
        let column = |c: usize| (m[0][c] * m[0][c] + m[1][c] * m[1][c] + m[2][c] * m[2][c]).sqrt();
        let mut scale = Vec3::new(column(0), column(1), column(2));
        if self.linear.determinant() < 0.0 {
            scale.x = -scale.x;
        }

        let mut rotation = Mat3::IDENTITY;
        for (c, s) in [scale.x, scale.y, scale.z].into_iter().enumerate() {
            if s != 0.0 {
                for r in 0..3 {
                    rotation.m[r][c] = m[r][c] / s;
                }
            }
        }

        let t = self.translation;
        Transform {
            translation: Vec3::new(clean_zero(t.x), clean_zero(t.y), clean_zero(t.z)),
            rotation: rotation.to_euler_xyz(),
            scale,
        }
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.linear.transform(p).add(&self.translation)
    }

    /// Normals use the inverse transpose and are renormalized
    pub fn transform_normal(&self, n: Vec3) -> Vec3 {
        match self.linear.inverse() {
            Some(inv) => inv.transpose().transform(n).normalize(),
            None => self.linear.transform(n).normalize(),
        }
    }
}

/// Z-up to Y-up basis change (a -90° rotation about X)
pub fn z_up_to_y_up() -> Mat3 {
    Mat3::rotation_x(-FRAC_PI_2)
}

/// Convert a Z-up direction/position to Y-up: `(x, y, z) -> (x, z, -y)`
pub fn bake_vector(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, clean_zero(-v.y))
}

/// Convert a Z-up scale to Y-up: `(x, y, z) -> (x, z, y)`
pub fn bake_scale(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, v.y)
}

/// Convert a whole local transform to Y-up
pub fn bake_transform(transform: &Transform) -> Transform {
    Transform {
        translation: bake_vector(transform.translation),
        rotation: bake_rotation(transform.rotation),
        scale: bake_scale(transform.scale),
    }
}

/// Convert a Z-up XYZ Euler rotation to Y-up by conjugating with the basis change
pub fn bake_rotation(euler: Vec3) -> Vec3 {
    if euler == Vec3::ZERO {
        return Vec3::ZERO;
    }
    let basis = z_up_to_y_up();
    basis
        .mul(&Mat3::from_euler_xyz(euler))
        .mul(&basis.transpose())
        .to_euler_xyz()
}
