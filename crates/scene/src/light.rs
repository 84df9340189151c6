//! Light component.

use glam::Vec3;

/// Shape of a light's emission.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    /// Sun-like light along the entity's forward axis.
    Directional,
    /// Omnidirectional light at the entity's position.
    Point,
    /// Cone along the entity's forward axis. Cutoffs are cosines of the half angles.
    Spot { inner_cutoff: f32, outer_cutoff: f32 },
}

impl LightKind {
    /// Numeric tag written into light uniforms.
    pub fn tag(self) -> u32 {
        match self {
            LightKind::Directional => 0,
            LightKind::Point => 1,
            LightKind::Spot { .. } => 2,
        }
    }
}

/// A light attached to an entity. Position and direction come from the
/// entity's world transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    /// Attenuation radius; ignored by directional lights.
    pub range: f32,
    pub enabled: bool,
}

impl Default for Light {
    fn default() -> Self {
        Self::directional(Vec3::ONE, 1.0)
    }
}

impl Light {
    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            intensity,
            range: 0.0,
            enabled: true,
        }
    }

    pub fn point(color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            color,
            intensity,
            range,
            enabled: true,
        }
    }

    /// Spot light with ~25 degree inner and ~37 degree outer half angles.
    pub fn spot(color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            kind: LightKind::Spot {
                inner_cutoff: 0.9,
                outer_cutoff: 0.8,
            },
            color,
            intensity,
            range,
            enabled: true,
        }
    }
}
