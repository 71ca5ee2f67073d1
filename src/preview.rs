//! Procedural 3D preview models, one per object class.
//!
//! Models are plain part lists (primitive + placement) that a 3D front end can
//! turn into meshes. Nothing here renders.

use std::f32::consts::PI;

use crate::detect::ObjectClass;

/// Yaw speed of the preview turntable in radians per second.
pub const TURNTABLE_SPEED: f32 = 0.6;

const DEFAULT_CAMERA_Z: f32 = 2.4;
const WIDE_CAMERA_Z: f32 = 3.2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Primitive {
    Capsule { radius: f32, length: f32 },
    Sphere { radius: f32 },
    Cylinder { radius_top: f32, radius_bottom: f32, height: f32 },
    Cuboid { width: f32, height: f32, depth: f32 },
    Torus { radius: f32, tube: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Part {
    pub primitive: Primitive,
    pub position: [f32; 3],
    /// Euler angles in radians.
    pub rotation: [f32; 3],
}

impl Part {
    fn at(primitive: Primitive, position: [f32; 3]) -> Self {
        Self {
            primitive,
            position,
            rotation: [0.0; 3],
        }
    }

    fn rotated(mut self, rotation: [f32; 3]) -> Self {
        self.rotation = rotation;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelPreview {
    pub parts: Vec<Part>,
    /// Camera distance along +z; wide models sit further back.
    pub camera_z: f32,
}

impl ModelPreview {
    pub fn for_class(class: &ObjectClass) -> Self {
        let (parts, camera_z) = match class {
            ObjectClass::Person => (person(), DEFAULT_CAMERA_Z),
            ObjectClass::CellPhone => (phone(), DEFAULT_CAMERA_Z),
            ObjectClass::Bottle => (bottle(), DEFAULT_CAMERA_Z),
            ObjectClass::Cup => (cup(), DEFAULT_CAMERA_Z),
            ObjectClass::Keyboard => (keyboard(), WIDE_CAMERA_Z),
            ObjectClass::Other(_) => (generic(), DEFAULT_CAMERA_Z),
        };
        Self { parts, camera_z }
    }

    /// Turntable yaw after `elapsed_secs`, wrapped to [0, 2π).
    pub fn yaw_at(elapsed_secs: f32) -> f32 {
        (elapsed_secs * TURNTABLE_SPEED).rem_euclid(2.0 * PI)
    }
}

fn cylinder(radius_top: f32, radius_bottom: f32, height: f32) -> Primitive {
    Primitive::Cylinder {
        radius_top,
        radius_bottom,
        height,
    }
}

fn cuboid(width: f32, height: f32, depth: f32) -> Primitive {
    Primitive::Cuboid {
        width,
        height,
        depth,
    }
}

fn person() -> Vec<Part> {
    vec![
        // torso, head
        Part::at(
            Primitive::Capsule {
                radius: 0.18,
                length: 0.5,
            },
            [0.0, 0.2, 0.0],
        ),
        Part::at(Primitive::Sphere { radius: 0.16 }, [0.0, 0.75, 0.0]),
        // legs
        Part::at(cylinder(0.06, 0.06, 0.55), [-0.1, -0.4, 0.0]),
        Part::at(cylinder(0.06, 0.06, 0.55), [0.1, -0.4, 0.0]),
        // arms
        Part::at(cylinder(0.05, 0.05, 0.55), [-0.35, 0.25, 0.0]).rotated([0.0, 0.0, PI / 8.0]),
        Part::at(cylinder(0.05, 0.05, 0.55), [0.35, 0.25, 0.0]).rotated([0.0, 0.0, -PI / 8.0]),
    ]
}

fn phone() -> Vec<Part> {
    vec![
        Part::at(cuboid(0.55, 1.05, 0.08), [0.0, 0.0, 0.0]),
        Part::at(cuboid(0.48, 0.9, 0.01), [0.0, 0.0, 0.05]),
        Part::at(cuboid(0.16, 0.16, 0.02), [-0.18, 0.38, 0.055]),
    ]
}

fn bottle() -> Vec<Part> {
    vec![
        Part::at(cylinder(0.22, 0.26, 0.9), [0.0, -0.05, 0.0]),
        Part::at(cylinder(0.12, 0.14, 0.25), [0.0, 0.55, 0.0]),
        Part::at(cylinder(0.13, 0.13, 0.12), [0.0, 0.72, 0.0]),
    ]
}

fn cup() -> Vec<Part> {
    vec![
        Part::at(cylinder(0.28, 0.22, 0.55), [0.0, 0.0, 0.0]),
        // handle, rim
        Part::at(
            Primitive::Torus {
                radius: 0.16,
                tube: 0.05,
            },
            [0.33, 0.05, 0.0],
        ),
        Part::at(
            Primitive::Torus {
                radius: 0.255,
                tube: 0.03,
            },
            [0.0, 0.28, 0.0],
        ),
    ]
}

fn keyboard() -> Vec<Part> {
    let mut parts = vec![Part::at(cuboid(1.2, 0.18, 0.55), [0.0, 0.0, 0.0])];
    for row in 0..5 {
        for col in 0..10 {
            parts.push(Part::at(
                cuboid(0.09, 0.05, 0.08),
                [-0.54 + col as f32 * 0.12, 0.12, -0.22 + row as f32 * 0.11],
            ));
        }
    }
    parts
}

fn generic() -> Vec<Part> {
    vec![Part::at(cuboid(0.8, 0.8, 0.8), [0.0, 0.0, 0.0])]
}
