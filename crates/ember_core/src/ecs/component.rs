//! # Component Shapes
//!
//! Components are pure data containers with no behavior. The set of
//! shapes is closed and known at startup: storage and dispatch go
//! through an explicit tagged union rather than open-ended virtual
//! dispatch, so exhaustiveness is checked by the compiler.
//!
//! Payload structs are `Pod` with explicit padding: the engine core
//! never interprets their fields, it only needs identity, size and a
//! bitwise clone for lifecycle bookkeeping. Their semantics belong to
//! the render/audio/physics collaborators.

use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Identifier for a registered component type.
///
/// One ownership-mask bit per type, so at most
/// [`ComponentTypeId::LIMIT`] types can be registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ComponentTypeId(
    /// Raw type index; doubles as the ownership-mask bit position.
    pub u8,
);

impl ComponentTypeId {
    /// Maximum number of registrable component types.
    pub const LIMIT: u8 = 64;

    /// Returns this type's bit in the per-entity ownership mask.
    #[inline]
    #[must_use]
    pub const fn mask_bit(self) -> u64 {
        1 << self.0
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The shape of a component value.
///
/// Registration binds a [`ComponentTypeId`] to exactly one kind; adding
/// a value of a different kind is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// World-space placement.
    Transform,
    /// Draw-submission payload (sheet/frame/layer).
    Sprite,
    /// Linear motion and mass.
    RigidBody,
    /// Positional audio source.
    AudioEmitter,
    /// Opaque per-entity extension state.
    ScriptState,
}

impl ComponentKind {
    /// Returns the kind name as a static string (for log fields).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Sprite => "sprite",
            Self::RigidBody => "rigid_body",
            Self::AudioEmitter => "audio_emitter",
            Self::ScriptState => "script_state",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// World-space placement of an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Transform {
    /// X coordinate in world space.
    pub x: f32,
    /// Y coordinate in world space.
    pub y: f32,
    /// Z coordinate in world space.
    pub z: f32,
    /// Padding for alignment (ensures 16-byte rows for bulk copies).
    pub _padding: f32,
}

impl Transform {
    /// Creates a new transform.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            _padding: 0.0,
        }
    }
}

/// Draw-submission payload. Field meaning belongs to the render layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Sprite {
    /// Sprite sheet identifier.
    pub sheet: u32,
    /// Frame index within the sheet.
    pub frame: u32,
    /// Draw layer (lower draws first).
    pub layer: u32,
    /// Render flags (flip, tint, etc.).
    pub flags: u32,
}

/// Linear motion state. Integrated by an external physics collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct RigidBody {
    /// X velocity component.
    pub vx: f32,
    /// Y velocity component.
    pub vy: f32,
    /// Z velocity component.
    pub vz: f32,
    /// Mass in kilograms.
    pub mass: f32,
}

impl RigidBody {
    /// Creates a new rigid body with the given velocity and mass.
    #[inline]
    #[must_use]
    pub const fn new(vx: f32, vy: f32, vz: f32, mass: f32) -> Self {
        Self { vx, vy, vz, mass }
    }
}

/// Positional audio source. Field meaning belongs to the audio layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct AudioEmitter {
    /// Audio clip identifier.
    pub clip: u32,
    /// Linear gain.
    pub gain: f32,
    /// Audible range in world units.
    pub range: f32,
    /// Playback flags (looping, spatialized, etc.).
    pub flags: u32,
}

/// Opaque per-entity state owned by extension code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ScriptState {
    /// Extension-defined phase discriminant.
    pub phase: u32,
    /// Extension-defined payload word.
    pub data0: u32,
    /// Extension-defined payload word.
    pub data1: u32,
    /// Extension-defined payload word.
    pub data2: u32,
}

/// A component value: the closed union over all known shapes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ComponentValue {
    /// World-space placement.
    Transform(Transform),
    /// Draw-submission payload.
    Sprite(Sprite),
    /// Linear motion and mass.
    RigidBody(RigidBody),
    /// Positional audio source.
    AudioEmitter(AudioEmitter),
    /// Opaque extension state.
    ScriptState(ScriptState),
}

impl ComponentValue {
    /// Returns the shape of this value.
    #[must_use]
    pub const fn kind(&self) -> ComponentKind {
        match self {
            Self::Transform(_) => ComponentKind::Transform,
            Self::Sprite(_) => ComponentKind::Sprite,
            Self::RigidBody(_) => ComponentKind::RigidBody,
            Self::AudioEmitter(_) => ComponentKind::AudioEmitter,
            Self::ScriptState(_) => ComponentKind::ScriptState,
        }
    }
}

/// Size in bytes of one stored component value.
///
/// Used for memory accounting; the union is sized to its widest variant,
/// which is what the dense arrays actually pay per slot.
#[must_use]
pub const fn component_value_size() -> usize {
    std::mem::size_of::<ComponentValue>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_bits_distinct() {
        let a = ComponentTypeId(0).mask_bit();
        let b = ComponentTypeId(5).mask_bit();
        assert_ne!(a, b);
        assert_eq!(a, 1);
        assert_eq!(b, 32);
    }

    #[test]
    fn test_kind_of_value() {
        let v = ComponentValue::Transform(Transform::new(1.0, 2.0, 3.0));
        assert_eq!(v.kind(), ComponentKind::Transform);
        let v = ComponentValue::Sprite(Sprite::default());
        assert_eq!(v.kind(), ComponentKind::Sprite);
    }

    #[test]
    fn test_payload_sizes() {
        // Rows are 16 bytes so bulk copies stay aligned.
        assert_eq!(std::mem::size_of::<Transform>(), 16);
        assert_eq!(std::mem::size_of::<Sprite>(), 16);
        assert_eq!(std::mem::size_of::<RigidBody>(), 16);
        assert_eq!(std::mem::size_of::<AudioEmitter>(), 16);
        assert_eq!(std::mem::size_of::<ScriptState>(), 16);
    }
}
