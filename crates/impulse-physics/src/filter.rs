//! Collision-filter encoding.
//!
//! The low bits of the backend's 32-bit group words are reserved for
//! engine-internal classes; user layers `1..MAX_FILTER_LAYERS` live above
//! them. Layer 0 is the default layer and maps onto the class bits of the
//! object that carries it.
//!
//! ```text
//! bit  0  DEFAULT     bit 3  DEBRIS      bit 6..=31  user layers 1..=26
//! bit  1  STATIC      bit 4  SENSOR
//! bit  2  KINEMATIC   bit 5  CHARACTER
//! ```
//!
//! A world's filter table stores, per layer, a mask of the layers it
//! collides with. Bit 0 of a mask means "the default layer", which expands
//! to the internal classes that default-layer objects live in.
//!
//! Objects and queries use the same helpers, so world insertion, overlap
//! tests and sweeps always agree.

use rapier3d::prelude::{Group, InteractionGroups};

pub const DEFAULT: u32 = 1 << 0;
pub const STATIC: u32 = 1 << 1;
pub const KINEMATIC: u32 = 1 << 2;
pub const DEBRIS: u32 = 1 << 3;
pub const SENSOR: u32 = 1 << 4;
pub const CHARACTER: u32 = 1 << 5;

/// Shift applied to user layer bits.
pub const USER_LAYER_SHIFT: u32 = 5;

/// Number of addressable layers, including the default layer 0.
pub const MAX_FILTER_LAYERS: usize = 27;

/// Mask value that collides with every layer.
pub const ALL_LAYERS: u32 = u32::MAX;

/// Broadphase class of an object, derived from its body type and variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterClass {
    Dynamic,
    Static,
    Kinematic,
    Debris,
    Sensor,
    Character,
    SoftBody,
}

impl FilterClass {
    /// Group bits for an object of this class on the default layer.
    pub const fn default_layer_bits(self) -> u32 {
        match self {
            Self::Dynamic | Self::SoftBody => DEFAULT,
            Self::Static => STATIC,
            Self::Kinematic => KINEMATIC | STATIC,
            Self::Debris => DEBRIS,
            Self::Sensor => SENSOR,
            Self::Character => CHARACTER | KINEMATIC,
        }
    }

    /// Internal classes an object of this class accepts when its mask
    /// includes the default layer.
    pub const fn default_layer_accepts(self) -> u32 {
        match self {
            Self::Dynamic => DEFAULT | SENSOR | STATIC | KINEMATIC | DEBRIS | CHARACTER,
            Self::Static | Self::Kinematic => DEFAULT | SENSOR | DEBRIS | CHARACTER,
            Self::Debris => DEFAULT | STATIC | KINEMATIC,
            Self::Sensor | Self::SoftBody => DEFAULT | STATIC | KINEMATIC,
            Self::Character => DEFAULT | SENSOR | STATIC | KINEMATIC,
        }
    }
}

/// Backend bit for a user layer. Layer 0 has no user bit.
#[inline]
pub const fn layer_bit(layer: u32) -> u32 {
    if layer == 0 || layer as usize >= MAX_FILTER_LAYERS {
        0
    } else {
        1 << (layer + USER_LAYER_SHIFT)
    }
}

/// User-layer part of a filter-table mask, moved above the reserved bits.
#[inline]
pub const fn user_layer_bits(mask: u32) -> u32 {
    (mask & !1) << USER_LAYER_SHIFT
}

/// Membership word of an object on `layer`.
pub const fn membership(layer: u32, class: FilterClass) -> u32 {
    if layer == 0 {
        class.default_layer_bits()
    } else {
        layer_bit(layer)
    }
}

/// Filter word of an object of `class` whose layer collides with `mask`.
pub const fn filter(mask: u32, class: FilterClass) -> u32 {
    let mut bits = user_layer_bits(mask);
    if mask & 1 != 0 {
        bits |= class.default_layer_accepts();
    }
    bits
}

/// Backend groups for an object on `layer` with the given table mask.
pub fn object_groups(layer: u32, class: FilterClass, mask: u32) -> InteractionGroups {
    InteractionGroups::new(
        Group::from_bits_truncate(membership(layer, class)),
        Group::from_bits_truncate(filter(mask, class)),
    )
}

/// Backend groups for a query issued from `layer` against `mask`.
///
/// A query from the default layer presents itself as a default-class
/// object; a default-layer mask bit reaches default, static and kinematic
/// objects but not sensors, debris or characters' private class.
pub fn query_groups(layer: u32, mask: u32) -> InteractionGroups {
    let group = if layer == 0 { DEFAULT } else { layer_bit(layer) };
    let mut bits = user_layer_bits(mask);
    if mask & 1 != 0 {
        bits |= DEFAULT | STATIC | KINEMATIC;
    }
    InteractionGroups::new(
        Group::from_bits_truncate(group),
        Group::from_bits_truncate(bits),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepts(a: InteractionGroups, b: InteractionGroups) -> bool {
        a.test(b)
    }

    #[test]
    fn user_layers_start_above_reserved_bits() {
        assert_eq!(layer_bit(0), 0);
        assert_eq!(layer_bit(1), 1 << 6);
        assert_eq!(layer_bit(26), 1 << 31);
        assert_eq!(layer_bit(27), 0);
    }

    #[test]
    fn mask_shift_matches_layer_bit() {
        for layer in 1..MAX_FILTER_LAYERS as u32 {
            assert_eq!(user_layer_bits(1 << layer), layer_bit(layer));
        }
    }

    #[test]
    fn default_dynamic_hits_static() {
        let dynamic = object_groups(0, FilterClass::Dynamic, ALL_LAYERS);
        let ground = object_groups(0, FilterClass::Static, ALL_LAYERS);
        assert!(accepts(dynamic, ground));
    }

    #[test]
    fn debris_ignores_debris_and_characters() {
        let a = object_groups(0, FilterClass::Debris, ALL_LAYERS);
        let b = object_groups(0, FilterClass::Debris, ALL_LAYERS);
        let character = object_groups(0, FilterClass::Character, ALL_LAYERS);
        let ground = object_groups(0, FilterClass::Static, ALL_LAYERS);
        assert!(!accepts(a, b));
        assert!(!accepts(a, character));
        assert!(accepts(a, ground));
    }

    #[test]
    fn cleared_mask_bit_separates_layers() {
        let mask_without_layer_3 = ALL_LAYERS & !(1 << 3);
        let a = object_groups(2, FilterClass::Dynamic, mask_without_layer_3);
        let b = object_groups(3, FilterClass::Dynamic, ALL_LAYERS);
        assert!(!accepts(a, b));
        let a = object_groups(2, FilterClass::Dynamic, ALL_LAYERS);
        assert!(accepts(a, b));
    }

    #[test]
    fn default_query_skips_sensors() {
        let query = query_groups(0, ALL_LAYERS);
        let sensor = object_groups(0, FilterClass::Sensor, ALL_LAYERS);
        let kinematic = object_groups(0, FilterClass::Kinematic, ALL_LAYERS);
        assert!(!accepts(query, sensor));
        assert!(accepts(query, kinematic));
    }

    #[test]
    fn query_reaches_user_layer_in_mask() {
        let object = object_groups(4, FilterClass::Dynamic, ALL_LAYERS);
        assert!(accepts(query_groups(0, 1 << 4), object));
        assert!(!accepts(query_groups(0, 1 << 5), object));
    }
}
