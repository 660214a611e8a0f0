//! Stable handles addressing objects owned by [`PhysicsSystem`](crate::PhysicsSystem)
//! and [`ColliderManager`](crate::ColliderManager).

use std::fmt;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Raw index value.
            #[must_use]
            pub const fn index(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_handle!(
    /// A simulation world.
    WorldHandle,
    "world"
);
define_handle!(
    /// A rigid body, character, debris piece, sensor or soft body.
    CollidableHandle,
    "collidable"
);
define_handle!(
    /// A joint between one or two rigid bodies.
    ConstraintHandle,
    "constraint"
);

/// A shared collision shape held by the [`ColliderManager`](crate::ColliderManager).
///
/// Named colliders and unnamed slots use disjoint id spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColliderId {
    Named(u32),
    Unnamed(u32),
}

impl fmt::Display for ColliderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(id) => write!(f, "collider#{id}"),
            Self::Unnamed(slot) => write!(f, "collider-slot#{slot}"),
        }
    }
}

impl CollidableHandle {
    /// Pack into backend user data.
    pub(crate) const fn to_user_data(self) -> u128 {
        self.0 as u128 + 1
    }

    /// Unpack from backend user data; zero means "not ours".
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn from_user_data(data: u128) -> Option<Self> {
        if data == 0 || data > u32::MAX as u128 + 1 {
            None
        } else {
            Some(Self((data - 1) as u32))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_data_round_trip() {
        for raw in [0, 1, 77, u32::MAX] {
            let handle = CollidableHandle(raw);
            assert_eq!(
                CollidableHandle::from_user_data(handle.to_user_data()),
                Some(handle)
            );
        }
        assert_eq!(CollidableHandle::from_user_data(0), None);
    }

    #[test]
    fn display_names() {
        assert_eq!(WorldHandle(3).to_string(), "world#3");
        assert_eq!(ConstraintHandle(0).to_string(), "constraint#0");
        assert_eq!(ColliderId::Unnamed(2).to_string(), "collider-slot#2");
    }
}
