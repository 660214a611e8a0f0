use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_true() -> bool {
    true
}
const fn default_frame_rate() -> u32 {
    50
}
const fn default_max_allowed_time_step() -> f32 {
    0.2
}
const fn default_gravity() -> [f32; 3] {
    [0.0, 0.0, -980.0]
}
const fn default_solver_iterations() -> u32 {
    10
}

// ---------------------------------------------------------------------------
// ConstraintSolver
// ---------------------------------------------------------------------------

/// Constraint solver preset.
///
/// The backend has a single iterative solver; each preset selects a
/// different iteration and warm-starting profile for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintSolver {
    /// Default sequential-impulse profile.
    #[default]
    SequentialImpulse,
    /// Extra friction iterations, warm-starting kept.
    NonsmoothConjugateGradient,
    /// No warm-starting, plain projected Gauss-Seidel sweeps.
    ProjectedGaussSeidel,
    /// Doubled iteration budget for stiff stacks.
    Dantzig,
}

// ---------------------------------------------------------------------------
// DebugDrawMode
// ---------------------------------------------------------------------------

/// Bitmask of debug-draw channels pushed into each world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DebugDrawMode(u32);

impl DebugDrawMode {
    pub const NONE: Self = Self(0);
    pub const WIREFRAME: Self = Self(1 << 0);
    pub const AABB: Self = Self(1 << 1);
    pub const CONTACT_POINTS: Self = Self(1 << 2);
    pub const NORMALS: Self = Self(1 << 3);
    pub const CONSTRAINTS: Self = Self(1 << 4);
    pub const CONSTRAINT_LIMITS: Self = Self(1 << 5);
    pub const NO_DEACTIVATION: Self = Self(1 << 6);
    pub const CCD: Self = Self(1 << 7);

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set or clear `flag`.
    pub const fn set(&mut self, flag: Self, enabled: bool) {
        if enabled {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }
}

impl std::ops::BitOr for DebugDrawMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for DebugDrawMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// DebugDrawConfig
// ---------------------------------------------------------------------------

/// Debug-draw toggles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugDrawConfig {
    #[serde(default)]
    pub show_wireframe: bool,
    #[serde(default)]
    pub show_aabb: bool,
    #[serde(default)]
    pub show_contact_points: bool,
    #[serde(default)]
    pub show_normals: bool,
    #[serde(default)]
    pub show_constraints: bool,
    #[serde(default)]
    pub show_constraint_limits: bool,
}

// ---------------------------------------------------------------------------
// PhysicsConfig
// ---------------------------------------------------------------------------

/// Process-wide physics configuration, polled once per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Global simulation enable. Stepping is a no-op when false.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Target substep rate in Hz (default: 50).
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Longest frame time, in seconds, the substep budget covers (default: 0.2).
    #[serde(default = "default_max_allowed_time_step")]
    pub max_allowed_time_step: f32,

    /// Gravity vector [x, y, z] in system units per second squared.
    #[serde(default = "default_gravity")]
    pub gravity: [f32; 3],

    /// Constraint solver preset.
    #[serde(default)]
    pub solver: ConstraintSolver,

    /// Velocity solver iterations per substep (default: 10).
    #[serde(default = "default_solver_iterations")]
    pub solver_iterations: u32,

    /// Enable deterministic mode (fixed processing order, no island splitting).
    #[serde(default)]
    pub deterministic: bool,

    /// Keep every body awake.
    #[serde(default)]
    pub no_deactivation: bool,

    /// Allow continuous collision detection on bodies that request it.
    #[serde(default = "default_true")]
    pub enable_ccd: bool,

    #[serde(default)]
    pub debug: DebugDrawConfig,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frame_rate: default_frame_rate(),
            max_allowed_time_step: default_max_allowed_time_step(),
            gravity: default_gravity(),
            solver: ConstraintSolver::default(),
            solver_iterations: default_solver_iterations(),
            deterministic: false,
            no_deactivation: false,
            enable_ccd: true,
            debug: DebugDrawConfig::default(),
        }
    }
}

impl PhysicsConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 {
            return Err(ConfigError::InvalidFrameRate(self.frame_rate));
        }
        if !self.max_allowed_time_step.is_finite() || self.max_allowed_time_step <= 0.0 {
            return Err(ConfigError::InvalidMaxTimeStep(self.max_allowed_time_step));
        }
        if self.solver_iterations == 0 {
            return Err(ConfigError::InvalidSolverIterations(self.solver_iterations));
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(ConfigError::InvalidGravity);
        }
        Ok(())
    }

    /// Fixed substep length in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn fixed_time_step(&self) -> f32 {
        1.0 / self.frame_rate as f32
    }

    /// Substep cap for a single `step_simulation` call.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn max_substeps(&self) -> u32 {
        ((self.frame_rate as f32 * self.max_allowed_time_step).ceil() as u32).max(1)
    }

    /// Fold the debug toggles, deactivation and CCD flags into one bitmask.
    pub fn debug_draw_mode(&self) -> DebugDrawMode {
        let mut mode = DebugDrawMode::NONE;
        mode.set(DebugDrawMode::WIREFRAME, self.debug.show_wireframe);
        mode.set(DebugDrawMode::AABB, self.debug.show_aabb);
        mode.set(DebugDrawMode::CONTACT_POINTS, self.debug.show_contact_points);
        mode.set(DebugDrawMode::NORMALS, self.debug.show_normals);
        mode.set(DebugDrawMode::CONSTRAINTS, self.debug.show_constraints);
        mode.set(
            DebugDrawMode::CONSTRAINT_LIMITS,
            self.debug.show_constraint_limits,
        );
        mode.set(DebugDrawMode::NO_DEACTIVATION, self.no_deactivation);
        mode.set(DebugDrawMode::CCD, self.enable_ccd);
        mode
    }

    /// Parse from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
