use thiserror::Error;

/// Top-level error type for impulse.
#[derive(Debug, Error)]
pub enum ImpulseError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Collider error: {0}")]
    Collider(#[from] ColliderError),

    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid frame_rate: {0} (must be > 0)")]
    InvalidFrameRate(u32),

    #[error("Invalid max_allowed_time_step: {0} (must be finite and > 0)")]
    InvalidMaxTimeStep(f32),

    #[error("Invalid solver_iterations: {0} (must be > 0)")]
    InvalidSolverIterations(u32),

    #[error("Invalid gravity: components must be finite")]
    InvalidGravity,
}

/// Collision shape construction errors.
#[derive(Debug, Error)]
pub enum ColliderError {
    #[error("Invalid {shape} dimensions: {detail}")]
    InvalidDimensions { shape: &'static str, detail: String },

    #[error("Mesh '{0}' has no collision geometry")]
    EmptyMesh(String),

    #[error("Convex hull computation failed for '{0}'")]
    HullFailed(String),

    #[error("Convex decomposition failed for '{0}'")]
    DecompositionFailed(String),

    #[error("Mesh not found: {0}")]
    MeshNotFound(String),

    #[error("Collider '{0}' has no source description to reload from")]
    NotReloadable(String),
}

/// Mesh validation errors.
///
/// Copy + static messages, cheap to return from per-surface checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MeshError {
    #[error("Index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("Index count {0} is not a multiple of 3")]
    NotTriangulated(usize),

    #[error("Mesh surface {0} does not exist")]
    MissingSurface(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_error_from_config_error() {
        let err = ConfigError::InvalidFrameRate(0);
        let impulse_err: ImpulseError = err.into();
        assert!(matches!(impulse_err, ImpulseError::Config(_)));
        assert!(impulse_err.to_string().contains("frame_rate"));
    }

    #[test]
    fn impulse_error_from_collider_error() {
        let err = ColliderError::HullFailed("rock".into());
        let impulse_err: ImpulseError = err.into();
        assert!(matches!(impulse_err, ImpulseError::Collider(_)));
        assert!(impulse_err.to_string().contains("rock"));
    }

    #[test]
    fn impulse_error_from_mesh_error() {
        let err = MeshError::NotTriangulated(4);
        let impulse_err: ImpulseError = err.into();
        assert!(matches!(impulse_err, ImpulseError::Mesh(_)));
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::Io(_)));
    }

    #[test]
    fn mesh_error_is_copy() {
        let err = MeshError::MissingSurface(2);
        let err2 = err;
        assert_eq!(err, err2);
    }

    #[test]
    fn config_error_display_messages() {
        assert_eq!(
            ConfigError::InvalidMaxTimeStep(-0.5).to_string(),
            "Invalid max_allowed_time_step: -0.5 (must be finite and > 0)"
        );
        assert_eq!(
            ConfigError::InvalidSolverIterations(0).to_string(),
            "Invalid solver_iterations: 0 (must be > 0)"
        );
    }

    #[test]
    fn collider_error_display_messages() {
        assert_eq!(
            ColliderError::InvalidDimensions {
                shape: "sphere",
                detail: "radius must be > 0".into(),
            }
            .to_string(),
            "Invalid sphere dimensions: radius must be > 0"
        );
        assert_eq!(
            ColliderError::EmptyMesh("crate".into()).to_string(),
            "Mesh 'crate' has no collision geometry"
        );
    }

    #[test]
    fn mesh_error_display_messages() {
        assert_eq!(
            MeshError::IndexOutOfRange {
                index: 9,
                vertex_count: 3,
            }
            .to_string(),
            "Index 9 out of range for 3 vertices"
        );
    }
}
