use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Point, Rect};

/// Errors raised while loading or validating a [`MindConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("reading config {path}: {source}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// TOML could not be decoded.
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of its accepted range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Margins applied around a thing's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    /// Outset used for waypoints and the gap area.
    #[serde(default = "default_gap")]
    pub gap: f64,
    /// Outset used for the security area.
    #[serde(default = "default_security")]
    pub security: f64,
    /// Inset used for the minimum visual-system area.
    #[serde(default = "default_min_visual")]
    pub min_visual: f64,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            gap: default_gap(),
            security: default_security(),
            min_visual: default_min_visual(),
        }
    }
}

/// Camera frustum parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FovConfig {
    /// Far plane distance.
    #[serde(default = "default_far_distance")]
    pub far_distance: f64,
    /// Vertical field of view in radians.
    #[serde(default = "default_vertical_fov")]
    pub vertical: f64,
}

impl Default for FovConfig {
    fn default() -> Self {
        Self {
            far_distance: default_far_distance(),
            vertical: default_vertical_fov(),
        }
    }
}

/// Environment rectangle reported by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Width in world units.
    #[serde(default = "default_width")]
    pub width: f64,
    /// Height in world units.
    #[serde(default = "default_height")]
    pub height: f64,
    /// Delivery spot, when the world has one.
    #[serde(default)]
    pub delivery_spot: Option<[f64; 2]>,
}

impl Environment {
    /// Width over height.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    /// Whole environment as a rectangle anchored at the origin.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::from_bounds(0.0, 0.0, self.width, self.height)
    }

    /// Delivery spot as a point.
    #[must_use]
    pub fn delivery_point(&self) -> Option<Point> {
        self.delivery_spot.map(|[x, y]| Point::new(x, y))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            delivery_spot: None,
        }
    }
}

/// Exploration grid resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Number of columns.
    #[serde(default = "default_columns")]
    pub columns: usize,
    /// Number of rows.
    #[serde(default = "default_rows")]
    pub rows: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            rows: default_rows(),
        }
    }
}

/// Externally supplied constants of the creature mind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MindConfig {
    /// Area margins around things.
    #[serde(default)]
    pub margins: Margins,
    /// Camera frustum.
    #[serde(default)]
    pub fov: FovConfig,
    /// Length of the direct gaze ray.
    #[serde(default = "default_ray_range")]
    pub ray_range: f64,
    /// Buffer retention in seconds; `-1` never expires.
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: i64,
    /// Speed substituted when a snapshot reports zero.
    #[serde(default = "default_creature_speed")]
    pub default_creature_speed: f64,
    /// Environment rectangle.
    #[serde(default)]
    pub environment: Environment,
    /// Exploration grid resolution.
    #[serde(default)]
    pub grid: GridConfig,
    /// Capacity of the merge notification channel.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

impl Default for MindConfig {
    fn default() -> Self {
        Self {
            margins: Margins::default(),
            fov: FovConfig::default(),
            ray_range: default_ray_range(),
            retention_seconds: default_retention_seconds(),
            default_creature_speed: default_creature_speed(),
            environment: Environment::default(),
            grid: GridConfig::default(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

impl MindConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let margins = &self.margins;
        if margins.gap < 0.0 || margins.security < 0.0 || margins.min_visual < 0.0 {
            return Err(ConfigError::Invalid("margins must be non-negative".into()));
        }
        if self.fov.far_distance <= 0.0 {
            return Err(ConfigError::Invalid("fov.far_distance must be positive".into()));
        }
        if self.ray_range <= 0.0 {
            return Err(ConfigError::Invalid("ray_range must be positive".into()));
        }
        if self.environment.width <= 0.0 || self.environment.height <= 0.0 {
            return Err(ConfigError::Invalid(
                "environment width and height must be positive".into(),
            ));
        }
        if self.grid.columns == 0 || self.grid.rows == 0 {
            return Err(ConfigError::Invalid("grid needs at least one cell".into()));
        }
        if self.retention_seconds != -1 && self.retention_seconds <= 0 {
            return Err(ConfigError::Invalid(format!(
                "retention_seconds must be -1 or positive, got {}",
                self.retention_seconds
            )));
        }
        if self.notification_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notification_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

const fn default_gap() -> f64 {
    40.0
}

const fn default_security() -> f64 {
    30.0
}

const fn default_min_visual() -> f64 {
    5.0
}

const fn default_far_distance() -> f64 {
    1000.0
}

const fn default_vertical_fov() -> f64 {
    1.03
}

const fn default_ray_range() -> f64 {
    1000.0
}

const fn default_retention_seconds() -> i64 {
    -1
}

const fn default_creature_speed() -> f64 {
    4.0
}

const fn default_width() -> f64 {
    800.0
}

const fn default_height() -> f64 {
    600.0
}

const fn default_columns() -> usize {
    80
}

const fn default_rows() -> usize {
    60
}

const fn default_notification_capacity() -> usize {
    64
}
