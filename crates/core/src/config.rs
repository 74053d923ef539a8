//! Runtime settings parsed from startup flags.
//!
//! # Overview
//!
//! Flags take the form `-name:value`. Boolean flags accept `0`, `1`, `true`
//! or `false`, and a bare `-name` means true. Arguments that do not start
//! with a dash are ignored, as are other malformed dash arguments. Unknown
//! names are logged and skipped. A value that fails to parse is a
//! [`Error::Config`] so the process can abort before any GPU object exists.
//!
//! # Example
//!
//! ```
//! use vbparts_core::{RuntimeSettings, TechniqueArg};
//!
//! let args = ["vbparts", "-renderer:g3", "-pcount:4096", "-freeze:1"];
//! let settings = RuntimeSettings::parse_args(args).unwrap();
//! assert_eq!(settings.technique, TechniqueArg::GBuffer3);
//! assert_eq!(settings.particle_count, 4096);
//! assert!(settings.freeze_time);
//! ```

use std::str::FromStr;

use tracing::{info, warn};

use crate::error::{Error, Result};

/// Flags that may be given without a value.
const BOOLEAN_FLAGS: [&str; 4] = ["ui", "shadercomp", "freeze", "cutout"];

/// Rendering technique selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TechniqueArg {
    /// Forward renderer (`fwd`)
    Forward,
    /// Three-target G-buffer (`g3`)
    GBuffer3,
    /// Six-target G-buffer (`g6`)
    GBuffer6,
    /// Visibility buffer (`v`)
    #[default]
    VisibilityBuffer,
}

impl FromStr for TechniqueArg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fwd" => Ok(Self::Forward),
            "g3" => Ok(Self::GBuffer3),
            "g6" => Ok(Self::GBuffer6),
            "v" => Ok(Self::VisibilityBuffer),
            other => Err(Error::Config(format!(
                "unknown renderer '{other}' (expected fwd, g3, g6 or v)"
            ))),
        }
    }
}

/// Particle generation mode selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticleModeArg {
    /// Vertex expansion (`ve`)
    #[default]
    Vertex,
    /// Geometry-shader expansion (`ge`)
    Geometry,
    /// Compute generation (`co`)
    Compute,
    /// One point per vertex, expanded by the geometry shader (`vege`)
    VertexGeometry,
}

impl FromStr for ParticleModeArg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ve" => Ok(Self::Vertex),
            "ge" => Ok(Self::Geometry),
            "co" => Ok(Self::Compute),
            "vege" => Ok(Self::VertexGeometry),
            other => Err(Error::Config(format!(
                "unknown particle mode '{other}' (expected ve, ge, co or vege)"
            ))),
        }
    }
}

/// Settings fixed for the lifetime of the process.
///
/// Owned by the application and passed by reference to whatever needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    /// Start with the UI overlay visible
    pub show_ui: bool,
    /// Initial window width in pixels
    pub window_width: u32,
    /// Initial window height in pixels
    pub window_height: u32,
    /// Whether changing particle defines should trigger shader recompilation
    pub recompile_shaders: bool,
    /// Initial rendering technique
    pub technique: TechniqueArg,
    /// Initial particle generation mode
    pub particle_mode: ParticleModeArg,
    /// Particle fragment complexity. `None` keeps the level stored in the defines file.
    pub particle_complexity: Option<u8>,
    /// Particle spread
    pub particle_spread: f32,
    /// Particle quad half size
    pub particle_half_size: f32,
    /// Number of particles
    pub particle_count: u32,
    /// Pin simulation time to zero
    pub freeze_time: bool,
    /// Particle cutout mode. `None` keeps the value stored in the defines file.
    pub particle_cutout: Option<bool>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            show_ui: true,
            window_width: 1024,
            window_height: 768,
            recompile_shaders: true,
            technique: TechniqueArg::default(),
            particle_mode: ParticleModeArg::default(),
            particle_complexity: None,
            particle_spread: 0.4,
            particle_half_size: 0.03,
            particle_count: 1024 * 1024,
            freeze_time: false,
            particle_cutout: None,
        }
    }
}

impl RuntimeSettings {
    /// Parses settings from process arguments.
    ///
    /// The first argument (program name) is treated like any other and
    /// ignored because it does not start with a dash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a numeric value fails to parse or an
    /// enumerated value is not recognized.
    pub fn parse_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut settings = Self::default();

        for arg in args {
            let arg = arg.as_ref();
            let Some(body) = arg.strip_prefix('-') else {
                continue;
            };
            let parts: Vec<&str> = body.split(':').collect();
            let (name, value) = match parts.as_slice() {
                [name, value] => (*name, *value),
                [name] if BOOLEAN_FLAGS.contains(name) => (*name, "true"),
                _ => {
                    warn!("Ignoring malformed argument: {}", arg);
                    continue;
                }
            };
            info!("Setting {} = {}", name, value);
            settings.apply(name, value)?;
        }

        Ok(settings)
    }

    fn apply(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "ui" => self.show_ui = parse_flag(name, value)?,
            "width" => self.window_width = parse_number(name, value)?,
            "height" => self.window_height = parse_number(name, value)?,
            "shadercomp" => self.recompile_shaders = parse_flag(name, value)?,
            "renderer" => self.technique = value.parse()?,
            "pmode" => self.particle_mode = value.parse()?,
            "pspread" => self.particle_spread = parse_number(name, value)?,
            "psize" => self.particle_half_size = parse_number(name, value)?,
            "pcount" => self.particle_count = parse_number(name, value)?,
            "pcomplexity" => {
                let level: u8 = parse_number(name, value)?;
                if level > 3 {
                    return Err(Error::Config(format!(
                        "particle complexity must be in 0..=3, got {level}"
                    )));
                }
                self.particle_complexity = Some(level);
            }
            "freeze" => self.freeze_time = parse_flag(name, value)?,
            "cutout" => self.particle_cutout = Some(parse_flag(name, value)?),
            other => warn!("Unknown setting: {}", other),
        }
        Ok(())
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(Error::Config(format!(
            "invalid value '{other}' for -{name}, expected 0, 1, true or false"
        ))),
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid value '{value}' for -{name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_flags() {
        let settings = RuntimeSettings::parse_args(["vbparts"]).unwrap();
        assert_eq!(settings, RuntimeSettings::default());
        assert_eq!(settings.window_width, 1024);
        assert_eq!(settings.window_height, 768);
        assert_eq!(settings.technique, TechniqueArg::VisibilityBuffer);
        assert_eq!(settings.particle_mode, ParticleModeArg::Vertex);
    }

    #[test]
    fn test_all_flags() {
        let settings = RuntimeSettings::parse_args([
            "-ui:0",
            "-width:1920",
            "-height:1080",
            "-shadercomp:0",
            "-renderer:g6",
            "-pmode:vege",
            "-pspread:0.8",
            "-psize:0.1",
            "-pcount:300",
            "-pcomplexity:2",
            "-freeze:1",
            "-cutout:1",
        ])
        .unwrap();

        assert!(!settings.show_ui);
        assert_eq!(settings.window_width, 1920);
        assert_eq!(settings.window_height, 1080);
        assert!(!settings.recompile_shaders);
        assert_eq!(settings.technique, TechniqueArg::GBuffer6);
        assert_eq!(settings.particle_mode, ParticleModeArg::VertexGeometry);
        assert_eq!(settings.particle_spread, 0.8);
        assert_eq!(settings.particle_half_size, 0.1);
        assert_eq!(settings.particle_count, 300);
        assert_eq!(settings.particle_complexity, Some(2));
        assert!(settings.freeze_time);
        assert_eq!(settings.particle_cutout, Some(true));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let result = RuntimeSettings::parse_args(["-width:wide"]);
        assert!(matches!(result, Err(Error::Config(_))));

        let result = RuntimeSettings::parse_args(["-pcount:-5"]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_complexity_out_of_range() {
        let result = RuntimeSettings::parse_args(["-pcomplexity:4"]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_renderer_rejected() {
        let result = RuntimeSettings::parse_args(["-renderer:raytraced"]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_bare_boolean_flags_mean_true() {
        let settings = RuntimeSettings::parse_args(["vbparts", "-freeze", "-cutout"]).unwrap();
        assert!(settings.freeze_time);
        assert_eq!(settings.particle_cutout, Some(true));

        let settings =
            RuntimeSettings::parse_args(["-shadercomp:false", "-ui:0", "-ui"]).unwrap();
        assert!(!settings.recompile_shaders);
        assert!(settings.show_ui);
    }

    #[test]
    fn test_bad_boolean_is_config_error() {
        let result = RuntimeSettings::parse_args(["-freeze:yes"]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_and_unknown_args_ignored() {
        let settings =
            RuntimeSettings::parse_args(["positional", "-pcount", "-a:b:c", "-colour:blue"])
                .unwrap();
        assert_eq!(settings, RuntimeSettings::default());
    }
}
