//! Particle configuration shared by every technique.
//!
//! Fragment complexity and cutout mode are baked into the particle shaders
//! through a defines file read by the offline shader compiler. The setters
//! here keep that file in step with [`ParticleSettings`] and report whether
//! pipelines must be rebuilt to pick up the change.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use vbparts_core::{Error, ParticleModeArg, Result, RuntimeSettings};

/// Defines file shared with the particle shader sources. Resolved from this
/// crate's directory so the working directory does not matter.
pub const DEFINES_FILE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/__.defines");

pub const COMPLEXITY_MARKER: &str = "PARTICLE_COMPLEXITY_";
pub const CUTOUT_MARKER: &str = "PARTICLE_CUTOUT_MODE_";

pub const MAX_COMPLEXITY: u8 = 3;
/// The only complexity level whose shaders sample a texture.
pub const TEXTURED_COMPLEXITY: u8 = 2;

pub const MIN_PARTICLE_COUNT: u32 = 16;
pub const MAX_PARTICLE_COUNT: u32 = 4 * 1024 * 1024;
pub const DEFAULT_PARTICLE_COUNT: u32 = 1024 * 1024;

/// Fragment shaders compiled against the particle defines.
pub const DEPENDENT_SHADERS: [&str; 9] = [
    "comp_particles_fwd.frag",
    "comp_particles_g3.frag",
    "comp_particles_g6.frag",
    "comp_particles_v.frag",
    "particles_fwd.frag",
    "particles_g3.frag",
    "particles_g6.frag",
    "particles_v.frag",
    "pp_lighting_v.frag",
];

/// How particle quads are produced on the GPU.
///
/// Discriminants follow the order the modes are offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationMode {
    /// Six vertex shader invocations per particle, one per quad corner
    VertexExpansion = 0,
    /// A compute pass writes the corners into a storage buffer
    Compute = 1,
    /// Each geometry shader invocation emits a batch of quads
    GeometryExpansion = 2,
    /// One point per particle, expanded to a quad by the geometry shader
    VertexGeometry = 3,
}

impl GenerationMode {
    pub const ALL: [Self; 4] = [
        Self::VertexExpansion,
        Self::Compute,
        Self::GeometryExpansion,
        Self::VertexGeometry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::VertexExpansion => "VertexGenExp",
            Self::Compute => "ComputeGenExp",
            Self::GeometryExpansion => "GeometryGenExp",
            Self::VertexGeometry => "VertexGenGeometryExp",
        }
    }

    /// Mode at position `index` in [`GenerationMode::ALL`].
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl From<ParticleModeArg> for GenerationMode {
    fn from(arg: ParticleModeArg) -> Self {
        match arg {
            ParticleModeArg::Vertex => Self::VertexExpansion,
            ParticleModeArg::Geometry => Self::GeometryExpansion,
            ParticleModeArg::Compute => Self::Compute,
            ParticleModeArg::VertexGeometry => Self::VertexGeometry,
        }
    }
}

/// Particle parameters, owned by the frame orchestrator.
///
/// Count and mode changes take effect when the particle system is next
/// constructed; size, spread and forces flow through the uniform block.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSettings {
    count: u32,
    complexity: u8,
    cutout: bool,
    mode: GenerationMode,
    pub half_size: f32,
    /// How tightly packed the particles are.
    pub density: f32,
    pub gravity: f32,
    pub initial_upwards_force: f32,
    defines_path: PathBuf,
    recompile_shaders: bool,
}

impl ParticleSettings {
    /// Reads complexity and cutout from `defines_path`, then applies the
    /// startup overrides in `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the defines file cannot be read or does not hold
    /// exactly one of each marker, or if an override is out of range.
    pub fn load(settings: &RuntimeSettings, defines_path: impl Into<PathBuf>) -> Result<Self> {
        let defines_path = defines_path.into();
        let contents = read_defines(&defines_path)?;
        let complexity = parse_complexity(&contents)?;
        let cutout = define_value(&contents, CUTOUT_MARKER)? == '1';
        info!(
            "Read particle defines from {}: complexity {}, cutout {}",
            defines_path.display(),
            complexity,
            cutout
        );

        let mut particles = Self {
            count: settings
                .particle_count
                .clamp(MIN_PARTICLE_COUNT, MAX_PARTICLE_COUNT),
            complexity,
            cutout,
            mode: settings.particle_mode.into(),
            half_size: settings.particle_half_size,
            density: settings.particle_spread,
            gravity: 0.0,
            initial_upwards_force: 0.0,
            defines_path,
            recompile_shaders: settings.recompile_shaders,
        };

        if let Some(level) = settings.particle_complexity {
            particles.set_complexity(level)?;
        }
        if let Some(cutout) = settings.particle_cutout {
            particles.set_cutout(cutout)?;
        }
        Ok(particles)
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn complexity(&self) -> u8 {
        self.complexity
    }

    #[inline]
    pub fn cutout(&self) -> bool {
        self.cutout
    }

    #[inline]
    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    pub fn defines_path(&self) -> &Path {
        &self.defines_path
    }

    /// Clamps to `MIN_PARTICLE_COUNT..=MAX_PARTICLE_COUNT`.
    ///
    /// Returns `true` if the particle system must be rebuilt.
    pub fn set_count(&mut self, count: u32) -> bool {
        let count = count.clamp(MIN_PARTICLE_COUNT, MAX_PARTICLE_COUNT);
        let changed = count != self.count;
        self.count = count;
        changed
    }

    /// Returns `true` if the particle system must be rebuilt.
    pub fn set_mode(&mut self, mode: GenerationMode) -> bool {
        let changed = mode != self.mode;
        self.mode = mode;
        changed
    }

    /// Changes the fragment complexity level.
    ///
    /// Any level other than [`TEXTURED_COMPLEXITY`] turns cutout off.
    /// Returns `true` if pipelines must be rebuilt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `complexity` is above [`MAX_COMPLEXITY`],
    /// or an error if the defines file cannot be rewritten.
    pub fn set_complexity(&mut self, complexity: u8) -> Result<bool> {
        self.apply_complexity(complexity, true)
    }

    /// Switches cutout particles on or off.
    ///
    /// Enabling cutout forces [`TEXTURED_COMPLEXITY`]. Returns `true` if
    /// pipelines must be rebuilt.
    ///
    /// # Errors
    ///
    /// Returns an error if the defines file cannot be rewritten.
    pub fn set_cutout(&mut self, cutout: bool) -> Result<bool> {
        self.apply_cutout(cutout, true)
    }

    fn apply_complexity(&mut self, complexity: u8, announce: bool) -> Result<bool> {
        if complexity == self.complexity {
            return Ok(false);
        }
        if complexity > MAX_COMPLEXITY {
            return Err(Error::Config(format!(
                "particle complexity must be in 0..={MAX_COMPLEXITY}, got {complexity}"
            )));
        }

        // Memory only changes once the file has
        self.write_define(COMPLEXITY_MARKER, char::from(b'0' + complexity))?;
        self.complexity = complexity;

        if complexity != TEXTURED_COMPLEXITY {
            self.apply_cutout(false, false)?;
        }
        if announce {
            self.announce_recompile();
        }
        Ok(true)
    }

    fn apply_cutout(&mut self, cutout: bool, announce: bool) -> Result<bool> {
        if cutout == self.cutout {
            return Ok(false);
        }

        self.write_define(CUTOUT_MARKER, if cutout { '1' } else { '0' })?;
        self.cutout = cutout;

        if cutout {
            self.apply_complexity(TEXTURED_COMPLEXITY, false)?;
        }
        if announce {
            self.announce_recompile();
        }
        Ok(true)
    }

    fn write_define(&self, marker: &str, value: char) -> Result<()> {
        let contents = read_defines(&self.defines_path)?;
        let rewritten = rewrite_define(&contents, marker, value)?;
        fs::write(&self.defines_path, rewritten)?;
        info!(
            "Wrote to {}: #define {}{}",
            self.defines_path.display(),
            marker,
            value
        );
        Ok(())
    }

    fn announce_recompile(&self) {
        if self.recompile_shaders {
            info!(
                "Shaders requiring recompilation: {}",
                DEPENDENT_SHADERS.join(", ")
            );
        }
    }
}

fn read_defines(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::Shader(format!("Cannot read {}: {}", path.display(), e)))
}

/// Character immediately following the single occurrence of `marker`.
///
/// # Errors
///
/// Returns [`Error::Shader`] unless `marker` occurs exactly once and is
/// followed by at least one character.
pub fn define_value(contents: &str, marker: &str) -> Result<char> {
    let after = split_at_marker(contents, marker)?.1;
    after
        .chars()
        .next()
        .ok_or_else(|| Error::Shader(format!("Nothing follows {marker} in defines file")))
}

/// Replaces the character following the single occurrence of `marker`.
///
/// # Errors
///
/// Same conditions as [`define_value`].
pub fn rewrite_define(contents: &str, marker: &str, value: char) -> Result<String> {
    let (before, after) = split_at_marker(contents, marker)?;
    let mut rest = after.chars();
    if rest.next().is_none() {
        return Err(Error::Shader(format!(
            "Nothing follows {marker} in defines file"
        )));
    }
    Ok(format!("{before}{marker}{value}{}", rest.as_str()))
}

fn split_at_marker<'a>(contents: &'a str, marker: &str) -> Result<(&'a str, &'a str)> {
    let occurrences = contents.matches(marker).count();
    if occurrences != 1 {
        return Err(Error::Shader(format!(
            "Expected exactly one {marker} in defines file, found {occurrences}"
        )));
    }
    contents
        .split_once(marker)
        .ok_or_else(|| Error::Shader(format!("{marker} missing from defines file")))
}

fn parse_complexity(contents: &str) -> Result<u8> {
    let value = define_value(contents, COMPLEXITY_MARKER)?;
    value
        .to_digit(10)
        .and_then(|digit| u8::try_from(digit).ok())
        .filter(|&level| level <= MAX_COMPLEXITY)
        .ok_or_else(|| Error::Shader(format!("Invalid particle complexity '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINES: &str = "#define PARTICLE_COMPLEXITY_1\n#define PARTICLE_CUTOUT_MODE_0\n";

    fn defines_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "vbparts_{}_{}.defines",
            name,
            std::process::id()
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    fn load(name: &str) -> (ParticleSettings, PathBuf) {
        let path = defines_file(name, DEFINES);
        let settings = ParticleSettings::load(&RuntimeSettings::default(), &path).unwrap();
        (settings, path)
    }

    #[test]
    fn test_define_value() {
        assert_eq!(define_value(DEFINES, COMPLEXITY_MARKER).unwrap(), '1');
        assert_eq!(define_value(DEFINES, CUTOUT_MARKER).unwrap(), '0');
    }

    #[test]
    fn test_rewrite_define_replaces_one_char() {
        let rewritten = rewrite_define(DEFINES, COMPLEXITY_MARKER, '3').unwrap();
        assert_eq!(
            rewritten,
            "#define PARTICLE_COMPLEXITY_3\n#define PARTICLE_CUTOUT_MODE_0\n"
        );
    }

    #[test]
    fn test_marker_must_occur_once() {
        let doubled = format!("{DEFINES}{DEFINES}");
        assert!(matches!(
            define_value(&doubled, COMPLEXITY_MARKER),
            Err(Error::Shader(_))
        ));
        assert!(matches!(
            rewrite_define("nothing here", CUTOUT_MARKER, '1'),
            Err(Error::Shader(_))
        ));
        assert!(define_value("PARTICLE_COMPLEXITY_", COMPLEXITY_MARKER).is_err());
    }

    #[test]
    fn test_load_reads_defines() {
        let (settings, path) = load("load");
        assert_eq!(settings.complexity(), 1);
        assert!(!settings.cutout());
        assert_eq!(settings.count(), DEFAULT_PARTICLE_COUNT);
        assert_eq!(settings.mode(), GenerationMode::VertexExpansion);
        assert_eq!(settings.half_size, 0.03);
        assert_eq!(settings.density, 0.4);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_set_complexity_rewrites_file() {
        let (mut settings, path) = load("complexity");
        assert!(settings.set_complexity(3).unwrap());
        assert!(!settings.set_complexity(3).unwrap());
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("PARTICLE_COMPLEXITY_3"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_complexity_out_of_range() {
        let (mut settings, path) = load("range");
        assert!(matches!(settings.set_complexity(4), Err(Error::Config(_))));
        assert_eq!(settings.complexity(), 1);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_bundled_defines_file_loads_from_any_directory() {
        assert!(Path::new(DEFINES_FILE).is_absolute());
        let settings = ParticleSettings::load(&RuntimeSettings::default(), DEFINES_FILE).unwrap();
        assert!(settings.complexity() <= MAX_COMPLEXITY);
        assert_eq!(settings.defines_path(), Path::new(DEFINES_FILE));
    }

    #[test]
    fn test_failed_write_keeps_setting() {
        let (mut settings, path) = load("failed_write");
        fs::write(&path, "#define PARTICLE_CUTOUT_MODE_0\n").unwrap();

        assert!(matches!(settings.set_complexity(3), Err(Error::Shader(_))));
        assert_eq!(settings.complexity(), 1);
        assert!(settings.set_complexity(3).is_err());

        fs::write(&path, DEFINES).unwrap();
        assert!(settings.set_complexity(3).unwrap());
        assert_eq!(settings.complexity(), 3);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_cutout_forces_textured_complexity() {
        let (mut settings, path) = load("cutout");
        settings.set_complexity(0).unwrap();

        assert!(settings.set_cutout(true).unwrap());
        assert_eq!(settings.complexity(), TEXTURED_COMPLEXITY);
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("PARTICLE_COMPLEXITY_2"));
        assert!(contents.contains("PARTICLE_CUTOUT_MODE_1"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_leaving_textured_complexity_disables_cutout() {
        let (mut settings, path) = load("uncut");
        settings.set_cutout(true).unwrap();

        assert!(settings.set_complexity(1).unwrap());
        assert!(!settings.cutout());
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("PARTICLE_CUTOUT_MODE_0"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_disabling_cutout_keeps_complexity() {
        let (mut settings, path) = load("keep");
        settings.set_cutout(true).unwrap();
        assert!(settings.set_cutout(false).unwrap());
        assert_eq!(settings.complexity(), TEXTURED_COMPLEXITY);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_runtime_overrides() {
        let path = defines_file("overrides", DEFINES);
        let runtime = RuntimeSettings {
            particle_mode: ParticleModeArg::Compute,
            particle_count: 3,
            particle_complexity: Some(0),
            ..Default::default()
        };
        let settings = ParticleSettings::load(&runtime, &path).unwrap();
        assert_eq!(settings.mode(), GenerationMode::Compute);
        assert_eq!(settings.count(), MIN_PARTICLE_COUNT);
        assert_eq!(settings.complexity(), 0);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_count_and_mode_setters() {
        let (mut settings, path) = load("count");
        assert!(settings.set_count(u32::MAX));
        assert_eq!(settings.count(), MAX_PARTICLE_COUNT);
        assert!(!settings.set_count(MAX_PARTICLE_COUNT));
        assert!(settings.set_mode(GenerationMode::GeometryExpansion));
        assert!(!settings.set_mode(GenerationMode::GeometryExpansion));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_mode_order() {
        for (i, mode) in GenerationMode::ALL.iter().enumerate() {
            assert_eq!(*mode as usize, i);
            assert_eq!(GenerationMode::from_index(i), Some(*mode));
        }
        assert_eq!(GenerationMode::from_index(4), None);
    }
}
