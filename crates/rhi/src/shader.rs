//! Precompiled SPIR-V loading and shader module creation.
//!
//! # Overview
//!
//! Shaders are compiled offline. Each stage of shader `name` lives at
//! `<dir>/<name>_<suffix>.spv`, with suffix `v`, `f`, `g` or `c` for vertex,
//! fragment, geometry and compute. A missing file is an error; nothing is
//! compiled at runtime. Every module uses the entry point `main`.
//!
//! # Example
//!
//! ```no_run
//! # fn demo(device: std::sync::Arc<vbparts_rhi::device::Device>) -> vbparts_rhi::RhiResult<()> {
//! use std::path::Path;
//! use vbparts_rhi::shader::{Shader, ShaderStage};
//!
//! // Reads CompiledShaders/particles_fwd_f.spv
//! let fragment = Shader::load(device, Path::new("CompiledShaders"), "particles_fwd", ShaderStage::Fragment)?;
//! let _stage_info = fragment.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Default directory holding compiled shaders, relative to the working directory.
pub const COMPILED_SHADER_DIR: &str = "CompiledShaders";

const ENTRY_POINT: &std::ffi::CStr = c"main";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    Compute,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    /// File-name suffix of the compiled stage.
    pub fn suffix(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "v",
            ShaderStage::Fragment => "f",
            ShaderStage::Geometry => "g",
            ShaderStage::Compute => "c",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Compute => "compute",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Path of the compiled bytecode for `name` at `stage`.
pub fn compiled_shader_path(dir: &Path, name: &str, stage: ShaderStage) -> PathBuf {
    dir.join(format!("{name}_{}.spv", stage.suffix()))
}

/// Reads precompiled bytecode for `name` at `stage` from `dir`.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the file cannot be read.
pub fn read_compiled_shader(dir: &Path, name: &str, stage: ShaderStage) -> RhiResult<Vec<u8>> {
    let path = compiled_shader_path(dir, name, stage);
    debug!("Loading {} shader from {:?}", stage, path);
    std::fs::read(&path).map_err(|e| {
        RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
    })
}

/// SPIR-V bytes to little-endian code words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] for empty input or a length that is not
/// a multiple of four.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() || !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be non-empty and 4-byte aligned, got {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// A shader module for one stage. Only needed until the pipeline using it
/// has been created.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Loads `<dir>/<name>_<suffix>.spv`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] if the file is missing or malformed,
    /// or a Vulkan error if module creation fails.
    pub fn load(device: Arc<Device>, dir: &Path, name: &str, stage: ShaderStage) -> RhiResult<Self> {
        let bytes = read_compiled_shader(dir, name, stage)?;
        Self::from_spirv_bytes(device, &bytes, stage)
    }

    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] for malformed bytecode, or a Vulkan
    /// error if module creation fails.
    pub fn from_spirv_bytes(device: Arc<Device>, bytes: &[u8], stage: ShaderStage) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        debug!("Created {} shader module ({} bytes)", stage, bytes.len());

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiled_shader_path() {
        let dir = Path::new(COMPILED_SHADER_DIR);
        assert_eq!(
            compiled_shader_path(dir, "particles_fwd", ShaderStage::Fragment),
            dir.join("particles_fwd_f.spv")
        );
        assert_eq!(
            compiled_shader_path(dir, "quadexpand", ShaderStage::Geometry),
            dir.join("quadexpand_g.spv")
        );
        assert_eq!(
            compiled_shader_path(dir, "particles", ShaderStage::Compute),
            dir.join("particles_c.spv")
        );
    }

    #[test]
    fn test_missing_shader_is_error() {
        let dir = std::env::temp_dir().join("vbparts-no-such-shader-dir");
        assert!(matches!(
            read_compiled_shader(&dir, "missing", ShaderStage::Vertex),
            Err(RhiError::ShaderError(_))
        ));
    }

    #[test]
    fn test_read_compiled_shader() {
        let dir = std::env::temp_dir().join(format!("vbparts-shader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("probe_v.spv"), [0x03, 0x02, 0x23, 0x07]).unwrap();

        let bytes = read_compiled_shader(&dir, "probe", ShaderStage::Vertex).unwrap();
        assert_eq!(spirv_words(&bytes).unwrap(), vec![0x0723_0203]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_spirv_words_rejects_misaligned() {
        assert!(spirv_words(&[1, 2, 3]).is_err());
        assert!(spirv_words(&[]).is_err());
    }

    #[test]
    fn test_stage_flags() {
        assert_eq!(
            ShaderStage::Geometry.to_vk_stage(),
            vk::ShaderStageFlags::GEOMETRY
        );
        assert_eq!(ShaderStage::Compute.to_string(), "compute");
    }
}
