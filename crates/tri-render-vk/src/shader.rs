// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use ash::util::read_spv;
use tracing::{debug, warn};
use tri_core::{RenderError, RenderResult, Stage};

/// Entry point of both shader stages.
pub const SHADER_ENTRY: &CStr = c"main";

#[cfg(feature = "embed-shaders")]
const EMBEDDED_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.vert.spv"));
#[cfg(feature = "embed-shaders")]
const EMBEDDED_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.frag.spv"));

/// SPIR-V words for the two stages of the triangle pipeline.
#[derive(Clone, Debug)]
pub struct ShaderCode {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderCode {
    pub fn load(vertex: &Path, fragment: &Path) -> RenderResult<Self> {
        #[cfg(feature = "embed-shaders")]
        if !vertex.exists() && !fragment.exists() {
            warn!(
                "{} / {} not found, using embedded shaders",
                vertex.display(),
                fragment.display()
            );
            return Ok(ShaderCode {
                vertex: words_from_bytes(EMBEDDED_VERT, Path::new("triangle.vert.spv"))?,
                fragment: words_from_bytes(EMBEDDED_FRAG, Path::new("triangle.frag.spv"))?,
            });
        }

        Ok(ShaderCode {
            vertex: load_spirv(vertex)?,
            fragment: load_spirv(fragment)?,
        })
    }
}

/// Reads a compiled SPIR-V module into 32-bit words.
pub fn load_spirv(path: &Path) -> RenderResult<Vec<u32>> {
    let mut file = File::open(path)
        .map_err(|e| RenderError::new(Stage::ShaderLoad, format!("{}: {e}", path.display())))?;
    let words = read_spv(&mut file)
        .map_err(|e| RenderError::new(Stage::ShaderLoad, format!("{}: {e}", path.display())))?;
    debug!("loaded {} ({} words)", path.display(), words.len());
    if words.is_empty() {
        warn!("{} is empty", path.display());
    }
    Ok(words)
}

#[cfg_attr(not(feature = "embed-shaders"), allow(dead_code))]
fn words_from_bytes(bytes: &[u8], name: &Path) -> RenderResult<Vec<u32>> {
    read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RenderError::new(Stage::ShaderLoad, format!("{}: {e}", name.display())))
}
