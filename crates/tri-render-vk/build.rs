// SPDX-License-Identifier: CEPL-1.0
fn main() {
    println!("cargo:rerun-if-changed=shaders/triangle.vert");
    println!("cargo:rerun-if-changed=shaders/triangle.frag");

    #[cfg(feature = "embed-shaders")]
    embed::compile();
}

#[cfg(feature = "embed-shaders")]
mod embed {
    use std::{env, fs, path::PathBuf};

    pub fn compile() {
        let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

        let comp = shaderc::Compiler::new().expect("shaderc compiler");
        let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
        opts.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_0 as u32,
        );
        opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

        for (file, kind) in [
            ("triangle.vert", shaderc::ShaderKind::Vertex),
            ("triangle.frag", shaderc::ShaderKind::Fragment),
        ] {
            let src = fs::read_to_string(format!("shaders/{file}"))
                .unwrap_or_else(|e| panic!("read shaders/{file}: {e}"));
            let spv = comp
                .compile_into_spirv(&src, kind, file, "main", Some(&opts))
                .unwrap_or_else(|e| panic!("compile {file}: {e}"));
            fs::write(out.join(format!("{file}.spv")), spv.as_binary_u8())
                .unwrap_or_else(|e| panic!("write {file}.spv: {e}"));
        }
    }
}
