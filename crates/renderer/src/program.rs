//! Shader sources and the CPU-side compile/link step.
//!
//! Both stages are parsed and validated with naga before the GPU sees them,
//! so a broken shader is reported with its diagnostic text before any buffer
//! or texture exists. The uniform block is reflected from the parsed modules
//! into a [`UniformLayout`], which is what uniform binders resolve against.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;
use wgpu::naga;
use wgpu::naga::front::glsl::{Frontend, Options};
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::naga::{AddressSpace, Binding, ScalarKind, ShaderStage, TypeInner, VectorSize};

/// Name of the vertex attribute fed by the quad geometry.
pub const POSITION_ATTRIBUTE: &str = "a_position";

/// Passes quad corners straight through to clip space.
pub const VERTEX_SHADER: &str = r#"#version 450

layout(location = 0) in vec2 a_position;

void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
}
"#;

/// Offsets colour lookups by the depth map scaled by the smoothed pointer.
///
/// `gl_FragCoord` has a top-left origin under wgpu, matching the row order of
/// the uploaded images, so no vertical flip is applied.
pub const FRAGMENT_SHADER: &str = r#"#version 450

layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform ParallaxParams {
    vec4 resolution;
    vec2 mouse;
    float time;
    float pixelRatio;
    vec2 threshold;
} params;

layout(set = 1, binding = 0) uniform texture2D image0;
layout(set = 1, binding = 1) uniform sampler image0Sampler;
layout(set = 1, binding = 2) uniform texture2D image1;
layout(set = 1, binding = 3) uniform sampler image1Sampler;

vec2 mirrored(vec2 v) {
    vec2 m = mod(v, vec2(2.0));
    return mix(m, vec2(2.0) - m, step(vec2(1.0), m));
}

void main() {
    vec2 uv = params.pixelRatio * gl_FragCoord.xy / params.resolution.xy;
    vec2 vUv = (uv - vec2(0.5)) * params.resolution.zw + vec2(0.5);

    float depth = texture(sampler2D(image1, image1Sampler), mirrored(vUv)).r;
    vec2 fake3d = vec2(
        vUv.x + (depth - 0.5) * params.mouse.x / params.threshold.x,
        vUv.y + (depth - 0.5) * params.mouse.y / params.threshold.y
    );

    outColor = texture(sampler2D(image0, image0Sampler), mirrored(fake3d));
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    pub(crate) fn naga(self) -> ShaderStage {
        match self {
            Stage::Vertex => ShaderStage::Vertex,
            Stage::Fragment => ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Vertex => f.write_str("vertex"),
            Stage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: Stage, log: String },
    #[error("shader program failed to link: {0}")]
    Link(String),
}

/// Placement of one member inside the uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: u64,
    pub components: usize,
}

/// Float members of the program's uniform block, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformLayout {
    members: BTreeMap<String, UniformSlot>,
    size: u64,
}

impl UniformLayout {
    pub fn member(&self, name: &str) -> Option<UniformSlot> {
        self.members.get(name).copied()
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, UniformSlot)> {
        self.members
            .iter()
            .map(|(name, slot)| (name.as_str(), *slot))
    }

    /// Block size in bytes, rounded up to 16 for buffer allocation.
    pub fn size(&self) -> u64 {
        self.size.max(16).next_multiple_of(16)
    }
}

/// A vertex/fragment pair that parsed, validated and linked.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    vertex_source: String,
    fragment_source: String,
    layout: UniformLayout,
}

impl ShaderProgram {
    /// Compiles the shaders shipped with the crate.
    pub fn builtin() -> Result<Self, ProgramError> {
        Self::compile(VERTEX_SHADER, FRAGMENT_SHADER)
    }

    /// Compiles the built-in vertex stage with a caller-supplied fragment stage.
    pub fn with_fragment(fragment_source: &str) -> Result<Self, ProgramError> {
        Self::compile(VERTEX_SHADER, fragment_source)
    }

    pub fn compile(vertex_source: &str, fragment_source: &str) -> Result<Self, ProgramError> {
        let vertex = compile_stage(Stage::Vertex, vertex_source)?;
        let fragment = compile_stage(Stage::Fragment, fragment_source)?;

        if !declares_position(&vertex) {
            return Err(ProgramError::Link(format!(
                "vertex stage does not declare the '{POSITION_ATTRIBUTE}' input"
            )));
        }

        let mut layout = UniformLayout::default();
        reflect_uniforms(&vertex, &mut layout)?;
        reflect_uniforms(&fragment, &mut layout)?;
        debug!(
            members = ?layout.members.keys().collect::<Vec<_>>(),
            size = layout.size,
            "linked shader program"
        );

        Ok(Self {
            vertex_source: vertex_source.to_string(),
            fragment_source: fragment_source.to_string(),
            layout,
        })
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    pub(crate) fn source(&self, stage: Stage) -> &str {
        match stage {
            Stage::Vertex => &self.vertex_source,
            Stage::Fragment => &self.fragment_source,
        }
    }
}

fn compile_stage(stage: Stage, source: &str) -> Result<naga::Module, ProgramError> {
    let module = Frontend::default()
        .parse(&Options::from(stage.naga()), source)
        .map_err(|errors| ProgramError::Compile {
            stage,
            log: errors.to_string(),
        })?;

    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|error| ProgramError::Compile {
            stage,
            log: error.to_string(),
        })?;

    Ok(module)
}

fn declares_position(module: &naga::Module) -> bool {
    let as_global = module
        .global_variables
        .iter()
        .any(|(_, var)| var.name.as_deref() == Some(POSITION_ATTRIBUTE));
    let as_argument = module.entry_points.iter().any(|entry| {
        entry.function.arguments.iter().any(|argument| {
            matches!(argument.binding, Some(Binding::Location { location: 0, .. }))
                && argument.name.as_deref() == Some(POSITION_ATTRIBUTE)
        })
    });
    as_global || as_argument
}

fn reflect_uniforms(module: &naga::Module, layout: &mut UniformLayout) -> Result<(), ProgramError> {
    for (_, var) in module.global_variables.iter() {
        if var.space != AddressSpace::Uniform {
            continue;
        }
        if let Some(binding) = &var.binding {
            if binding.group != 0 || binding.binding != 0 {
                return Err(ProgramError::Link(format!(
                    "uniform block must live at set 0 binding 0, found set {} binding {}",
                    binding.group, binding.binding
                )));
            }
        }

        let TypeInner::Struct { members, span } = &module.types[var.ty].inner else {
            continue;
        };
        layout.size = layout.size.max(u64::from(*span));

        for member in members {
            let Some(name) = member.name.as_ref() else {
                continue;
            };
            let Some(components) = float_components(&module.types[member.ty].inner) else {
                continue;
            };
            let slot = UniformSlot {
                offset: u64::from(member.offset),
                components,
            };
            match layout.members.get(name) {
                Some(existing) if *existing != slot => {
                    return Err(ProgramError::Link(format!(
                        "uniform '{name}' is declared differently across stages"
                    )));
                }
                _ => {
                    layout.members.insert(name.clone(), slot);
                }
            }
        }
    }
    Ok(())
}

fn float_components(inner: &TypeInner) -> Option<usize> {
    match inner {
        TypeInner::Scalar(scalar) if scalar.kind == ScalarKind::Float => Some(1),
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => Some(match size {
            VectorSize::Bi => 2,
            VectorSize::Tri => 3,
            VectorSize::Quad => 4,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_program_exposes_std140_layout() {
        let program = ShaderProgram::builtin().unwrap();
        let layout = program.layout();

        let expect = [
            ("resolution", 0, 4),
            ("mouse", 16, 2),
            ("time", 24, 1),
            ("pixelRatio", 28, 1),
            ("threshold", 32, 2),
        ];
        for (name, offset, components) in expect {
            assert_eq!(
                layout.member(name),
                Some(UniformSlot { offset, components }),
                "{name}"
            );
        }
        assert!(layout.size() >= 48);
        assert_eq!(layout.size() % 16, 0);
    }

    #[test]
    fn invalid_fragment_reports_compile_log() {
        let err = ShaderProgram::with_fragment("#version 450\nvoid main() { this is not glsl }")
            .unwrap_err();
        match err {
            ProgramError::Compile { stage, log } => {
                assert_eq!(stage, Stage::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_vertex_is_reported_before_fragment() {
        let err = ShaderProgram::compile("#version 450\nvoid main() {", FRAGMENT_SHADER).unwrap_err();
        assert!(matches!(
            err,
            ProgramError::Compile {
                stage: Stage::Vertex,
                ..
            }
        ));
    }

    #[test]
    fn vertex_stage_must_declare_position() {
        let vertex = "#version 450\nvoid main() { gl_Position = vec4(0.0); }\n";
        let err = ShaderProgram::compile(vertex, FRAGMENT_SHADER).unwrap_err();
        assert!(matches!(err, ProgramError::Link(_)));
    }

    #[test]
    fn custom_fragment_without_uniforms_links() {
        let fragment = "#version 450\nlayout(location = 0) out vec4 outColor;\nvoid main() { outColor = vec4(1.0); }\n";
        let program = ShaderProgram::with_fragment(fragment).unwrap();
        assert_eq!(program.layout().member("mouse"), None);
        assert_eq!(program.layout().size(), 16);
    }
}
