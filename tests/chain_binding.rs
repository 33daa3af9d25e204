mod support;

use slang_shader_chain::shader::{
    CompileError, FrameTexture, LookupTexture, PassSource, ShaderChain, SlangStage,
    collect_parameters,
};
use support::{Call, MockGl, LinkedProgram, Recorded, direct, packed, pass_source, read_f32};

fn first_pass_program() -> LinkedProgram {
    LinkedProgram {
        uniforms: vec![
            packed("UBO_block_0Vertex.MVP", 0, 0),
            direct("_push_constant_binding_fs.SourceSize", 1),
            direct("_push_constant_binding_fs.STRENGTH", 2),
            direct("Source", 3),
            direct("_push_constant_binding_fs.Unknown", 9),
        ],
        block_size: 64,
    }
}

fn second_pass_program() -> LinkedProgram {
    LinkedProgram {
        uniforms: vec![
            packed("UBO_block_0Vertex.MVP", 0, 0),
            packed("UBO_block_1Fragment.MVP", 1, 0),
            direct("Source", 3),
            direct("OriginalHistory2", 4),
            direct("PassFeedback1", 5),
            direct("Blit", 6),
            direct("NoiseSize", 7),
        ],
        block_size: 64,
    }
}

fn sources() -> Vec<PassSource> {
    vec![pass_source(None), pass_source(Some("Second"))]
}

fn build(gl: &MockGl) -> ShaderChain<MockGl> {
    let sources = sources();
    let parameters = collect_parameters(&sources);
    let luts = vec![LookupTexture {
        id: "Noise".to_string(),
        texture: gl.host_texture(),
        width: 64,
        height: 32,
    }];
    ShaderChain::build(gl, &sources, luts, parameters).unwrap()
}

#[test]
fn build_introspects_every_pass() {
    let gl = MockGl::new(vec![first_pass_program(), second_pass_program()]);
    let chain = build(&gl);

    let passes = chain.passes();
    assert_eq!(passes.len(), 3);
    assert!(passes[0].program.is_none());
    assert_eq!(passes[1].alias.as_deref(), Some("Blit"));
    assert_eq!(passes[2].alias.as_deref(), Some("Second"));
    assert_eq!(passes[1].attributes.position, "_p2vs_location0");
    assert_eq!(passes[1].attributes.tex_coord, "_p2vs_location1");

    // Unknown names are dropped.
    assert_eq!(passes[1].uniforms.len(), 4);
    assert_eq!(passes[2].uniforms.len(), 7);

    let block = passes[1].uniform_block.as_ref().unwrap();
    assert_eq!(block.data.len(), 64);
    assert_eq!(block.block_indices, vec![0]);
    let block = passes[2].uniform_block.as_ref().unwrap();
    assert_eq!(block.block_indices, vec![0, 1]);

    assert_eq!(chain.max_prev_frame(), 2);
    assert!(chain.using_feedback());
    assert!(passes[2].uses_feedback);
    let feedback = passes[2].feedback.unwrap();
    assert_ne!(feedback.current, feedback.previous);
    assert!(passes[1].feedback.is_none());
    assert_eq!(chain.feedback_target(2), Some(feedback.current));
    assert_eq!(chain.feedback_target(1), None);
    assert_eq!(gl.live_textures(), 2);

    assert_eq!(chain.parameters().len(), 1);
    assert_eq!(chain.parameters()[0].id, "STRENGTH");
    assert!(gl.shader_sources().iter().all(|s| s.starts_with("#version 330")));
}

#[test]
fn first_pass_binds_original_and_uploads_whole_block() {
    let gl = MockGl::new(vec![first_pass_program(), second_pass_program()]);
    let mut chain = build(&gl);
    let original = gl.host_texture();
    chain.set_original(original, 256, 224);
    gl.clear_calls();

    chain.set_shader_vars(&gl, 1, false);

    let program = chain.passes()[1].program.unwrap();
    let buffer = chain.passes()[1].uniform_block.as_ref().unwrap().buffer;
    let calls = gl.calls();
    let Call::Upload { data, .. } = &calls[7] else {
        panic!("expected upload, got {:?}", calls[7]);
    };
    assert_eq!(read_f32(data, 0), 2.0);
    assert_eq!(read_f32(data, 48), -1.0);
    assert_eq!(read_f32(data, 60), 1.0);

    assert_eq!(
        calls,
        vec![
            Call::VertexData(128),
            Call::EnableAttrib { index: 0, components: 4, offset: 0 },
            Call::EnableAttrib { index: 1, components: 2, offset: 64 },
            Call::SetUniform {
                location: 1,
                value: Recorded::Vec4([256.0, 224.0, 1.0 / 256.0, 1.0 / 224.0]),
            },
            Call::SetUniform { location: 2, value: Recorded::Float(0.5) },
            Call::BindTexture { unit: 0, texture: Some(original) },
            Call::SetUniform { location: 3, value: Recorded::Int(0) },
            Call::Upload { buffer, data: data.clone(), binding: 0 },
            Call::BlockBinding { program, block: 0, binding: 0 },
        ]
    );
}

#[test]
fn second_pass_samples_earlier_outputs_history_and_feedback() {
    let gl = MockGl::new(vec![first_pass_program(), second_pass_program()]);
    let mut chain = build(&gl);
    let original = gl.host_texture();
    let first_out = gl.host_texture();
    let history = gl.host_texture();
    chain.set_original(original, 256, 224);
    assert!(chain.set_pass_output(1, first_out, 512, 448));
    assert!(!chain.set_pass_output(3, first_out, 1, 1));
    // Only one previous frame is available; depth 2 binds nothing.
    chain.set_previous_frames(vec![FrameTexture::new(history, 256, 224)]);
    gl.clear_calls();

    chain.set_shader_vars(&gl, 2, true);

    let feedback = chain.passes()[2].feedback.map(|f| f.previous);
    let program = chain.passes()[2].program.unwrap();
    let calls = gl.calls();
    assert!(calls.contains(&Call::EnableAttrib { index: 1, components: 2, offset: 96 }));

    let textures: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            Call::BindTexture { unit, texture } => Some((*unit, *texture)),
            _ => None,
        })
        .collect();
    assert_eq!(
        textures,
        vec![(0, Some(first_out)), (1, None), (2, feedback), (3, Some(first_out))]
    );
    assert!(calls.contains(&Call::SetUniform {
        location: 7,
        value: Recorded::Vec4([64.0, 32.0, 1.0 / 64.0, 1.0 / 32.0]),
    }));
    assert!(calls.contains(&Call::BlockBinding { program, block: 0, binding: 0 }));
    assert!(calls.contains(&Call::BlockBinding { program, block: 1, binding: 0 }));
}

#[test]
fn values_are_refreshed_every_frame() {
    let gl = MockGl::new(vec![first_pass_program(), second_pass_program()]);
    let mut chain = build(&gl);
    chain.set_original(gl.host_texture(), 256, 224);

    chain.set_shader_vars(&gl, 1, false);
    chain.end_frame();
    assert!(chain.set_parameter("STRENGTH", 0.9));
    assert!(!chain.set_parameter("MISSING", 1.0));
    chain.set_shader_vars(&gl, 1, false);

    let calls = gl.calls();
    let uploads = calls
        .iter()
        .filter(|c| matches!(c, Call::Upload { data, .. } if data.len() == 64))
        .count();
    assert_eq!(uploads, 2);
    assert!(calls.contains(&Call::SetUniform { location: 2, value: Recorded::Float(0.9) }));
    assert_eq!(chain.frame_count(), 1);
}

#[test]
fn binding_missing_passes_is_a_no_op() {
    let gl = MockGl::new(vec![first_pass_program(), second_pass_program()]);
    let mut chain = build(&gl);
    gl.clear_calls();
    chain.set_shader_vars(&gl, 0, false);
    chain.set_shader_vars(&gl, 7, false);
    assert!(gl.calls().is_empty());
}

#[test]
fn clearing_leaves_no_state_behind() {
    let gl = MockGl::new(vec![first_pass_program(), second_pass_program()]);
    let chain = build(&gl);
    gl.clear_calls();
    chain.clear_shader_vars(&gl);
    assert_eq!(
        gl.calls(),
        vec![
            Call::DisableAttrib(0),
            Call::DisableAttrib(1),
            Call::UnbindUniformBuffer(0),
        ]
    );
}

fn bound_at(calls: &[Call], wanted: u32) -> Option<u32> {
    calls.iter().find_map(|c| match c {
        Call::BindTexture { unit, texture } if *unit == wanted => Some(*texture),
        _ => None,
    })?
}

#[test]
fn feedback_samples_the_previous_frames_target() {
    let gl = MockGl::new(vec![first_pass_program(), second_pass_program()]);
    let mut chain = build(&gl);
    let first_out = gl.host_texture();
    chain.set_original(gl.host_texture(), 256, 224);
    chain.set_pass_output(1, first_out, 512, 448);

    let mut targets = Vec::new();
    for frame in 0..4 {
        let target = chain.feedback_target(2).unwrap();
        assert!(chain.set_pass_output(2, target, 320, 240));
        gl.clear_calls();
        chain.set_shader_vars(&gl, 2, false);

        // Unit 2 holds PassFeedback1; the pass never samples its own target.
        let sampled = bound_at(&gl.calls(), 2).unwrap();
        assert_ne!(sampled, target);
        if frame > 0 {
            assert_eq!(sampled, targets[frame - 1]);
        }
        targets.push(target);

        chain.swap_feedback();
        chain.end_frame();
        // Swapping leaves the host's record of the output alone.
        assert_eq!(chain.passes()[2].output.texture, Some(target));
        assert_eq!(chain.passes()[1].output.texture, Some(first_out));
    }
    assert_ne!(targets[0], targets[1]);
    assert_eq!(targets[0], targets[2]);
    assert_eq!(targets[1], targets[3]);

    chain.destroy(&gl);
    assert_eq!(gl.live_textures(), 0);
    let mut deleted = gl.deleted_textures();
    deleted.sort_unstable();
    let mut owned = vec![targets[0], targets[1]];
    owned.sort_unstable();
    assert_eq!(deleted, owned);
}

#[test]
fn frame_count_advances_per_frame() {
    let gl = MockGl::new(vec![first_pass_program(), second_pass_program()]);
    let mut chain = build(&gl);
    for _ in 0..3 {
        chain.end_frame();
    }
    assert_eq!(chain.frame_count(), 3);
}

#[test]
fn destroy_releases_every_object() {
    let gl = MockGl::new(vec![first_pass_program(), second_pass_program()]);
    let chain = build(&gl);
    assert!(gl.live_objects() > 0);
    chain.destroy(&gl);
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn driver_compile_failure_releases_everything() {
    let mut gl = MockGl::new(vec![first_pass_program()]);
    gl.fail_compile = Some(SlangStage::Fragment);
    let err = ShaderChain::build(&gl, &sources(), Vec::new(), Vec::new())
        .err()
        .unwrap();
    assert!(matches!(err, CompileError::Driver { stage: "fragment", .. }));
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn link_failure_releases_everything() {
    let mut gl = MockGl::new(vec![first_pass_program()]);
    gl.fail_link = true;
    let err = ShaderChain::build(&gl, &sources(), Vec::new(), Vec::new())
        .err()
        .unwrap();
    assert_eq!(err, CompileError::ProgramLink("mock link failure".to_string()));
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn later_pass_failure_releases_earlier_programs() {
    let gl = MockGl::new(vec![first_pass_program()]);
    let broken = PassSource::new("#version 450\n#include \"missing.inc\"\n", None);
    let err = ShaderChain::build(&gl, &[pass_source(None), broken], Vec::new(), Vec::new())
        .err()
        .unwrap();
    assert!(matches!(err, CompileError::Preprocess(_)));
    assert_eq!(gl.live_objects(), 0);
}
