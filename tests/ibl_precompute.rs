//! Sky precompute passes and reflection probe capture on the recording backend.

mod common;

use common::{init_logging, Harness};
use glam::Vec3;
use ibl_renderer::backend::{DummyBackend, RecordedCommand, SamplerDescriptor, TextureFormat, Viewport};
use ibl_renderer::ibl::{prefilter_cubemap, CubeFace, CubeTarget};
use ibl_renderer::resources::{gradient_sky_faces, GpuTexture};
use ibl_renderer::shader::library::ShaderLibrary;
use ibl_renderer::{BrdfLut, IblConfig, ProbeConfig, ReflectionProbe, RenderContext, RendererError, Sky};

fn read_f32(bytes: &[u8], offset: u32) -> f32 {
    let offset = offset as usize;
    f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn read_i32(bytes: &[u8], offset: u32) -> i32 {
    let offset = offset as usize;
    i32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

#[test]
fn test_specular_roughness_rises_with_mip() {
    init_logging();
    let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
    let library = ShaderLibrary::load().unwrap();
    let cube = GpuTexture::create_cube(&mut ctx, "Sky", &gradient_sky_faces(256, Vec3::Y)).unwrap();
    let mut sky = Sky::new(&mut ctx, cube, library.sky_vs.clone(), library.sky_ps.clone()).unwrap();
    ctx.backend_mut().clear_commands();

    sky.create_specular_reflectance_map(&mut ctx, &library.fullscreen_vs, &library.prefilter_ps, &IblConfig::default())
        .unwrap();

    // 256 / 8 = 32 per face, log2(32) - 2 = 3 mips
    assert_eq!(sky.reflectance_mip_levels(), 3);
    let variables = &library.prefilter_ps.reflection().variables;
    let (face_offset, roughness_offset) = (variables["c_face"].offset, variables["c_roughness"].offset);
    let uploads: Vec<(i32, f32)> = ctx
        .backend()
        .commands()
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::WriteBuffer { data, .. } => {
                Some((read_i32(data, face_offset), read_f32(data, roughness_offset)))
            }
            _ => None,
        })
        .collect();

    assert_eq!(uploads.len(), 6 * 3);
    for (i, (face, roughness)) in uploads.iter().enumerate() {
        assert_eq!(*face, (i % 6) as i32);
        assert_eq!(*roughness, (i / 6) as f32 / 2.0);
    }
    assert!(uploads[..6].iter().all(|(_, roughness)| *roughness == 0.0));
}

#[test]
fn test_specular_viewports_halve_per_mip() {
    let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
    let library = ShaderLibrary::load().unwrap();
    let cube = GpuTexture::create_cube(&mut ctx, "Sky", &gradient_sky_faces(256, Vec3::Y)).unwrap();
    let mut sky = Sky::new(&mut ctx, cube, library.sky_vs.clone(), library.sky_ps.clone()).unwrap();
    ctx.backend_mut().clear_commands();
    sky.create_specular_reflectance_map(&mut ctx, &library.fullscreen_vs, &library.prefilter_ps, &IblConfig::default())
        .unwrap();

    let sizes: Vec<u32> = ctx
        .backend()
        .passes()
        .iter()
        .filter(|pass| pass.draws > 0)
        .map(|pass| pass.viewports.last().unwrap().width as u32)
        .collect();
    let expected: Vec<u32> = [32, 16, 8].iter().flat_map(|size| [*size; 6]).collect();
    assert_eq!(sizes, expected);
}

#[test]
fn test_guard_restores_state_on_failed_bake() {
    let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
    let library = ShaderLibrary::load().unwrap();
    let target = CubeTarget::new(&mut ctx, "Target", 16, 2, TextureFormat::Rgba16Float).unwrap();
    let sampler = ctx.create_sampler(&SamplerDescriptor::default()).unwrap();

    let back_buffer = ctx.swapchain_view();
    ctx.set_render_targets(&[back_buffer], None).unwrap();
    ctx.set_viewport(Viewport::new(8, 8));

    // Reading the cube being written is a hazard on the first draw
    let err = prefilter_cubemap(
        &mut ctx,
        &target,
        &library.fullscreen_vs,
        &library.prefilter_ps,
        target.view(),
        sampler,
    )
    .unwrap_err();

    assert!(matches!(err, RendererError::TargetHazard { .. }));
    assert_eq!(ctx.state().color_targets, vec![back_buffer]);
    assert_eq!(ctx.state().depth_target, None);
    assert_eq!(ctx.viewport(), Viewport::new(8, 8));
}

#[test]
fn test_brdf_lut_is_two_channel_float() {
    let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
    let library = ShaderLibrary::load().unwrap();
    let lut = BrdfLut::generate(&mut ctx, &library.fullscreen_vs, &library.brdf_lut_ps, 32).unwrap();

    let info = ctx.view_info(lut.view()).unwrap();
    assert_eq!((info.width, info.height, info.format), (32, 32, TextureFormat::Rg16Float));
}

#[test]
fn test_probe_captures_six_axis_aligned_faces() {
    init_logging();
    let mut ctx = RenderContext::new(DummyBackend::new(8, 8));
    let library = ShaderLibrary::load().unwrap();
    let cube = GpuTexture::create_cube(&mut ctx, "Sky", &gradient_sky_faces(16, Vec3::Y)).unwrap();
    let sky = Sky::new(&mut ctx, cube, library.sky_vs.clone(), library.sky_ps.clone()).unwrap();
    let lut = BrdfLut::generate(&mut ctx, &library.fullscreen_vs, &library.brdf_lut_ps, 8).unwrap();
    let config = ProbeConfig {
        reflection_size: 16,
        capture_size: 32,
        ignored_small_mips: 2,
    };
    let probe = ReflectionProbe::new(
        &mut ctx,
        Vec3::new(0.0, 1.0, 0.0),
        4.0,
        &config,
        library.fullscreen_vs.clone(),
        library.prefilter_ps.clone(),
    )
    .unwrap();

    let mut forwards = Vec::new();
    for face in CubeFace::ALL {
        let camera = probe.face_camera(face).unwrap();
        assert_eq!(camera.forward(), face.forward());
        forwards.push(camera.forward());
    }
    for axis in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
        assert_eq!(forwards.iter().filter(|f| **f == axis).count(), 1);
    }

    ctx.backend_mut().clear_commands();
    probe.draw(&mut ctx, &[], &[], &sky, &lut).unwrap();
    let capture_passes: Vec<_> = ctx
        .backend()
        .passes()
        .into_iter()
        .filter(|pass| pass.draws > 0 && pass.descriptor.depth_stencil_attachment.is_some())
        .collect();
    assert_eq!(capture_passes.len(), 6);
    assert!(capture_passes
        .iter()
        .all(|pass| pass.viewports.last() == Some(&Viewport::new(32, 32))));
}

/// `c_foldAmbient` of every PBR pixel constant upload in the command log
fn fold_ambient_uploads(h: &Harness) -> Vec<i32> {
    let offset = h.library.pbr_ps.reflection().variables["c_foldAmbient"].offset;
    h.commands()
        .iter()
        .filter_map(|c| match c {
            RecordedCommand::WriteBuffer { data, .. } if data.len() >= offset as usize + 4 => {
                Some(read_i32(data, offset))
            }
            _ => None,
        })
        .collect()
}

#[test]
fn test_probe_capture_keeps_diffuse_ambient() {
    let mut h = Harness::new();
    let entities = vec![h.sphere()];
    let config = ProbeConfig {
        reflection_size: 16,
        capture_size: 32,
        ignored_small_mips: 2,
    };
    let probe = ReflectionProbe::new(
        &mut h.ctx,
        Vec3::new(0.0, 1.0, 0.0),
        4.0,
        &config,
        h.library.fullscreen_vs.clone(),
        h.library.prefilter_ps.clone(),
    )
    .unwrap();

    h.ctx.backend_mut().clear_commands();
    probe.draw(&mut h.ctx, &entities, &[], &h.sky, &h.brdf_lut).unwrap();

    // One color target per face, so ambient has to land in the color output
    let capture_passes: Vec<_> = h
        .drawing_passes()
        .into_iter()
        .filter(|pass| pass.descriptor.depth_stencil_attachment.is_some())
        .collect();
    assert_eq!(capture_passes.len(), 6);
    assert!(capture_passes.iter().all(|pass| pass.color_views().len() == 1));
    assert_eq!(fold_ambient_uploads(&h), vec![1; 6]);

    // The scene pass writes ambient to its own target for the combine
    h.ctx.backend_mut().clear_commands();
    h.run_frame(&entities, &[]).unwrap();
    assert_eq!(fold_ambient_uploads(&h), vec![0]);
}
