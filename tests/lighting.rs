//! Light and image-based lighting inputs staged on the scene shader.

mod common;

use bytemuck::pod_read_unaligned;
use common::{int_bytes, Harness};
use glam::Vec3;
use ibl_renderer::scene::{GpuLight, Light};
use ibl_renderer::shader::ShaderParameters;

fn mixed_lights() -> Vec<Light> {
    vec![
        Light::directional(Vec3::new(0.0, -1.0, 1.0), Vec3::ONE, 1.0),
        Light::point(Vec3::new(1.0, 2.0, 3.0), 5.0, Vec3::X, 2.0),
        Light::spot(Vec3::ZERO, Vec3::NEG_Y, 4.0, Vec3::Y, 1.0, 8.0),
        Light::point(Vec3::new(-1.0, 0.0, 0.0), 3.0, Vec3::Z, 1.0),
    ]
}

#[test]
fn test_point_light_count_excludes_other_kinds() {
    let mut h = Harness::new();
    let entities = vec![h.sphere()];
    let lights = mixed_lights();
    h.run_frame(&entities, &lights).unwrap();

    let ps = entities[0].material().pixel_shader();
    assert_eq!(ps.staged_data("c_pointLightCount").unwrap(), int_bytes(2));
    assert_eq!(ps.staged_data("c_directionalLightCount").unwrap(), int_bytes(1));

    let staged = ps.staged_data("c_pointLights").unwrap();
    let stride = std::mem::size_of::<GpuLight>();
    let first: GpuLight = pod_read_unaligned(&staged[..stride]);
    let second: GpuLight = pod_read_unaligned(&staged[stride..2 * stride]);
    assert_eq!(first, lights[1].to_gpu());
    assert_eq!(second, lights[3].to_gpu());
}

#[test]
fn test_counts_written_without_lights() {
    let mut h = Harness::new();
    let entities = vec![h.sphere()];
    let ps = entities[0].material().pixel_shader().clone();
    ps.set_int("c_pointLightCount", 7);

    h.run_frame(&entities, &[]).unwrap();

    assert_eq!(ps.staged_data("c_pointLightCount").unwrap(), int_bytes(0));
    assert_eq!(ps.staged_data("c_directionalLightCount").unwrap(), int_bytes(0));
    // The arrays are left untouched
    assert!(ps.staged_data("c_pointLights").unwrap().iter().all(|b| *b == 0));
}

#[test]
fn test_ibl_maps_bound_for_scene_pass() {
    let mut h = Harness::new();
    let entities = vec![h.sphere()];
    h.renderer.frame_start(&mut h.ctx).unwrap();
    h.renderer
        .render(&mut h.ctx, &entities, &[], &h.camera, &h.sky)
        .unwrap();

    let ps = entities[0].material().pixel_shader();
    assert_eq!(ps.bound_texture("IrradianceMap"), h.sky.environment_map());
    assert_eq!(ps.bound_texture("ReflectionMap"), h.sky.reflectance_map());
    assert_eq!(ps.bound_texture("BRDFIntegrationMap"), Some(h.brdf_lut.view()));
}
