//! Frame state machine and the post-process chain, checked against the command log.

mod common;

use common::Harness;
use ibl_renderer::backend::{BackendError, LoadOp, RecordedCommand, Viewport};
use ibl_renderer::renderer::FramePhase;
use ibl_renderer::{RenderTargetSlot, RendererError};

fn target(h: &Harness, slot: RenderTargetSlot) -> ibl_renderer::backend::TextureViewHandle {
    h.renderer.render_target(slot).unwrap().view
}

#[test]
fn test_empty_frame_ends_in_combine_and_present() {
    let mut h = Harness::new();
    h.ctx.backend_mut().clear_commands();

    h.run_frame(&[], &[]).unwrap();
    assert_eq!(h.renderer.phase(), FramePhase::Idle);

    let passes = h.drawing_passes();
    let scene_views: Vec<_> = RenderTargetSlot::SCENE.iter().map(|slot| target(&h, *slot)).collect();
    let color_targets: Vec<_> = passes.iter().map(|pass| pass.color_views()).collect();
    assert_eq!(
        color_targets,
        vec![
            scene_views,
            vec![target(&h, RenderTargetSlot::PostProcessZero)],
            vec![target(&h, RenderTargetSlot::PostProcessOne)],
            vec![h.back_buffer()],
        ]
    );
    // The scene pass only holds the sky, the post passes one full-screen triangle each
    assert!(passes.iter().all(|pass| pass.draws == 1));
    assert!(passes[0].descriptor.depth_stencil_attachment.is_some());

    let commands = h.commands();
    let present = commands
        .iter()
        .position(|c| matches!(c, RecordedCommand::Present { vsync: true }))
        .expect("frame was presented");
    let last_draw = commands
        .iter()
        .rposition(|c| matches!(c, RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. }))
        .unwrap();
    assert!(last_draw < present);
    assert!(matches!(commands[0], RecordedCommand::BeginFrame));
}

#[test]
fn test_frame_start_clears_every_target() {
    let mut h = Harness::new();
    h.ctx.backend_mut().clear_commands();
    h.renderer.frame_start(&mut h.ctx).unwrap();

    let clears: Vec<_> = h
        .ctx
        .backend()
        .passes()
        .into_iter()
        .filter(|pass| pass.is_clear())
        .collect();
    let cleared_to = |view| {
        clears.iter().find_map(|pass| {
            pass.descriptor
                .color_attachments
                .iter()
                .find(|a| a.view == view)
                .map(|a| a.load_op)
        })
    };

    assert_eq!(cleared_to(h.back_buffer()), Some(LoadOp::Clear([0.4, 0.6, 0.75, 1.0])));
    assert_eq!(
        cleared_to(target(&h, RenderTargetSlot::SceneDepth)),
        Some(LoadOp::Clear([1.0, 0.0, 0.0, 0.0]))
    );
    for slot in [RenderTargetSlot::SceneColor, RenderTargetSlot::PostProcessOne] {
        assert_eq!(cleared_to(target(&h, slot)), Some(LoadOp::Clear([0.0; 4])));
    }
    assert!(clears.iter().any(|pass| pass
        .descriptor
        .depth_stencil_attachment
        .as_ref()
        .is_some_and(|d| d.view == h.depth.view && d.depth_clear_value == 1.0)));

    let scene_views: Vec<_> = RenderTargetSlot::SCENE.iter().map(|slot| target(&h, *slot)).collect();
    assert_eq!(h.ctx.state().color_targets, scene_views);
    assert_eq!(h.ctx.state().depth_target, Some(h.depth.view));
}

#[test]
fn test_out_of_order_calls_rejected() {
    let mut h = Harness::new();

    let err = h
        .renderer
        .render(&mut h.ctx, &[], &[], &h.camera, &h.sky)
        .unwrap_err();
    assert!(matches!(err, RendererError::FrameOrder { operation: "render", phase: "idle" }));
    assert!(h.renderer.post_process(&mut h.ctx, &h.camera).is_err());
    assert!(h.renderer.frame_end(&mut h.ctx, true).is_err());

    h.renderer.frame_start(&mut h.ctx).unwrap();
    assert!(matches!(
        h.renderer.frame_start(&mut h.ctx),
        Err(RendererError::FrameOrder { operation: "frame_start", .. })
    ));
    assert!(h.renderer.post_process(&mut h.ctx, &h.camera).is_err());
    assert_eq!(h.renderer.phase(), FramePhase::FrameStarted);

    // A rejected call leaves the frame usable
    h.renderer.render(&mut h.ctx, &[], &[], &h.camera, &h.sky).unwrap();
    h.renderer.post_process(&mut h.ctx, &h.camera).unwrap();
    h.renderer.frame_end(&mut h.ctx, false).unwrap();
    assert_eq!(h.renderer.phase(), FramePhase::Idle);
}

#[test]
fn test_frame_end_rebinds_back_buffer_and_depth() {
    let mut h = Harness::new();
    h.run_frame(&[], &[]).unwrap();

    assert_eq!(h.ctx.state().color_targets, vec![h.back_buffer()]);
    assert_eq!(h.ctx.state().depth_target, Some(h.depth.view));
}

#[test]
fn test_failed_present_still_rebinds() {
    let mut h = Harness::new();
    h.renderer.frame_start(&mut h.ctx).unwrap();
    h.renderer
        .render(&mut h.ctx, &[], &[], &h.camera, &h.sky)
        .unwrap();
    h.renderer.post_process(&mut h.ctx, &h.camera).unwrap();
    h.ctx.backend_mut().fail_next_present();

    let err = h.renderer.frame_end(&mut h.ctx, true).unwrap_err();
    assert!(matches!(err, RendererError::Backend(BackendError::PresentFailed(_))));
    assert_eq!(h.renderer.phase(), FramePhase::Idle);
    assert_eq!(h.ctx.state().color_targets, vec![h.back_buffer()]);
    assert_eq!(h.ctx.state().depth_target, Some(h.depth.view));
    assert_eq!(h.ctx.viewport(), Viewport::new(common::WIDTH, common::HEIGHT));

    h.run_frame(&[], &[]).unwrap();
}

#[test]
fn test_frames_with_entities_draw_each_once() {
    let mut h = Harness::new();
    let entities = vec![h.sphere(), h.sphere()];
    h.ctx.backend_mut().clear_commands();

    for _ in 0..2 {
        h.run_frame(&entities, &[]).unwrap();
    }

    let presents = h
        .commands()
        .iter()
        .filter(|c| matches!(c, RecordedCommand::Present { .. }))
        .count();
    assert_eq!(presents, 2);
    let scene_passes: Vec<_> = h
        .drawing_passes()
        .into_iter()
        .filter(|pass| pass.color_views().len() == RenderTargetSlot::SCENE.len())
        .collect();
    assert_eq!(scene_passes.len(), 2);
    // Two spheres and the sky
    assert!(scene_passes.iter().all(|pass| pass.draws == 3));
}

#[test]
fn test_ssao_toggles_reach_combine() {
    let mut h = Harness::new();
    h.renderer.ssao_config_mut().enabled = false;
    h.renderer.ssao_config_mut().output_only = true;
    h.run_frame(&[], &[]).unwrap();

    let combine = &h.renderer.ssao_resources().combine_ps;
    assert_eq!(combine.staged_data("c_ssaoEnabled").unwrap(), common::int_bytes(0));
    assert_eq!(combine.staged_data("c_ssaoOutputOnly").unwrap(), common::int_bytes(1));
    // Resource slots are released after the chain
    assert_eq!(combine.bound_texture("SSAO"), None);
}
