//! Resize protocol: release, rebuild, and rejection of calls in between.

mod common;

use common::{Harness, HEIGHT, WIDTH};
use ibl_renderer::backend::Viewport;
use ibl_renderer::renderer::ResizeState;
use ibl_renderer::{RenderTargetSlot, RendererError};
use rstest::rstest;

#[rstest]
#[case(WIDTH * 2, HEIGHT * 2)]
#[case(17, 9)]
#[case(1, 1)]
fn test_every_slot_matches_new_size(#[case] width: u32, #[case] height: u32) {
    let mut h = Harness::new();
    h.resize(width, height).unwrap();

    assert_eq!(h.renderer.size(), (width, height));
    for slot in RenderTargetSlot::ALL {
        let target = h.renderer.render_target(slot).unwrap();
        assert_eq!((target.width, target.height), (width, height), "{:?}", slot);
        assert_eq!(target.format, slot.format());
        let info = h.ctx.view_info(target.view).unwrap();
        assert_eq!((info.width, info.height, info.format), (width, height, slot.format()));
    }
    assert_eq!(h.ctx.viewport(), Viewport::new(width, height));

    // The next frame runs at the new size
    h.run_frame(&[], &[]).unwrap();
}

#[test]
fn test_double_pre_resize_matches_single() {
    let mut once = Harness::new();
    once.resize(100, 50).unwrap();

    let mut twice = Harness::new();
    twice.renderer.pre_resize(&mut twice.ctx).unwrap();
    twice.resize(100, 50).unwrap();

    assert_eq!(once.renderer.resize_state(), twice.renderer.resize_state());
    assert_eq!(once.renderer.phase(), twice.renderer.phase());
    assert_eq!(once.renderer.size(), twice.renderer.size());
    assert_eq!(
        once.ctx.backend().live_texture_count(),
        twice.ctx.backend().live_texture_count()
    );
    assert_eq!(once.ctx.state().color_targets, twice.ctx.state().color_targets);
    assert_eq!(once.ctx.viewport(), twice.ctx.viewport());
    for slot in RenderTargetSlot::ALL {
        let a = once.renderer.render_target(slot).unwrap();
        let b = twice.renderer.render_target(slot).unwrap();
        assert_eq!((a.width, a.height, a.format), (b.width, b.height, b.format));
    }
}

#[test]
fn test_pre_resize_releases_targets() {
    let mut h = Harness::new();
    let before = h.ctx.backend().live_texture_count();
    h.renderer.pre_resize(&mut h.ctx).unwrap();

    assert_eq!(h.renderer.resize_state(), ResizeState::Released);
    assert_eq!(h.ctx.backend().live_texture_count(), before - RenderTargetSlot::COUNT);
    assert!(h.renderer.render_target(RenderTargetSlot::SceneColor).is_none());
    assert!(h.renderer.back_buffer().is_none());
    assert!(h.renderer.debug_targets().is_empty());
    assert!(h.ctx.state().color_targets.is_empty());
}

#[test]
fn test_frame_calls_rejected_while_released() {
    let mut h = Harness::new();
    h.renderer.pre_resize(&mut h.ctx).unwrap();

    assert!(matches!(
        h.renderer.frame_start(&mut h.ctx),
        Err(RendererError::ResizeOrder { operation: "frame_start" })
    ));
    assert!(matches!(
        h.renderer.render(&mut h.ctx, &[], &[], &h.camera, &h.sky),
        Err(RendererError::ResizeOrder { .. })
    ));
}

#[test]
fn test_post_resize_requires_release() {
    let mut h = Harness::new();
    let back_buffer = h.back_buffer();
    let depth = h.depth.view;

    assert!(matches!(
        h.renderer.post_resize(&mut h.ctx, 10, 10, back_buffer, depth),
        Err(RendererError::ResizeOrder { operation: "post_resize" })
    ));

    h.renderer.pre_resize(&mut h.ctx).unwrap();
    assert!(matches!(
        h.renderer.post_resize(&mut h.ctx, 0, 10, back_buffer, depth),
        Err(RendererError::InvalidParameter(_))
    ));
    assert_eq!(h.renderer.resize_state(), ResizeState::Released);
}

#[test]
fn test_pre_resize_rejected_mid_frame() {
    let mut h = Harness::new();
    h.renderer.frame_start(&mut h.ctx).unwrap();

    assert!(matches!(
        h.renderer.pre_resize(&mut h.ctx),
        Err(RendererError::FrameOrder { operation: "pre_resize", .. })
    ));
    assert_eq!(h.renderer.resize_state(), ResizeState::Ready);
}
