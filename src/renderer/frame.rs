//! Frame lifecycle and resize protocol states

use crate::error::{RendererError, RendererResult};

/// Where the renderer is within a frame.
///
/// Advances Idle → FrameStarted → Rendered → PostProcessed → Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    #[default]
    Idle,
    FrameStarted,
    Rendered,
    PostProcessed,
}

/// Per-frame calls, each legal in exactly one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    FrameStart,
    Render,
    PostProcess,
    FrameEnd,
}

impl FrameStep {
    pub fn name(self) -> &'static str {
        match self {
            FrameStep::FrameStart => "frame_start",
            FrameStep::Render => "render",
            FrameStep::PostProcess => "post_process",
            FrameStep::FrameEnd => "frame_end",
        }
    }

    fn requires(self) -> FramePhase {
        match self {
            FrameStep::FrameStart => FramePhase::Idle,
            FrameStep::Render => FramePhase::FrameStarted,
            FrameStep::PostProcess => FramePhase::Rendered,
            FrameStep::FrameEnd => FramePhase::PostProcessed,
        }
    }

    fn leads_to(self) -> FramePhase {
        match self {
            FrameStep::FrameStart => FramePhase::FrameStarted,
            FrameStep::Render => FramePhase::Rendered,
            FrameStep::PostProcess => FramePhase::PostProcessed,
            FrameStep::FrameEnd => FramePhase::Idle,
        }
    }
}

impl FramePhase {
    pub fn name(self) -> &'static str {
        match self {
            FramePhase::Idle => "idle",
            FramePhase::FrameStarted => "frame started",
            FramePhase::Rendered => "rendered",
            FramePhase::PostProcessed => "post-processed",
        }
    }

    /// Fail with [`RendererError::FrameOrder`] unless `step` may run now
    pub fn check(self, step: FrameStep) -> RendererResult<()> {
        if step.requires() == self {
            Ok(())
        } else {
            Err(RendererError::FrameOrder {
                operation: step.name(),
                phase: self.name(),
            })
        }
    }

    /// Phase after `step` completes
    pub fn advance(self, step: FrameStep) -> FramePhase {
        debug_assert_eq!(step.requires(), self);
        step.leads_to()
    }
}

/// Whether the size-dependent resources currently exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeState {
    #[default]
    Ready,
    /// Targets released by `pre_resize`, waiting for `post_resize`
    Released,
}

impl ResizeState {
    pub fn require_ready(self, operation: &'static str) -> RendererResult<()> {
        match self {
            ResizeState::Ready => Ok(()),
            ResizeState::Released => Err(RendererError::ResizeOrder { operation }),
        }
    }

    pub fn require_released(self, operation: &'static str) -> RendererResult<()> {
        match self {
            ResizeState::Released => Ok(()),
            ResizeState::Ready => Err(RendererError::ResizeOrder { operation }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut phase = FramePhase::default();
        for step in [
            FrameStep::FrameStart,
            FrameStep::Render,
            FrameStep::PostProcess,
            FrameStep::FrameEnd,
        ] {
            phase.check(step).unwrap();
            phase = phase.advance(step);
        }
        assert_eq!(phase, FramePhase::Idle);
    }

    #[test]
    fn test_out_of_order_rejected() {
        assert!(matches!(
            FramePhase::Idle.check(FrameStep::Render),
            Err(RendererError::FrameOrder { operation: "render", phase: "idle" })
        ));
        assert!(FramePhase::Rendered.check(FrameStep::FrameEnd).is_err());
        assert!(FramePhase::FrameStarted.check(FrameStep::FrameStart).is_err());
    }

    #[test]
    fn test_resize_states() {
        assert!(ResizeState::Ready.require_ready("render").is_ok());
        assert!(ResizeState::Ready.require_released("post_resize").is_err());
        assert!(ResizeState::Released.require_released("post_resize").is_ok());
        assert!(matches!(
            ResizeState::Released.require_ready("frame_start"),
            Err(RendererError::ResizeOrder { operation: "frame_start" })
        ));
    }
}
