//! Pointer input as seen by the engine.
//!
//! The host UI feeds these from application-level input state, not only
//! from the canvas hover area, so a pointer released over other page chrome
//! still delivers `Up`/`Cancel` and cannot leave a drag stuck.

use crate::surface::ScreenPoint;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { at: ScreenPoint },
    Move { at: ScreenPoint },
    Up { at: ScreenPoint },
    DoubleClick { at: ScreenPoint },
    /// Pointer left the surface or the gesture was interrupted
    Cancel,
}

/// Cross-component gating read by the entity drag state machine
#[derive(Debug, Clone, Copy, Default)]
pub struct InteractionCtx {
    /// Operator has edit permission and editing is switched on
    pub editing: bool,
    /// A global "place entity" mode owns the next click
    pub placement_active: bool,
    /// The drawing plugin is in a neutral selection mode
    pub draw_neutral: bool,
}

impl InteractionCtx {
    pub fn can_drag(&self) -> bool {
        self.editing && !self.placement_active && self.draw_neutral
    }
}
