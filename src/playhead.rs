use crate::view_sync::ViewRange;

/// Pixel x of the marker inside a chart `width` pixels wide showing
/// `view`. None when there is nothing to map onto (no asset, empty view)
/// or the position is outside the visible window.
pub fn marker_x(time: f64, total_duration: f64, view: &ViewRange, width: f32) -> Option<f32> {
    if total_duration <= 0.0 || view.x_span() <= 0.0 || width <= 0.0 {
        return None;
    }
    let fraction = (time - view.x_range[0]) / view.x_span();
    if !(0.0..=1.0).contains(&fraction) {
        return None;
    }
    Some(fraction as f32 * width)
}

struct DragState {
    start_x: f32,
    start_time: f64,
}

/// Maps the transport position onto chart pixels and turns pointer drags
/// back into seeks. While a drag is live the periodic position poll is
/// suppressed and the dragged value is the provisional current time.
pub struct PlayheadController {
    drag: Option<DragState>,
}

impl Default for PlayheadController {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayheadController {
    pub fn new() -> Self {
        Self { drag: None }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn on_drag_start(&mut self, pointer_x: f32, current_time: f64) {
        self.drag = Some(DragState {
            start_x: pointer_x,
            start_time: current_time,
        });
    }

    /// Provisional time for the current pointer position: displacement
    /// scaled by visible seconds per pixel, clamped to the asset. The
    /// caller seeks there immediately for synchronous feedback.
    pub fn on_drag_move(
        &self,
        pointer_x: f32,
        total_duration: f64,
        view: &ViewRange,
        width: f32,
    ) -> Option<f64> {
        let drag = self.drag.as_ref()?;
        if width <= 0.0 || total_duration <= 0.0 {
            return None;
        }
        let seconds_per_pixel = view.x_span() / width as f64;
        let time = drag.start_time + (pointer_x - drag.start_x) as f64 * seconds_per_pixel;
        Some(time.clamp(0.0, total_duration))
    }

    pub fn on_drag_end(&mut self) {
        self.drag = None;
    }
}
