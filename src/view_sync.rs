/// Visible pan/zoom window of one chart surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewRange {
    pub x_range: [f64; 2],
    pub y_range: [f64; 2],
}

impl ViewRange {
    pub fn full(total_duration: f64) -> Self {
        Self {
            x_range: [0.0, total_duration],
            y_range: [-1.0, 1.0],
        }
    }

    pub fn x_span(&self) -> f64 {
        self.x_range[1] - self.x_range[0]
    }
}

/// The slice of a chart the sync and playhead controllers depend on.
/// `apply_view_range` is the programmatic write path: it must update the
/// displayed range without being reported back through
/// `take_user_change`, otherwise two mirrored surfaces ping-pong forever.
pub trait ChartSurface {
    fn view_range(&self) -> ViewRange;
    fn apply_view_range(&mut self, range: ViewRange);
    /// A pan/zoom the user made since the last call, if any.
    fn take_user_change(&mut self) -> Option<ViewRange>;
}

/// Keeps the two chart surfaces' viewports identical. Only user-driven
/// changes propagate; mirrored writes go through `apply_view_range` and
/// are invisible to the next `sync` pass.
pub struct ViewSyncController {
    applied: ViewRange,
}

impl ViewSyncController {
    pub fn new(total_duration: f64) -> Self {
        Self {
            applied: ViewRange::full(total_duration),
        }
    }

    pub fn applied(&self) -> ViewRange {
        self.applied
    }

    /// Drain user changes from both surfaces and mirror them across.
    /// When both changed in the same tick the input surface wins.
    pub fn sync(&mut self, input: &mut dyn ChartSurface, output: &mut dyn ChartSurface) {
        let from_input = input.take_user_change();
        let from_output = output.take_user_change();
        if let Some(range) = from_input {
            self.applied = range;
            output.apply_view_range(range);
        } else if let Some(range) = from_output {
            self.applied = range;
            input.apply_view_range(range);
        }
    }

    /// Back to the whole asset: `[0, total]` by `[-1, 1]` on both charts.
    pub fn reset_all(
        &mut self,
        total_duration: f64,
        input: &mut dyn ChartSurface,
        output: &mut dyn ChartSurface,
    ) {
        self.applied = ViewRange::full(total_duration);
        input.apply_view_range(self.applied);
        output.apply_view_range(self.applied);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Surface that records applied ranges and lets a test inject a
    /// user pan/zoom.
    struct FakeSurface {
        range: ViewRange,
        pending_user_change: Option<ViewRange>,
        applied_count: usize,
    }

    impl FakeSurface {
        fn new() -> Self {
            Self {
                range: ViewRange::full(10.0),
                pending_user_change: None,
                applied_count: 0,
            }
        }

        fn user_pans_to(&mut self, x: [f64; 2]) {
            let range = ViewRange {
                x_range: x,
                y_range: self.range.y_range,
            };
            self.range = range;
            self.pending_user_change = Some(range);
        }
    }

    impl ChartSurface for FakeSurface {
        fn view_range(&self) -> ViewRange {
            self.range
        }

        fn apply_view_range(&mut self, range: ViewRange) {
            self.range = range;
            self.applied_count += 1;
            // Programmatic write: deliberately does not set
            // pending_user_change
        }

        fn take_user_change(&mut self) -> Option<ViewRange> {
            self.pending_user_change.take()
        }
    }

    #[test]
    fn test_change_on_a_mirrors_to_b() {
        let mut sync = ViewSyncController::new(10.0);
        let mut a = FakeSurface::new();
        let mut b = FakeSurface::new();

        a.user_pans_to([2.0, 5.0]);
        sync.sync(&mut a, &mut b);

        assert_eq!(b.view_range().x_range, [2.0, 5.0]);
        assert_eq!(sync.applied().x_range, [2.0, 5.0]);
    }

    #[test]
    fn test_mirroring_does_not_oscillate() {
        let mut sync = ViewSyncController::new(10.0);
        let mut a = FakeSurface::new();
        let mut b = FakeSurface::new();

        a.user_pans_to([2.0, 5.0]);
        sync.sync(&mut a, &mut b);
        assert_eq!(b.applied_count, 1);

        // Nothing new from the user: further passes are no-ops
        sync.sync(&mut a, &mut b);
        sync.sync(&mut a, &mut b);
        assert_eq!(a.applied_count, 0);
        assert_eq!(b.applied_count, 1);
    }

    #[test]
    fn test_change_on_b_mirrors_to_a() {
        let mut sync = ViewSyncController::new(10.0);
        let mut a = FakeSurface::new();
        let mut b = FakeSurface::new();

        b.user_pans_to([1.0, 3.0]);
        sync.sync(&mut a, &mut b);
        assert_eq!(a.view_range().x_range, [1.0, 3.0]);
    }

    #[test]
    fn test_simultaneous_changes_input_wins() {
        let mut sync = ViewSyncController::new(10.0);
        let mut a = FakeSurface::new();
        let mut b = FakeSurface::new();

        a.user_pans_to([2.0, 4.0]);
        b.user_pans_to([6.0, 8.0]);
        sync.sync(&mut a, &mut b);
        assert_eq!(a.view_range().x_range, [2.0, 4.0]);
        assert_eq!(b.view_range().x_range, [2.0, 4.0]);
    }

    #[test]
    fn test_reset_all_restores_full_view() {
        let mut sync = ViewSyncController::new(10.0);
        let mut a = FakeSurface::new();
        let mut b = FakeSurface::new();

        a.user_pans_to([2.0, 5.0]);
        sync.sync(&mut a, &mut b);
        sync.reset_all(10.0, &mut a, &mut b);

        for surface in [&a, &b] {
            assert_eq!(surface.view_range().x_range, [0.0, 10.0]);
            assert_eq!(surface.view_range().y_range, [-1.0, 1.0]);
        }
    }
}
