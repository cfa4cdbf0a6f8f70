use std::time::{Duration, Instant};

/// How often playback position is reconciled from the wall clock while
/// something is playing. Tunable, not magic: UI ticks faster than this,
/// the transport just refuses to be polled more often.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Input,
    Output,
}

impl Channel {
    pub fn index(self) -> usize {
        match self {
            Channel::Input => 0,
            Channel::Output => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::Input => "input",
            Channel::Output => "output",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

/// The shared logical clock behind both playback channels. Both channels
/// derive their position from one anchor so they stay phase-aligned, and
/// `current_time` is the single source of truth whenever nothing plays.
///
/// All methods take an explicit `now` so the whole state machine can be
/// tested without sleeping; `PlaybackController` passes `Instant::now()`.
pub struct Transport {
    current_time: f64,
    total_duration: f64,
    rate: f64,
    states: [PlayState; 2],
    /// (wall time, position) recorded when the clock last (re)started
    anchor: Option<(Instant, f64)>,
    last_poll: Option<Instant>,
    marker_visible: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            current_time: 0.0,
            total_duration: 0.0,
            rate: 1.0,
            states: [PlayState::Stopped; 2],
            anchor: None,
            last_poll: None,
            marker_visible: false,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn state(&self, channel: Channel) -> PlayState {
        self.states[channel.index()]
    }

    pub fn is_playing(&self, channel: Channel) -> bool {
        self.state(channel) == PlayState::Playing
    }

    pub fn any_playing(&self) -> bool {
        self.states.iter().any(|s| *s == PlayState::Playing)
    }

    pub fn marker_visible(&self) -> bool {
        self.marker_visible
    }

    /// Called when a new asset is decoded. Only then does the time base
    /// change; position is clamped into the new range.
    pub fn set_total_duration(&mut self, duration: f64) {
        self.total_duration = duration.max(0.0);
        self.current_time = self.current_time.clamp(0.0, self.total_duration);
    }

    /// Derived position: wall clock against the anchor while playing,
    /// plain `current_time` otherwise.
    pub fn position(&self, now: Instant) -> f64 {
        match (self.any_playing(), self.anchor) {
            (true, Some((t0, offset))) => {
                let elapsed = now.saturating_duration_since(t0).as_secs_f64();
                (offset + elapsed * self.rate).min(self.total_duration)
            }
            _ => self.current_time,
        }
    }

    pub fn play(&mut self, channel: Channel, now: Instant) {
        if !self.any_playing() {
            self.anchor = Some((now, self.current_time));
        }
        self.states[channel.index()] = PlayState::Playing;
        self.marker_visible = true;
    }

    pub fn pause(&mut self, channel: Channel, now: Instant) {
        if self.state(channel) != PlayState::Playing {
            return;
        }
        // Reconcile before the anchor stops mattering
        self.current_time = self.position(now);
        self.states[channel.index()] = PlayState::Paused;
        if !self.any_playing() {
            self.anchor = None;
        }
    }

    pub fn stop(&mut self, channel: Channel, now: Instant) {
        self.pause(channel, now);
        self.states[channel.index()] = PlayState::Stopped;
        if !self.any_playing() {
            self.current_time = 0.0;
            self.anchor = None;
            self.marker_visible = false;
        }
    }

    pub fn stop_all(&mut self, now: Instant) {
        self.pause(Channel::Input, now);
        self.pause(Channel::Output, now);
        self.states = [PlayState::Stopped; 2];
        self.current_time = 0.0;
        self.anchor = None;
        self.marker_visible = false;
    }

    /// Clamped; while playing, the clock is re-anchored at the new
    /// position (callers restart their sources from here).
    pub fn seek(&mut self, time: f64, now: Instant) {
        self.current_time = time.clamp(0.0, self.total_duration);
        if self.any_playing() {
            self.anchor = Some((now, self.current_time));
        }
    }

    /// One rate for both channels, applied immediately. Re-anchors so the
    /// already-elapsed portion is not rescaled.
    pub fn set_rate(&mut self, rate: f64, now: Instant) {
        if rate <= 0.0 {
            return;
        }
        if self.any_playing() {
            self.current_time = self.position(now);
            self.anchor = Some((now, self.current_time));
        }
        self.rate = rate;
    }

    /// Periodic reconciliation, throttled to `POLL_INTERVAL`. Returns true
    /// when the end of the asset was reached and everything was stopped.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.any_playing() {
            return false;
        }
        if let Some(last) = self.last_poll {
            if now.saturating_duration_since(last) < POLL_INTERVAL {
                return false;
            }
        }
        self.last_poll = Some(now);
        self.current_time = self.position(now);
        if self.total_duration > 0.0 && self.current_time >= self.total_duration {
            self.stop_all(now);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(t0: Instant, millis: u64) -> Instant {
        t0 + Duration::from_millis(millis)
    }

    fn transport(duration: f64) -> (Transport, Instant) {
        let mut transport = Transport::new();
        transport.set_total_duration(duration);
        (transport, Instant::now())
    }

    #[test]
    fn test_stopped_position_is_current_time() {
        let (mut transport, t0) = transport(10.0);
        transport.seek(3.0, t0);
        assert_eq!(transport.position(at(t0, 5000)), 3.0);
    }

    #[test]
    fn test_seek_play_pause_converges() {
        let (mut transport, t0) = transport(10.0);
        transport.seek(4.0, t0);
        transport.play(Channel::Input, t0);
        transport.pause(Channel::Input, at(t0, 30));
        // Within one polling interval of the seek target
        assert!((transport.current_time() - 4.0).abs() <= POLL_INTERVAL.as_secs_f64());
        assert!(!transport.any_playing());
    }

    #[test]
    fn test_position_advances_with_rate() {
        let (mut transport, t0) = transport(100.0);
        transport.set_rate(2.0, t0);
        transport.play(Channel::Output, t0);
        assert!((transport.position(at(t0, 1000)) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_change_reanchors_midflight() {
        let (mut transport, t0) = transport(100.0);
        transport.play(Channel::Input, t0);
        // 1 second at 1x, then 1 second at 2x
        transport.set_rate(2.0, at(t0, 1000));
        let pos = transport.position(at(t0, 2000));
        assert!((pos - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_second_channel_joins_without_reanchor() {
        let (mut transport, t0) = transport(100.0);
        transport.play(Channel::Input, t0);
        transport.play(Channel::Output, at(t0, 1000));
        // Clock keeps its original anchor, both channels read the same time
        assert!((transport.position(at(t0, 2000)) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_pause_one_channel_keeps_clock_running() {
        let (mut transport, t0) = transport(100.0);
        transport.play(Channel::Input, t0);
        transport.play(Channel::Output, t0);
        transport.pause(Channel::Input, at(t0, 1000));
        assert!(transport.is_playing(Channel::Output));
        assert!((transport.position(at(t0, 2000)) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_seek_clamps_to_asset() {
        let (mut transport, t0) = transport(5.0);
        transport.seek(99.0, t0);
        assert_eq!(transport.current_time(), 5.0);
        transport.seek(-1.0, t0);
        assert_eq!(transport.current_time(), 0.0);
    }

    #[test]
    fn test_poll_autostops_at_end() {
        let (mut transport, t0) = transport(1.0);
        transport.play(Channel::Input, t0);
        assert!(!transport.poll(at(t0, 500)));
        assert!(transport.poll(at(t0, 1500)));
        assert_eq!(transport.current_time(), 0.0);
        assert!(!transport.any_playing());
        assert!(!transport.marker_visible());
    }

    #[test]
    fn test_poll_is_throttled() {
        let (mut transport, t0) = transport(100.0);
        transport.play(Channel::Input, t0);
        transport.poll(at(t0, 60));
        let reconciled = transport.current_time();
        // Too soon after the last poll, current_time stays put
        transport.poll(at(t0, 80));
        assert_eq!(transport.current_time(), reconciled);
        transport.poll(at(t0, 120));
        assert!(transport.current_time() > reconciled);
    }

    #[test]
    fn test_stop_all_resets_and_hides_marker() {
        let (mut transport, t0) = transport(10.0);
        transport.play(Channel::Input, t0);
        assert!(transport.marker_visible());
        transport.stop_all(at(t0, 1000));
        assert!(!transport.is_playing(Channel::Input));
        assert_eq!(transport.current_time(), 0.0);
        assert!(!transport.marker_visible());
    }

    #[test]
    fn test_marker_stays_visible_while_paused() {
        let (mut transport, t0) = transport(10.0);
        transport.play(Channel::Input, t0);
        transport.pause(Channel::Input, at(t0, 100));
        assert!(transport.marker_visible());
    }

    #[test]
    fn test_invalid_rate_is_ignored() {
        let (mut transport, t0) = transport(10.0);
        transport.set_rate(0.0, t0);
        transport.set_rate(-1.0, t0);
        assert_eq!(transport.rate(), 1.0);
    }

    #[test]
    fn test_new_asset_clamps_position() {
        let (mut transport, t0) = transport(10.0);
        transport.seek(8.0, t0);
        transport.set_total_duration(5.0);
        assert_eq!(transport.current_time(), 5.0);
    }
}
