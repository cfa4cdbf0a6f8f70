use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cpal::traits::StreamTrait;

use crate::audio::{AudioOutput, DecodedAudio};
use crate::error::EqError;
use crate::transport::{Channel, Transport};

struct ChannelSource {
    asset: Option<Arc<DecodedAudio>>,
    stream: Option<cpal::Stream>,
}

impl ChannelSource {
    fn empty() -> Self {
        Self {
            asset: None,
            stream: None,
        }
    }
}

/// Two independent playable sources (original and processed) driven by one
/// `Transport` clock. cpal streams cannot be repositioned, so seek and
/// play always build a fresh stream at the transport's current position
/// and throw the old one away.
pub struct PlaybackController {
    output: Option<AudioOutput>,
    transport: Transport,
    /// Playback rate as f32 bits, read by live callbacks every buffer so a
    /// rate change applies to both channels without a restart.
    rate_bits: Arc<AtomicU32>,
    channels: [ChannelSource; 2],
}

impl PlaybackController {
    pub fn new() -> Self {
        let output = AudioOutput::new();
        if output.is_none() {
            log::warn!("No audio output device, playback will be silent");
        }
        Self {
            output,
            transport: Transport::new(),
            rate_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            channels: [ChannelSource::empty(), ChannelSource::empty()],
        }
    }

    /// Controller without a device, for tests and headless use.
    #[cfg(test)]
    pub fn headless() -> Self {
        Self {
            output: None,
            transport: Transport::new(),
            rate_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            channels: [ChannelSource::empty(), ChannelSource::empty()],
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn has_asset(&self, channel: Channel) -> bool {
        self.channels[channel.index()].asset.is_some()
    }

    /// A fresh input asset resets the time base and drops both sources;
    /// the stale processed output no longer belongs to this asset.
    pub fn load_input(&mut self, asset: Arc<DecodedAudio>, now: Instant) {
        self.transport.stop_all(now);
        self.channels[Channel::Input.index()] = ChannelSource {
            asset: Some(asset.clone()),
            stream: None,
        };
        self.channels[Channel::Output.index()] = ChannelSource::empty();
        self.transport.set_total_duration(asset.duration());
    }

    /// A recompute landed. If the output channel is mid-playback the new
    /// buffer takes over at the current position.
    pub fn load_output(&mut self, asset: Arc<DecodedAudio>) {
        let was_playing = self.transport.is_playing(Channel::Output);
        let slot = &mut self.channels[Channel::Output.index()];
        slot.stream = None;
        slot.asset = Some(asset);
        if was_playing {
            self.restart_channel(Channel::Output);
        }
    }

    pub fn play(&mut self, channel: Channel, now: Instant) -> Result<(), EqError> {
        if self.channels[channel.index()].asset.is_none() {
            return Err(EqError::NoAssetLoaded(channel.label()));
        }
        self.transport.play(channel, now);
        self.restart_channel(channel);
        Ok(())
    }

    pub fn pause(&mut self, channel: Channel, now: Instant) {
        self.transport.pause(channel, now);
        self.channels[channel.index()].stream = None;
    }

    pub fn stop(&mut self, channel: Channel, now: Instant) {
        self.transport.stop(channel, now);
        self.channels[channel.index()].stream = None;
    }

    pub fn stop_all(&mut self, now: Instant) {
        self.transport.stop_all(now);
        for slot in &mut self.channels {
            slot.stream = None;
        }
    }

    /// Clamped seek; playing channels are restarted from the new position
    /// so play/pause semantics survive the jump.
    pub fn seek(&mut self, time: f64, now: Instant) {
        self.transport.seek(time, now);
        for channel in [Channel::Input, Channel::Output] {
            if self.transport.is_playing(channel) {
                self.restart_channel(channel);
            }
        }
    }

    /// One rate for both channels, effective immediately on live streams
    /// and remembered for future plays.
    pub fn set_playback_rate(&mut self, rate: f64, now: Instant) {
        if rate <= 0.0 {
            return;
        }
        self.transport.set_rate(rate, now);
        self.rate_bits
            .store((rate as f32).to_bits(), Ordering::Relaxed);
    }

    /// Position reconciliation, called from the UI tick. Suppressed while
    /// the playhead is being dragged. Returns true when playback ran off
    /// the end and everything stopped.
    pub fn poll(&mut self, now: Instant, dragging: bool) -> bool {
        if dragging || !self.transport.any_playing() {
            return false;
        }
        let ended = self.transport.poll(now);
        if ended {
            for slot in &mut self.channels {
                slot.stream = None;
            }
        }
        ended
    }

    fn restart_channel(&mut self, channel: Channel) {
        let slot = &mut self.channels[channel.index()];
        slot.stream = None;
        let asset = match &slot.asset {
            Some(asset) => Arc::clone(asset),
            None => return,
        };
        let output = match &self.output {
            Some(output) => output,
            None => return,
        };

        let device_rate = output.output_config.sample_rate.0 as f64;
        let device_channels = output.output_config.channels as usize;
        let step_base = asset.sample_rate as f64 / device_rate;
        let rate_bits = Arc::clone(&self.rate_bits);
        // Fractional source-frame cursor, f64 stored as bits
        let cursor = Arc::new(AtomicU64::new(
            (self.transport.current_time() * asset.sample_rate as f64).to_bits(),
        ));

        let stream = output.create_stream_with_callback(move |out_buffer: &mut [f32]| {
            let mut pos = f64::from_bits(cursor.load(Ordering::Relaxed));
            let rate = f32::from_bits(rate_bits.load(Ordering::Relaxed)) as f64;
            let step = step_base * rate;
            for frame in out_buffer.chunks_mut(device_channels) {
                let idx = pos as usize;
                let sample = if idx < asset.samples.len() {
                    asset.samples[idx]
                } else {
                    0.0
                };
                for out_sample in frame.iter_mut() {
                    *out_sample = sample;
                }
                pos += step;
            }
            cursor.store(pos.to_bits(), Ordering::Relaxed);
        });

        match stream {
            Some(stream) => {
                if let Err(e) = stream.play() {
                    log::error!("Failed to start {} stream: {}", channel.label(), e);
                    return;
                }
                self.channels[channel.index()].stream = Some(stream);
            }
            None => log::error!("Could not create {} stream", channel.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn asset(seconds: f64) -> Arc<DecodedAudio> {
        Arc::new(DecodedAudio {
            samples: vec![0.0; (44100.0 * seconds) as usize],
            sample_rate: 44100,
        })
    }

    #[test]
    fn test_play_without_asset_is_recoverable() {
        let mut playback = PlaybackController::headless();
        let err = playback.play(Channel::Input, Instant::now()).unwrap_err();
        assert!(matches!(err, EqError::NoAssetLoaded("input")));
        assert!(!playback.transport().any_playing());
    }

    #[test]
    fn test_load_input_sets_time_base_and_drops_output() {
        let mut playback = PlaybackController::headless();
        let now = Instant::now();
        playback.load_output(asset(1.0));
        playback.load_input(asset(2.0), now);
        assert_eq!(playback.transport().total_duration(), 2.0);
        assert!(!playback.has_asset(Channel::Output));
        assert!(playback.has_asset(Channel::Input));
    }

    #[test]
    fn test_output_playable_after_recompute() {
        let mut playback = PlaybackController::headless();
        let now = Instant::now();
        playback.load_input(asset(2.0), now);
        assert!(playback.play(Channel::Output, now).is_err());
        playback.load_output(asset(2.0));
        assert!(playback.play(Channel::Output, now).is_ok());
        assert!(playback.transport().is_playing(Channel::Output));
    }

    #[test]
    fn test_poll_suppressed_while_dragging() {
        let mut playback = PlaybackController::headless();
        let now = Instant::now();
        playback.load_input(asset(1.0), now);
        playback.play(Channel::Input, now).unwrap();
        // Way past the end, but a drag is in progress
        assert!(!playback.poll(now + Duration::from_secs(5), true));
        assert!(playback.transport().is_playing(Channel::Input));
        // Drag released: the poll runs and auto-stops at the end
        assert!(playback.poll(now + Duration::from_secs(5), false));
        assert!(!playback.transport().any_playing());
    }

    #[test]
    fn test_stop_all_after_play() {
        let mut playback = PlaybackController::headless();
        let now = Instant::now();
        playback.load_input(asset(2.0), now);
        playback.play(Channel::Input, now).unwrap();
        playback.stop_all(now + Duration::from_millis(500));
        assert!(!playback.transport().is_playing(Channel::Input));
        assert_eq!(playback.transport().current_time(), 0.0);
        assert!(!playback.transport().marker_visible());
    }

    #[test]
    fn test_seek_is_clamped() {
        let mut playback = PlaybackController::headless();
        let now = Instant::now();
        playback.load_input(asset(2.0), now);
        playback.seek(10.0, now);
        assert_eq!(playback.transport().current_time(), 2.0);
    }
}
