use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::unbounded;

use crate::audio::{self, DecodedAudio};
use crate::bands::BandStore;
use crate::engine::{self, EqEngine};
use crate::playback::PlaybackController;
use crate::playhead::PlayheadController;
use crate::presets::{JsonPresetStore, PresetStore};
use crate::scheduler::{ProcessingScheduler, SchedulerEvent};
use crate::spectrum::{fallback_spectrum, FrequencyScale, SpectrumCache};
use crate::transport::Channel;
use crate::ui::EqChartSurface;
use crate::view_sync::ViewSyncController;

/// Tones used for the built-in test asset; each also carries its 2nd and
/// 3rd harmonics, so the bands have something to bite into.
const TEST_SIGNAL_FREQS: [f32; 3] = [220.0, 330.0, 440.0];
const TEST_SIGNAL_SECONDS: f32 = 3.0;

#[derive(Clone, Debug)]
pub enum EqAction {
    LoadFile(PathBuf),
    LoadTestSignal,
    AddBand { start_freq: f32, end_freq: f32 },
    RemoveBand(u64),
    SetBandGain { id: u64, gain: f32 },
    SetBandRange { id: u64, start_freq: f32, end_freq: f32 },
    TogglePlay(Channel),
    Stop,
    Seek(f64),
    SetPlaybackRate(f64),
    SetFrequencyScale(FrequencyScale),
    ResetView,
    SavePreset(String),
    LoadPreset(String),
    DeletePreset(String),
    ExportProcessed(PathBuf),
}

/// Top-level application state. Every user gesture goes through
/// `dispatch`; `tick` runs once per frame and drives the debounce timer,
/// drains engine results, reconciles playback and mirrors the chart
/// viewports.
pub struct EqApp {
    pub bands: BandStore,
    pub scheduler: ProcessingScheduler,
    pub playback: PlaybackController,
    pub playhead: PlayheadController,
    pub view_sync: ViewSyncController,
    pub spectra: SpectrumCache,
    pub input_chart: EqChartSurface,
    pub output_chart: EqChartSurface,
    pub presets: JsonPresetStore,
    pub source: Option<Arc<DecodedAudio>>,
    pub processed: Option<Arc<DecodedAudio>>,
    pub status: Option<String>,
    pub freq_scale: FrequencyScale,
    pub preset_name: String,
    pub selected_preset: String,
    pub draft_band: (f32, f32),
    seen_revision: u64,
}

impl Default for EqApp {
    fn default() -> Self {
        Self::new()
    }
}

impl EqApp {
    pub fn new() -> Self {
        let (reply_tx, reply_rx) = unbounded();
        let engine = EqEngine::spawn(reply_tx);
        let scheduler = ProcessingScheduler::new(Box::new(engine), reply_rx);
        let bands = BandStore::new();
        let seen_revision = bands.revision();
        Self {
            bands,
            scheduler,
            playback: PlaybackController::new(),
            playhead: PlayheadController::new(),
            view_sync: ViewSyncController::new(0.0),
            spectra: SpectrumCache::default(),
            input_chart: EqChartSurface::new(),
            output_chart: EqChartSurface::new(),
            presets: JsonPresetStore::new(),
            source: None,
            processed: None,
            status: None,
            freq_scale: FrequencyScale::default(),
            preset_name: String::new(),
            selected_preset: String::new(),
            draft_band: (100.0, 1000.0),
            seen_revision,
        }
    }

    pub fn preset_names(&self) -> Vec<String> {
        self.presets.list()
    }

    pub fn dispatch(&mut self, action: EqAction, now: Instant) {
        log::debug!("Action: {:?}", action);
        match action {
            EqAction::LoadFile(path) => match audio::load_audio(&path) {
                Ok(asset) => self.load_asset(asset, now),
                Err(err) => self.status = Some(format!("Load failed: {}", err)),
            },
            EqAction::LoadTestSignal => {
                let asset = audio::generate_test_signal(
                    &TEST_SIGNAL_FREQS,
                    TEST_SIGNAL_SECONDS,
                    44100,
                );
                self.load_asset(asset, now);
            }
            EqAction::AddBand {
                start_freq,
                end_freq,
            } => {
                if let Err(err) = self.bands.add_band(start_freq, end_freq, 1.0, None) {
                    self.status = Some(err.to_string());
                }
            }
            EqAction::RemoveBand(id) => self.bands.remove_band(id),
            EqAction::SetBandGain { id, gain } => {
                if let Err(err) = self.bands.set_gain(id, gain) {
                    self.status = Some(err.to_string());
                }
            }
            EqAction::SetBandRange {
                id,
                start_freq,
                end_freq,
            } => {
                if let Err(err) = self.bands.set_range(id, start_freq, end_freq) {
                    self.status = Some(err.to_string());
                }
            }
            EqAction::TogglePlay(channel) => {
                if self.playback.transport().is_playing(channel) {
                    self.playback.pause(channel, now);
                } else if let Err(err) = self.playback.play(channel, now) {
                    self.status = Some(err.to_string());
                }
            }
            EqAction::Stop => self.playback.stop_all(now),
            EqAction::Seek(time) => self.playback.seek(time, now),
            EqAction::SetPlaybackRate(rate) => self.playback.set_playback_rate(rate, now),
            // Pure view change: the charts remap the cached payloads on
            // the next frame, no recompute
            EqAction::SetFrequencyScale(scale) => self.freq_scale = scale,
            EqAction::ResetView => {
                let total = self.playback.transport().total_duration();
                self.view_sync
                    .reset_all(total, &mut self.input_chart, &mut self.output_chart);
            }
            EqAction::SavePreset(name) => match self.presets.save(&name, &self.bands.snapshot()) {
                Ok(()) => {
                    self.selected_preset = name.clone();
                    self.status = Some(format!("Saved preset {:?}", name));
                }
                Err(err) => self.status = Some(err.to_string()),
            },
            EqAction::LoadPreset(name) => match self.presets.load(&name) {
                Ok(bands) => {
                    // Revision bump is picked up by the next tick, which
                    // schedules a recompute through the usual debounce
                    self.bands.replace_all(bands);
                    self.status = None;
                }
                Err(err) => self.status = Some(err.to_string()),
            },
            EqAction::DeletePreset(name) => match self.presets.delete(&name) {
                Ok(()) => {
                    if self.selected_preset == name {
                        self.selected_preset.clear();
                    }
                }
                Err(err) => self.status = Some(err.to_string()),
            },
            EqAction::ExportProcessed(path) => match &self.processed {
                Some(audio) => match engine::export_wav(&path, audio) {
                    Ok(()) => self.status = Some(format!("Exported {}", path.display())),
                    Err(err) => self.status = Some(format!("Export failed: {}", err)),
                },
                None => self.status = Some("Nothing processed to export yet".to_string()),
            },
        }
    }

    fn load_asset(&mut self, asset: DecodedAudio, now: Instant) {
        let asset = Arc::new(asset);
        self.playback.load_input(Arc::clone(&asset), now);
        self.input_chart.set_waveform(&asset.samples);
        self.output_chart.clear_waveform();
        self.processed = None;

        // Local approximation until the first engine result lands
        self.spectra = SpectrumCache::default();
        match fallback_spectrum(&asset.samples, asset.sample_rate) {
            Ok(spectrum) => self.spectra.input_spectrum = spectrum,
            Err(err) => log::warn!("No fallback spectrum: {}", err),
        }

        self.scheduler
            .dispatch_now(Arc::clone(&asset), self.bands.snapshot());
        self.source = Some(asset);

        let total = self.playback.transport().total_duration();
        self.view_sync
            .reset_all(total, &mut self.input_chart, &mut self.output_chart);
        self.status = None;
    }

    /// Per-frame housekeeping, with an explicit `now` so tests can drive it.
    pub fn tick(&mut self, now: Instant) {
        let revision = self.bands.revision();
        if revision != self.seen_revision {
            self.seen_revision = revision;
            if self.source.is_some() {
                self.scheduler.note_change(now);
            }
        }

        let snapshot = self.bands.snapshot();
        for event in self.scheduler.tick(now, self.source.as_ref(), &snapshot) {
            match event {
                SchedulerEvent::Applied(processed) => {
                    let processed = *processed;
                    let audio = Arc::new(processed.audio);
                    self.output_chart.set_waveform(&audio.samples);
                    self.playback.load_output(Arc::clone(&audio));
                    self.processed = Some(audio);
                    self.spectra.input_spectrum = processed.input_spectrum;
                    self.spectra.output_spectrum = processed.output_spectrum;
                    self.spectra.input_spectrogram = processed.input_spectrogram;
                    self.spectra.output_spectrogram = processed.output_spectrogram;
                    self.status = None;
                }
                SchedulerEvent::Failed(err) => {
                    log::error!("Processing failed: {}", err);
                    self.status = Some(format!("Processing failed: {}", err));
                }
            }
        }

        self.playback.poll(now, self.playhead.is_dragging());
        self.view_sync
            .sync(&mut self.input_chart, &mut self.output_chart);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::DEBOUNCE_DELAY;
    use std::time::Duration;

    /// Drive ticks until the in-process engine has replied.
    fn settle(app: &mut EqApp) {
        let start = Instant::now();
        while app.scheduler.is_processing() {
            assert!(
                start.elapsed() < Duration::from_secs(10),
                "engine never replied"
            );
            std::thread::sleep(Duration::from_millis(10));
            app.tick(Instant::now());
        }
    }

    #[test]
    fn test_load_test_signal_processes_end_to_end() {
        let mut app = EqApp::new();
        app.dispatch(EqAction::LoadTestSignal, Instant::now());

        assert!(app.source.is_some());
        assert!(app.input_chart.has_waveform());
        // Until the engine answers, the spectrum is the local approximation
        assert!(app.spectra.input_spectrum.degraded);

        settle(&mut app);
        assert!(app.processed.is_some());
        assert!(app.output_chart.has_waveform());
        assert!(app.spectra.has_authoritative_data());
        assert!(!app.spectra.output_spectrum.magnitudes.is_empty());
    }

    #[test]
    fn test_band_edit_debounces_then_recomputes() {
        let mut app = EqApp::new();
        app.dispatch(EqAction::LoadTestSignal, Instant::now());
        settle(&mut app);

        let now = Instant::now();
        app.dispatch(
            EqAction::AddBand {
                start_freq: 200.0,
                end_freq: 500.0,
            },
            now,
        );
        app.tick(now);
        assert!(app.scheduler.is_processing());

        // Inside the quiet window nothing has been dispatched yet; after
        // it elapses the recompute runs and lands
        app.tick(now + DEBOUNCE_DELAY + Duration::from_millis(1));
        settle(&mut app);
        assert_eq!(app.processed.as_ref().map(|a| a.sample_rate), Some(44100));
    }

    #[test]
    fn test_scale_switch_needs_no_recompute() {
        let mut app = EqApp::new();
        app.dispatch(EqAction::LoadTestSignal, Instant::now());
        settle(&mut app);
        let cached = app.spectra.input_spectrum.clone();

        let now = Instant::now();
        app.dispatch(
            EqAction::SetFrequencyScale(FrequencyScale::Audiogram),
            now,
        );
        app.tick(now);
        assert_eq!(app.freq_scale, FrequencyScale::Audiogram);
        // The cached linear-axis payload is untouched and nothing was
        // sent back to the engine
        assert_eq!(app.spectra.input_spectrum, cached);
        assert!(!app.scheduler.is_processing());
    }

    #[test]
    fn test_invalid_band_reaches_status_line() {
        let mut app = EqApp::new();
        app.dispatch(
            EqAction::AddBand {
                start_freq: 500.0,
                end_freq: 100.0,
            },
            Instant::now(),
        );
        assert!(app.status.is_some());
        assert!(app.bands.bands().is_empty());
    }

    #[test]
    fn test_play_without_asset_sets_status() {
        let mut app = EqApp::new();
        app.dispatch(EqAction::TogglePlay(Channel::Input), Instant::now());
        assert!(app.status.is_some());
        assert!(!app.playback.transport().any_playing());
    }
}
