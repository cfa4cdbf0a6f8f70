use std::path::Path;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};
use num_complex::Complex;
use rustfft::FftPlanner;
use spectrum_analyzer::windows::hann_window;

use crate::audio::DecodedAudio;
use crate::bands::Band;
use crate::error::EqError;
use crate::spectrum::{SpectrogramData, SpectrumData};

pub const SPECTROGRAM_WINDOW: usize = 1024;
pub const SPECTROGRAM_HOP: usize = 512;
/// Spectra are decimated to this many points before they reach the charts.
const MAX_SPECTRUM_POINTS: usize = 2048;

/// One recompute shipped to the processing service. The source asset and
/// band snapshot are frozen at dispatch time; the token orders results.
pub struct ProcessingRequest {
    pub token: u64,
    pub source: Arc<DecodedAudio>,
    pub bands: Vec<Band>,
}

pub struct ProcessedAudio {
    pub audio: DecodedAudio,
    pub input_spectrum: SpectrumData,
    pub output_spectrum: SpectrumData,
    pub input_spectrogram: SpectrogramData,
    pub output_spectrogram: SpectrogramData,
    /// Band snapshot echoed back for correlation.
    pub bands: Vec<Band>,
}

pub struct ProcessingResponse {
    pub token: u64,
    pub result: Result<ProcessedAudio, EqError>,
}

/// Boundary to the recompute backend. Implementations take ownership of a
/// request and deliver a `ProcessingResponse` on the reply channel they
/// were constructed with, at some later point, possibly out of order.
pub trait ProcessingService {
    fn dispatch(&self, request: ProcessingRequest);
}

/// In-process equalizer engine: a worker thread that applies an FFT
/// frequency mask and reports spectra for both sides of the comparison.
pub struct EqEngine {
    jobs: Sender<ProcessingRequest>,
}

impl EqEngine {
    pub fn spawn(replies: Sender<ProcessingResponse>) -> Self {
        let (jobs, job_rx): (Sender<ProcessingRequest>, Receiver<ProcessingRequest>) = unbounded();
        thread::spawn(move || {
            for request in job_rx.iter() {
                let token = request.token;
                let result = process(&request);
                if replies.send(ProcessingResponse { token, result }).is_err() {
                    // Controller went away, nothing left to do
                    break;
                }
            }
        });
        Self { jobs }
    }
}

impl ProcessingService for EqEngine {
    fn dispatch(&self, request: ProcessingRequest) {
        if self.jobs.send(request).is_err() {
            log::error!("Engine worker is gone, dropping request");
        }
    }
}

fn process(request: &ProcessingRequest) -> Result<ProcessedAudio, EqError> {
    let source = &request.source;
    if source.samples.is_empty() {
        return Err(EqError::Processing("Empty source asset".to_string()));
    }

    let processed = apply_frequency_mask(&source.samples, source.sample_rate, &request.bands);

    Ok(ProcessedAudio {
        input_spectrum: compute_spectrum(&source.samples, source.sample_rate),
        output_spectrum: compute_spectrum(&processed, source.sample_rate),
        input_spectrogram: compute_spectrogram(&source.samples, source.sample_rate),
        output_spectrogram: compute_spectrogram(&processed, source.sample_rate),
        audio: DecodedAudio {
            samples: processed,
            sample_rate: source.sample_rate,
        },
        bands: request.bands.clone(),
    })
}

/// Forward FFT, multiply each bin by the product of the gains of all bands
/// containing its frequency (mirrored onto the negative-frequency half so
/// the inverse transform stays real), inverse FFT, keep the real part.
pub fn apply_frequency_mask(samples: &[f32], sample_rate: u32, bands: &[Band]) -> Vec<f32> {
    if bands.is_empty() {
        return samples.to_vec();
    }

    let n = samples.len();
    let mut buffer: Vec<Complex<f32>> = samples.iter().map(|&x| Complex::new(x, 0.0)).collect();

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    let bin_hz = sample_rate as f32 / n as f32;
    for (k, bin) in buffer.iter_mut().enumerate() {
        // Bins past n/2 are the negative frequencies
        let freq = if k <= n / 2 {
            k as f32 * bin_hz
        } else {
            (n - k) as f32 * bin_hz
        };
        for band in bands {
            if band.contains(freq) {
                *bin *= band.gain;
            }
        }
    }

    planner.plan_fft_inverse(n).process(&mut buffer);
    let scale = 1.0 / n as f32;
    buffer.iter().map(|c| c.re * scale).collect()
}

/// Magnitude spectrum of the whole signal, decimated for display.
pub fn compute_spectrum(samples: &[f32], sample_rate: u32) -> SpectrumData {
    let n = samples.len();
    let mut buffer: Vec<Complex<f32>> = samples.iter().map(|&x| Complex::new(x, 0.0)).collect();
    FftPlanner::new().plan_fft_forward(n).process(&mut buffer);

    let bins = n / 2 + 1;
    let bin_hz = sample_rate as f32 / n as f32;
    let stride = (bins / MAX_SPECTRUM_POINTS).max(1);

    let mut frequencies = Vec::with_capacity(bins / stride + 1);
    let mut magnitudes = Vec::with_capacity(bins / stride + 1);
    let mut k = 0;
    while k < bins {
        let end = (k + stride).min(bins);
        let avg = buffer[k..end].iter().map(|c| c.norm()).sum::<f32>() / (end - k) as f32;
        frequencies.push((k + (end - k) / 2) as f32 * bin_hz);
        magnitudes.push(avg / n as f32);
        k = end;
    }

    SpectrumData {
        frequencies,
        magnitudes,
        degraded: false,
    }
}

/// Hann-windowed short-time magnitudes: 1024-sample frames, 512 hop,
/// first half of each frame's transform.
pub fn compute_spectrogram(samples: &[f32], sample_rate: u32) -> SpectrogramData {
    if samples.len() < SPECTROGRAM_WINDOW {
        return SpectrogramData::default();
    }
    let num_frames = (samples.len() - SPECTROGRAM_WINDOW) / SPECTROGRAM_HOP + 1;
    let bin_hz = sample_rate as f32 / SPECTROGRAM_WINDOW as f32;

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(SPECTROGRAM_WINDOW);

    let mut times = Vec::with_capacity(num_frames);
    let mut magnitudes = Vec::with_capacity(num_frames);
    for frame in 0..num_frames {
        let start = frame * SPECTROGRAM_HOP;
        let windowed = hann_window(&samples[start..start + SPECTROGRAM_WINDOW]);
        let mut buffer: Vec<Complex<f32>> =
            windowed.iter().map(|&x| Complex::new(x, 0.0)).collect();
        fft.process(&mut buffer);
        times.push(start as f32 / sample_rate as f32);
        magnitudes.push(
            buffer[..SPECTROGRAM_WINDOW / 2]
                .iter()
                .map(|c| c.norm())
                .collect(),
        );
    }

    SpectrogramData {
        times,
        frequencies: (0..SPECTROGRAM_WINDOW / 2)
            .map(|k| k as f32 * bin_hz)
            .collect(),
        magnitudes,
    }
}

/// Write the processed asset as 16-bit PCM WAV at its source rate.
pub fn export_wav(path: &Path, audio: &DecodedAudio) -> Result<(), EqError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| EqError::Processing(format!("Failed to create WAV file: {}", e)))?;
    for &sample in &audio.samples {
        let clamped = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(clamped)
            .map_err(|e| EqError::Processing(format!("Failed to write WAV sample: {}", e)))?;
    }
    writer
        .finalize()
        .map_err(|e| EqError::Processing(format!("Failed to finalize WAV file: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(start: f32, end: f32, gain: f32) -> Band {
        Band {
            id: 0,
            start_freq: start,
            end_freq: end,
            gain,
            bandwidth: end - start,
        }
    }

    fn tone(freq: f32, n: usize, sample_rate: u32) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_no_bands_passes_signal_through() {
        let samples = tone(440.0, 1024, 44100);
        let out = apply_frequency_mask(&samples, 44100, &[]);
        assert_eq!(out, samples);
    }

    #[test]
    fn test_unity_gain_roundtrip() {
        let samples = tone(440.0, 2048, 44100);
        let out = apply_frequency_mask(&samples, 44100, &[band(0.0, 22050.0, 1.0)]);
        for (a, b) in samples.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    // 4410 samples at 44.1 kHz puts bins exactly 10 Hz apart, so the test
    // tones below land on bin centers and do not leak.
    #[test]
    fn test_muting_band_silences_tone() {
        let samples = tone(1000.0, 4410, 44100);
        let out = apply_frequency_mask(&samples, 44100, &[band(800.0, 1200.0, 0.0)]);
        assert!(rms(&out) < 1e-3 * rms(&samples));
    }

    #[test]
    fn test_mask_only_touches_covered_band() {
        let mut samples = tone(500.0, 4410, 44100);
        let high = tone(5000.0, 4410, 44100);
        for (s, h) in samples.iter_mut().zip(high.iter()) {
            *s += h;
        }
        // Mute the high tone, the low one must survive
        let out = apply_frequency_mask(&samples, 44100, &[band(4000.0, 6000.0, 0.0)]);
        let low_ref = tone(500.0, 4410, 44100);
        let residual: Vec<f32> = out
            .iter()
            .zip(low_ref.iter())
            .map(|(o, l)| o - l)
            .collect();
        assert!(rms(&residual) < 1e-2 * rms(&low_ref));
    }

    #[test]
    fn test_compute_spectrum_peak_location() {
        let samples = tone(2000.0, 4410, 44100);
        let spectrum = compute_spectrum(&samples, 44100);
        assert!(!spectrum.degraded);
        let peak_idx = spectrum
            .magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert!((spectrum.frequencies[peak_idx] - 2000.0).abs() < 60.0);
    }

    #[test]
    fn test_spectrogram_dimensions() {
        let samples = tone(440.0, SPECTROGRAM_WINDOW + 3 * SPECTROGRAM_HOP, 44100);
        let gram = compute_spectrogram(&samples, 44100);
        assert_eq!(gram.times.len(), 4);
        assert_eq!(gram.frequencies.len(), SPECTROGRAM_WINDOW / 2);
        assert!(gram.magnitudes.iter().all(|f| f.len() == SPECTROGRAM_WINDOW / 2));
    }

    #[test]
    fn test_spectrogram_short_input_is_empty() {
        let gram = compute_spectrogram(&[0.0; 100], 44100);
        assert!(gram.times.is_empty());
    }

    #[test]
    fn test_engine_processes_request() {
        let (reply_tx, reply_rx) = unbounded();
        let engine = EqEngine::spawn(reply_tx);
        let source = Arc::new(DecodedAudio {
            samples: tone(440.0, 2048, 44100),
            sample_rate: 44100,
        });
        engine.dispatch(ProcessingRequest {
            token: 7,
            source,
            bands: vec![band(20.0, 60.0, 1.5)],
        });
        let response = reply_rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .unwrap();
        assert_eq!(response.token, 7);
        let processed = response.result.unwrap();
        assert_eq!(processed.audio.samples.len(), 2048);
        assert_eq!(processed.bands.len(), 1);
    }

    #[test]
    fn test_engine_rejects_empty_source() {
        let (reply_tx, reply_rx) = unbounded();
        let engine = EqEngine::spawn(reply_tx);
        engine.dispatch(ProcessingRequest {
            token: 1,
            source: Arc::new(DecodedAudio {
                samples: Vec::new(),
                sample_rate: 44100,
            }),
            bands: Vec::new(),
        });
        let response = reply_rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .unwrap();
        assert!(matches!(response.result, Err(EqError::Processing(_))));
    }
}
