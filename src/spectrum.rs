use spectrum_analyzer::scaling::divide_by_N;
use spectrum_analyzer::windows::hann_window;
use spectrum_analyzer::{samples_fft_to_spectrum, FrequencyLimit};

use crate::bands::Band;
use crate::error::EqError;

/// 1-D spectrum payload for one chart. `degraded` marks the local PCM
/// approximation used while no authoritative engine result is available;
/// the UI must label it, never present it as the real thing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectrumData {
    pub frequencies: Vec<f32>,
    pub magnitudes: Vec<f32>,
    pub degraded: bool,
}

/// 2-D spectrogram payload: `magnitudes[frame][bin]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectrogramData {
    pub times: Vec<f32>,
    pub frequencies: Vec<f32>,
    pub magnitudes: Vec<Vec<f32>>,
}

/// Display scale of the frequency axis. Payloads are cached on the
/// linear scale; the mapping is applied at render time, so switching
/// scales never needs the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrequencyScale {
    #[default]
    Linear,
    /// The log-like scale of clinical hearing charts: every 1200 Hz on
    /// the linear axis doubles the display frequency, starting at 20 Hz.
    Audiogram,
}

impl FrequencyScale {
    pub fn label(self) -> &'static str {
        match self {
            FrequencyScale::Linear => "Linear",
            FrequencyScale::Audiogram => "Audiogram",
        }
    }

    /// Map a linear-axis frequency onto this scale's display axis.
    pub fn map(self, freq: f32) -> f32 {
        match self {
            FrequencyScale::Linear => freq,
            FrequencyScale::Audiogram => 20.0 * (freq / 1200.0).exp2(),
        }
    }

    pub fn map_all(self, frequencies: &[f32]) -> Vec<f32> {
        frequencies.iter().map(|&f| self.map(f)).collect()
    }
}

/// Last-known spectral payloads for both charts, kept so a view-scale
/// change can re-render without waiting for the engine again.
#[derive(Default)]
pub struct SpectrumCache {
    pub input_spectrum: SpectrumData,
    pub output_spectrum: SpectrumData,
    pub input_spectrogram: SpectrogramData,
    pub output_spectrogram: SpectrogramData,
}

impl SpectrumCache {
    pub fn has_authoritative_data(&self) -> bool {
        !self.input_spectrum.frequencies.is_empty() && !self.input_spectrum.degraded
    }
}

/// Local preview of what the engine will do: every band containing a
/// frequency multiplies that sample's magnitude by its gain. Overlapping
/// bands compose multiplicatively, same as the engine's frequency mask.
pub fn weighted_spectrum(frequencies: &[f32], magnitudes: &[f32], bands: &[Band]) -> Vec<f32> {
    frequencies
        .iter()
        .zip(magnitudes.iter())
        .map(|(&freq, &mag)| {
            let mut weighted = mag;
            for band in bands {
                if band.contains(freq) {
                    weighted *= band.gain;
                }
            }
            weighted
        })
        .collect()
}

/// Degraded local spectrum straight from PCM samples, used when the engine
/// is unreachable. Hann window over the largest power-of-two prefix the
/// FFT accepts, magnitudes scaled by 1/N.
pub fn fallback_spectrum(samples: &[f32], sample_rate: u32) -> Result<SpectrumData, EqError> {
    let cap = samples.len().min(4096);
    if cap < 2 {
        return Err(EqError::Processing(
            "Not enough samples for a fallback spectrum".to_string(),
        ));
    }
    let window_len = if cap.is_power_of_two() {
        cap
    } else {
        cap.next_power_of_two() / 2
    };

    let windowed = hann_window(&samples[..window_len]);
    let spectrum = samples_fft_to_spectrum(
        &windowed,
        sample_rate,
        FrequencyLimit::All,
        Some(&divide_by_N),
    )
    .map_err(|e| EqError::Processing(format!("Fallback spectrum failed: {:?}", e)))?;

    let mut frequencies = Vec::with_capacity(spectrum.data().len());
    let mut magnitudes = Vec::with_capacity(spectrum.data().len());
    for (freq, value) in spectrum.data().iter() {
        frequencies.push(freq.val());
        magnitudes.push(value.val());
    }
    Ok(SpectrumData {
        frequencies,
        magnitudes,
        degraded: true,
    })
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

    #[test]
    fn test_weighted_spectrum_single_band() {
        let weighted = weighted_spectrum(
            &[10.0, 40.0, 80.0],
            &[1.0, 1.0, 1.0],
            &[band(20.0, 60.0, 1.5)],
        );
        assert_eq!(weighted, vec![1.0, 1.5, 1.0]);
    }

    #[test]
    fn test_weighted_spectrum_overlapping_bands_compose() {
        let weighted = weighted_spectrum(
            &[50.0],
            &[2.0],
            &[band(20.0, 60.0, 0.5), band(40.0, 100.0, 2.0)],
        );
        assert_eq!(weighted, vec![2.0]);
    }

    #[test]
    fn test_weighted_spectrum_band_edges_inclusive() {
        let weighted = weighted_spectrum(
            &[20.0, 60.0],
            &[1.0, 1.0],
            &[band(20.0, 60.0, 2.0)],
        );
        assert_eq!(weighted, vec![2.0, 2.0]);
    }

    #[test]
    fn test_weighted_spectrum_no_bands_is_identity() {
        let mags = [0.25, 0.5, 0.75];
        let weighted = weighted_spectrum(&[1.0, 2.0, 3.0], &mags, &[]);
        assert_eq!(weighted, mags.to_vec());
    }

    #[test]
    fn test_audiogram_scale_doubles_every_1200_hz() {
        let scale = FrequencyScale::Audiogram;
        assert_eq!(scale.map(0.0), 20.0);
        assert!((scale.map(1200.0) - 40.0).abs() < 1e-3);
        assert!((scale.map(2400.0) - 80.0).abs() < 1e-3);
        assert!((scale.map(3600.0) - 160.0).abs() < 1e-3);
    }

    #[test]
    fn test_audiogram_scale_preserves_ordering() {
        let mapped = FrequencyScale::Audiogram.map_all(&[0.0, 100.0, 1000.0, 10000.0, 22050.0]);
        assert!(mapped.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_linear_scale_is_identity() {
        let freqs = [0.0, 440.0, 22050.0];
        assert_eq!(FrequencyScale::Linear.map_all(&freqs), freqs.to_vec());
    }

    #[test]
    fn test_fallback_spectrum_is_marked_degraded() {
        let samples: Vec<f32> = (0..2048)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let spectrum = fallback_spectrum(&samples, 44100).unwrap();
        assert!(spectrum.degraded);
        assert_eq!(spectrum.frequencies.len(), spectrum.magnitudes.len());
        assert!(!spectrum.frequencies.is_empty());
    }

    #[test]
    fn test_fallback_spectrum_rejects_tiny_input() {
        assert!(fallback_spectrum(&[0.5], 44100).is_err());
    }

    #[test]
    fn test_fallback_spectrum_peaks_near_tone() {
        let samples: Vec<f32> = (0..4096)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 44100.0).sin())
            .collect();
        let spectrum = fallback_spectrum(&samples, 44100).unwrap();
        let peak_idx = spectrum
            .magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        let peak_freq = spectrum.frequencies[peak_idx];
        assert!((peak_freq - 1000.0).abs() < 50.0, "peak at {}", peak_freq);
    }
}
