use std::fs::File;
use std::path::Path;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use symphonia::core::audio::AudioBufferRef;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::probe::Hint;

use crate::error::EqError;

/// Decoded, mono, peak-normalized audio ready for the engine and playback.
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

pub struct AudioOutput {
    pub output_device: cpal::Device,
    pub output_config: cpal::StreamConfig,
}

impl AudioOutput {
    pub fn new() -> Option<Self> {
        let host = cpal::default_host();
        let output_device = host.default_output_device()?;
        let output_config = match output_device.default_output_config() {
            Ok(config) => config.into(),
            Err(err) => {
                log::error!("No usable output config: {}", err);
                return None;
            }
        };
        Some(Self {
            output_device,
            output_config,
        })
    }

    pub fn create_stream_with_callback<F>(&self, mut callback: F) -> Option<cpal::Stream>
    where
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        match self.output_device.build_output_stream(
            &self.output_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                callback(data);
            },
            |err| log::error!("Stream error: {}", err),
            None,
        ) {
            Ok(stream) => {
                if let Err(e) = stream.pause() {
                    log::error!("Failed to pause new stream: {}", e);
                }
                Some(stream)
            }
            Err(e) => {
                log::error!("Failed to create audio stream: {}", e);
                None
            }
        }
    }
}

/// Decode a file into mono f32 samples normalized to peak 1.0.
/// Multi-channel sources are averaged down; a decode failure aborts the
/// load and leaves whatever was loaded before untouched.
pub fn load_audio(path: &Path) -> Result<DecodedAudio, EqError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(path.extension().and_then(|s| s.to_str()).unwrap_or(""));

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &Default::default(), &Default::default())
        .map_err(|e| EqError::Decode(e.to_string()))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| EqError::Decode("No default track found".to_string()))?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &Default::default())
        .map_err(|e| EqError::Decode(e.to_string()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| EqError::Decode("No sample rate found".to_string()))?;

    let mut samples = Vec::new();
    while let Ok(packet) = format.next_packet() {
        let buffer = decoder
            .decode(&packet)
            .map_err(|e| EqError::Decode(e.to_string()))?;
        append_mono(&buffer, &mut samples)?;
    }

    if samples.is_empty() {
        return Err(EqError::Decode("File contains no audio frames".to_string()));
    }

    normalize_peak(&mut samples);
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

fn append_mono(buffer: &AudioBufferRef, out: &mut Vec<f32>) -> Result<(), EqError> {
    match buffer {
        AudioBufferRef::F32(buf) => {
            let planes_binding = buf.planes();
            let planes = planes_binding.planes();
            mix_planes(planes, out, |s| s);
        }
        AudioBufferRef::S32(buf) => {
            let planes_binding = buf.planes();
            let planes = planes_binding.planes();
            mix_planes(planes, out, |s| s as f32 / i32::MAX as f32);
        }
        AudioBufferRef::S16(buf) => {
            let planes_binding = buf.planes();
            let planes = planes_binding.planes();
            mix_planes(planes, out, |s| s as f32 / i16::MAX as f32);
        }
        AudioBufferRef::U8(buf) => {
            let planes_binding = buf.planes();
            let planes = planes_binding.planes();
            mix_planes(planes, out, |s| (s as f32 - 128.0) / 128.0);
        }
        _ => return Err(EqError::Decode("Unsupported sample format".to_string())),
    }
    Ok(())
}

fn mix_planes<S: Copy>(planes: &[&[S]], out: &mut Vec<f32>, convert: impl Fn(S) -> f32) {
    if planes.is_empty() {
        return;
    }
    let channels = planes.len() as f32;
    for i in 0..planes[0].len() {
        let mut acc = 0.0;
        for plane in planes.iter() {
            acc += convert(plane[i]);
        }
        out.push(acc / channels);
    }
}

fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}

/// Synthetic multi-tone test asset with 2nd and 3rd harmonics, usable
/// without any file on disk.
pub fn generate_test_signal(frequencies: &[f32], duration: f32, sample_rate: u32) -> DecodedAudio {
    let n = (sample_rate as f32 * duration) as usize;
    let mut samples = vec![0.0f32; n];
    for (i, sample) in samples.iter_mut().enumerate() {
        let t = i as f32 / sample_rate as f32;
        for &freq in frequencies {
            *sample += (2.0 * std::f32::consts::PI * freq * t).sin();
            *sample += 0.3 * (2.0 * std::f32::consts::PI * 2.0 * freq * t).sin();
            *sample += 0.1 * (2.0 * std::f32::consts::PI * 3.0 * freq * t).sin();
        }
    }
    normalize_peak(&mut samples);
    DecodedAudio {
        samples,
        sample_rate,
    }
}
