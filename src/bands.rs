use serde::{Deserialize, Serialize};

use crate::error::EqError;

pub const MIN_GAIN: f32 = 0.0;
pub const MAX_GAIN: f32 = 2.0;

/// A frequency interval with a multiplicative linear gain.
/// Gain 0.0 mutes the interval, 1.0 leaves it untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub id: u64,
    pub start_freq: f32,
    pub end_freq: f32,
    pub gain: f32,
    pub bandwidth: f32,
}

impl Band {
    pub fn contains(&self, freq: f32) -> bool {
        freq >= self.start_freq && freq <= self.end_freq
    }
}

/// Ordered collection of bands. Insertion order is display order;
/// ids are unique and never reused within one store.
pub struct BandStore {
    bands: Vec<Band>,
    next_id: u64,
    revision: u64,
}

impl Default for BandStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BandStore {
    pub fn new() -> Self {
        Self {
            bands: Vec::new(),
            next_id: 0,
            revision: 0,
        }
    }

    /// Bumped on every mutation. The scheduler compares this against the
    /// revision it last dispatched for, instead of a callback subscription.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn add_band(
        &mut self,
        start_freq: f32,
        end_freq: f32,
        gain: f32,
        bandwidth: Option<f32>,
    ) -> Result<u64, EqError> {
        if !(start_freq >= 0.0 && start_freq < end_freq) {
            return Err(EqError::InvalidRange {
                start_freq,
                end_freq,
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.bands.push(Band {
            id,
            start_freq,
            end_freq,
            gain: gain.clamp(MIN_GAIN, MAX_GAIN),
            bandwidth: bandwidth.unwrap_or(end_freq - start_freq),
        });
        self.revision += 1;
        Ok(id)
    }

    /// Removing a band that is already gone is not an error.
    pub fn remove_band(&mut self, id: u64) {
        let before = self.bands.len();
        self.bands.retain(|b| b.id != id);
        if self.bands.len() != before {
            self.revision += 1;
        }
    }

    pub fn set_gain(&mut self, id: u64, gain: f32) -> Result<(), EqError> {
        match self.bands.iter_mut().find(|b| b.id == id) {
            Some(band) => {
                band.gain = gain.clamp(MIN_GAIN, MAX_GAIN);
                self.revision += 1;
                Ok(())
            }
            None => Err(EqError::UnknownBand(id)),
        }
    }

    pub fn set_range(&mut self, id: u64, start_freq: f32, end_freq: f32) -> Result<(), EqError> {
        if !(start_freq >= 0.0 && start_freq < end_freq) {
            return Err(EqError::InvalidRange {
                start_freq,
                end_freq,
            });
        }
        match self.bands.iter_mut().find(|b| b.id == id) {
            Some(band) => {
                band.start_freq = start_freq;
                band.end_freq = end_freq;
                band.bandwidth = end_freq - start_freq;
                self.revision += 1;
                Ok(())
            }
            None => Err(EqError::UnknownBand(id)),
        }
    }

    /// Immutable copy for the scheduler to ship with a processing request.
    pub fn snapshot(&self) -> Vec<Band> {
        self.bands.clone()
    }

    /// Replace the whole collection (preset load). Ids are reassigned so
    /// uniqueness survives repeated loads.
    pub fn replace_all(&mut self, bands: Vec<Band>) {
        self.bands = bands;
        for band in &mut self.bands {
            band.id = self.next_id;
            self.next_id += 1;
        }
        self.revision += 1;
    }
}
