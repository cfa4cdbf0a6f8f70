use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bands::Band;
use crate::error::EqError;

#[derive(Serialize, Deserialize)]
struct PresetFile {
    bands: Vec<Band>,
}

/// Named band collections. The controller only depends on this shape;
/// this crate ships a JSON-file store, anything else can slot in behind
/// the trait.
pub trait PresetStore {
    fn save(&self, name: &str, bands: &[Band]) -> Result<(), EqError>;
    fn load(&self, name: &str) -> Result<Vec<Band>, EqError>;
    fn list(&self) -> Vec<String>;
    fn delete(&self, name: &str) -> Result<(), EqError>;
}

/// One JSON file per preset under `~/.abeq/presets/`. A few built-in
/// band sets are always available under fixed names; a saved preset with
/// the same name shadows the built-in.
pub struct JsonPresetStore {
    root: PathBuf,
}

impl Default for JsonPresetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonPresetStore {
    pub fn new() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self {
            root: Path::new(&home).join(".abeq").join("presets"),
        }
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn preset_path(&self, name: &str) -> Result<PathBuf, EqError> {
        if name.is_empty() || name.contains(['/', '\\', '.']) {
            return Err(EqError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid preset name: {:?}", name),
            )));
        }
        Ok(self.root.join(format!("{}.json", name)))
    }
}

impl PresetStore for JsonPresetStore {
    fn save(&self, name: &str, bands: &[Band]) -> Result<(), EqError> {
        let path = self.preset_path(name)?;
        fs::create_dir_all(&self.root)?;
        let serialized = serde_json::to_string_pretty(&PresetFile {
            bands: bands.to_vec(),
        })
        .map_err(|e| EqError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        fs::write(path, serialized)?;
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Vec<Band>, EqError> {
        let path = self.preset_path(name)?;
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let preset: PresetFile = serde_json::from_str(&contents)
                    .map_err(|e| EqError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
                Ok(preset.bands)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                builtin_preset(name).ok_or(EqError::Io(err))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_NAMES.iter().map(|s| s.to_string()).collect();
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        if !names.iter().any(|n| n == stem) {
                            names.push(stem.to_string());
                        }
                    }
                }
            }
        }
        names.sort();
        names
    }

    /// Removes the saved file. A built-in name with no saved file over it
    /// cannot be deleted; deleting the file over a built-in un-shadows it.
    fn delete(&self, name: &str) -> Result<(), EqError> {
        let path = self.preset_path(name)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let msg = if builtin_preset(name).is_some() {
                    format!("Built-in preset {:?} cannot be deleted", name)
                } else {
                    format!("No saved preset named {:?}", name)
                };
                Err(EqError::Io(io::Error::new(io::ErrorKind::InvalidInput, msg)))
            }
            Err(err) => Err(err.into()),
        }
    }
}

const BUILTIN_NAMES: [&str; 3] = ["instruments", "voices", "animals"];

fn make_bands(ranges: &[(f32, f32)]) -> Vec<Band> {
    ranges
        .iter()
        .map(|&(start_freq, end_freq)| Band {
            id: 0,
            start_freq,
            end_freq,
            gain: 1.0,
            bandwidth: end_freq - start_freq,
        })
        .collect()
}

/// Starter band sets covering common source material, available even
/// with an empty store.
fn builtin_preset(name: &str) -> Option<Vec<Band>> {
    match name {
        "instruments" => Some(make_bands(&[
            (80.0, 300.0),
            (1000.0, 2000.0),
            (4000.0, 6000.0),
        ])),
        "voices" => Some(make_bands(&[
            (85.0, 180.0),
            (165.0, 255.0),
            (250.0, 400.0),
        ])),
        "animals" => Some(make_bands(&[
            (500.0, 1500.0),
            (2000.0, 8000.0),
            (8000.0, 16000.0),
        ])),
        _ => None,
    }
}
