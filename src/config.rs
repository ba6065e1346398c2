// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::Path;

use config::{File, FileFormat};
use serde::Deserialize;

mod audio;
mod engine;
mod error;

pub use self::audio::Audio;
pub use self::engine::Engine;
pub use self::error::ConfigError;

/// The top level configuration file.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    /// Chip timing and sequence settings.
    engine: Option<Engine>,

    /// The output device.
    audio: Option<Audio>,
}

impl Config {
    /// Parse a configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Config, ConfigError> {
        Ok(config::Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Config>()?)
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Config, ConfigError> {
        Ok(config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Config>()?)
    }

    /// Loads the given file, or the defaults if there is none.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Config::deserialize(path),
            None => Ok(Config::default()),
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine.clone().unwrap_or_default()
    }

    pub fn audio(&self) -> Audio {
        self.audio.clone().unwrap_or_default()
    }

    pub fn set_engine(&mut self, engine: Engine) {
        self.engine = Some(engine);
    }

    pub fn set_audio(&mut self, audio: Audio) {
        self.audio = Some(audio);
    }
}
