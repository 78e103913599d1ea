// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::{
    fs::File,
    io::Read,
    thread,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Engine options.
mod engine_config {
    pub const SECTION_NAME: &str = "engine";
    // Number of worker threads servicing the ready queue.
    pub const WORKER_THREADS: &str = "worker_threads";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

/// Common associated functions for the engine configuration object.
impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: String) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)?.read_to_string(&mut config_s)?;
        Self::load_from_str(&config_s)
    }

    /// Parses a configuration document into a [Config] object.
    pub fn load_from_str(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = match YamlLoader::load_from_str(config_s) {
            Ok(config) => config,
            Err(_) => return Err(Fail::new(libc::EINVAL, "Invalid config file")),
        };
        let config_obj: &Yaml = match &config[..] {
            [c] => c,
            _ => return Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        };
        Ok(Self(config_obj.clone()))
    }

    /// Returns the configured number of worker threads, falling back to the machine's available parallelism when the
    /// option (or the whole engine section) is absent.
    pub fn worker_threads(&self) -> Result<usize, Fail> {
        let section: &Yaml = &self.0[engine_config::SECTION_NAME];
        let option: &Yaml = &section[engine_config::WORKER_THREADS];
        match option {
            Yaml::BadValue => Ok(Self::default_worker_threads()),
            Yaml::Integer(n) if *n > 0 => Ok(*n as usize),
            _ => Err(Fail::new(libc::EINVAL, "Couldn't parse worker_threads")),
        }
    }

    fn default_worker_threads() -> usize {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
