// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Locating and reading `atu-rs.toml`.
//!
//! One file may carry sections for several programs. A loader is bound to one
//! section and remembers every candidate it looked at, so a file that exists
//! but lacks the section can be reported instead of silently skipped.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "atu-rs.toml";
/// Environment variable naming a config file to try before the search path.
pub const CONFIG_PATH_ENV: &str = "ATU_RS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("{path} has no [{section}] section")]
    MissingSection { path: PathBuf, section: &'static str },
}

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// Nothing usable on the search path; built-in defaults apply.
    Defaults {
        /// Files that exist but lack the section.
        skipped: Vec<PathBuf>,
    },
}

#[derive(Debug)]
pub struct Loaded<T> {
    pub config: T,
    pub origin: ConfigOrigin,
}

/// Reads one named section out of `atu-rs.toml` candidates.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    section: &'static str,
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Loader over `$ATU_RS_CONFIG`, `./atu-rs.toml`,
    /// `$XDG_CONFIG_HOME/atu-rs/atu-rs.toml` and `/etc/atu-rs/atu-rs.toml`.
    pub fn new(section: &'static str) -> Self {
        let mut search_paths = Vec::new();
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            search_paths.push(PathBuf::from(path));
        }
        search_paths.push(PathBuf::from(CONFIG_FILE_NAME));
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("atu-rs").join(CONFIG_FILE_NAME));
        }
        search_paths.push(Path::new("/etc/atu-rs").join(CONFIG_FILE_NAME));
        Self {
            section,
            search_paths,
        }
    }

    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Load the section from `path`. A missing section is an error here,
    /// since the file was named explicitly.
    pub fn load_file<T: DeserializeOwned>(&self, path: &Path) -> Result<T, ConfigError> {
        self.read_section(path)?
            .ok_or_else(|| ConfigError::MissingSection {
                path: path.to_path_buf(),
                section: self.section,
            })
    }

    /// Load from the first candidate that carries the section.
    pub fn discover<T: DeserializeOwned + Default>(&self) -> Result<Loaded<T>, ConfigError> {
        let mut skipped = Vec::new();
        for path in &self.search_paths {
            if !path.is_file() {
                continue;
            }
            match self.read_section(path)? {
                Some(config) => {
                    return Ok(Loaded {
                        config,
                        origin: ConfigOrigin::File(path.clone()),
                    })
                }
                None => skipped.push(path.clone()),
            }
        }
        Ok(Loaded {
            config: T::default(),
            origin: ConfigOrigin::Defaults { skipped },
        })
    }

    fn read_section<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };
        let mut table: toml::Table =
            toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?;
        match table.remove(self.section) {
            Some(section) => section
                .try_into::<T>()
                .map(Some)
                .map_err(|e| parse_error(format!("[{}]: {}", self.section, e))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Station {
        url: String,
        port: u16,
    }

    fn loader(paths: Vec<PathBuf>) -> ConfigLoader {
        ConfigLoader::new("station").with_search_paths(paths)
    }

    #[test]
    fn section_fields_get_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[other]\nport = 1\n\n[station]\nurl = \"http://radio.local\"\n").unwrap();

        let station: Station = loader(vec![]).load_file(&path).unwrap();
        assert_eq!(
            station,
            Station {
                url: "http://radio.local".to_string(),
                port: 0
            }
        );
    }

    #[test]
    fn named_file_without_section_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[other]\nport = 1\n").unwrap();

        let err = loader(vec![]).load_file::<Station>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection { section: "station", .. }));
        assert!(err.to_string().contains("[station]"));
    }

    #[test]
    fn bad_values_name_the_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[station]\nport = \"many\"\n").unwrap();

        let err = loader(vec![]).load_file::<Station>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("[station]"));

        fs::write(&path, "[station\nurl = ").unwrap();
        assert!(matches!(
            loader(vec![]).load_file::<Station>(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn unreadable_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(matches!(
            loader(vec![]).load_file::<Station>(&path),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn discovery_skips_files_without_the_section() {
        let dir = tempfile::tempdir().unwrap();
        let foreign = dir.path().join("first.toml");
        let ours = dir.path().join("second.toml");
        fs::write(&foreign, "[someone-else]\nx = 1\n").unwrap();
        fs::write(&ours, "[station]\nport = 8080\n").unwrap();

        let loaded: Loaded<Station> = loader(vec![
            dir.path().join("absent.toml"),
            foreign.clone(),
            ours.clone(),
        ])
        .discover()
        .unwrap();
        assert_eq!(loaded.config.port, 8080);
        assert_eq!(loaded.origin, ConfigOrigin::File(ours));
    }

    #[test]
    fn discovery_falls_back_to_defaults_and_reports_skips() {
        let dir = tempfile::tempdir().unwrap();
        let foreign = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&foreign, "[someone-else]\nx = 1\n").unwrap();

        let loaded: Loaded<Station> = loader(vec![foreign.clone(), dir.path().join("absent.toml")])
            .discover()
            .unwrap();
        assert_eq!(loaded.config, Station::default());
        assert_eq!(
            loaded.origin,
            ConfigOrigin::Defaults {
                skipped: vec![foreign]
            }
        );
    }

    #[test]
    fn default_search_ends_in_etc() {
        let loader = ConfigLoader::new("station");
        assert!(loader.search_paths().contains(&PathBuf::from(CONFIG_FILE_NAME)));
        assert_eq!(
            loader.search_paths().last(),
            Some(&PathBuf::from("/etc/atu-rs/atu-rs.toml"))
        );
    }
}
