//! Configuration loading and validation.
//!
//! Layered via figment: built-in defaults, then an optional TOML file,
//! then `VELLUM_*` environment variables (double underscore as the section
//! separator, e.g. `VELLUM_UPSTREAM__LISTING_URL`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub upstream: Upstream,
    pub store: Store,
}

/// Where the tracked documents come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    /// Directory-listing probe endpoint (JSON entries with digests).
    pub listing_url: Url,
    /// Version probe endpoint (commit-style message with a patch label).
    pub version_url: Url,
    /// Fixed URL of the glossary document, which the listing never
    /// advertises but every run considers.
    pub glossary_url: Url,
    /// Pattern a listing entry's name must match to be tracked.
    pub tracked_pattern: String,
    /// Name of the cross-reference index document.
    pub index_name: String,
    /// Name of the primary reference document (re-rendered whenever the
    /// upstream version label changes, since the label is stamped into it).
    pub primary_name: String,
    /// Name the glossary document is tracked under.
    pub glossary_name: String,
}

/// Durable store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        // Infallible: literal URLs are well-formed by inspection.
        Self {
            upstream: Upstream {
                listing_url: Url::parse("https://upstream.example.org/api/doc/listing").unwrap(),
                version_url: Url::parse("https://upstream.example.org/api/version/latest").unwrap(),
                glossary_url: Url::parse("https://mirror.example.org/extra/glossary.txt").unwrap(),
                tracked_pattern: r"^[-\w]+\.txt$".to_string(),
                index_name: "xref".to_string(),
                primary_name: "manual.txt".to_string(),
                glossary_name: "glossary.txt".to_string(),
            },
            store: Store { path: default_store_path() },
        }
    }
}

fn default_store_path() -> PathBuf {
    ProjectDirs::from("", "", "vellum")
        .map(|dirs| dirs.data_dir().join("store.db"))
        .unwrap_or_else(|| PathBuf::from("vellum-store.db"))
}

impl Config {
    /// Load configuration: defaults, then `file` (if given and present),
    /// then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        let config: Self = figment
            .merge(Env::prefixed("VELLUM_").split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        debug!(listing = %config.upstream.listing_url, "configuration loaded");
        Ok(config)
    }

    /// Compiled tracked-name pattern.
    pub fn tracked_regex(&self) -> Result<Regex> {
        Regex::new(&self.upstream.tracked_pattern).or_raise(|| ErrorKind::Invalid("tracked_pattern"))
    }

    fn validate(&self) -> Result<()> {
        self.tracked_regex()?;
        for (name, field) in [
            (&self.upstream.index_name, "index_name"),
            (&self.upstream.primary_name, "primary_name"),
            (&self.upstream.glossary_name, "glossary_name"),
        ] {
            if name.is_empty() {
                exn::bail!(ErrorKind::Invalid(field));
            }
        }
        if self.upstream.index_name == self.upstream.glossary_name {
            // The index is resolved lazily outside the candidate set; the
            // glossary is always a candidate. One name can't be both.
            exn::bail!(ErrorKind::Invalid("index_name equals glossary_name"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert!(config.tracked_regex().unwrap().is_match("manual.txt"));
        assert!(!config.tracked_regex().unwrap().is_match("nested/path.txt"));
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
                [upstream]
                primary_name = "help.txt"
            "#
        )
        .unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.upstream.primary_name, "help.txt");
        // Untouched fields keep their defaults.
        assert_eq!(config.upstream.index_name, "xref");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/vellum.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
                [upstream]
                tracked_pattern = "(["
            "#
        )
        .unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid("tracked_pattern")));
    }

    #[test]
    fn index_and_glossary_names_must_differ() {
        let mut config = Config::default();
        config.upstream.glossary_name = config.upstream.index_name.clone();
        assert!(config.validate().is_err());
    }
}
