use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Layout of generated JSON-ish documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentStyle {
    /// Append-only properties with trailing commas, never closed
    #[default]
    Streaming,
    /// A closed, valid JSON object
    Json,
}

/// Input and output files, named like the files the site tooling always used
#[derive(Debug, Clone)]
pub struct Paths {
    /// Street names with a trailing `tr.` expanded, for reading and matching
    pub address_log: PathBuf,
    /// Street names exactly as the site lists them; what `scrape` queries with
    pub site_inventory: PathBuf,
    pub footprints: PathBuf,
    pub rent_index: PathBuf,
    pub footprint_echo: PathBuf,
    pub missing: PathBuf,
    pub present: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            address_log: "Mietspiegel_StrassenamenUndHausnummern.log".into(),
            site_inventory: "Mietspiegel_Strassenverzeichnis.log".into(),
            footprints: "Mietspiegel_OSMBuildings.json".into(),
            rent_index: "Mietspiegel_Datensätze.json".into(),
            footprint_echo: "Mietspiegel_StrassenamenUndHausnummern_OSM.json".into(),
            missing: "Mietspiegel_Missing_StrassenamenUndHausnummern.json".into(),
            present: "Mietspiegel_Vorhandene_StrassenamenUndHausnummern.json".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Per-request timeout
    pub timeout: Duration,
    /// Upper bound on concurrently running HTTP workers
    pub max_concurrency: usize,
    pub accept_invalid_certs: bool,
    pub document_style: DocumentStyle,
    /// Rewrite a trailing `tr.` to `trasse` when writing the address log
    pub expand_abbreviations: bool,
    pub paths: Paths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            host: "mietspiegel.jena.de".to_string(),
            port: 443,
            timeout: Duration::from_secs(30),
            max_concurrency: 8,
            accept_invalid_certs: false,
            document_style: DocumentStyle::Streaming,
            expand_abbreviations: true,
            paths: Paths::default(),
        }
    }
}

impl Config {
    /// Defaults overlaid with the optional `MIETSPIEGEL_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("MIETSPIEGEL_HOST") {
            cfg.host = host;
        }
        if let Some(port) = env_parse("MIETSPIEGEL_PORT")? {
            cfg.port = port;
        }
        if let Some(secs) = env_parse("MIETSPIEGEL_TIMEOUT_SECS")? {
            cfg.timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = env_parse("MIETSPIEGEL_CONCURRENCY")? {
            cfg.max_concurrency = limit;
        }

        Ok(cfg)
    }

    pub fn validate(self) -> Result<Self> {
        if self.max_concurrency == 0 {
            bail!("Concurrency must be greater than 0");
        }
        if self.timeout.is_zero() {
            bail!("Timeout must be greater than 0");
        }
        if self.host.trim().is_empty() {
            bail!("Host must not be empty");
        }
        Ok(self)
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {name}: {raw:?}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_jena() {
        let cfg = Config::default();
        assert_eq!(cfg.base_url(), "https://mietspiegel.jena.de:443");
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.document_style, DocumentStyle::Streaming);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let cfg = Config {
            max_concurrency: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_env_parse_reports_bad_values() {
        env::set_var("MIETSPIEGEL_TEST_BAD_NUMBER", "many");
        let parsed: Result<Option<usize>> = env_parse("MIETSPIEGEL_TEST_BAD_NUMBER");
        assert!(parsed.is_err());

        let missing: Option<usize> = env_parse("MIETSPIEGEL_TEST_UNSET_VARIABLE").unwrap();
        assert!(missing.is_none());
    }
}
