use crate::config::DocumentStyle;
use crate::error::InputError;
use crate::models::{Address, AddressInventory};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// `"<street> => <nr1>,<nr2>,..."`, optionally expanding a trailing `tr.`
pub fn address_log_line(street: &str, housenumbers: &[String], expand_abbreviation: bool) -> String {
    let street = match street.strip_suffix("tr.") {
        Some(stem) if expand_abbreviation => format!("{stem}trasse"),
        _ => street.to_string(),
    };
    format!("{} => {}", street, housenumbers.join(","))
}

pub async fn write_address_log(
    path: &Path,
    inventory: &AddressInventory,
    expand_abbreviations: bool,
) -> Result<()> {
    let mut log = String::new();
    for (street, housenumbers) in inventory.streets() {
        log.push_str(&address_log_line(street, housenumbers, expand_abbreviations));
        log.push('\n');
    }

    tokio::fs::write(path, log)
        .await
        .with_context(|| format!("Failed to write address log {}", path.display()))?;
    info!(path = %path.display(), streets = inventory.street_count(), "Wrote address log");
    Ok(())
}

/// Writes the discovered inventory twice: the address log, with abbreviations
/// expanded when asked, and the site-spelled inventory, always verbatim.
pub async fn write_discovered(
    inventory: &AddressInventory,
    address_log: &Path,
    site_inventory: &Path,
    expand_abbreviations: bool,
) -> Result<()> {
    write_address_log(address_log, inventory, expand_abbreviations).await?;
    write_address_log(site_inventory, inventory, false).await
}

/// Parses the address log; blank lines are skipped, repeated streets merged
pub fn parse_address_log(text: &str) -> AddressInventory {
    text.lines()
        .filter_map(|line| {
            let mut entries = line
                .split("=>")
                .flat_map(|part| part.split(','))
                .map(str::trim)
                .filter(|entry| !entry.is_empty());
            let street = entries.next()?.to_string();
            Some((street, entries.map(str::to_string).collect()))
        })
        .collect()
}

pub async fn read_address_log(path: &Path) -> Result<AddressInventory, InputError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| InputError::from_io(path, e))?;
    let inventory = parse_address_log(&text);
    info!(
        path = %path.display(),
        streets = inventory.street_count(),
        addresses = inventory.address_count(),
        "Loaded address log"
    );
    Ok(inventory)
}

/// One `"<street> => <housenumber>"` line per address
pub async fn write_address_lines<'a>(
    path: &Path,
    addresses: impl IntoIterator<Item = &'a Address>,
) -> Result<usize> {
    let mut text = String::new();
    let mut count = 0;
    for address in addresses {
        text.push_str(&address.to_string());
        text.push('\n');
        count += 1;
    }

    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(count)
}

/// Writes a top-level object one property at a time.
///
/// `Streaming` appends to whatever is already on disk, ends every property
/// with a comma and never writes the closing brace. `Json` truncates and
/// produces a closed object on `finish`.
pub struct DocumentWriter {
    file: File,
    path: PathBuf,
    style: DocumentStyle,
    entries: usize,
}

impl DocumentWriter {
    /// Opens `path`; `Streaming` appends to an existing document
    pub async fn create(path: &Path, style: DocumentStyle) -> Result<Self> {
        Self::open(path, style, style == DocumentStyle::Streaming).await
    }

    /// Opens `path`, discarding previous content in either style
    pub async fn create_fresh(path: &Path, style: DocumentStyle) -> Result<Self> {
        Self::open(path, style, false).await
    }

    async fn open(path: &Path, style: DocumentStyle, append: bool) -> Result<Self> {
        let file = if append {
            OpenOptions::new().create(true).append(true).open(path).await
        } else {
            File::create(path).await
        }
        .with_context(|| format!("Failed to open {}", path.display()))?;

        let fresh = file.metadata().await?.len() == 0;
        let mut writer = Self {
            file,
            path: path.to_path_buf(),
            style,
            entries: 0,
        };
        if fresh {
            writer.file.write_all(b"{\n").await?;
        }
        Ok(writer)
    }

    pub async fn write_entry<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_string_pretty(value)?;
        let key = serde_json::to_string(key)?;

        let entry = match self.style {
            DocumentStyle::Streaming => format!("{key}: {value},\n"),
            DocumentStyle::Json if self.entries == 0 => format!("{key}: {value}"),
            DocumentStyle::Json => format!(",\n{key}: {value}"),
        };

        self.file
            .write_all(entry.as_bytes())
            .await
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        self.entries += 1;
        Ok(())
    }

    /// Flushes; closes the object in `Json` style. Returns the entry count.
    pub async fn finish(mut self) -> Result<usize> {
        if self.style == DocumentStyle::Json {
            self.file.write_all(b"\n}\n").await?;
        }
        self.file.flush().await?;
        Ok(self.entries)
    }
}
