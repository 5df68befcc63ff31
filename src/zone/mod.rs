mod parser;

pub use parser::ZoneParser;

use crate::dns::DNSResource;
use crate::error::Result;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Fixed records loaded from zone files at startup. Served verbatim, by name,
/// ahead of the transmission API.
#[derive(Debug, Default)]
pub struct FixedZone {
    records: HashMap<String, Vec<DNSResource>>,
}

impl FixedZone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse each file and merge its records
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut zone = Self::new();
        for path in paths {
            let path = path.as_ref();
            let contents = std::fs::read_to_string(path)?;
            let count = zone.load(&contents)?;
            info!("Loaded {} fixed records from {}", count, path.display());
        }
        Ok(zone)
    }

    pub fn load(&mut self, contents: &str) -> Result<usize> {
        let records = ZoneParser::new().parse(contents)?;
        let count = records.len();
        for rr in records {
            self.records
                .entry(rr.name().to_lowercase())
                .or_default()
                .push(rr);
        }
        Ok(count)
    }

    /// All records under `name`, any type, or None
    pub fn lookup(&self, name: &str) -> Option<&[DNSResource]> {
        self.records
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
