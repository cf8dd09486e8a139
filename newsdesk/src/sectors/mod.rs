use common::SectorConfig;

pub mod rotation;

pub use rotation::{RotationSnapshot, RotationState, SectorRotation};

/// Name reported by `categorize` when no sector keyword matches
pub const GENERAL_SECTOR: &str = "General";

/// Ordered sector table loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct SectorTable {
    sectors: Vec<SectorConfig>,
}

impl SectorTable {
    pub fn new(sectors: Vec<SectorConfig>) -> Self {
        Self { sectors }
    }

    pub fn sector(&self, name: &str) -> Option<&SectorConfig> {
        self.sectors.iter().find(|s| s.name == name)
    }

    /// Names of enabled sectors, in table order
    pub fn enabled_sectors(&self) -> Vec<String> {
        self.sectors
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Search tags for a sector; empty for unknown names
    pub fn sector_tags(&self, name: &str) -> &[String] {
        self.sector(name).map(|s| s.tags.as_slice()).unwrap_or(&[])
    }

    /// First sector (in table order) with a tag occurring in `query`,
    /// case-insensitively; `General` when none match
    pub fn categorize(&self, query: &str) -> &str {
        let query = query.to_lowercase();
        self.sectors
            .iter()
            .find(|s| {
                s.tags
                    .iter()
                    .any(|tag| !tag.is_empty() && query.contains(&tag.to_lowercase()))
            })
            .map(|s| s.name.as_str())
            .unwrap_or(GENERAL_SECTOR)
    }
}
