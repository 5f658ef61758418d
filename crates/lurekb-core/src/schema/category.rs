//! Knowledge categories
//!
//! Categories partition the knowledge collection. Each one has a short name used
//! by collaborators (`fish`, `spot_type`) and a collection key used in persisted
//! documents (`fish_species`, `spot_types`). Serde writes the collection key and
//! accepts either form.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Partition of the knowledge collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Fish species
    #[serde(rename = "fish_species", alias = "fish")]
    Fish,
    /// Lures (soft plastics, hard baits, metal, topwater)
    #[serde(rename = "lures", alias = "lure")]
    Lure,
    /// Rigs (Texas rig, drop shot, ...)
    #[serde(rename = "rigs", alias = "rig")]
    Rig,
    /// Spot types (bridge piers, weed edges, ...)
    #[serde(rename = "spot_types", alias = "spot_type")]
    SpotType,
    /// Concrete fishing spots
    #[serde(rename = "fishing_spots", alias = "spot")]
    Spot,
    /// Rods, reels, lines and other gear
    #[serde(rename = "equipment")]
    Equipment,
    /// Retrieval and presentation techniques
    #[serde(rename = "techniques", alias = "technique")]
    Technique,
}

impl Category {
    /// Get the short name used by collaborators
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fish => "fish",
            Self::Lure => "lure",
            Self::Rig => "rig",
            Self::SpotType => "spot_type",
            Self::Spot => "spot",
            Self::Equipment => "equipment",
            Self::Technique => "technique",
        }
    }

    /// Get the key this category is stored under in the knowledge document
    pub fn collection_key(&self) -> &'static str {
        match self {
            Self::Fish => "fish_species",
            Self::Lure => "lures",
            Self::Rig => "rigs",
            Self::SpotType => "spot_types",
            Self::Spot => "fishing_spots",
            Self::Equipment => "equipment",
            Self::Technique => "techniques",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fish => "Fish species",
            Self::Lure => "Lures",
            Self::Rig => "Rigs",
            Self::SpotType => "Spot types",
            Self::Spot => "Fishing spots",
            Self::Equipment => "Equipment",
            Self::Technique => "Techniques",
        }
    }

    /// Get all categories
    pub fn all() -> &'static [Category] {
        &[
            Self::Fish,
            Self::Lure,
            Self::Rig,
            Self::SpotType,
            Self::Spot,
            Self::Equipment,
            Self::Technique,
        ]
    }
}

impl FromStr for Category {
    type Err = Error;

    /// Parse from either the short name or the collection key
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Category::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized || c.collection_key() == normalized)
            .ok_or_else(|| Error::UnknownCategory(s.to_string()))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
