//! Resolution tiers and the height classifier.
//!
//! Tiers are looked up in [`TIER_TABLE`], a list of half-open height
//! intervals. The intervals are contiguous and start at zero, so every height
//! maps to exactly one tier and the lookup does not depend on table order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Resolution bucket a video is sorted into. Ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "LOQ")]
    Loq,
    #[serde(rename = "HD")]
    Hd,
    #[serde(rename = "FHD")]
    Fhd,
    #[serde(rename = "QHD")]
    Qhd,
    #[serde(rename = "4K")]
    Uhd4k,
}

/// Height interval `[min, max)` owned by a tier. `max == None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierBand {
    pub tier: Tier,
    pub min: u32,
    pub max: Option<u32>,
}

impl TierBand {
    pub const fn contains(&self, height: u32) -> bool {
        match self.max {
            Some(max) => height >= self.min && height < max,
            None => height >= self.min,
        }
    }
}

pub const TIER_TABLE: [TierBand; 5] = [
    TierBand {
        tier: Tier::Loq,
        min: 0,
        max: Some(720),
    },
    TierBand {
        tier: Tier::Hd,
        min: 720,
        max: Some(1080),
    },
    TierBand {
        tier: Tier::Fhd,
        min: 1080,
        max: Some(1440),
    },
    TierBand {
        tier: Tier::Qhd,
        min: 1440,
        max: Some(2160),
    },
    TierBand {
        tier: Tier::Uhd4k,
        min: 2160,
        max: None,
    },
];

impl Tier {
    pub const ALL: [Tier; 5] = [Tier::Loq, Tier::Hd, Tier::Fhd, Tier::Qhd, Tier::Uhd4k];

    /// Folder name the tier is sorted into, relative to the batch root.
    pub const fn folder_name(self) -> &'static str {
        match self {
            Tier::Loq => "LOQ",
            Tier::Hd => "HD",
            Tier::Fhd => "FHD",
            Tier::Qhd => "QHD",
            Tier::Uhd4k => "4K",
        }
    }

    pub fn band(self) -> TierBand {
        TIER_TABLE[self as usize]
    }

    /// Tier whose interval contains `height`.
    pub fn for_height(height: u32) -> Tier {
        // Bands are sorted by `min` and the first starts at 0.
        let idx = TIER_TABLE.partition_point(|band| band.min <= height);
        TIER_TABLE[idx - 1].tier
    }

    pub fn from_folder_name(name: &str) -> Option<Tier> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.folder_name() == name)
    }

    /// One-line legend, e.g. `<720p→LOQ | >=720p→HD | ...`.
    pub fn legend() -> String {
        TIER_TABLE
            .iter()
            .map(|band| match band.min {
                0 => format!("<{}p→{}", band.max.unwrap_or(0), band.tier),
                min => format!(">={}p→{}", min, band.tier),
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Tier::from_folder_name(&upper).ok_or_else(|| format!("unknown tier '{s}'"))
    }
}

/// Classify a probed height. An absent height has no tier.
pub fn classify(height: Option<u32>) -> Option<Tier> {
    height.map(Tier::for_height)
}
