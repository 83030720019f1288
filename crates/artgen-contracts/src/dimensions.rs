use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output sizes must stay aligned to this many pixels for the downstream models.
pub const DIMENSION_ALIGNMENT: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "9:16")]
    Tall,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait,
        AspectRatio::Landscape,
        AspectRatio::Wide,
        AspectRatio::Tall,
    ];

    pub fn key(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Wide => "16:9",
            AspectRatio::Tall => "9:16",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        let normalized = raw.trim().replace(['x', 'X', '/'], ":");
        Self::ALL
            .into_iter()
            .find(|ratio| ratio.key() == normalized)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| {
            format!("Unsupported aspect ratio '{s}'; expected one of 1:1, 3:4, 4:3, 16:9, 9:16.")
        })
    }
}

/// Sizing family of a model. Only `GeminiPro` looks at the resolution tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionFamily {
    Standard,
    Anime,
    Seedream,
    GeminiPro,
}

impl FromStr for DimensionFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "standard" => Ok(DimensionFamily::Standard),
            "anime" => Ok(DimensionFamily::Anime),
            "seedream" => Ok(DimensionFamily::Seedream),
            "geminipro" => Ok(DimensionFamily::GeminiPro),
            _ => Err(format!(
                "Unknown dimension family '{s}'; expected standard, anime, seedream or gemini-pro."
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResolutionTier {
    #[default]
    #[serde(rename = "1k")]
    OneK,
    #[serde(rename = "2k")]
    TwoK,
    #[serde(rename = "4k")]
    FourK,
}

impl ResolutionTier {
    pub fn key(self) -> &'static str {
        match self {
            ResolutionTier::OneK => "1k",
            ResolutionTier::TwoK => "2k",
            ResolutionTier::FourK => "4k",
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ResolutionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1k" => Ok(ResolutionTier::OneK),
            "2k" => Ok(ResolutionTier::TwoK),
            "4k" => Ok(ResolutionTier::FourK),
            _ => Err(format!("Unknown resolution tier '{s}'; expected 1k, 2k or 4k.")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_aligned(&self) -> bool {
        self.width % DIMENSION_ALIGNMENT == 0 && self.height % DIMENSION_ALIGNMENT == 0
    }

    /// Scales both sides and snaps them to the alignment grid.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            width: snap_multiple((self.width as f64 * factor).round() as u32, DIMENSION_ALIGNMENT),
            height: snap_multiple(
                (self.height as f64 * factor).round() as u32,
                DIMENSION_ALIGNMENT,
            ),
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// Rows follow AspectRatio::ALL order.
const STANDARD: [Dimensions; 5] = [
    Dimensions::new(1024, 1024),
    Dimensions::new(768, 1024),
    Dimensions::new(1024, 768),
    Dimensions::new(1280, 720),
    Dimensions::new(720, 1280),
];

const ANIME: [Dimensions; 5] = [
    Dimensions::new(1280, 1280),
    Dimensions::new(1080, 1440),
    Dimensions::new(1440, 1080),
    Dimensions::new(1920, 1080),
    Dimensions::new(1080, 1920),
];

const SEEDREAM: [Dimensions; 5] = [
    Dimensions::new(2048, 2048),
    Dimensions::new(1536, 2048),
    Dimensions::new(2048, 1536),
    Dimensions::new(2560, 1440),
    Dimensions::new(1440, 2560),
];

const GEMINI_PRO_2K: [Dimensions; 5] = SEEDREAM;

const GEMINI_PRO_4K: [Dimensions; 5] = [
    Dimensions::new(4096, 4096),
    Dimensions::new(3072, 4096),
    Dimensions::new(4096, 3072),
    Dimensions::new(5120, 2880),
    Dimensions::new(2880, 5120),
];

fn row_index(aspect: AspectRatio) -> usize {
    match aspect {
        AspectRatio::Square => 0,
        AspectRatio::Portrait => 1,
        AspectRatio::Landscape => 2,
        AspectRatio::Wide => 3,
        AspectRatio::Tall => 4,
    }
}

pub fn resolve_dimensions(
    aspect: AspectRatio,
    family: DimensionFamily,
    tier: Option<ResolutionTier>,
) -> Dimensions {
    let row = row_index(aspect);
    match family {
        DimensionFamily::Standard => STANDARD[row],
        DimensionFamily::Anime => ANIME[row],
        DimensionFamily::Seedream => SEEDREAM[row],
        DimensionFamily::GeminiPro => match tier.unwrap_or_default() {
            ResolutionTier::OneK => STANDARD[row],
            ResolutionTier::TwoK => GEMINI_PRO_2K[row],
            ResolutionTier::FourK => GEMINI_PRO_4K[row],
        },
    }
}

pub fn snap_multiple(value: u32, multiple: u32) -> u32 {
    if multiple <= 1 {
        return value.max(1);
    }
    let rounded = ((value as f64 / multiple as f64).round() as u32) * multiple;
    rounded.max(multiple)
}
