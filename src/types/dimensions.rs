use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    /// Total parse: anything that is not a known token is treated as `1:1`.
    pub fn parse(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some("16:9") => Self::Landscape,
            Some("9:16") => Self::Portrait,
            _ => Self::Square,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }
}

impl<'de> Deserialize<'de> for AspectRatio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(Self::parse(raw.as_deref()))
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `WIDTHxHEIGHT`, the form the OpenAI images endpoint expects.
    pub fn size_string(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Pixel sizes a provider accepts for each aspect ratio.
///
/// Providers cap resolution differently, so every provider carries its own
/// table instead of sharing one base edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionTable {
    pub square: Dimensions,
    pub landscape: Dimensions,
    pub portrait: Dimensions,
}

impl DimensionTable {
    pub const fn new(square: Dimensions, landscape: Dimensions, portrait: Dimensions) -> Self {
        Self {
            square,
            landscape,
            portrait,
        }
    }

    pub fn resolve(&self, ratio: AspectRatio) -> Dimensions {
        match ratio {
            AspectRatio::Square => self.square,
            AspectRatio::Landscape => self.landscape,
            AspectRatio::Portrait => self.portrait,
        }
    }
}

pub const HUGGINGFACE_DIMENSIONS: DimensionTable = DimensionTable::new(
    Dimensions::new(768, 768),
    Dimensions::new(1024, 576),
    Dimensions::new(576, 1024),
);

pub const STABILITY_DIMENSIONS: DimensionTable = DimensionTable::new(
    Dimensions::new(1024, 1024),
    Dimensions::new(1536, 640),
    Dimensions::new(640, 1536),
);

pub const OPENAI_DIMENSIONS: DimensionTable = DimensionTable::new(
    Dimensions::new(1024, 1024),
    Dimensions::new(1792, 1024),
    Dimensions::new(1024, 1792),
);

pub const REPLICATE_DIMENSIONS: DimensionTable = DimensionTable::new(
    Dimensions::new(1024, 1024),
    Dimensions::new(1024, 576),
    Dimensions::new(576, 1024),
);
