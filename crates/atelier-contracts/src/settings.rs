use anyhow::bail;
use serde::Serialize;

/// Render settings for the final look. Pose renders ignore these and pin
/// their own size and ratio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShootSettings {
    pub camera_angle: CameraAngle,
    pub resolution: Resolution,
    pub aspect_ratio: AspectRatio,
    pub style_prompt: String,
}

pub const DEFAULT_STYLE_PROMPT: &str =
    "Professional studio lighting, 8k resolution, photorealistic, high fashion";

impl Default for ShootSettings {
    fn default() -> Self {
        Self {
            camera_angle: CameraAngle::EyeLevel,
            resolution: Resolution::OneK,
            aspect_ratio: AspectRatio::Portrait,
            style_prompt: DEFAULT_STYLE_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CameraAngle {
    #[serde(rename = "Eye Level")]
    EyeLevel,
    #[serde(rename = "Low Angle (Heroic)")]
    LowAngle,
    #[serde(rename = "High Angle")]
    HighAngle,
    #[serde(rename = "Dutch Angle (Dynamic)")]
    DutchAngle,
    #[serde(rename = "Side Profile")]
    SideProfile,
}

impl CameraAngle {
    pub const ALL: [CameraAngle; 5] = [
        CameraAngle::EyeLevel,
        CameraAngle::LowAngle,
        CameraAngle::HighAngle,
        CameraAngle::DutchAngle,
        CameraAngle::SideProfile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CameraAngle::EyeLevel => "Eye Level",
            CameraAngle::LowAngle => "Low Angle (Heroic)",
            CameraAngle::HighAngle => "High Angle",
            CameraAngle::DutchAngle => "Dutch Angle (Dynamic)",
            CameraAngle::SideProfile => "Side Profile",
        }
    }

    pub fn parse(input: &str) -> anyhow::Result<Self> {
        // Display strings carry a parenthetical qualifier; drop it before
        // matching so "Low Angle (Heroic)" and "low angle" both land.
        let normalized = input.trim().to_ascii_lowercase();
        let normalized = normalized.split('(').next().unwrap_or("").trim().to_string();
        let angle = match normalized.as_str() {
            "eye" | "eye level" | "eye-level" => CameraAngle::EyeLevel,
            "low" | "low angle" | "heroic" => CameraAngle::LowAngle,
            "high" | "high angle" => CameraAngle::HighAngle,
            "dutch" | "dutch angle" | "dynamic" => CameraAngle::DutchAngle,
            "side" | "profile" | "side profile" => CameraAngle::SideProfile,
            _ => bail!("unknown camera angle '{input}' (try eye, low, high, dutch, side)"),
        };
        Ok(angle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resolution {
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl Resolution {
    pub const ALL: [Resolution; 3] = [Resolution::OneK, Resolution::TwoK, Resolution::FourK];

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::OneK => "1K",
            Resolution::TwoK => "2K",
            Resolution::FourK => "4K",
        }
    }

    /// Pixel count of the longer output edge.
    pub fn long_edge_px(self) -> u32 {
        match self {
            Resolution::OneK => 1024,
            Resolution::TwoK => 2048,
            Resolution::FourK => 4096,
        }
    }

    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let normalized = input.trim().to_ascii_lowercase();
        let resolution = match normalized.as_str() {
            "1k" | "1024" => Resolution::OneK,
            "2k" | "2048" => Resolution::TwoK,
            "4k" | "4096" => Resolution::FourK,
            _ => bail!("unknown resolution '{input}' (try 1K, 2K, 4K)"),
        };
        Ok(resolution)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "9:16")]
    Mobile,
    #[serde(rename = "16:9")]
    Cinematic,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait,
        AspectRatio::Landscape,
        AspectRatio::Mobile,
        AspectRatio::Cinematic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Mobile => "9:16",
            AspectRatio::Cinematic => "16:9",
        }
    }

    /// Width and height factors of the ratio.
    pub fn factors(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Portrait => (3, 4),
            AspectRatio::Landscape => (4, 3),
            AspectRatio::Mobile => (9, 16),
            AspectRatio::Cinematic => (16, 9),
        }
    }

    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let normalized = input.trim().to_ascii_lowercase();
        let ratio = match normalized.as_str() {
            "1:1" | "square" => AspectRatio::Square,
            "3:4" | "portrait" => AspectRatio::Portrait,
            "4:3" | "landscape" => AspectRatio::Landscape,
            "9:16" | "mobile" | "vertical" => AspectRatio::Mobile,
            "16:9" | "cinematic" | "wide" => AspectRatio::Cinematic,
            _ => bail!("unknown aspect ratio '{input}' (try 1:1, 3:4, 4:3, 9:16, 16:9)"),
        };
        Ok(ratio)
    }
}
