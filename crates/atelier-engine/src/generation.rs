use std::io::Cursor;

use anyhow::{Context, Result};
use atelier_contracts::image::EncodedImage;
use atelier_contracts::settings::{AspectRatio, Resolution, ShootSettings};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::gemini::{self, GeminiTransport, NoImagePayload, DEFAULT_IMAGE_MODEL};

/// Stateless adapter for the two image operations of the wizard. One call,
/// one image; failures surface whole.
pub trait GenerationClient: Send + Sync {
    fn name(&self) -> &str;

    /// Renders the model from `model_photo` into the described pose, on a
    /// neutral studio background. Output is always requested at 1K, 3:4.
    fn generate_pose(
        &self,
        model_photo: &EncodedImage,
        pose_description: &str,
    ) -> Result<EncodedImage>;

    /// Dresses the posed model in every clothing reference and renders the
    /// final look with the session's settings.
    fn generate_look(
        &self,
        pose_image: &EncodedImage,
        clothing: &[EncodedImage],
        settings: &ShootSettings,
    ) -> Result<EncodedImage>;
}

pub struct GeminiGenerationClient {
    transport: GeminiTransport,
    model: String,
}

impl GeminiGenerationClient {
    pub fn new(model: Option<String>) -> Self {
        Self {
            transport: GeminiTransport::new(),
            model: model.unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
        }
    }
}

impl GenerationClient for GeminiGenerationClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_pose(
        &self,
        model_photo: &EncodedImage,
        pose_description: &str,
    ) -> Result<EncodedImage> {
        let payload = pose_request_payload(model_photo, pose_description);
        let response = self.transport.generate_content(&self.model, &payload)?;
        first_image_or_error(&response).context("pose render failed")
    }

    fn generate_look(
        &self,
        pose_image: &EncodedImage,
        clothing: &[EncodedImage],
        settings: &ShootSettings,
    ) -> Result<EncodedImage> {
        let payload = look_request_payload(pose_image, clothing, settings);
        let response = self.transport.generate_content(&self.model, &payload)?;
        first_image_or_error(&response).context("look render failed")
    }
}

fn first_image_or_error(response: &Value) -> Result<EncodedImage> {
    match gemini::extract_inline_image(response)? {
        Some(image) => Ok(image),
        None => Err(anyhow::Error::new(NoImagePayload)),
    }
}

fn pose_instruction(pose_description: &str) -> String {
    format!(
        "Create a photorealistic full-body fashion photograph of the person in the attached \
         photo, posed as follows: {pose_description}. Keep the person's facial features, hair \
         and body proportions exactly as in the photo. Use a neutral professional studio \
         background with soft, even lighting."
    )
}

fn look_instruction(settings: &ShootSettings) -> String {
    let style = if settings.style_prompt.trim().is_empty() {
        "High fashion photography"
    } else {
        settings.style_prompt.trim()
    };
    format!(
        "Dress the model from the first image in every clothing item shown in the other images. \
         Render the fabric realistically, with natural draping and believable wrinkles, and keep \
         the lighting consistent across all garments. Camera angle: {}. Style: {}.",
        settings.camera_angle.as_str(),
        style
    )
}

fn image_request_payload(parts: Vec<Value>, image_size: &str, aspect_ratio: &str) -> Value {
    json!({
        "contents": [gemini::user_content(parts)],
        "generationConfig": {
            "responseModalities": ["IMAGE"],
            "imageConfig": {
                "imageSize": image_size,
                "aspectRatio": aspect_ratio,
            },
        },
    })
}

fn pose_request_payload(model_photo: &EncodedImage, pose_description: &str) -> Value {
    let parts = vec![
        gemini::image_part(model_photo),
        gemini::text_part(&pose_instruction(pose_description)),
    ];
    image_request_payload(
        parts,
        Resolution::OneK.as_str(),
        AspectRatio::Portrait.as_str(),
    )
}

fn look_request_payload(
    pose_image: &EncodedImage,
    clothing: &[EncodedImage],
    settings: &ShootSettings,
) -> Value {
    let mut parts = vec![gemini::image_part(pose_image)];
    for item in clothing {
        parts.push(gemini::image_part(item));
    }
    parts.push(gemini::text_part(&look_instruction(settings)));
    image_request_payload(
        parts,
        settings.resolution.as_str(),
        settings.aspect_ratio.as_str(),
    )
}

/// Offline stand-in: renders a solid color derived from the instruction, at
/// the same size the live service would return. Deterministic for equal
/// inputs.
pub struct DryrunGenerationClient;

impl GenerationClient for DryrunGenerationClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_pose(
        &self,
        _model_photo: &EncodedImage,
        pose_description: &str,
    ) -> Result<EncodedImage> {
        synth_image(
            Resolution::OneK,
            AspectRatio::Portrait,
            &pose_instruction(pose_description),
            0,
        )
    }

    fn generate_look(
        &self,
        _pose_image: &EncodedImage,
        clothing: &[EncodedImage],
        settings: &ShootSettings,
    ) -> Result<EncodedImage> {
        synth_image(
            settings.resolution,
            settings.aspect_ratio,
            &look_instruction(settings),
            clothing.len() as u64,
        )
    }
}

fn synth_dims(resolution: Resolution, ratio: AspectRatio) -> (u32, u32) {
    let long_edge = resolution.long_edge_px();
    let (width_factor, height_factor) = ratio.factors();
    if width_factor >= height_factor {
        (long_edge, long_edge * height_factor / width_factor)
    } else {
        (long_edge * width_factor / height_factor, long_edge)
    }
}

fn synth_image(
    resolution: Resolution,
    ratio: AspectRatio,
    instruction: &str,
    salt: u64,
) -> Result<EncodedImage> {
    let (width, height) = synth_dims(resolution, ratio);
    let (r, g, b) = color_from_instruction(instruction, salt);
    let mut canvas = RgbImage::new(width, height);
    for pixel in canvas.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut bytes = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("failed to encode synthetic image")?;
    Ok(EncodedImage::new("image/png", bytes))
}

fn color_from_instruction(instruction: &str, salt: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(instruction.as_bytes());
    hasher.update(salt.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
