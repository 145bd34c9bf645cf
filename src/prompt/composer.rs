//! Builds the single text instruction sent alongside the reference photo.

use super::catalog::{background_for, lighting_for, VariationDescriptor};

/// Everything a slot needs to describe its shot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotPlan {
    pub index: usize,
    pub variation: &'static VariationDescriptor,
    pub lighting: &'static str,
    pub background: &'static str,
}

impl ShotPlan {
    /// Plan slot `index` around `variation`; lighting and background cycle by index.
    pub fn new(index: usize, variation: &'static VariationDescriptor) -> Self {
        Self {
            index,
            variation,
            lighting: lighting_for(index),
            background: background_for(index),
        }
    }

    pub fn instruction(&self) -> String {
        compose_instruction(self.variation, self.lighting, self.background)
    }
}

/// Compose the photographer brief for one shot.
///
/// Identity (face, hair, clothing, body, skin) is pinned; only the studio
/// environment and the camera setup change between slots.
pub fn compose_instruction(
    variation: &VariationDescriptor,
    lighting: &str,
    background: &str,
) -> String {
    format!(
        "You are an elite professional fashion photographer shooting for a high-end fashion catalog in a pristine photography studio.

REFERENCE IMAGE ANALYSIS:
Study the uploaded image carefully and extract:
- The EXACT facial features, face shape, skin tone, and facial structure
- The EXACT hairstyle, hair color, and hair texture
- The EXACT clothing items, colors, patterns, textures, and fit
- The model's body proportions and build

CRITICAL PRESERVATION REQUIREMENTS:
✓ FACE: Maintain 100% facial likeness - same eyes, nose, mouth, jawline, cheekbones, and facial expressions
✓ HAIR: Keep the exact hairstyle, color, length, and texture
✓ CLOTHING: Preserve every detail of the outfit - same colors, fabrics, fit, wrinkles, and styling
✓ BODY: Maintain the model's body type, proportions, and build
✓ SKIN: Keep the same skin tone, texture, and any visible features

STUDIO ENVIRONMENT (MUST CHANGE):
✗ BACKGROUND: Replace with {background}
✗ LIGHTING: Apply professional {lighting}
- Studio should look pristine, clean, and professional
- No props, furniture, or distracting elements
- Pure minimalist photography studio aesthetic

CAMERA SETUP:
- Camera Angle & Pose: {pose}
- Lens: {lens}
- Aperture: {aperture}
- Shot Name: {name}

TECHNICAL PHOTOGRAPHY REQUIREMENTS:
- Ultra-high resolution: 4K/8K quality
- Photorealistic rendering with accurate physics
- Sharp focus on the model with perfect clarity
- Professional color grading: natural, balanced, magazine-quality
- Proper exposure: no blown highlights or crushed shadows
- Realistic skin texture: pores, natural texture, no over-smoothing
- Accurate fabric rendering: realistic cloth physics and texture
- Natural shadows and highlights from the lighting setup
- Professional depth of field appropriate for the shot type
- No AI artifacts, warping, or unnatural distortions
- Perfectly rendered hands and fingers if visible
- Natural eye reflections (catchlights) from studio lighting

REALISM CHECKLIST:
✓ Anatomically accurate proportions
✓ Realistic muscle tension and body mechanics
✓ Natural fabric draping and wrinkles
✓ Proper weight distribution in pose
✓ Believable interaction with gravity
✓ Professional model posing and body language
✓ Natural facial expressions and microexpressions
✓ Realistic hair movement and behavior
✓ Accurate light interaction with surfaces
✓ Professional photography depth and dimension

OUTPUT: Generate a flawless, photorealistic professional studio portrait that looks indistinguishable from a real photograph taken by a master fashion photographer. \
The image should be so realistic that it could be published in Vogue, Harper's Bazaar, or any top fashion magazine without question.",
        background = background,
        lighting = lighting,
        name = variation.name,
        pose = variation.pose_and_camera_prompt,
        lens = variation.focal_length,
        aperture = variation.aperture,
    )
}
