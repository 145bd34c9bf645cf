//! Static studio catalogs: camera variations, lighting setups and backdrops.
//!
//! Slot `i` of a batch always receives `CAMERA_VARIATIONS[i]`, and its
//! lighting and background are picked by independent modulo cycling over
//! their own catalogs.

use serde::Serialize;

/// Largest batch a single request may ask for.
pub const MAX_VARIATIONS: usize = 8;

/// Camera angle, pose, lens and aperture for one shot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VariationDescriptor {
    pub name: &'static str,
    pub pose_and_camera_prompt: &'static str,
    pub focal_length: &'static str,
    pub aperture: &'static str,
}

pub static CAMERA_VARIATIONS: [VariationDescriptor; MAX_VARIATIONS] = [
    VariationDescriptor {
        name: "Hero Low Angle",
        pose_and_camera_prompt: "a dramatic low-angle shot from below, full-body view with the model standing in a powerful, confident stance with legs slightly apart and shoulders back, looking directly at the camera with authority",
        focal_length: "35mm lens for slight heroic distortion",
        aperture: "f/4 for full-body sharpness",
    },
    VariationDescriptor {
        name: "Beauty Close-Up",
        pose_and_camera_prompt: "an intimate close-up beauty shot, focusing on the model's face and upper shoulders, with a soft, natural expression, eyes engaging directly with the camera, capturing fine details and skin texture",
        focal_length: "85mm portrait lens",
        aperture: "f/2.8 for beautiful bokeh and subject separation",
    },
    VariationDescriptor {
        name: "Editorial Side Glance",
        pose_and_camera_prompt: "a medium shot from the waist up, with the model's body facing slightly to the side at a 45-degree angle while looking back towards the camera over their shoulder, creating an elegant editorial look",
        focal_length: "50mm standard lens",
        aperture: "f/3.5 for balanced depth",
    },
    VariationDescriptor {
        name: "Over-Shoulder Depth",
        pose_and_camera_prompt: "an over-the-shoulder perspective shot with shallow depth of field, the model looking back towards the camera with head turned, creating a sense of mystery and three-dimensional depth",
        focal_length: "50mm lens",
        aperture: "f/2.0 for shallow depth of field",
    },
    VariationDescriptor {
        name: "High Angle Elegance",
        pose_and_camera_prompt: "a high-angle shot looking down at the model who is seated or reclining elegantly, with knees together and hands placed gracefully, looking up at the camera with a serene, confident expression",
        focal_length: "50mm lens from above",
        aperture: "f/4 for sufficient depth",
    },
    VariationDescriptor {
        name: "Profile Silhouette",
        pose_and_camera_prompt: "a perfect profile view (90-degree side angle) of the model standing straight with chin slightly lifted, capturing their complete silhouette from head to toe with strong posture and clean lines",
        focal_length: "85mm for flattering compression",
        aperture: "f/5.6 for full profile sharpness",
    },
    VariationDescriptor {
        name: "Environmental Wide",
        pose_and_camera_prompt: "a wide, full-length establishing shot showing the model's entire body within the studio environment, positioned using the rule of thirds, with the model in a natural, relaxed standing pose",
        focal_length: "35mm wide angle",
        aperture: "f/5.6 for environmental context",
    },
    VariationDescriptor {
        name: "Dynamic Motion",
        pose_and_camera_prompt: "a dynamic action shot capturing the model in mid-stride walking confidently towards the camera, with one leg forward, arms in natural walking motion, conveying energy and movement with slight motion blur in clothing",
        focal_length: "50mm standard lens",
        aperture: "f/4 with fast shutter to freeze motion",
    },
];

pub const LIGHTING_SETUPS: [&str; 8] = [
    "soft diffused key light from 45 degrees with fill light, creating gentle shadows and even skin tones",
    "dramatic Rembrandt lighting with strong side light creating a triangle of light on the cheek",
    "butterfly lighting with light directly in front and above, creating a butterfly shadow under the nose",
    "split lighting with light from one side, creating dramatic contrast between light and shadow sides",
    "loop lighting with the light 30-45 degrees to the side and slightly above eye level",
    "broad lighting illuminating the side of the face turned toward the camera",
    "rim lighting from behind creating a glowing edge outline around the model",
    "clamshell lighting with lights above and below for beauty-style even illumination",
];

pub const STUDIO_BACKGROUNDS: [&str; 8] = [
    "seamless pure white infinity background with subtle gradient",
    "clean light gray backdrop with soft shadows",
    "minimalist off-white studio cyclorama",
    "pristine white paper backdrop with gentle roll-off",
    "soft cream-colored seamless background",
    "neutral beige studio backdrop with smooth texture",
    "bright white high-key photography setup",
    "subtle warm white studio environment",
];

/// First `count` camera variations in catalog order.
///
/// `count` is clamped to the catalog size.
pub fn select_variations(count: usize) -> &'static [VariationDescriptor] {
    &CAMERA_VARIATIONS[..count.min(MAX_VARIATIONS)]
}

pub fn lighting_for(index: usize) -> &'static str {
    LIGHTING_SETUPS[index % LIGHTING_SETUPS.len()]
}

pub fn background_for(index: usize) -> &'static str {
    STUDIO_BACKGROUNDS[index % STUDIO_BACKGROUNDS.len()]
}
