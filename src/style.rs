use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Stylization presets offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StyleOption {
    #[default]
    Pixar,
    Vector,
    Anime,
    Sketch,
    Comic,
    Cyberpunk,
    Gothic,
    Clay,
}

/// Display label and model prompt for one preset.
#[derive(Debug, Clone, Copy)]
pub struct StyleSpec {
    pub style: StyleOption,
    pub label: &'static str,
    pub prompt: &'static str,
}

const PROMPT_SUFFIX: &str = "Keep the person's identity, facial structure, hairstyle and expression \
recognizable. Output a single square portrait image with a clean background and no text.";

pub const STYLES: &[StyleSpec] = &[
    StyleSpec {
        style: StyleOption::Pixar,
        label: "3D Animated",
        prompt: "Transform this photo into a 3D animated movie character in the style of modern \
Pixar films: soft global illumination, expressive oversized eyes, smooth subsurface-scattered skin \
and a warm, friendly color palette.",
    },
    StyleSpec {
        style: StyleOption::Vector,
        label: "Flat Vector",
        prompt: "Redraw this photo as a flat vector illustration: bold geometric shapes, clean \
outlines, a limited modern color palette and no gradients or photographic texture.",
    },
    StyleSpec {
        style: StyleOption::Anime,
        label: "Anime",
        prompt: "Redraw this photo as a high-quality anime character portrait: crisp cel shading, \
large detailed eyes, vibrant hair highlights and a soft painted background.",
    },
    StyleSpec {
        style: StyleOption::Sketch,
        label: "Pencil Sketch",
        prompt: "Turn this photo into a detailed graphite pencil sketch on textured paper: \
confident linework, cross-hatched shading and subtle smudged tones.",
    },
    StyleSpec {
        style: StyleOption::Comic,
        label: "Comic Book",
        prompt: "Redraw this photo as a classic comic book panel: heavy ink outlines, halftone \
dot shading, saturated primary colors and dramatic lighting.",
    },
    StyleSpec {
        style: StyleOption::Cyberpunk,
        label: "Cyberpunk",
        prompt: "Reimagine this photo as a cyberpunk portrait: neon magenta and cyan rim lights, \
rain-slick city bokeh, subtle holographic implants and a cinematic night mood.",
    },
    StyleSpec {
        style: StyleOption::Gothic,
        label: "Gothic",
        prompt: "Reimagine this photo as a dark gothic oil painting: candlelit chiaroscuro, \
deep crimson and black tones, ornate Victorian clothing and a moody cathedral backdrop.",
    },
    StyleSpec {
        style: StyleOption::Clay,
        label: "Claymation",
        prompt: "Transform this photo into a handmade claymation figure: visible fingerprints \
in plasticine, rounded stop-motion proportions, soft studio lighting and a miniature set.",
    },
];

impl StyleOption {
    pub fn all() -> impl Iterator<Item = StyleOption> {
        STYLES.iter().map(|spec| spec.style)
    }

    pub fn spec(self) -> &'static StyleSpec {
        STYLES
            .iter()
            .find(|spec| spec.style == self)
            .unwrap_or(&STYLES[0])
    }

    pub fn label(self) -> &'static str {
        self.spec().label
    }

    /// Full instruction sent to the image model for this preset.
    pub fn prompt(self) -> String {
        format!("{} {}", self.spec().prompt, PROMPT_SUFFIX)
    }

    /// Pick uniformly among every preset except `self`.
    pub fn random_other<R: Rng + ?Sized>(self, rng: &mut R) -> StyleOption {
        let candidates: Vec<StyleOption> = Self::all().filter(|style| *style != self).collect();
        candidates.choose(rng).copied().unwrap_or(self)
    }
}
