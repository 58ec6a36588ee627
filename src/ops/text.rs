use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ab_glyph::{Font, FontArc, GlyphId, ScaleFont, point};
use image::RgbaImage;

use super::blend_over;

/// Horizontal text alignment relative to the anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Which part of the first line sits on the anchor's y.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextBaseline {
    #[default]
    Top,
    Middle,
    Alphabetic,
}

/// Drawing parameters for [`draw_text`].
#[derive(Clone, Copy, Debug)]
pub struct TextStyle {
    pub size: f32,
    pub color: [u8; 4],
    pub alignment: TextAlignment,
    pub baseline: TextBaseline,
    /// Synthesised slant for fonts without an italic face.
    pub italic: bool,
}

/// Lay out a single line of text, returning positioned glyphs and the line width.
/// Glyph y is the baseline (ascent below the line top).
pub fn layout_text(font: &FontArc, text: &str, font_size: f32, alignment: TextAlignment) -> (Vec<(GlyphId, f32, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();

    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x, ascent));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    let total_width = cursor_x;
    let offset = match alignment {
        TextAlignment::Left => 0.0,
        TextAlignment::Center => -total_width * 0.5,
        TextAlignment::Right => -total_width,
    };
    for glyph in &mut glyphs {
        glyph.1 += offset;
    }
    (glyphs, total_width)
}

/// Rasterize `text` straight into `img` with its anchor at (`x`, `y`).
/// Multiline text splits on '\n'. Glyphs falling outside the image are clipped.
pub fn draw_text(img: &mut RgbaImage, font: &FontArc, text: &str, x: f32, y: f32, style: &TextStyle) {
    if style.size <= 0.0 || !style.size.is_finite() || !x.is_finite() || !y.is_finite() {
        return;
    }
    let scaled = font.as_scaled(style.size);
    let ascent = scaled.ascent();
    let line_height = scaled.height();
    let top = match style.baseline {
        TextBaseline::Top => y,
        TextBaseline::Middle => y - line_height * 0.5,
        TextBaseline::Alphabetic => y - ascent,
    };

    let w = img.width() as i32;
    let h = img.height() as i32;

    for (line_idx, line) in text.split('\n').enumerate() {
        let (glyphs, _) = layout_text(font, line, style.size, style.alignment);
        let line_top = top + line_idx as f32 * line_height;
        for (glyph_id, gx, gy) in glyphs {
            let glyph = glyph_id.with_scale_and_position(style.size, point(x + gx, line_top + gy));
            let baseline_y = line_top + gy;
            let Some(outlined) = font.outline_glyph(glyph) else { continue };
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, cov| {
                let cy = bounds.min.y + py as f32;
                let mut cx = bounds.min.x + px as f32;
                if style.italic {
                    cx += (baseline_y - cy) * 0.2;
                }
                let ix = cx.round() as i32;
                let iy = cy as i32;
                if ix < 0 || iy < 0 || ix >= w || iy >= h || cov <= 0.001 {
                    return;
                }
                let idx = (iy as usize * w as usize + ix as usize) * 4;
                blend_over(&mut img.as_mut()[idx..idx + 4], style.color, cov);
            });
        }
    }
}

/// CSS weight keyword or number → numeric weight.
pub fn parse_weight(weight: &str) -> u16 {
    match weight.trim().to_ascii_lowercase().as_str() {
        "bold" | "bolder" => 700,
        "lighter" => 300,
        "normal" | "" => 400,
        other => other.parse::<u16>().map(|w| w.clamp(100, 900)).unwrap_or(400),
    }
}

/// Load a font by family name, weight, and style from the system.
/// `weight` is a CSS-style weight value (100=Thin, 400=Regular, 700=Bold, etc.)
/// Returns None if the font cannot be found.
pub fn load_system_font(family: &str, weight: u16, italic: bool) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Style, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight(weight as f32);
    if italic {
        props.style = Style::Italic;
    }

    let family_name = match family.to_ascii_lowercase().as_str() {
        "sans-serif" => FamilyName::SansSerif,
        "serif" => FamilyName::Serif,
        "monospace" => FamilyName::Monospace,
        _ => FamilyName::Title(family.to_string()),
    };

    let source = SystemSource::new();
    let handle = source
        .select_best_match(&[family_name, FamilyName::SansSerif], &props)
        .ok()?;

    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct FontKey {
    family: String,
    weight: u16,
    italic: bool,
}

/// Resolved fonts shared across bakes and renders.
///
/// System lookups are slow, so each (family, weight, italic) is resolved once.
/// A cache built with [`FontCache::with_fallback`] answers every request with
/// that font when the system has nothing better; [`FontCache::offline`] never
/// touches the system at all.
#[derive(Default)]
pub struct FontCache {
    resolved: Mutex<HashMap<FontKey, Option<FontArc>>>,
    fallback: Option<FontArc>,
    system_lookup: bool,
}

impl std::fmt::Debug for FontCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontCache")
            .field("has_fallback", &self.fallback.is_some())
            .field("system_lookup", &self.system_lookup)
            .finish()
    }
}

impl FontCache {
    pub fn system() -> Self {
        Self { system_lookup: true, ..Self::default() }
    }

    /// No system fonts; text without a fallback is skipped.
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, font: FontArc) -> Self {
        self.fallback = Some(font);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Best font for the request, or `None` when nothing can draw text.
    pub fn resolve(&self, family: &str, weight: &str, italic: bool) -> Option<FontArc> {
        let key = FontKey {
            family: family.trim().to_ascii_lowercase(),
            weight: parse_weight(weight),
            italic,
        };
        let mut resolved = match self.resolved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(found) = resolved.get(&key) {
            return found.clone();
        }
        let font = if self.system_lookup {
            load_system_font(family, key.weight, italic)
        } else {
            None
        }
        .or_else(|| self.fallback.clone());
        if font.is_none() {
            tracing::warn!(family, weight = key.weight, italic, "no font available; text will be skipped");
        }
        resolved.insert(key, font.clone());
        font
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights() {
        assert_eq!(parse_weight("bold"), 700);
        assert_eq!(parse_weight("normal"), 400);
        assert_eq!(parse_weight("600"), 600);
        assert_eq!(parse_weight("50"), 100);
        assert_eq!(parse_weight("heavy-ish"), 400);
    }

    #[test]
    fn offline_cache_without_fallback_resolves_nothing() {
        let cache = FontCache::offline();
        assert!(cache.resolve("Arial", "bold", false).is_none());
        // memoised
        assert!(cache.resolve("arial", "700", false).is_none());
    }
}
