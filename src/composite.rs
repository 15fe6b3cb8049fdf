use glam::Vec2;

use crate::color::Rgb;
use crate::dots::{sample_dots, DotSample};
use crate::grain::{sample_grain, GrainSample};
use crate::noise::{hash12, smoothstep};
use crate::schema::{Background, BlendMode};
use crate::snapshot::FrameParams;

const ALPHA_EPSILON: f32 = 0.0001;
const GLOW_GAIN: f32 = 0.16;
const DITHER_AMPLITUDE: f32 = 0.007;

/// Straight-alpha RGBA in `[0, 1]`.
pub type Rgba = [f32; 4];

/// Per-channel blend of the grain colour against the dot colour.
pub fn apply_blend_mode(base: Rgb, blend: Rgb, mode: BlendMode) -> Rgb {
    match mode {
        BlendMode::Normal => blend,
        BlendMode::Screen => base.zip(blend, |a, b| 1.0 - (1.0 - a) * (1.0 - b)),
        BlendMode::Add => base.zip(blend, |a, b| (a + b).min(1.0)),
        BlendMode::Multiply => base.zip(blend, |a, b| a * b),
    }
}

/// Grain over dots, premultiplied. Returns the un-premultiplied colour and
/// the combined alpha; a fully transparent result is black.
pub fn over(dot_color: Rgb, dot_alpha: f32, grain_color: Rgb, grain_alpha: f32) -> (Rgb, f32) {
    let out_alpha = dot_alpha + grain_alpha * (1.0 - dot_alpha);
    let premultiplied = dot_color
        .scale(dot_alpha)
        .add(grain_color.scale(grain_alpha * (1.0 - dot_alpha)));
    let color = if out_alpha > ALPHA_EPSILON {
        premultiplied.scale(1.0 / out_alpha)
    } else {
        Rgb::BLACK
    };
    (color, out_alpha)
}

/// Anti-banding offset, strongest where dots or grain are present.
pub fn dither_offset(p: Vec2, dither: f32, dot_alpha: f32, domain_mask: f32) -> f32 {
    let mask = (dot_alpha * 0.9).max(domain_mask * 0.65);
    (hash12(p * 0.53 + Vec2::new(3.1, 7.4)) - 0.5)
        * DITHER_AMPLITUDE
        * (0.35 + dither * 0.65)
        * mask
}

pub fn composite_pixel(frame: &FrameParams, p: Vec2, dots: &DotSample, grain: &GrainSample) -> Rgba {
    let dot_color = frame.dots.color;
    let blended = apply_blend_mode(dot_color, grain.color, frame.grain.blend_mode);
    let (mut color, alpha) = over(dot_color, dots.alpha, blended, grain.alpha);

    if grain.glow > 0.0 {
        color = color.add(grain.color.scale(grain.glow * GLOW_GAIN));
    }

    let offset = dither_offset(p, frame.grain.tuning.dither, dots.alpha, grain.domain_mask);
    let color = color.map(|c| c + offset).clamp01();
    [color.r, color.g, color.b, alpha.clamp(0.0, 1.0)]
}

/// Full evaluation of one pixel centre: dots, grain, composite.
pub fn shade_pixel(frame: &FrameParams, p: Vec2) -> Rgba {
    let dots = sample_dots(frame, p);
    let grain = sample_grain(frame, p, &dots);
    composite_pixel(frame, p, &dots, &grain)
}

/// Position along a 135 degree CSS linear gradient, 0 at the top-left
/// corner and 1 at the bottom-right.
pub fn gradient_position(x: f32, y: f32, width: f32, height: f32) -> f32 {
    let span = (width + height).max(1.0);
    (0.5 + (x - width * 0.5 + y - height * 0.5) / span).clamp(0.0, 1.0)
}

pub fn gradient_color(background: &Background, t: f32) -> Rgb {
    if t < 0.5 {
        background.start.lerp(background.mid, t * 2.0)
    } else {
        background.mid.lerp(background.end, (t - 0.5) * 2.0)
    }
}

/// Composite a straight-alpha RGBA8 frame onto the gradient in place, leaving
/// every pixel opaque.
pub fn flatten_onto_gradient(rgba: &mut [u8], width: u32, height: u32, background: &Background) {
    let (w, h) = (width as f32, height as f32);
    for (index, pixel) in rgba.chunks_exact_mut(4).enumerate() {
        let x = (index as u32 % width.max(1)) as f32 + 0.5;
        let y = (index as u32 / width.max(1)) as f32 + 0.5;
        let backdrop = gradient_color(background, gradient_position(x, y, w, h));
        let alpha = f32::from(pixel[3]) / 255.0;
        let source = Rgb::from_u8(pixel[0], pixel[1], pixel[2]);
        let [r, g, b] = backdrop.lerp(source, alpha).to_u8();
        pixel.copy_from_slice(&[r, g, b, 255]);
    }
}

/// Quantise a shaded pixel to straight-alpha RGBA8.
pub fn to_rgba8(pixel: Rgba) -> [u8; 4] {
    pixel.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use glam::DVec2;

    use super::*;
    use crate::schema::EffectConfig;
    use crate::snapshot::ConfigSnapshot;

    const GREY: Rgb = Rgb::new(0.25, 0.5, 0.75);

    #[test]
    fn normal_blend_keeps_grain_color() {
        assert_eq!(apply_blend_mode(Rgb::WHITE, GREY, BlendMode::Normal), GREY);
        assert_eq!(apply_blend_mode(Rgb::BLACK, GREY, BlendMode::Normal), GREY);
    }

    #[test]
    fn multiply_with_white_is_identity() {
        assert_eq!(apply_blend_mode(Rgb::WHITE, GREY, BlendMode::Multiply), GREY);
        assert_eq!(apply_blend_mode(GREY, Rgb::WHITE, BlendMode::Multiply), GREY);
    }

    #[test]
    fn screen_and_add_brighten() {
        let screen = apply_blend_mode(GREY, GREY, BlendMode::Screen);
        assert!((screen.r - 0.4375).abs() < 1e-6);
        let add = apply_blend_mode(GREY, GREY, BlendMode::Add);
        assert_eq!(add, Rgb::new(0.5, 1.0, 1.0));
    }

    #[test]
    fn over_matches_premultiplied_formula() {
        let (color, alpha) = over(Rgb::WHITE, 0.5, Rgb::BLACK, 0.5);
        assert!((alpha - 0.75).abs() < 1e-6);
        assert!((color.r - 0.5 / 0.75).abs() < 1e-6);

        let (only_grain, alpha) = over(Rgb::WHITE, 0.0, GREY, 0.4);
        assert!((alpha - 0.4).abs() < 1e-6);
        assert!((only_grain.g - GREY.g).abs() < 1e-6);
    }

    #[test]
    fn transparent_result_is_black() {
        let (color, alpha) = over(Rgb::WHITE, 0.0, GREY, 0.0);
        assert_eq!(alpha, 0.0);
        assert_eq!(color, Rgb::BLACK);
    }

    #[test]
    fn dither_is_tiny_and_masked() {
        for i in 0..500 {
            let p = Vec2::new(i as f32 * 1.7, i as f32 * 0.3);
            let offset = dither_offset(p, 5.0, 1.0, 1.0);
            assert!(offset.abs() <= 0.0035 * 3.6 * 0.9 + 1e-6);
            assert_eq!(dither_offset(p, 5.0, 0.0, 0.0), 0.0);
        }
    }

    #[test]
    fn shaded_pixels_stay_in_range() {
        let snapshot = ConfigSnapshot::from_config(&EffectConfig {
            grain_amount: 1.0,
            grain_blend_mode: BlendMode::Add,
            ..EffectConfig::default()
        });
        let frame = FrameParams::new(&snapshot, DVec2::new(100.0, 80.0), DVec2::X, 1.0, 200, 160);
        for y in (0..160).step_by(4) {
            for x in (0..200).step_by(4) {
                let pixel = shade_pixel(&frame, Vec2::new(x as f32 + 0.5, y as f32 + 0.5));
                assert!(pixel.iter().all(|c| (0.0..=1.0).contains(c)), "{pixel:?}");
            }
        }
    }

    #[test]
    fn gradient_spans_corner_to_corner() {
        assert_eq!(gradient_position(0.0, 0.0, 100.0, 50.0), 0.0);
        assert_eq!(gradient_position(100.0, 50.0, 100.0, 50.0), 1.0);
        assert_eq!(gradient_position(50.0, 25.0, 100.0, 50.0), 0.5);

        let background = Background::default();
        assert_eq!(gradient_color(&background, 0.0), background.start);
        assert_eq!(gradient_color(&background, 0.5), background.mid);
        assert_eq!(gradient_color(&background, 1.0), background.end);
    }

    #[test]
    fn flatten_makes_every_pixel_opaque() {
        let background = Background::default();
        let mut rgba = vec![0_u8; 4 * 4 * 2];
        rgba[4..8].copy_from_slice(&[255, 255, 255, 255]);
        flatten_onto_gradient(&mut rgba, 4, 2, &background);
        assert!(rgba.chunks_exact(4).all(|pixel| pixel[3] == 255));
        assert_eq!(&rgba[4..8], &[255, 255, 255, 255]);
        let expected = gradient_color(&background, gradient_position(0.5, 0.5, 4.0, 2.0)).to_u8();
        assert_eq!(&rgba[0..3], &expected);
    }
}
