use serde::Serialize;

/// Aspect ratio a landscape photo is assumed to have been shot at.
pub const LANDSCAPE_ASPECT: f64 = 1.5;
/// Aspect ratio a portrait photo is assumed to have been shot at.
pub const PORTRAIT_ASPECT: f64 = 0.667;

/// Where a photo lands on screen, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Fit a `src_w`x`src_h` photo onto the screen.
///
/// The photo is scaled to the screen height, widened by the ratio between the
/// screen aspect and the nominal aspect of its orientation, clamped to the
/// screen width and centred. The correction factors then stretch the result
/// for panels whose pixels are not square; the final size never exceeds the
/// screen.
pub fn place_on_screen(
    src_w: u32,
    src_h: u32,
    screen_w: u32,
    screen_h: u32,
    correction: (f32, f32),
) -> Placement {
    let iw = f64::from(src_w.max(1));
    let ih = f64::from(src_h.max(1));
    let sw = f64::from(screen_w.max(1));
    let sh = f64::from(screen_h.max(1));
    let screen_aspect = sw / sh;

    let scaled_w = iw * (sh / ih);
    let nominal = if src_w >= src_h {
        PORTRAIT_ASPECT
    } else {
        LANDSCAPE_ASPECT
    };
    let target_w = (scaled_w * (screen_aspect / nominal)).min(sw);

    let width = (target_w * f64::from(correction.0)).round().clamp(1.0, sw) as u32;
    let height = (sh * f64::from(correction.1)).round().clamp(1.0, sh) as u32;
    let (x, y) = center_offset(width, height, screen_w, screen_h);
    Placement {
        x,
        y,
        width,
        height,
    }
}

pub fn center_offset(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> (u32, u32) {
    let ox = outer_w.saturating_sub(inner_w) / 2;
    let oy = outer_h.saturating_sub(inner_h) / 2;
    (ox, oy)
}
