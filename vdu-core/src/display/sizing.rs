//! Optimal display size calculation.
//!
//! Pure arithmetic, no I/O. Given a viewport and the negotiated codec
//! parameters this picks the pixel size the device should render at,
//! honoring hardware alignment constraints (width mod 64, height mod
//! 32) and the per-tier resolution ceilings.

// ── Constants ────────────────────────────────────────────────────

pub const MAX_WIDTH: u32 = 1920;
pub const MAX_HEIGHT: u32 = 1088;
pub const MIN_SIDE: u32 = 320;

/// Size used when the device cannot size dynamically.
pub const FALLBACK_SIZE: ViewSize = ViewSize {
    width: 1024,
    height: 768,
};

/// Size used for calculation when the display is not responsive.
pub const NON_RESPONSIVE_SIZE: ViewSize = ViewSize {
    width: 1088,
    height: 832,
};

// ── ViewSize ─────────────────────────────────────────────────────

/// A width/height pair in pixels. Both axes are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSize {
    pub width: u32,
    pub height: u32,
}

impl ViewSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

impl std::fmt::Display for ViewSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ── Sizing tables ────────────────────────────────────────────────

/// Ceiling on the shorter axis for a resolution tier.
pub fn tier_ceiling(preset: i32) -> u32 {
    match preset {
        0 => 832,
        1 => 720,
        2 => 640,
        3 => 544,
        4 => 480,
        _ => 832,
    }
}

/// Pixel density the device should report for a resolution tier.
///
/// The hardware codec path only distinguishes two tiers.
pub fn density_for_preset(preset: i32, is_h264: bool) -> u32 {
    if is_h264 {
        match preset {
            0 => 200,
            _ => 175,
        }
    } else {
        match preset {
            0 => 200,
            1 => 175,
            2 => 155,
            3 => 130,
            4 => 115,
            _ => 200,
        }
    }
}

/// Rounds `value` up to the next multiple of `alignment`.
pub fn align_up(value: f64, alignment: u32) -> u32 {
    (value / f64::from(alignment)).ceil() as u32 * alignment
}

// ── Optimal size ─────────────────────────────────────────────────

/// Computes the pixel size the device should render at for the given
/// viewport and codec parameters.
///
/// Steps, in order:
/// 1. non-headless devices cannot resize, return [`FALLBACK_SIZE`];
/// 2. hardware codec clamps the tier to {0, 1};
/// 3. fit the viewport aspect ratio inside 1920x1088;
/// 4. clamp the shorter axis to the tier ceiling;
/// 5. align width up to 64 and height up to 32;
/// 6. a height at or below 480 collapses to 512 with width recomputed
///    from the aspect ratio;
/// 7. enforce the 320 minimum and the 1920x1088 maximum.
pub fn compute_optimal_size(
    view: ViewSize,
    resolution_preset: i32,
    is_h264: bool,
    is_headless: bool,
) -> ViewSize {
    if !is_headless {
        return FALLBACK_SIZE;
    }

    let preset = if is_h264 {
        if resolution_preset == 0 { 0 } else { 1 }
    } else {
        resolution_preset
    };

    let aspect = f64::from(view.width) / f64::from(view.height);

    let mut width = f64::from(view.width).clamp(f64::from(MIN_SIDE), f64::from(MAX_WIDTH));
    let mut height = width / aspect;
    if height > f64::from(MAX_HEIGHT) {
        height = f64::from(MAX_HEIGHT);
        width = height * aspect;
    }

    let ceiling = f64::from(tier_ceiling(preset));
    if width <= height {
        width = width.min(ceiling);
    } else {
        height = height.min(ceiling);
    }

    let mut aligned_width = align_up(width, 64);
    let mut aligned_height = align_up(height, 32);

    if aligned_height <= 480 {
        aligned_height = 512;
        aligned_width = align_up(f64::from(aligned_height) * aspect, 64);
    }

    if aligned_width < MIN_SIDE {
        aligned_width = align_up(f64::from(MIN_SIDE), 64);
    }
    if aligned_height < MIN_SIDE {
        aligned_height = align_up(f64::from(MIN_SIDE), 32);
    }

    ViewSize {
        width: aligned_width.min(MAX_WIDTH),
        height: aligned_height.min(MAX_HEIGHT),
    }
}
