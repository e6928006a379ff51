//! Output identity, capabilities and plane configuration.

use std::sync::Mutex;

use drm::control::{connector, crtc, property};
use drm_fourcc::DrmFourcc;

/// A rectangle in pixels (or 16.16 fixed point, where noted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Horizontal offset
    pub x: i32,
    /// Vertical offset
    pub y: i32,
    /// Width
    pub w: u32,
    /// Height
    pub h: u32,
}

impl Rect {
    /// The empty rectangle at the origin.
    pub const ZERO: Rect = Rect { x: 0, y: 0, w: 0, h: 0 };

    /// Creates a rectangle from offset and size.
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Rect { x, y, w, h }
    }

    /// Whether the rectangle has zero width or height.
    pub fn is_degenerate(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// The 16.16 fixed-point representation used for plane sources.
    pub(crate) fn to_fixed(self) -> Rect {
        Rect {
            x: self.x << 16,
            y: self.y << 16,
            w: self.w << 16,
            h: self.h << 16,
        }
    }
}

/// Physical mode of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputMode {
    /// Horizontal resolution in pixels
    pub width: u32,
    /// Vertical resolution in pixels
    pub height: u32,
    /// Refresh rate in Hz
    pub refresh: u32,
}

/// One physical target of a primary surface: the crtc and the connector it
/// drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrtcBinding {
    /// Scan-out engine
    pub crtc: crtc::Handle,
    /// Connector driven by the crtc
    pub connector: connector::Handle,
}

bitflags::bitflags! {
    /// Capabilities of an output, derived at initialization from the
    /// property handles the hardware exposes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OutputCaps: u32 {
        /// The output can be positioned on the screen
        const POSITION = 1 << 0;
        /// Per-pixel alpha is honored when compositing
        const ALPHA_CHANNEL = 1 << 1;
        /// Source color-keying is available
        const SRC_COLOR_KEY = 1 << 2;
        /// The compositing level can be changed
        const LEVELS = 1 << 3;
        /// Global opacity can be changed
        const OPACITY = 1 << 4;
    }
}

bitflags::bitflags! {
    /// Behavioral options of a plane configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PlaneOptions: u32 {
        /// Key out pixels matching the source color key
        const SRC_COLOR_KEY = 1 << 0;
    }
}

bitflags::bitflags! {
    /// Which parts of a [`PlaneConfig`] changed in an
    /// [`apply_config`](crate::OverlaySurface::apply_config) call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConfigFlags: u32 {
        /// Source or destination rectangle changed
        const GEOMETRY = 1 << 0;
        /// Source color key or keying options changed
        const COLOR_KEY = 1 << 1;
        /// Opacity changed
        const OPACITY = 1 << 2;
    }
}

/// Property handles of an overlay plane, `None` where the hardware lacks
/// the property.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneProperties {
    /// Source color-key property
    pub color_key: Option<property::Handle>,
    /// Z-order property
    pub zpos: Option<property::Handle>,
    /// Global alpha property
    pub alpha: Option<property::Handle>,
}

/// The color keyed out of an overlay's source when
/// [`PlaneOptions::SRC_COLOR_KEY`] is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceColorKey {
    /// Red component
    pub r: u8,
    /// Green component
    pub g: u8,
    /// Blue component
    pub b: u8,
}

impl SourceColorKey {
    /// The packed `0x00RRGGBB` encoding used by the hardware property.
    pub(crate) fn encode(self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

/// Geometry and blending configuration of an overlay plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneConfig {
    /// Region of the frame buffer to read, in pixels
    pub src: Rect,
    /// Region of the screen to composite onto, in pixels
    pub dst: Rect,
    /// Pixel format of the scanned-out buffers
    pub format: DrmFourcc,
    /// Global opacity, 0 (fully transparent) to 255 (opaque)
    pub opacity: u8,
    /// Source color key
    pub src_key: SourceColorKey,
    /// Behavioral options
    pub options: PlaneOptions,
}

/// Registry assigning ordinals to outputs as they are initialized.
///
/// Primary surfaces get indices counted from 0; overlays get ordinals
/// counted from 1, which double as their initial compositing level. The
/// overlay count also bounds
/// [`set_level`](crate::OverlaySurface::set_level).
#[derive(Debug, Default)]
pub struct OutputRegistry {
    counts: Mutex<Counts>,
}

#[derive(Debug, Default)]
struct Counts {
    primaries: usize,
    overlays: usize,
}

impl OutputRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Default::default()
    }

    pub(crate) fn register_primary(&self) -> usize {
        let mut counts = self.counts.lock().unwrap();
        let index = counts.primaries;
        counts.primaries += 1;
        index
    }

    pub(crate) fn register_overlay(&self) -> usize {
        let mut counts = self.counts.lock().unwrap();
        counts.overlays += 1;
        counts.overlays
    }

    /// Number of primary surfaces initialized so far.
    pub fn primary_count(&self) -> usize {
        self.counts.lock().unwrap().primaries
    }

    /// Number of overlay surfaces initialized so far.
    pub fn overlay_count(&self) -> usize {
        self.counts.lock().unwrap().overlays
    }
}
