use std::fmt;
use std::sync::{Arc, Mutex};

use drm::control::{crtc, framebuffer, plane, property};
use drm_fourcc::DrmFourcc;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::SubmitFlags;
use crate::device::ScanoutDevice;
use crate::dispatcher::FlipRegistry;
use crate::error::{AccessError, Error};
use crate::frame::FrameSource;
use crate::output::{
    ConfigFlags, OutputCaps, PlaneConfig, PlaneOptions, PlaneProperties, Rect,
};
use crate::output::OutputRegistry;
use crate::sync::{FlipSync, WaitResult, FLIP_TIMEOUT};
use crate::EventToken;

// Bit 24 of the color-key property enables keying.
const COLOR_KEY_ENABLE: u32 = 0x0100_0000;

/// An overlay plane composited onto one crtc at a configurable level.
///
/// The overlay's geometry and blending are set through
/// [`apply_config`](Self::apply_config) before the first submission.
/// Setting opacity to zero disables the plane ("mutes" it); a muted
/// overlay keeps accepting submissions without touching the hardware until
/// a configuration update with non-zero opacity re-enables it.
///
/// Plane updates have no completion event of their own, so tracked
/// submissions request a vblank event instead.
pub struct OverlaySurface<D: ScanoutDevice> {
    device: Arc<D>,
    plane: plane::Handle,
    crtc: crtc::Handle,
    ordinal: usize,
    caps: OutputCaps,
    props: PlaneProperties,
    formats: SmallVec<[DrmFourcc; 4]>,
    outputs: Arc<OutputRegistry>,
    state: Mutex<OverlayState>,
    sync: Arc<FlipSync>,
    token: EventToken,
    events: Arc<FlipRegistry>,
}

#[derive(Debug)]
struct OverlayState {
    config: Option<PlaneConfig>,
    muted: bool,
    level: usize,
}

impl<D: ScanoutDevice> OverlaySurface<D> {
    /// Creates an overlay surface on `plane`, composited onto `crtc`.
    ///
    /// Capabilities are derived from which property handles are present.
    /// `formats` is the plane's advertised format list (empty means
    /// unconstrained). The overlay registers with `outputs` and starts at
    /// the compositing level equal to its ordinal; when the hardware has a
    /// z-order property, that level is pushed immediately.
    pub fn new(
        device: Arc<D>,
        outputs: Arc<OutputRegistry>,
        events: &Arc<FlipRegistry>,
        plane: plane::Handle,
        crtc: crtc::Handle,
        props: PlaneProperties,
        formats: impl IntoIterator<Item = DrmFourcc>,
    ) -> Result<Self, Error> {
        let ordinal = outputs.register_overlay();

        let mut caps = OutputCaps::POSITION | OutputCaps::ALPHA_CHANNEL;
        if props.color_key.is_some() {
            caps |= OutputCaps::SRC_COLOR_KEY;
        }
        if props.alpha.is_some() {
            caps |= OutputCaps::OPACITY;
        }
        if let Some(zpos) = props.zpos {
            caps |= OutputCaps::LEVELS;
            device
                .set_plane_property(plane, zpos, ordinal as property::RawValue)
                .map_err(|source| AccessError {
                    errmsg: "failed to set initial z-order",
                    dev: device.dev_path(),
                    source,
                })?;
        }

        let sync = Arc::new(FlipSync::new());
        let token = events.register(sync.clone());
        debug!(ordinal, ?plane, ?caps, "initialized overlay surface");
        Ok(OverlaySurface {
            device,
            plane,
            crtc,
            ordinal,
            caps,
            props,
            formats: formats.into_iter().collect(),
            outputs,
            state: Mutex::new(OverlayState {
                config: None,
                muted: false,
                level: ordinal,
            }),
            sync,
            token,
            events: events.clone(),
        })
    }

    /// Ordinal of this overlay among overlay surfaces, counted from 1.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Capabilities derived from the hardware's property handles.
    pub fn caps(&self) -> OutputCaps {
        self.caps
    }

    /// Whether a submission is currently awaiting its completion event.
    pub fn is_pending(&self) -> bool {
        self.sync.is_pending()
    }

    /// Whether the overlay is currently disabled by a zero-opacity update.
    pub fn is_muted(&self) -> bool {
        self.state.lock().unwrap().muted
    }

    /// Checks a configuration against this overlay's capabilities without
    /// touching hardware.
    pub fn test_config(&self, config: &PlaneConfig) -> Result<(), Error> {
        if config.options.contains(PlaneOptions::SRC_COLOR_KEY) && self.props.color_key.is_none() {
            return Err(Error::Unsupported("source color-keying"));
        }
        if !self.formats.is_empty() && !self.formats.contains(&config.format) {
            return Err(Error::Unsupported("pixel format"));
        }
        Ok(())
    }

    /// Applies the parts of `config` named by `updated` to the hardware and
    /// records the configuration for subsequent submissions.
    ///
    /// Geometry updates (and opacity updates that un-mute the overlay)
    /// re-issue the plane scan-out with `fb`. A zero opacity disables the
    /// plane via a null update and mutes the overlay; non-zero opacity is
    /// written through the alpha property where present. Color-key updates
    /// are skipped silently when the hardware lacks the property.
    #[profiling::function]
    pub fn apply_config(
        &self,
        config: &PlaneConfig,
        updated: ConfigFlags,
        fb: framebuffer::Handle,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();

        if updated.contains(ConfigFlags::GEOMETRY)
            || (updated.contains(ConfigFlags::OPACITY) && state.muted && config.opacity > 0)
        {
            trace!(plane = ?self.plane, dst = ?config.dst, "updating plane geometry");
            self.device
                .set_plane(
                    self.plane,
                    self.crtc,
                    Some(fb),
                    config.dst,
                    config.src.to_fixed(),
                )
                .map_err(|source| AccessError {
                    errmsg: "failed to set plane configuration",
                    dev: self.device.dev_path(),
                    source,
                })?;
            state.config = Some(*config);
            state.muted = false;
        }

        if updated.contains(ConfigFlags::COLOR_KEY) {
            if let Some(prop) = self.props.color_key {
                let mut key = config.src_key.encode();
                if config.options.contains(PlaneOptions::SRC_COLOR_KEY) {
                    key |= COLOR_KEY_ENABLE;
                }
                self.device
                    .set_plane_property(self.plane, prop, key as property::RawValue)
                    .map_err(|source| AccessError {
                        errmsg: "failed to set color key",
                        dev: self.device.dev_path(),
                        source,
                    })?;
            }
        }

        if updated.contains(ConfigFlags::OPACITY) {
            if config.opacity == 0 {
                self.device
                    .set_plane(self.plane, self.crtc, None, Rect::ZERO, Rect::ZERO)
                    .map_err(|source| AccessError {
                        errmsg: "failed to disable plane",
                        dev: self.device.dev_path(),
                        source,
                    })?;
                state.muted = true;
            } else if let Some(prop) = self.props.alpha {
                // Scale 8-bit opacity to the 16-bit range of the property.
                let alpha = (65535 * config.opacity as u32 + 127) / 255;
                self.device
                    .set_plane_property(self.plane, prop, alpha as property::RawValue)
                    .map_err(|source| AccessError {
                        errmsg: "failed to set alpha",
                        dev: self.device.dev_path(),
                        source,
                    })?;
            }
        }

        Ok(())
    }

    /// Disables the plane unless a zero-opacity update already did.
    pub fn remove(&self) -> Result<(), Error> {
        let state = self.state.lock().unwrap();
        if !state.muted {
            self.device
                .set_plane(self.plane, self.crtc, None, Rect::ZERO, Rect::ZERO)
                .map_err(|source| AccessError {
                    errmsg: "failed to remove plane",
                    dev: self.device.dev_path(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Submits `frame`'s buffer `buffer_index` for display at the next
    /// vertical blank.
    ///
    /// Fails with [`Error::InvalidArgument`] before any hardware call when
    /// no configuration was applied yet or the configured source or
    /// destination rectangle is degenerate. The flip-state discipline and
    /// the timeout/rollback behavior match
    /// [`PrimarySurface::submit`](super::PrimarySurface::submit); completion
    /// is tracked through a requested vblank event rather than a page-flip
    /// event.
    #[profiling::function]
    pub fn submit(
        &self,
        frame: Arc<dyn FrameSource>,
        buffer_index: usize,
        flags: SubmitFlags,
    ) -> Result<(), Error> {
        let (config, muted) = {
            let state = self.state.lock().unwrap();
            let config = state
                .config
                .ok_or(Error::InvalidArgument("overlay has no applied configuration"))?;
            (config, state.muted)
        };
        if config.src.is_degenerate() || config.dst.is_degenerate() {
            return Err(Error::InvalidArgument(
                "degenerate source or destination rectangle",
            ));
        }

        let fb = frame.framebuffer(buffer_index);
        self.sync.begin(frame.clone(), buffer_index, FLIP_TIMEOUT);

        if !muted {
            trace!(plane = ?self.plane, ?fb, "updating plane scan-out");
            if let Err(source) = self.device.set_plane(
                self.plane,
                self.crtc,
                Some(fb),
                config.dst,
                config.src.to_fixed(),
            ) {
                self.sync.abort();
                return Err(AccessError {
                    errmsg: "failed to set plane configuration",
                    dev: self.device.dev_path(),
                    source,
                }
                .into());
            }
        }

        if flags.contains(SubmitFlags::ADVANCE) {
            frame.advance();
        }

        if let Err(source) = self.device.request_vblank(self.crtc, self.token) {
            self.sync.abort();
            return Err(AccessError {
                errmsg: "failed to request a vblank event",
                dev: self.device.dev_path(),
                source,
            }
            .into());
        }

        if flags.contains(SubmitFlags::WAIT_FOR_SYNC) {
            self.sync.wait_idle(FLIP_TIMEOUT);
        }

        Ok(())
    }

    /// Moves the overlay to `level` in the compositing order.
    ///
    /// Fails with [`Error::Unsupported`] when the hardware has no z-order
    /// property and with [`Error::InvalidArgument`] when `level` is outside
    /// `1..=overlay_count`. The recorded level only changes when the
    /// hardware accepted the update.
    pub fn set_level(&self, level: usize) -> Result<(), Error> {
        let Some(zpos) = self.props.zpos else {
            return Err(Error::Unsupported("z-order levels"));
        };
        if level < 1 || level > self.outputs.overlay_count() {
            return Err(Error::InvalidArgument("compositing level out of range"));
        }
        self.device
            .set_plane_property(self.plane, zpos, level as property::RawValue)
            .map_err(|source| AccessError {
                errmsg: "failed to set z-order",
                dev: self.device.dev_path(),
                source,
            })?;
        self.state.lock().unwrap().level = level;
        Ok(())
    }

    /// The recorded compositing level. Pure read, no hardware call.
    pub fn level(&self) -> usize {
        self.state.lock().unwrap().level
    }

    /// Waits (bounded) until no submission is pending on this surface.
    pub fn wait_idle(&self) -> Result<(), Error> {
        match self.sync.wait_idle(FLIP_TIMEOUT) {
            WaitResult::Completed => Ok(()),
            WaitResult::TimedOut => Err(Error::Timeout(FLIP_TIMEOUT)),
        }
    }
}

impl<D: ScanoutDevice> Drop for OverlaySurface<D> {
    fn drop(&mut self) {
        self.events.unregister(self.token);
    }
}

impl<D: ScanoutDevice> fmt::Debug for OverlaySurface<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlaySurface")
            .field("plane", &self.plane)
            .field("crtc", &self.crtc)
            .field("ordinal", &self.ordinal)
            .field("caps", &self.caps)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}
