use std::fmt;
use std::sync::Arc;

use drm::control::{crtc, framebuffer};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::SubmitFlags;
use crate::device::{PageFlipFlags, ScanoutDevice};
use crate::dispatcher::FlipRegistry;
use crate::error::{AccessError, Error};
use crate::frame::FrameSource;
use crate::output::{CrtcBinding, OutputMode, OutputRegistry};
use crate::sync::{FlipSync, WaitResult, FLIP_TIMEOUT};
use crate::EventToken;

/// A primary scan-out surface: one tracked crtc, plus optional best-effort
/// mirrors showing the same content.
///
/// The first [`CrtcBinding`] passed at construction is the tracked primary;
/// its page flips request completion events and drive the flip state. Any
/// further bindings form the mirror group: they receive untracked,
/// asynchronous flips whose failures are logged and skipped.
pub struct PrimarySurface<D: ScanoutDevice> {
    device: Arc<D>,
    index: usize,
    targets: SmallVec<[CrtcBinding; 2]>,
    mode: OutputMode,
    sync: Arc<FlipSync>,
    token: EventToken,
    events: Arc<FlipRegistry>,
}

impl<D: ScanoutDevice> PrimarySurface<D> {
    /// Creates a primary surface over the given mirror group.
    ///
    /// All members share one physical `mode`. Fails with
    /// [`Error::InvalidArgument`] when `targets` is empty.
    pub fn new(
        device: Arc<D>,
        outputs: &OutputRegistry,
        events: &Arc<FlipRegistry>,
        targets: impl IntoIterator<Item = CrtcBinding>,
        mode: OutputMode,
    ) -> Result<Self, Error> {
        let targets: SmallVec<[CrtcBinding; 2]> = targets.into_iter().collect();
        if targets.is_empty() {
            return Err(Error::InvalidArgument(
                "a primary surface needs at least one output",
            ));
        }
        let index = outputs.register_primary();
        let sync = Arc::new(FlipSync::new());
        let token = events.register(sync.clone());
        debug!(
            index,
            crtc = ?targets[0].crtc,
            mirrors = targets.len() - 1,
            "initialized primary surface"
        );
        Ok(PrimarySurface {
            device,
            index,
            targets,
            mode,
            sync,
            token,
            events: events.clone(),
        })
    }

    /// Ordinal of this surface among primary surfaces.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The physical mode shared by the mirror group.
    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// The tracked crtc.
    pub fn crtc(&self) -> crtc::Handle {
        self.tracked().crtc
    }

    /// Whether a submission is currently awaiting its completion event.
    pub fn is_pending(&self) -> bool {
        self.sync.is_pending()
    }

    fn tracked(&self) -> &CrtcBinding {
        &self.targets[0]
    }

    /// Performs a full modeset of every mirror-group member onto `fb`.
    ///
    /// This is the configuration path; unlike mirror flips, a failure on any
    /// member is propagated.
    #[profiling::function]
    pub fn set_scanout(&self, fb: framebuffer::Handle, src_pos: (i32, i32)) -> Result<(), Error> {
        for target in &self.targets {
            self.device
                .set_crtc(target.crtc, fb, src_pos, target.connector, &self.mode)
                .map_err(|source| AccessError {
                    errmsg: "failed to set crtc",
                    dev: self.device.dev_path(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Submits `frame`'s buffer `buffer_index` for display at the next
    /// vertical blank.
    ///
    /// Waits (bounded, 200 ms) for a previous pending flip on this surface
    /// to clear, takes a reference on `frame` for the
    /// duration of the new flip, and queues the page flip. Mirror members
    /// receive the same frame as untracked asynchronous flips.
    ///
    /// A timed-out wait — before or, with [`SubmitFlags::WAIT_FOR_SYNC`],
    /// after the submission — is logged and not reported as failure; treat
    /// the frame's visibility as unknown in that case. If the hardware
    /// rejects the tracked flip, the flip state is rolled back to idle and
    /// the translated error is returned.
    #[profiling::function]
    pub fn submit(
        &self,
        frame: Arc<dyn FrameSource>,
        buffer_index: usize,
        flags: SubmitFlags,
    ) -> Result<(), Error> {
        let fb = frame.framebuffer(buffer_index);

        self.sync.begin(frame.clone(), buffer_index, FLIP_TIMEOUT);

        trace!(crtc = ?self.tracked().crtc, ?fb, "queueing page flip");
        if let Err(source) =
            self.device
                .page_flip(self.tracked().crtc, fb, PageFlipFlags::EVENT, Some(self.token))
        {
            self.sync.abort();
            return Err(AccessError {
                errmsg: "page flip failed",
                dev: self.device.dev_path(),
                source,
            }
            .into());
        }

        for mirror in &self.targets[1..] {
            if let Err(err) = self
                .device
                .page_flip(mirror.crtc, fb, PageFlipFlags::ASYNC, None)
            {
                warn!(crtc = ?mirror.crtc, "page flip failed for mirror output: {}", err);
            }
        }

        if flags.contains(SubmitFlags::ADVANCE) {
            frame.advance();
        }

        if flags.contains(SubmitFlags::WAIT_FOR_SYNC) {
            self.sync.wait_idle(FLIP_TIMEOUT);
        }

        Ok(())
    }

    /// Waits (bounded) until no submission is pending on this surface.
    pub fn wait_idle(&self) -> Result<(), Error> {
        match self.sync.wait_idle(FLIP_TIMEOUT) {
            WaitResult::Completed => Ok(()),
            WaitResult::TimedOut => Err(Error::Timeout(FLIP_TIMEOUT)),
        }
    }
}

impl<D: ScanoutDevice> Drop for PrimarySurface<D> {
    fn drop(&mut self) {
        self.events.unregister(self.token);
    }
}

impl<D: ScanoutDevice> fmt::Debug for PrimarySurface<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimarySurface")
            .field("index", &self.index)
            .field("targets", &self.targets)
            .field("mode", &self.mode)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}
