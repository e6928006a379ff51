#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # scanout: synchronized frame presentation on paging display hardware
//!
//! This crate coordinates producers that submit rendered frame buffers with
//! DRM/KMS-style display hardware that applies a submission asynchronously,
//! at the next vertical blank, and reports the fact through an out-of-band
//! completion event. It guarantees at most one outstanding submission per
//! output, bounds every wait so a stalled output cannot wedge its callers,
//! and manages the lifetime of the frame-buffer resource across the
//! asynchronous boundary.
//!
//! ## Structure of the crate
//!
//! - [`surface`] holds the submission side: [`PrimarySurface`] for crtcs
//!   (with optional mirror groups) and [`OverlaySurface`] for composited
//!   overlay planes.
//! - [`dispatcher`] holds the completion side: the [`EventDispatcher`]
//!   worker and the [`FlipRegistry`] correlating events with outputs.
//! - [`device`] and [`frame`] are the seams to the hardware and to the
//!   frame producer; implement [`ScanoutDevice`] over your display API and
//!   [`FrameSource`] over your buffer management.
//!
//! ## How to use it
//!
//! ### Initialization
//!
//! Create one [`FlipRegistry`] and one [`OutputRegistry`] per display
//! connection, construct the surfaces for the outputs you drive, and start
//! exactly one [`EventDispatcher`] before the first submission:
//!
//! ```rust,ignore
//! let events = FlipRegistry::new();
//! let outputs = OutputRegistry::new();
//! let primary = PrimarySurface::new(
//!     device.clone(),
//!     &outputs,
//!     &events,
//!     [CrtcBinding { crtc, connector }],
//!     mode,
//! )?;
//! let dispatcher = EventDispatcher::spawn(device, events.clone())?;
//! ```
//!
//! ### Page flips
//!
//! ```rust,ignore
//! primary.submit(frame.clone(), 0, SubmitFlags::WAIT_FOR_SYNC)?;
//! ```
//!
//! `submit` serializes against the previous flip on the same output and,
//! with [`SubmitFlags::WAIT_FOR_SYNC`], against its own completion. All
//! waits share one fixed bound, sized so that even a display refreshing at
//! 5 Hz completes a cycle within it; a wait that exceeds the bound is
//! logged and the engine moves on. The bound is a liveness valve, not a
//! correctness guarantee — after a timeout, treat the previous frame's
//! visibility as unknown.
//!
//! On teardown, drop the surfaces and call
//! [`EventDispatcher::shutdown`], which wakes the event source and joins
//! the worker thread.
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]: submissions and completions at
//! trace level, lifecycle at debug, timeouts and swallowed mirror failures
//! as warnings.

pub mod device;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod output;
pub mod surface;
mod sync;
#[cfg(test)]
pub(crate) mod testing;

pub use device::{CompletionEvent, EventToken, PageFlipFlags, ScanoutDevice};
pub use dispatcher::{EventDispatcher, FlipRegistry};
pub use error::{AccessError, Error};
pub use frame::FrameSource;
pub use output::{
    ConfigFlags, CrtcBinding, OutputCaps, OutputMode, OutputRegistry, PlaneConfig, PlaneOptions,
    PlaneProperties, Rect, SourceColorKey,
};
pub use surface::{OverlaySurface, PrimarySurface, SubmitFlags};
