//! Camera collaborator contract
//!
//! The camera is an external collaborator: an independently-clocked producer
//! that pushes preview frames from its own render/capture thread. Frames and
//! lifecycle events are delivered on broadcast channels, so the session (and
//! anything else, e.g. a preview surface) can subscribe without the camera
//! knowing about its consumers.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::types::{CameraEvent, CameraFacing, VideoFrame};

/// A camera capture source
///
/// Implementations own the device and the thread that drives it. `frames()`
/// and `events()` may be called at any time; receivers created before
/// `start()` observe the full stream. Frame delivery order on one receiver
/// is the camera's production order.
pub trait CameraSource: Send {
    /// Open the device and begin producing frames
    fn start(&mut self) -> Result<()>;

    /// Stop producing frames and release the device
    fn stop(&mut self);

    /// Current facing
    fn facing(&self) -> CameraFacing;

    /// Select which camera to use; takes effect immediately when running
    fn set_facing(&mut self, facing: CameraFacing);

    /// Subscribe to raw preview frames
    fn frames(&self) -> broadcast::Receiver<Arc<VideoFrame>>;

    /// Subscribe to camera lifecycle events
    fn events(&self) -> broadcast::Receiver<CameraEvent>;
}
