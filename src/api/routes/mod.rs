//! API route modules.

pub mod recordings;
pub mod upload;

use std::sync::Arc;

use super::locks::RunLocks;
use crate::delivery::DeliveryService;
use crate::recording::RecordingPipeline;
use crate::storage::RecordingUploader;

/// Shared handles used by every route.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RecordingPipeline>,
    pub delivery: Arc<DeliveryService>,
    pub uploader: Arc<RecordingUploader>,
    pub locks: RunLocks,
}

impl AppState {
    pub fn new(
        pipeline: RecordingPipeline,
        delivery: DeliveryService,
        uploader: RecordingUploader,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            delivery: Arc::new(delivery),
            uploader: Arc::new(uploader),
            locks: RunLocks::default(),
        }
    }
}
