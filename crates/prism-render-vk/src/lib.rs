// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: a single triangle, presented through a swapchain with a
//! bounded number of frames in flight.
mod context;
pub mod device;
mod error;
pub mod handles;
pub mod instance;
pub mod pipeline;
pub mod recorder;
pub mod scheduler;
mod settings;
pub mod swapchain;
pub mod sync;

pub use context::{RenderContext, VkRenderer};
pub use error::{InitStage, PipelineStage, RenderError, Result};
pub use scheduler::{AcquireOutcome, FrameBackend, FrameScheduler, FrameState, PresentOutcome};
pub use settings::{
    RenderSettings, VkPolygonMode, DEFAULT_FRAGMENT_SHADER, DEFAULT_FRAMES_IN_FLIGHT,
    DEFAULT_VERTEX_SHADER,
};

pub use ash;
