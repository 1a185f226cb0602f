//! Domain entities.

mod image;
mod priority;
mod resource;
mod task_state;

pub use image::{
    AnimationFrame, CacheType, DEFAULT_FRAME_DURATION, DecodeOptions, DecodedImage, ImageFormat,
    ImageFrames, LazyAnimation, MIN_FRAME_DURATION, decode_gif_frames, frame_duration,
    normalize_frame_duration,
};
pub use priority::DownloadPriority;
pub use resource::{CacheKey, Resource};
pub use task_state::TaskState;
