//! Pixel-level editing algorithms
//!
//! Every function here is synchronous and works only on the buffers it is
//! given. Decoding, encoding and accelerator calls live elsewhere.

pub mod contour;
pub mod enhance;
pub mod halftone;
pub mod inpaint;
pub mod keying;
pub mod magic_wand;
pub mod morphology;
pub mod segmentation;
pub mod watermark;

pub use contour::ClipSeed;
pub use enhance::{EnhanceOptions, UpscaleOptions};
pub use halftone::HalftoneOptions;
pub use keying::ColorKey;
pub use magic_wand::WandSeed;
pub use segmentation::{LabelMap, SegmentationLabel};
pub use watermark::{WatermarkOptions, WatermarkShape};
