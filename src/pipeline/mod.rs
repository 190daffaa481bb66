//! Document and submission pipeline stages.
//!
//! Each submodule implements exactly one transformation step, so every
//! stage can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! picked URI ──▶ input ──▶ normalize ──▶ (wizard state) ──▶ assemble
//! (path/file/data)  (local file)  (image → PDF)              (multipart parts)
//! ```
//!
//! 1. [`input`]     resolve the picked URI to a local file and classify it
//! 2. [`normalize`] render raster images into single-page PDFs; runs in
//!    `spawn_blocking` because decoding and compression are CPU-bound
//! 3. [`assemble`]  map the collected wizard data onto the backend's
//!    multipart field names

pub mod assemble;
pub mod input;
pub mod normalize;
