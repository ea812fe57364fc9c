//! # MediaForge Formats
//!
//! Format plugin registry and in-tree image formats for MediaForge.
//!
//! This crate provides:
//! - **Registry**: format detection and destination format resolution
//! - **RawFormat**: plain sector images (.img, .ima, .iso, .bin, .dd)
//! - **MfiFormat**: the MediaForge native container (.mfi)
//! - **MemoryImage**: in-memory scratch images for staging and testing
//!
//! ## Example
//!
//! ```rust,no_run
//! use mediaforge_core::MediaImage;
//! use mediaforge_formats::Registry;
//! use std::path::Path;
//!
//! let registry = Registry::with_builtin();
//! let image = registry.open(Path::new("disc.mfi")).unwrap();
//! println!("Type: {}", image.identify());
//! println!("Sectors: {}", image.info().sectors);
//! ```

pub mod mem;
pub mod mfi;
pub mod raw;
pub mod registry;

pub use mem::MemoryImage;
pub use mfi::{MfiFormat, MfiImage, MfiWritableImage};
pub use raw::{RawFormat, RawImage, RawWritableImage};
pub use registry::Registry;
