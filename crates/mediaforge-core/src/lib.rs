//! # MediaForge Core
//!
//! Core traits, types, and error handling for the MediaForge media image
//! toolkit.
//!
//! This crate provides the foundational abstractions for working with media
//! images:
//! - **MediaImage**: an opened image with its capability accessors
//! - **MediaView**: the topology selected for one run (optical, tape,
//!   byte-addressable, or flat block)
//! - **ImageFormat**: a format plugin that opens and creates images
//! - **Track / TapeFile**: segmentation of the address space
//!
//! ## Example
//!
//! ```rust,no_run
//! use mediaforge_core::{MediaImage, MediaView, Result};
//!
//! fn describe(image: &mut dyn MediaImage) -> Result<()> {
//!     let view = MediaView::resolve(image);
//!     println!("{}: {} ({} units)", image.identify(), view.kind(), view.total_units());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod traits;
pub mod types;
pub mod view;

// Re-export commonly used items
pub use error::{Error, Result};
pub use traits::{
    ByteAddressableImage, ImageFormat, MediaImage, OpticalImage, TapeImage, VerifiableImage,
    VerifiableSectorsImage, WritableImage,
};
pub use types::{
    validate_track_list, DumpRecord, Geometry, ImageInfo, ImageMetadata, MediaTagKind, MediaType,
    SectorTagKind, SubchannelKind, TapeFile, TapePartition, Track, TrackType, RAW_SECTOR_SIZE,
    SUBCHANNEL_SIZE,
};
pub use view::MediaView;
