//! # courier-media
//!
//! The media pipeline: attachment acquisition, format normalization,
//! collage composition, static hosting, and the retention sweep.

pub mod acquire;
pub mod collage;
pub mod host;
pub mod normalize;
pub mod retention;
