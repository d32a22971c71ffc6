//! # Desktop Bridge Implementations
//!
//! Default implementations of the host bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - [`TokioJobScheduler`]: `JobScheduler` backed by a tokio worker pool with
//!   tag cancellation
//! - [`HttpArtworkWorker`]: fetches notification artwork with `reqwest` and
//!   stores a downscaled PNG
//! - [`HttpPreCacheWorker`]: range-fetches the head of a media source into the
//!   content-addressed cache directory
//! - [`ImageArtworkDecoder`]: `ArtworkDecoder` using the `image` crate
//!
//! DRM, media sessions and notifications have no desktop counterpart here;
//! hosts provide their own or leave the optional bridges unset.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use bridge_desktop::{HttpArtworkWorker, HttpPreCacheWorker, TokioJobScheduler};
//! use bridge_traits::JobKind;
//!
//! let scheduler = TokioJobScheduler::new()
//!     .with_worker(JobKind::PreCache, Arc::new(HttpPreCacheWorker::new(&cache_root)?))
//!     .with_worker(JobKind::ArtworkFetch, Arc::new(HttpArtworkWorker::new(&artwork_dir)?));
//! ```

mod artwork;
mod background;
mod error;
mod precache;

pub use artwork::{store_downscaled, HttpArtworkWorker, ImageArtworkDecoder, DEFAULT_ARTWORK_SIZE};
pub use background::{JobWorker, TokioJobScheduler, DEFAULT_MAX_CONCURRENT_JOBS};
pub use error::WorkerError;
pub use precache::{HttpPreCacheWorker, CACHED_BYTES_PARAMETER};
