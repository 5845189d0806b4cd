//! # Matching Module
//!
//! Canonical item model plus the matcher/transformer used to reconcile the
//! same track across services.
//!
//! ## Overview
//!
//! Every service speaks its own JSON dialect. [`to_universal`] converts a
//! native record into a [`UniversalItem`], and [`score`] tells how likely two
//! universal items denote the same recording:
//!
//! - Identical ISRCs score `1.0`, different ISRCs score `0.0`
//! - Otherwise a weighted blend of title, artist, album and duration
//!
//! Everything here is pure; functions can be called from any worker without
//! synchronization.
//!
//! ## Usage
//!
//! ```
//! use core_matching::{find_best_match, UniversalItem};
//!
//! let source = UniversalItem::new("Blinding Lights", "The Weeknd");
//! let candidates = vec![
//!     UniversalItem::new("Blinding Lights (Remastered)", "The Weeknd"),
//!     UniversalItem::new("Save Your Tears", "The Weeknd"),
//! ];
//!
//! let (best, confidence) = find_best_match(&source, &candidates, 0.8).unwrap();
//! assert_eq!(best.title, "Blinding Lights (Remastered)");
//! assert!(confidence >= 0.8);
//! ```

pub mod error;
pub mod model;
pub mod normalize;
pub mod scoring;
pub mod transform;

pub use error::{MatchError, Result};
pub use model::{ItemAction, KnownService, SyncType, UniversalItem};
pub use normalize::{normalize, string_similarity};
pub use scoring::{find_best_match, score};
pub use transform::{matches_sync_type, supports_sync_type, to_universal};
