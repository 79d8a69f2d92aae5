//! # Slot Library
//!
//! Keeps a catalog of campaign art in sync with the folders it lives in.
//! The filesystem is the source of truth: each folder under the library root
//! is a slot game, the first folder below it names the category, and every
//! image file becomes an asset.
//!
//! ```text
//! storage/library/
//! ├── Dragon Quest!/          → SlotGame "Dragon Quest!" (slug dragon-quest)
//! │   ├── bg/sky.png          → Asset, BG, 64x64
//! │   ├── text/logo.webp      → Asset, TEXT
//! │   └── elements/coin.jpg   → Asset, ELEMENTS
//! └── Foo/
//!     └── unknowncat/pic.webp → Asset, ELEMENTS (unknown folder, counted)
//! ```
//!
//! # Architecture: Walk → Reconcile → Watch
//!
//! ```text
//! 1. Walk       library/   →  slot folders + discovered images   (read-only)
//! 2. Reconcile  images     →  catalog upserts, prunes, deletes   (one pass)
//! 3. Watch      fs events  →  debounced passes                   (resident)
//! ```
//!
//! A pass is idempotent: run twice over an unchanged tree, the second run
//! writes nothing. Everything a pass writes is keyed by values derived from
//! the filesystem alone (slug, storage key), so the catalog converges on the
//! tree no matter what state it started in.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`classify`] | Image extensions, MIME types, category folder names |
//! | [`slug`] | Slot slugs from folder names |
//! | [`metadata`] | Byte size and header-only pixel dimensions |
//! | [`walk`] | Lazy traversal of the library root, flat or recursive |
//! | [`storage`] | Storage keys to and from paths |
//! | [`catalog`] | `Catalog` trait with sled-backed and in-memory stores |
//! | [`reconcile`] | One full pass from filesystem to catalog |
//! | [`watch`] | Debounced rescans on filesystem change |
//! | [`config`] | `library.toml` loading, validation, and merging |
//! | [`output`] | CLI output formatting for reports and listings |
//!
//! # Design Decisions
//!
//! ## Embedded Catalog
//!
//! The catalog is a [sled](https://docs.rs/sled) database in a directory next
//! to the library. There is no server to run and the listing commands read
//! the same files the scanner writes. Only one process writes at a time.
//!
//! ## Header-Only Metadata
//!
//! Dimensions come from the image header via the `image` crate; pixel data is
//! never decoded. A file that cannot be read is still cataloged, without
//! dimensions, so one broken upload never hides the rest of a slot.
//!
//! ## Explicit Debouncing
//!
//! Watch mode coalesces event bursts with a small state machine (one deadline,
//! one pending flag) instead of a timer per event. At most one pass runs at a
//! time, and files still being written are waited out before a pass starts.

pub mod catalog;
pub mod classify;
pub mod config;
pub mod metadata;
pub mod output;
pub mod reconcile;
pub mod slug;
pub mod storage;
pub mod walk;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
