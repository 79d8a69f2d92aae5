//! CLI output formatting for passes and catalog listings.
//!
//! # Information-First Display
//!
//! Slot games are shown by display name with a positional index; the slug and
//! storage keys are secondary context on indented lines. Assets are grouped by
//! category so a listing reads like the folder it came from.
//!
//! # Output Format
//!
//! ## Pass report
//!
//! ```text
//! Library: storage/library
//! Slots
//!     2 seen (1 created, 0 renamed, 1 removed)
//! Assets
//!     5 cataloged (2 created, 1 updated, 2 unchanged)
//!     1 pruned
//! Skipped
//!     3 entries
//!     1 unknown category (filed as ELEMENTS)
//! ```
//!
//! ## Slots
//!
//! ```text
//! 001 Dragon Quest! (2 assets)
//!     Slug: dragon-quest
//! ```
//!
//! ## Assets
//!
//! ```text
//! Dragon Quest! (dragon-quest)
//! BG
//!     001 sky.png  64x64  image/png  4.1 KB
//!         Key: storage/library/Dragon Quest!/bg/sky.png
//! ELEMENTS
//!     001 coin.jpg  ?x?  image/jpeg  812 B
//!         Key: storage/library/Dragon Quest!/elements/coin.jpg
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::catalog::{Asset, SlotGame};
use crate::classify::Category;
use crate::reconcile::ScanReport;
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{} {}", n, one)
    } else {
        format!("{} {}", n, many)
    }
}

/// Human-readable byte size, one decimal place above a kilobyte.
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn format_dimensions(asset: &Asset) -> String {
    match (asset.width, asset.height) {
        (Some(w), Some(h)) => format!("{}x{}", w, h),
        _ => "?x?".to_string(),
    }
}

/// Slot header: positional index + name, with asset count.
///
/// ```text
/// 001 Dragon Quest! (2 assets)
/// ```
fn slot_header(index: usize, name: &str, assets: usize) -> String {
    format!(
        "{} {} ({})",
        format_index(index),
        name,
        plural(assets, "asset", "assets")
    )
}

// ============================================================================
// Pass report
// ============================================================================

pub fn format_scan_report(report: &ScanReport, library_root: &Path) -> Vec<String> {
    let mut lines = vec![format!("Library: {}", library_root.display())];

    lines.push("Slots".to_string());
    lines.push(format!(
        "{}{} seen ({} created, {} renamed, {} removed)",
        indent(1),
        report.slots_seen,
        report.slots_created,
        report.slots_updated,
        report.slots_removed
    ));
    if report.slug_collisions > 0 {
        lines.push(format!(
            "{}{} merged by shared slug",
            indent(1),
            plural(report.slug_collisions, "folder", "folders")
        ));
    }

    lines.push("Assets".to_string());
    lines.push(format!(
        "{}{} cataloged ({} created, {} updated, {} unchanged)",
        indent(1),
        report.assets_seen(),
        report.assets_created,
        report.assets_updated,
        report.assets_unchanged
    ));
    if report.assets_pruned > 0 {
        lines.push(format!("{}{} pruned", indent(1), report.assets_pruned));
    }

    let attention = report.skipped
        + report.unknown_category
        + report.metadata_failures
        + report.prunes_deferred;
    if attention > 0 {
        lines.push("Skipped".to_string());
        if report.skipped > 0 {
            lines.push(format!(
                "{}{}",
                indent(1),
                plural(report.skipped, "entry", "entries")
            ));
        }
        if report.unknown_category > 0 {
            lines.push(format!(
                "{}{} unknown category (filed as ELEMENTS)",
                indent(1),
                report.unknown_category
            ));
        }
        if report.metadata_failures > 0 {
            lines.push(format!(
                "{}{} without readable metadata",
                indent(1),
                report.metadata_failures
            ));
        }
        if report.prunes_deferred > 0 {
            lines.push(format!(
                "{}{} held back (unreadable folders)",
                indent(1),
                plural(report.prunes_deferred, "prune", "prunes")
            ));
        }
    }

    if report.writes() == 0 {
        lines.push("Catalog already up to date".to_string());
    }
    lines
}

pub fn print_scan_report(report: &ScanReport, library_root: &Path) {
    for line in format_scan_report(report, library_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Catalog listings
// ============================================================================

/// One line pair per slot game, with its asset count.
pub fn format_slot_list(slots: &[(SlotGame, usize)]) -> Vec<String> {
    if slots.is_empty() {
        return vec!["No slot games cataloged".to_string()];
    }
    let mut lines = Vec::new();
    for (i, (slot, assets)) in slots.iter().enumerate() {
        lines.push(slot_header(i + 1, &slot.name, *assets));
        lines.push(format!("{}Slug: {}", indent(1), slot.slug));
    }
    lines
}

pub fn print_slot_list(slots: &[(SlotGame, usize)]) {
    for line in format_slot_list(slots) {
        println!("{}", line);
    }
}

/// A slot's assets grouped by category, in catalog order within each group.
pub fn format_asset_list(slot: &SlotGame, assets: &[Asset]) -> Vec<String> {
    let mut lines = vec![format!("{} ({})", slot.name, slot.slug)];
    if assets.is_empty() {
        lines.push(format!("{}No assets", indent(1)));
        return lines;
    }

    for category in Category::ALL {
        let group: Vec<&Asset> = assets.iter().filter(|a| a.category == category).collect();
        if group.is_empty() {
            continue;
        }
        lines.push(category.to_string());
        for (i, asset) in group.iter().enumerate() {
            lines.push(format!(
                "{}{} {}  {}  {}  {}",
                indent(1),
                format_index(i + 1),
                asset.file_name,
                format_dimensions(asset),
                asset.mime_type,
                format_size(asset.size_bytes)
            ));
            lines.push(format!("{}Key: {}", indent(2), asset.storage_key));
        }
    }
    lines
}

pub fn print_asset_list(slot: &SlotGame, assets: &[Asset]) {
    for line in format_asset_list(slot, assets) {
        println!("{}", line);
    }
}

// ============================================================================
