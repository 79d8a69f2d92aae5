//! Slot slug generation.
//!
//! A slot's slug is its natural key in the catalog. It is derived from the slot
//! folder name alone, so renaming a folder only in ways the slug ignores (case,
//! punctuation, emoji) keeps the same catalog record and just updates its
//! display name:
//!
//! - `Dragon Quest!` → `dragon-quest`
//! - `dragon quest`  → `dragon-quest` (same record)
//! - `🐉 Dragon`     → `dragon`
//! - `!!!`           → `slot`
//!
//! Two different folders can produce the same slug. That is not an error; see
//! the collision handling in [`crate::reconcile`].

/// Maximum slug length in characters.
pub const MAX_SLUG_LEN: usize = 80;

/// Slug used when nothing of the name survives normalization.
pub const FALLBACK_SLUG: &str = "slot";

/// Emoji and pictographic blocks removed before normalization.
const PICTOGRAPHIC_RANGES: &[(u32, u32)] = &[
    (0x1F000, 0x1FAFF), // mahjong .. symbols & pictographs extended-A
    (0x2600, 0x27BF),   // misc symbols, dingbats
    (0x2B00, 0x2BFF),   // arrows & stars
    (0xFE0E, 0xFE0F),   // variation selectors
    (0x200D, 0x200D),   // zero-width joiner
    (0x20E3, 0x20E3),   // combining keycap
    (0xE0020, 0xE007F), // tag characters (flag sequences)
];

fn is_pictographic(c: char) -> bool {
    let cp = c as u32;
    PICTOGRAPHIC_RANGES
        .iter()
        .any(|&(lo, hi)| (lo..=hi).contains(&cp))
}

/// Derive a slot slug from a display name. Pure and total.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();

    let mut slug = String::with_capacity(lowered.len());
    let mut in_gap = false;
    for c in lowered.chars().filter(|c| !is_pictographic(*c)) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if in_gap {
                slug.push('-');
                in_gap = false;
            }
            slug.push(c);
        } else if !slug.is_empty() {
            // Leading gaps are dropped here; trailing ones are never flushed.
            in_gap = true;
        }
    }

    // Everything left is ASCII, so byte truncation is char truncation.
    // Truncation happens after trimming, so a cut can end on a hyphen.
    slug.truncate(MAX_SLUG_LEN);

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}
