//! Fuzzy filename scoring.
//!
//! [`score_filename`] compares a candidate file name with the name the caller
//! asked for and returns a similarity in `[0.0, 1.0]`:
//!
//! | situation | score |
//! |-----------|-------|
//! | identical names | 1.0 |
//! | identical ignoring case | 0.99 |
//! | same extension | `0.9 * stem + 0.1` |
//! | target has no extension | `0.98 * stem` |
//! | different extensions | `0.75 * stem` |
//!
//! `stem` is the Jaro-Winkler similarity of the lowercased file stems, raised
//! to a containment score when one stem contains the other (so `report`
//! still finds `annual_report_final`).

use std::path::Path;

const CASE_INSENSITIVE_MATCH: f64 = 0.99;
const CONTAINMENT_BASE: f64 = 0.8;
const CONTAINMENT_SPAN: f64 = 0.15;
const NO_EXTENSION_FACTOR: f64 = 0.98;
const SAME_EXTENSION_WEIGHT: f64 = 0.9;
const EXTENSION_MISMATCH_FACTOR: f64 = 0.75;

/// Similarity between the file name `candidate` and the requested `target`.
pub fn score_filename(candidate: &str, target: &str) -> f64 {
    if candidate == target {
        return 1.0;
    }
    if candidate.to_lowercase() == target.to_lowercase() {
        return CASE_INSENSITIVE_MATCH;
    }

    let (cand_stem, cand_ext) = split_name(candidate);
    let (target_stem, target_ext) = split_name(target);
    let stem = stem_similarity(&cand_stem, &target_stem);

    match (target_ext, cand_ext) {
        (None, _) => NO_EXTENSION_FACTOR * stem,
        (Some(t), Some(c)) if t == c => SAME_EXTENSION_WEIGHT * stem + (1.0 - SAME_EXTENSION_WEIGHT),
        _ => EXTENSION_MISMATCH_FACTOR * stem,
    }
}

fn split_name(name: &str) -> (String, Option<String>) {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    (stem, ext)
}

fn stem_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let jw = strsim::jaro_winkler(a, b);

    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let containment = if long.contains(short) {
        let ratio = short.chars().count() as f64 / long.chars().count() as f64;
        CONTAINMENT_BASE + CONTAINMENT_SPAN * ratio
    } else {
        0.0
    };

    jw.max(containment)
}
