//! Arabic text utilities
//!
//! Deterministic, idempotent transforms with no I/O:
//! - Normalization (diacritic strip, alef/yeh/teh-marbuta folding)
//! - Script detection and quoted-phrase extraction
//! - Dynamic similarity thresholds for short queries
//! - HTML paragraph extraction for translation matching

pub mod normalize;
pub mod paragraphs;

pub use normalize::{
    analyze, detect_script, dynamic_threshold, extract_phrases, normalize, skip_semantic,
};
pub use paragraphs::{extract_paragraphs, Paragraph};
