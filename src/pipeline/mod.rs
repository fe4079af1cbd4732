//! The email-to-message transform pipeline.
//!
//! Each matching email flows through:
//! 1. `extract` — landmark queries over the HTML body
//! 2. `markup` — HTML → Markdown conversion and sanitization
//! 3. `split` — chunking to the sink's description limit
//! 4. `format` — card assembly for delivery

pub mod extract;
pub mod format;
pub mod markup;
pub mod split;
