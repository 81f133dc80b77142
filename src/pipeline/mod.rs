//! Pipeline stages for turning a timetable PDF into typed entries.
//!
//! Each submodule implements exactly one step:
//!
//! ```text
//! input ──▶ encode ──▶ llm ──▶ sanitize
//! (file)    (base64)   (model)  (JSON → Timetable)
//! ```
//!
//! 1. [`input`]    — read the file, enforce the size limit and `%PDF` magic,
//!    hash the bytes for the extraction cache
//! 2. [`encode`]   — base64-wrap the document as an inline attachment
//! 3. [`llm`]      — the only stage with network I/O; caller-controlled retry
//! 4. [`sanitize`] — recover JSON from free-form model text and validate it

pub mod encode;
pub mod input;
pub mod llm;
pub mod sanitize;
