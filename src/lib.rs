//! mdlive
//!
//! A live markdown-preview engine: load a file, render it to HTML, and
//! re-render whenever the file changes on disk.
//!
//! This library provides:
//! - Markdown to HTML rendering
//! - A shared, token-based file-watch registry
//! - Per-document sessions exposing observable source/markup slots
//! - Configuration management for the preview binary

pub mod config;
pub mod markdown;
pub mod session;
pub mod watch;

// Re-exports for clean public API
pub use config::Config;
pub use markdown::{MarkdownOptions, render};
pub use session::{DocumentSession, LoadError};
pub use watch::{WatchRegistry, WatchToken};
