//! Console definitions for the engine's interactive sub-consoles.
//!
//! This module defines the markers each sub-console prints around its
//! output, and the extractor that strips them.

mod console;
mod extract;

pub use console::{ConsoleMarkers, ConsoleMode, MATA, PYTHON};
pub use extract::{extract_interactive, extract_settled};
