//! Prompt templates: loading and rendering.
//!
//! The coordinator treats templates as opaque formatting targets with
//! named slots ({{task}}, {{code}}, {{error_feedback}}, {{metaprompt}});
//! it never composes prompt text itself. Defaults ship embedded in the
//! binary and can be overridden from a templates directory.

pub mod loader;
pub mod render;

pub use loader::PromptLoader;
pub use render::PromptRenderer;
