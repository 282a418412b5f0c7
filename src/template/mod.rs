//! Structured document templates.
//!
//! [`pptx`] loads a presentation into a mutable object graph (slides →
//! containers → paragraphs/runs or table cells) and saves it back; [`xml`] is
//! the element tree underneath. The placeholder logic itself lives in
//! [`crate::merge`].

pub mod pptx;
pub mod xml;

pub use pptx::{Cell, Container, Presentation, Run, Slide, TableFrame, TextFrame};
