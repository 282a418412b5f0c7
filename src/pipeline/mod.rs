//! Pipeline stages that leave the process: conversion, optimisation,
//! publishing, and the scratch directories they share.
//!
//! ## Data Flow
//!
//! ```text
//! _output/*.pptx ──▶ convert ──▶ _output/*.pdf ──▶ optimize ──▶ results/*.pdf ──▶ publish
//!                  (LibreOffice)                 (Ghostscript)                  (Drive)
//! ```
//!
//! 1. [`convert`]:  one bulk LibreOffice run over the staging directory
//! 2. [`optimize`]: one Ghostscript run per document, retried on crashes
//! 3. [`publish`]:  upload seam; the Drive adapter lives in `google`
//!
//! [`process`] is the shared child-process runner and [`scratch`] owns the
//! two staging directories.

pub mod convert;
pub mod optimize;
pub mod process;
pub mod publish;
pub mod scratch;
