//! Core pipeline of the pyRobotC translator.
//!
//! Translates a small statically-annotated Python subset into RobotC. The
//! pipeline for one source file is:
//!
//!   source .py
//!     -> frontend   (generic tree, e.g. the `ast` module dumped as JSON)
//!     -> retag      (tagged node model)
//!     -> lower      (registries, imports, class lowering)
//!     -> render     (RobotC text)
//!
//! `compiler` drives the pipeline across every imported unit and caches
//! each one by canonical path. The CLI only has to write the results out.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Front-end: generic trees and the tagged node model
// ---------------------------------------------------------------------

pub mod generic;
pub mod frontend;
pub mod ast;
pub mod retag;

// ---------------------------------------------------------------------
// Semantic layers: registries and class lowering
// ---------------------------------------------------------------------

pub mod registry;
pub mod lower;

// ---------------------------------------------------------------------
// Intrinsics and literal encoding
// ---------------------------------------------------------------------

pub mod intrinsics;
pub mod escape;

// ---------------------------------------------------------------------
// Back-end: rendering and compiler orchestration
// ---------------------------------------------------------------------

pub mod options;
pub mod render;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{CompilationFailure, CompilationOutput, Compiler, compile_program};
pub use diagnostic::{Diagnostic, Severity};
pub use error::CoreError;
pub use frontend::{Frontend, JsonFrontend, PythonFrontend};
pub use options::{CompilerOptions, RenderOptions};
