//! # MinZ Compiler
//!
//! MinZ compiles a small systems-programming language to Z80 assembly (and,
//! through a set of thinner alternate backends, to 6502, C, LLVM IR,
//! WebAssembly, and Game Boy assembly). The pipeline is a fixed sequence of
//! independently testable stages:
//!
//! ```text
//! ast::Program -> analyzer -> mir::MirModule -> ctie -> optimizer
//!              -> verifier -> regalloc -> backend -> assembly text
//! ```
//!
//! [`driver::Compiler`] wires these stages together; everything upstream of
//! it (parsing source text into an [`ast::Program`]) and downstream of it
//! (reading process argv, writing the emitted assembly to disk) is left to
//! whatever embeds this crate.
//!
//! The headline feature is compile-time-decided self-modifying code: a
//! function's parameters are patched directly into its instruction stream
//! rather than passed on a stack, when the optimizer's SMC-decision pass
//! judges it safe and profitable. [`optimizer`] makes that call;
//! [`backend::z80`] is the only backend that acts on it, since SMC is
//! meaningless on targets that don't execute from writable memory the way a
//! Z80 does.

pub mod analyzer;
pub mod ast;
pub mod backend;
pub mod ctie;
pub mod driver;
pub mod error;
pub mod mir;
pub mod optimizer;
pub mod regalloc;
pub mod types;
pub mod verifier;

pub use driver::{BackendKind, CompileOptions, CompileResult, Compiler, ModuleSearchConfig, Verbosity};
pub use error::{Diagnostic, Error, ErrorSeverity, Result, Span};
pub use mir::{MirFunction, MirModule};
pub use types::Type;

/// Compiler version, for driver-reported `--version` banners.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
