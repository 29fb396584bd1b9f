//! Alternate backends: thin `BackendCapability` implementations for every
//! secondary target MinZ supports besides the core Z80 backend. None of
//! these run the register allocator or implement the self-modifying-code
//! calling convention — per the alternate-backend contract they consume
//! the same MIR and fall back to giving every virtual register a
//! permanent home of their own (a C local, an LLVM `alloca`, a
//! WebAssembly local, or a plain memory cell), trading code density for
//! a much smaller backend.

pub mod c;
pub mod gameboy;
pub mod llvm;
pub mod sixty502;
mod support;
pub mod wasm;

pub use c::CBackend;
pub use gameboy::GameBoyBackend;
pub use llvm::LlvmBackend;
pub use sixty502::Mos6502Backend;
pub use wasm::WasmBackend;

use super::sanitize_label as sanitize;
use super::BackendCapability;
