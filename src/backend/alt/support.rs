//! Shared plumbing for the alternate-backend family. None of these
//! backends allocate registers or implement the self-modifying-code
//! calling convention; per the alternate-backend contract they lower
//! straight off the flat MIR stream, giving every virtual register a
//! permanent home (a C-style local, a WebAssembly local, an LLVM `alloca`,
//! or a zero-page/memory cell) instead of coloring them into a scarce
//! register file.

use crate::mir::{Instr, LabelId, MirFunction, Reg};
use crate::types::Type;
use std::collections::HashMap;

/// Best-effort type for every register a function defines, filled in from
/// whichever instructions carry an explicit `Type` and defaulted for the
/// rest (`LoadVar`/`LoadParam`/`Call` results don't record one).
pub fn infer_register_types(f: &MirFunction, default: Type) -> HashMap<Reg, Type> {
    let mut types = HashMap::new();
    for (r, ty) in &f.params {
        types.insert(*r, ty.clone());
    }
    for instr in &f.instructions {
        match instr {
            Instr::ConstInt { dst, ty, .. } => {
                types.insert(*dst, ty.clone());
            }
            Instr::ConstBool { dst, .. } => {
                types.insert(*dst, Type::Bool);
            }
            Instr::ConstString { dst, .. } => {
                types.insert(*dst, Type::Pointer(Box::new(Type::u8())));
            }
            Instr::LoadGlobalAddr { dst, .. } => {
                types.insert(*dst, Type::Pointer(Box::new(Type::u8())));
            }
            Instr::Bin { dst, ty, .. } | Instr::Un { dst, ty, .. } => {
                types.insert(*dst, ty.clone());
            }
            Instr::LoadField { dst, ty, .. }
            | Instr::LoadElem { dst, ty, .. }
            | Instr::LoadIndirect { dst, ty, .. } => {
                types.insert(*dst, ty.clone());
            }
            _ => {}
        }
    }
    for instr in &f.instructions {
        if let Some(dst) = instr.result() {
            types.entry(dst).or_insert_with(|| default.clone());
        }
    }
    types
}

pub fn register_name(r: Reg) -> String {
    format!("v{}", r.0)
}

pub fn label_name(id: LabelId) -> String {
    format!("L{}", id.0)
}

/// Interns string literals as length-prefixed byte sequences, matching the
/// encoding every backend (core and alternate) uses: a single length byte
/// followed by the raw bytes, no null terminator.
#[derive(Debug, Default)]
pub struct StringPool {
    pub strings: Vec<String>,
    index: HashMap<String, usize>,
}

impl StringPool {
    pub fn intern(&mut self, s: &str) -> usize {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.strings.len();
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }

    pub fn bytes(idx: usize, s: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(s.len() + 1);
        out.push(s.len().min(255) as u8);
        out.extend_from_slice(s.as_bytes());
        let _ = idx;
        out
    }
}

/// True when `callee` is a mangled call to the `print` builtin, the one
/// intrinsic every alternate backend special-cases the same way the core
/// Z80 backend does: routed through a small runtime helper instead of a
/// real call to a user function.
pub fn is_print_callee(callee: &str) -> bool {
    callee.starts_with("print$")
}
