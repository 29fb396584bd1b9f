//! Backend layer: the Z80 backend is the core target; alternate backends
//! share a thin capability contract so MIR itself stays target-neutral.

pub mod alt;
pub mod z80;

use crate::error::Result;
use crate::mir::MirFunction;
use crate::types::Type;

/// The capability set an alternate backend exposes. The Z80 backend
/// additionally implements a full `z80::Z80Backend::generate` driver;
/// alternate backends only need these three entry points, per the
/// alternate-backend contract.
pub trait BackendCapability {
    fn lower_function(&mut self, f: &MirFunction) -> Result<String>;
    fn lower_global(&mut self, name: &str, ty: &Type) -> String;
    fn emit_string_literal(&mut self, s: &str) -> String;
}

/// Sanitizes a MIR name into an assembler-safe label: identifier
/// characters and underscores only, module path separators flattened.
pub fn sanitize_label(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
