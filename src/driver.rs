//! Compilation orchestration: wires the analyzer, CTIE, optimizer,
//! verifier, register allocator, and the six backends into the fixed
//! pipeline order from the system overview. Reading process argv or
//! environment variables into a `CompileOptions` is left to whatever CLI
//! embeds this crate; `Compiler::compile` takes an already-parsed
//! `ast::Program` and plain configuration data.

use crate::ast::Program;
use crate::backend::alt::{CBackend, GameBoyBackend, LlvmBackend, Mos6502Backend, WasmBackend};
use crate::backend::z80::target::Target;
use crate::backend::z80::Z80Backend;
use crate::ctie::{self, interpreter::Budget};
use crate::error::{Diagnostic, ErrorSeverity};
use crate::mir::MirModule;
use crate::optimizer::{self, OptimizerOptions, OptimizerStats};
use crate::regalloc::{self, RegisterClass};
use crate::verifier;
use std::collections::HashMap;

/// Which of the six named backends a compilation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Z80,
    Sixty502,
    C,
    Wasm,
    Llvm,
    GameBoy,
}

impl BackendKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "z80" => Some(BackendKind::Z80),
            "6502" => Some(BackendKind::Sixty502),
            "c" => Some(BackendKind::C),
            "wasm" => Some(BackendKind::Wasm),
            "llvm" => Some(BackendKind::Llvm),
            "gb" => Some(BackendKind::GameBoy),
            _ => None,
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Z80
    }
}

/// Module search configuration, built from `MINZ_PATH`/`MINZ_STDLIB` by a
/// driver that wants the environment-sensitive defaults, or populated by
/// hand for a hermetic build.
#[derive(Debug, Clone, Default)]
pub struct ModuleSearchConfig {
    pub module_search_path: Vec<String>,
    pub stdlib_dir: Option<String>,
}

impl ModuleSearchConfig {
    pub fn from_env() -> Self {
        let module_search_path = std::env::var("MINZ_PATH")
            .map(|v| v.split(':').filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        let stdlib_dir = std::env::var("MINZ_STDLIB").ok();
        Self { module_search_path, stdlib_dir }
    }
}

/// Verbosity level; maps onto a `tracing` filter the way the CLI's
/// `VERBOSE` option is documented to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    #[default]
    Quiet,
    Info,
    Debug,
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub backend: BackendKind,
    /// Z80 platform variant; ignored by every other backend.
    pub target: Target,
    pub optimize: bool,
    pub enable_smc: bool,
    pub enable_ctie: bool,
    pub verbosity: Verbosity,
    pub module_search: ModuleSearchConfig,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            target: Target::ZxSpectrum,
            optimize: true,
            enable_smc: true,
            enable_ctie: true,
            verbosity: Verbosity::default(),
            module_search: ModuleSearchConfig::default(),
        }
    }
}

/// Everything a driver needs to report a compilation's outcome: the
/// emitted text (if codegen succeeded), every diagnostic raised along the
/// way, and the CTIE/optimizer statistics a `--verbose` mode would print.
#[derive(Debug, Clone, Default)]
pub struct CompileResult {
    pub assembly: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub ctie_stats: ctie::Stats,
    pub optimizer_stats: OptimizerStats,
    pub ir_instruction_count: usize,
    pub emitted_instruction_count: usize,
}

impl CompileResult {
    pub fn has_fatal_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == ErrorSeverity::Fatal)
    }

    /// `true` once codegen produced assembly and no fatal diagnostic was
    /// raised at any earlier phase.
    pub fn succeeded(&self) -> bool {
        self.assembly.is_some() && !self.has_fatal_errors()
    }
}

pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn compile(&self, program: Program, file: &str) -> CompileResult {
        let module_name = program.module_name.clone();
        let mut analyzer = crate::analyzer::Analyzer::new(&module_name, file, None);
        {
            let _span = tracing::info_span!("analyze", module = %module_name).entered();
            analyzer.analyze(program);
        }

        let mut diagnostics: Vec<Diagnostic> = analyzer.sink.diagnostics().to_vec();
        let mut module = analyzer.mir;
        let ir_instruction_count = instruction_count(&module);

        if diagnostics.iter().any(|d| d.severity == ErrorSeverity::Fatal) {
            tracing::warn!(module = %module_name, "analysis reported fatal diagnostics, aborting before codegen");
            return CompileResult { diagnostics, ir_instruction_count, ..Default::default() };
        }

        let mut ctie_stats = ctie::Stats::default();
        if self.options.enable_ctie {
            let _span = tracing::info_span!("ctie", module = %module_name).entered();
            ctie_stats = ctie::run(&mut module, Budget::default());
            tracing::info!(
                eliminated = ctie_stats.calls_eliminated,
                pure = ctie_stats.functions_pure,
                "ctie complete"
            );
        }

        let mut optimizer_stats = OptimizerStats::default();
        if self.options.optimize {
            let _span = tracing::info_span!("optimize", module = %module_name).entered();
            let opts = OptimizerOptions { enable_inlining: true, enable_smc: self.options.enable_smc, inline_threshold: 24 };
            optimizer_stats = optimizer::run(&mut module, opts);
            tracing::info!(
                folded = optimizer_stats.constants_folded,
                removed = optimizer_stats.instructions_removed,
                smc_functions = optimizer_stats.functions_using_smc,
                "optimizer complete"
            );
        }

        if let Err(e) = verifier::verify_module(&module) {
            diagnostics.push(Diagnostic::new(e, file));
            return CompileResult { diagnostics, ctie_stats, optimizer_stats, ir_instruction_count, ..Default::default() };
        }

        match self.generate(&module) {
            Ok(assembly) => {
                let emitted_instruction_count = count_emitted_instructions(&assembly);
                CompileResult {
                    assembly: Some(assembly),
                    diagnostics,
                    ctie_stats,
                    optimizer_stats,
                    ir_instruction_count,
                    emitted_instruction_count,
                }
            }
            Err(e) => {
                tracing::warn!(module = %module_name, error = %e, "codegen failed");
                diagnostics.push(Diagnostic::new(e, file));
                CompileResult { diagnostics, ctie_stats, optimizer_stats, ir_instruction_count, ..Default::default() }
            }
        }
    }

    fn generate(&self, module: &MirModule) -> crate::error::Result<String> {
        match self.options.backend {
            BackendKind::Z80 => {
                let _span = tracing::info_span!("regalloc", module = %module.name).entered();
                let mut allocations = HashMap::new();
                for name in &module.function_order {
                    allocations.insert(name.clone(), regalloc::allocate(&module.functions[name], RegisterClass::z80()));
                }
                drop(_span);
                let _span = tracing::info_span!("codegen", backend = "z80").entered();
                Z80Backend::new(self.options.target).generate(module, &allocations)
            }
            BackendKind::Sixty502 => {
                let _span = tracing::info_span!("codegen", backend = "6502").entered();
                Mos6502Backend::new().generate(module)
            }
            BackendKind::C => {
                let _span = tracing::info_span!("codegen", backend = "c").entered();
                CBackend::new().generate(module)
            }
            BackendKind::Wasm => {
                let _span = tracing::info_span!("codegen", backend = "wasm").entered();
                WasmBackend::new().generate(module)
            }
            BackendKind::Llvm => {
                let _span = tracing::info_span!("codegen", backend = "llvm").entered();
                LlvmBackend::new().generate(module)
            }
            BackendKind::GameBoy => {
                let _span = tracing::info_span!("codegen", backend = "gb").entered();
                GameBoyBackend::new().generate(module)
            }
        }
    }
}

fn instruction_count(module: &MirModule) -> usize {
    module.function_order.iter().map(|n| module.functions[n].instructions.len()).sum()
}

/// Counts emitted lines that are real instructions: neither blank, a
/// comment, nor a bare label. An approximation, but a stable one across
/// runs of the same input, which is all the statistics field promises.
fn count_emitted_instructions(asm: &str) -> usize {
    asm.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(';') && !l.ends_with(':'))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::error::Span;

    fn sample_program() -> Program {
        Program {
            module_name: "main".into(),
            imports: vec![],
            items: vec![Item::Function(FunctionDef {
                name: "main".into(),
                params: vec![],
                ret: None,
                type_params: vec![],
                body: Block { statements: vec![Statement::Return(None, Span::default())], span: Span::default() },
                smc_requested: None,
                is_extern: false,
                is_pub: true,
                span: Span::default(),
            })],
        }
    }

    #[test]
    fn compiles_trivial_program_to_z80_assembly() {
        let compiler = Compiler::new(CompileOptions::default());
        let result = compiler.compile(sample_program(), "main.mz");
        assert!(result.succeeded(), "diagnostics: {:?}", result.diagnostics);
        assert!(result.assembly.unwrap().contains("main:"));
    }

    #[test]
    fn compiles_trivial_program_to_every_alternate_backend() {
        for kind in [BackendKind::Sixty502, BackendKind::C, BackendKind::Wasm, BackendKind::Llvm, BackendKind::GameBoy] {
            let options = CompileOptions { backend: kind, ..CompileOptions::default() };
            let compiler = Compiler::new(options);
            let result = compiler.compile(sample_program(), "main.mz");
            assert!(result.succeeded(), "{:?} failed: {:?}", kind, result.diagnostics);
        }
    }

    #[test]
    fn backend_kind_parses_every_documented_name() {
        for (name, kind) in [
            ("z80", BackendKind::Z80),
            ("6502", BackendKind::Sixty502),
            ("c", BackendKind::C),
            ("wasm", BackendKind::Wasm),
            ("llvm", BackendKind::Llvm),
            ("gb", BackendKind::GameBoy),
        ] {
            assert_eq!(BackendKind::parse(name), Some(kind));
        }
        assert_eq!(BackendKind::parse("bogus"), None);
    }
}
