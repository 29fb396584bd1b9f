//! Compile-Time Interface Execution: purity analysis plus a MIR
//! interpreter that replaces calls to pure functions on constant
//! arguments with the literal result.

pub mod interpreter;
pub mod purity;

use crate::mir::{Instr, MirModule, Reg};
use interpreter::{Budget, Interpreter, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub functions_analyzed: usize,
    pub functions_pure: usize,
    pub calls_eliminated: usize,
    pub bytes_eliminated: usize,
}

/// Tracks, per function being rewritten, which registers currently hold a
/// compile-time-known value (and what it is), so later call sites in the
/// same straight-line sequence can also become eligible.
struct ConstEnv {
    known: HashMap<Reg, Value>,
}

impl ConstEnv {
    fn new() -> Self {
        Self { known: HashMap::new() }
    }
}

/// Runs CTIE over every function in `module`, eliminating eligible calls
/// in place. Purity is computed once up front; constant-ness is tracked
/// per function via a single forward scan, invalidated the same way the
/// optimizer invalidates its own constant tracking at labels (conservative:
/// any jump target clears tracked constants for registers redefined on
/// another path, which a single linear scan cannot express precisely, so
/// this pass clears all tracked constants at every label).
pub fn run(module: &mut MirModule, budget: Budget) -> Stats {
    let purity = purity::analyze(module);
    let mut stats = Stats {
        functions_analyzed: module.function_order.len(),
        functions_pure: purity.values().filter(|p| **p).count(),
        ..Default::default()
    };

    let names: Vec<String> = module.function_order.clone();
    for name in names {
        let snapshot = clone_module_for_interp(module);
        let f = module.functions.get_mut(&name).unwrap();
        let mut env = ConstEnv::new();
        let mut rewritten = Vec::with_capacity(f.instructions.len());

        for instr in f.instructions.drain(..) {
            match &instr {
                Instr::Label(_) => {
                    env.known.clear();
                    rewritten.push(instr);
                }
                Instr::ConstInt { dst, value, .. } => {
                    env.known.insert(*dst, Value::Int(*value));
                    rewritten.push(instr);
                }
                Instr::ConstBool { dst, value } => {
                    env.known.insert(*dst, Value::Bool(*value));
                    rewritten.push(instr);
                }
                Instr::ConstString { dst, value } => {
                    env.known.insert(*dst, Value::Str(value.clone()));
                    rewritten.push(instr);
                }
                Instr::Call { dst, callee, args } if purity.get(callee).copied().unwrap_or(false) => {
                    let arg_values: Option<Vec<Value>> =
                        args.iter().map(|r| env.known.get(r).cloned()).collect();
                    match (dst, arg_values) {
                        (Some(d), Some(values)) => {
                            let mut interp = Interpreter::new(&snapshot, budget);
                            match interp.run(callee, &values) {
                                Ok(Some(result)) => {
                                    stats.calls_eliminated += 1;
                                    stats.bytes_eliminated += 3; // one CALL + averaged arg-write overhead
                                    env.known.insert(*d, result.clone());
                                    rewritten.push(const_instr(*d, result));
                                }
                                _ => {
                                    env.known.remove(d);
                                    rewritten.push(instr);
                                }
                            }
                        }
                        _ => {
                            if let Some(d) = dst {
                                env.known.remove(d);
                            }
                            rewritten.push(instr);
                        }
                    }
                }
                Instr::Call { dst, .. } => {
                    if let Some(d) = dst {
                        env.known.remove(d);
                    }
                    rewritten.push(instr);
                }
                other => {
                    if let Some(d) = other.result() {
                        env.known.remove(&d);
                    }
                    rewritten.push(instr);
                }
            }
        }
        f.instructions = rewritten;
    }

    stats
}

fn const_instr(dst: Reg, value: Value) -> Instr {
    match value {
        Value::Int(n) => Instr::ConstInt { dst, value: n, ty: crate::types::Type::i16() },
        Value::Bool(b) => Instr::ConstBool { dst, value: b },
        Value::Str(s) => Instr::ConstString { dst, value: s },
    }
}

/// The interpreter borrows the module immutably while CTIE is mutating the
/// function currently being rewritten; a cheap structural clone keeps the
/// pass a single forward scan without fighting the borrow checker over
/// self-referential interpretation.
fn clone_module_for_interp(module: &MirModule) -> MirModule {
    let mut clone = MirModule::new(module.name.clone());
    clone.string_table = module.string_table.clone();
    for name in &module.function_order {
        clone.add_function(module.functions[name].clone());
    }
    clone
}

