//! End-to-end compilation tests exercising the full pipeline through
//! [`minzc::driver::Compiler`], one scenario per headline compiler
//! behavior: constant folding, the self-modifying-code calling
//! convention (plain and recursive), string literals, dead-code removal,
//! and overload resolution.

use minzc::ast::*;
use minzc::driver::{BackendKind, CompileOptions, Compiler};
use minzc::error::Span;

fn span() -> Span {
    Span::default()
}

fn ident(name: &str) -> Expr {
    Expr { kind: ExprKind::Ident(name.into()), span: span() }
}

fn lit_int(n: i64) -> Expr {
    Expr { kind: ExprKind::Literal(Literal::Int(n)), span: span() }
}

fn ty_named(name: &str) -> TypeExpr {
    TypeExpr { kind: TypeExprKind::Named(name.into()), span: span() }
}

fn param(name: &str, ty: &str) -> Param {
    Param { name: name.into(), ty: ty_named(ty), span: span() }
}

fn program_with(functions: Vec<FunctionDef>) -> Program {
    Program { module_name: "m".into(), imports: vec![], items: functions.into_iter().map(Item::Function).collect() }
}

#[test]
fn folds_constant_arithmetic_before_codegen() {
    // return 2 + 3, with no runtime value ever entering the expression.
    let f = FunctionDef {
        name: "answer".into(),
        params: vec![],
        ret: Some(ty_named("u8")),
        type_params: vec![],
        body: Block {
            statements: vec![Statement::Return(
                Some(Expr {
                    kind: ExprKind::Binary { op: BinOp::Add, lhs: Box::new(lit_int(2)), rhs: Box::new(lit_int(3)) },
                    span: span(),
                }),
                span(),
            )],
            span: span(),
        },
        smc_requested: None,
        is_extern: false,
        is_pub: true,
        span: span(),
    };

    let compiler = Compiler::new(CompileOptions::default());
    let result = compiler.compile(program_with(vec![f]), "answer.mz");
    assert!(result.succeeded(), "diagnostics: {:?}", result.diagnostics);
    assert!(result.optimizer_stats.constants_folded >= 1);
    assert!(result.assembly.unwrap().contains(", 5"));
}

#[test]
fn small_function_compiles_under_self_modifying_convention() {
    // One parameter and no recursion: the optimizer's SMC-decision pass
    // defaults this to the self-modifying calling convention, so its
    // prologue patches the argument directly into its own instruction
    // stream instead of reading a stack slot.
    let f = FunctionDef {
        name: "doubled".into(),
        params: vec![param("x", "u8")],
        ret: Some(ty_named("u8")),
        type_params: vec![],
        body: Block {
            statements: vec![Statement::Return(
                Some(Expr {
                    kind: ExprKind::Binary { op: BinOp::Add, lhs: Box::new(ident("x")), rhs: Box::new(ident("x")) },
                    span: span(),
                }),
                span(),
            )],
            span: span(),
        },
        smc_requested: None,
        is_extern: false,
        is_pub: true,
        span: span(),
    };

    let compiler = Compiler::new(CompileOptions::default());
    let result = compiler.compile(program_with(vec![f]), "doubled.mz");
    assert!(result.succeeded(), "diagnostics: {:?}", result.diagnostics);
    assert_eq!(result.optimizer_stats.functions_using_smc, 1);
    let asm = result.assembly.unwrap();
    assert!(asm.contains("_patch_0"));
}

#[test]
fn recursive_self_modifying_call_saves_and_restores_its_own_patch_slot() {
    // fact(n) = if n == 0 { 1 } else { n * fact(n - 1) }, written with the
    // constructs this AST actually has: a `case` on `n` with a literal
    // arm and a wildcard arm recursing.
    let recurse = Expr {
        kind: ExprKind::Binary {
            op: BinOp::Mul,
            lhs: Box::new(ident("n")),
            rhs: Box::new(Expr {
                kind: ExprKind::Call {
                    callee: "fact".into(),
                    args: vec![Arg {
                        value: Expr {
                            kind: ExprKind::Binary { op: BinOp::Sub, lhs: Box::new(ident("n")), rhs: Box::new(lit_int(1)) },
                            span: span(),
                        },
                        span: span(),
                    }],
                },
                span: span(),
            }),
        },
        span: span(),
    };

    let f = FunctionDef {
        name: "fact".into(),
        params: vec![param("n", "u8")],
        ret: Some(ty_named("u8")),
        type_params: vec![],
        body: Block {
            statements: vec![Statement::Case {
                scrutinee: ident("n"),
                arms: vec![
                    CaseArm { pattern: Pattern::Literal(Literal::Int(0)), body: lit_int(1), span: span() },
                    CaseArm { pattern: Pattern::Wildcard, body: recurse, span: span() },
                ],
                span: span(),
            }],
            span: span(),
        },
        smc_requested: None,
        is_extern: false,
        is_pub: true,
        span: span(),
    };

    let compiler = Compiler::new(CompileOptions::default());
    let result = compiler.compile(program_with(vec![f]), "fact.mz");
    assert!(result.succeeded(), "diagnostics: {:?}", result.diagnostics);
    let asm = result.assembly.unwrap();
    assert!(asm.contains("push af"));
    assert!(asm.contains("pop af"));
}

#[test]
fn string_literal_print_call_lowers_to_print_helper() {
    let f = FunctionDef {
        name: "greet".into(),
        params: vec![],
        ret: None,
        type_params: vec![],
        body: Block {
            statements: vec![
                Statement::Expr(Expr { kind: ExprKind::Print(vec![PrintArg::Literal("Hi".into())]), span: span() }),
                Statement::Return(None, span()),
            ],
            span: span(),
        },
        smc_requested: None,
        is_extern: false,
        is_pub: true,
        span: span(),
    };

    let compiler = Compiler::new(CompileOptions::default());
    let result = compiler.compile(program_with(vec![f]), "greet.mz");
    assert!(result.succeeded(), "diagnostics: {:?}", result.diagnostics);
    let asm = result.assembly.unwrap();
    assert!(asm.contains("call __print"));
    assert!(asm.contains("__print:"));
}

#[test]
fn dead_local_computation_is_removed_before_codegen() {
    // `unused` is computed and never read; dead-code elimination should
    // drop it, leaving only the instructions the return value needs.
    let f = FunctionDef {
        name: "only_one_live_path".into(),
        params: vec![],
        ret: Some(ty_named("u8")),
        type_params: vec![],
        body: Block {
            statements: vec![
                Statement::Let {
                    name: "unused".into(),
                    ty: None,
                    mutable: false,
                    value: Expr {
                        kind: ExprKind::Binary { op: BinOp::Mul, lhs: Box::new(lit_int(40)), rhs: Box::new(lit_int(2)) },
                        span: span(),
                    },
                    span: span(),
                },
                Statement::Return(Some(lit_int(1)), span()),
            ],
            span: span(),
        },
        smc_requested: None,
        is_extern: false,
        is_pub: true,
        span: span(),
    };

    let compiler = Compiler::new(CompileOptions::default());
    let result = compiler.compile(program_with(vec![f]), "dead.mz");
    assert!(result.succeeded(), "diagnostics: {:?}", result.diagnostics);
    assert!(result.optimizer_stats.instructions_removed >= 1);
    assert!(!result.assembly.unwrap().contains(", 40"));
}

#[test]
fn calls_resolve_to_the_best_matching_overload() {
    // Two `describe` overloads, one per width; a call with a `u8` literal
    // argument must pick the exact-match overload, not the widening one.
    let narrow = FunctionDef {
        name: "describe".into(),
        params: vec![param("v", "u8")],
        ret: Some(ty_named("u8")),
        type_params: vec![],
        body: Block { statements: vec![Statement::Return(Some(lit_int(8)), span())], span: span() },
        smc_requested: None,
        is_extern: false,
        is_pub: true,
        span: span(),
    };
    let wide = FunctionDef {
        name: "describe".into(),
        params: vec![param("v", "u16")],
        ret: Some(ty_named("u8")),
        type_params: vec![],
        body: Block { statements: vec![Statement::Return(Some(lit_int(16)), span())], span: span() },
        smc_requested: None,
        is_extern: false,
        is_pub: true,
        span: span(),
    };
    let caller = FunctionDef {
        name: "main".into(),
        params: vec![],
        ret: Some(ty_named("u8")),
        type_params: vec![],
        body: Block {
            statements: vec![Statement::Return(
                Some(Expr {
                    kind: ExprKind::Call { callee: "describe".into(), args: vec![Arg { value: lit_int(1), span: span() }] },
                    span: span(),
                }),
                span(),
            )],
            span: span(),
        },
        smc_requested: None,
        is_extern: false,
        is_pub: true,
        span: span(),
    };

    let compiler = Compiler::new(CompileOptions { optimize: false, ..CompileOptions::default() });
    let result = compiler.compile(program_with(vec![narrow, wide, caller]), "overload.mz");
    assert!(result.succeeded(), "diagnostics: {:?}", result.diagnostics);
    let asm = result.assembly.unwrap();
    assert!(asm.contains("describe$u8"));
    assert!(!asm.contains("call describe$u16"));
}

#[test]
fn every_alternate_backend_accepts_the_same_module() {
    let f = FunctionDef {
        name: "id".into(),
        params: vec![param("x", "u8")],
        ret: Some(ty_named("u8")),
        type_params: vec![],
        body: Block { statements: vec![Statement::Return(Some(ident("x")), span())], span: span() },
        smc_requested: None,
        is_extern: false,
        is_pub: true,
        span: span(),
    };

    for backend in [BackendKind::Sixty502, BackendKind::C, BackendKind::Wasm, BackendKind::Llvm, BackendKind::GameBoy] {
        let options = CompileOptions { backend, ..CompileOptions::default() };
        let compiler = Compiler::new(options);
        let result = compiler.compile(program_with(vec![f.clone()]), "id.mz");
        assert!(result.succeeded(), "{:?} failed: {:?}", backend, result.diagnostics);
    }
}
