//! Semantic analysis: AST -> typed MIR module.
//!
//! Name resolution, module loading, overload resolution and mangling,
//! type checking, pattern matching, and metafunction expansion all happen
//! here, in one syntax-directed walk that emits MIR directly (see
//! `crate::mir::lowering` for the shape rules this walk follows).

pub mod metafunctions;
pub mod overload;

use crate::ast::*;
use crate::ctie::interpreter::{Budget, Interpreter, Value as CtieValue, EMIT_INTRINSIC};
use crate::error::{Diagnostic, DiagnosticSink, Error, Result, Span};
use crate::mir::{lowering, BinOp as MBinOp, Instr, LabelId, MirFunction, MirModule, Reg, UnOp as MUnOp};
use crate::types::{EnumDef, EnumVariant, FieldDef, InterfaceDef, InterfaceMethod, Module, StructDef, Symbol, SymbolKind, StorageClass, Type};
use overload::Overload;
use std::collections::HashMap;

pub use metafunctions::ReparseHook;

/// Scope chain mapping a name to its home register (see `types::Scope` for
/// the lexical-frame structure; here we additionally remember the
/// resolved `Type` and, for functions, the base name used for overload
/// lookup).
struct ValueScope {
    frames: Vec<HashMap<String, (Reg, Type)>>,
}

impl ValueScope {
    fn new() -> Self {
        Self { frames: vec![HashMap::new()] }
    }
    fn push(&mut self) {
        self.frames.push(HashMap::new());
    }
    fn pop(&mut self) {
        self.frames.pop();
    }
    fn define(&mut self, name: &str, reg: Reg, ty: Type) {
        self.frames.last_mut().unwrap().insert(name.to_string(), (reg, ty));
    }
    fn lookup(&self, name: &str) -> Option<&(Reg, Type)> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }
}

struct LoopLabels {
    continue_label: LabelId,
    break_label: LabelId,
}

pub struct Analyzer {
    pub module: Module,
    pub mir: MirModule,
    pub sink: DiagnosticSink,
    functions: HashMap<String, Vec<Overload>>,
    constant_values: HashMap<String, CtieValue>,
    literal_counter: u32,
    reparse: Option<ReparseHook>,
    file: String,
}

impl Analyzer {
    pub fn new(module_name: &str, file: &str, reparse: Option<ReparseHook>) -> Self {
        Self {
            module: Module::new(module_name),
            mir: MirModule::new(module_name),
            sink: DiagnosticSink::new(),
            functions: HashMap::new(),
            constant_values: HashMap::new(),
            literal_counter: 0,
            reparse,
            file: file.to_string(),
        }
    }

    fn report(&mut self, err: Error) {
        self.sink.report(err, self.file.clone());
    }

    /// Allocates a dedicated backing-memory global for an aggregate
    /// literal, sized in bytes so every backend's generic leaf-size data
    /// section logic can lay it out without knowing about struct layout.
    fn alloc_literal_global(&mut self, size_bytes: usize) -> String {
        let name = format!("__literal_{}", self.literal_counter);
        self.literal_counter += 1;
        self.mir.globals.insert(name.clone(), Type::Array { element: Box::new(Type::u8()), length: size_bytes as u16 });
        name
    }

    fn resolve_type(&self, expr: &TypeExpr) -> Result<Type> {
        let module = &self.module;
        overload::resolve_type_expr(expr, &|name| {
            if module.types.get_struct(name).is_some() {
                Some(Type::Struct(name.to_string()))
            } else if module.types.get_enum(name).is_some() {
                Some(Type::Enum(name.to_string()))
            } else if module.types.get_interface(name).is_some() {
                Some(Type::Interface(name.to_string()))
            } else {
                None
            }
        })
    }

    /// Expands template directives and inline compile-time blocks,
    /// returning the flattened item list the rest of analysis consumes.
    fn expand_metafunctions(&mut self, items: Vec<Item>) -> Vec<Item> {
        let mut out = Vec::new();
        for item in items {
            match item {
                Item::Template(t) => match metafunctions::expand_template(&t.name, &t.args) {
                    Ok(text) => {
                        if let Some(hook) = &self.reparse {
                            match hook(&text) {
                                Ok(mut new_items) => out.append(&mut new_items),
                                Err(e) => self.report(e),
                            }
                        }
                        // No reparse hook configured: the expansion is a
                        // pure function of its inputs but this crate has
                        // no parser to feed it back through, so it
                        // contributes nothing further (documented scope
                        // boundary, see DESIGN.md).
                    }
                    Err(e) => self.report(e),
                },
                Item::CompileTimeBlock(block) => {
                    let emitted = self.run_compile_time_block(&block);
                    if let Some(hook) = self.reparse.clone() {
                        for text in emitted {
                            match hook(&text) {
                                Ok(mut new_items) => out.append(&mut new_items),
                                Err(e) => self.report(e),
                            }
                        }
                    }
                }
                other => out.push(other),
            }
        }
        out
    }

    fn run_compile_time_block(&mut self, block: &CompileTimeBlock) -> Vec<String> {
        let mut f = MirFunction::new("__compile_time_block", Type::Void);
        let mut scope = ValueScope::new();
        let entry = f.fresh_label();
        f.entry = entry;
        f.push(Instr::Label(entry));
        for stmt in &block.body.statements {
            if let Err(e) = self.lower_statement(&mut f, &mut scope, None, stmt) {
                self.report(e);
            }
        }
        f.push(Instr::Return(None));

        let mut module = MirModule::new("__ctie_scratch");
        module.add_function(f);
        let mut interp = Interpreter::new(&module, Budget::default());
        match interp.run("__compile_time_block", &[]) {
            Ok(_) => interp.emitted,
            Err(e) => {
                self.report(e);
                Vec::new()
            }
        }
    }

    pub fn analyze(&mut self, program: Program) {
        self.module.name = program.module_name.clone();
        self.mir.name = program.module_name.clone();
        for import in &program.imports {
            self.module.imports.push((import.path.clone(), import.alias.clone()));
        }

        let items = self.expand_metafunctions(program.items);

        // Pass 1: collect type and function-signature declarations so
        // forward references and mutual recursion both resolve.
        for item in &items {
            match item {
                Item::Struct(s) => self.collect_struct(s),
                Item::Enum(e) => self.collect_enum(e),
                Item::Interface(i) => self.collect_interface(i),
                _ => {}
            }
        }
        for item in &items {
            if let Item::Function(f) = item {
                self.collect_function_signature(f);
            }
        }

        // Pass 2: lower function bodies and module-level constants.
        for item in &items {
            match item {
                Item::Function(f) => self.lower_function(f),
                Item::Constant(c) => self.lower_constant(c),
                _ => {}
            }
        }
    }

    fn collect_struct(&mut self, s: &StructItem) {
        let mut fields = Vec::new();
        for field in &s.fields {
            match self.resolve_type(&field.ty) {
                Ok(ty) => fields.push(FieldDef { name: field.name.clone(), ty }),
                Err(e) => self.report(e),
            }
        }
        let prev = self.module.types.define_struct(StructDef { name: s.name.clone(), fields });
        if prev.is_some() {
            self.report(Error::Redefinition { name: s.name.clone(), span: s.span, first_span: Span::default() });
        }
    }

    fn collect_enum(&mut self, e: &EnumItem) {
        let underlying = e
            .underlying
            .as_ref()
            .and_then(|t| self.resolve_type(t).ok())
            .and_then(|t| t.int_width())
            .unwrap_or(crate::types::IntWidth::W8);
        let variants = e
            .variants
            .iter()
            .map(|v| EnumVariant { name: v.name.clone(), value: v.value })
            .collect();
        self.module.types.define_enum(EnumDef { name: e.name.clone(), underlying, variants });
    }

    fn collect_interface(&mut self, i: &InterfaceItem) {
        let mut methods = Vec::new();
        for m in &i.methods {
            let params = m
                .params
                .iter()
                .filter_map(|p| self.resolve_type(p).ok())
                .collect();
            let ret = m
                .ret
                .as_ref()
                .and_then(|t| self.resolve_type(t).ok())
                .unwrap_or(Type::Void);
            methods.push(InterfaceMethod { name: m.name.clone(), params, ret: Box::new(ret) });
        }
        self.module.types.define_interface(InterfaceDef { name: i.name.clone(), methods });
    }

    fn collect_function_signature(&mut self, f: &FunctionDef) {
        let params: Vec<Type> = f
            .params
            .iter()
            .map(|p| self.resolve_type(&p.ty).unwrap_or(Type::Var(0)))
            .collect();
        let ret = f
            .ret
            .as_ref()
            .map(|t| self.resolve_type(t).unwrap_or(Type::Void))
            .unwrap_or(Type::Void);
        let mangled = overload::mangle(&f.name, &params);
        let overloads = self.functions.entry(f.name.clone()).or_default();
        if overloads.iter().any(|o| o.params == params) {
            self.report(Error::Redefinition { name: f.name.clone(), span: f.span, first_span: Span::default() });
            return;
        }
        overloads.push(Overload { mangled, params, ret });
    }

    fn lower_constant(&mut self, c: &ConstantDef) {
        // Constants must themselves be compile-time constant; evaluate via
        // a throwaway zero-arg function through the same interpreter CTIE
        // uses, keeping constant folding rules in exactly one place.
        let mut f = MirFunction::new("__const_init", Type::Void);
        let mut scope = ValueScope::new();
        if let Ok((reg, ty)) = self.lower_expr(&mut f, &mut scope, &c.value) {
            f.push(Instr::Return(Some(reg)));
            let mut module = MirModule::new("__const_scratch");
            module.add_function(f);
            let mut interp = Interpreter::new(&module, Budget::default());
            match interp.run("__const_init", &[]) {
                Ok(Some(value)) => {
                    self.constant_values.insert(c.name.clone(), value);
                    self.module.globals.insert(
                        c.name.clone(),
                        Symbol::new(c.name.clone(), SymbolKind::Constant, ty, StorageClass::Constant).at(c.span),
                    );
                }
                _ => self.report(Error::TemplateExpansion {
                    span: c.span,
                    message: format!("constant `{}` is not a compile-time constant expression", c.name),
                }),
            }
        }
    }

    fn lower_function(&mut self, func: &FunctionDef) {
        let params: Vec<Type> = func
            .params
            .iter()
            .map(|p| self.resolve_type(&p.ty).unwrap_or(Type::Var(0)))
            .collect();
        let ret = func
            .ret
            .as_ref()
            .map(|t| self.resolve_type(t).unwrap_or(Type::Void))
            .unwrap_or(Type::Void);
        let mangled = overload::mangle(&func.name, &params);

        let mut f = MirFunction::new(mangled.clone(), ret.clone());
        let entry = f.fresh_label();
        f.entry = entry;
        f.push(Instr::Label(entry));

        let mut scope = ValueScope::new();
        for (i, (param, ty)) in func.params.iter().zip(params.iter()).enumerate() {
            let slot = f.fresh_reg();
            let val = f.fresh_reg();
            f.push(Instr::LoadParam { dst: val, index: i });
            f.push(Instr::StoreVar { var: slot, src: val });
            scope.define(&param.name, slot, ty.clone());
            f.params.push((val, ty.clone()));
        }

        if !func.is_extern {
            for stmt in &func.body.statements {
                if let Err(e) = self.lower_statement(&mut f, &mut scope, None, stmt) {
                    self.report(e);
                }
            }
            // Every path must return; a function whose body falls off the
            // end returns void / an undefined value rather than trapping,
            // matching the lowering contract that `if`/`case` define their
            // result on every path only when used as an expression.
            if !matches!(f.instructions.last(), Some(Instr::Return(_)) | Some(Instr::Halt)) {
                f.push(Instr::Return(None));
            }
        } else {
            f.push(Instr::Return(None));
        }

        self.mir.add_function(f);
    }

    fn lower_statement(
        &mut self,
        f: &mut MirFunction,
        scope: &mut ValueScope,
        loop_ctx: Option<&LoopLabels>,
        stmt: &Statement,
    ) -> Result<()> {
        match stmt {
            Statement::Let { name, value, .. } => {
                let (val_reg, ty) = self.lower_expr(f, scope, value)?;
                let slot = f.fresh_reg();
                f.push(Instr::StoreVar { var: slot, src: val_reg });
                scope.define(name, slot, ty);
                Ok(())
            }
            Statement::Assign { target, value, span } => {
                let (val_reg, _) = self.lower_expr(f, scope, value)?;
                match &target.kind {
                    ExprKind::Ident(name) => {
                        let (slot, _) = scope
                            .lookup(name)
                            .ok_or_else(|| Error::UndefinedReference { name: name.clone(), span: *span })?;
                        f.push(Instr::StoreVar { var: *slot, src: val_reg });
                        Ok(())
                    }
                    ExprKind::FieldAccess { base, field } => {
                        let (base_reg, base_ty) = self.lower_expr(f, scope, base)?;
                        let offset = self.field_offset(&base_ty, field, *span)?;
                        f.push(Instr::StoreField { base: base_reg, offset, src: val_reg });
                        Ok(())
                    }
                    ExprKind::IndexAccess { base, index } => {
                        let (base_reg, base_ty) = self.lower_expr(f, scope, base)?;
                        let (index_reg, _) = self.lower_expr(f, scope, index)?;
                        let elem_size = base_ty.element_type().and_then(Type::leaf_size).unwrap_or(1);
                        f.push(Instr::StoreElem { base: base_reg, index: index_reg, elem_size, src: val_reg });
                        Ok(())
                    }
                    _ => Err(Error::InternalInvariant("invalid assignment target".into())),
                }
            }
            Statement::Expr(e) => {
                self.lower_expr(f, scope, e)?;
                Ok(())
            }
            Statement::If { cond, then_block, else_block, .. } => {
                let (cond_reg, _) = self.lower_expr(f, scope, cond)?;
                let else_label = f.fresh_label();
                let join_label = f.fresh_label();
                f.push(Instr::JumpIfFalse { cond: cond_reg, target: else_label });
                scope.push();
                for s in &then_block.statements {
                    self.lower_statement(f, scope, loop_ctx, s)?;
                }
                scope.pop();
                f.push(Instr::Jump(join_label));
                f.push(Instr::Label(else_label));
                if let Some(else_block) = else_block {
                    scope.push();
                    for s in &else_block.statements {
                        self.lower_statement(f, scope, loop_ctx, s)?;
                    }
                    scope.pop();
                }
                f.push(Instr::Label(join_label));
                Ok(())
            }
            Statement::While { cond, body, .. } => {
                let header = f.fresh_label();
                let exit = f.fresh_label();
                f.push(Instr::Label(header));
                let (cond_reg, _) = self.lower_expr(f, scope, cond)?;
                f.push(Instr::JumpIfFalse { cond: cond_reg, target: exit });
                let labels = LoopLabels { continue_label: header, break_label: exit };
                scope.push();
                for s in &body.statements {
                    self.lower_statement(f, scope, Some(&labels), s)?;
                }
                scope.pop();
                f.push(Instr::Jump(header));
                f.push(Instr::Label(exit));
                Ok(())
            }
            Statement::For { var, start, end, body, .. } => {
                let (start_reg, ty) = self.lower_expr(f, scope, start)?;
                let (end_reg, _) = self.lower_expr(f, scope, end)?;
                let slot = f.fresh_reg();
                f.push(Instr::StoreVar { var: slot, src: start_reg });
                let header = f.fresh_label();
                let exit = f.fresh_label();
                f.push(Instr::Label(header));
                let cur = f.fresh_reg();
                f.push(Instr::LoadVar { dst: cur, var: slot });
                let cond = f.fresh_reg();
                f.push(Instr::Bin { dst: cond, op: MBinOp::Lt, lhs: cur, rhs: end_reg, ty: Type::Bool });
                f.push(Instr::JumpIfFalse { cond, target: exit });
                let labels = LoopLabels { continue_label: header, break_label: exit };
                scope.push();
                scope.define(var, slot, ty.clone());
                for s in &body.statements {
                    self.lower_statement(f, scope, Some(&labels), s)?;
                }
                scope.pop();
                let next = f.fresh_reg();
                let one = f.fresh_reg();
                f.push(Instr::ConstInt { dst: one, value: 1, ty: ty.clone() });
                f.push(Instr::Bin { dst: next, op: MBinOp::Add, lhs: cur, rhs: one, ty });
                f.push(Instr::StoreVar { var: slot, src: next });
                f.push(Instr::Jump(header));
                f.push(Instr::Label(exit));
                Ok(())
            }
            Statement::Break(span) => {
                let labels = loop_ctx.ok_or_else(|| Error::InternalInvariant("break outside loop".into()))?;
                f.push(Instr::Jump(labels.break_label));
                let _ = span;
                Ok(())
            }
            Statement::Continue(span) => {
                let labels = loop_ctx.ok_or_else(|| Error::InternalInvariant("continue outside loop".into()))?;
                f.push(Instr::Jump(labels.continue_label));
                let _ = span;
                Ok(())
            }
            Statement::Return(value, _) => {
                match value {
                    Some(e) => {
                        let (reg, _) = self.lower_expr(f, scope, e)?;
                        f.push(Instr::Return(Some(reg)));
                    }
                    None => f.push(Instr::Return(None)),
                }
                Ok(())
            }
            Statement::Case { scrutinee, arms, span } => {
                self.lower_case(f, scope, scrutinee, arms, *span).map(|_| ())
            }
        }
    }

    fn field_offset(&mut self, base_ty: &Type, field: &str, span: Span) -> Result<usize> {
        match base_ty {
            Type::Struct(name) => {
                let def = self
                    .module
                    .types
                    .get_struct(name)
                    .ok_or_else(|| Error::UndefinedReference { name: name.clone(), span })?
                    .clone();
                def.offset_of(field, &self.module.types)
                    .ok_or_else(|| Error::UndefinedReference { name: field.to_string(), span })
            }
            other => Err(Error::TypeMismatch { span, expected: "struct".into(), got: other.to_string() }),
        }
    }

    /// Lowers an expression, returning the register holding its value and
    /// its resolved type.
    fn lower_expr(&mut self, f: &mut MirFunction, scope: &mut ValueScope, expr: &Expr) -> Result<(Reg, Type)> {
        match &expr.kind {
            ExprKind::Literal(Literal::Int(n)) => {
                let dst = f.fresh_reg();
                let ty = Type::i16();
                f.push(Instr::ConstInt { dst, value: *n, ty: ty.clone() });
                Ok((dst, ty))
            }
            ExprKind::Literal(Literal::Bool(b)) => {
                let dst = f.fresh_reg();
                f.push(Instr::ConstBool { dst, value: *b });
                Ok((dst, Type::Bool))
            }
            ExprKind::Literal(Literal::Str(s)) => {
                let dst = f.fresh_reg();
                f.push(Instr::ConstString { dst, value: s.clone() });
                let ty = Type::Array { element: Box::new(Type::u8()), length: s.len() as u16 };
                Ok((dst, ty))
            }
            ExprKind::Ident(name) => {
                if let Some((slot, ty)) = scope.lookup(name) {
                    let (slot, ty) = (*slot, ty.clone());
                    let dst = f.fresh_reg();
                    f.push(Instr::LoadVar { dst, var: slot });
                    Ok((dst, ty))
                } else if let Some(sym) = self.module.globals.get(name) {
                    let dst = f.fresh_reg();
                    let ty = sym.ty.clone();
                    match self.constant_values.get(name) {
                        Some(CtieValue::Int(n)) => f.push(Instr::ConstInt { dst, value: *n, ty: ty.clone() }),
                        Some(CtieValue::Bool(b)) => f.push(Instr::ConstBool { dst, value: *b }),
                        Some(CtieValue::Str(s)) => f.push(Instr::ConstString { dst, value: s.clone() }),
                        None => f.push(Instr::ConstInt { dst, value: 0, ty: ty.clone() }),
                    }
                    Ok((dst, ty))
                } else {
                    Err(Error::UndefinedReference { name: name.clone(), span: expr.span })
                }
            }
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(f, scope, *op, lhs, rhs, expr.span),
            ExprKind::Unary { op, operand } => {
                let (reg, ty) = self.lower_expr(f, scope, operand)?;
                let mop = match op {
                    UnOp::Neg => MUnOp::Neg,
                    UnOp::Not => MUnOp::Not,
                    UnOp::BitNot => MUnOp::BitNot,
                };
                let dst = f.fresh_reg();
                f.push(Instr::Un { dst, op: mop, operand: reg, ty: ty.clone() });
                Ok((dst, ty))
            }
            ExprKind::Call { callee, args } => self.lower_call(f, scope, callee, args, expr.span),
            ExprKind::FieldAccess { base, field } => {
                let (base_reg, base_ty) = self.lower_expr(f, scope, base)?;
                let offset = self.field_offset(&base_ty, field, expr.span)?;
                let field_ty = match &base_ty {
                    Type::Struct(name) => self
                        .module
                        .types
                        .get_struct(name)
                        .and_then(|d| d.fields.iter().find(|fd| fd.name == *field))
                        .map(|fd| fd.ty.clone())
                        .unwrap_or(Type::Void),
                    _ => Type::Void,
                };
                let dst = f.fresh_reg();
                f.push(Instr::LoadField { dst, base: base_reg, offset, ty: field_ty.clone() });
                Ok((dst, field_ty))
            }
            ExprKind::IndexAccess { base, index } => {
                let (base_reg, base_ty) = self.lower_expr(f, scope, base)?;
                let (index_reg, _) = self.lower_expr(f, scope, index)?;
                let elem_ty = base_ty.element_type().cloned().unwrap_or(Type::Void);
                let elem_size = elem_ty.leaf_size().unwrap_or(1);
                let dst = f.fresh_reg();
                f.push(Instr::LoadElem { dst, base: base_reg, index: index_reg, elem_size, ty: elem_ty.clone() });
                Ok((dst, elem_ty))
            }
            ExprKind::Cast { value, ty } => {
                let (reg, from_ty) = self.lower_expr(f, scope, value)?;
                let to_ty = self.resolve_type(ty)?;
                self.check_cast(&from_ty, &to_ty, expr.span)?;
                Ok((reg, to_ty))
            }
            ExprKind::ArrayLiteral(elems) => {
                let mut first_ty = None;
                let mut regs = Vec::new();
                for e in elems {
                    let (r, t) = self.lower_expr(f, scope, e)?;
                    first_ty.get_or_insert(t);
                    regs.push(r);
                }
                let elem_ty = first_ty.unwrap_or(Type::u8());
                let elem_size = elem_ty.leaf_size().unwrap_or(1);
                let global = self.alloc_literal_global(elem_size * elems.len());
                let dst = f.fresh_reg();
                f.push(Instr::LoadGlobalAddr { dst, name: global });
                for (i, r) in regs.into_iter().enumerate() {
                    let idx = f.fresh_reg();
                    f.push(Instr::ConstInt { dst: idx, value: i as i64, ty: Type::u16() });
                    f.push(Instr::StoreElem { base: dst, index: idx, elem_size, src: r });
                }
                Ok((dst, Type::Array { element: Box::new(elem_ty), length: elems.len() as u16 }))
            }
            ExprKind::StructLiteral { name, fields } => {
                let def = self
                    .module
                    .types
                    .get_struct(name)
                    .ok_or_else(|| Error::UndefinedReference { name: name.clone(), span: expr.span })?
                    .clone();
                let size = def.size(&self.module.types).unwrap_or(2);
                let global = self.alloc_literal_global(size);
                let dst = f.fresh_reg();
                f.push(Instr::LoadGlobalAddr { dst, name: global });
                for (fname, fexpr) in fields {
                    let (reg, _) = self.lower_expr(f, scope, fexpr)?;
                    if let Some(offset) = def.offset_of(fname, &self.module.types) {
                        f.push(Instr::StoreField { base: dst, offset, src: reg });
                    }
                }
                Ok((dst, Type::Struct(name.clone())))
            }
            ExprKind::Emit(inner) => {
                let (reg, _) = self.lower_expr(f, scope, inner)?;
                f.push(Instr::Call { dst: None, callee: EMIT_INTRINSIC.to_string(), args: vec![reg] });
                let dst = f.fresh_reg();
                f.push(Instr::ConstBool { dst, value: true });
                Ok((dst, Type::Void))
            }
            ExprKind::Print(args) => self.lower_print(f, scope, args, expr.span),
            ExprKind::Block(block) => {
                scope.push();
                let mut last = None;
                for s in &block.statements {
                    if let Statement::Expr(e) = s {
                        last = Some(self.lower_expr(f, scope, e)?);
                    } else {
                        self.lower_statement(f, scope, None, s)?;
                    }
                }
                scope.pop();
                Ok(last.unwrap_or_else(|| {
                    let dst = f.fresh_reg();
                    f.push(Instr::ConstBool { dst, value: false });
                    (dst, Type::Void)
                }))
            }
        }
    }

    fn lower_print(&mut self, f: &mut MirFunction, scope: &mut ValueScope, args: &[PrintArg], span: Span) -> Result<(Reg, Type)> {
        let mut arg_regs = Vec::new();
        for arg in args {
            let reg = match arg {
                PrintArg::Literal(s) => {
                    let dst = f.fresh_reg();
                    f.push(Instr::ConstString { dst, value: s.clone() });
                    dst
                }
                PrintArg::RuntimeValue(e) => self.lower_expr(f, scope, e)?.0,
                PrintArg::ConstExpr(e) => {
                    let (reg, ty) = self.lower_expr(f, scope, e)?;
                    let _ = ty;
                    reg
                }
            };
            arg_regs.push(reg);
        }
        let callee = overload::mangle("print", &vec![Type::u16(); arg_regs.len()]);
        let dst = f.fresh_reg();
        f.push(Instr::ConstBool { dst, value: true });
        f.push(Instr::Call { dst: None, callee, args: arg_regs });
        let _ = span;
        Ok((dst, Type::Void))
    }

    fn check_cast(&self, from: &Type, to: &Type, span: Span) -> Result<()> {
        let ok = match (from, to) {
            // An explicit cast permits narrowing; only the integer/pointer/enum
            // family of conversions is allowed, never e.g. bool <-> struct.
            (Type::Int { .. }, Type::Int { .. }) => true,
            (Type::Pointer(_), Type::Int { .. }) | (Type::Int { .. }, Type::Pointer(_)) => true,
            (Type::Enum(_), Type::Int { .. }) | (Type::Int { .. }, Type::Enum(_)) => true,
            _ if from == to => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidCast { span, from: from.to_string(), to: to.to_string() })
        }
    }

    fn lower_binary(
        &mut self,
        f: &mut MirFunction,
        scope: &mut ValueScope,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Result<(Reg, Type)> {
        // Short-circuit operators lower to branches, never to eager
        // arithmetic on both sides.
        if matches!(op, BinOp::And | BinOp::Or) {
            let (lhs_reg, _) = self.lower_expr(f, scope, lhs)?;
            let result = f.fresh_reg();
            let rhs_label = f.fresh_label();
            let join = f.fresh_label();
            f.push(Instr::Move { dst: result, src: lhs_reg });
            match op {
                BinOp::And => f.push(Instr::JumpIfFalse { cond: lhs_reg, target: join }),
                BinOp::Or => f.push(Instr::JumpIfTrue { cond: lhs_reg, target: join }),
                _ => unreachable!(),
            }
            f.push(Instr::Jump(rhs_label));
            f.push(Instr::Label(rhs_label));
            let (rhs_reg, _) = self.lower_expr(f, scope, rhs)?;
            f.push(Instr::Move { dst: result, src: rhs_reg });
            f.push(Instr::Label(join));
            return Ok((result, Type::Bool));
        }

        let (lhs_reg, lhs_ty) = self.lower_expr(f, scope, lhs)?;
        let (rhs_reg, rhs_ty) = self.lower_expr(f, scope, rhs)?;
        if lhs_ty.is_integer() && rhs_ty.is_integer() && lhs_ty != rhs_ty {
            let widening_ok = overload::assignability(&lhs_ty, &rhs_ty) != overload::Assignability::None
                || overload::assignability(&rhs_ty, &lhs_ty) != overload::Assignability::None;
            if !widening_ok {
                return Err(Error::TypeMismatch { span, expected: lhs_ty.to_string(), got: rhs_ty.to_string() });
            }
        }
        let mop = match op {
            BinOp::Add => MBinOp::Add,
            BinOp::Sub => MBinOp::Sub,
            BinOp::Mul => MBinOp::Mul,
            BinOp::Div => MBinOp::Div,
            BinOp::Mod => MBinOp::Mod,
            BinOp::Eq => MBinOp::Eq,
            BinOp::Ne => MBinOp::Ne,
            BinOp::Lt => MBinOp::Lt,
            BinOp::Le => MBinOp::Le,
            BinOp::Gt => MBinOp::Gt,
            BinOp::Ge => MBinOp::Ge,
            BinOp::BitAnd => MBinOp::And,
            BinOp::BitOr => MBinOp::Or,
            BinOp::BitXor => MBinOp::Xor,
            BinOp::Shl => MBinOp::Shl,
            BinOp::Shr => MBinOp::Shr,
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        };
        let result_ty = if mop.is_comparison() { Type::Bool } else { lhs_ty.clone() };
        let dst = f.fresh_reg();
        f.push(Instr::Bin { dst, op: mop, lhs: lhs_reg, rhs: rhs_reg, ty: result_ty.clone() });
        Ok((dst, result_ty))
    }

    fn lower_call(
        &mut self,
        f: &mut MirFunction,
        scope: &mut ValueScope,
        callee: &str,
        args: &[Arg],
        span: Span,
    ) -> Result<(Reg, Type)> {
        let mut arg_regs = Vec::new();
        let mut arg_types = Vec::new();
        for a in args {
            let (reg, ty) = self.lower_expr(f, scope, &a.value)?;
            arg_regs.push(reg);
            arg_types.push(ty);
        }

        let candidates = self
            .functions
            .get(callee)
            .cloned()
            .ok_or_else(|| Error::UndefinedReference { name: callee.to_string(), span })?;
        let chosen = overload::resolve(callee, &candidates, &arg_types, span)?.clone();

        let dst = if matches!(chosen.ret, Type::Void) { None } else { Some(f.fresh_reg()) };
        f.push(Instr::Call { dst, callee: chosen.mangled, args: arg_regs });
        Ok((dst.unwrap_or(Reg(u32::MAX)), chosen.ret))
    }

    fn lower_case(
        &mut self,
        f: &mut MirFunction,
        scope: &mut ValueScope,
        scrutinee: &Expr,
        arms: &[CaseArm],
        span: Span,
    ) -> Result<(Reg, Type)> {
        let (scrut_reg, scrut_ty) = self.lower_expr(f, scope, scrutinee)?;
        let join = f.fresh_label();
        let result = f.fresh_reg();
        let mut result_ty: Option<Type> = None;
        let mut next_arm_label = f.fresh_label();

        for (i, arm) in arms.iter().enumerate() {
            f.push(Instr::Label(next_arm_label));
            let is_last = i + 1 == arms.len();
            next_arm_label = f.fresh_label();

            match &arm.pattern {
                Pattern::Wildcard => {}
                Pattern::Literal(Literal::Int(n)) => {
                    let lit = f.fresh_reg();
                    f.push(Instr::ConstInt { dst: lit, value: *n, ty: scrut_ty.clone() });
                    let cond = f.fresh_reg();
                    f.push(Instr::Bin { dst: cond, op: MBinOp::Eq, lhs: scrut_reg, rhs: lit, ty: Type::Bool });
                    let target = if is_last { f.fresh_label() } else { next_arm_label };
                    f.push(Instr::JumpIfFalse { cond, target });
                    if is_last {
                        next_arm_label = target;
                    }
                }
                Pattern::Range(lo, hi) => {
                    let lo_reg = f.fresh_reg();
                    let hi_reg = f.fresh_reg();
                    f.push(Instr::ConstInt { dst: lo_reg, value: *lo, ty: scrut_ty.clone() });
                    f.push(Instr::ConstInt { dst: hi_reg, value: *hi, ty: scrut_ty.clone() });
                    let c1 = f.fresh_reg();
                    let c2 = f.fresh_reg();
                    let cond = f.fresh_reg();
                    f.push(Instr::Bin { dst: c1, op: MBinOp::Ge, lhs: scrut_reg, rhs: lo_reg, ty: Type::Bool });
                    f.push(Instr::Bin { dst: c2, op: MBinOp::Le, lhs: scrut_reg, rhs: hi_reg, ty: Type::Bool });
                    f.push(Instr::Bin { dst: cond, op: MBinOp::And, lhs: c1, rhs: c2, ty: Type::Bool });
                    f.push(Instr::JumpIfFalse { cond, target: next_arm_label });
                }
                Pattern::EnumVariant { enum_name, variant } => {
                    let value = enum_name
                        .as_ref()
                        .or_else(|| match &scrut_ty { Type::Enum(n) => Some(n), _ => None })
                        .and_then(|n| self.module.types.get_enum(n))
                        .and_then(|d| d.value_of(variant))
                        .unwrap_or(0);
                    let lit = f.fresh_reg();
                    f.push(Instr::ConstInt { dst: lit, value, ty: scrut_ty.clone() });
                    let cond = f.fresh_reg();
                    f.push(Instr::Bin { dst: cond, op: MBinOp::Eq, lhs: scrut_reg, rhs: lit, ty: Type::Bool });
                    f.push(Instr::JumpIfFalse { cond, target: next_arm_label });
                }
                Pattern::Literal(_) => {
                    f.push(Instr::JumpIfFalse { cond: scrut_reg, target: next_arm_label });
                }
            }

            let (arm_reg, arm_ty) = self.lower_expr(f, scope, &arm.body)?;
            result_ty = Some(match result_ty {
                None => arm_ty,
                Some(prev) => lowering::join_type(&prev, &arm_ty)
                    .ok_or_else(|| Error::PatternArmType { span: arm.span, expected: prev.to_string(), got: arm_ty.to_string() })?,
            });
            f.push(Instr::Move { dst: result, src: arm_reg });
            f.push(Instr::Jump(join));
        }
        // No arm matched: unmatched `case` with no wildcard traps at
        // runtime rather than failing to compile, per the chosen
        // resolution of this open question.
        f.push(Instr::Label(next_arm_label));
        f.push(Instr::Halt);
        f.push(Instr::Label(join));
        let _ = span;
        Ok((result, result_ty.unwrap_or(Type::Void)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Span;

    fn span() -> Span {
        Span::default()
    }

    fn ident(name: &str) -> Expr {
        Expr { kind: ExprKind::Ident(name.into()), span: span() }
    }

    fn lit_int(n: i64) -> Expr {
        Expr { kind: ExprKind::Literal(Literal::Int(n)), span: span() }
    }

    #[test]
    fn analyzes_simple_add_function() {
        let program = Program {
            module_name: "m".into(),
            imports: vec![],
            items: vec![Item::Function(FunctionDef {
                name: "add".into(),
                params: vec![
                    Param { name: "a".into(), ty: TypeExpr { kind: TypeExprKind::Named("u8".into()), span: span() }, span: span() },
                    Param { name: "b".into(), ty: TypeExpr { kind: TypeExprKind::Named("u8".into()), span: span() }, span: span() },
                ],
                ret: Some(TypeExpr { kind: TypeExprKind::Named("u8".into()), span: span() }),
                type_params: vec![],
                body: Block {
                    statements: vec![Statement::Return(
                        Some(Expr {
                            kind: ExprKind::Binary { op: BinOp::Add, lhs: Box::new(ident("a")), rhs: Box::new(ident("b")) },
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
            })],
        };

        let mut analyzer = Analyzer::new("m", "test.mz", None);
        analyzer.analyze(program);
        assert!(analyzer.sink.diagnostics().is_empty());
        assert!(analyzer.mir.functions.keys().any(|k| k.starts_with("add")));
    }

    #[test]
    fn undefined_reference_is_reported() {
        let program = Program {
            module_name: "m".into(),
            imports: vec![],
            items: vec![Item::Function(FunctionDef {
                name: "f".into(),
                params: vec![],
                ret: None,
                type_params: vec![],
                body: Block {
                    statements: vec![Statement::Expr(ident("nope"))],
                    span: span(),
                },
                smc_requested: None,
                is_extern: false,
                is_pub: true,
                span: span(),
            })],
        };
        let mut analyzer = Analyzer::new("m", "test.mz", None);
        analyzer.analyze(program);
        assert!(!analyzer.sink.diagnostics().is_empty());
    }

    #[test]
    fn unknown_call_target_errors() {
        let program = Program {
            module_name: "m".into(),
            imports: vec![],
            items: vec![Item::Function(FunctionDef {
                name: "f".into(),
                params: vec![],
                ret: None,
                type_params: vec![],
                body: Block {
                    statements: vec![Statement::Expr(Expr {
                        kind: ExprKind::Call { callee: "missing".into(), args: vec![Arg { value: lit_int(1), span: span() }] },
                        span: span(),
                    })],
                    span: span(),
                },
                smc_requested: None,
                is_extern: false,
                is_pub: true,
                span: span(),
            })],
        };
        let mut analyzer = Analyzer::new("m", "test.mz", None);
        analyzer.analyze(program);
        assert!(!analyzer.sink.diagnostics().is_empty());
    }
}
