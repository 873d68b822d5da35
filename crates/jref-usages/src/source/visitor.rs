//! Usage extraction from a resolved compilation unit.
//!
//! The walk threads an immutable [`VisitCtx`] by value: the syntactic role
//! decides which [`UsageType`] a type reference records, the target decides
//! which declared type it is recorded for.

use jref_config::{IdentLevel, UsagesLevel};

use crate::binary_name::{BinaryName, ElementKind};
use crate::usage::{UsageRecord, UsageType, UsagesData};

use super::tree::{ClassDecl, CompilationUnit, Expr, Member, Symbol, TypeRef};

const INIT: &str = "<init>";
const CLINIT: &str = "<clinit>";

/// Syntactic position of the node being visited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Extends,
    Implements,
    /// Inside a type argument list.
    Gt,
    Import,
    PackageAnn,
    Other,
}

#[derive(Clone, Copy, Debug)]
struct VisitCtx {
    role: Role,
    /// Frame the usages go to; `None` before the first type declaration.
    target: Option<usize>,
    in_interface: bool,
}

impl VisitCtx {
    fn with_role(self, role: Role) -> Self {
        Self { role, ..self }
    }
}

/// Everything one compilation unit contributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceUsages {
    /// One record per declared type, sorted by binary name.
    pub records: Vec<UsageRecord>,
    /// Top-level types whose name does not match the file, with the file.
    pub aux_top_level: Vec<(BinaryName, String)>,
}

pub fn visit(unit: &CompilationUnit, level: UsagesLevel, idents: IdentLevel) -> SourceUsages {
    let mut collector = Collector {
        unit,
        level,
        idents,
        pending: Some(UsagesData::new()),
        frames: Vec::new(),
        records: Vec::new(),
        aux_top_level: Vec::new(),
    };
    collector.visit_unit();

    let mut records = collector.records;
    records.sort_by(|a, b| a.name.cmp(&b.name));
    SourceUsages {
        records,
        aux_top_level: collector.aux_top_level,
    }
}

struct Frame {
    name: BinaryName,
    data: UsagesData,
}

struct Collector<'u> {
    unit: &'u CompilationUnit,
    level: UsagesLevel,
    idents: IdentLevel,
    /// Usages seen before the first type; taken by the first top-level type.
    pending: Option<UsagesData>,
    frames: Vec<Frame>,
    records: Vec<UsageRecord>,
    aux_top_level: Vec<(BinaryName, String)>,
}

impl Collector<'_> {
    fn visit_unit(&mut self) {
        let root = VisitCtx {
            role: Role::Other,
            target: None,
            in_interface: false,
        };
        let unit = self.unit;
        for annotation in &unit.package_annotations {
            self.visit_type(annotation, root.with_role(Role::PackageAnn));
        }
        for import in &unit.imports {
            self.visit_type(import, root.with_role(Role::Import));
        }

        let primary = unit.primary_type_name();
        for decl in &unit.types {
            let name = self.visit_class(decl, root);
            if decl.simple_name != primary {
                if let Some(name) = name {
                    self.aux_top_level.push((name, unit.file_name.clone()));
                }
            }
        }
        // A file without types (package-info) drops what it collected.
        self.pending = None;
    }

    fn record(&mut self, ctx: VisitCtx, name: &str, kind: UsageType) {
        let data = match ctx.target {
            Some(frame) => &mut self.frames[frame].data,
            None => match self.pending.as_mut() {
                Some(pending) => pending,
                None => return,
            },
        };
        data.add_usage(name, kind);
    }

    fn ident(&mut self, ctx: VisitCtx, name: &str) {
        if self.level < UsagesLevel::All || name == INIT || name == CLINIT {
            return;
        }
        if let Some(frame) = ctx.target {
            self.frames[frame].data.add_ident(name);
        }
    }

    fn feature_ident(&mut self, ctx: VisitCtx, name: &str, is_private: bool) {
        if name == INIT || name == CLINIT {
            return;
        }
        if let Some(frame) = ctx.target {
            if self.idents.accepts(is_private) {
                self.frames[frame].data.add_feature_ident(name);
            }
        }
        self.ident(ctx, name);
    }

    /// The binary name a declaration is recorded under. Top-level types with
    /// an unresolved name get one synthesized from the package.
    fn declared_name(&self, decl: &ClassDecl, top_level: bool) -> Option<BinaryName> {
        let class_name = match &decl.name {
            Symbol::Resolved(name) => name.clone(),
            Symbol::Error(_) if top_level => {
                if self.unit.package.is_empty() {
                    decl.simple_name.clone()
                } else {
                    format!("{}.{}", self.unit.package, decl.simple_name)
                }
            }
            Symbol::Error(_) => return None,
        };
        let index = if class_name.ends_with(decl.simple_name.as_str()) {
            class_name.len() - decl.simple_name.len()
        } else {
            class_name.rfind(['.', '$']).map_or(0, |idx| idx + 1)
        };
        Some(BinaryName::new(&class_name, decl.kind, decl.local, index))
    }

    /// Visits one declaration and returns the name its usages were recorded
    /// under, or `None` when they went to an enclosing type.
    fn visit_class(&mut self, decl: &ClassDecl, outer: VisitCtx) -> Option<BinaryName> {
        let top_level = outer.target.is_none();
        let name = self.declared_name(decl, top_level);

        let target = match &name {
            Some(name) => {
                let mut data = UsagesData::new();
                if top_level {
                    if let Some(pending) = self.pending.take() {
                        data.merge(pending);
                    }
                }
                self.frames.push(Frame {
                    name: name.clone(),
                    data,
                });
                Some(self.frames.len() - 1)
            }
            None => outer.target,
        };
        let ctx = VisitCtx {
            role: Role::Other,
            target,
            in_interface: matches!(decl.kind, ElementKind::Interface | ElementKind::Annotation),
        };

        for annotation in &decl.annotations {
            self.visit_type(annotation, ctx);
        }
        for ty in &decl.extends {
            self.visit_type(ty, ctx.with_role(Role::Extends));
        }
        for ty in &decl.implements {
            self.visit_type(ty, ctx.with_role(Role::Implements));
        }
        for member in &decl.members {
            self.visit_member(member, ctx);
        }

        if name.is_some() {
            if let Some(frame) = self.frames.pop() {
                self.records.push(UsageRecord::new(
                    frame.name,
                    Some(self.unit.file_name.clone()),
                    frame.data,
                ));
            }
        }
        name
    }

    fn visit_member(&mut self, member: &Member, ctx: VisitCtx) {
        match member {
            Member::Field {
                name,
                is_private,
                ty,
                annotations,
                init,
            } => {
                self.feature_ident(ctx, name, *is_private);
                for annotation in annotations {
                    self.visit_type(annotation, ctx);
                }
                self.visit_type(ty, ctx);
                if let Some(init) = init {
                    self.visit_expr(init, ctx);
                }
            }
            Member::Method {
                name,
                is_private,
                annotations,
                return_type,
                params,
                throws,
                body,
            } => {
                self.feature_ident(ctx, name, *is_private);
                for annotation in annotations {
                    self.visit_type(annotation, ctx);
                }
                if let Some(ty) = return_type {
                    self.visit_type(ty, ctx);
                }
                for param in params {
                    self.ident(ctx, &param.name);
                    self.visit_type(&param.ty, ctx);
                }
                for ty in throws {
                    self.visit_type(ty, ctx);
                }
                for expr in body {
                    self.visit_expr(expr, ctx);
                }
            }
            Member::Class(decl) => {
                self.visit_class(decl, ctx);
            }
            Member::Initializer { body } => {
                for expr in body {
                    self.visit_expr(expr, ctx);
                }
            }
        }
    }

    fn visit_type(&mut self, ty: &TypeRef, ctx: VisitCtx) {
        let kind = match ctx.role {
            Role::Extends if ctx.in_interface => UsageType::SuperInterface,
            Role::Extends => UsageType::SuperClass,
            Role::Implements => UsageType::SuperInterface,
            Role::Gt | Role::Import | Role::PackageAnn | Role::Other => UsageType::TypeReference,
        };
        if let Some(name) = ty.symbol.binary_name() {
            self.record(ctx, name, kind);
        }
        for arg in &ty.type_args {
            self.visit_type(arg, ctx.with_role(Role::Gt));
        }
    }

    fn visit_symbol(&mut self, ctx: VisitCtx, symbol: &Symbol, kind: UsageType) {
        if let Some(name) = symbol.binary_name() {
            self.record(ctx, name, kind);
        }
    }

    fn visit_expr(&mut self, expr: &Expr, ctx: VisitCtx) {
        let ctx = ctx.with_role(Role::Other);
        match expr {
            Expr::Ident { name, owner } => {
                if let Some(owner) = owner {
                    self.visit_symbol(ctx, owner, UsageType::FieldReference);
                }
                self.ident(ctx, name);
            }
            Expr::FieldAccess {
                target,
                owner,
                name,
            } => {
                if let Some(target) = target {
                    self.visit_expr(target, ctx);
                }
                self.visit_symbol(ctx, owner, UsageType::FieldReference);
                self.ident(ctx, name);
            }
            Expr::MethodCall {
                target,
                owner,
                name,
                args,
            } => {
                if let Some(target) = target {
                    self.visit_expr(target, ctx);
                }
                self.visit_symbol(ctx, owner, UsageType::MethodReference);
                self.ident(ctx, name);
                for arg in args {
                    self.visit_expr(arg, ctx);
                }
            }
            Expr::New { ty, args, body } => {
                self.visit_type(ty, ctx);
                self.visit_symbol(ctx, &ty.symbol, UsageType::MethodReference);
                for arg in args {
                    self.visit_expr(arg, ctx);
                }
                if let Some(body) = body {
                    self.visit_class(body, ctx);
                }
            }
            Expr::Lambda {
                functional_interface,
                body,
            } => {
                self.visit_symbol(ctx, functional_interface, UsageType::FunctionalImplementors);
                for expr in body {
                    self.visit_expr(expr, ctx);
                }
            }
            Expr::MemberRef {
                functional_interface,
                owner,
                name,
            } => {
                self.visit_symbol(ctx, functional_interface, UsageType::FunctionalImplementors);
                self.visit_symbol(ctx, owner, UsageType::MethodReference);
                self.ident(ctx, name);
            }
            Expr::TypeUse { ty } => self.visit_type(ty, ctx),
            Expr::LocalVar { name, ty, init } => {
                self.ident(ctx, name);
                self.visit_type(ty, ctx);
                if let Some(init) = init {
                    self.visit_expr(init, ctx);
                }
            }
            Expr::LocalClass(decl) => {
                self.visit_class(decl, ctx);
            }
            Expr::Literal => {}
            Expr::Block { body } => {
                for expr in body {
                    self.visit_expr(expr, ctx);
                }
            }
        }
    }
}
