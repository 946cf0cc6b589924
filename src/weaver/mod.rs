//! The aspect weaver.
//!
//! A weave pass runs in three phases over one module:
//!
//! 1. **Setup**: [`resolver::WellKnownReferences`] locates the aspect base types, context
//!    types and reflection primitives. If a required member is missing the pass fails with
//!    [`crate::Error::Setup`] before anything is changed. A module that reaches no aspect
//!    library has nothing to weave.
//! 2. **Weaving**: types are visited in declaration order, nested types before their
//!    enclosing type's own members, properties before methods. For every member
//!    [`discovery::AspectDiscovery`] builds the [`chain::AspectChain`], the head is
//!    resolved into an [`plan::AspectPlan`] and handed to the matching weaver
//!    ([`interception`], [`boundary`] or [`location`]). A member that fails is rolled back
//!    and reported. The pass continues with the next member.
//! 3. **Verification**: every body created or replaced is validated and its stack depth
//!    recomputed, in parallel.
//!
//! Everything that happens is reported on the [`diagnostics::Diagnostics`] channel and
//! summarized in a [`WeaveReport`].
//!
//! # Examples
//!
//! ```rust
//! use dotweave::{emulation::runtime::reference_resolver, prelude::*};
//!
//! let resolver = reference_resolver().unwrap();
//! let mut module = Module::new("App");
//! module.add_assembly_ref("DotNetAspects");
//!
//! let weaver = Weaver::new(WeaverConfig::default(), &resolver);
//! let report = weaver.weave(&mut module)?;
//! assert_eq!(report.members_woven(), 0);
//! # Ok::<(), dotweave::Error>(())
//! ```

pub mod boundary;
pub mod chain;
pub mod cloner;
pub mod context;
pub mod diagnostics;
pub mod discovery;
pub mod emit;
pub mod hierarchy;
pub mod interception;
pub mod location;
pub mod plan;
pub mod resolver;

use std::{collections::HashSet, fmt, sync::Arc};

use rayon::prelude::*;

use crate::{
    assembly::InstructionAssembler,
    config::WeaverConfig,
    metadata::{
        method::MethodBody, module::Module, signatures::TypeSignature, token::Token,
        typesystem::AssemblyResolver,
    },
    weaver::{
        context::{Transaction, WeaveContext},
        diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics},
        discovery::{AspectDeclaration, AspectDiscovery, AspectKind},
        plan::AspectPlan,
        resolver::WellKnownReferences,
    },
    Error, Result,
};

/// Counters of one weave pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeaveReport {
    /// Methods rebuilt around an interception aspect
    pub methods_intercepted: usize,
    /// Methods wrapped by a boundary aspect
    pub methods_bounded: usize,
    /// Properties whose accessors were rebuilt
    pub properties_intercepted: usize,
    /// Members that carried an aspect but could not be woven
    pub members_failed: usize,
    /// Members whose aspect kind is disabled or unavailable
    pub members_skipped: usize,
    /// Clones and adapters added to the module
    pub clones_added: usize,
    /// Bodies that failed post-weave verification
    pub verification_failures: usize,
}

impl WeaveReport {
    /// Members woven successfully, of any kind
    #[must_use]
    pub fn members_woven(&self) -> usize {
        self.methods_intercepted + self.methods_bounded + self.properties_intercepted
    }
}

impl fmt::Display for WeaveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} intercepted, {} bounded, {} properties, {} failed, {} skipped, {} methods added",
            self.methods_intercepted,
            self.methods_bounded,
            self.properties_intercepted,
            self.members_failed,
            self.members_skipped,
            self.clones_added
        )?;
        if self.verification_failures > 0 {
            write!(f, ", {} failed verification", self.verification_failures)?;
        }
        Ok(())
    }
}

/// Weaves aspects into modules.
///
/// A `Weaver` is cheap to create and can weave any number of modules, one pass at a
/// time per module. Referenced assemblies come from the [`AssemblyResolver`].
pub struct Weaver<'r> {
    config: WeaverConfig,
    resolver: &'r dyn AssemblyResolver,
    diagnostics: Arc<Diagnostics>,
}

impl<'r> Weaver<'r> {
    /// Creates a weaver with its own diagnostics channel
    pub fn new(config: WeaverConfig, resolver: &'r dyn AssemblyResolver) -> Self {
        Weaver {
            config,
            resolver,
            diagnostics: Arc::new(Diagnostics::new()),
        }
    }

    /// Reports into a channel owned by the host
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// The diagnostics channel
    #[must_use]
    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// The configuration
    #[must_use]
    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    /// Runs one weave pass over `module`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] if a required well-known member cannot be resolved, in
    /// which case the module is unchanged. With
    /// [`WeaverConfig::fail_on_verification_error`] set, returns the first verification
    /// failure. Failures of individual members are reported as diagnostics only.
    pub fn weave(&self, module: &mut Module) -> Result<WeaveReport> {
        let references = match WellKnownReferences::resolve(module, self.resolver, &self.config) {
            Ok(Some(references)) => references,
            Ok(None) => {
                self.diagnostics.warning(
                    DiagnosticCategory::Setup,
                    format!("{} references no aspect library, nothing to weave", module.name()),
                );
                return Ok(WeaveReport::default());
            }
            Err(error) => {
                self.diagnostics
                    .error(DiagnosticCategory::Setup, error.to_string());
                return Err(error);
            }
        };

        let mut discovery =
            match AspectDiscovery::new(module, self.resolver, &references, self.config.enabled) {
                Ok(discovery) => discovery,
                Err(error) => {
                    let error = Error::Setup(error.to_string());
                    self.diagnostics
                        .error(DiagnosticCategory::Setup, error.to_string());
                    return Err(error);
                }
            };

        let mut pass = Pass {
            config: &self.config,
            diagnostics: &self.diagnostics,
            references: &references,
            report: WeaveReport::default(),
            touched: HashSet::new(),
            woven: Vec::new(),
        };

        for ty in processing_order(module) {
            let properties: Vec<Token> = module.properties_of(ty).map(|p| p.token).collect();
            for property in properties {
                pass.weave_property(module, &mut discovery, property);
            }
            let methods: Vec<Token> = module.methods_of(ty).map(|m| m.token).collect();
            for method in methods {
                pass.weave_method(module, &mut discovery, method);
            }
        }

        let mut report = pass.report;
        if self.config.verify_output {
            let failures = verify(module, &pass.woven);
            report.verification_failures = failures.len();
            let mut first = None;
            for (token, error) in failures {
                let member = module.member_display_name(token);
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticSeverity::Error,
                        DiagnosticCategory::Verification,
                        error.to_string(),
                    )
                    .with_member(member.clone())
                    .with_token(token),
                );
                first.get_or_insert(error.for_member(member));
            }
            if let (true, Some(error)) = (self.config.fail_on_verification_error, first) {
                return Err(error);
            }
        }

        self.diagnostics.info(
            DiagnosticCategory::Setup,
            format!("Woven {}: {report}", module.name()),
        );
        Ok(report)
    }
}

/// Types in weaving order: nested types before the members of their enclosing type
fn processing_order(module: &Module) -> Vec<Token> {
    fn visit(module: &Module, ty: Token, order: &mut Vec<Token>) {
        if let Ok(def) = module.type_def(ty) {
            for nested in &def.nested_types {
                visit(module, *nested, order);
            }
        }
        order.push(ty);
    }

    let mut order = Vec::with_capacity(module.types().len());
    for ty in module.top_level_types() {
        visit(module, ty.token, &mut order);
    }
    order
}

/// Validates the given bodies in parallel, returning the failures in input order
fn verify(module: &Module, methods: &[Token]) -> Vec<(Token, Error)> {
    methods
        .par_iter()
        .filter_map(|token| {
            let checked = module.method(*token).and_then(|method| match &method.body {
                Some(body) => {
                    body.validate(method.arg_count())?;
                    body.compute_max_stack(module, method.returns_value())
                        .map(|_| ())
                }
                None => Ok(()),
            });
            checked.err().map(|error| (*token, error))
        })
        .collect()
}

/// State of one weave pass
struct Pass<'p, 'r> {
    config: &'p WeaverConfig,
    diagnostics: &'p Diagnostics,
    references: &'p WellKnownReferences<'r>,
    report: WeaveReport,
    /// Methods generated or rebuilt by this pass, never woven again
    touched: HashSet<Token>,
    /// Same methods, in creation order, for verification
    woven: Vec<Token>,
}

impl<'p, 'r> Pass<'p, 'r> {
    fn weave_property(
        &mut self,
        module: &mut Module,
        discovery: &mut AspectDiscovery<'r>,
        property: Token,
    ) {
        let member = module.member_display_name(property);
        let chain = match discovery.discover_property(module, property) {
            Ok(chain) => chain,
            Err(error) => {
                self.fail(DiagnosticCategory::Discovery, &member, property, &error);
                return;
            }
        };
        let Some(declaration) = chain.head() else {
            return;
        };
        self.warn_deferred(module, &member, property, declaration, chain.deferred());
        if self.references.location.is_none() {
            self.skip(&member, property, declaration.kind);
            return;
        }

        let plan = match AspectPlan::build(module, discovery.hierarchy(), self.references, declaration)
        {
            Ok(plan) => plan,
            Err(error) => {
                self.fail(DiagnosticCategory::Location, &member, property, &error);
                return;
            }
        };

        if plan.ctor.is_none() {
            let accessors = module
                .property(property)
                .map(|p| [p.getter, p.setter])
                .unwrap_or_default();
            let accessors: Vec<Token> = accessors
                .into_iter()
                .flatten()
                .filter(|token| module.method(*token).is_ok_and(|m| m.has_body()))
                .collect();
            self.stub_out(module, &member, property, declaration, &accessors);
            return;
        }

        let mut ctx = WeaveContext::new(module, self.config, self.references);
        let result = location::weave_property(&mut ctx, property, &plan);
        let transaction = ctx.into_transaction();
        match result {
            Ok(_) => {
                self.commit(&transaction);
                self.report.properties_intercepted += 1;
                self.woven_info(DiagnosticCategory::Location, module, &member, property, declaration);
            }
            Err(error) => {
                self.rollback(module, transaction, &member, property);
                self.fail(DiagnosticCategory::Location, &member, property, &error);
            }
        }
    }

    fn weave_method(
        &mut self,
        module: &mut Module,
        discovery: &mut AspectDiscovery<'r>,
        method: Token,
    ) {
        if self.touched.contains(&method) {
            return;
        }
        let eligible = module.method(method).is_ok_and(|def| {
            !def.is_constructor()
                && !def.is_abstract()
                && def.has_body()
                && !self.config.is_generated_name(&def.name)
        });
        if !eligible {
            return;
        }

        let member = module.member_display_name(method);
        let chain = match discovery.discover_method(module, method) {
            Ok(chain) => chain,
            Err(error) => {
                self.fail(DiagnosticCategory::Discovery, &member, method, &error);
                return;
            }
        };
        let Some((declaration, ignored)) =
            chain.select(&[AspectKind::MethodInterception, AspectKind::MethodBoundary])
        else {
            return;
        };
        self.warn_deferred(module, &member, method, &declaration, ignored.as_slice());

        let (category, available) = match declaration.kind {
            AspectKind::MethodInterception => (
                DiagnosticCategory::Interception,
                self.references.interception.is_some(),
            ),
            _ => (DiagnosticCategory::Boundary, self.references.boundary.is_some()),
        };
        if !available {
            self.skip(&member, method, declaration.kind);
            return;
        }

        let plan = match AspectPlan::build(module, discovery.hierarchy(), self.references, &declaration)
        {
            Ok(plan) => plan,
            Err(error) => {
                self.fail(category, &member, method, &error);
                return;
            }
        };
        if plan.ctor.is_none() {
            self.stub_out(module, &member, method, &declaration, &[method]);
            return;
        }

        let mut ctx = WeaveContext::new(module, self.config, self.references);
        let result = match declaration.kind {
            AspectKind::MethodInterception => interception::weave_method(&mut ctx, method, &plan),
            _ => boundary::weave_method(&mut ctx, method, &plan),
        };
        let transaction = ctx.into_transaction();
        match result {
            Ok(_) => {
                self.commit(&transaction);
                match declaration.kind {
                    AspectKind::MethodInterception => self.report.methods_intercepted += 1,
                    _ => self.report.methods_bounded += 1,
                }
                self.woven_info(category, module, &member, method, &declaration);
            }
            Err(error) => {
                self.rollback(module, transaction, &member, method);
                self.fail(category, &member, method, &error);
            }
        }
    }

    /// Leaves `methods` returning their default value when the aspect cannot be created
    fn stub_out(
        &mut self,
        module: &mut Module,
        member: &str,
        token: Token,
        declaration: &AspectDeclaration<'r>,
        methods: &[Token],
    ) {
        let aspect = declaration.aspect_name(module).to_string();
        let mut ctx = WeaveContext::new(module, self.config, self.references);
        let result = methods.iter().try_for_each(|method| {
            let body = default_return_body(&ctx.module.method(*method)?.signature.return_type)?;
            ctx.replace_body(*method, body)
        });
        let transaction = ctx.into_transaction();
        match result {
            Ok(()) => self.commit(&transaction),
            Err(error) => {
                self.rollback(module, transaction, member, token);
                self.fail(DiagnosticCategory::Setup, member, token, &error);
                return;
            }
        }

        self.report.members_failed += 1;
        self.diagnostics.push(
            Diagnostic::new(
                DiagnosticSeverity::Error,
                category_of(declaration.kind),
                format!("{aspect} has no accessible parameterless constructor, member now returns immediately"),
            )
            .with_member(member)
            .with_token(token),
        );
    }

    fn commit(&mut self, transaction: &Transaction) {
        self.report.clones_added += transaction.added().len();
        for token in transaction.touched() {
            if self.touched.insert(token) {
                self.woven.push(token);
            }
        }
    }

    fn rollback(&mut self, module: &mut Module, transaction: Transaction, member: &str, token: Token) {
        if let Err(error) = transaction.rollback(module) {
            self.diagnostics.push(
                Diagnostic::new(
                    DiagnosticSeverity::Error,
                    DiagnosticCategory::Clone,
                    format!("rollback incomplete: {error}"),
                )
                .with_member(member)
                .with_token(token),
            );
        }
    }

    fn fail(&mut self, category: DiagnosticCategory, member: &str, token: Token, error: &Error) {
        self.report.members_failed += 1;
        self.diagnostics.push(
            Diagnostic::new(DiagnosticSeverity::Error, category, error.to_string())
                .with_member(member)
                .with_token(token),
        );
    }

    fn skip(&mut self, member: &str, token: Token, kind: AspectKind) {
        self.report.members_skipped += 1;
        self.diagnostics.push(
            Diagnostic::new(
                DiagnosticSeverity::Warning,
                DiagnosticCategory::Setup,
                format!("context types for {kind} aspects not found, member skipped"),
            )
            .with_member(member)
            .with_token(token),
        );
    }

    /// Every declaration but the applied one is reported and ignored
    fn warn_deferred(
        &self,
        module: &Module,
        member: &str,
        token: Token,
        head: &AspectDeclaration<'r>,
        ignored: &[AspectDeclaration<'r>],
    ) {
        for declaration in ignored {
            self.diagnostics.push(
                Diagnostic::new(
                    DiagnosticSeverity::Warning,
                    DiagnosticCategory::Discovery,
                    format!(
                        "{} ({} aspect, priority {}) ignored, only {} is applied",
                        declaration.aspect_name(module),
                        declaration.kind,
                        declaration.priority,
                        head.aspect_name(module)
                    ),
                )
                .with_member(member)
                .with_token(token),
            );
        }
    }

    fn woven_info(
        &self,
        category: DiagnosticCategory,
        module: &Module,
        member: &str,
        token: Token,
        declaration: &AspectDeclaration<'r>,
    ) {
        self.diagnostics.push(
            Diagnostic::new(
                DiagnosticSeverity::Info,
                category,
                format!("woven with {}", declaration.aspect_name(module)),
            )
            .with_member(member)
            .with_token(token),
        );
    }
}

fn category_of(kind: AspectKind) -> DiagnosticCategory {
    match kind {
        AspectKind::MethodInterception => DiagnosticCategory::Interception,
        AspectKind::MethodBoundary => DiagnosticCategory::Boundary,
        AspectKind::LocationInterception => DiagnosticCategory::Location,
    }
}

/// Body of a member whose aspect cannot be created
fn default_return_body(return_type: &TypeSignature) -> Result<MethodBody> {
    let mut body = emit::fresh_body();
    let mut asm = InstructionAssembler::new(&mut body);
    emit::emit_default_return(&mut asm, return_type)?;
    asm.finish()?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::OpCode,
        emulation::runtime::reference_resolver,
        metadata::{
            builders::{MethodDefBuilder, PropertyBuilder, TypeDefBuilder},
            customattributes::{CustomAttribute, CustomAttributeArgument},
            typesystem::DefaultAssemblyResolver,
        },
    };

    struct Fixture {
        module: Module,
        interception: Token,
        boundary: Token,
        abstract_aspect: Token,
        calc: Token,
    }

    fn aspect_type(module: &mut Module, name: &str, base: &str, args: &str, hook: &str) -> Token {
        let base = module.type_ref("DotNetAspects", "DotNetAspects.Interception", base);
        let args = module.type_ref("DotNetAspects", "DotNetAspects.Args", args);
        let ty = TypeDefBuilder::new("App", name)
            .public_class()
            .extends(TypeSignature::Class(base))
            .build(module)
            .unwrap();
        let ctor = MethodDefBuilder::constructor()
            .body(|asm| {
                asm.ret();
                Ok(())
            })
            .build(module, ty)
            .unwrap();
        MethodDefBuilder::new(hook)
            .public()
            .override_method()
            .param("args", TypeSignature::Class(args))
            .body(|asm| {
                asm.ret();
                Ok(())
            })
            .build(module, ty)
            .unwrap();
        ctor
    }

    fn fixture() -> Fixture {
        let mut module = Module::new("App");
        let interception = aspect_type(
            &mut module,
            "Intercept",
            "MethodInterceptionAspect",
            "MethodInterceptionArgs",
            "OnInvoke",
        );
        let boundary = aspect_type(
            &mut module,
            "Trace",
            "OnMethodBoundaryAspect",
            "MethodExecutionArgs",
            "OnEntry",
        );

        let base = module.type_ref(
            "DotNetAspects",
            "DotNetAspects.Interception",
            "MethodInterceptionAspect",
        );
        let abstract_ty = TypeDefBuilder::new("App", "Unusable")
            .abstract_class()
            .extends(TypeSignature::Class(base))
            .build(&mut module)
            .unwrap();
        let abstract_aspect = MethodDefBuilder::constructor()
            .body(|asm| {
                asm.ret();
                Ok(())
            })
            .build(&mut module, abstract_ty)
            .unwrap();

        let calc = TypeDefBuilder::new("App", "Calc").public_class().build(&mut module).unwrap();
        Fixture {
            module,
            interception,
            boundary,
            abstract_aspect,
            calc,
        }
    }

    fn method(module: &mut Module, ty: Token, name: &str, attributes: Vec<CustomAttribute>) -> Token {
        let mut builder = MethodDefBuilder::new(name)
            .public()
            .returns(TypeSignature::I4)
            .param("value", TypeSignature::I4);
        for attribute in attributes {
            builder = builder.attribute(attribute);
        }
        builder
            .body(|asm| {
                asm.ldarg(1).ret();
                Ok(())
            })
            .build(module, ty)
            .unwrap()
    }

    #[test]
    fn test_interception_wins_over_boundary() {
        let mut f = fixture();
        let run = method(
            &mut f.module,
            f.calc,
            "Run",
            vec![
                CustomAttribute::new(f.boundary)
                    .with_property("AspectPriority", CustomAttributeArgument::I4(-1)),
                CustomAttribute::new(f.interception),
            ],
        );

        let resolver = reference_resolver().unwrap();
        let weaver = Weaver::new(WeaverConfig::default(), &resolver);
        let report = weaver.weave(&mut f.module).unwrap();

        assert_eq!(report.methods_intercepted, 1);
        assert_eq!(report.methods_bounded, 0);
        assert_eq!(report.clones_added, 1);
        assert!(f.module.methods().iter().any(|m| m.name == "Run$Original"));
        assert!(!f.module.methods().iter().any(|m| m.name == "Run$Boundary"));
        assert_eq!(weaver.diagnostics().warning_count(), 1);
        let warnings = weaver.diagnostics().warnings();
        assert!(warnings[0].message.contains("App.Trace"));
        assert!(warnings[0].message.contains("only App.Intercept is applied"));
        assert!(!weaver.diagnostics().for_member(&f.module.member_display_name(run)).is_empty());
    }

    #[test]
    fn test_type_level_aspect_skips_generated_members() {
        let mut f = fixture();
        let calc = f.calc;
        f.module
            .type_def_mut(calc)
            .unwrap()
            .custom_attributes
            .push(CustomAttribute::new(f.boundary));
        method(&mut f.module, calc, "One", Vec::new());
        method(&mut f.module, calc, "Two", Vec::new());

        let resolver = reference_resolver().unwrap();
        let weaver = Weaver::new(WeaverConfig::default(), &resolver);
        let report = weaver.weave(&mut f.module).unwrap();

        assert_eq!(report.methods_bounded, 2);
        assert_eq!(report.verification_failures, 0);
        let names: Vec<&str> = f.module.methods_of(calc).map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["One", "Two", "One$Boundary", "Two$Boundary"]);
    }

    #[test]
    fn test_missing_constructor_leaves_default_return() {
        let mut f = fixture();
        let broken = method(
            &mut f.module,
            f.calc,
            "Broken",
            vec![CustomAttribute::new(f.abstract_aspect)],
        );

        let resolver = reference_resolver().unwrap();
        let weaver = Weaver::new(WeaverConfig::default(), &resolver);
        let report = weaver.weave(&mut f.module).unwrap();

        assert_eq!(report.members_failed, 1);
        assert_eq!(report.clones_added, 0);
        let body = f.module.method(broken).unwrap().body.as_ref().unwrap();
        let opcodes: Vec<OpCode> = body.instructions().iter().map(|i| i.opcode).collect();
        assert_eq!(opcodes, vec![OpCode::Ldloc0, OpCode::Ret]);
        assert_eq!(body.locals, vec![TypeSignature::I4]);
        assert_eq!(weaver.diagnostics().error_count(), 1);
    }

    #[test]
    fn test_unsupported_property_value_fails_member() {
        let mut f = fixture();
        let calc = f.calc;
        let intercept = f.module.find_type("App.Intercept").unwrap();
        PropertyBuilder::new("Mode", TypeSignature::Char)
            .auto()
            .build(&mut f.module, intercept)
            .unwrap();
        let attribute = CustomAttribute::new(f.interception)
            .with_property("Mode", CustomAttributeArgument::Char('x'));
        let target = method(&mut f.module, calc, "Target", vec![attribute]);
        let methods_before = f.module.methods().len();

        let resolver = reference_resolver().unwrap();
        let weaver = Weaver::new(WeaverConfig::default(), &resolver);
        let report = weaver.weave(&mut f.module).unwrap();

        assert_eq!(report.members_failed, 1);
        assert_eq!(f.module.methods().len(), methods_before);
        let body = f.module.method(target).unwrap().body.as_ref().unwrap();
        assert_eq!(body.instructions()[0].opcode, OpCode::Ldarg1);
        let errors = weaver.diagnostics().errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, DiagnosticCategory::Interception);
    }

    #[test]
    fn test_no_aspect_library_is_nothing_to_weave() {
        let mut module = Module::new("Plain");
        let resolver = DefaultAssemblyResolver::new();
        let weaver = Weaver::new(WeaverConfig::default(), &resolver);
        let report = weaver.weave(&mut module).unwrap();
        assert_eq!(report, WeaveReport::default());
        assert_eq!(weaver.diagnostics().warning_count(), 1);
    }

    #[test]
    fn test_report_display() {
        let report = WeaveReport {
            methods_intercepted: 2,
            verification_failures: 1,
            ..WeaveReport::default()
        };
        let text = report.to_string();
        assert!(text.starts_with("2 intercepted"));
        assert!(text.ends_with("1 failed verification"));
    }
}
