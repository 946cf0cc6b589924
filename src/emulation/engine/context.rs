//! The emulator: state of one emulation run and its public entry points.
//!
//! An [`Emulator`] borrows the module it executes and a resolver for the modules that
//! module references. Everything it creates while running (heap objects, static field
//! values, reflection objects) is owned by the emulator and dropped with it.
//!
//! Calls between modules are resolved the way the runtime binds them: a `MemberRef` is
//! matched by declaring type, name and parameter types against the definitions of the
//! referenced module, a `TypeRef` by assembly name and full name.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use crate::{
    emulation::{
        engine::{interpreter::BodyLayout, limits::EmulationLimits},
        memory::{HeapObject, ManagedHeap},
        runtime::{hook::HookManager, EXCEPTION_MESSAGE_FIELD, SYSTEM_RUNTIME},
        EmValue, EmulationError, HeapRef, Member, RuntimeType,
    },
    metadata::{
        method::MethodDef,
        module::Module,
        signatures::TypeSignature,
        token::{table, Token},
        typesystem::{AssemblyResolver, FieldDef, TypeDef},
    },
    Result,
};

/// Result of internal emulator operations
pub(crate) type EmResult<T> = std::result::Result<T, EmulationError>;

/// Bound on inheritance chains, cyclic metadata must not hang the emulator
const MAX_HIERARCHY_DEPTH: usize = 64;

/// Message of the exception raised for a `null` receiver
pub(crate) const NULL_REFERENCE_MESSAGE: &str =
    "Object reference not set to an instance of an object.";

/// CIL emulator for the methods of one module.
///
/// # Example
///
/// ```rust,ignore
/// use dotweave::emulation::{runtime::reference_resolver, EmValue, Emulator};
///
/// let resolver = reference_resolver()?;
/// let mut emulator = Emulator::new(&module, &resolver);
/// let calculator = emulator.new_object("Demo.Calculator", Vec::new())?;
/// let sum = emulator.invoke("Demo.Calculator", "Add", vec![calculator, EmValue::I32(2), EmValue::I32(3)])?;
/// assert_eq!(sum, EmValue::I32(5));
/// ```
///
/// # Threading
///
/// An emulator is single threaded and owns all of its state. To run the same module on
/// several threads, create one emulator per thread over a shared module, resolver and
/// [`HookManager`].
pub struct Emulator<'m> {
    pub(super) module: &'m Module,
    pub(super) resolver: &'m dyn AssemblyResolver,
    pub(super) hooks: Arc<HookManager>,
    pub(super) heap: ManagedHeap<'m>,
    pub(super) limits: EmulationLimits,
    pub(super) statics: HashMap<Member<'m>, EmValue<'m>>,
    pub(super) initialized: HashSet<Member<'m>>,
    pub(super) type_objects: HashMap<RuntimeType<'m>, HeapRef>,
    pub(super) method_objects: HashMap<Member<'m>, HeapRef>,
    pub(super) layouts: HashMap<Member<'m>, Arc<BodyLayout>>,
    pub(super) depth: usize,
    pub(super) executed: u64,
}

impl<'m> Emulator<'m> {
    /// Creates an emulator for `module` with the built-in runtime library hooks.
    ///
    /// # Arguments
    ///
    /// * `module` - The module whose methods are executed
    /// * `resolver` - Lookup of the referenced modules, typically
    ///   [`crate::emulation::runtime::reference_resolver`]
    #[must_use]
    pub fn new(module: &'m Module, resolver: &'m dyn AssemblyResolver) -> Self {
        let limits = EmulationLimits::default();
        Emulator {
            module,
            resolver,
            hooks: Arc::new(HookManager::with_runtime()),
            heap: ManagedHeap::new(limits.max_heap_objects),
            limits,
            statics: HashMap::new(),
            initialized: HashSet::new(),
            type_objects: HashMap::new(),
            method_objects: HashMap::new(),
            layouts: HashMap::new(),
            depth: 0,
            executed: 0,
        }
    }

    /// Replaces the hook manager.
    ///
    /// The manager should contain the runtime hooks, see [`HookManager::with_runtime`].
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<HookManager>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Replaces the execution limits. Must be called before anything is allocated.
    #[must_use]
    pub fn with_limits(mut self, limits: EmulationLimits) -> Self {
        self.limits = limits;
        self.heap = ManagedHeap::new(limits.max_heap_objects);
        self
    }

    /// The executed module
    #[must_use]
    pub fn module(&self) -> &'m Module {
        self.module
    }

    /// The hook manager consulted on every call
    #[must_use]
    pub fn hooks(&self) -> &Arc<HookManager> {
        &self.hooks
    }

    /// The managed heap
    #[must_use]
    pub fn heap(&self) -> &ManagedHeap<'m> {
        &self.heap
    }

    /// The managed heap, mutably
    pub fn heap_mut(&mut self) -> &mut ManagedHeap<'m> {
        &mut self.heap
    }

    /// Number of instructions executed so far
    #[must_use]
    pub fn instructions_executed(&self) -> u64 {
        self.executed
    }

    /// Calls a method of the executed module.
    ///
    /// `args` holds the receiver first for instance methods, followed by the declared
    /// arguments.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Emulation`] if the method cannot be resolved or its
    /// execution fails. An uncaught managed exception is reported as
    /// [`EmulationError::ManagedException`].
    pub fn call(&mut self, method: Token, args: Vec<EmValue<'m>>) -> Result<EmValue<'m>> {
        let member = self.resolve_method(self.module, method)?;
        Ok(self.call_with_slots(member, args)?)
    }

    /// Calls a method of the executed module by type full name and method name.
    ///
    /// The overload is chosen by argument count, receiver included.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Emulation`] if no such method exists or its execution fails.
    pub fn invoke(
        &mut self,
        type_name: &str,
        method_name: &str,
        args: Vec<EmValue<'m>>,
    ) -> Result<EmValue<'m>> {
        let module = self.module;
        let ty = module
            .find_type(type_name)
            .ok_or_else(|| EmulationError::TypeNotFound(type_name.to_string()))?;
        let method = module
            .methods_of(ty)
            .find(|m| m.name == method_name && m.arg_count() == args.len())
            .ok_or_else(|| {
                EmulationError::MethodNotFound(format!("{type_name}::{method_name}"))
            })?;
        Ok(self.call_with_slots(Member::new(module, method.token), args)?)
    }

    /// Allocates an instance of a type and runs the constructor matching `args`.
    ///
    /// The type is looked up in the executed module and then in the modules it
    /// references.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Emulation`] if the type or constructor is missing or the
    /// constructor fails.
    pub fn new_object(&mut self, type_name: &str, args: Vec<EmValue<'m>>) -> Result<EmValue<'m>> {
        let ty = self
            .find_type(type_name)
            .ok_or_else(|| EmulationError::TypeNotFound(type_name.to_string()))?;
        let ctor = ty
            .module
            .methods_of(ty.token)
            .find(|m| m.is_constructor() && !m.is_static() && m.signature.params.len() == args.len())
            .map(|m| Member::new(ty.module, m.token))
            .ok_or_else(|| EmulationError::MethodNotFound(format!("{type_name}::.ctor")))?;

        self.ensure_initialized(ty)?;
        let object = self.alloc_object(ty)?;
        self.invoke_method(ctor, Some(EmValue::ObjectRef(object)), args)?;
        Ok(EmValue::ObjectRef(object))
    }

    /// Allocates a string
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Emulation`] if the heap is full.
    pub fn string(&mut self, value: &str) -> Result<EmValue<'m>> {
        Ok(EmValue::ObjectRef(self.heap.alloc_string(value)?))
    }

    /// The contents of a string value, `None` for anything else
    #[must_use]
    pub fn read_string(&self, value: &EmValue<'m>) -> Option<String> {
        value
            .as_object()
            .and_then(|object| self.heap.string(object))
            .map(str::to_string)
    }

    /// Reads an instance field by name, searching the object's type and its bases
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Emulation`] if `object` is not an object or has no such
    /// field.
    pub fn get_field(&self, object: &EmValue<'m>, name: &str) -> Result<EmValue<'m>> {
        let object = object.as_object().ok_or(EmulationError::TypeMismatch {
            expected: "object",
            found: object.kind(),
        })?;
        let ty = match self.heap.get(object)? {
            HeapObject::Object { ty, .. } => *ty,
            other => {
                return Err(EmulationError::TypeMismatch {
                    expected: "object",
                    found: other.kind(),
                }
                .into())
            }
        };
        let field = self
            .find_field(ty, name)
            .ok_or_else(|| EmulationError::FieldNotFound(format!("{ty}::{name}")))?;
        Ok(self.load_field(object, field)?)
    }

    /// Reads a static field by type full name and field name, running the type
    /// initializer first if it has not run yet
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Emulation`] if the type or field is missing or the type
    /// initializer fails.
    pub fn get_static(&mut self, type_name: &str, field: &str) -> Result<EmValue<'m>> {
        let ty = self
            .find_type(type_name)
            .ok_or_else(|| EmulationError::TypeNotFound(type_name.to_string()))?;
        let field = self
            .find_field(ty, field)
            .ok_or_else(|| EmulationError::FieldNotFound(format!("{type_name}::{field}")))?;
        Ok(self.load_static(field)?)
    }

    /// Boxes a value as its natural type, references are returned unchanged
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Emulation`] if the heap is full.
    pub fn box_value(&mut self, value: EmValue<'m>) -> Result<EmValue<'m>> {
        if matches!(value, EmValue::ObjectRef(_) | EmValue::Null) {
            return Ok(value);
        }
        let ty = RuntimeType::Builtin(value.natural_type());
        Ok(EmValue::ObjectRef(
            self.heap.alloc(HeapObject::Boxed { value, ty })?,
        ))
    }

    /// The value inside a boxed object, `None` for anything else
    #[must_use]
    pub fn unbox(&self, value: &EmValue<'m>) -> Option<EmValue<'m>> {
        match self.heap.get(value.as_object()?).ok()? {
            HeapObject::Boxed { value, .. } => Some(value.clone()),
            _ => None,
        }
    }

    /// Creates a managed exception of the named type.
    ///
    /// The returned error is raised by returning it from a hook or native, the
    /// interpreter routes it through the handlers of the emulated code.
    ///
    /// ```rust,ignore
    /// return PreHookResult::Error(emulator.throw("System.InvalidOperationException", "not now"));
    /// ```
    pub fn throw(&mut self, type_name: &str, message: &str) -> EmulationError {
        match self.create_exception(type_name, message) {
            Ok(error) | Err(error) => error,
        }
    }

    /// Message of an exception object
    #[must_use]
    pub fn exception_message(&self, exception: HeapRef) -> Option<String> {
        let HeapObject::Object { ty, .. } = self.heap.get(exception).ok()? else {
            return None;
        };
        let field = self.find_field(*ty, EXCEPTION_MESSAGE_FIELD)?;
        let message = self.load_field(exception, field).ok()?;
        self.read_string(&message)
    }

    fn create_exception(&mut self, type_name: &str, message: &str) -> EmResult<EmulationError> {
        let ty = self
            .find_type(type_name)
            .ok_or_else(|| EmulationError::TypeNotFound(type_name.to_string()))?;
        let text = self.heap.alloc_string(message)?;
        let exception = self.alloc_object(ty)?;
        if let Some(field) = self.find_field(ty, EXCEPTION_MESSAGE_FIELD) {
            self.store_field(exception, field, EmValue::ObjectRef(text))?;
        }
        Ok(EmulationError::ManagedException {
            type_name: type_name.to_string(),
            message: message.to_string(),
            exception,
        })
    }

    /// Error raised by `throw` on an exception object
    pub(crate) fn raise(&self, exception: HeapRef) -> EmulationError {
        let type_name = self
            .type_names(exception)
            .ok()
            .and_then(|names| names.into_iter().next())
            .unwrap_or_else(|| "System.Exception".to_string());
        EmulationError::ManagedException {
            type_name,
            message: self.exception_message(exception).unwrap_or_default(),
            exception,
        }
    }

    /// Splits argument slots into receiver and declared arguments and invokes `method`
    fn call_with_slots(
        &mut self,
        method: Member<'m>,
        mut args: Vec<EmValue<'m>>,
    ) -> EmResult<EmValue<'m>> {
        let def = self.method_def(method)?;
        if args.len() != def.arg_count() {
            return Err(EmulationError::ArgumentCount {
                method: method.to_string(),
                expected: def.arg_count(),
                actual: args.len(),
            });
        }
        let this = if def.signature.has_this {
            Some(args.remove(0))
        } else {
            None
        };
        self.invoke_method(method, this, args)
    }

    /// Definition of a method member
    pub(crate) fn method_def(&self, method: Member<'m>) -> EmResult<&'m MethodDef> {
        method
            .module
            .method(method.token)
            .map_err(|_| EmulationError::MethodNotFound(method.to_string()))
    }

    /// Definition of a type member
    pub(crate) fn type_def(&self, ty: Member<'m>) -> EmResult<&'m TypeDef> {
        ty.module
            .type_def(ty.token)
            .map_err(|_| EmulationError::TypeNotFound(ty.to_string()))
    }

    /// Definition of a field member
    pub(crate) fn field_def(&self, field: Member<'m>) -> EmResult<&'m FieldDef> {
        field
            .module
            .field(field.token)
            .map_err(|_| EmulationError::FieldNotFound(field.to_string()))
    }

    /// Module of the named assembly, the executed module included
    pub(crate) fn module_named(&self, assembly: &str) -> Option<&'m Module> {
        if assembly == self.module.name() {
            return Some(self.module);
        }
        let resolver: &'m dyn AssemblyResolver = self.resolver;
        resolver.resolve(assembly)
    }

    /// Finds a type definition by full name in the executed module and every module
    /// reachable from it
    pub(crate) fn find_type(&self, full_name: &str) -> Option<Member<'m>> {
        let mut queue = VecDeque::from([self.module]);
        let mut visited = HashSet::new();
        while let Some(module) = queue.pop_front() {
            if !visited.insert(module.name()) {
                continue;
            }
            if let Some(token) = module.find_type(full_name) {
                return Some(Member::new(module, token));
            }
            queue.extend(
                module
                    .assembly_refs()
                    .iter()
                    .filter_map(|name| self.module_named(name)),
            );
        }

        self.module_named(SYSTEM_RUNTIME)
            .and_then(|module| module.find_type(full_name).map(|t| Member::new(module, t)))
    }

    /// Resolves a `TypeDef` or `TypeRef` token of `module` to its definition
    pub(crate) fn resolve_type(&self, module: &'m Module, token: Token) -> EmResult<Member<'m>> {
        if token.is_table(table::TYPE_DEF) {
            module
                .type_def(token)
                .map_err(|_| EmulationError::TypeNotFound(token.to_string()))?;
            return Ok(Member::new(module, token));
        }

        let reference = module
            .type_ref_row(token)
            .map_err(|_| EmulationError::TypeNotFound(token.to_string()))?;
        let home = self.module_named(&reference.assembly).ok_or_else(|| {
            EmulationError::TypeNotFound(format!(
                "{} in {}",
                reference.full_name(),
                reference.assembly
            ))
        })?;
        home.find_type(reference.full_name())
            .map(|found| Member::new(home, found))
            .ok_or_else(|| EmulationError::TypeNotFound(reference.full_name().to_string()))
    }

    /// The runtime type a signature of `module` denotes. Generic instances are erased to
    /// their definition.
    pub(crate) fn runtime_type(
        &self,
        module: &'m Module,
        signature: &TypeSignature,
    ) -> EmResult<RuntimeType<'m>> {
        match signature {
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => {
                Ok(RuntimeType::Defined(self.resolve_type(module, *token)?))
            }
            TypeSignature::GenericInst(base, _) => self.runtime_type(module, base),
            other => Ok(RuntimeType::Builtin(other.clone())),
        }
    }

    /// Direct base type of a type definition
    pub(crate) fn base_type(&self, ty: Member<'m>) -> Option<Member<'m>> {
        let base = self.type_def(ty).ok()?.extends.as_ref()?.type_token()?;
        self.resolve_type(ty.module, base).ok()
    }

    /// The type followed by its base types, most derived first
    pub(crate) fn ancestry(&self, ty: Member<'m>) -> Vec<Member<'m>> {
        let mut chain = Vec::new();
        let mut current = Some(ty);
        while let Some(next) = current {
            if chain.len() >= MAX_HIERARCHY_DEPTH || chain.contains(&next) {
                break;
            }
            chain.push(next);
            current = self.base_type(next);
        }
        chain
    }

    /// Resolves a `MethodDef` or method `MemberRef` token of `module` to its definition
    pub(crate) fn resolve_method(&self, module: &'m Module, token: Token) -> EmResult<Member<'m>> {
        if token.is_table(table::METHOD_DEF) {
            module
                .method(token)
                .map_err(|_| EmulationError::MethodNotFound(token.to_string()))?;
            return Ok(Member::new(module, token));
        }

        let not_found = || EmulationError::MethodNotFound(module.member_display_name(token));
        let reference = module.member_ref_row(token).map_err(|_| not_found())?;
        let signature = reference.method_signature().ok_or_else(not_found)?;
        let owner = reference.parent.type_token().ok_or_else(not_found)?;
        let owner = self.resolve_type(module, owner)?;

        for ty in self.ancestry(owner) {
            let found = ty.module.methods_of(ty.token).find(|def| {
                def.name == reference.name
                    && def.signature.has_this == signature.has_this
                    && def.signature.params.len() == signature.params.len()
                    && def
                        .signature
                        .params
                        .iter()
                        .zip(&signature.params)
                        .all(|(defined, referenced)| {
                            ty.module.signature_name(defined) == module.signature_name(referenced)
                        })
            });
            if let Some(def) = found {
                return Ok(Member::new(ty.module, def.token));
            }
        }
        Err(not_found())
    }

    /// Resolves a `Field` or field `MemberRef` token of `module` to its definition
    pub(crate) fn resolve_field(&self, module: &'m Module, token: Token) -> EmResult<Member<'m>> {
        if token.is_table(table::FIELD) {
            module
                .field(token)
                .map_err(|_| EmulationError::FieldNotFound(token.to_string()))?;
            return Ok(Member::new(module, token));
        }

        let not_found = || EmulationError::FieldNotFound(module.member_display_name(token));
        let reference = module.member_ref_row(token).map_err(|_| not_found())?;
        let owner = reference.parent.type_token().ok_or_else(not_found)?;
        let owner = self.resolve_type(module, owner)?;
        self.find_field(owner, &reference.name).ok_or_else(not_found)
    }

    /// Finds a field by name on a type or its bases
    pub(crate) fn find_field(&self, ty: Member<'m>, name: &str) -> Option<Member<'m>> {
        self.ancestry(ty).into_iter().find_map(|owner| {
            owner
                .module
                .fields_of(owner.token)
                .find(|field| field.name == name)
                .map(|field| Member::new(owner.module, field.token))
        })
    }

    /// The override of a virtual method on the runtime type of `receiver`
    pub(crate) fn dispatch_virtual(
        &self,
        method: Member<'m>,
        receiver: HeapRef,
    ) -> EmResult<Member<'m>> {
        let def = self.method_def(method)?;
        if !def.is_virtual() {
            return Ok(method);
        }
        let runtime_type = match self.heap.get(receiver)? {
            HeapObject::Object { ty, .. } | HeapObject::Delegate { ty, .. } => *ty,
            _ => return Ok(method),
        };

        for ty in self.ancestry(runtime_type) {
            if ty.module.name() == method.module.name() && ty.token == def.declaring_type {
                break;
            }
            let found = ty.module.methods_of(ty.token).find(|candidate| {
                candidate.name == def.name
                    && !candidate.is_static()
                    && !candidate.is_abstract()
                    && candidate.signature.params.len() == def.signature.params.len()
            });
            if let Some(candidate) = found {
                return Ok(Member::new(ty.module, candidate.token));
            }
        }
        Ok(method)
    }

    /// Runs the type initializer of `ty` unless it already ran
    pub(crate) fn ensure_initialized(&mut self, ty: Member<'m>) -> EmResult<()> {
        if !self.initialized.insert(ty) {
            return Ok(());
        }
        let initializer = ty
            .module
            .methods_of(ty.token)
            .find(|m| m.name == ".cctor" && m.is_static())
            .map(|m| Member::new(ty.module, m.token));
        if let Some(initializer) = initializer {
            self.invoke_method(initializer, None, Vec::new())?;
        }
        Ok(())
    }

    /// Allocates an instance with all fields at their zero value
    pub(crate) fn alloc_object(&mut self, ty: Member<'m>) -> EmResult<HeapRef> {
        self.heap.alloc(HeapObject::Object {
            ty,
            fields: HashMap::new(),
        })
    }

    /// Reads an instance field
    pub(crate) fn load_field(&self, object: HeapRef, field: Member<'m>) -> EmResult<EmValue<'m>> {
        match self.heap.get(object)? {
            HeapObject::Object { fields, .. } => match fields.get(&field) {
                Some(value) => Ok(value.clone()),
                None => Ok(EmValue::default_for(&self.field_def(field)?.signature.base)),
            },
            other => Err(EmulationError::TypeMismatch {
                expected: "object",
                found: other.kind(),
            }),
        }
    }

    /// Writes an instance field
    pub(crate) fn store_field(
        &mut self,
        object: HeapRef,
        field: Member<'m>,
        value: EmValue<'m>,
    ) -> EmResult<()> {
        match self.heap.get_mut(object)? {
            HeapObject::Object { fields, .. } => {
                fields.insert(field, value);
                Ok(())
            }
            other => Err(EmulationError::TypeMismatch {
                expected: "object",
                found: other.kind(),
            }),
        }
    }

    /// Reads a static field, initializing its type first
    pub(crate) fn load_static(&mut self, field: Member<'m>) -> EmResult<EmValue<'m>> {
        let def = self.field_def(field)?;
        self.ensure_initialized(Member::new(field.module, def.declaring_type))?;
        Ok(self
            .statics
            .get(&field)
            .cloned()
            .unwrap_or_else(|| EmValue::default_for(&def.signature.base)))
    }

    /// Writes a static field, initializing its type first
    pub(crate) fn store_static(&mut self, field: Member<'m>, value: EmValue<'m>) -> EmResult<()> {
        let def = self.field_def(field)?;
        self.ensure_initialized(Member::new(field.module, def.declaring_type))?;
        self.statics.insert(field, value);
        Ok(())
    }

    /// Runtime type of a heap object
    pub(crate) fn type_of(&self, object: HeapRef) -> EmResult<RuntimeType<'m>> {
        let builtin = |name: &str, fallback: TypeSignature| {
            self.find_type(name)
                .map_or(RuntimeType::Builtin(fallback), RuntimeType::Defined)
        };
        Ok(match self.heap.get(object)? {
            HeapObject::String(_) => RuntimeType::Builtin(TypeSignature::String),
            HeapObject::Boxed { ty, .. } => ty.clone(),
            HeapObject::Array { element, .. } => match element {
                RuntimeType::Builtin(signature) => {
                    RuntimeType::Builtin(TypeSignature::sz_array(signature.clone()))
                }
                RuntimeType::Defined(_) => RuntimeType::Builtin(TypeSignature::object_array()),
            },
            HeapObject::Object { ty, .. } | HeapObject::Delegate { ty, .. } => {
                RuntimeType::Defined(*ty)
            }
            HeapObject::Type(_) => builtin("System.Type", TypeSignature::Object),
            HeapObject::Method(_) => builtin("System.Reflection.MethodInfo", TypeSignature::Object),
            HeapObject::Property { .. } => {
                builtin("System.Reflection.PropertyInfo", TypeSignature::Object)
            }
        })
    }

    /// Full names of the runtime type of an object and all types it derives from
    pub(crate) fn type_names(&self, object: HeapRef) -> EmResult<Vec<String>> {
        let names = |ty: Member<'m>| -> Vec<String> {
            self.ancestry(ty)
                .into_iter()
                .filter_map(|t| t.module.type_name(t.token).ok().map(str::to_string))
                .collect()
        };
        let mut chain = match (self.heap.get(object)?, self.type_of(object)?) {
            (HeapObject::Array { element, .. }, _) => {
                vec![format!("{}[]", element.full_name()), "System.Array".to_string()]
            }
            (_, RuntimeType::Defined(ty)) => names(ty),
            (HeapObject::Boxed { .. }, RuntimeType::Builtin(signature)) => vec![
                RuntimeType::Builtin(signature).full_name(),
                "System.ValueType".to_string(),
            ],
            (_, RuntimeType::Builtin(signature)) => vec![RuntimeType::Builtin(signature).full_name()],
        };
        if !chain.iter().any(|name| name == "System.Object") {
            chain.push("System.Object".to_string());
        }
        Ok(chain)
    }

    /// True if `object` is an instance of the named type or derives from it
    pub(crate) fn is_instance(&self, object: HeapRef, type_name: &str) -> EmResult<bool> {
        Ok(self.type_names(object)?.iter().any(|name| name == type_name))
    }

    /// The `System.Type` object of a runtime type, one object per type
    pub(crate) fn type_object(&mut self, ty: RuntimeType<'m>) -> EmResult<HeapRef> {
        if let Some(existing) = self.type_objects.get(&ty) {
            return Ok(*existing);
        }
        let object = self.heap.alloc(HeapObject::Type(ty.clone()))?;
        self.type_objects.insert(ty, object);
        Ok(object)
    }

    /// The `MethodInfo` object of a method, one object per method
    pub(crate) fn method_object(&mut self, method: Member<'m>) -> EmResult<HeapRef> {
        if let Some(existing) = self.method_objects.get(&method) {
            return Ok(*existing);
        }
        let object = self.heap.alloc(HeapObject::Method(method))?;
        self.method_objects.insert(method, object);
        Ok(object)
    }

    /// Boxes `value` as the type `signature` of `module` denotes. Values of reference
    /// types pass through.
    pub(crate) fn box_as(
        &mut self,
        module: &'m Module,
        signature: &TypeSignature,
        value: EmValue<'m>,
    ) -> EmResult<EmValue<'m>> {
        if !signature.requires_boxing() || matches!(value, EmValue::ObjectRef(_) | EmValue::Null) {
            return Ok(value);
        }
        let ty = if signature.is_generic_parameter() {
            RuntimeType::Builtin(value.natural_type())
        } else {
            self.runtime_type(module, signature)?
        };
        Ok(EmValue::ObjectRef(
            self.heap.alloc(HeapObject::Boxed { value, ty })?,
        ))
    }
}
