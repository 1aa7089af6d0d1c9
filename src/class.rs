//! Class table and runtime instances.
//!
//! Every runtime value is an [`Instance`] of some class held in the
//! [`ClassTable`]. A class's member maps are merged exactly once, when it is
//! defined: ancestors left to right, then the class's own members. Instances
//! share that merged snapshot and copy it on first write, so mutating an
//! instance never reaches its class or its siblings.

use std::{fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::Block,
    call::{self, Bindings, Invocation},
    diagnostics::{Diagnostic, Result},
    task::{TaskId, TaskState},
    vm::Vm,
};

/// Host callable used both as a private class hook and as a native function body.
pub type HostFn = Rc<dyn Fn(&mut Vm, Invocation<'_>) -> Result<Instance>>;

/// Language-visible members.
pub type Members = IndexMap<String, Instance>;

/// Host-only members: data and hooks the language cannot reach.
pub type PrivateMembers = IndexMap<String, Member>;

/// Name of the private hook that implements invocation.
pub const CALL_HOOK: &str = "__call__";

#[derive(Clone)]
pub enum Member {
    Value(Instance),
    Hook(HostFn),
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Member::Hook(_) => write!(f, "Hook(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(usize);

impl ClassId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Object,
    Void,
    Number,
    String,
    Boolean,
    Function,
    Array,
    Promise,
    User,
}

#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub kind: ClassKind,
    pub ancestors: Vec<ClassId>,
    public: Rc<Members>,
    private: Rc<PrivateMembers>,
}

impl Class {
    pub fn public(&self) -> &Members {
        &self.public
    }

    pub fn private(&self) -> &PrivateMembers {
        &self.private
    }
}

/// Declaration of a class prior to registration.
pub struct ClassDef {
    pub name: String,
    pub kind: ClassKind,
    pub ancestors: Vec<ClassId>,
    pub public: Members,
    pub private: PrivateMembers,
}

impl ClassDef {
    pub fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ancestors: Vec::new(),
            public: Members::new(),
            private: PrivateMembers::new(),
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::User)
    }

    pub fn inherits(mut self, ancestor: ClassId) -> Self {
        self.ancestors.push(ancestor);
        self
    }

    pub fn public(mut self, name: impl Into<String>, value: Instance) -> Self {
        self.public.insert(name.into(), value);
        self
    }

    pub fn private(mut self, name: impl Into<String>, value: Instance) -> Self {
        self.private.insert(name.into(), Member::Value(value));
        self
    }

    pub fn hook(mut self, name: impl Into<String>, hook: HostFn) -> Self {
        self.private.insert(name.into(), Member::Hook(hook));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Named(Vec<String>),
    Variadic,
}

impl Params {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Params::Named(names.into_iter().map(Into::into).collect())
    }
}

#[derive(Clone)]
pub enum FunctionBody {
    Script(Block),
    Native(HostFn),
}

#[derive(Clone)]
pub struct FunctionData {
    pub name: String,
    pub params: Params,
    pub body: FunctionBody,
    pub is_async: bool,
}

impl fmt::Debug for FunctionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.body {
            FunctionBody::Script(block) => format!("{} lines", block.len()),
            FunctionBody::Native(_) => "native".to_string(),
        };
        f.debug_struct("FunctionData")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("body", &body)
            .field("is_async", &self.is_async)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum InstanceData {
    /// Plain objects carry no host data.
    None,
    Void,
    Number(f64),
    Str(Rc<str>),
    Bool(bool),
    Array(Rc<Vec<Instance>>),
    Function(Rc<FunctionData>),
    Promise(TaskId),
}

#[derive(Clone)]
pub struct Instance {
    class: ClassId,
    public: Rc<Members>,
    private: Rc<PrivateMembers>,
    data: InstanceData,
}

impl Instance {
    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn data(&self) -> &InstanceData {
        &self.data
    }

    pub fn members(&self) -> &Members {
        &self.public
    }

    pub fn member(&self, name: &str) -> Option<&Instance> {
        self.public.get(name)
    }

    pub fn set_member(&mut self, name: impl Into<String>, value: Instance) {
        Rc::make_mut(&mut self.public).insert(name.into(), value);
    }

    pub fn private_member(&self, name: &str) -> Option<&Member> {
        self.private.get(name)
    }

    pub fn set_private(&mut self, name: impl Into<String>, member: Member) {
        Rc::make_mut(&mut self.private).insert(name.into(), member);
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.data {
            InstanceData::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            InstanceData::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.data {
            InstanceData::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Instance]> {
        match &self.data {
            InstanceData::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<FunctionData>> {
        match &self.data {
            InstanceData::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_task(&self) -> Option<TaskId> {
        match self.data {
            InstanceData::Promise(task) => Some(task),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self.data, InstanceData::Void)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.0)
            .field("data", &self.data)
            .finish()
    }
}

/// Ids of the classes every table starts with.
#[derive(Debug, Clone, Copy)]
pub struct Intrinsics {
    pub function: ClassId,
    pub object: ClassId,
    pub void: ClassId,
    pub number: ClassId,
    pub string: ClassId,
    pub boolean: ClassId,
    pub array: ClassId,
    pub promise: ClassId,
}

/// Arena of classes, owned by the VM and filled through [`ClassTable::define`].
#[derive(Debug)]
pub struct ClassTable {
    classes: Vec<Class>,
    by_name: IndexMap<String, ClassId>,
    intrinsics: Intrinsics,
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassTable {
    pub fn new() -> Self {
        let placeholder = ClassId(0);
        let mut table = Self {
            classes: Vec::new(),
            by_name: IndexMap::new(),
            intrinsics: Intrinsics {
                function: placeholder,
                object: placeholder,
                void: placeholder,
                number: placeholder,
                string: placeholder,
                boolean: placeholder,
                array: placeholder,
                promise: placeholder,
            },
        };
        table.install_intrinsics();
        table
    }

    fn install_intrinsics(&mut self) {
        // Every member is a function instance, so the function class exists
        // first with only its call hook. Once `object` is in place both are
        // rebuilt twice, leaving their natives with the complete member set.
        let function = self.insert(
            ClassDef::new("function", ClassKind::Function)
                .hook(CALL_HOOK, Rc::new(call::invoke_hook)),
        );
        self.intrinsics.function = function;
        let object = self.insert(self.object_def());
        self.intrinsics.object = object;
        for _ in 0..2 {
            let def = self.function_def(object);
            self.replace(function, def);
            let def = self.object_def();
            self.replace(object, def);
        }

        self.intrinsics.void = self.insert(
            ClassDef::new("void", ClassKind::Void)
                .inherits(object)
                .public(
                    "__str__",
                    self.native("__str__", Params::Variadic, |vm, _| {
                        Ok(vm.classes.string("void"))
                    }),
                )
                .public(
                    "__bool__",
                    self.native("__bool__", Params::Variadic, |vm, _| {
                        Ok(vm.classes.boolean(false))
                    }),
                ),
        );

        self.intrinsics.number = self.insert(
            ClassDef::new("number", ClassKind::Number)
                .inherits(object)
                .public(
                    "__str__",
                    self.native("__str__", Params::Variadic, |vm, call| {
                        let text = call.target.as_number().map(format_number).unwrap_or_default();
                        Ok(vm.classes.string(text))
                    }),
                ),
        );

        self.intrinsics.string = self.insert(
            ClassDef::new("string", ClassKind::String)
                .inherits(object)
                .public(
                    "__str__",
                    self.native("__str__", Params::Variadic, |_, call| Ok(call.target.clone())),
                )
                .public(
                    "len",
                    self.native("len", Params::Variadic, |vm, call| {
                        let len = call.target.as_str().map(|s| s.chars().count()).unwrap_or(0);
                        Ok(vm.classes.number(len as f64))
                    }),
                ),
        );

        self.intrinsics.boolean = self.insert(
            ClassDef::new("boolean", ClassKind::Boolean)
                .inherits(object)
                .public(
                    "__str__",
                    self.native("__str__", Params::Variadic, |vm, call| {
                        let value = call.target.as_bool().unwrap_or(false);
                        Ok(vm.classes.string(value.to_string()))
                    }),
                )
                .public(
                    "__bool__",
                    self.native("__bool__", Params::Variadic, |vm, call| {
                        Ok(vm.classes.boolean(call.target.as_bool().unwrap_or(false)))
                    }),
                ),
        );

        self.intrinsics.array = self.insert(
            ClassDef::new("array", ClassKind::Array)
                .inherits(object)
                .public(
                    "__str__",
                    self.native("__str__", Params::Variadic, |vm, call| {
                        let items = call.target.as_array().unwrap_or_default().to_vec();
                        let mut parts = Vec::with_capacity(items.len());
                        for item in &items {
                            parts.push(vm.stringify(item, call.context)?);
                        }
                        Ok(vm.classes.string(format!("[{}]", parts.join(", "))))
                    }),
                )
                .public(
                    "__bool__",
                    self.native("__bool__", Params::Variadic, |vm, call| {
                        let len = call.target.as_array().map_or(0, <[Instance]>::len);
                        Ok(vm.classes.boolean(len > 0))
                    }),
                )
                .public(
                    "len",
                    self.native("len", Params::Variadic, |vm, call| {
                        let len = call.target.as_array().map_or(0, <[Instance]>::len);
                        Ok(vm.classes.number(len as f64))
                    }),
                ),
        );

        self.intrinsics.promise = self.insert(
            ClassDef::new("promise", ClassKind::Promise)
                .inherits(object)
                .public(
                    "__str__",
                    self.native("__str__", Params::Variadic, |vm, call| {
                        let task = call.target.as_task();
                        let state = match task.and_then(|task| vm.tasks.state(task)) {
                            Some(TaskState::Pending) => "pending",
                            Some(TaskState::Ready(_)) => "ready",
                            Some(TaskState::Consumed) | None => "consumed",
                        };
                        Ok(vm.classes.string(format!("<promise {state}>")))
                    }),
                ),
        );
    }

    fn object_def(&self) -> ClassDef {
        ClassDef::new("object", ClassKind::Object)
            .public(
                "__str__",
                self.native("__str__", Params::Variadic, |vm, call| {
                    let name = vm.classes.get(call.target.class()).name.clone();
                    Ok(vm.classes.string(format!("<{name}>")))
                }),
            )
            .public(
                "__bool__",
                self.native("__bool__", Params::Variadic, |vm, _| {
                    Ok(vm.classes.boolean(true))
                }),
            )
    }

    fn function_def(&self, object: ClassId) -> ClassDef {
        ClassDef::new("function", ClassKind::Function)
            .inherits(object)
            .public(
                "__str__",
                self.native("__str__", Params::Variadic, |vm, call| {
                    let text = match call.target.as_function() {
                        Some(function) => format!("<fn {}>", function.name),
                        None => "<fn>".to_string(),
                    };
                    Ok(vm.classes.string(text))
                }),
            )
            .hook(CALL_HOOK, Rc::new(call::invoke_hook))
    }

    /// Registers a class under its name, merging inherited members once.
    pub fn define(&mut self, def: ClassDef) -> Result<ClassId> {
        if self.by_name.contains_key(&def.name) {
            return Err(Diagnostic::runtime(format!(
                "class `{}` is already registered",
                def.name
            ))
            .into());
        }
        if let Some(missing) = def.ancestors.iter().find(|id| id.0 >= self.classes.len()) {
            return Err(Diagnostic::runtime(format!(
                "class `{}` inherits from unknown class #{}",
                def.name, missing.0
            ))
            .into());
        }
        Ok(self.insert(def))
    }

    fn insert(&mut self, def: ClassDef) -> ClassId {
        let (public, private) = self.merge(&def.ancestors, def.public, def.private);
        let id = ClassId(self.classes.len());
        tracing::trace!(class = %def.name, id = id.0, "defined class");
        self.by_name.insert(def.name.clone(), id);
        self.classes.push(Class {
            name: def.name,
            kind: def.kind,
            ancestors: def.ancestors,
            public: Rc::new(public),
            private: Rc::new(private),
        });
        id
    }

    /// Rebuilds an intrinsic in place; instances made earlier keep their snapshot.
    fn replace(&mut self, id: ClassId, def: ClassDef) {
        let (public, private) = self.merge(&def.ancestors, def.public, def.private);
        let class = &mut self.classes[id.0];
        class.ancestors = def.ancestors;
        class.public = Rc::new(public);
        class.private = Rc::new(private);
    }

    /// Ancestor members left to right, then the class's own on top.
    fn merge(
        &self,
        ancestors: &[ClassId],
        own_public: Members,
        own_private: PrivateMembers,
    ) -> (Members, PrivateMembers) {
        let mut public = Members::new();
        let mut private = PrivateMembers::new();
        for ancestor in ancestors {
            let class = &self.classes[ancestor.0];
            for (name, value) in class.public.iter() {
                public.insert(name.clone(), value.clone());
            }
            for (name, member) in class.private.iter() {
                private.insert(name.clone(), member.clone());
            }
        }
        public.extend(own_public);
        private.extend(own_private);
        (public, private)
    }

    pub fn get(&self, id: ClassId) -> &Class {
        &self.classes[id.0]
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn name_of(&self, instance: &Instance) -> &str {
        &self.get(instance.class).name
    }

    /// Whether `id` is `ancestor` or descends from it.
    pub fn inherits(&self, id: ClassId, ancestor: ClassId) -> bool {
        id == ancestor
            || self.classes[id.0]
                .ancestors
                .iter()
                .any(|parent| self.inherits(*parent, ancestor))
    }

    pub fn is_function(&self, instance: &Instance) -> bool {
        self.inherits(instance.class, self.intrinsics.function)
    }

    pub fn instantiate(&self, id: ClassId, data: InstanceData) -> Instance {
        let class = &self.classes[id.0];
        Instance {
            class: id,
            public: Rc::clone(&class.public),
            private: Rc::clone(&class.private),
            data,
        }
    }

    pub fn void(&self) -> Instance {
        self.instantiate(self.intrinsics.void, InstanceData::Void)
    }

    pub fn number(&self, value: f64) -> Instance {
        self.instantiate(self.intrinsics.number, InstanceData::Number(value))
    }

    pub fn string(&self, value: impl Into<Rc<str>>) -> Instance {
        self.instantiate(self.intrinsics.string, InstanceData::Str(value.into()))
    }

    pub fn boolean(&self, value: bool) -> Instance {
        self.instantiate(self.intrinsics.boolean, InstanceData::Bool(value))
    }

    pub fn array(&self, items: Vec<Instance>) -> Instance {
        self.instantiate(self.intrinsics.array, InstanceData::Array(Rc::new(items)))
    }

    pub fn promise(&self, task: TaskId) -> Instance {
        self.instantiate(self.intrinsics.promise, InstanceData::Promise(task))
    }

    pub fn function(&self, data: FunctionData) -> Instance {
        self.instantiate(self.intrinsics.function, InstanceData::Function(Rc::new(data)))
    }

    pub fn native<F>(&self, name: impl Into<String>, params: Params, body: F) -> Instance
    where
        F: Fn(&mut Vm, Invocation<'_>) -> Result<Instance> + 'static,
    {
        self.function(FunctionData {
            name: name.into(),
            params,
            body: FunctionBody::Native(Rc::new(body)),
            is_async: false,
        })
    }
}

/// Formats numbers the way the language prints them: integral values
/// without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Convenience for natives that want their bound arguments in order.
pub fn argument_values(args: &Bindings) -> Vec<Instance> {
    args.values().cloned().collect()
}
