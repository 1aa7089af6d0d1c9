//! Argument binding and invocation of function instances.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    ast::Node,
    class::{CALL_HOOK, FunctionBody, Instance, Member, Params},
    context::ContextId,
    diagnostics::{Diagnostic, Result},
    vm::Vm,
};

/// Parameter name to argument value, in binding order.
pub type Bindings = IndexMap<String, Instance>;

/// Everything a call hook or native body receives.
pub struct Invocation<'a> {
    /// The instance the function was reached through (itself for plain calls).
    pub target: &'a Instance,
    pub function: &'a Instance,
    pub args: Bindings,
    /// The caller's context.
    pub context: ContextId,
}

impl Invocation<'_> {
    pub fn arg(&self, name: &str) -> Option<&Instance> {
        self.args.get(name)
    }
}

/// Invokes `function` with unevaluated argument nodes, binding them by
/// position and by keyword first.
pub fn call(
    vm: &mut Vm,
    target: &Instance,
    function: &Instance,
    args: &[Node],
    context: ContextId,
) -> Result<Instance> {
    if !vm.classes.is_function(function) {
        let name = vm.classes.name_of(function).to_string();
        return Err(Diagnostic::runtime(format!("value of class `{name}` is not callable")).into());
    }
    let (name, params) = match function.as_function() {
        Some(data) => (data.name.clone(), data.params.clone()),
        None => (vm.classes.name_of(function).to_string(), Params::Variadic),
    };
    let bindings = bind_arguments(vm, &name, &params, args, context)?;
    invoke(vm, target, function, bindings, context)
}

/// Runs a function's private call hook with already-bound arguments.
pub fn invoke(
    vm: &mut Vm,
    target: &Instance,
    function: &Instance,
    args: Bindings,
    context: ContextId,
) -> Result<Instance> {
    let hook = match function.private_member(CALL_HOOK) {
        Some(Member::Hook(hook)) => Rc::clone(hook),
        _ => {
            let name = vm.classes.name_of(function).to_string();
            return Err(
                Diagnostic::runtime(format!("value of class `{name}` has no call hook")).into(),
            );
        }
    };
    hook(
        vm,
        Invocation {
            target,
            function,
            args,
            context,
        },
    )
}

pub fn bind_arguments(
    vm: &mut Vm,
    function: &str,
    params: &Params,
    args: &[Node],
    context: ContextId,
) -> Result<Bindings> {
    let mut bound = Bindings::new();
    let mut seen_keyword = false;
    let mut position = 0;

    for arg in args {
        let located = |diag: Diagnostic| match arg.pos() {
            Some(pos) => diag.with_pos(pos.clone()),
            None => diag,
        };

        if let Some((name, value)) = arg.as_assignment() {
            seen_keyword = true;
            if let Params::Named(names) = params {
                if !names.iter().any(|param| param == name) {
                    return Err(located(Diagnostic::binding(format!(
                        "unknown argument `{name}` for `{function}`"
                    )))
                    .into());
                }
            }
            if bound.contains_key(name) {
                return Err(located(Diagnostic::binding(format!(
                    "overriding argument `{name}` for `{function}`"
                )))
                .into());
            }
            let value = vm.eval(value, context)?;
            bound.insert(name.to_string(), value);
            continue;
        }

        if seen_keyword {
            return Err(located(Diagnostic::binding(format!(
                "argument after keyword in call to `{function}`"
            )))
            .into());
        }
        let key = match params {
            Params::Named(names) => match names.get(position) {
                Some(name) => name.clone(),
                None => {
                    return Err(located(Diagnostic::binding(format!(
                        "too many arguments: `{function}` takes {}",
                        names.len()
                    )))
                    .into());
                }
            },
            Params::Variadic => position.to_string(),
        };
        let value = vm.eval(arg, context)?;
        bound.insert(key, value);
        position += 1;
    }

    // Unsupplied parameters shadow outer bindings instead of leaking them.
    if let Params::Named(names) = params {
        for name in names {
            if !bound.contains_key(name) {
                bound.insert(name.clone(), vm.classes.void());
            }
        }
    }
    Ok(bound)
}

/// The `function` class's call hook.
pub(crate) fn invoke_hook(vm: &mut Vm, call: Invocation<'_>) -> Result<Instance> {
    let Some(function) = call.function.as_function().cloned() else {
        return Err(Diagnostic::runtime("function instance carries no body").into());
    };
    match &function.body {
        FunctionBody::Native(body) => {
            let body = Rc::clone(body);
            body(vm, call)
        }
        FunctionBody::Script(block) if function.is_async => {
            vm.spawn_async(&function.name, Rc::clone(block), call.args, call.context)
        }
        FunctionBody::Script(block) => {
            vm.invoke_script(&function.name, block, call.args, call.context)
        }
    }
}
