use std::{thread, time::Duration};

use crate::{
    call::Invocation,
    class::{Instance, Params, argument_values},
    context::ContextId,
    diagnostics::{Diagnostic, Result},
    pool::HostValue,
    vm::Vm,
};

/// Binds the built-in names into `context`.
pub fn install(vm: &mut Vm, context: ContextId) -> Result<()> {
    let print = vm.classes.native("print", Params::Variadic, print);
    let exit = vm.classes.native("exit", Params::Named(Vec::new()), |vm, _| {
        vm.halt();
        Ok(vm.classes.void())
    });
    let sleep = vm.classes.native("sleep", Params::named(["ms"]), sleep);
    let truth = vm.classes.boolean(true);
    let falsity = vm.classes.boolean(false);

    vm.contexts.set_var(context, "print", print)?;
    vm.contexts.set_var(context, "exit", exit)?;
    vm.contexts.set_var(context, "sleep", sleep)?;
    vm.contexts.set_var(context, "true", truth)?;
    vm.contexts.set_var(context, "false", falsity)?;
    Ok(())
}

fn print(vm: &mut Vm, call: Invocation<'_>) -> Result<Instance> {
    let mut parts = Vec::with_capacity(call.args.len());
    for value in argument_values(&call.args) {
        parts.push(vm.stringify(&value, call.context)?);
    }
    vm.write_line(&parts.join(" "))?;
    Ok(vm.classes.void())
}

/// Resolves after `ms` milliseconds, measured on a pool worker.
fn sleep(vm: &mut Vm, call: Invocation<'_>) -> Result<Instance> {
    let millis = match call.arg("ms").and_then(|ms| ms.as_number()) {
        Some(ms) if ms >= 0.0 && ms.is_finite() => ms as u64,
        _ => {
            return Err(Diagnostic::type_error(
                "`sleep` expects a non-negative number of milliseconds",
            )
            .into());
        }
    };
    vm.spawn_blocking(Box::new(move || {
        thread::sleep(Duration::from_millis(millis));
        HostValue::Void
    }))
}
