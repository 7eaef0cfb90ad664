//! Sandboxed script execution on QuickJS.
//!
//! Scripts run as the body of a function receiving the execution snapshot. They see no
//! host APIs besides `console`, the registered `modules` and, for modules that allow it,
//! `require`. Every run gets its own runtime with memory, stack and time limits.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use rquickjs::{Context as JsContext, Ctx, Exception, FromJs, Function, Runtime as JsRuntime};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{HookflowError, Result, config::ScriptConfig};

use super::modules::{Capability, RegisteredModule};

/// What a script run hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutcome {
    /// value of the script's `return`, `null` when it returns nothing
    pub result: Value,
    /// `variables` as the script left them
    pub variables: Map<String, Value>,
}

/// Runs `code` on a blocking thread so the interpreter never stalls the async workers.
pub async fn run(
    code: String,
    snapshot: Value,
    modules: Vec<(String, RegisteredModule)>,
    limits: ScriptConfig,
) -> Result<ScriptOutcome> {
    tokio::task::spawn_blocking(move || execute(&code, &snapshot, &modules, &limits))
        .await
        .map_err(|e| HookflowError::Runtime(format!("script task failed: {}", e)))?
}

/// Runs `code` with the execution `snapshot` bound to its parameters.
pub fn execute(
    code: &str,
    snapshot: &Value,
    modules: &[(String, RegisteredModule)],
    limits: &ScriptConfig,
) -> Result<ScriptOutcome> {
    let runtime = JsRuntime::new().map_err(|e| HookflowError::Runtime(e.to_string()))?;
    runtime.set_memory_limit(limits.memory_limit_bytes);
    runtime.set_max_stack_size(limits.max_stack_size);
    let deadline = Instant::now() + Duration::from_millis(limits.timeout_ms);
    runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));

    let context = JsContext::full(&runtime).map_err(|e| HookflowError::Runtime(e.to_string()))?;
    let input = serde_json::to_string(snapshot)?;
    let source = wrap(code, modules);

    let output = context.with(|ctx| -> Result<String> {
        ctx.globals().set("__input", input).map_err(|e| HookflowError::Runtime(e.to_string()))?;
        install_console(&ctx).map_err(|e| HookflowError::Runtime(e.to_string()))?;
        for (name, module) in modules {
            install_capability(&ctx, name, module.capability.clone()).map_err(|e| HookflowError::Runtime(e.to_string()))?;
        }

        match ctx.eval::<String, _>(source) {
            Ok(output) => Ok(output),
            Err(rquickjs::Error::Exception) => Err(thrown(&ctx, deadline, limits.timeout_ms)),
            Err(e) => Err(HookflowError::Script(e.to_string())),
        }
    })?;

    let mut output = serde_json::from_str::<Value>(&output)?;
    let variables = match output.get_mut("variables").map(Value::take) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let result = output.get_mut("result").map(Value::take).unwrap_or(Value::Null);
    Ok(ScriptOutcome {
        result,
        variables,
    })
}

/// Turns the pending JS exception into an error carrying only its message.
fn thrown(
    ctx: &Ctx<'_>,
    deadline: Instant,
    timeout_ms: u64,
) -> HookflowError {
    let caught = ctx.catch();
    if Instant::now() >= deadline {
        return HookflowError::Timeout(format!("script exceeded {}ms", timeout_ms));
    }
    let message = match Exception::from_js(ctx, caught.clone()) {
        Ok(exception) => exception.message().unwrap_or_else(|| "script error".to_string()),
        Err(_) => String::from_js(ctx, caught).unwrap_or_else(|_| "script threw a non-error value".to_string()),
    };
    HookflowError::Script(message)
}

fn install_console(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    let log = Function::new(ctx.clone(), |line: String| {
        debug!(target: "hookflow::script", "{}", line);
    })?;
    ctx.globals().set("__console_log", log)
}

fn install_capability<'js>(
    ctx: &Ctx<'js>,
    name: &str,
    capability: Arc<dyn Capability>,
) -> rquickjs::Result<()> {
    let func = Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: String| -> rquickjs::Result<String> {
        let args = serde_json::from_str::<Value>(&args).unwrap_or(Value::Null);
        match capability.call(args) {
            Ok(value) => Ok(value.to_string()),
            Err(e) => Err(Exception::throw_message(&ctx, &e.message())),
        }
    })?;
    ctx.globals().set(format!("__capability_{}", name), func)
}

fn wrap(
    code: &str,
    modules: &[(String, RegisteredModule)],
) -> String {
    let bindings = modules
        .iter()
        .map(|(name, _)| format!("{name}: (...args) => JSON.parse(__capability_{name}(JSON.stringify(args)))"))
        .collect::<Vec<_>>()
        .join(",\n    ");
    let requirable = modules
        .iter()
        .filter(|(_, m)| m.options.allow_require)
        .map(|(name, _)| format!("\"{}\"", name))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"(function () {{
  const __ctx = JSON.parse(__input);
  const __fmt = (args) => args.map((a) => (typeof a === "string" ? a : JSON.stringify(a))).join(" ");
  const console = {{
    log: (...args) => __console_log(__fmt(args)),
    info: (...args) => __console_log(__fmt(args)),
    warn: (...args) => __console_log(__fmt(args)),
    error: (...args) => __console_log(__fmt(args)),
  }};
  const modules = Object.freeze({{
    {bindings}
  }});
  const __requirable = [{requirable}];
  const require = (name) => {{
    if (!__requirable.includes(name)) {{
      throw new Error("module '" + name + "' is not available");
    }}
    return modules[name];
  }};
  const __body = function (ctx, trigger, outputs, variables, loop, error, lastOutput, modules, require, console) {{
{code}
  }};
  const __result = __body(__ctx, __ctx.trigger, __ctx.outputs, __ctx.variables, __ctx.loop, __ctx.error, __ctx.lastOutput, modules, require, console);
  return JSON.stringify({{ result: __result === undefined ? null : __result, variables: __ctx.variables }});
}})()"#
    )
}
