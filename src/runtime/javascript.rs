use std::path::Path;

use rquickjs::{Context as JsContext, Ctx, FromJs, Function, Runtime as JsRuntime};
use serde::Deserialize;
use serde_json::Value;

use crate::{BridgeError, Result};

use super::{Mode, Prelude, ScriptLanguage, ScriptModule, write_script_output};

/// Message classes and bridge helpers, evaluated before user code.
const PRELUDE: &str = r#"
class __BridgeMessage {
    constructor(fields) {
        const layout = this.constructor.FIELDS;
        for (const name of Object.keys(layout)) {
            this[name] = layout[name] ? [] : "";
        }
        if (fields) {
            for (const name of Object.keys(fields)) {
                if (!(name in layout)) {
                    throw new TypeError(this.constructor.name + " has no field '" + name + "'");
                }
                this[name] = fields[name];
            }
        }
    }
}

globalThis.console = (function () {
    const write = (...args) => {
        const parts = args.map((arg) => (typeof arg === "string" ? arg : (JSON.stringify(arg) ?? String(arg))));
        __bridgeEmit(parts.join(" ") + "\n");
    };
    return { log: write, info: write, warn: write, error: write, debug: write };
})();

globalThis.fallback_id = function (taskInput) {
    return globalThis.FALLBACK_ID_TEMPLATE.split("{task_name}").join(taskInput.task_name);
};

globalThis.__bridgeTypeName = function (value) {
    if (value === null) {
        return "null";
    }
    if (typeof value === "object" && value.constructor && value.constructor.name) {
        return value.constructor.name;
    }
    return typeof value;
};

globalThis.__bridgeExport = function (typeName, value) {
    const cls = globalThis.__bridgeTypes[typeName];
    if (!(value instanceof cls)) {
        return { error: "must return " + typeName + ", got " + __bridgeTypeName(value) };
    }
    const fields = {};
    for (const [name, repeated] of Object.entries(cls.FIELDS)) {
        const item = value[name];
        if (repeated) {
            if (!Array.isArray(item)) {
                return { error: typeName + "." + name + " must be an array, got " + __bridgeTypeName(item) };
            }
            if (!item.every((entry) => typeof entry === "string")) {
                return { error: typeName + "." + name + " must only contain strings" };
            }
        } else if (typeof item !== "string") {
            return { error: typeName + "." + name + " must be a string, got " + __bridgeTypeName(item) };
        }
        fields[name] = item;
    }
    return { fields: fields };
};

globalThis.__bridgeCall = function (entry, inputType, outputType, fields) {
    const input = new globalThis.__bridgeTypes[inputType](fields);
    return JSON.stringify(__bridgeExport(outputType, entry(input)));
};
"#;

#[derive(Deserialize)]
struct Exported {
    fields: Option<Value>,
    error: Option<String>,
}

/// A JavaScript module evaluated in its own runtime.
pub struct JavascriptModule {
    context: JsContext,
    // dropped after the context
    _runtime: JsRuntime,
    mode: Mode,
}

impl JavascriptModule {
    pub fn load(
        source: &str,
        path: &Path,
        mode: Mode,
        prelude: &Prelude,
    ) -> Result<Self> {
        let runtime = JsRuntime::new().map_err(|e| BridgeError::Load(e.to_string()))?;
        let context = JsContext::full(&runtime).map_err(|e| BridgeError::Load(e.to_string()))?;
        let prelude = Self::prelude_source(prelude, mode);
        let entry = mode.entry_point();
        let file_name = path.display().to_string();

        context.with(|ctx| -> Result<()> {
            let emit = Function::new(ctx.clone(), emit_output).map_err(|e| BridgeError::Load(e.to_string()))?;
            ctx.globals().set("__bridgeEmit", emit).map_err(|e| BridgeError::Load(e.to_string()))?;

            eval_script(&ctx, &prelude).map_err(|e| BridgeError::Load(format!("prelude failed: {}", e)))?;
            eval_script(&ctx, source).map_err(|e| BridgeError::Load(format!("Unable to load javascript file {}: {}", file_name, e)))?;

            let defined: bool = ctx.eval(format!("typeof {} === \"function\"", entry)).map_err(|e| BridgeError::Load(e.to_string()))?;
            if !defined {
                return Err(BridgeError::Load(format!("Expected function '{}' in {}", entry, file_name)));
            }
            Ok(())
        })?;

        Ok(Self {
            context,
            _runtime: runtime,
            mode,
        })
    }

    fn prelude_source(
        prelude: &Prelude,
        mode: Mode,
    ) -> String {
        let mut out = String::from(PRELUDE);
        out.push_str(&format!("\nglobalThis.FALLBACK_ID_TEMPLATE = {};\n", prelude.quoted_template()));
        out.push_str(&format!("globalThis.__name__ = \"{}\";\n", mode.module_name()));

        let mut registry = Vec::new();
        for schema in &prelude.schemas {
            let fields: Vec<String> = schema.fields.iter().map(|(name, repeated)| format!("\"{}\": {}", name, repeated)).collect();
            out.push_str(&format!(
                "\nglobalThis.{0} = class {0} extends __BridgeMessage {{}};\n{0}.FIELDS = {{{1}}};\n",
                schema.name,
                fields.join(", ")
            ));
            registry.push(format!("\"{0}\": {0}", schema.name));
        }
        out.push_str(&format!("globalThis.__bridgeTypes = {{{}}};\n", registry.join(", ")));
        out
    }
}

impl ScriptModule for JavascriptModule {
    fn language(&self) -> ScriptLanguage {
        ScriptLanguage::Javascript
    }

    fn invoke(
        &self,
        input: Value,
    ) -> Result<Value> {
        let mode = self.mode;
        let input_json = serde_json::to_string(&input).map_err(|e| BridgeError::Decode(e.to_string()))?;
        let call_code = format!(
            "__bridgeCall({}, \"{}\", \"{}\", {})",
            mode.entry_point(),
            mode.input_type(),
            mode.output_type(),
            input_json
        );

        let exported = self.context.with(|ctx| match ctx.eval::<String, _>(call_code) {
            Ok(json_str) => Ok(json_str),
            Err(rquickjs::Error::Exception) => Err(BridgeError::Execution(exception_message(&ctx))),
            Err(e) => Err(BridgeError::Execution(e.to_string())),
        })?;

        let exported: Exported = serde_json::from_str(&exported).map_err(|e| BridgeError::ContractViolation(e.to_string()))?;
        match (exported.fields, exported.error) {
            (_, Some(reason)) => Err(BridgeError::ContractViolation(format!("{}(...) {}", mode.entry_point(), reason))),
            (Some(fields), None) => Ok(fields),
            (None, None) => Err(BridgeError::ContractViolation(format!("{}(...) returned nothing", mode.entry_point()))),
        }
    }
}

/// Backs the `console` shim.
fn emit_output(text: String) {
    write_script_output(&text);
}

fn eval_script(
    ctx: &Ctx<'_>,
    code: &str,
) -> std::result::Result<(), String> {
    match ctx.eval::<(), _>(code) {
        Ok(()) => Ok(()),
        Err(rquickjs::Error::Exception) => Err(exception_message(ctx)),
        Err(e) => Err(e.to_string()),
    }
}

/// Message of the pending exception, for both `Error` objects and thrown strings.
fn exception_message(ctx: &Ctx<'_>) -> String {
    let caught = ctx.catch();
    if let Some(text) = caught.as_string().and_then(|s| s.to_string().ok()) {
        return text;
    }
    rquickjs::Exception::from_js(ctx, caught).ok().and_then(|e| e.message()).unwrap_or_else(|| "uncaught exception".to_string())
}
