use std::path::Path;

use rustpython_vm::{
    AsObject, Interpreter, PyObjectRef, PyResult, VirtualMachine,
    builtins::{PyBaseExceptionRef, PyDict, PyDictRef, PyList, PyStr, PyStrRef},
    function::IntoFuncArgs,
    scope::Scope,
};
use serde_json::Value;

use crate::{BridgeError, Result};

use super::{MESSAGE_MODULES, Mode, Prelude, ScriptLanguage, ScriptModule, write_script_output};

/// Message classes and bridge helpers, evaluated before user code.
const PRELUDE: &str = r#"
class _Message:
    _FIELDS = {}

    def __init__(self, **fields):
        for name in self._FIELDS:
            setattr(self, name, [] if self._FIELDS[name] else "")
        for name in fields:
            if name not in self._FIELDS:
                raise TypeError(type(self).__name__ + " has no field '" + name + "'")
            setattr(self, name, fields[name])

    def __eq__(self, other):
        if type(self) is not type(other):
            return False
        for name in self._FIELDS:
            if getattr(self, name) != getattr(other, name):
                return False
        return True

    def __repr__(self):
        parts = []
        for name in self._FIELDS:
            parts.append(name + "=" + repr(getattr(self, name)))
        return type(self).__name__ + "(" + ", ".join(parts) + ")"


def fallback_id(task_input):
    return FALLBACK_ID_TEMPLATE.replace("{task_name}", task_input.task_name)


def _bridge_build(type_name, fields):
    return _BRIDGE_TYPES[type_name](**fields)


def _bridge_export(type_name, value):
    cls = _BRIDGE_TYPES[type_name]
    if not isinstance(value, cls):
        return "must return " + type_name + ", got " + type(value).__name__
    fields = {}
    for name in cls._FIELDS:
        item = getattr(value, name, None)
        if cls._FIELDS[name]:
            if not isinstance(item, list):
                return type_name + "." + name + " must be a list, got " + type(item).__name__
            for entry in item:
                if not isinstance(entry, str):
                    return type_name + "." + name + " must only contain str, got " + type(entry).__name__
        elif not isinstance(item, str):
            return type_name + "." + name + " must be str, got " + type(item).__name__
        fields[name] = item
    return fields


class _BridgeStream:
    def write(self, text):
        text = str(text)
        _bridge_emit(text)
        return len(text)

    def flush(self):
        pass


def _bridge_register_modules(names):
    import sys
    module_type = type(sys)
    exports = dict(_BRIDGE_TYPES)
    exports["fallback_id"] = fallback_id
    for full_name in names:
        parts = full_name.split(".")
        parent = None
        for index in range(len(parts)):
            name = ".".join(parts[: index + 1])
            module = sys.modules.get(name)
            if module is None:
                module = module_type(name)
                sys.modules[name] = module
            if index + 1 < len(parts):
                module.__path__ = []
            if parent is not None:
                setattr(parent, parts[index], module)
            parent = module
        for key in exports:
            setattr(parent, key, exports[key])
    stream = _BridgeStream()
    sys.stdout = stream
    sys.stderr = stream


def _bridge_is_callable(value):
    return callable(value)


def _bridge_describe(exc):
    text = type(exc).__name__ + ": " + str(exc)
    tb = exc.__traceback__
    while tb is not None and tb.tb_next is not None:
        tb = tb.tb_next
    if tb is not None:
        text = text + " (line " + str(tb.tb_lineno) + ")"
    return text
"#;

/// A Python module evaluated in its own interpreter.
pub struct PythonModule {
    interpreter: Interpreter,
    scope: Scope,
    mode: Mode,
}

impl PythonModule {
    pub fn load(
        source: &str,
        path: &Path,
        mode: Mode,
        prelude: &Prelude,
    ) -> Result<Self> {
        let interpreter = Interpreter::without_stdlib(Default::default());
        let prelude = Self::prelude_source(prelude);
        let module_name = mode.module_name();
        let entry = mode.entry_point();
        let file_name = path.display().to_string();

        let scope = interpreter.enter(|vm| -> Result<Scope> {
            let scope = vm.new_scope_with_builtins();
            scope
                .globals
                .set_item("__name__", vm.ctx.new_str(module_name.as_str()).into(), vm)
                .and_then(|_| scope.globals.set_item("__file__", vm.ctx.new_str(file_name.as_str()).into(), vm))
                .and_then(|_| scope.globals.set_item("_bridge_emit", vm.new_function("_bridge_emit", emit_output).into(), vm))
                .map_err(|e| BridgeError::Load(describe_exception(vm, &scope.globals, e)))?;

            run_source(vm, &scope, &prelude, "<planbridge-prelude>").map_err(|e| BridgeError::Load(format!("prelude failed: {}", e)))?;
            run_source(vm, &scope, source, &file_name).map_err(|e| BridgeError::Load(format!("Unable to load python file {}: {}", file_name, e)))?;

            let func = scope.globals.get_item(entry, vm).map_err(|_| BridgeError::Load(format!("Expected function '{}' in {}", entry, file_name)))?;
            let is_callable = call_helper(vm, &scope.globals, "_bridge_is_callable", (func,)).map_err(|e| BridgeError::Load(describe_exception(vm, &scope.globals, e)))?;
            if !is_callable.is(&vm.ctx.true_value) {
                return Err(BridgeError::Load(format!("'{}' in {} is not callable", entry, file_name)));
            }

            Ok(scope)
        })?;

        Ok(Self {
            interpreter,
            scope,
            mode,
        })
    }

    /// Renders the prelude with the message classes and fallback template.
    fn prelude_source(prelude: &Prelude) -> String {
        let mut out = String::from(PRELUDE);
        out.push_str(&format!("\nFALLBACK_ID_TEMPLATE = {}\n", prelude.quoted_template()));

        let mut registry = Vec::new();
        for schema in &prelude.schemas {
            let fields: Vec<String> = schema
                .fields
                .iter()
                .map(|(name, repeated)| format!("\"{}\": {}", name, if *repeated { "True" } else { "False" }))
                .collect();
            out.push_str(&format!("\n\nclass {}(_Message):\n    _FIELDS = {{{}}}\n", schema.name, fields.join(", ")));
            registry.push(format!("\"{0}\": {0}", schema.name));
        }
        out.push_str(&format!("\n\n_BRIDGE_TYPES = {{{}}}\n", registry.join(", ")));

        let modules: Vec<String> = MESSAGE_MODULES.iter().map(|name| format!("\"{}\"", name)).collect();
        out.push_str(&format!("_bridge_register_modules([{}])\n", modules.join(", ")));
        out
    }
}

impl ScriptModule for PythonModule {
    fn language(&self) -> ScriptLanguage {
        ScriptLanguage::Python3
    }

    fn invoke(
        &self,
        input: Value,
    ) -> Result<Value> {
        let mode = self.mode;
        let globals = &self.scope.globals;

        self.interpreter.enter(|vm| {
            let fields = json_to_pyobject(vm, &input).map_err(|e| BridgeError::Decode(describe_exception(vm, globals, e)))?;
            let input_type: PyObjectRef = vm.ctx.new_str(mode.input_type()).into();
            let py_input = call_helper(vm, globals, "_bridge_build", (input_type, fields)).map_err(|e| BridgeError::Decode(describe_exception(vm, globals, e)))?;

            let func = globals.get_item(mode.entry_point(), vm).map_err(|e| BridgeError::Load(describe_exception(vm, globals, e)))?;
            let output = func.call((py_input,), vm).map_err(|e| BridgeError::Execution(describe_exception(vm, globals, e)))?;

            let output_type: PyObjectRef = vm.ctx.new_str(mode.output_type()).into();
            let exported = call_helper(vm, globals, "_bridge_export", (output_type, output)).map_err(|e| BridgeError::ContractViolation(describe_exception(vm, globals, e)))?;
            if let Some(reason) = exported.payload::<PyStr>() {
                return Err(BridgeError::ContractViolation(format!("{}(...) {}", mode.entry_point(), reason.as_str())));
            }

            pyobject_to_json(vm, &exported)
        })
    }
}

fn run_source(
    vm: &VirtualMachine,
    scope: &Scope,
    source: &str,
    source_path: &str,
) -> std::result::Result<(), String> {
    let code_obj = vm.compile(source, rustpython_vm::compiler::Mode::Exec, source_path.to_owned()).map_err(|e| format!("{:?}", e))?;
    vm.run_code_obj(code_obj, scope.clone()).map_err(|e| describe_exception(vm, &scope.globals, e))?;
    Ok(())
}

fn call_helper(
    vm: &VirtualMachine,
    globals: &PyDictRef,
    name: &str,
    args: impl IntoFuncArgs,
) -> PyResult {
    let helper = globals.get_item(name, vm)?;
    helper.call(args, vm)
}

/// Backs `sys.stdout` and `sys.stderr` of user code.
fn emit_output(text: PyStrRef) {
    write_script_output(text.as_str());
}

/// Formats a Python exception as `Type: message (line N)`.
fn describe_exception(
    vm: &VirtualMachine,
    globals: &PyDictRef,
    exc: PyBaseExceptionRef,
) -> String {
    let fallback = format!("{:?}", exc);
    let exc: PyObjectRef = exc.into();
    match call_helper(vm, globals, "_bridge_describe", (exc,)) {
        Ok(text) => text.payload::<PyStr>().map(|s| s.as_str().to_string()).unwrap_or(fallback),
        Err(_) => fallback,
    }
}

/// Convert message fields to Python objects.
fn json_to_pyobject(
    vm: &VirtualMachine,
    value: &Value,
) -> PyResult<PyObjectRef> {
    let obj = match value {
        Value::Null => vm.ctx.none(),
        Value::Bool(b) => vm.ctx.new_bool(*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => vm.ctx.new_int(i).into(),
            None => vm.ctx.new_float(n.as_f64().unwrap_or_default()).into(),
        },
        Value::String(s) => vm.ctx.new_str(s.as_str()).into(),
        Value::Array(arr) => {
            let items = arr.iter().map(|v| json_to_pyobject(vm, v)).collect::<PyResult<Vec<_>>>()?;
            vm.ctx.new_list(items).into()
        }
        Value::Object(obj) => {
            let py_dict = vm.ctx.new_dict();
            for (k, v) in obj {
                py_dict.set_item(k.as_str(), json_to_pyobject(vm, v)?, vm)?;
            }
            py_dict.into()
        }
    };
    Ok(obj)
}

/// Convert exported message fields back to JSON.
///
/// Only `str`, `list` and `dict` are expected here; the prelude has already
/// checked every field's type.
fn pyobject_to_json(
    vm: &VirtualMachine,
    obj: &PyObjectRef,
) -> Result<Value> {
    if let Some(s) = obj.payload::<PyStr>() {
        return Ok(Value::String(s.as_str().to_string()));
    }

    if let Some(list) = obj.payload::<PyList>() {
        let mut arr = Vec::new();
        for item in list.borrow_vec().iter() {
            arr.push(pyobject_to_json(vm, item)?);
        }
        return Ok(Value::Array(arr));
    }

    if let Some(dict) = obj.payload::<PyDict>() {
        let mut map = serde_json::Map::new();
        for (k, v) in dict {
            let key = k.payload::<PyStr>().map(|s| s.as_str().to_string()).ok_or_else(|| BridgeError::ContractViolation(format!("non-string field name {:?}", k)))?;
            map.insert(key, pyobject_to_json(vm, &v)?);
        }
        return Ok(Value::Object(map));
    }

    Err(BridgeError::ContractViolation(format!("unsupported value {:?}", obj)))
}
