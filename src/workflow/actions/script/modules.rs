//! Host capabilities that scripts may call by name.

use std::{
    collections::BTreeMap,
    sync::{Arc, LazyLock, RwLock},
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::{HookflowError, Result, ShareLock};

/// Valid module names double as JavaScript identifiers.
static MODULE_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").ok());

/// A host function exposed to scripts as `modules.<name>(...args)`.
///
/// Arguments arrive as a JSON array; the returned value is handed back to the script.
pub trait Capability: Send + Sync {
    fn call(
        &self,
        args: Value,
    ) -> Result<Value>;
}

impl<F> Capability for F
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    fn call(
        &self,
        args: Value,
    ) -> Result<Value> {
        self(args)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleOptions {
    pub description: String,
    /// also reachable through `require(name)`
    pub allow_require: bool,
}

/// Public listing entry of a registered module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
    pub allow_require: bool,
}

#[derive(Clone)]
pub(crate) struct RegisteredModule {
    pub(crate) capability: Arc<dyn Capability>,
    pub(crate) options: ModuleOptions,
}

/// Name-gated table of capabilities shared by every script run of an engine.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: ShareLock<BTreeMap<String, RegisteredModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Registers or replaces `name`.
    pub fn register(
        &self,
        name: &str,
        capability: Arc<dyn Capability>,
        options: ModuleOptions,
    ) -> Result<()> {
        let valid = MODULE_NAME.as_ref().map(|re| re.is_match(name)).unwrap_or(false);
        if !valid {
            return Err(HookflowError::Script(format!("invalid module name '{}'", name)));
        }
        let mut modules = self.modules.write().map_err(|e| HookflowError::Runtime(e.to_string()))?;
        modules.insert(
            name.to_string(),
            RegisteredModule {
                capability,
                options,
            },
        );
        info!(module = name, "script module registered");
        Ok(())
    }

    /// Returns whether `name` was registered.
    pub fn unregister(
        &self,
        name: &str,
    ) -> bool {
        self.modules.write().map(|mut m| m.remove(name).is_some()).unwrap_or(false)
    }

    pub fn list(&self) -> Vec<ModuleInfo> {
        self.modules
            .read()
            .map(|modules| {
                modules
                    .iter()
                    .map(|(name, m)| ModuleInfo {
                        name: name.clone(),
                        description: m.options.description.clone(),
                        allow_require: m.options.allow_require,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Modules handed to one script run. `only` narrows the set; naming an
    /// unregistered module is an error.
    pub(crate) fn select(
        &self,
        only: Option<&[String]>,
    ) -> Result<Vec<(String, RegisteredModule)>> {
        let modules = self.modules.read().map_err(|e| HookflowError::Runtime(e.to_string()))?;
        match only {
            None => Ok(modules.iter().map(|(n, m)| (n.clone(), m.clone())).collect()),
            Some(names) => names
                .iter()
                .map(|n| {
                    modules
                        .get(n)
                        .map(|m| (n.clone(), m.clone()))
                        .ok_or_else(|| HookflowError::Script(format!("module '{}' is not registered", n)))
                })
                .collect(),
        }
    }
}
