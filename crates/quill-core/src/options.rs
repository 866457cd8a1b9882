//! Option values and the option schema
//!
//! Option definitions form an explicit schema built once at startup and
//! shared by reference; there is no process-wide mutable registry.
//! `Options` itself is a persistent map, so scoped overrides clone it
//! cheaply and drop the clone on exit.

use crate::error::{CoreResult, SessionError};
use crate::message::{Message, Severity};
use quill_kernel::Name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Names of the options the core itself consults.
pub mod keys {
    /// Enable kernel/elaborator diagnostics collection (default `false`)
    pub const DIAGNOSTICS: &str = "diagnostics";
    /// Minimum counter value for a diagnostic entry to be displayed (default `20`)
    pub const DIAGNOSTICS_THRESHOLD: &str = "diagnostics.threshold";
    /// Heartbeat budget per unit; `0` means unlimited (default `200000`)
    pub const MAX_HEARTBEATS: &str = "maxHeartbeats";
    /// Recursion-depth cap (default `1000`)
    pub const MAX_REC_DEPTH: &str = "maxRecDepth";
    /// Elaborate deferred work on background tasks (default `false`)
    pub const ELABORATION_ASYNC: &str = "elaboration.async";
    /// Whether elaboration runs inside the interactive server (default `false`)
    pub const ELABORATION_IN_SERVER: &str = "elaboration.inServer";
    /// Fold captured output into the message log (default `true`)
    pub const STDERR_AS_MESSAGES: &str = "stderrAsMessages";
    /// Include the unit name in deterministic-timeout messages (default `true`)
    pub const MODULE_NAME_AT_TIMEOUT: &str = "debug.moduleNameAtTimeout";
}

/// A typed option value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionValue {
    Bool(bool),
    Nat(u64),
    Str(String),
}

impl OptionValue {
    /// Name of the value's type, for mismatch reporting
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "Bool",
            OptionValue::Nat(_) => "Nat",
            OptionValue::Str(_) => "String",
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Nat(n) => write!(f, "{n}"),
            OptionValue::Str(s) => write!(f, "{s}"),
        }
    }
}

/// One registered option: its name, default, and help text
#[derive(Debug, Clone)]
pub struct OptionDecl {
    pub name: Name,
    pub default: OptionValue,
    pub description: &'static str,
}

/// The set of known options, built once and passed by reference.
#[derive(Debug, Clone, Default)]
pub struct OptionSchema {
    decls: hashbrown::HashMap<Name, OptionDecl>,
}

impl OptionSchema {
    pub fn new() -> Self {
        OptionSchema::default()
    }

    /// Schema with every option the session core recognizes.
    pub fn core() -> Self {
        let mut schema = OptionSchema::new();
        let mut reg = |key: &str, default: OptionValue, description: &'static str| {
            schema.register(OptionDecl {
                name: Name::from(key),
                default,
                description,
            });
        };
        reg(
            keys::DIAGNOSTICS,
            OptionValue::Bool(false),
            "collect and report elaboration diagnostics",
        );
        reg(
            keys::DIAGNOSTICS_THRESHOLD,
            OptionValue::Nat(20),
            "minimum counter value for a diagnostic to be displayed",
        );
        reg(
            keys::MAX_HEARTBEATS,
            OptionValue::Nat(200_000),
            "heartbeat budget per compilation unit, 0 for unlimited",
        );
        reg(
            keys::MAX_REC_DEPTH,
            OptionValue::Nat(1000),
            "maximum elaboration recursion depth",
        );
        reg(
            keys::ELABORATION_ASYNC,
            OptionValue::Bool(false),
            "run deferred elaboration on background tasks",
        );
        reg(
            keys::ELABORATION_IN_SERVER,
            OptionValue::Bool(false),
            "elaboration is driven by the interactive server",
        );
        reg(
            keys::STDERR_AS_MESSAGES,
            OptionValue::Bool(true),
            "fold captured output into the message log",
        );
        reg(
            keys::MODULE_NAME_AT_TIMEOUT,
            OptionValue::Bool(true),
            "name the offending unit in deterministic-timeout messages",
        );
        schema
    }

    pub fn register(&mut self, decl: OptionDecl) {
        self.decls.insert(decl.name.clone(), decl);
    }

    pub fn find(&self, name: &Name) -> Option<&OptionDecl> {
        self.decls.get(name)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

/// A persistent option assignment over a shared schema.
#[derive(Debug, Clone)]
pub struct Options {
    schema: Arc<OptionSchema>,
    entries: im::HashMap<Name, OptionValue>,
}

impl Options {
    pub fn new(schema: Arc<OptionSchema>) -> Self {
        Options {
            schema,
            entries: im::HashMap::new(),
        }
    }

    pub fn schema(&self) -> &OptionSchema {
        &self.schema
    }

    /// Set a registered option. Unknown names and type mismatches are
    /// ordinary errors.
    pub fn set(&mut self, key: &str, value: OptionValue) -> CoreResult<()> {
        let name = Name::from(key);
        let decl = self.schema.find(&name).ok_or_else(|| {
            SessionError::ordinary(Message::plain(
                Severity::Error,
                format!("unknown option `{name}`"),
            ))
        })?;
        if decl.default.type_name() != value.type_name() {
            return Err(SessionError::ordinary(Message::plain(
                Severity::Error,
                format!(
                    "option `{name}` expects a {}, got a {}",
                    decl.default.type_name(),
                    value.type_name()
                ),
            )));
        }
        self.entries.insert(name, value);
        Ok(())
    }

    fn get(&self, key: &str) -> Option<OptionValue> {
        let name = Name::from(key);
        self.entries
            .get(&name)
            .cloned()
            .or_else(|| self.schema.find(&name).map(|d| d.default.clone()))
    }

    /// Boolean option, falling back to the schema default (or `false`).
    pub fn get_bool(&self, key: &str) -> bool {
        match self.get(key) {
            Some(OptionValue::Bool(b)) => b,
            _ => false,
        }
    }

    /// Numeric option, falling back to the schema default (or `0`).
    pub fn get_nat(&self, key: &str) -> u64 {
        match self.get(key) {
            Some(OptionValue::Nat(n)) => n,
            _ => 0,
        }
    }

    /// String option, falling back to the schema default (or `""`).
    pub fn get_str(&self, key: &str) -> String {
        match self.get(key) {
            Some(OptionValue::Str(s)) => s,
            _ => String::new(),
        }
    }
}
