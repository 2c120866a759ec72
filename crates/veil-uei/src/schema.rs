//! # Argument Schemas
//!
//! A schema tells the aggregator how to read one `(decoder, target,
//! selector)` call: the kind of each argument, which argument is the
//! summable amount, and which execution domain the target lives on.
//! Calls without a registered schema are executed one by one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use veil_core::{Address, DomainId, Plaintext, TaskId};

use crate::error::UeiError;

/// Kind of one call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    /// Unsigned integer word.
    Uint,
    /// Address word.
    Address,
}

impl ArgKind {
    fn accepts(&self, value: &Plaintext) -> bool {
        matches!(
            (self, value),
            (Self::Uint, Plaintext::Uint(_)) | (Self::Address, Plaintext::Address(_))
        )
    }
}

/// How to read and aggregate calls to one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSchema {
    /// Human-readable function name.
    pub name: String,
    /// Argument kinds in call order.
    pub args: Vec<ArgKind>,
    /// Position of the summable amount argument.
    pub amount_index: usize,
    /// Domain the target executes on.
    pub domain: DomainId,
}

impl ArgumentSchema {
    /// Check `args` against the schema.
    pub fn check(&self, task: TaskId, args: &[Plaintext]) -> Result<(), UeiError> {
        if args.len() != self.args.len() {
            return Err(UeiError::ArgumentMismatch {
                task,
                reason: format!(
                    "{} expects {} arguments, got {}",
                    self.name,
                    self.args.len(),
                    args.len()
                ),
            });
        }
        for (i, (kind, value)) in self.args.iter().zip(args).enumerate() {
            if !kind.accepts(value) {
                return Err(UeiError::ArgumentMismatch {
                    task,
                    reason: format!(
                        "{} argument {i} must be {kind:?}, got {}",
                        self.name,
                        value.kind()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Key under which a schema is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallKey {
    /// Decoder contract.
    pub decoder: Address,
    /// Call target.
    pub target: Address,
    /// Function selector.
    pub selector: [u8; 4],
}

/// Registered schemas, keyed by `(decoder, target, selector)`.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<CallKey, ArgumentSchema>,
}

impl SchemaRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema` for `key`, replacing any previous one.
    pub fn register(&mut self, key: CallKey, schema: ArgumentSchema) -> Result<(), UeiError> {
        match schema.args.get(schema.amount_index) {
            Some(ArgKind::Uint) => {}
            Some(ArgKind::Address) => {
                return Err(UeiError::InvalidSchema {
                    name: schema.name,
                    reason: format!("amount argument {} is an address", schema.amount_index),
                });
            }
            None => {
                return Err(UeiError::InvalidSchema {
                    name: schema.name,
                    reason: format!(
                        "amount index {} out of range for {} arguments",
                        schema.amount_index,
                        schema.args.len()
                    ),
                });
            }
        }
        tracing::debug!(schema = %schema.name, target = %key.target, "registered argument schema");
        self.schemas.insert(key, schema);
        Ok(())
    }

    /// Schema for `key`, if registered.
    pub fn lookup(&self, key: &CallKey) -> Option<&ArgumentSchema> {
        self.schemas.get(key)
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether no schema is registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
