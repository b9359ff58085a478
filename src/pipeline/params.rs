//! Parameter store
//!
//! Per-request map from method name to the value its handler produced.
//! Created when a request enters the pipeline and dropped with it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::collections::Collection;
use crate::errors::{HorizonError, HorizonResult};
use crate::permissions::PermissionValidator;
use crate::store::{Bound, OrderSpec, Selector};

/// A value produced by one method
#[derive(Clone)]
pub enum Param {
    Collection(Arc<Collection>),
    Validator(Arc<dyn PermissionValidator>),
    Selector(Selector),
    Order(OrderSpec),
    Limit(usize),
    Bound(Bound),
    Timeout(Duration),
    Value(Value),
    /// Plugin-defined parameter
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Param {
    fn kind(&self) -> &'static str {
        match self {
            Param::Collection(_) => "collection",
            Param::Validator(_) => "validator",
            Param::Selector(_) => "selector",
            Param::Order(_) => "order",
            Param::Limit(_) => "limit",
            Param::Bound(_) => "bound",
            Param::Timeout(_) => "timeout",
            Param::Value(_) => "value",
            Param::Custom(_) => "custom",
        }
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Param::Collection(c) => f.debug_tuple("Collection").field(&c.name()).finish(),
            Param::Selector(s) => f.debug_tuple("Selector").field(s).finish(),
            Param::Order(o) => f.debug_tuple("Order").field(o).finish(),
            Param::Limit(l) => f.debug_tuple("Limit").field(l).finish(),
            Param::Bound(b) => f.debug_tuple("Bound").field(b).finish(),
            Param::Timeout(t) => f.debug_tuple("Timeout").field(t).finish(),
            Param::Value(v) => f.debug_tuple("Value").field(v).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// Parameters of one request
#[derive(Debug, Default)]
pub struct Params {
    values: HashMap<String, Param>,
}

macro_rules! typed_getter {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        /// The parameter `name`, if it was produced and has this type
        pub fn $fn_name(&self, name: &str) -> HorizonResult<Option<&$ty>> {
            match self.values.get(name) {
                None => Ok(None),
                Some(Param::$variant(value)) => Ok(Some(value)),
                Some(other) => Err(mismatch(name, stringify!($variant), other)),
            }
        }
    };
}

fn mismatch(name: &str, expected: &str, found: &Param) -> HorizonError {
    HorizonError::configuration(format!(
        "Parameter \"{}\" is a {}, expected {}",
        name,
        found.kind(),
        expected.to_lowercase()
    ))
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the value of method `name`; each method writes exactly once
    pub fn insert(&mut self, name: impl Into<String>, param: Param) -> HorizonResult<()> {
        let name = name.into();
        if self.values.contains_key(&name) {
            return Err(HorizonError::internal(format!(
                "Parameter \"{}\" was already set",
                name
            )));
        }
        self.values.insert(name, param);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    typed_getter!(collection, Collection, Arc<Collection>);
    typed_getter!(validator, Validator, Arc<dyn PermissionValidator>);
    typed_getter!(selector, Selector, Selector);
    typed_getter!(order, Order, OrderSpec);
    typed_getter!(limit, Limit, usize);
    typed_getter!(bound, Bound, Bound);
    typed_getter!(timeout, Timeout, Duration);
    typed_getter!(value, Value, Value);

    /// A plugin-defined parameter downcast to `T`
    pub fn custom<T: Any + Send + Sync>(&self, name: &str) -> HorizonResult<Option<&T>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(Param::Custom(value)) => value
                .downcast_ref::<T>()
                .map(Some)
                .ok_or_else(|| HorizonError::configuration(format!(
                    "Parameter \"{}\" has an unexpected type",
                    name
                ))),
            Some(other) => Err(mismatch(name, "Custom", other)),
        }
    }
}
