//! Query shape
//!
//! The minimal read shape the core hands the store: a selector, optional
//! ordering, range bounds and a limit.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::document::{compare_values, id_of, ID_FIELD};

/// Which documents a query selects
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Selector {
    /// Every document in the collection
    #[default]
    All,
    /// The single document matching every field (`find`)
    Find(Map<String, Value>),
    /// Documents matching any of the objects (`find_all`)
    FindAll(Vec<Map<String, Value>>),
}

impl Selector {
    /// Whether the selector yields at most one document
    pub fn is_singleton(&self) -> bool {
        matches!(self, Selector::Find(_))
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Selector::All => true,
            Selector::Find(fields) => fields_match(fields, doc),
            Selector::FindAll(any) => any.iter().any(|fields| fields_match(fields, doc)),
        }
    }
}

fn fields_match(fields: &Map<String, Value>, doc: &Value) -> bool {
    fields.iter().all(|(k, v)| doc.get(k) == Some(v))
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Sort order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub fields: Vec<String>,
    pub direction: Direction,
}

impl OrderSpec {
    pub fn ascending(fields: Vec<String>) -> Self {
        Self {
            fields,
            direction: Direction::Ascending,
        }
    }

    /// Compare two documents; ties broken by `id`
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let null = Value::Null;
        let mut ord = Ordering::Equal;
        for field in &self.fields {
            ord = compare_values(a.get(field).unwrap_or(&null), b.get(field).unwrap_or(&null));
            if ord != Ordering::Equal {
                break;
            }
        }
        if ord == Ordering::Equal {
            ord = compare_values(id_of(a).unwrap_or(&null), id_of(b).unwrap_or(&null));
        }
        match self.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        }
    }
}

impl Default for OrderSpec {
    fn default() -> Self {
        Self::ascending(vec![ID_FIELD.to_string()])
    }
}

/// Open or closed range end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundType {
    Open,
    Closed,
}

/// Range bound on one field
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub field: String,
    pub value: Value,
    pub bound_type: BoundType,
}

impl Bound {
    /// Documents at or above (closed) or strictly above (open) the bound
    pub fn admits_above(&self, doc: &Value) -> bool {
        let Some(v) = doc.get(&self.field) else {
            return false;
        };
        match (compare_values(v, &self.value), self.bound_type) {
            (Ordering::Greater, _) | (Ordering::Equal, BoundType::Closed) => true,
            _ => false,
        }
    }

    /// Documents at or below (closed) or strictly below (open) the bound
    pub fn admits_below(&self, doc: &Value) -> bool {
        let Some(v) = doc.get(&self.field) else {
            return false;
        };
        match (compare_values(v, &self.value), self.bound_type) {
            (Ordering::Less, _) | (Ordering::Equal, BoundType::Closed) => true,
            _ => false,
        }
    }
}

/// A read against one table
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    pub selector: Selector,
    pub order: Option<OrderSpec>,
    pub above: Option<Bound>,
    pub below: Option<Bound>,
    pub limit: Option<usize>,
}

impl QuerySpec {
    /// Whether `doc` passes the selector and both bounds
    pub fn matches(&self, doc: &Value) -> bool {
        self.selector.matches(doc)
            && self.above.as_ref().map_or(true, |b| b.admits_above(doc))
            && self.below.as_ref().map_or(true, |b| b.admits_below(doc))
    }

    /// Whether a change feed over this query can report offsets
    pub fn is_windowed(&self) -> bool {
        self.limit.is_some() && !self.selector.is_singleton()
    }

    /// Effective ordering (by `id` when unspecified)
    pub fn effective_order(&self) -> OrderSpec {
        self.order.clone().unwrap_or_default()
    }

    /// Evaluate the query over a set of documents
    pub fn apply(&self, docs: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut selected: Vec<Value> = docs.into_iter().filter(|d| self.matches(d)).collect();
        let order = self.effective_order();
        selected.sort_by(|a, b| order.compare(a, b));

        let limit = if self.selector.is_singleton() {
            Some(self.limit.map_or(1, |l| l.min(1)))
        } else {
            self.limit
        };
        if let Some(limit) = limit {
            selected.truncate(limit);
        }
        selected
    }
}
