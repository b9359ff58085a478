//! Query and write options
//!
//! Each option validates its arguments and writes one parameter under its
//! own name. Cross-option rules that depend on several parameters are
//! checked by [`build_query`] when the terminal runs.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use super::names::{ABOVE, BELOW, COLLECTION, FIND, FIND_ALL, LIMIT, ORDER, TIMEOUT};
use crate::collections::Metadata;
use crate::errors::{HorizonError, HorizonResult};
use crate::pipeline::{OptionHandler, Param, Params, RequestScope};
use crate::store::{Bound, BoundType, Direction, OrderSpec, QuerySpec, Selector};

fn arity(method: &str, args: &[Value], min: usize, max: usize) -> HorizonResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return Err(HorizonError::validation(format!(
            "\"{}\" expects {} argument(s) but found {}",
            method,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn object<'a>(method: &str, value: &'a Value) -> HorizonResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        HorizonError::validation(format!("Argument of \"{}\" must be an object", method))
    })
}

fn non_negative(method: &str, args: &[Value]) -> HorizonResult<u64> {
    arity(method, args, 1, 1)?;
    args[0].as_u64().ok_or_else(|| {
        HorizonError::validation(format!(
            "Argument of \"{}\" must be a non-negative integer",
            method
        ))
    })
}

/// Resolves the collection name through the metadata cache
pub struct CollectionOption {
    metadata: Arc<Metadata>,
}

impl CollectionOption {
    pub fn new(metadata: Arc<Metadata>) -> Self {
        Self { metadata }
    }
}

impl OptionHandler for CollectionOption {
    fn run<'a>(
        &'a self,
        args: &'a [Value],
        _scope: &'a RequestScope,
    ) -> BoxFuture<'a, HorizonResult<Param>> {
        Box::pin(async move {
            arity(COLLECTION, args, 1, 1)?;
            let name = args[0].as_str().ok_or_else(|| {
                HorizonError::validation("Collection name must be a string")
            })?;
            let collection = self.metadata.collection(name).await?;
            Ok(Param::Collection(collection))
        })
    }
}

pub fn parse_find(args: &[Value]) -> HorizonResult<Param> {
    arity(FIND, args, 1, 1)?;
    Ok(Param::Selector(Selector::Find(object(FIND, &args[0])?.clone())))
}

pub fn parse_find_all(args: &[Value]) -> HorizonResult<Param> {
    if args.is_empty() {
        return Err(HorizonError::validation(
            "\"find_all\" expects at least one object",
        ));
    }
    let any = args
        .iter()
        .map(|arg| object(FIND_ALL, arg).cloned())
        .collect::<HorizonResult<Vec<_>>>()?;
    Ok(Param::Selector(Selector::FindAll(any)))
}

pub fn parse_order(args: &[Value]) -> HorizonResult<Param> {
    arity(ORDER, args, 1, 2)?;
    let fields = match &args[0] {
        Value::String(field) => vec![field.clone()],
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    HorizonError::validation("Order fields must be strings")
                })
            })
            .collect::<HorizonResult<Vec<_>>>()?,
        _ => {
            return Err(HorizonError::validation(
                "First argument of \"order\" must be a field name or a non-empty array of them",
            ))
        }
    };
    let direction = match args.get(1).map(|d| d.as_str()) {
        None | Some(Some("ascending")) => Direction::Ascending,
        Some(Some("descending")) => Direction::Descending,
        Some(_) => {
            return Err(HorizonError::validation(
                "Second argument of \"order\" must be \"ascending\" or \"descending\"",
            ))
        }
    };
    Ok(Param::Order(OrderSpec { fields, direction }))
}

pub fn parse_limit(args: &[Value]) -> HorizonResult<Param> {
    let limit = non_negative(LIMIT, args)?;
    Ok(Param::Limit(limit as usize))
}

fn parse_bound(method: &str, args: &[Value], default: BoundType) -> HorizonResult<Param> {
    arity(method, args, 1, 2)?;
    let fields = object(method, &args[0])?;
    if fields.len() != 1 {
        return Err(HorizonError::validation(format!(
            "\"{}\" must name exactly one field",
            method
        )));
    }
    let bound_type = match args.get(1).map(|b| b.as_str()) {
        None => default,
        Some(Some("open")) => BoundType::Open,
        Some(Some("closed")) => BoundType::Closed,
        Some(_) => {
            return Err(HorizonError::validation(format!(
                "Second argument of \"{}\" must be \"open\" or \"closed\"",
                method
            )))
        }
    };
    let Some((field, value)) = fields.iter().next() else {
        return Err(HorizonError::internal("Bound object lost its field"));
    };
    Ok(Param::Bound(Bound {
        field: field.clone(),
        value: value.clone(),
        bound_type,
    }))
}

pub fn parse_above(args: &[Value]) -> HorizonResult<Param> {
    parse_bound(ABOVE, args, BoundType::Closed)
}

pub fn parse_below(args: &[Value]) -> HorizonResult<Param> {
    parse_bound(BELOW, args, BoundType::Open)
}

pub fn parse_timeout(args: &[Value]) -> HorizonResult<Param> {
    let ms = non_negative(TIMEOUT, args)?;
    Ok(Param::Timeout(Duration::from_millis(ms)))
}

/// Assemble the read described by the query options of a request
pub fn build_query(params: &Params) -> HorizonResult<QuerySpec> {
    let selector = match (params.selector(FIND)?, params.selector(FIND_ALL)?) {
        (Some(s), _) | (None, Some(s)) => s.clone(),
        (None, None) => Selector::All,
    };
    let spec = QuerySpec {
        selector,
        order: params.order(ORDER)?.cloned(),
        above: params.bound(ABOVE)?.cloned(),
        below: params.bound(BELOW)?.cloned(),
        limit: params.limit(LIMIT)?.copied(),
    };

    if let Some(order) = &spec.order {
        for (method, bound) in [(ABOVE, &spec.above), (BELOW, &spec.below)] {
            if let Some(bound) = bound {
                if order.fields.first() != Some(&bound.field) {
                    return Err(HorizonError::validation(format!(
                        "\"{}\" must be on the first \"order\" field \"{}\"",
                        method,
                        order.fields.first().map_or("", String::as_str)
                    )));
                }
            }
        }
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(entries: Vec<(&str, Param)>) -> Params {
        let mut params = Params::new();
        for (name, param) in entries {
            params.insert(name, param).unwrap();
        }
        params
    }

    #[test]
    fn test_order_forms() {
        let Param::Order(order) = parse_order(&[json!("score")]).unwrap() else {
            panic!("expected an order");
        };
        assert_eq!(order, OrderSpec::ascending(vec!["score".into()]));

        let Param::Order(order) = parse_order(&[json!(["a", "b"]), json!("descending")]).unwrap()
        else {
            panic!("expected an order");
        };
        assert_eq!(order.fields, vec!["a", "b"]);
        assert_eq!(order.direction, Direction::Descending);

        assert!(parse_order(&[json!([])]).is_err());
        assert!(parse_order(&[json!("a"), json!("sideways")]).is_err());
        assert!(parse_order(&[]).is_err());
    }

    #[test]
    fn test_bound_defaults() {
        let Param::Bound(above) = parse_above(&[json!({"score": 5})]).unwrap() else {
            panic!("expected a bound");
        };
        assert_eq!(above.bound_type, BoundType::Closed);

        let Param::Bound(below) = parse_below(&[json!({"score": 5})]).unwrap() else {
            panic!("expected a bound");
        };
        assert_eq!(below.bound_type, BoundType::Open);

        let err = parse_above(&[json!({"a": 1, "b": 2})]).unwrap_err();
        assert!(matches!(err, HorizonError::Validation(_)));
    }

    #[test]
    fn test_scalar_options() {
        assert!(matches!(parse_limit(&[json!(3)]), Ok(Param::Limit(3))));
        assert!(parse_limit(&[json!(-1)]).is_err());
        assert!(parse_limit(&[json!("3")]).is_err());
        assert!(matches!(
            parse_timeout(&[json!(250)]),
            Ok(Param::Timeout(d)) if d == Duration::from_millis(250)
        ));
        assert!(parse_find(&[json!([1])]).is_err());
        assert!(parse_find_all(&[]).is_err());
    }

    #[test]
    fn test_build_query() {
        let spec = build_query(&params(vec![
            (FIND_ALL, parse_find_all(&[json!({"team": "red"})]).unwrap()),
            (ORDER, parse_order(&[json!("score")]).unwrap()),
            (ABOVE, parse_above(&[json!({"score": 10})]).unwrap()),
            (LIMIT, Param::Limit(2)),
        ]))
        .unwrap();
        assert!(matches!(spec.selector, Selector::FindAll(_)));
        assert_eq!(spec.limit, Some(2));
        assert!(spec.is_windowed());

        let empty = build_query(&Params::new()).unwrap();
        assert_eq!(empty, QuerySpec::default());
    }

    #[test]
    fn test_bound_must_follow_order() {
        let err = build_query(&params(vec![
            (ORDER, parse_order(&[json!(["score", "id"])]).unwrap()),
            (BELOW, parse_below(&[json!({"id": 3})]).unwrap()),
        ]))
        .unwrap_err();
        assert!(matches!(err, HorizonError::Validation(_)));
    }
}
