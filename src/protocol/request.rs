//! Request types
//!
//! A parsed client request: an id, a type, and the option methods in the
//! order the client wrote them.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{HorizonError, HorizonResult};

/// Request type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    /// A method pipeline (read, write or subscribe)
    Request,
    /// Stop an in-flight request, usually a `watch`
    EndSubscription,
    /// Liveness ping from the client
    Keepalive,
}

impl RequestType {
    fn parse(raw: Option<&str>) -> HorizonResult<Self> {
        match raw {
            None | Some("request") => Ok(Self::Request),
            Some("end_subscription") => Ok(Self::EndSubscription),
            Some("keepalive") => Ok(Self::Keepalive),
            Some(other) => Err(HorizonError::validation(format!(
                "Unknown request type: {}",
                other
            ))),
        }
    }
}

/// Option methods and their arguments, in client order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    entries: Vec<(String, Vec<Value>)>,
}

impl RequestOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an option; replaces the arguments if the name is present
    pub fn with(mut self, name: impl Into<String>, args: Vec<Value>) -> Self {
        self.set(name, args);
        self
    }

    /// Set an option's arguments, keeping its position if already present
    pub fn set(&mut self, name: impl Into<String>, args: Vec<Value>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = args,
            None => self.entries.push((name, args)),
        }
    }

    /// Arguments of an option
    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, args)| args.as_slice())
    }

    /// Whether an option is present
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Options in client order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.entries
            .iter()
            .map(|(n, args)| (n.as_str(), args.as_slice()))
    }

    /// Option names in client order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed client request
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub request_id: u64,
    pub request_type: RequestType,
    pub options: RequestOptions,
}

/// Raw request for parsing
#[derive(Debug, Deserialize)]
struct RawRequest {
    request_id: u64,
    #[serde(default, rename = "type")]
    request_type: Option<String>,
    #[serde(default)]
    options: Option<serde_json::Map<String, Value>>,
}

impl Request {
    /// A method pipeline request
    pub fn new(request_id: u64, options: RequestOptions) -> Self {
        Self {
            request_id,
            request_type: RequestType::Request,
            options,
        }
    }

    /// An `end_subscription` request
    pub fn end_subscription(request_id: u64) -> Self {
        Self {
            request_id,
            request_type: RequestType::EndSubscription,
            options: RequestOptions::new(),
        }
    }

    /// A `keepalive` request
    pub fn keepalive(request_id: u64) -> Self {
        Self {
            request_id,
            request_type: RequestType::Keepalive,
            options: RequestOptions::new(),
        }
    }

    /// Parse a request from JSON string
    pub fn parse(json: &str) -> HorizonResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| HorizonError::validation(format!("Invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Parse a request from a JSON value
    pub fn from_value(value: Value) -> HorizonResult<Self> {
        let raw: RawRequest = serde_json::from_value(value)
            .map_err(|e| HorizonError::validation(format!("Invalid request: {}", e)))?;
        let request_type = RequestType::parse(raw.request_type.as_deref())?;

        let mut options = RequestOptions::new();
        for (name, args) in raw.options.unwrap_or_default() {
            match args {
                Value::Array(args) => options.set(name, args),
                _ => {
                    return Err(HorizonError::validation(format!(
                        "Arguments of \"{}\" must be an array",
                        name
                    )))
                }
            }
        }

        if request_type == RequestType::Request && options.is_empty() {
            return Err(HorizonError::validation("Request has no options"));
        }

        Ok(Self {
            request_id: raw.request_id,
            request_type,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_preserves_option_order() {
        let request = Request::parse(
            r#"{"request_id": 3, "options": {"order": [["name"]], "collection": ["users"], "limit": [5], "fetch": []}}"#,
        )
        .unwrap();

        assert_eq!(request.request_id, 3);
        assert_eq!(request.request_type, RequestType::Request);
        let names: Vec<&str> = request.options.names().collect();
        assert_eq!(names, vec!["order", "collection", "limit", "fetch"]);
        assert_eq!(request.options.get("limit"), Some(&[json!(5)][..]));
    }

    #[test]
    fn test_parse_special_types() {
        let end = Request::parse(r#"{"request_id": 1, "type": "end_subscription"}"#).unwrap();
        assert_eq!(end.request_type, RequestType::EndSubscription);

        let ka = Request::parse(r#"{"request_id": 2, "type": "keepalive"}"#).unwrap();
        assert_eq!(ka.request_type, RequestType::Keepalive);
    }

    #[test]
    fn test_parse_rejects_bad_requests() {
        assert!(Request::parse("not json").is_err());
        assert!(Request::parse(r#"{"options": {"fetch": []}}"#).is_err());
        assert!(Request::parse(r#"{"request_id": 1, "type": "bogus"}"#).is_err());
        assert!(Request::parse(r#"{"request_id": 1, "options": {"limit": 5}}"#).is_err());
        assert!(Request::parse(r#"{"request_id": 1, "options": {}}"#).is_err());
    }

    #[test]
    fn test_set_keeps_position() {
        let mut options = RequestOptions::new()
            .with("collection", vec![json!("a")])
            .with("limit", vec![json!(1)]);
        options.set("collection", vec![json!("b")]);

        let names: Vec<&str> = options.names().collect();
        assert_eq!(names, vec!["collection", "limit"]);
        assert_eq!(options.get("collection"), Some(&[json!("b")][..]));
    }
}
