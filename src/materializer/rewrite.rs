//! Watch rewrites
//!
//! Stores order a subscription's initial results but not its unbounded
//! live stream. An ordered watch without `find` or `limit` therefore gets
//! an implicit limit, which makes every emitted change carry offsets.

use serde_json::Value;

use crate::methods::names::{FIND, LIMIT, ORDER, WATCH};
use crate::protocol::RequestOptions;

/// Add `limit` to an ordered, unlimited watch. Returns whether the
/// options changed; `None` disables the rewrite.
pub fn watch_rewrites(options: &mut RequestOptions, implicit_limit: Option<usize>) -> bool {
    let Some(limit) = implicit_limit else {
        return false;
    };
    if !options.contains(WATCH)
        || !options.contains(ORDER)
        || options.contains(FIND)
        || options.contains(LIMIT)
    {
        return false;
    }
    options.set(LIMIT, vec![Value::from(limit)]);
    true
}
