//! Names of the built-in methods

pub const COLLECTION: &str = "collection";
pub const FIND: &str = "find";
pub const FIND_ALL: &str = "find_all";
pub const ORDER: &str = "order";
pub const LIMIT: &str = "limit";
pub const ABOVE: &str = "above";
pub const BELOW: &str = "below";
pub const TIMEOUT: &str = "timeout";

pub const FETCH: &str = "fetch";
pub const WATCH: &str = "watch";

pub const STORE: &str = "store";
pub const INSERT: &str = "insert";
pub const UPSERT: &str = "upsert";
pub const UPDATE: &str = "update";
pub const REPLACE: &str = "replace";
pub const REMOVE: &str = "remove";

/// Options that shape a read
pub const QUERY_OPTIONS: [&str; 6] = [FIND, FIND_ALL, ORDER, LIMIT, ABOVE, BELOW];
