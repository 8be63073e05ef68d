//! Constants configuring the embedded order store.

use std::{env::var, sync::LazyLock};

/// Filesystem path of the redb database file.
pub static DB_PATH: LazyLock<String> =
    LazyLock::new(|| var("VINYLOGIX_DB_PATH").unwrap_or_else(|_| String::from("data/vinylogix.redb")));
