#![no_main]

use libfuzzer_sys::fuzz_target;
use sqlmap::dialect::Dialect;

fuzz_target!(|data: &str| {
    // Marker rewriting must never panic on arbitrary SQL text, including
    // malformed `:`-prefixed sequences and non-ASCII content.
    #[cfg(feature = "postgres")]
    let _ = Dialect::Postgres.rewrite_markers(data);
    #[cfg(feature = "mysql")]
    let _ = Dialect::MySql.rewrite_markers(data);
    #[cfg(feature = "mssql")]
    let _ = Dialect::MsSql.rewrite_markers(data);
});
