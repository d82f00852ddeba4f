#![no_main]

use libfuzzer_sys::fuzz_target;
use sqlmap::sql::markers;

fuzz_target!(|data: &str| {
    // Scanning `${...}`/`#{...}` text markers must never panic, regardless of
    // unterminated substitutions, malformed attribute lists, or nesting
    // inside string literals and comments.
    let _ = markers::parse_text(data);
});
