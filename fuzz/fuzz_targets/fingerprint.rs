#![no_main]

use libfuzzer_sys::fuzz_target;
use lineage_core::fingerprint::fingerprint;

fuzz_target!(|data: &[u8]| {
    if let Ok(sql) = std::str::from_utf8(data) {
        let _ = fingerprint(sql, "fuzz_db");
    }
});
