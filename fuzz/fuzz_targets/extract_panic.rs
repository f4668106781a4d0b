#![no_main]
use libfuzzer_sys::fuzz_target;
use pestools_log::{OptimizationLogExtractor, ScanCursor, SensitivityLogExtractor};
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Both extractors must fail with an error, never a panic.
    if let Ok(cursor) = ScanCursor::from_reader(Cursor::new(data)) {
        let _ = OptimizationLogExtractor::new(cursor).extract();
    }
    if let Ok(cursor) = ScanCursor::from_reader(Cursor::new(data)) {
        let _ = SensitivityLogExtractor::new(cursor).extract();
    }
});
