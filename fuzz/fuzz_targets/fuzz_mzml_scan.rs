#![no_main]

use libfuzzer_sys::fuzz_target;
use mszsession::engine::mzml::{classify, scan_metadata, scan_positions};

fuzz_target!(|data: &[u8]| {
    // Classification must accept any prefix
    let _ = classify(data);

    // Scans either succeed or fail with an error; they must never panic
    let _ = scan_metadata(data);

    if let Ok(index) = scan_positions(data) {
        // Every recorded range must lie inside the input
        let len = data.len() as u64;
        for stream in [&index.mz, &index.inten, &index.xml] {
            for (start, end) in stream.start_positions.iter().zip(&stream.end_positions) {
                assert!(start <= end && *end <= len);
            }
        }
        assert!(index.validate(None).is_ok());
    }
});
