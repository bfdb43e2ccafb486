#![no_main]

use bodyspool::{Config, MultipartDecoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let config = Config::new().spool_threshold(1024).tokenizer_chunk_size(61);
    let decoder = MultipartDecoder::with_config(data, "X-BOUNDARY", config);

    for part in decoder {
        match part {
            Ok(part) => {
                let _ = part.text();
            }
            Err(_) => break,
        }
    }
});
