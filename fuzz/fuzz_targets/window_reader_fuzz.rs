#![no_main]
use libfuzzer_sys::fuzz_target;
use svndelta::svndiff::{self, Version, WindowReader};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must only ever produce errors, never panics.
    if let Ok(windows) = svndiff::decode_stream(data) {
        for w in windows.iter().filter(|w| w.target_view_len() <= 1 << 20) {
            let source = vec![0u8; w.source_view_len() as usize];
            let out = w.apply_view(&source).unwrap();
            assert_eq!(out.len(), w.target_view_len() as usize);
        }
    }

    // Bare window sequences, alternating skip and read.
    for version in [Version::V0, Version::V1] {
        let mut reader = WindowReader::new(data, version);
        for i in 0..64 {
            let res = if i % 2 == 0 {
                reader.skip_window().map(|_| ())
            } else {
                reader.next_window().map(|_| ())
            };
            if res.is_err() {
                break;
            }
        }
    }
});
