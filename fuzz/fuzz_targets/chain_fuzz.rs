#![no_main]
use libfuzzer_sys::fuzz_target;
use svndelta::DeltaChain;
use svndelta::svndiff::WindowReader;

fuzz_target!(|data: &[u8]| {
    // Split the input into a base and up to three delta streams.
    let parts: Vec<&[u8]> = data.split(|&b| b == 0xFF).take(4).collect();
    if parts.len() < 2 {
        return;
    }
    let base = parts[0];
    let members: Vec<_> = parts[1..]
        .iter()
        .rev()
        .filter_map(|d| WindowReader::from_stream(*d).ok())
        .collect();
    let mut chain = DeltaChain::new(members, base);
    let mut out = Vec::new();
    let _ = chain.read_to_end(&mut out);
});
