#![no_main]
use libfuzzer_sys::fuzz_target;
use svndelta::combine::Combiner;
use svndelta::svndiff::{DiffWindow, Instruction};

/// Decode a window program from raw bytes: 3 bytes per instruction.
fn window(view_len: u32, bytes: &[u8]) -> DiffWindow {
    let mut instructions = Vec::new();
    let mut new_data = Vec::new();
    let mut pos = 0u32;
    for chunk in bytes.chunks_exact(3).take(64) {
        let len = u32::from(chunk[2] % 32) + 1;
        let inst = match chunk[0] % 3 {
            0 if view_len > 0 => {
                let off = u32::from(chunk[1]) % view_len;
                Instruction::source(off, len.min(view_len - off))
            }
            1 if pos > 0 => Instruction::target(u32::from(chunk[1]) % pos, len),
            _ => {
                let off = new_data.len() as u32;
                new_data.extend(std::iter::repeat_n(chunk[1], len as usize));
                Instruction::new_data(off, len)
            }
        };
        pos += inst.length;
        instructions.push(inst);
    }
    DiffWindow::new(0, view_len, pos, instructions, new_data)
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let source_len = u32::from(data[0]) + 1;
    let split = (data.len() - 1) / 2 + 1;
    let older = window(source_len, &data[1..split]);
    let newer = window(older.target_view_len(), &data[split..]);

    let source: Vec<u8> = (0..source_len).map(|i| i as u8).collect();
    let middle = older.apply(&source).unwrap();
    let expected = newer.apply(&middle).unwrap();

    let mut combiner = Combiner::new();
    let combined = combiner.combine(&older, &newer).unwrap();
    assert_eq!(combined.apply(&source).unwrap(), expected);
});
