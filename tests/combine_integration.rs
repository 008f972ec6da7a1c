use svndelta::combine::{Combiner, combine};
use svndelta::svndiff::{DiffWindow, Instruction, InstructionKind};

fn xyzw_pattern_window() -> DiffWindow {
    DiffWindow::new(
        0,
        4,
        6,
        vec![Instruction::source(0, 3), Instruction::target(0, 3)],
        Vec::new(),
    )
}

#[test]
fn overlapping_target_copy_tiles_pattern() {
    let w = xyzw_pattern_window();
    assert_eq!(w.apply(b"XYZW").unwrap(), b"XYZXYZ");
}

#[test]
fn identity_window_combines_to_original() {
    let w = xyzw_pattern_window();
    let identity = DiffWindow::new(0, 6, 6, vec![Instruction::source(0, 6)], Vec::new());

    let combined = combine(&w, &identity).unwrap();
    assert_eq!(combined.source_view_offset(), 0);
    assert_eq!(combined.source_view_len(), 4);
    assert_eq!(combined.target_view_len(), 6);
    assert_eq!(combined.apply(b"XYZW").unwrap(), w.apply(b"XYZW").unwrap());
}

fn aaaa_chain() -> (DiffWindow, DiffWindow) {
    // "AAAA" -> "AAAAAAAA"
    let older = DiffWindow::new(
        0,
        4,
        8,
        vec![Instruction::source(0, 4), Instruction::target(0, 4)],
        Vec::new(),
    );
    // "AAAAAAAA" -> "AAAAAAAABBBB"
    let newer = DiffWindow::new(
        0,
        8,
        12,
        vec![Instruction::source(0, 8), Instruction::new_data(0, 4)],
        b"BBBB".to_vec(),
    );
    (older, newer)
}

#[test]
fn two_step_chain_applies_once() {
    let (older, newer) = aaaa_chain();
    assert_eq!(older.apply(b"AAAA").unwrap(), b"AAAAAAAA");
    assert_eq!(newer.apply(b"AAAAAAAA").unwrap(), b"AAAAAAAABBBB");

    let combined = combine(&older, &newer).unwrap();
    assert_eq!(combined.source_view_len(), 4);
    assert_eq!(combined.target_view_len(), 12);
    assert_eq!(combined.new_data(), b"BBBB");
    assert_eq!(combined.apply(b"AAAA").unwrap(), b"AAAAAAAABBBB");
}

#[test]
fn combiner_state_machine_on_chain() {
    let (older, newer) = aaaa_chain();
    let mut combiner = Combiner::new();

    // Newest first: neither window is self-contained.
    assert!(combiner.add_window(&newer).unwrap().is_none());
    assert!(combiner.add_window(&older).unwrap().is_none());
    assert_eq!(combiner.windows_combined(), 1);
    assert_eq!(combiner.finish(b"AAAA").unwrap(), b"AAAAAAAABBBB");
    assert!(combiner.accumulated().is_none());
}

#[test]
fn self_contained_window_completes_the_chain() {
    let (_, newer) = aaaa_chain();
    let full_text = DiffWindow::new(
        0,
        0,
        8,
        vec![Instruction::new_data(0, 1), Instruction::target(0, 7)],
        b"A".to_vec(),
    );

    let mut combiner = Combiner::new();
    assert!(combiner.add_window(&newer).unwrap().is_none());
    let out = combiner.add_window(&full_text).unwrap().unwrap();
    assert_eq!(out, b"AAAAAAAABBBB");

    // The combiner is back at the start.
    assert!(combiner.accumulated().is_none());
    assert_eq!(combiner.finish(b"ignored").unwrap(), b"");
}

#[test]
fn repeated_source_ranges_become_target_copies() {
    let older = DiffWindow::new(0, 0, 4, vec![Instruction::new_data(0, 4)], b"wxyz".to_vec());
    let newer = DiffWindow::new(
        0,
        4,
        12,
        vec![
            Instruction::source(0, 4),
            Instruction::source(1, 2),
            Instruction::source(0, 4),
            Instruction::source(2, 2),
        ],
        Vec::new(),
    );
    let combined = combine(&older, &newer).unwrap();
    assert!(combined.is_self_contained());
    assert_eq!(combined.new_data(), b"wxyz");
    assert!(
        combined.instructions()[1..]
            .iter()
            .all(|i| i.kind == InstructionKind::CopyFromTarget)
    );
    assert_eq!(combined.apply(b"").unwrap(), b"wxyzxywxyzyz");
}

#[test]
fn reference_past_older_target_is_corrupt() {
    let older = DiffWindow::new(0, 0, 4, vec![Instruction::new_data(0, 4)], b"wxyz".to_vec());
    let newer = DiffWindow::new(0, 6, 6, vec![Instruction::source(0, 6)], Vec::new());
    let err = combine(&older, &newer).unwrap_err();
    assert!(err.is_corrupt_window(), "{err}");

    // A failed combine leaves the combiner reusable.
    let mut combiner = Combiner::new();
    assert!(combiner.combine(&older, &newer).is_err());
    let (o, n) = aaaa_chain();
    let combined = combiner.combine(&o, &n).unwrap();
    assert_eq!(combined.apply(b"AAAA").unwrap(), b"AAAAAAAABBBB");
}

#[test]
fn long_chain_matches_sequential_application() {
    // Each revision rotates the previous one by one byte and appends a byte.
    let base: Vec<u8> = (0..32u8).collect();
    let mut revisions = vec![base.clone()];
    let mut windows = Vec::new();
    for step in 0..20u8 {
        let prev = revisions.last().unwrap().clone();
        let n = prev.len() as u32;
        let w = DiffWindow::new(
            0,
            n,
            n + 1,
            vec![
                Instruction::source(1, n - 1),
                Instruction::source(0, 1),
                Instruction::new_data(0, 1),
            ],
            vec![step],
        );
        let next = w.apply(&prev).unwrap();
        revisions.push(next);
        windows.push(w);
    }

    let mut combiner = Combiner::new();
    for w in windows.iter().rev() {
        assert!(combiner.add_window(w).unwrap().is_none());
    }
    assert_eq!(combiner.finish(&base).unwrap(), *revisions.last().unwrap());
}
