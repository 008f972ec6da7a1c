use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use svndelta::io::{FileOptions, combine_files, diff_files, reconstruct_file};

/// Apply a handful of random splices, deletions and overwrites.
fn mutate(rng: &mut StdRng, data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    for _ in 0..rng.random_range(1..8) {
        let at = rng.random_range(0..=out.len());
        match rng.random_range(0..3) {
            0 => {
                let mut insert = vec![0u8; rng.random_range(1..4096)];
                rng.fill(&mut insert[..]);
                out.splice(at..at, insert);
            }
            1 => {
                let end = (at + rng.random_range(1..8192)).min(out.len());
                out.drain(at..end);
            }
            _ => {
                let end = (at + rng.random_range(1..512)).min(out.len());
                let byte = rng.random::<u8>();
                out[at..end].fill(byte);
            }
        }
    }
    out
}

fn build_chain(
    dir: &std::path::Path,
    base_len: usize,
    revisions: usize,
    seed: u64,
    opts: &FileOptions,
) -> (PathBuf, Vec<PathBuf>, Vec<u8>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut current = vec![0u8; base_len];
    rng.fill(&mut current[..]);

    let base = dir.join("r0");
    std::fs::write(&base, &current).unwrap();

    let mut deltas = Vec::with_capacity(revisions);
    let mut prev_path = base.clone();
    for n in 1..=revisions {
        let next = mutate(&mut rng, &current);
        let path = dir.join(format!("r{n}"));
        std::fs::write(&path, &next).unwrap();
        let delta = dir.join(format!("d{n}"));
        diff_files(&prev_path, &path, &delta, opts).unwrap();
        deltas.push(delta);
        prev_path = path;
        current = next;
    }
    (base, deltas, current)
}

#[test]
fn long_chain_over_megabyte_base() {
    let dir = tempfile::tempdir().unwrap();
    let opts = FileOptions::default();
    let (base, deltas, expected) = build_chain(dir.path(), 1024 * 1024, 40, 7, &opts);

    let output = dir.path().join("out");
    let stats = reconstruct_file(&base, &deltas, &output, &opts).unwrap();
    assert_eq!(stats.chain_length, 40);
    assert_eq!(stats.output_size, expected.len() as u64);
    assert_eq!(std::fs::read(&output).unwrap(), expected);

    let combined = dir.path().join("combined");
    let cstats = combine_files(&deltas, &combined, &opts).unwrap();
    assert_eq!(cstats.target_size, expected.len() as u64);
    assert_eq!(cstats.chain_length, 40);

    let single = dir.path().join("single");
    reconstruct_file(&base, &[combined], &single, &opts).unwrap();
    assert_eq!(std::fs::read(&single).unwrap(), expected);
}

#[test]
#[ignore = "large chain test is opt-in due to runtime and disk requirements"]
fn hundred_revisions_over_large_base() {
    let dir = tempfile::tempdir().unwrap();
    let opts = FileOptions::default();
    let (base, deltas, expected) = build_chain(dir.path(), 64 * 1024 * 1024, 100, 11, &opts);

    let output = dir.path().join("out");
    let stats = reconstruct_file(&base, &deltas, &output, &opts).unwrap();
    assert_eq!(stats.output_size, expected.len() as u64);
    assert_eq!(std::fs::read(&output).unwrap(), expected);
}
