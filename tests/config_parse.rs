use ocr_mend::{config::Config, structure::StructureTagger};

#[test]
fn parse_example_config() {
    let raw = include_str!("../ocr-mend.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert!(cfg.correction.concurrency >= 1);
    assert!(!cfg.paths.out_dir.is_empty());
    assert_eq!(cfg.dedup.dedup_threshold, 3);
    assert_eq!(cfg.correction.length_ratio_bounds.min, 0.5);
    assert_eq!(cfg.correction.length_ratio_bounds.max, 2.0);
    StructureTagger::new(&cfg).expect("example patterns compile");
}

#[test]
fn example_matches_built_in_defaults() {
    let raw = include_str!("../ocr-mend.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.normalized_for_hash(), Config::default().normalized_for_hash());
}

#[test]
fn omitted_sections_use_defaults() {
    let cfg: Config = toml::from_str("[chunking]\nchunk_budget = 500\noverlap_size = 1\n").unwrap();
    assert_eq!(cfg.chunking.chunk_budget, 500);
    assert_eq!(cfg.correction.max_retries, 5);
    assert_eq!(cfg.service.model, "gemini-2.5-flash");
}

#[test]
fn worker_count_does_not_change_job_hash() {
    let a = Config::default();
    let mut b = Config::default();
    b.correction.concurrency = 16;
    b.paths.out_dir = "elsewhere".into();
    assert_eq!(a.normalized_for_hash(), b.normalized_for_hash());

    let mut c = Config::default();
    c.chunking.overlap_size = 5;
    assert_ne!(a.normalized_for_hash(), c.normalized_for_hash());
}
