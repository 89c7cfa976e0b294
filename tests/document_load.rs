use ocr_mend::{
    config::Config,
    document::{Document, Page},
};

#[test]
fn transcript_splits_on_form_feeds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.txt");
    std::fs::write(&path, "first page\n\u{c}second page\n\u{c}").unwrap();

    let doc = Document::load(&Config::default(), &path).unwrap();
    assert_eq!(doc.source_id, "book");
    let pages: Vec<(u32, &str)> = doc.pages().iter().map(|p| (p.index, p.text.as_str())).collect();
    assert_eq!(pages, vec![(1, "first page\n"), (2, "second page\n")]);
}

#[test]
fn page_directory_is_read_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("page_002.txt"), "two").unwrap();
    std::fs::write(dir.path().join("page_001.txt"), "one").unwrap();
    std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

    let doc = Document::load(&Config::default(), dir.path()).unwrap();
    let texts: Vec<&str> = doc.pages().iter().map(|p| p.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two"]);
}

#[test]
fn unpadded_page_numbers_sort_by_value() {
    let dir = tempfile::tempdir().unwrap();
    for n in [10, 2, 1, 11] {
        std::fs::write(dir.path().join(format!("page{n}.txt")), format!("p{n}")).unwrap();
    }

    let doc = Document::load(&Config::default(), dir.path()).unwrap();
    let texts: Vec<&str> = doc.pages().iter().map(|p| p.text.as_str()).collect();
    assert_eq!(texts, vec!["p1", "p2", "p10", "p11"]);
}

#[test]
fn json_pages_keep_their_indices_and_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.json");
    std::fs::write(
        &path,
        r#"[{"index": 11, "text": "body", "header_candidates": ["Running Head"]},
            {"index": 12, "text": "more"}]"#,
    )
    .unwrap();

    let doc = Document::load(&Config::default(), &path).unwrap();
    assert_eq!(doc.pages()[0].index, 11);
    assert_eq!(doc.pages()[0].header_candidates, vec!["Running Head"]);
    assert!(doc.pages()[1].footer_candidates.is_empty());
}

#[test]
fn out_of_order_pages_are_rejected() {
    let pages = vec![Page::new(2, "b"), Page::new(1, "a")];
    assert!(Document::new("bad", pages).is_err());
    assert!(Document::new("zero", vec![Page::new(0, "a")]).is_err());
}

#[test]
fn page_limit_is_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.txt");
    std::fs::write(&path, "a\u{c}b\u{c}c").unwrap();
    let mut cfg = Config::default();
    cfg.limits.max_input_pages = 2;
    assert!(Document::load(&cfg, &path).is_err());
}

#[test]
fn content_hash_tracks_text() {
    let a = Document::from_texts("x", ["one", "two"]);
    let b = Document::from_texts("y", ["one", "two"]);
    let c = Document::from_texts("x", ["one", "two!"]);
    assert_eq!(a.content_hash(), b.content_hash());
    assert_ne!(a.content_hash(), c.content_hash());
}
