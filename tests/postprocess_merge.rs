use ocr_mend::{
    config::Config,
    document::Document,
    pipeline::prepare,
    postprocess::{ChunkText, assemble, markdown_to_text, merge_chunks},
};

const PAGE: &str = "Chapter One\n\nIt was a dark night on the moor.\nThe wind howled loudly.\n\nMorning came slowly to the valley.";

const EXPECTED: &str = "# Chapter One\n\nIt was a dark night on the moor.\nThe wind howled loudly.\n\nMorning came slowly to the valley.\n";

fn assemble_with(cfg: &Config, corrected: Option<&str>) -> (String, ocr_mend::report::MarkerStats) {
    let doc = Document::from_texts("moor", [PAGE]);
    let prepared = prepare(cfg, &doc).unwrap();
    assert_eq!(prepared.markers.len(), 2);
    let texts: Vec<ChunkText> = prepared
        .plan
        .chunks
        .iter()
        .map(|c| match corrected {
            Some(t) => ChunkText {
                text: t.to_string(),
                verbatim: false,
            },
            None => ChunkText {
                text: c.primary.clone(),
                verbatim: true,
            },
        })
        .collect();
    assemble(cfg, &prepared.plan.chunks, &texts, &prepared.markers)
}

#[test]
fn markers_render_on_uncorrected_text() {
    let (md, stats) = assemble_with(&Config::default(), None);
    assert_eq!(md, EXPECTED);
    assert_eq!(stats.relocated, 0);
}

#[test]
fn markers_are_found_in_corrected_text() {
    let corrected = "Chapter One\n\nIt was a dark night on the moor.\nThe wind howled loudly.\n\nMorning came slowly to the valley.";
    let (md, stats) = assemble_with(&Config::default(), Some(corrected));
    assert_eq!(md, EXPECTED);
    assert_eq!((stats.relocated, stats.unplaced), (0, 0));
}

#[test]
fn flattened_correction_gets_structure_back() {
    let corrected = "It was a dark night on the moor. The wind howled loudly. Morning came slowly to the valley.";
    let (md, stats) = assemble_with(&Config::default(), Some(corrected));
    assert_eq!(
        md,
        "# Chapter One\n\nIt was a dark night on the moor. The wind howled loudly.\n\nMorning came slowly to the valley.\n"
    );
    assert_eq!(stats.total, 2);
    assert_eq!(stats.relocated, 1);
    assert_eq!(stats.unplaced, 0);
}

#[test]
fn unfindable_paragraph_is_counted() {
    let corrected = "Chapter One\n\nIt was a dark night on the moor. The wind howled loudly. Dawn crept into the valley.";
    let (_, stats) = assemble_with(&Config::default(), Some(corrected));
    assert_eq!(stats.unplaced, 1);
}

#[test]
fn text_rendition_drops_heading_marks() {
    assert_eq!(
        markdown_to_text(EXPECTED),
        "Chapter One\n\nIt was a dark night on the moor.\nThe wind howled loudly.\n\nMorning came slowly to the valley.\n"
    );
}

#[test]
fn chunks_join_in_order_and_blank_runs_collapse() {
    let cfg = Config::default();
    let parts = vec![
        "First part.  \n\n\n\n".to_string(),
        "## Second\n\nBody.".to_string(),
        "Third.".to_string(),
    ];
    assert_eq!(
        merge_chunks(&cfg, parts),
        "First part.\n\n## Second\n\nBody.\nThird.\n"
    );
}

#[test]
fn sanitizes_control_chars() {
    let cfg = Config::default();
    let parts = vec!["Alpha\u{0002}Beta\u{0084}\nLine\tTabbed\r\nNext".to_string()];
    let merged = merge_chunks(&cfg, parts);

    assert!(!merged.contains('\u{0002}'));
    assert!(merged.contains("AlphaBeta"));
    assert!(merged.contains('\n'));
    assert!(merged.contains('\t'));
    assert!(!merged.contains('\r'));
}
