use ocr_mend::{
    config::Config,
    structure::{CleanPage, MarkerKind, ParatextKind, StructureTagger},
};

const BODY: [(&str, &str); 5] = [
    ("The lighthouse keeper rose before dawn.", "He trimmed the wick and wiped the glass."),
    ("Fog rolled in from the eastern reef.", "Ships sounded their horns through the grey."),
    ("By midday the bell had rung forty times.", "Nobody came ashore until the tide fell."),
    ("A letter arrived with the supply boat.", "It bore a seal that nobody recognised."),
    ("She read it twice beside the stove.", "Then she folded it into her apron pocket."),
];

fn page(index: u32, lines: &[&str]) -> CleanPage {
    CleanPage::new(index, lines.iter().map(|l| l.to_string()).collect())
}

fn book() -> Vec<CleanPage> {
    BODY.iter()
        .enumerate()
        .map(|(i, (a, b))| {
            let n = i as u32 + 1;
            let footer = format!("The Silent Harbor — {}", n + 40);
            let number = (n + 40).to_string();
            page(n, &["THE SILENT HARBOR", a, b, &footer, &number])
        })
        .collect()
}

#[test]
fn running_heads_footers_and_numbers_are_removed() {
    let tagger = StructureTagger::new(&Config::default()).unwrap();
    let tagged = tagger.tag(book());

    for (p, (a, b)) in tagged.pages.iter().zip(BODY) {
        assert_eq!(p.lines, vec![a.to_string(), b.to_string()]);
    }
    assert_eq!(tagged.removed.len(), 15);
    let count = |kind| tagged.removed.iter().filter(|r| r.kind == kind).count();
    assert_eq!(count(ParatextKind::Header), 5);
    assert_eq!(count(ParatextKind::Footer), 5);
    assert_eq!(count(ParatextKind::PageNumber), 5);
}

#[test]
fn supplied_candidates_are_removed() {
    let tagger = StructureTagger::new(&Config::default()).unwrap();
    let mut p = page(1, &["Harbor Tales", "One body line stays.", "Another body line stays."]);
    p.paratext_hints = vec!["harbor tales".into()];
    let tagged = tagger.tag(vec![p]);
    assert_eq!(tagged.pages[0].lines, vec!["One body line stays.", "Another body line stays."]);
    assert_eq!(tagged.removed[0].kind, ParatextKind::Supplied);
}

#[test]
fn chapter_and_section_headings_become_markers() {
    let tagger = StructureTagger::new(&Config::default()).unwrap();
    let p = page(
        7,
        &[
            "Chapter 3",
            "",
            "The storm broke at midnight over the bay.",
            "Waves climbed the sea wall again and again.",
            "",
            "3.2 The Morning After",
            "",
            "Wreckage lay scattered along the shingle.",
        ],
    );
    let tagged = tagger.tag(vec![p]);
    let headings: Vec<_> = tagged
        .markers
        .iter()
        .filter(|m| m.kind.is_heading())
        .map(|m| (m.page, m.line, m.kind, m.text.as_str()))
        .collect();
    assert_eq!(
        headings,
        vec![
            (7, 0, MarkerKind::Chapter, "Chapter 3"),
            (7, 5, MarkerKind::Section, "3.2 The Morning After"),
        ]
    );
}

#[test]
fn blank_line_starts_a_paragraph() {
    let tagger = StructureTagger::new(&Config::default()).unwrap();
    let p = page(
        1,
        &[
            "The first paragraph runs across a line.",
            "It finishes on this second line here.",
            "",
            "A new paragraph opens after the gap.",
        ],
    );
    let tagged = tagger.tag(vec![p]);
    let breaks: Vec<_> = tagged
        .markers
        .iter()
        .filter(|m| m.kind == MarkerKind::ParagraphBreak)
        .collect();
    assert_eq!(breaks.len(), 1);
    assert_eq!(breaks[0].line, 3);
    assert_eq!(breaks[0].text, "A new paragraph opens after the gap.");
}

#[test]
fn ambiguous_short_lines_pass_through() {
    let tagger = StructureTagger::new(&Config::default()).unwrap();
    let lines = [
        "He looked at the sky and said:",
        "Well",
        "3.5 million people lived along that coast,",
        "and most of them had never seen the sea.",
    ];
    let tagged = tagger.tag(vec![page(4, &lines)]);
    assert_eq!(tagged.pages[0].lines, lines);
    assert!(tagged.markers.iter().all(|m| !m.kind.is_heading()));
    assert!(tagged.removed.is_empty());
}

#[test]
fn body_lines_opening_with_heading_words_stay_body() {
    let tagger = StructureTagger::new(&Config::default()).unwrap();
    let lines = [
        "She pulled the volume from the shelf.",
        "Book two was far better than the first one",
        "and she read it twice before dawn.",
        "",
        "Part one of the plan was simple enough.",
        "Chapter 5 of the ledger listed every ship.",
        "Prologue and epilogue were both missing",
        "from the copy she had bought in town.",
    ];
    let tagged = tagger.tag(vec![page(2, &lines)]);
    assert_eq!(tagged.pages[0].lines, lines);
    assert!(tagged.markers.iter().all(|m| !m.kind.is_heading()));
}

#[test]
fn standalone_chapter_line_needs_a_blank_neighbour() {
    let tagger = StructureTagger::new(&Config::default()).unwrap();
    let tagged = tagger.tag(vec![page(
        3,
        &[
            "The ferry was late again that evening.",
            "Part Two",
            "was painted on the bow in faded letters.",
            "",
            "Part Two: The Crossing",
            "",
            "Nobody spoke until the lights of the island appeared.",
        ],
    )]);
    let headings: Vec<_> = tagged
        .markers
        .iter()
        .filter(|m| m.kind.is_heading())
        .map(|m| (m.line, m.text.as_str()))
        .collect();
    assert_eq!(headings, vec![(4, "Part Two: The Crossing")]);
}

#[test]
fn roman_chapter_opener_at_page_top_is_kept() {
    let tagger = StructureTagger::new(&Config::default()).unwrap();
    let p = page(
        9,
        &[
            "IV",
            "",
            "The storm broke at midnight over the bay.",
            "Waves climbed the sea wall again and again.",
            "xii",
        ],
    );
    let tagged = tagger.tag(vec![p]);

    assert_eq!(tagged.pages[0].lines[0], "IV");
    assert_eq!(tagged.removed.len(), 1);
    assert_eq!(tagged.removed[0].kind, ParatextKind::PageNumber);
    assert_eq!(tagged.removed[0].text, "xii");
    let chapter = tagged.markers.iter().find(|m| m.kind.is_heading()).unwrap();
    assert_eq!((chapter.page, chapter.line, chapter.kind), (9, 0, MarkerKind::Chapter));
    assert_eq!(chapter.text, "IV");
}

#[test]
fn numbered_chapter_openers_are_not_running_heads() {
    let tagger = StructureTagger::new(&Config::default()).unwrap();
    let pages: Vec<_> = BODY[..4]
        .iter()
        .enumerate()
        .map(|(i, (a, b))| {
            let heading = format!("Chapter {}", i + 1);
            page(i as u32 + 1, &[&heading, "", a, b])
        })
        .collect();
    let tagged = tagger.tag(pages);

    assert!(tagged.removed.is_empty());
    let chapters: Vec<_> = tagged
        .markers
        .iter()
        .filter(|m| m.kind == MarkerKind::Chapter)
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(chapters, vec!["Chapter 1", "Chapter 2", "Chapter 3", "Chapter 4"]);
}

#[test]
fn repeated_heading_text_is_still_a_running_head() {
    let tagger = StructureTagger::new(&Config::default()).unwrap();
    let pages: Vec<_> = BODY[..4]
        .iter()
        .enumerate()
        .map(|(i, (a, b))| page(i as u32 + 1, &["Chapter One", "", a, b]))
        .collect();
    let tagged = tagger.tag(pages);

    assert_eq!(tagged.removed.len(), 4);
    assert!(tagged.removed.iter().all(|r| r.kind == ParatextKind::Header));
    for (p, (a, b)) in tagged.pages.iter().zip(BODY) {
        assert_eq!(p.lines, vec![a.to_string(), b.to_string()]);
    }
}
