use ocr_mend::dedup::collapse_repeats;

fn lines(s: &[&str]) -> Vec<String> {
    s.iter().map(|l| l.to_string()).collect()
}

#[test]
fn three_or_more_repeats_collapse_to_one() {
    let input = lines(&["intro", "ERROR", "ERROR", "ERROR", "ERROR", "outro"]);
    let (out, stats) = collapse_repeats(&input, 3);
    assert_eq!(out, lines(&["intro", "ERROR", "outro"]));
    assert_eq!(stats.runs_collapsed, 1);
    assert_eq!(stats.lines_removed, 3);
}

#[test]
fn exactly_two_repeats_are_kept() {
    let input = lines(&["\"No.\"", "\"No.\"", "She left."]);
    let (out, stats) = collapse_repeats(&input, 3);
    assert_eq!(out, input);
    assert_eq!(stats.lines_removed, 0);
}

#[test]
fn near_identical_lines_count_as_repeats() {
    let input = lines(&["The end.", "The  end", "The end,", "Next"]);
    let (out, _) = collapse_repeats(&input, 3);
    assert_eq!(out, lines(&["The end.", "Next"]));
}

#[test]
fn case_differences_break_a_run() {
    let input = lines(&["Stop", "STOP", "stop"]);
    let (out, _) = collapse_repeats(&input, 3);
    assert_eq!(out, input);
}

#[test]
fn blank_lines_are_never_collapsed() {
    let input = lines(&["a", "", "", "", "b"]);
    let (out, stats) = collapse_repeats(&input, 3);
    assert_eq!(out, input);
    assert_eq!(stats.runs_collapsed, 0);
}

#[test]
fn threshold_is_configurable() {
    let input = lines(&["x", "x", "y"]);
    assert_eq!(collapse_repeats(&input, 2).0, lines(&["x", "y"]));
    assert_eq!(collapse_repeats(&input, 4).0, input);
}
