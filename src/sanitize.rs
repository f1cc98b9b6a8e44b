use lazy_regex::regex_replace_all;

const MAX_LEN: usize = 200;
const TRUNCATED_LEN: usize = 196;

/// Map an arbitrary title to a filename component that is valid on every
/// major filesystem. Total function; never fails.
///
/// Characters outside printable ASCII are replaced rather than deleted so
/// truncation still lands near the position the reader expects. The caller
/// appends its own extension afterwards, so truncation applies to the bare
/// title only.
pub fn sanitize_title(title: &str) -> String {
    let cleaned = regex_replace_all!(r#"[<>:"/\\|?*]"#, title, "_");
    let cleaned: String = cleaned
        .chars()
        .map(|c| if (' '..='~').contains(&c) { c } else { '_' })
        .collect();
    let cleaned = regex_replace_all!(r"_{2,}", &cleaned, "_");
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ' ');

    if cleaned.len() > MAX_LEN {
        format!("{}...", &cleaned[..TRUNCATED_LEN])
    } else {
        cleaned.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_characters_become_underscores() {
        assert_eq!(sanitize_title(r#"a<b>c:d"e/f\g|h?i*j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn non_ascii_is_replaced_not_deleted() {
        // one replacement per character keeps the approximate length
        assert_eq!(sanitize_title("héllo wörld"), "h_llo w_rld");
        assert_eq!(sanitize_title("日本語 title"), "_ title");
    }

    #[test]
    fn underscore_runs_collapse() {
        assert_eq!(sanitize_title("a///b???c"), "a_b_c");
        assert_eq!(sanitize_title("a___b"), "a_b");
    }

    #[test]
    fn leading_and_trailing_dots_and_spaces_are_stripped() {
        assert_eq!(sanitize_title("  .. title .. "), "title");
        assert_eq!(sanitize_title("..."), "");
    }

    #[test]
    fn long_titles_are_truncated_with_a_marker() {
        let long = "a".repeat(500);
        let out = sanitize_title(&long);
        assert_eq!(out.len(), TRUNCATED_LEN + 3);
        assert!(out.ends_with("..."));
        assert!(out.starts_with(&"a".repeat(TRUNCATED_LEN)));
    }

    #[test]
    fn output_is_bounded_and_clean() {
        let inputs = [
            "plain title".to_owned(),
            r#"<>:"/\|?*"#.to_owned(),
            "ünïcodé / slash".to_owned(),
            " . mixed .. ".to_owned(),
            "x".repeat(1000),
        ];

        for input in inputs {
            let out = sanitize_title(&input);
            assert!(out.len() <= MAX_LEN + 3, "too long for input {input:?}");
            assert!(
                !out.contains(&['<', '>', ':', '"', '/', '\\', '|', '?', '*'][..]),
                "forbidden character survived in {out:?}"
            );
        }
    }

    #[test]
    fn sanitizing_is_idempotent() {
        let inputs = [
            "plain title",
            r#"a<b>c:d"e"#,
            "héllo wörld",
            " .dotted. ",
            "runs____of____underscores",
            "",
        ];

        for input in inputs {
            let once = sanitize_title(input);
            assert_eq!(sanitize_title(&once), once, "input {input:?}");
        }
    }
}
