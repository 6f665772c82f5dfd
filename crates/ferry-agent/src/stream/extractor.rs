use super::repair::JsonAutoCloser;

/// Pulls one string field out of a tool call's streaming JSON arguments and
/// yields only the text not yet emitted.
#[derive(Debug, Clone)]
pub struct ArgumentExtractor {
    field: String,
    closer: JsonAutoCloser,
    emitted: usize,
}

impl ArgumentExtractor {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            closer: JsonAutoCloser::new(),
            emitted: 0,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Bytes of the field value emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Feed the next fragment. Returns the newly visible suffix of the field,
    /// if any.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.closer.push(fragment);
        let repaired = self.closer.repaired();
        if repaired.is_empty() {
            return None;
        }

        let value: serde_json::Value = serde_json::from_str(&repaired).ok()?;
        let text = value.get(&self.field)?.as_str()?;
        if text.len() <= self.emitted || !text.is_char_boundary(self.emitted) {
            return None;
        }

        let suffix = text[self.emitted..].to_string();
        self.emitted = text.len();
        Some(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed(extractor: &mut ArgumentExtractor, fragments: &[&str]) -> Vec<String> {
        fragments.iter().filter_map(|f| extractor.push(f)).collect()
    }

    #[test]
    fn test_emits_growing_suffixes() {
        let mut ex = ArgumentExtractor::new("thought");
        let out = feed(
            &mut ex,
            &[r#"{"thou"#, r#"ght": "The sch"#, r#"ema has "#, r#"3 tables""#, r#", "n": 1}"#],
        );
        assert_eq!(out, vec!["The sch", "ema has ", "3 tables"]);
    }

    #[test]
    fn test_ignores_other_fields() {
        let mut ex = ArgumentExtractor::new("thought");
        let out = feed(&mut ex, &[r#"{"thought_number": 1, "#, r#""other": "text"}"#]);
        assert!(out.is_empty());
        assert_eq!(ex.emitted(), 0);
    }

    #[test]
    fn test_escape_split_across_fragments() {
        let mut ex = ArgumentExtractor::new("t");
        let out = feed(&mut ex, &[r#"{"t": "a\"#, r#"nb\u00"#, r#"e9c"}"#]);
        assert_eq!(out.concat(), "a\nb\u{e9}c");
    }

    #[test]
    fn test_garbage_is_skipped() {
        let mut ex = ArgumentExtractor::new("t");
        assert_eq!(ex.push("}}}"), None);
        assert_eq!(ex.push("not json"), None);
    }

    fn document(thought: &str, number: u32, tags: &[String]) -> String {
        serde_json::json!({
            "thought": thought,
            "thought_number": number,
            "next_thought_needed": true,
            "meta": {"tags": tags, "score": 0.25},
        })
        .to_string()
    }

    /// Split `text` at the given char positions.
    fn split(text: &str, cuts: &[usize]) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut points: Vec<usize> = cuts.iter().map(|c| c % (chars.len() + 1)).collect();
        points.push(0);
        points.push(chars.len());
        points.sort_unstable();
        points.dedup();
        points
            .windows(2)
            .map(|w| chars[w[0]..w[1]].iter().collect())
            .collect()
    }

    proptest! {
        #[test]
        fn prop_any_split_reassembles_field(
            thought in "\\PC{0,60}",
            number in 1u32..50,
            tags in proptest::collection::vec("[a-z\"\\\\]{0,6}", 0..3),
            cuts in proptest::collection::vec(0usize..400, 0..40),
        ) {
            let text = document(&thought, number, &tags);
            let mut ex = ArgumentExtractor::new("thought");
            let mut streamed = String::new();
            for fragment in split(&text, &cuts) {
                if let Some(suffix) = ex.push(&fragment) {
                    streamed.push_str(&suffix);
                    prop_assert!(thought.starts_with(&streamed));
                }
            }
            prop_assert_eq!(streamed, thought);
        }

        #[test]
        fn prop_control_and_quote_heavy_text(
            thought in "[\"\\\\\n\t\u{1}a-z\u{e9}\u{1F600}]{0,40}",
            cuts in proptest::collection::vec(0usize..200, 0..30),
        ) {
            let text = document(&thought, 1, &[]);
            let mut ex = ArgumentExtractor::new("thought");
            let streamed: String = split(&text, &cuts)
                .iter()
                .filter_map(|f| ex.push(f))
                .collect();
            prop_assert_eq!(streamed, thought);
        }
    }
}
