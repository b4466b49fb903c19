use serde::{Deserialize, Serialize};

/// A single note record. `id` is the unique key.
///
/// Missing JSON fields decode to empty strings, which is what lets a
/// partial body such as `{"author":"b"}` act as a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Note {
    pub id: String,
    pub author: String,
    pub title: String,
    pub text: String,
}

impl Note {
    /// Convenience constructor used heavily in tests and the CLI.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            title: title.into(),
            text: text.into(),
        }
    }

    /// Copies every non-empty field of `patch` into `self`, leaving `id` alone.
    ///
    /// An empty field means "unspecified". There is no way to clear a field
    /// through a patch; callers that need that must use a full replace.
    pub fn apply_patch(&mut self, patch: &Note) {
        if !patch.author.is_empty() {
            self.author.clone_from(&patch.author);
        }
        if !patch.title.is_empty() {
            self.title.clone_from(&patch.title);
        }
        if !patch.text.is_empty() {
            self.text.clone_from(&patch.text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn partial_json_decodes_with_empty_defaults() {
        let note: Note = serde_json::from_str(r#"{"author":"b"}"#).unwrap();
        assert_eq!(note, Note::new("", "b", "", ""));
    }

    #[test]
    fn serializes_with_lowercase_field_names() {
        let json = serde_json::to_value(Note::new("1", "a", "t", "x")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": "1", "author": "a", "title": "t", "text": "x"})
        );
    }

    #[test]
    fn apply_patch_never_touches_id() {
        let mut note = Note::new("1", "a", "t", "x");
        note.apply_patch(&Note::new("2", "", "", ""));
        assert_eq!(note.id, "1");
    }

    proptest! {
        #[test]
        fn apply_patch_only_changes_non_empty_fields(
            author in "[a-z]{0,4}",
            title in "[a-z]{0,4}",
            text in "[a-z]{0,4}",
        ) {
            let original = Note::new("1", "author", "title", "text");
            let patch = Note::new("", author.clone(), title.clone(), text.clone());
            let mut merged = original.clone();
            merged.apply_patch(&patch);

            let pick = |p: &str, o: &str| if p.is_empty() { o.to_string() } else { p.to_string() };
            prop_assert_eq!(merged.author, pick(&author, &original.author));
            prop_assert_eq!(merged.title, pick(&title, &original.title));
            prop_assert_eq!(merged.text, pick(&text, &original.text));
        }
    }
}
