//! Multi-language candidate titles
//!
//! [`TitleStore`] keeps one ordered candidate sequence per language plus a single selection
//! set of positions shared by every language. Position `i` means "the `i`-th title in every
//! language", so all sequences are kept the same length; languages without a value at some
//! position hold an empty placeholder there.

use crate::client::{TitleGenerator, Translator};
use crate::error::{Error, Result};
use crate::types::TitlesByLanguage;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Language requested when the caller names none
pub const DEFAULT_LANGUAGE: &str = "en";

/// Candidate titles across languages and the cross-language selection
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TitleStore {
    /// Active languages, in the order they were requested
    languages: Vec<String>,
    titles: TitlesByLanguage,
    selection: BTreeSet<usize>,
}

impl TitleStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the generation collaborator for candidates and replace the store with them
    ///
    /// `title` must be non-blank; a blank table of contents is sent as absent. On failure
    /// the store is left empty.
    pub async fn populate(
        &mut self,
        title: &str,
        table_of_contents: Option<&str>,
        languages: &[String],
        generator: &dyn TitleGenerator,
    ) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("a book title is required".to_string()));
        }
        let table_of_contents = table_of_contents.map(str::trim).filter(|toc| !toc.is_empty());
        let languages = if languages.is_empty() {
            vec![DEFAULT_LANGUAGE.to_string()]
        } else {
            languages.to_vec()
        };

        match generator
            .generate_titles(title, table_of_contents, &languages)
            .await
        {
            Ok(titles) => {
                self.generate(&languages, titles);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Title generation failed");
                self.clear();
                Err(e)
            }
        }
    }

    /// Replace every sequence and clear the selection
    ///
    /// Languages missing from `titles_by_language` get an empty sequence and languages
    /// outside `languages` are dropped. Lengths are not checked here; the next insertion
    /// pads them back into alignment.
    pub fn generate(&mut self, languages: &[String], mut titles_by_language: TitlesByLanguage) {
        let mut active = Vec::with_capacity(languages.len());
        for language in languages {
            if !active.contains(language) {
                active.push(language.clone());
            }
            titles_by_language.entry(language.clone()).or_default();
        }
        titles_by_language.retain(|language, titles| {
            let keep = active.contains(language);
            if !keep {
                debug!(language, dropped = titles.len(), "Ignoring titles for inactive language");
            }
            keep
        });

        self.languages = active;
        self.titles = titles_by_language;
        self.selection.clear();
        debug!(
            languages = ?self.languages,
            max_length = self.max_length(),
            "Candidate titles replaced"
        );
    }

    /// Select position `index` if unselected, unselect it otherwise
    ///
    /// Returns whether `index` is selected afterwards. Positions outside
    /// `[0, max_length())` are ignored and reported as unselected.
    pub fn toggle_selection(&mut self, index: usize) -> bool {
        if index >= self.max_length() {
            debug!(index, max_length = self.max_length(), "Ignoring out-of-range selection");
            return false;
        }
        if self.selection.remove(&index) {
            false
        } else {
            self.selection.insert(index);
            true
        }
    }

    /// Append a user-written title to every language and select it
    ///
    /// The text is translated once into every active language other than
    /// `source_language`. Languages the translator leaves out get a placeholder. All
    /// sequences are padded to the current longest length before the append, so the new
    /// title lands at the same position everywhere; that position is returned.
    ///
    /// # Errors
    /// [`Error::InvalidInput`] for blank text and [`Error::Translation`] when the
    /// translator fails. The store is unchanged in both cases.
    pub async fn add_custom_title(
        &mut self,
        source_text: &str,
        source_language: &str,
        active_languages: &[String],
        translator: &dyn Translator,
    ) -> Result<usize> {
        let source_text = source_text.trim();
        if source_text.is_empty() {
            return Err(Error::InvalidInput("custom title is empty".to_string()));
        }

        let mut targets: Vec<String> = Vec::new();
        for language in active_languages {
            if language != source_language && !targets.contains(language) {
                targets.push(language.clone());
            }
        }

        let mut entries: BTreeMap<String, String> = if targets.is_empty() {
            BTreeMap::new()
        } else {
            translator
                .translate(source_text, source_language, &targets)
                .await
                .map_err(|e| {
                    warn!(error = %e, source_language, "Custom title translation failed");
                    Error::Translation(match e {
                        Error::Api(api) => api.friendly_message(),
                        other => other.to_string(),
                    })
                })?
        };
        entries.retain(|language, _| targets.contains(language));
        entries.insert(source_language.to_string(), source_text.to_string());

        Ok(self.append_aligned(active_languages, entries))
    }

    /// Pad every sequence to a common length, append one entry per language and select it
    fn append_aligned(&mut self, active_languages: &[String], mut entries: BTreeMap<String, String>) -> usize {
        for language in active_languages.iter().chain(entries.keys()) {
            if !self.languages.contains(language) {
                self.languages.push(language.clone());
            }
        }

        let current_max = self.max_length();
        let languages: Vec<String> = self
            .titles
            .keys()
            .cloned()
            .chain(self.languages.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        for language in languages {
            let sequence = self.titles.entry(language.clone()).or_default();
            sequence.resize(current_max, String::new());
            sequence.push(entries.remove(&language).unwrap_or_default());
        }

        self.selection.insert(current_max);
        debug!(index = current_max, "Custom title appended");
        current_max
    }

    /// Length of the longest sequence, 0 when empty
    pub fn max_length(&self) -> usize {
        self.titles.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Select every position
    pub fn select_all(&mut self) {
        self.selection = (0..self.max_length()).collect();
    }

    /// Drop all titles, languages and the selection
    pub fn clear(&mut self) {
        self.languages.clear();
        self.titles.clear();
        self.selection.clear();
    }

    /// Whether the store holds no titles
    pub fn is_empty(&self) -> bool {
        self.max_length() == 0
    }

    /// Selected positions, ascending
    pub fn selected(&self) -> Vec<usize> {
        self.selection.iter().copied().collect()
    }

    /// Whether `index` is selected
    pub fn is_selected(&self, index: usize) -> bool {
        self.selection.contains(&index)
    }

    /// Number of selected positions
    pub fn selection_count(&self) -> usize {
        self.selection.len()
    }

    /// Active languages, in request order
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Whole sequence for `language`, placeholders included
    pub fn titles_for(&self, language: &str) -> Option<&[String]> {
        self.titles.get(language).map(Vec::as_slice)
    }

    /// Title at `index` in `language`; `None` for placeholders and missing positions
    pub fn title_at(&self, language: &str, index: usize) -> Option<&str> {
        self.titles
            .get(language)
            .and_then(|titles| titles.get(index))
            .map(String::as_str)
            .filter(|title| !title.is_empty())
    }

    /// Selected titles per language, ready to submit
    ///
    /// Each active language lists its non-empty titles at the selected positions, in
    /// position order. Placeholders are skipped, so sequences may differ in length.
    pub fn submission_payload(&self) -> TitlesByLanguage {
        self.languages
            .iter()
            .map(|language| {
                let titles = self.titles.get(language).map(Vec::as_slice).unwrap_or_default();
                let selected = self
                    .selection
                    .iter()
                    .filter_map(|&index| titles.get(index))
                    .filter(|title| !title.is_empty())
                    .cloned()
                    .collect();
                (language.clone(), selected)
            })
            .collect()
    }

    /// Verify that every sequence has the same length
    ///
    /// # Errors
    /// [`Error::AlignmentViolation`] naming the first language whose length differs
    /// from the longest sequence.
    pub fn check_alignment(&self) -> Result<()> {
        let expected = self.max_length();
        match self.titles.iter().find(|(_, titles)| titles.len() != expected) {
            Some((language, titles)) => Err(Error::AlignmentViolation {
                language: language.clone(),
                actual: titles.len(),
                expected,
            }),
            None => Ok(()),
        }
    }
}
