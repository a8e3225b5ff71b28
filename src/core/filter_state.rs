use crate::core::log_state::{CategoryCounts, LogCategory, LogRecord, LogStore};
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
enum SearchMatcher {
    Pattern(Regex),
    Lowercase(String),
}

impl SearchMatcher {
    fn new(text: &str) -> Self {
        match RegexBuilder::new(&regex::escape(text))
            .case_insensitive(true)
            .build()
        {
            Ok(re) => SearchMatcher::Pattern(re),
            Err(e) => {
                tracing::warn!(error = %e, "search pattern too large, using plain comparison");
                SearchMatcher::Lowercase(text.to_lowercase())
            }
        }
    }

    fn is_match(&self, content: &str) -> bool {
        match self {
            SearchMatcher::Pattern(re) => re.is_match(content),
            SearchMatcher::Lowercase(needle) => content.to_lowercase().contains(needle.as_str()),
        }
    }

    fn find_all(&self, content: &str) -> Vec<(usize, usize)> {
        match self {
            SearchMatcher::Pattern(re) => re.find_iter(content).map(|m| (m.start(), m.end())).collect(),
            SearchMatcher::Lowercase(_) => Vec::new(),
        }
    }
}

/// Search text plus optional category. Blank search text means "no search".
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    search_text: String,
    category: Option<LogCategory>,
    matcher: Option<SearchMatcher>,
}

impl PartialEq for FilterState {
    fn eq(&self, other: &Self) -> bool {
        self.search_text == other.search_text && self.category == other.category
    }
}

impl FilterState {
    pub fn new(search_text: &str, category: Option<LogCategory>) -> Self {
        let matcher = if search_text.trim().is_empty() {
            None
        } else {
            Some(SearchMatcher::new(search_text))
        };
        Self {
            search_text: if matcher.is_some() {
                search_text.to_string()
            } else {
                String::new()
            },
            category,
            matcher,
        }
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn category(&self) -> Option<LogCategory> {
        self.category
    }

    pub fn is_active(&self) -> bool {
        self.matcher.is_some() || self.category.is_some()
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(category) = self.category {
            if record.category != category {
                return false;
            }
        }
        match &self.matcher {
            Some(m) => m.is_match(&record.content),
            None => true,
        }
    }

    pub fn search_hits(&self, content: &str) -> Vec<(usize, usize)> {
        match &self.matcher {
            Some(m) => m.find_all(content),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FilterAdvance {
    pub matched: Vec<usize>,
    pub delta_counts: CategoryCounts,
    pub new_offset: usize,
}

/// Scan `records[from_offset..]` and collect matching indices, stopping early
/// once the matched content reaches `max_content_chars` characters.
pub fn advance(
    records: &[LogRecord],
    filter: &FilterState,
    from_offset: usize,
    max_content_chars: usize,
) -> FilterAdvance {
    let mut result = FilterAdvance {
        new_offset: from_offset.min(records.len()),
        ..Default::default()
    };
    let mut collected_chars = 0usize;

    for (idx, record) in records.iter().enumerate().skip(result.new_offset) {
        result.new_offset = idx + 1;
        if !filter.matches(record) {
            continue;
        }
        result.matched.push(idx);
        result.delta_counts.increment(record.category);
        collected_chars += record.content.chars().count();
        if collected_chars >= max_content_chars {
            break;
        }
    }

    result
}

#[derive(Debug)]
pub struct FilteredIndex {
    filter: FilterState,
    scanned_up_to: usize,
    indices: Vec<usize>,
    counts: CategoryCounts,
    max_content_chars: usize,
}

impl FilteredIndex {
    pub fn new(max_content_chars: usize) -> Self {
        Self {
            filter: FilterState::default(),
            scanned_up_to: 0,
            indices: Vec::new(),
            counts: CategoryCounts::default(),
            max_content_chars: max_content_chars.max(1),
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// Returns true when the predicate changed and derived data was dropped.
    pub fn set_filter(&mut self, filter: FilterState) -> bool {
        if filter == self.filter {
            return false;
        }
        tracing::debug!(
            search = filter.search_text(),
            category = ?filter.category(),
            "filter changed, rescanning"
        );
        self.filter = filter;
        self.reset();
        true
    }

    pub fn reset(&mut self) {
        self.scanned_up_to = 0;
        self.indices.clear();
        self.counts = CategoryCounts::default();
    }

    pub fn update(&mut self, store: &LogStore) -> bool {
        if self.scanned_up_to > store.len() {
            // Store was cleared behind our back.
            self.reset();
        }
        if self.scanned_up_to == store.len() {
            return false;
        }
        let step = advance(
            store.records(),
            &self.filter,
            self.scanned_up_to,
            self.max_content_chars,
        );
        self.scanned_up_to = step.new_offset;
        self.counts.add(&step.delta_counts);
        let changed = !step.matched.is_empty();
        self.indices.extend(step.matched);
        changed
    }

    #[cfg(test)]
    pub fn catch_up(&mut self, store: &LogStore) {
        while !self.is_caught_up(store) {
            self.update(store);
        }
    }

    pub fn is_caught_up(&self, store: &LogStore) -> bool {
        self.scanned_up_to == store.len()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn counts(&self) -> &CategoryCounts {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[cfg(test)]
    pub fn scanned_up_to(&self) -> usize {
        self.scanned_up_to
    }
}
