use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

/// Severity tier assigned to a pattern category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// One pattern category as it appears in the signature configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternCategory {
    pub name: String,
    pub severity: Severity,
    pub weight: f64,
    pub patterns: Vec<String>,
}

/// A category with its patterns compiled into case-insensitive regexes.
/// Built once at configuration load; matching never recompiles.
#[derive(Debug, Clone)]
pub struct CompiledCategory {
    pub name: String,
    pub severity: Severity,
    pub weight: f64,
    regexes: Vec<regex::Regex>,
}

impl CompiledCategory {
    /// Compile a configured category. Patterns that fail to compile are
    /// skipped individually with a warning; returns None if nothing in the
    /// category compiled.
    pub fn compile(category: &PatternCategory) -> Option<Self> {
        let mut regexes = Vec::with_capacity(category.patterns.len());
        for pattern in &category.patterns {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => regexes.push(re),
                Err(e) => {
                    log::warn!(
                        "Skipping invalid pattern in category '{}': {} ({})",
                        category.name,
                        pattern,
                        e
                    );
                }
            }
        }

        if regexes.is_empty() {
            log::warn!(
                "Category '{}' has no valid patterns and will be skipped",
                category.name
            );
            return None;
        }

        Some(Self {
            name: category.name.clone(),
            severity: category.severity,
            weight: category.weight,
            regexes,
        })
    }
}

/// Match result for a single category: distinct matched substrings
/// (case-insensitive set semantics, first-seen order) and the hit count.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryMatch {
    pub name: String,
    pub severity: Severity,
    pub weight: f64,
    pub hits: usize,
    pub samples: Vec<String>,
}

/// Run every category against the text. All categories are always
/// evaluated so results are reproducible regardless of match order.
/// Pure function of (text, categories).
pub fn match_categories(text: &str, categories: &[CompiledCategory]) -> Vec<CategoryMatch> {
    categories
        .iter()
        .map(|category| match_category(text, category))
        .collect()
}

/// Run a single category against the text.
pub fn match_category(text: &str, category: &CompiledCategory) -> CategoryMatch {
    let mut samples: Vec<String> = Vec::new();

    for re in &category.regexes {
        for m in re.find_iter(text) {
            let matched = m.as_str().to_lowercase();
            if !samples.contains(&matched) {
                samples.push(matched);
            }
        }
    }

    CategoryMatch {
        name: category.name.clone(),
        severity: category.severity,
        weight: category.weight,
        hits: samples.len(),
        samples,
    }
}

/// Convenience: total hits across a match set.
pub fn total_hits(matches: &[CategoryMatch]) -> usize {
    matches.iter().map(|m| m.hits).sum()
}
