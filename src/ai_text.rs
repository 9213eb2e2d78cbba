use crate::config::SignatureConfig;
use crate::matcher::{self, CategoryMatch, CompiledCategory, Severity};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

// Fixed composite weights for the four sub-scores.
const LINGUISTIC_WEIGHT: f64 = 0.35;
const STATISTICAL_WEIGHT: f64 = 0.30;
const SEMANTIC_WEIGHT: f64 = 0.20;
const STRUCTURAL_WEIGHT: f64 = 0.15;

lazy_static! {
    static ref PASSIVE_RE: Regex =
        Regex::new(r"(?i)\b(?:is|are|was|were|be|been|being)\s+\w+ed\b").unwrap();
    static ref BULLET_RE: Regex = Regex::new(r"(?m)^\s*[-*•]\s+").unwrap();
    static ref NUMBERED_RE: Regex = Regex::new(r"(?m)^\s*\d+[.)]\s+").unwrap();
    static ref GENERIC_GREETING_RE: Regex =
        Regex::new(r"(?i)dear (customer|user|member|friend|sir|madam|valued)").unwrap();
    static ref CLICKBAIT_RE: Regex =
        Regex::new(r"(?i)(you won't believe|shocking|click here|this one trick|doctors hate)")
            .unwrap();
    static ref EXCESS_PUNCT_RE: Regex = Regex::new(r"[!?]{3,}").unwrap();
    static ref EXCLAMATION_RUN_RE: Regex = Regex::new(r"!{2,}").unwrap();
    static ref REASSURANCE_RE: Regex =
        Regex::new(r"(?i)(don't worry|rest assured|no need to panic|you are (safe|protected))")
            .unwrap();
}

const WEAK_VERBS: [&str; 14] = [
    "is", "are", "was", "were", "be", "been", "being", "has", "have", "had", "do", "does", "did",
    "seems",
];

const SENTENCE_INITIAL_FILLERS: [&str; 5] = ["it is ", "it's ", "there is ", "there are ", "there's "];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManipulationTechnique {
    pub name: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubScores {
    pub linguistic: f64,
    pub statistical: f64,
    pub semantic: f64,
    pub structural: f64,
}

/// Result of one AI-text analysis pass. Created fresh per call and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct AiTextAnalysis {
    pub ai_probability: f64,
    pub confidence: f64,
    pub sub_scores: SubScores,
    pub marker_matches: Vec<CategoryMatch>,
    pub persuasion_score: f64,
    pub persuasion_tactics: Vec<String>,
    pub urgency_score: f64,
    pub manipulation_techniques: Vec<ManipulationTechnique>,
    pub credibility_score: f64,
}

impl AiTextAnalysis {
    /// Canonical "no signal" result for inputs below the minimum length.
    pub fn empty() -> Self {
        Self {
            ai_probability: 0.0,
            confidence: 0.0,
            sub_scores: SubScores {
                linguistic: 0.0,
                statistical: 0.0,
                semantic: 0.0,
                structural: 0.0,
            },
            marker_matches: Vec::new(),
            persuasion_score: 0.0,
            persuasion_tactics: Vec::new(),
            urgency_score: 0.0,
            manipulation_techniques: Vec::new(),
            credibility_score: 1.0,
        }
    }
}

pub struct AiTextScorer {
    markers: Vec<CompiledCategory>,
    persuasion: Vec<CompiledCategory>,
    urgency: Vec<CompiledCategory>,
    min_chars: usize,
}

impl AiTextScorer {
    pub fn new(config: &SignatureConfig) -> Self {
        Self {
            markers: compile_set(&config.signatures.ai_markers),
            persuasion: compile_set(&config.signatures.persuasion),
            urgency: compile_set(&config.signatures.urgency),
            min_chars: config.thresholds.min_text_chars,
        }
    }

    pub fn analyze(&self, text: &str) -> AiTextAnalysis {
        if text.chars().count() < self.min_chars {
            log::debug!(
                "Text below {} chars, returning empty AI-text result",
                self.min_chars
            );
            return AiTextAnalysis::empty();
        }

        let marker_matches = matcher::match_categories(text, &self.markers);
        let linguistic = linguistic_score(&marker_matches);
        let statistical = statistical_score(text);
        let semantic = semantic_score(text);
        let structural = structural_score(text);

        let ai_probability = (LINGUISTIC_WEIGHT * linguistic
            + STATISTICAL_WEIGHT * statistical
            + SEMANTIC_WEIGHT * semantic
            + STRUCTURAL_WEIGHT * structural)
            .clamp(0.0, 1.0);

        let subs = [linguistic, statistical, semantic, structural];
        let confidence = (1.0 - variance(&subs)).max(0.0);

        let persuasion_matches = matcher::match_categories(text, &self.persuasion);
        let persuasion_tactics: Vec<String> = persuasion_matches
            .iter()
            .filter(|m| m.hits > 0)
            .map(|m| m.name.clone())
            .collect();
        let persuasion_score = (persuasion_tactics.len() as f64 * 0.15).min(1.0);

        let urgency_matches = matcher::match_categories(text, &self.urgency);
        let urgency_score = urgency(text, &urgency_matches);

        let manipulation_techniques =
            manipulation_techniques(text, &persuasion_matches, urgency_score);
        let credibility_score = credibility(text);

        AiTextAnalysis {
            ai_probability,
            confidence,
            sub_scores: SubScores {
                linguistic,
                statistical,
                semantic,
                structural,
            },
            marker_matches,
            persuasion_score,
            persuasion_tactics,
            urgency_score,
            manipulation_techniques,
            credibility_score,
        }
    }
}

fn compile_set(categories: &[crate::matcher::PatternCategory]) -> Vec<CompiledCategory> {
    categories.iter().filter_map(CompiledCategory::compile).collect()
}

/// Hit density per marker class: hits/10, capped at the class weight.
fn linguistic_score(matches: &[CategoryMatch]) -> f64 {
    matches
        .iter()
        .map(|m| (m.hits as f64 / 10.0).min(m.weight))
        .sum()
}

fn statistical_score(text: &str) -> f64 {
    let sentences = split_sentences(text);
    if sentences.len() < 3 {
        return 0.0;
    }

    let lengths: Vec<f64> = sentences
        .iter()
        .map(|s| s.split_whitespace().count() as f64)
        .collect();
    let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
    let var = variance(&lengths);

    let mut score = 0.0;
    if var < 20.0 {
        score += 0.2;
    }
    if (15.0..=25.0).contains(&mean) {
        score += 0.15;
    }
    if mean > 0.0 && (var.sqrt() / mean) < 0.4 {
        score += 0.15;
    }

    let ttr = type_token_ratio(text);
    if (0.4..=0.6).contains(&ttr) {
        score += 0.1;
    }

    score
}

fn semantic_score(text: &str) -> f64 {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;

    let weak_count = words.iter().filter(|w| WEAK_VERBS.contains(&w.as_str())).count();
    if weak_count as f64 / words.len() as f64 > 0.15 {
        score += 0.1;
    }

    let sentences = split_sentences(text);
    if !sentences.is_empty() {
        let filler_starts = sentences
            .iter()
            .filter(|s| {
                let lower = s.trim_start().to_lowercase();
                SENTENCE_INITIAL_FILLERS.iter().any(|f| lower.starts_with(f))
            })
            .count();
        if filler_starts as f64 / sentences.len() as f64 > 0.05 {
            score += 0.1;
        }
    }

    if PASSIVE_RE.find_iter(text).count() > 2 {
        score += 0.1;
    }

    score
}

fn structural_score(text: &str) -> f64 {
    let mut score = 0.0;

    if BULLET_RE.is_match(text) {
        score += 0.1;
    }
    if NUMBERED_RE.is_match(text) {
        score += 0.1;
    }

    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if !paragraphs.is_empty() {
        let sentence_counts: Vec<f64> = paragraphs
            .iter()
            .map(|p| split_sentences(p).len() as f64)
            .collect();
        let mean = sentence_counts.iter().sum::<f64>() / sentence_counts.len() as f64;
        if (3.0..=6.0).contains(&mean) {
            score += 0.1;
        }
    }

    score
}

fn urgency(text: &str, matches: &[CategoryMatch]) -> f64 {
    let hits = matcher::total_hits(matches);
    let mut score = (hits as f64 * 0.25).min(0.7);

    if EXCLAMATION_RUN_RE.is_match(text) {
        score += 0.15;
    }
    if text.matches('!').count() >= 3 {
        score += 0.1;
    }
    let caps_words = text
        .split_whitespace()
        .filter(|w| w.len() > 3 && w.chars().all(|c| !c.is_lowercase()) && w.chars().any(|c| c.is_uppercase()))
        .count();
    if caps_words >= 3 {
        score += 0.05;
    }

    score.min(1.0)
}

/// Each technique requires a conjunction of two pattern classes; a single
/// keyword class never qualifies on its own.
fn manipulation_techniques(
    text: &str,
    persuasion: &[CategoryMatch],
    urgency_score: f64,
) -> Vec<ManipulationTechnique> {
    let hits = |name: &str| {
        persuasion
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.hits)
            .unwrap_or(0)
    };
    let urgent = urgency_score > 0.0;
    let mut techniques = Vec::new();

    if hits("fear") > 0 && urgent {
        techniques.push(ManipulationTechnique {
            name: "fear_with_urgency".to_string(),
            severity: Severity::High,
        });
    }
    if hits("authority") > 0 && urgent {
        techniques.push(ManipulationTechnique {
            name: "authority_pressure".to_string(),
            severity: Severity::High,
        });
    }
    if hits("fear") > 0 && REASSURANCE_RE.is_match(text) {
        techniques.push(ManipulationTechnique {
            name: "fear_then_reassurance".to_string(),
            severity: Severity::High,
        });
    }
    if hits("scarcity") > 0 && urgent {
        techniques.push(ManipulationTechnique {
            name: "scarcity_pressure".to_string(),
            severity: Severity::Medium,
        });
    }
    if hits("social_proof") > 0 && hits("scarcity") > 0 {
        techniques.push(ManipulationTechnique {
            name: "social_proof_with_scarcity".to_string(),
            severity: Severity::Medium,
        });
    }

    techniques
}

fn credibility(text: &str) -> f64 {
    let mut score: f64 = 1.0;

    if GENERIC_GREETING_RE.is_match(text) {
        score -= 0.2;
    }
    if CLICKBAIT_RE.is_match(text) {
        score -= 0.2;
    }
    if EXCESS_PUNCT_RE.is_match(text) {
        score -= 0.15;
    }

    let has_http = text.contains("http://");
    let has_https = text.contains("https://");
    if has_http {
        score -= 0.1;
    } else if has_https {
        score += 0.05;
    }

    score.clamp(0.0, 1.0)
}

/// Sentences: text split on `.!?`, trimmed, kept when longer than 5 chars.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(|s| s.trim())
        .filter(|s| s.len() > 5)
        .collect()
}

pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

fn type_token_ratio(text: &str) -> f64 {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let distinct: std::collections::HashSet<&String> = words.iter().collect();
    distinct.len() as f64 / words.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> AiTextScorer {
        AiTextScorer::new(&SignatureConfig::default_config())
    }

    const AI_LIKE: &str = "It is important to note that this approach has benefits. \
        Furthermore, the system can facilitate better outcomes for everyone involved today. \
        Additionally, the process is designed to demonstrate comprehensive coverage throughout. \
        Moreover, there is significant evidence that this works well in most common cases. \
        Therefore, we should consider the following points before we proceed any further.";

    #[test]
    fn test_short_text_empty_contract() {
        let result = scorer().analyze("too short");
        assert_eq!(result.ai_probability, 0.0);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.credibility_score, 1.0);
        assert!(result.manipulation_techniques.is_empty());
    }

    #[test]
    fn test_scores_clamped() {
        let result = scorer().analyze(AI_LIKE);
        assert!((0.0..=1.0).contains(&result.ai_probability));
        assert!((0.0..=1.0).contains(&result.confidence));
        assert!((0.0..=1.0).contains(&result.persuasion_score));
        assert!((0.0..=1.0).contains(&result.urgency_score));
        assert!((0.0..=1.0).contains(&result.credibility_score));
    }

    #[test]
    fn test_idempotent() {
        let s = scorer();
        let a = s.analyze(AI_LIKE);
        let b = s.analyze(AI_LIKE);
        assert_eq!(a.ai_probability, b.ai_probability);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.urgency_score, b.urgency_score);
        assert_eq!(a.credibility_score, b.credibility_score);
    }

    #[test]
    fn test_ai_markers_raise_probability() {
        let s = scorer();
        let marked = s.analyze(AI_LIKE);
        let plain = s.analyze(
            "The cat sat outside all day. Rain fell hard on the old tin roof above us. \
             Nobody came by until well after dark, when the dog finally barked twice.",
        );
        assert!(marked.ai_probability > plain.ai_probability);
        assert!(marked.sub_scores.linguistic > 0.0);
    }

    #[test]
    fn test_statistical_requires_three_sentences() {
        // Long enough to clear the minimum length, but only two sentences.
        let text = format!(
            "{} one single sentence that just keeps going on and on for quite a while. {}",
            "word ".repeat(15),
            "and here is the second sentence of the pair"
        );
        let result = scorer().analyze(&text);
        assert_eq!(result.sub_scores.statistical, 0.0);
    }

    #[test]
    fn test_urgency_detection() {
        let text = "URGENT!!! You must act now. This offer expires today so respond \
            immediately or lose access. Final warning for your account, act now!!! Hurry!";
        let result = scorer().analyze(text);
        assert!(result.urgency_score > 0.3);
    }

    #[test]
    fn test_manipulation_requires_conjunction() {
        let s = scorer();

        // Fear alone, no urgency: no technique.
        let fear_only = "We detected a security breach in your account recently. The team has \
            reviewed your case and found unauthorized access in the logs from last week.";
        let result = s.analyze(fear_only);
        assert!(!result
            .manipulation_techniques
            .iter()
            .any(|t| t.name == "fear_with_urgency"));

        // Fear plus urgency: technique fires.
        let fear_urgent = "We detected a security breach in your account. You must act now and \
            respond immediately, or your account will be deleted within 24 hours. Urgent!";
        let result = s.analyze(fear_urgent);
        assert!(result
            .manipulation_techniques
            .iter()
            .any(|t| t.name == "fear_with_urgency"));
    }

    #[test]
    fn test_credibility_penalties() {
        let sketchy = "Dear valued customer!!! You won't believe this exclusive offer. \
            Click here right away before someone else takes your spot in the program!!!";
        let result = scorer().analyze(sketchy);
        assert!(result.credibility_score < 0.7);
    }

    #[test]
    fn test_confidence_reflects_agreement() {
        // All four sub-scores zero: perfect agreement, confidence 1.
        let subs = [0.0, 0.0, 0.0, 0.0];
        assert_eq!(1.0 - variance(&subs), 1.0);

        // Divergent sub-scores lower confidence.
        let divergent = [0.0, 0.6, 0.0, 0.3];
        assert!(variance(&divergent) > 0.0);
    }

    #[test]
    fn test_split_sentences_filters_short() {
        let sentences = split_sentences("Yes. No! This sentence is long enough to count?");
        assert_eq!(sentences.len(), 1);
    }
}
