use crate::ai_text::{split_sentences, variance};
use crate::config::{ModelFamily, SignatureConfig};
use crate::matcher::{self, CategoryMatch, CompiledCategory, Severity};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

const HEURISTIC_BONUS_CAP: f64 = 0.4;

// Families in claim-priority order; earlier wins ties.
const FAMILY_ORDER: [ModelFamily; 5] = [
    ModelFamily::Gpt,
    ModelFamily::Claude,
    ModelFamily::Impersonation,
    ModelFamily::Phishing,
    ModelFamily::Generic,
];

lazy_static! {
    static ref FORMAL_WORDS_RE: Regex = Regex::new(
        r"(?i)\b(utilize|facilitate|furthermore|moreover|additionally|consequently|subsequently|comprehensive|endeavor)\b"
    )
    .unwrap();
    // Misspellings and missing apostrophes that human-typed text tends to
    // contain; their absence approximates "perfect grammar".
    static ref COMMON_ERRORS_RE: Regex = Regex::new(
        r"\bteh\b|\brecieve\b|\bdefinately\b|\bseperate\b|\balot\b|\b(dont|cant|wont|im|ive)\b|\bi\b"
    )
    .unwrap();
    static ref BULLET_RE: Regex = Regex::new(r"(?m)^\s*[-*•]\s+").unwrap();
    static ref NUMBERED_RE: Regex = Regex::new(r"(?m)^\s*\d+[.)]\s+").unwrap();
    static ref HEADER_LINE_RE: Regex = Regex::new(r"(?m)^[^\n]{3,60}:\s*$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskFactor {
    pub name: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize)]
pub struct FamilyScore {
    pub family: ModelFamily,
    pub score: f64,
}

/// Fingerprinting result: family-level confidence only, never a model
/// version claim.
#[derive(Debug, Clone, Serialize)]
pub struct FingerprintAnalysis {
    pub score: f64,
    pub likely_model: Option<ModelFamily>,
    pub confidence: f64,
    pub family_scores: Vec<FamilyScore>,
    pub category_matches: Vec<CategoryMatch>,
    pub context_multiplier: f64,
    pub risk_factors: Vec<RiskFactor>,
}

impl FingerprintAnalysis {
    pub fn empty() -> Self {
        Self {
            score: 0.0,
            likely_model: None,
            confidence: 0.0,
            family_scores: Vec::new(),
            category_matches: Vec::new(),
            context_multiplier: 1.0,
            risk_factors: Vec::new(),
        }
    }
}

pub struct LlmFingerprinter {
    signatures: Vec<(ModelFamily, CompiledCategory)>,
    financial: Vec<String>,
    credential: Vec<String>,
    urgency: Vec<String>,
    min_chars: usize,
    claim_floor: f64,
}

impl LlmFingerprinter {
    pub fn new(config: &SignatureConfig) -> Self {
        let signatures = config
            .signatures
            .llm_signatures
            .iter()
            .filter_map(|sig| {
                CompiledCategory::compile(&sig.as_category()).map(|c| (sig.family, c))
            })
            .collect();

        let lower = |v: &[String]| v.iter().map(|k| k.to_lowercase()).collect();
        Self {
            signatures,
            financial: lower(&config.signatures.context.financial),
            credential: lower(&config.signatures.context.credential),
            urgency: lower(&config.signatures.context.urgency),
            min_chars: config.thresholds.min_fingerprint_chars,
            claim_floor: config.thresholds.model_claim_floor,
        }
    }

    pub fn analyze(&self, text: &str) -> FingerprintAnalysis {
        if text.chars().count() < self.min_chars {
            return FingerprintAnalysis::empty();
        }

        let mut category_matches = Vec::with_capacity(self.signatures.len());
        let mut family_totals: HashMap<ModelFamily, f64> = HashMap::new();
        let mut total = 0.0;

        for (family, category) in &self.signatures {
            let m = matcher::match_category(text, category);
            let category_score = (m.hits as f64 * 0.1).min(m.weight) * m.weight;
            if category_score > 0.0 {
                total += category_score;
                *family_totals.entry(*family).or_insert(0.0) += category_score;
            }
            category_matches.push(m);
        }

        let lower_text = text.to_lowercase();
        let financial_hit = contains_any(&lower_text, &self.financial);
        let credential_hit = contains_any(&lower_text, &self.credential);
        let urgency_hit = contains_any(&lower_text, &self.urgency);

        // Only the single largest applicable multiplier; no stacking.
        let context_multiplier = if financial_hit {
            1.5
        } else if credential_hit {
            1.4
        } else if urgency_hit {
            1.3
        } else {
            1.0
        };

        let bonus = self.heuristic_bonus(text, urgency_hit);
        let score = (total * context_multiplier + bonus).clamp(0.0, 1.0);

        let (likely_model, confidence) = self.claim(&family_totals);
        let risk_factors = risk_factors(
            &family_totals,
            total,
            financial_hit,
            credential_hit,
            urgency_hit,
            context_multiplier,
        );

        let mut family_scores: Vec<FamilyScore> = FAMILY_ORDER
            .iter()
            .filter_map(|f| {
                family_totals.get(f).map(|s| FamilyScore {
                    family: *f,
                    score: *s,
                })
            })
            .collect();
        family_scores.sort_by(|a, b| b.score.total_cmp(&a.score));

        FingerprintAnalysis {
            score,
            likely_model,
            confidence,
            family_scores,
            category_matches,
            context_multiplier,
            risk_factors,
        }
    }

    /// Model claim policy: the top family is named only when its score
    /// clears the floor; otherwise no claim is made at all.
    fn claim(&self, family_totals: &HashMap<ModelFamily, f64>) -> (Option<ModelFamily>, f64) {
        let mut top: Option<(ModelFamily, f64)> = None;
        for family in FAMILY_ORDER {
            if let Some(score) = family_totals.get(&family) {
                if top.map(|(_, s)| *score > s).unwrap_or(true) {
                    top = Some((family, *score));
                }
            }
        }

        match top {
            Some((family, score)) if score > self.claim_floor => {
                (Some(family), (score * 2.0).min(1.0))
            }
            _ => (None, 0.0),
        }
    }

    fn heuristic_bonus(&self, text: &str, urgency_hit: bool) -> f64 {
        let mut bonus: f64 = 0.0;

        if FORMAL_WORDS_RE.find_iter(text).count() >= 5 {
            bonus += 0.1;
        }

        if urgency_hit && !COMMON_ERRORS_RE.is_match(text) {
            bonus += 0.15;
        }

        let sentences = split_sentences(text);
        if sentences.len() >= 3 {
            let lengths: Vec<f64> = sentences
                .iter()
                .map(|s| s.split_whitespace().count() as f64)
                .collect();
            if variance(&lengths) < 15.0 {
                bonus += 0.1;
            }
        }

        let devices = [
            BULLET_RE.is_match(text),
            NUMBERED_RE.is_match(text),
            HEADER_LINE_RE.is_match(text),
            text.split("\n\n").filter(|p| !p.trim().is_empty()).count() >= 3,
        ]
        .iter()
        .filter(|d| **d)
        .count();
        if devices >= 2 {
            bonus += 0.08;
        }

        if has_repeated_opener(&sentences) {
            bonus += 0.1;
        }

        bonus.min(HEURISTIC_BONUS_CAP)
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

/// Same three-word sentence opener appearing in two or more sentences.
fn has_repeated_opener(sentences: &[&str]) -> bool {
    let mut openers: HashMap<String, usize> = HashMap::new();
    for sentence in sentences {
        let words: Vec<String> = sentence
            .split_whitespace()
            .take(3)
            .map(|w| w.to_lowercase())
            .collect();
        if words.len() == 3 {
            let count = openers.entry(words.join(" ")).or_insert(0);
            *count += 1;
            if *count >= 2 {
                return true;
            }
        }
    }
    false
}

fn risk_factors(
    family_totals: &HashMap<ModelFamily, f64>,
    raw_total: f64,
    financial_hit: bool,
    credential_hit: bool,
    urgency_hit: bool,
    context_multiplier: f64,
) -> Vec<RiskFactor> {
    let family_present =
        |f: ModelFamily| family_totals.get(&f).copied().unwrap_or(0.0) > 0.0;
    let mut factors = Vec::new();

    if family_present(ModelFamily::Impersonation) {
        factors.push(RiskFactor {
            name: "authority_impersonation".to_string(),
            severity: Severity::Critical,
        });
    }
    if family_present(ModelFamily::Phishing) {
        factors.push(RiskFactor {
            name: "phishing_language".to_string(),
            severity: Severity::High,
        });
    }
    if credential_hit {
        factors.push(RiskFactor {
            name: "credential_context".to_string(),
            severity: Severity::Critical,
        });
    }
    if financial_hit {
        factors.push(RiskFactor {
            name: "financial_context".to_string(),
            severity: Severity::High,
        });
    }
    if urgency_hit && raw_total > 0.3 {
        factors.push(RiskFactor {
            name: "urgency_ai_combo".to_string(),
            severity: Severity::High,
        });
    }
    if context_multiplier > 1.0 && factors.is_empty() {
        factors.push(RiskFactor {
            name: "high_risk_context".to_string(),
            severity: Severity::Medium,
        });
    }

    factors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprinter() -> LlmFingerprinter {
        LlmFingerprinter::new(&SignatureConfig::default_config())
    }

    #[test]
    fn test_short_text_empty() {
        let result = fingerprinter().analyze("tiny");
        assert_eq!(result.score, 0.0);
        assert!(result.likely_model.is_none());
        assert_eq!(result.context_multiplier, 1.0);
    }

    #[test]
    fn test_gpt_family_claim() {
        let text = "As an AI language model, I cannot assist with that request. \
            It's important to note that policies differ. I don't have access to private data. \
            As of my last update, that information was current.";
        let result = fingerprinter().analyze(text);
        assert_eq!(result.likely_model, Some(ModelFamily::Gpt));
        assert!(result.confidence > 0.0);
        assert!(result.confidence <= 1.0);
    }

    #[test]
    fn test_no_claim_below_floor() {
        // A single generic phrase: some category score, but below the floor.
        let text = "Thank you for your patience while we sorted this out last week.";
        let result = fingerprinter().analyze(text);
        assert!(result.likely_model.is_none());
        assert_eq!(result.confidence, 0.0);
        assert!(result.score >= 0.0);
    }

    #[test]
    fn test_context_multiplier_no_stacking() {
        // Financial and urgency context together: only 1.5 applies.
        let text = "Your bank payment invoice is overdue. Urgent: wire transfer required \
            immediately to settle the account balance before the deadline expires.";
        let result = fingerprinter().analyze(text);
        assert_eq!(result.context_multiplier, 1.5);
    }

    #[test]
    fn test_impersonation_risk_factor_critical() {
        let text = "This is the security team from the billing department. Kindly verify \
            your account password immediately or account services will suspend access.";
        let result = fingerprinter().analyze(text);
        let critical_count = result
            .risk_factors
            .iter()
            .filter(|f| f.severity == Severity::Critical)
            .count();
        assert!(critical_count >= 2); // impersonation + credential context
    }

    #[test]
    fn test_score_clamped_and_idempotent() {
        let fp = fingerprinter();
        let text = "As an AI language model, I'd be happy to help. It's worth noting that \
            your bank account password expires urgently. Here are the steps. Step 1: verify. \
            Kindly confirm immediately. Dear valued customer, the security team requires it.";
        let a = fp.analyze(text);
        let b = fp.analyze(text);
        assert!((0.0..=1.0).contains(&a.score));
        assert_eq!(a.score, b.score);
        assert_eq!(a.likely_model, b.likely_model);
        assert_eq!(a.risk_factors, b.risk_factors);
    }

    #[test]
    fn test_repeated_opener_detection() {
        let sentences = vec![
            "We have reviewed your account today",
            "We have reviewed the options available",
            "Something entirely different here",
        ];
        assert!(has_repeated_opener(&sentences));

        let varied = vec!["One thing here", "Another thing there"];
        assert!(!has_repeated_opener(&varied));
    }
}
