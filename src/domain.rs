use crate::config::{DomainLists, SignatureConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Bounded size for the local-signal result cache. The cache is an
/// optimization only; analysis is correct without it.
const CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TyposquatTechnique {
    Insertion,
    Omission,
    Transposition,
    Substitution,
    CharacterSubstitution,
    Combosquatting,
}

#[derive(Debug, Clone, Serialize)]
pub struct TyposquatVerdict {
    pub is_typosquat: bool,
    pub likely_target: Option<String>,
    pub technique: Option<TyposquatTechnique>,
    pub distance: Option<usize>,
    pub confidence: f64,
}

impl TyposquatVerdict {
    fn clean() -> Self {
        Self {
            is_typosquat: false,
            likely_target: None,
            technique: None,
            distance: None,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TldVerdict {
    pub tld: String,
    pub suspicious: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubdomainFinding {
    pub label: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HomoglyphVerdict {
    Clean,
    NonAscii,
    Punycode,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrandHit {
    pub brand: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntropyRating {
    Low,
    Medium,
    High,
}

/// Remote reputation signals supplied by an external lookup collaborator.
/// Absence of the bundle, or of either feed, only omits that contribution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSignals {
    pub feed_a: Option<FeedAReport>,
    pub feed_b: Option<FeedBReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedAReport {
    pub malicious_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedBReport {
    pub match_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainProfile {
    pub domain: String,
    pub whitelisted: bool,
    pub typosquat: TyposquatVerdict,
    pub tld: TldVerdict,
    pub subdomain_findings: Vec<SubdomainFinding>,
    pub homoglyph: HomoglyphVerdict,
    pub brand_hits: Vec<BrandHit>,
    pub brand_confidence: f64,
    pub entropy: f64,
    pub entropy_rating: EntropyRating,
    /// Advisory composite; surfaced in recommendations but deliberately
    /// not part of the risk score formula.
    pub suspicious_pattern_score: f64,
    pub risk_score: u32,
}

impl DomainProfile {
    fn whitelisted(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            whitelisted: true,
            typosquat: TyposquatVerdict::clean(),
            tld: TldVerdict {
                tld: String::new(),
                suspicious: false,
                reason: None,
            },
            subdomain_findings: Vec::new(),
            homoglyph: HomoglyphVerdict::Clean,
            brand_hits: Vec::new(),
            brand_confidence: 0.0,
            entropy: 0.0,
            entropy_rating: EntropyRating::Low,
            suspicious_pattern_score: 0.0,
            risk_score: 0,
        }
    }
}

/// Heuristic domain reputation analyzer. Stateless per call apart from a
/// bounded cache of local (remote-independent) profiles.
pub struct DomainAnalyzer {
    lists: DomainLists,
    whitelist: Vec<String>,
    cache: Mutex<HashMap<String, DomainProfile>>,
}

impl DomainAnalyzer {
    pub fn new(config: &SignatureConfig) -> Self {
        let mut lists = config.domains.clone();
        lists.brands = lists.brands.iter().map(|b| b.to_lowercase()).collect();
        lists.subdomain_keywords = lists
            .subdomain_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();

        Self {
            lists,
            whitelist: config.whitelist.iter().map(|d| d.to_lowercase()).collect(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn analyze(&self, domain: &str, remote: Option<&RemoteSignals>) -> DomainProfile {
        let normalized = canonicalize(domain);

        if self.is_whitelisted(&normalized) {
            log::debug!("Domain {} is whitelisted", normalized);
            return DomainProfile::whitelisted(&normalized);
        }

        let mut profile = self
            .cached_local_profile(&normalized)
            .unwrap_or_else(|| self.compute_local_profile(&normalized));

        profile.risk_score = (profile.risk_score + remote_contribution(remote)).min(100);
        profile
    }

    fn is_whitelisted(&self, domain: &str) -> bool {
        self.whitelist.iter().any(|entry| {
            domain == entry || domain.ends_with(&format!(".{}", entry))
        })
    }

    fn cached_local_profile(&self, domain: &str) -> Option<DomainProfile> {
        let cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.get(domain).cloned()
    }

    fn compute_local_profile(&self, domain: &str) -> DomainProfile {
        let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
        let tld_label = if labels.len() >= 2 {
            labels[labels.len() - 1]
        } else {
            ""
        };
        let base = if labels.len() >= 2 {
            labels[labels.len() - 2]
        } else {
            labels.first().copied().unwrap_or("")
        };
        let subdomains = if labels.len() > 2 {
            &labels[..labels.len() - 2]
        } else {
            &labels[..0]
        };

        let typosquat = self.detect_typosquat(base);
        let tld = self.tld_verdict(tld_label);
        let subdomain_findings = self.analyze_subdomains(subdomains);
        let homoglyph = homoglyph_verdict(domain);
        let brand_hits = self.brand_impersonation(base);
        let brand_confidence = brand_hits
            .iter()
            .map(|h| h.confidence)
            .fold(0.0f64, f64::max);
        let entropy = shannon_entropy(base);
        let entropy_rating = if entropy > 4.5 {
            EntropyRating::High
        } else if entropy >= 3.5 {
            EntropyRating::Medium
        } else {
            EntropyRating::Low
        };
        let suspicious_pattern_score = suspicious_patterns(base);

        // Local contributions to the 0-100 risk score. Independent of the
        // remote feeds; contributions are summed, never multiplied.
        let mut risk = 0u32;
        if typosquat.is_typosquat && typosquat.confidence > 0.6 {
            risk += 35;
        }
        if entropy > 4.0 {
            risk += 15;
        }
        if homoglyph == HomoglyphVerdict::Punycode {
            risk += 25;
        }

        let profile = DomainProfile {
            domain: domain.to_string(),
            whitelisted: false,
            typosquat,
            tld,
            subdomain_findings,
            homoglyph,
            brand_hits,
            brand_confidence,
            entropy,
            entropy_rating,
            suspicious_pattern_score,
            risk_score: risk.min(100),
        };

        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if cache.len() >= CACHE_CAPACITY {
            log::debug!("Domain profile cache full, clearing");
            cache.clear();
        }
        cache.insert(domain.to_string(), profile.clone());

        profile
    }

    /// Best typosquat match across the brand list. Character-substitution
    /// and combosquat matches are taken as soon as found; edit-distance
    /// matches keep the lowest distance seen.
    fn detect_typosquat(&self, base: &str) -> TyposquatVerdict {
        if base.len() < 4 {
            return TyposquatVerdict::clean();
        }

        let mut best: Option<TyposquatVerdict> = None;

        for brand in &self.lists.brands {
            if base == brand.as_str() {
                // The brand's own domain.
                return TyposquatVerdict::clean();
            }

            let deleeted = deleet(base);
            if deleeted != base && deleeted == *brand {
                return TyposquatVerdict {
                    is_typosquat: true,
                    likely_target: Some(brand.clone()),
                    technique: Some(TyposquatTechnique::CharacterSubstitution),
                    distance: None,
                    confidence: 0.9,
                };
            }

            if base.len() > brand.len() && base.contains(brand.as_str()) {
                return TyposquatVerdict {
                    is_typosquat: true,
                    likely_target: Some(brand.clone()),
                    technique: Some(TyposquatTechnique::Combosquatting),
                    distance: None,
                    confidence: 0.85,
                };
            }

            let distance = levenshtein(base, brand);
            if distance > 0 && distance <= 2 {
                let max_len = base.len().max(brand.len());
                let confidence = 1.0 - distance as f64 / max_len as f64;
                let technique = if base.len() > brand.len() {
                    TyposquatTechnique::Insertion
                } else if base.len() < brand.len() {
                    TyposquatTechnique::Omission
                } else if is_transposition(base, brand) {
                    TyposquatTechnique::Transposition
                } else {
                    TyposquatTechnique::Substitution
                };

                let better = best
                    .as_ref()
                    .map(|b| distance < b.distance.unwrap_or(usize::MAX))
                    .unwrap_or(true);
                if better {
                    best = Some(TyposquatVerdict {
                        is_typosquat: true,
                        likely_target: Some(brand.clone()),
                        technique: Some(technique),
                        distance: Some(distance),
                        confidence,
                    });
                }
            }
        }

        best.unwrap_or_else(TyposquatVerdict::clean)
    }

    fn tld_verdict(&self, tld: &str) -> TldVerdict {
        match self.lists.suspicious_tlds.get(tld) {
            Some(reason) => TldVerdict {
                tld: tld.to_string(),
                suspicious: true,
                reason: Some(format!(".{}: {}", tld, reason)),
            },
            None => TldVerdict {
                tld: tld.to_string(),
                suspicious: false,
                reason: None,
            },
        }
    }

    /// All subdomain findings are recorded, not just the first.
    fn analyze_subdomains(&self, subdomains: &[&str]) -> Vec<SubdomainFinding> {
        let mut findings = Vec::new();

        if subdomains.len() > 3 {
            findings.push(SubdomainFinding {
                label: subdomains.join("."),
                reason: format!("excessive subdomain depth ({})", subdomains.len()),
            });
        }

        for label in subdomains {
            let label_lower = label.to_lowercase();
            for brand in &self.lists.brands {
                if label_lower.contains(brand.as_str()) {
                    findings.push(SubdomainFinding {
                        label: label_lower.clone(),
                        reason: format!("brand name '{}' in subdomain", brand),
                    });
                }
            }
            for keyword in &self.lists.subdomain_keywords {
                if label_lower.contains(keyword.as_str()) {
                    findings.push(SubdomainFinding {
                        label: label_lower.clone(),
                        reason: format!("suspicious keyword '{}' in subdomain", keyword),
                    });
                }
            }
        }

        findings
    }

    /// Brand substring hits on the base label. Hyphen-adjacent use of the
    /// brand name scores higher than a bare substring.
    fn brand_impersonation(&self, base: &str) -> Vec<BrandHit> {
        let mut hits = Vec::new();
        for brand in &self.lists.brands {
            if base != brand.as_str() && base.contains(brand.as_str()) {
                let hyphen_adjacent = base.split('-').any(|part| part == brand.as_str());
                hits.push(BrandHit {
                    brand: brand.clone(),
                    confidence: if hyphen_adjacent { 0.9 } else { 0.8 },
                });
            }
        }
        hits
    }
}

fn canonicalize(domain: &str) -> String {
    let lower = domain.trim().trim_end_matches('.').to_lowercase();
    match lower.strip_prefix("www.") {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

fn remote_contribution(remote: Option<&RemoteSignals>) -> u32 {
    let Some(signals) = remote else {
        return 0;
    };
    let mut score = 0;
    if let Some(feed_a) = &signals.feed_a {
        if feed_a.malicious_count > 0 {
            score += 30;
        }
    }
    if let Some(feed_b) = &signals.feed_b {
        if feed_b.match_count > 0 {
            score += 30;
        }
    }
    score
}

fn homoglyph_verdict(domain: &str) -> HomoglyphVerdict {
    if domain.split('.').any(|label| label.starts_with("xn--")) {
        HomoglyphVerdict::Punycode
    } else if !domain.is_ascii() {
        HomoglyphVerdict::NonAscii
    } else {
        HomoglyphVerdict::Clean
    }
}

/// Undo common digit/symbol-for-letter swaps.
fn deleet(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            '0' => 'o',
            '1' => 'l',
            '3' => 'e',
            '4' => 'a',
            '5' => 's',
            '7' => 't',
            '8' => 'b',
            '@' => 'a',
            '$' => 's',
            other => other,
        })
        .collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            current[j + 1] = (prev[j + 1] + 1).min(current[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}

/// Exactly one pair of adjacent characters swapped.
fn is_transposition(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len() != b.len() {
        return false;
    }
    let mismatches: Vec<usize> = (0..a.len()).filter(|&i| a[i] != b[i]).collect();
    mismatches.len() == 2
        && mismatches[1] == mismatches[0] + 1
        && a[mismatches[0]] == b[mismatches[1]]
        && a[mismatches[1]] == b[mismatches[0]]
}

fn shannon_entropy(label: &str) -> f64 {
    if label.is_empty() {
        return 0.0;
    }
    let mut frequencies: HashMap<char, usize> = HashMap::new();
    for c in label.chars() {
        *frequencies.entry(c).or_insert(0) += 1;
    }
    let len = label.chars().count() as f64;
    frequencies
        .values()
        .map(|&n| {
            let p = n as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Advisory 0-1 composite of structural oddities in the base label.
fn suspicious_patterns(base: &str) -> f64 {
    let mut score: f64 = 0.0;

    if base.matches('-').count() > 2 {
        score += 0.25;
    }
    if !base.is_empty() && base.chars().all(|c| c.is_ascii_digit()) {
        score += 0.25;
    }

    let alphabetic: Vec<char> = base.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    if !alphabetic.is_empty() {
        let vowels = alphabetic
            .iter()
            .filter(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
            .count();
        let ratio = vowels as f64 / alphabetic.len() as f64;
        if !(0.2..=0.6).contains(&ratio) {
            score += 0.25;
        }
    }

    if base.len() < 6 && base.chars().any(|c| c.is_ascii_digit()) {
        score += 0.25;
    }

    score.min(1.0)
}
