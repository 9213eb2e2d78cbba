use crate::matcher::{PatternCategory, Severity};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Model family labels used by the LLM fingerprinter. Family-level only;
/// the engine never claims a specific model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Gpt,
    Claude,
    Generic,
    Phishing,
    Impersonation,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Gpt => "gpt",
            ModelFamily::Claude => "claude",
            ModelFamily::Generic => "generic",
            ModelFamily::Phishing => "phishing",
            ModelFamily::Impersonation => "impersonation",
        }
    }
}

/// An LLM signature category: a pattern category tagged with the model
/// family it is evidence for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmSignature {
    pub name: String,
    pub family: ModelFamily,
    pub severity: Severity,
    pub weight: f64,
    pub patterns: Vec<String>,
}

impl LlmSignature {
    pub fn as_category(&self) -> PatternCategory {
        PatternCategory {
            name: self.name.clone(),
            severity: self.severity,
            weight: self.weight,
            patterns: self.patterns.clone(),
        }
    }
}

/// Keyword lists that drive the fingerprinter's context multiplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextKeywords {
    pub financial: Vec<String>,
    pub credential: Vec<String>,
    pub urgency: Vec<String>,
}

/// Pattern category sets consumed by the text detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureSets {
    /// Linguistic marker classes for the AI-text scorer (politeness,
    /// transitions, formality, hedging, enumeration).
    pub ai_markers: Vec<PatternCategory>,
    /// Persuasion tactic categories.
    pub persuasion: Vec<PatternCategory>,
    /// Urgency indicators.
    pub urgency: Vec<PatternCategory>,
    /// Model-family signatures for the fingerprinter.
    pub llm_signatures: Vec<LlmSignature>,
    /// Prompt-injection / jailbreak categories.
    pub injection: Vec<PatternCategory>,
    /// Context keyword lists for risk multipliers.
    pub context: ContextKeywords,
}

/// Domain reference data for the reputation analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainLists {
    /// Brand names checked for typosquatting and impersonation.
    pub brands: Vec<String>,
    /// Suspicious TLD -> reason string.
    pub suspicious_tlds: HashMap<String, String>,
    /// Keywords that make a subdomain label suspicious.
    pub subdomain_keywords: Vec<String>,
}

/// Numeric thresholds shared across the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Text shorter than this yields the canonical empty AI-text result.
    pub min_text_chars: usize,
    /// Text shorter than this yields an empty fingerprint result.
    pub min_fingerprint_chars: usize,
    /// Visible text is capped to this length before analysis.
    pub max_text_chars: usize,
    /// Minimum per-family score before a model claim is made.
    pub model_claim_floor: f64,
    /// Composite totals at or above these map to the discrete levels.
    pub high_risk_score: f64,
    pub medium_risk_score: f64,
    pub low_risk_score: f64,
    /// Independent signals required before a Medium/High level is raised.
    pub min_signal_count: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_text_chars: 100,
            min_fingerprint_chars: 30,
            max_text_chars: 20_000,
            model_claim_floor: 0.15,
            high_risk_score: 80.0,
            medium_risk_score: 50.0,
            low_risk_score: 30.0,
            min_signal_count: 2,
        }
    }
}

/// Fixed component weights for the composite aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorWeights {
    pub ai: f64,
    pub urgency: f64,
    pub persuasion: f64,
    pub llm: f64,
    pub domain: f64,
    pub jailbreak: f64,
    pub manipulation: f64,
    pub credibility: f64,
}

impl Default for AggregatorWeights {
    fn default() -> Self {
        Self {
            ai: 20.0,
            urgency: 12.0,
            persuasion: 10.0,
            llm: 15.0,
            domain: 25.0,
            jailbreak: 12.0,
            manipulation: 8.0,
            credibility: 12.0,
        }
    }
}

/// The versioned signature configuration document. Swapped wholesale when
/// an update arrives; validated eagerly with hard rejection so a bad
/// document never replaces a working one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureConfig {
    pub version: String,
    pub signatures: SignatureSets,
    pub thresholds: Thresholds,
    #[serde(default)]
    pub weights: AggregatorWeights,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default = "DomainLists::default")]
    pub domains: DomainLists,
}

impl SignatureConfig {
    /// Load a signature document from a YAML or JSON file, validating it.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read signature config: {}", path.display()))?;

        let config: SignatureConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON signature config: {}", path.display()))?,
            _ => serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML signature config: {}", path.display()))?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: SignatureConfig =
            serde_yaml::from_str(content).context("Invalid YAML signature config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: SignatureConfig =
            serde_json::from_str(content).context("Invalid JSON signature config")?;
        config.validate()?;
        Ok(config)
    }

    /// Schema validation beyond what serde enforces. Violations reject the
    /// whole document; the caller keeps its previous configuration.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(anyhow!("Signature config has an empty version"));
        }

        let sets: [(&str, &[PatternCategory]); 4] = [
            ("ai_markers", &self.signatures.ai_markers),
            ("persuasion", &self.signatures.persuasion),
            ("urgency", &self.signatures.urgency),
            ("injection", &self.signatures.injection),
        ];

        for (set_name, categories) in sets {
            if categories.is_empty() {
                return Err(anyhow!("Signature set '{}' is empty", set_name));
            }
            for category in categories {
                Self::validate_weight(set_name, &category.name, category.weight)?;
            }
        }

        if self.signatures.llm_signatures.is_empty() {
            return Err(anyhow!("Signature set 'llm_signatures' is empty"));
        }
        for sig in &self.signatures.llm_signatures {
            Self::validate_weight("llm_signatures", &sig.name, sig.weight)?;
        }

        let t = &self.thresholds;
        if t.max_text_chars <= t.min_text_chars {
            return Err(anyhow!(
                "max_text_chars ({}) must exceed min_text_chars ({})",
                t.max_text_chars,
                t.min_text_chars
            ));
        }
        if !(t.high_risk_score > t.medium_risk_score && t.medium_risk_score > t.low_risk_score) {
            return Err(anyhow!(
                "Risk score thresholds must be ordered high > medium > low"
            ));
        }

        Ok(())
    }

    fn validate_weight(set: &str, name: &str, weight: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(anyhow!(
                "Category '{}' in set '{}' has weight {} outside [0,1]",
                name,
                set,
                weight
            ));
        }
        Ok(())
    }

    /// The embedded default configuration, used when no document is
    /// supplied or a supplied one is rejected.
    pub fn default_config() -> Self {
        Self {
            version: "1.0.0".to_string(),
            signatures: SignatureSets {
                ai_markers: default_ai_markers(),
                persuasion: default_persuasion(),
                urgency: default_urgency(),
                llm_signatures: default_llm_signatures(),
                injection: default_injection(),
                context: default_context_keywords(),
            },
            thresholds: Thresholds::default(),
            weights: AggregatorWeights::default(),
            whitelist: Vec::new(),
            domains: DomainLists::default(),
        }
    }
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

fn category(name: &str, severity: Severity, weight: f64, patterns: &[&str]) -> PatternCategory {
    PatternCategory {
        name: name.to_string(),
        severity,
        weight,
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
    }
}

fn default_ai_markers() -> Vec<PatternCategory> {
    vec![
        category(
            "politeness",
            Severity::Low,
            0.12,
            &[
                r"thank you for",
                r"i appreciate",
                r"please note",
                r"feel free to",
                r"don't hesitate to",
                r"i hope this helps",
            ],
        ),
        category(
            "transitions",
            Severity::Low,
            0.12,
            &[
                r"\bfurthermore\b",
                r"\bmoreover\b",
                r"\badditionally\b",
                r"\bin addition\b",
                r"\bconsequently\b",
                r"\btherefore\b",
                r"\bhowever\b",
                r"\bnevertheless\b",
            ],
        ),
        category(
            "formality",
            Severity::Low,
            0.10,
            &[
                r"\butilize\b",
                r"\bfacilitate\b",
                r"\bdemonstrate\b",
                r"\bcomprehensive\b",
                r"\bsignificant\b",
                r"\bsubsequently\b",
                r"\bimplement\b",
            ],
        ),
        category(
            "hedging",
            Severity::Low,
            0.08,
            &[
                r"it is important to note",
                r"generally speaking",
                r"in most cases",
                r"\btypically\b",
                r"may vary",
                r"it depends on",
                r"it's worth mentioning",
            ],
        ),
        category(
            "enumeration",
            Severity::Low,
            0.08,
            &[
                r"\bfirstly\b",
                r"\bsecondly\b",
                r"\bthirdly\b",
                r"\bfinally\b",
                r"\bin conclusion\b",
                r"\bto summarize\b",
                r"\bin summary\b",
            ],
        ),
    ]
}

fn default_persuasion() -> Vec<PatternCategory> {
    vec![
        category(
            "scarcity",
            Severity::Medium,
            0.15,
            &[
                r"limited time",
                r"only \d+ (left|remaining)",
                r"while supplies last",
                r"exclusive offer",
                r"won't last long",
            ],
        ),
        category(
            "authority",
            Severity::Medium,
            0.15,
            &[
                r"official notice",
                r"security team",
                r"compliance department",
                r"government agency",
                r"law enforcement",
            ],
        ),
        category(
            "social_proof",
            Severity::Low,
            0.15,
            &[
                r"thousands of (customers|users|people)",
                r"join millions",
                r"\d+% of (users|customers|people)",
                r"everyone is (using|switching)",
            ],
        ),
        category(
            "reciprocity",
            Severity::Low,
            0.15,
            &[
                r"free gift",
                r"no obligation",
                r"\bcomplimentary\b",
                r"as a thank you",
                r"on the house",
            ],
        ),
        category(
            "commitment",
            Severity::Low,
            0.15,
            &[
                r"you agreed",
                r"as promised",
                r"your commitment",
                r"complete your (registration|order|profile)",
            ],
        ),
        category(
            "liking",
            Severity::Low,
            0.15,
            &[
                r"valued (customer|member|client)",
                r"specially selected",
                r"just for you",
                r"because we care",
            ],
        ),
        category(
            "fear",
            Severity::High,
            0.15,
            &[
                r"account (suspended|locked|compromised)",
                r"unauthorized (access|activity|transaction)",
                r"security breach",
                r"will be (deleted|closed|terminated)",
                r"legal action",
            ],
        ),
    ]
}

fn default_urgency() -> Vec<PatternCategory> {
    vec![category(
        "urgency",
        Severity::High,
        0.8,
        &[
            r"\burgent(ly)?\b",
            r"\bimmediately\b",
            r"act now",
            r"right away",
            r"expires (today|tonight|soon|in \d+)",
            r"within \d+ (hours|minutes)",
            r"final (notice|warning|reminder)",
            r"last chance",
            r"\basap\b",
            r"time.sensitive",
        ],
    )]
}

fn llm_signature(
    name: &str,
    family: ModelFamily,
    severity: Severity,
    weight: f64,
    patterns: &[&str],
) -> LlmSignature {
    LlmSignature {
        name: name.to_string(),
        family,
        severity,
        weight,
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
    }
}

fn default_llm_signatures() -> Vec<LlmSignature> {
    vec![
        llm_signature(
            "gpt_style",
            ModelFamily::Gpt,
            Severity::Medium,
            0.45,
            &[
                r"as an ai language model",
                r"i (cannot|can't) (assist|help) with",
                r"it's important to note that",
                r"i don't have (access to|personal)",
                r"as of my (last|knowledge) (update|cutoff)",
            ],
        ),
        llm_signature(
            "claude_style",
            ModelFamily::Claude,
            Severity::Medium,
            0.45,
            &[
                r"i'd be happy to",
                r"it's worth noting",
                r"i appreciate your (question|patience)",
                r"certainly!",
                r"great question",
            ],
        ),
        llm_signature(
            "generic_politeness",
            ModelFamily::Generic,
            Severity::Low,
            0.25,
            &[
                r"thank you for your (patience|understanding|time)",
                r"we apologize for (the|any) inconvenience",
                r"please don't hesitate to",
            ],
        ),
        llm_signature(
            "phishing_greeting",
            ModelFamily::Phishing,
            Severity::High,
            0.5,
            &[
                r"dear (valued|esteemed) (customer|client|user|member)",
                r"dear account holder",
                r"attention (customer|user)",
            ],
        ),
        llm_signature(
            "urgency_politeness",
            ModelFamily::Phishing,
            Severity::High,
            0.45,
            &[
                r"kindly (verify|confirm|update|review)",
                r"please verify your (account|identity|information)",
                r"we kindly ask",
                r"respond promptly",
            ],
        ),
        llm_signature(
            "authority_impersonation",
            ModelFamily::Impersonation,
            Severity::Critical,
            0.5,
            &[
                r"security (team|department|center)",
                r"billing department",
                r"account services",
                r"it support (team|desk)",
                r"fraud (prevention|department)",
            ],
        ),
        llm_signature(
            "structured_response",
            ModelFamily::Generic,
            Severity::Low,
            0.3,
            &[
                r"here are the steps",
                r"follow these steps",
                r"step \d+[:.]",
                r"the following (points|options|steps)",
            ],
        ),
        llm_signature(
            "over_explanation",
            ModelFamily::Generic,
            Severity::Low,
            0.25,
            &[
                r"in other words",
                r"to put it simply",
                r"that is to say",
                r"what this means is",
                r"simply put",
            ],
        ),
    ]
}

fn default_injection() -> Vec<PatternCategory> {
    vec![
        category(
            "instruction_override",
            Severity::Critical,
            0.9,
            &[
                r"ignore (all )?(previous|prior|above|earlier) instructions",
                r"disregard (all|your|previous|prior)",
                r"forget (everything|all previous|your instructions)",
                r"new instructions:",
                r"override (your|all) (rules|instructions)",
            ],
        ),
        category(
            "prompt_extraction",
            Severity::Critical,
            0.85,
            &[
                r"(reveal|show|print|repeat|display) your (system )?prompt",
                r"what (are|were) your (instructions|rules)",
                r"repeat the text above",
                r"output your (initialization|configuration)",
                r"reveal your system",
            ],
        ),
        category(
            "role_play",
            Severity::High,
            0.7,
            &[
                r"you are now (a|an|in)",
                r"pretend (to be|you are)",
                r"act as (if|a|an)",
                r"roleplay as",
                r"\bdan mode\b",
                r"developer mode",
                r"\bjailbreak\b",
            ],
        ),
        category(
            "delimiter_injection",
            Severity::High,
            0.75,
            &[
                r"\[/?(INST|SYS)\]",
                r"<\|im_(start|end)\|>",
                r"###\s*(system|instruction|admin)",
                r"<<SYS>>",
            ],
        ),
        category(
            "hypothetical_framing",
            Severity::Medium,
            0.5,
            &[
                r"\bhypothetically\b",
                r"in a fictional (world|scenario|story)",
                r"for educational purposes only",
                r"imagine (that )?you (are|can|have)",
                r"in this story",
            ],
        ),
        category(
            "encoding_obfuscation",
            Severity::High,
            0.7,
            &[
                r"decode (this|the following)",
                r"\bbase64\b",
                r"\brot13\b",
                r"from hex",
                r"(\\x[0-9a-fA-F]{2}){4,}",
            ],
        ),
        category(
            "reverse_psychology",
            Severity::Medium,
            0.45,
            &[
                r"whatever you do,? do(n't| not)",
                r"you (would|could) never",
                r"i know you (can't|won't)",
                r"don't you dare",
            ],
        ),
        category(
            "context_manipulation",
            Severity::High,
            0.65,
            &[
                r"your (new|real|true) (purpose|goal|task)",
                r"the user (wants|said|approved)",
                r"(earlier|previous) conversation",
                r"update your (context|memory|settings)",
            ],
        ),
    ]
}

fn default_context_keywords() -> ContextKeywords {
    ContextKeywords {
        financial: vec![
            "bank".to_string(),
            "payment".to_string(),
            "invoice".to_string(),
            "wire transfer".to_string(),
            "bitcoin".to_string(),
            "credit card".to_string(),
            "account balance".to_string(),
            "refund".to_string(),
        ],
        credential: vec![
            "password".to_string(),
            "login".to_string(),
            "verify your account".to_string(),
            "credentials".to_string(),
            "social security".to_string(),
            "authentication code".to_string(),
            "one-time code".to_string(),
        ],
        urgency: vec![
            "urgent".to_string(),
            "immediately".to_string(),
            "expires".to_string(),
            "act now".to_string(),
            "deadline".to_string(),
        ],
    }
}

impl Default for DomainLists {
    fn default() -> Self {
        let mut suspicious_tlds = HashMap::new();
        for tld in ["tk", "ml", "ga", "cf", "gq"] {
            suspicious_tlds.insert(
                tld.to_string(),
                "free registrar, heavily abused".to_string(),
            );
        }
        for tld in ["xyz", "top", "icu", "pw", "cc", "ws", "info", "club"] {
            suspicious_tlds.insert(
                tld.to_string(),
                "abused registrar with high spam rates".to_string(),
            );
        }
        for tld in [
            "click", "link", "zip", "mov", "country", "stream", "download", "loan", "racing",
            "work", "men", "date", "bid",
        ] {
            suspicious_tlds.insert(tld.to_string(), "spam-associated extension".to_string());
        }

        Self {
            brands: [
                "microsoft",
                "google",
                "apple",
                "amazon",
                "paypal",
                "facebook",
                "instagram",
                "netflix",
                "linkedin",
                "twitter",
                "chase",
                "wellsfargo",
                "bankofamerica",
                "coinbase",
                "binance",
                "dropbox",
                "adobe",
                "ebay",
                "walmart",
                "steam",
            ]
            .iter()
            .map(|b| b.to_string())
            .collect(),
            suspicious_tlds,
            subdomain_keywords: ["secure", "login", "verify", "update", "auth", "account"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = SignatureConfig::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.signatures.llm_signatures.len(), 8);
        assert_eq!(config.signatures.injection.len(), 8);
        assert_eq!(config.signatures.persuasion.len(), 7);
        assert_eq!(config.signatures.ai_markers.len(), 5);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = SignatureConfig::default_config();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = SignatureConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.version, config.version);
        assert_eq!(
            parsed.signatures.injection.len(),
            config.signatures.injection.len()
        );
    }

    #[test]
    fn test_json_round_trip() {
        let config = SignatureConfig::default_config();
        let json = serde_json::to_string(&config).unwrap();
        let parsed = SignatureConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed.thresholds.min_text_chars, 100);
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        let doc = "version: \"2.0\"\n";
        assert!(SignatureConfig::from_yaml_str(doc).is_err());
    }

    #[test]
    fn test_out_of_range_weight_rejected() {
        let mut config = SignatureConfig::default_config();
        config.signatures.urgency[0].weight = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_version_rejected() {
        let mut config = SignatureConfig::default_config();
        config.version = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let mut config = SignatureConfig::default_config();
        config.thresholds.medium_risk_score = 90.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_suspicious_tld_reasons() {
        let lists = DomainLists::default();
        let reason = lists.suspicious_tlds.get("tk").unwrap();
        assert!(reason.contains("free registrar"));
    }
}
