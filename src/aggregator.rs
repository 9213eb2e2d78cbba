use crate::ai_text::AiTextAnalysis;
use crate::config::{AggregatorWeights, SignatureConfig, Thresholds};
use crate::domain::DomainProfile;
use crate::fingerprint::FingerprintAnalysis;
use crate::jailbreak::JailbreakAnalysis;
use crate::matcher::Severity;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// The six independent boolean risk conditions. Counted separately from
/// the numeric total; a Medium/High level additionally requires at least
/// two of these to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndependentSignal {
    ConfidentAiText,
    HighUrgency,
    DomainRisk,
    InjectionHits,
    LlmFingerprint,
    CredentialRisk,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub ai: f64,
    pub urgency: f64,
    pub persuasion: f64,
    pub llm: f64,
    pub domain: f64,
    pub jailbreak: f64,
    pub manipulation: f64,
    pub credibility_penalty: f64,
}

/// One composite assessment per analysis cycle; consumed by the caller
/// and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct CompositeAssessment {
    pub total_score: f64,
    pub breakdown: ScoreBreakdown,
    pub signals: Vec<IndependentSignal>,
    pub signal_count: usize,
    pub risk_level: RiskLevel,
}

pub struct CompositeAggregator {
    weights: AggregatorWeights,
    thresholds: Thresholds,
}

impl CompositeAggregator {
    pub fn new(config: &SignatureConfig) -> Self {
        Self {
            weights: config.weights.clone(),
            thresholds: config.thresholds.clone(),
        }
    }

    pub fn aggregate(
        &self,
        ai: &AiTextAnalysis,
        fingerprint: &FingerprintAnalysis,
        jailbreak: &JailbreakAnalysis,
        domain: &DomainProfile,
    ) -> CompositeAssessment {
        let w = &self.weights;

        // The confidence exponent intentionally suppresses low-agreement
        // AI detections; a 0.9 probability at 0.3 confidence contributes
        // under 3 points.
        let ai_term = ai.ai_probability * ai.confidence.powf(1.5) * w.ai;

        let urgency_term = if ai.urgency_score > 0.3 {
            ai.urgency_score * w.urgency
        } else {
            0.0
        };

        let persuasion_term = if ai.persuasion_score > 0.2 {
            ai.persuasion_score * w.persuasion
        } else {
            0.0
        };

        let llm_term = if fingerprint.score > 0.25 {
            let factor_boost = 1.0 + (fingerprint.risk_factors.len() as f64 * 0.15).min(0.5);
            fingerprint.score * w.llm * factor_boost
        } else {
            0.0
        };

        let domain_term = domain.risk_score as f64 / 100.0 * w.domain;

        let jailbreak_term = if jailbreak.total_hits > 0 {
            let base = (jailbreak.total_hits as f64 * 2.5).min(w.jailbreak);
            let multiplier = if jailbreak.critical_hits > 0 { 1.8 } else { 1.0 };
            base * multiplier
        } else {
            0.0
        };

        let manipulation_term =
            (ai.manipulation_techniques.len() as f64 * 2.0).min(w.manipulation);

        let credibility_penalty = if ai.credibility_score < 0.7 {
            (1.0 - ai.credibility_score) * w.credibility
        } else {
            0.0
        };

        let total_score = (ai_term
            + urgency_term
            + persuasion_term
            + llm_term
            + domain_term
            + jailbreak_term
            + manipulation_term
            + credibility_penalty)
            .clamp(0.0, 100.0);

        let signals = self.independent_signals(ai, fingerprint, jailbreak, domain);
        let signal_count = signals.len();
        let risk_level =
            self.derive_level(total_score, signal_count, ai, fingerprint, jailbreak, domain);

        CompositeAssessment {
            total_score,
            breakdown: ScoreBreakdown {
                ai: ai_term,
                urgency: urgency_term,
                persuasion: persuasion_term,
                llm: llm_term,
                domain: domain_term,
                jailbreak: jailbreak_term,
                manipulation: manipulation_term,
                credibility_penalty,
            },
            signals,
            signal_count,
            risk_level,
        }
    }

    fn independent_signals(
        &self,
        ai: &AiTextAnalysis,
        fingerprint: &FingerprintAnalysis,
        jailbreak: &JailbreakAnalysis,
        domain: &DomainProfile,
    ) -> Vec<IndependentSignal> {
        let mut signals = Vec::new();

        if ai.ai_probability > 0.7 && ai.confidence > 0.6 {
            signals.push(IndependentSignal::ConfidentAiText);
        }
        if ai.urgency_score > 0.6 {
            signals.push(IndependentSignal::HighUrgency);
        }
        if domain.risk_score > 60 {
            signals.push(IndependentSignal::DomainRisk);
        }
        if jailbreak.total_hits >= 2 {
            signals.push(IndependentSignal::InjectionHits);
        }
        if fingerprint.score > 0.6 && !fingerprint.risk_factors.is_empty() {
            signals.push(IndependentSignal::LlmFingerprint);
        }
        if domain.risk_score > 70 {
            signals.push(IndependentSignal::CredentialRisk);
        }

        signals
    }

    /// Pure function of the current inputs. The critical-condition list
    /// bypasses the two-signal gate: a single strong signal is allowed to
    /// force High on its own, while the numeric-total path is not.
    fn derive_level(
        &self,
        total: f64,
        signal_count: usize,
        ai: &AiTextAnalysis,
        fingerprint: &FingerprintAnalysis,
        jailbreak: &JailbreakAnalysis,
        domain: &DomainProfile,
    ) -> RiskLevel {
        let critical_llm_factors = fingerprint
            .risk_factors
            .iter()
            .filter(|f| f.severity == Severity::Critical)
            .count();
        let high_sev_techniques = ai
            .manipulation_techniques
            .iter()
            .filter(|t| t.severity >= Severity::High)
            .count();

        let critical_condition = domain.risk_score >= 85
            || domain.typosquat.confidence > 0.9
            || jailbreak.total_hits >= 5
            || (ai.urgency_score > 0.85 && fingerprint.score > 0.75)
            || critical_llm_factors >= 2
            || (high_sev_techniques >= 2 && ai.urgency_score > 0.7);

        let t = &self.thresholds;
        if critical_condition {
            RiskLevel::High
        } else if total >= t.high_risk_score && signal_count >= t.min_signal_count {
            RiskLevel::High
        } else if total >= t.medium_risk_score && signal_count >= t.min_signal_count {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}
