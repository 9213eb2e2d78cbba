pub mod aggregator;
pub mod ai_text;
pub mod analyzer;
pub mod config;
pub mod domain;
pub mod fingerprint;
pub mod jailbreak;
pub mod matcher;
pub mod remote;

pub use aggregator::{CompositeAssessment, IndependentSignal, RiskLevel};
pub use analyzer::{PageAnalyzer, PageAssessment, PageSnapshot, TextSample};
pub use config::{ModelFamily, SignatureConfig};
pub use domain::{DomainProfile, RemoteSignals};
pub use jailbreak::{Fragment, FragmentSource, ThreatSignal};
pub use matcher::Severity;
pub use remote::{FeedEndpoints, ThreatFeedClient};
