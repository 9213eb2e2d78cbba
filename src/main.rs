use clap::{Arg, Command};
use log::LevelFilter;
use page_sentry::analyzer::{PageAnalyzer, PageAssessment, PageSnapshot};
use page_sentry::config::SignatureConfig;
use page_sentry::jailbreak::Fragment;
use page_sentry::remote::{FeedEndpoints, ThreatFeedClient};
use std::io::Read;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("page-sentry")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Web content risk analysis engine")
        .long_about(
            "Scores a page's visible text and hosting domain for AI-generated \
             content, LLM fingerprints, prompt-injection payloads, and domain \
             reputation, then combines them into a single risk level.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Signature configuration file (YAML or JSON)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write the embedded default signature configuration and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the signature configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("url")
                .short('u')
                .long("url")
                .value_name("URL")
                .help("Page URL or bare hostname to analyze"),
        )
        .arg(
            Arg::new("text-file")
                .short('t')
                .long("text-file")
                .value_name("FILE")
                .help("File with the page's visible text (defaults to stdin)"),
        )
        .arg(
            Arg::new("fragments-file")
                .long("fragments-file")
                .value_name("FILE")
                .help("JSON file with script/handler fragments to scan"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Emit the full assessment as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-remote")
                .long("no-remote")
                .help("Skip remote threat-feed lookups")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("mock-remote")
                .long("mock-remote")
                .help("Use deterministic mock feed data instead of the network")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        generate_default_config(path);
        return;
    }

    let config = load_config(matches.get_one::<String>("config"));

    if matches.get_flag("test-config") {
        println!("Signature configuration version: {}", config.version);
        println!(
            "  ai marker classes: {}",
            config.signatures.ai_markers.len()
        );
        println!(
            "  persuasion tactics: {}",
            config.signatures.persuasion.len()
        );
        println!(
            "  llm signatures: {}",
            config.signatures.llm_signatures.len()
        );
        println!(
            "  injection categories: {}",
            config.signatures.injection.len()
        );
        println!("  whitelisted domains: {}", config.whitelist.len());
        match PageAnalyzer::with_config(config) {
            Ok(_) => println!("All patterns compiled; configuration is valid."),
            Err(e) => {
                println!("Configuration validation failed: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let hostname = match matches.get_one::<String>("url") {
        Some(raw) => match extract_hostname(raw) {
            Some(hostname) => hostname,
            None => {
                eprintln!("Could not extract a hostname from '{raw}'");
                process::exit(1);
            }
        },
        None => {
            eprintln!("--url is required for analysis (use --help for usage)");
            process::exit(1);
        }
    };

    let text = match matches.get_one::<String>("text-file") {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Failed to read text file {path}: {e}");
                process::exit(1);
            }
        },
        None => {
            let mut buffer = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buffer) {
                eprintln!("Failed to read text from stdin: {e}");
                process::exit(1);
            }
            buffer
        }
    };

    let fragments = match matches.get_one::<String>("fragments-file") {
        Some(path) => load_fragments(path),
        None => Vec::new(),
    };

    let remote_signals = if matches.get_flag("no-remote") {
        None
    } else {
        let client = ThreatFeedClient::new(
            FeedEndpoints {
                feed_a: "https://feeds.page-sentry.dev/url-reputation".to_string(),
                feed_b: "https://feeds.page-sentry.dev/malware-hosts".to_string(),
            },
            10,
            matches.get_flag("mock-remote"),
        );
        client.lookup(&hostname).await
    };

    let analyzer = match PageAnalyzer::with_config(config) {
        Ok(analyzer) => analyzer,
        Err(e) => {
            eprintln!("Failed to build analyzer: {e}");
            process::exit(1);
        }
    };

    let assessment = analyzer.analyze(&PageSnapshot {
        text,
        hostname: hostname.clone(),
        fragments,
        remote_signals,
    });

    if matches.get_flag("json") {
        match serde_json::to_string_pretty(&assessment) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize assessment: {e}");
                process::exit(1);
            }
        }
    } else {
        print_report(&hostname, &assessment);
    }
}

fn load_config(path: Option<&String>) -> SignatureConfig {
    match path {
        Some(path) => match SignatureConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Rejected signature config {path}: {e}; using embedded defaults");
                SignatureConfig::default_config()
            }
        },
        None => SignatureConfig::default_config(),
    }
}

fn generate_default_config(path: &str) {
    let config = SignatureConfig::default_config();
    let yaml = match serde_yaml::to_string(&config) {
        Ok(yaml) => yaml,
        Err(e) => {
            eprintln!("Failed to serialize default configuration: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = std::fs::write(path, yaml) {
        eprintln!("Failed to write {path}: {e}");
        process::exit(1);
    }
    println!("Default signature configuration written to {path}");
}

fn load_fragments(path: &str) -> Vec<Fragment> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to read fragments file {path}: {e}");
            process::exit(1);
        }
    };
    match serde_json::from_str(&content) {
        Ok(fragments) => fragments,
        Err(e) => {
            eprintln!("Invalid fragments file {path}: {e}");
            process::exit(1);
        }
    }
}

fn extract_hostname(raw: &str) -> Option<String> {
    if let Ok(parsed) = url::Url::parse(raw) {
        if let Some(host) = parsed.host_str() {
            return Some(host.to_string());
        }
    }
    // Bare hostname: accept it if it looks like one.
    let candidate = raw.trim().trim_end_matches('/');
    if !candidate.is_empty()
        && candidate.contains('.')
        && !candidate.contains('/')
        && !candidate.contains(' ')
    {
        return Some(candidate.to_string());
    }
    None
}

fn print_report(hostname: &str, assessment: &PageAssessment) {
    let composite = &assessment.composite;

    println!("Risk assessment for {hostname}");
    println!("=====================================");
    println!(
        "Total score: {:.1}/100  ->  {}",
        composite.total_score,
        composite.risk_level.as_str().to_uppercase()
    );
    println!(
        "Independent signals ({}): {:?}",
        composite.signal_count, composite.signals
    );
    println!();

    println!("Score breakdown:");
    let b = &composite.breakdown;
    println!("  ai text       {:>6.1}", b.ai);
    println!("  urgency       {:>6.1}", b.urgency);
    println!("  persuasion    {:>6.1}", b.persuasion);
    println!("  llm           {:>6.1}", b.llm);
    println!("  domain        {:>6.1}", b.domain);
    println!("  jailbreak     {:>6.1}", b.jailbreak);
    println!("  manipulation  {:>6.1}", b.manipulation);
    println!("  credibility   {:>6.1}", b.credibility_penalty);
    println!();

    println!(
        "AI text: probability {:.2}, confidence {:.2}",
        assessment.ai.ai_probability, assessment.ai.confidence
    );
    match &assessment.fingerprint.likely_model {
        Some(family) => println!(
            "LLM fingerprint: {} (confidence {:.2})",
            family.as_str(),
            assessment.fingerprint.confidence
        ),
        None => println!("LLM fingerprint: no model claim"),
    }
    println!(
        "Injection scan: {} hits ({} critical){}",
        assessment.jailbreak.total_hits,
        assessment.jailbreak.critical_hits,
        if assessment.jailbreak.escalating {
            ", escalating"
        } else {
            ""
        }
    );

    let domain = &assessment.domain;
    println!("Domain risk: {}/100", domain.risk_score);
    if domain.typosquat.is_typosquat {
        println!(
            "  typosquat of '{}' ({:?}, confidence {:.2})",
            domain.typosquat.likely_target.as_deref().unwrap_or("?"),
            domain.typosquat.technique,
            domain.typosquat.confidence
        );
    }
    if domain.tld.suspicious {
        if let Some(reason) = &domain.tld.reason {
            println!("  suspicious TLD: {reason}");
        }
    }
    for finding in &domain.subdomain_findings {
        println!("  subdomain: {} ({})", finding.label, finding.reason);
    }
    if domain.suspicious_pattern_score > 0.0 {
        println!(
            "  advisory pattern score: {:.2}",
            domain.suspicious_pattern_score
        );
    }
}
