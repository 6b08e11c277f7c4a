use clap::{Arg, Command};
use log::LevelFilter;
use mailrule::email::{load_records, EmailRecord};
use mailrule::{Config, EmailStore, ErrorMode, RuleEngine, RuleSet};
use std::path::Path;
use std::process;

fn main() {
    let matches = Command::new("mailrule")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Classify stored email against user-defined rules and run their actions")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("mailrule.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("rules")
                .long("rules")
                .value_name("FILE")
                .help("Rule file (JSON, or YAML with a .yaml/.yml extension)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("database")
                .long("database")
                .value_name("FILE")
                .help("SQLite database holding retrieved emails")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("import")
                .long("import")
                .value_name("FILE")
                .help("Store a JSON array of email records before processing")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("import-eml")
                .long("import-eml")
                .value_name("FILE")
                .help("Store a raw RFC 822 message before processing")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-rules")
                .long("test-rules")
                .help("Validate the rule file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .help("Reject unknown or mismatched predicates instead of never matching")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("fail-fast")
                .long("fail-fast")
                .help("Abort the pass on the first unparseable date")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging of every rule evaluation")
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

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("mailrule.yaml");

    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if let Some(rules_path) = matches.get_one::<String>("rules") {
        config.rules_path = rules_path.clone();
    }
    if let Some(database_path) = matches.get_one::<String>("database") {
        config.database_path = database_path.clone();
    }
    if matches.get_flag("strict") {
        config.strict_rules = true;
    }
    if matches.get_flag("fail-fast") {
        config.error_mode = ErrorMode::FailFast;
    }

    let rules = match RuleSet::load(&config.rules_path, config.strict_rules) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("Error loading rules from {}: {e:#}", config.rules_path);
            process::exit(1);
        }
    };

    if matches.get_flag("test-rules") {
        println!("Number of rules: {}", rules.len());
        for (i, rule) in rules.rules().iter().enumerate() {
            println!(
                "  Rule {}: {} ({:?}, {} conditions, {} actions)",
                i + 1,
                rule.name,
                rule.aggregation,
                rule.conditions.len(),
                rule.actions.len()
            );
        }
        println!("All rules compiled successfully.");
        return;
    }

    if let Err(e) = run(&config, &matches, rules) {
        log::error!("{e:#}");
        process::exit(1);
    }
}

fn run(config: &Config, matches: &clap::ArgMatches, rules: RuleSet) -> anyhow::Result<()> {
    let mut store = EmailStore::open(&config.database_path)?;

    if let Some(path) = matches.get_one::<String>("import") {
        let records = load_records(path)?;
        let stored = store.upsert_all(&records)?;
        log::info!("Stored {stored} emails from {path}");
    }

    if let Some(path) = matches.get_one::<String>("import-eml") {
        let raw = std::fs::read_to_string(path)?;
        let fallback_id = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(path);
        let record = EmailRecord::from_rfc822(fallback_id, &raw);
        store.upsert(&record)?;
        log::info!("Stored email {} from {path}", record.id);
    }

    let records = store.fetch_all()?;
    if records.is_empty() {
        log::info!("No emails found in {}", config.database_path);
        return Ok(());
    }

    let mut engine = RuleEngine::new(config.error_mode);
    engine.load(rules);
    let report = engine.run(&records, std::io::stdout().lock())?;

    if report.degraded_conditions > 0 {
        log::warn!(
            "{} conditions could not be evaluated and were treated as not matched",
            report.degraded_conditions
        );
    }
    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}
