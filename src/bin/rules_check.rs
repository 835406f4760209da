//! rules-check
//!
//! Validates a rule configuration file, reports compile failures, and
//! optionally evaluates a sample ticket against it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use ticket_rules::{ConfigWatcher, FileSource, RoleSet, RuleEngine, TicketSnapshot, WatcherConfig};

/// Command-line options.
struct Config {
    /// Rule configuration file.
    config_path: Option<PathBuf>,
    /// Ticket snapshot (JSON) to evaluate.
    ticket_path: Option<PathBuf>,
    /// Roles held by the evaluating principal.
    roles: Vec<String>,
    /// Rule groups to evaluate for the ticket.
    groups: Vec<String>,
    /// Keep running and reload on change.
    watch: bool,
}

fn usage() {
    println!("rules-check - validate a ticket rule configuration");
    println!();
    println!("USAGE:");
    println!("    rules-check [OPTIONS] <CONFIG>");
    println!();
    println!("OPTIONS:");
    println!("    -t, --ticket <FILE>      Ticket snapshot (JSON) to evaluate");
    println!("    -r, --roles <A,B,..>     Roles held by the principal");
    println!("    -g, --group <NAME>       Rule group to evaluate (repeatable)");
    println!("    -w, --watch              Keep running and reload on change");
    println!("    -h, --help               Print help information");
    println!();
    println!("Log verbosity follows RUST_LOG [default: info].");
}

fn value_of(args: &[String], i: usize, flag: &str) -> Result<String, String> {
    args.get(i + 1)
        .cloned()
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_args() -> Result<Config, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config {
        config_path: None,
        ticket_path: None,
        roles: Vec::new(),
        groups: Vec::new(),
        watch: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--ticket" | "-t" => {
                config.ticket_path = Some(PathBuf::from(value_of(&args, i, "--ticket")?));
                i += 2;
            }
            "--roles" | "-r" => {
                config.roles = value_of(&args, i, "--roles")?
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect();
                i += 2;
            }
            "--group" | "-g" => {
                config.groups.push(value_of(&args, i, "--group")?);
                i += 2;
            }
            "--watch" | "-w" => {
                config.watch = true;
                i += 1;
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            arg if arg.starts_with('-') => return Err(format!("unknown argument: {arg}")),
            arg => {
                if config.config_path.is_some() {
                    return Err(format!("unexpected argument: {arg}"));
                }
                config.config_path = Some(PathBuf::from(arg));
                i += 1;
            }
        }
    }

    Ok(config)
}

fn load_ticket(path: &PathBuf) -> Result<TicketSnapshot, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("{}: invalid ticket: {e}", path.display()))
}

fn report(engine: &RuleEngine, cfg: &Config) -> Result<(), String> {
    let registry = engine.registry();
    let stats = registry.stats();
    println!("source:       {}", engine.describe_source());
    println!("fingerprint:  {}", registry.fingerprint().to_hex());
    println!("domains:      {}", stats.domains);
    println!("rules:        {}", stats.rules);
    println!("failed rules: {}", stats.failed_rules);

    let Some(ticket_path) = &cfg.ticket_path else {
        return Ok(());
    };
    let ticket = load_ticket(ticket_path)?;
    let principal = RoleSet::new(cfg.roles.iter().cloned());

    println!();
    println!("ticket {} ({}:{})", ticket.id, ticket.domain, ticket.status);
    let next = engine.valid_next_states(&ticket, &principal);
    if next.is_empty() {
        println!("  valid next states: (none)");
    } else {
        println!("  valid next states: {}", next.join(", "));
    }
    for group in &cfg.groups {
        let matched = engine.matching_rules(&ticket, &principal, group);
        println!("  {group}: {} matching rule(s)", matched.len());
        for rule in &matched {
            let name = rule.name.as_deref().unwrap_or("-");
            match rule.multiplier {
                Some(m) => println!("    [{}] {name} x{m}", rule.index),
                None => println!("    [{}] {name}", rule.index),
            }
        }
        println!("  {group} multiplier: {}", engine.combined_multiplier(&ticket, &principal, group));
    }
    Ok(())
}

fn run(cfg: &Config) -> Result<bool, String> {
    let Some(path) = cfg.config_path.clone() else {
        return Err("missing <CONFIG> argument".to_string());
    };
    let engine = RuleEngine::new(Arc::new(FileSource::new(path))).map_err(|e| e.to_string())?;
    report(&engine, cfg)?;
    let clean = engine.registry().stats().failed_rules == 0;

    if cfg.watch {
        let engine = Arc::new(engine);
        let watcher = ConfigWatcher::spawn(Arc::clone(&engine), WatcherConfig::default()).map_err(|e| e.to_string())?;
        let mut seen = engine.registry().generation();
        loop {
            std::thread::sleep(Duration::from_millis(250));
            let generation = engine.registry().generation();
            if generation != seen {
                seen = generation;
                println!();
                println!("reloaded (generation {generation}, {:?})", watcher.stats());
                report(&engine, cfg)?;
            }
        }
    }

    Ok(clean)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cfg = match parse_args() {
        Ok(cfg) => cfg,
        Err(msg) => {
            eprintln!("error: {msg}");
            eprintln!("run with --help for usage");
            return ExitCode::from(2);
        }
    };

    match run(&cfg) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(2)
        }
    }
}
