//! winfw - Windows Firewall rule tool
//!
//! Lists, inspects, adds, removes and toggles Windows Firewall rules from the command line.
//!
//! # Usage
//!
//! ```bash
//! winfw list                          # All rules, one per line
//! winfw list --format json            # Full rules as JSON
//! winfw show "Core Networking - DNS"  # One rule in detail
//! winfw add web --protocol tcp --local-ports 80,443 --action allow
//! winfw disable web
//! winfw remove web
//! winfw count
//! winfw config --output-format json   # Persist defaults
//! ```
//!
//! Rule changes are recorded in `audit.log` in the data directory unless disabled in the
//! config. Changing rules needs an elevated prompt.

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::str::FromStr;
use winfw::audit::{self, EventType};
use winfw::config::{self, AppConfig, OutputFormat};
use winfw::core::error::{NativeError, hresult};
use winfw::core::firewall::{Action, Direction, FirewallRule, Ports, Protocol, protocol_number};
use winfw::core::native::PolicyEngine;
use winfw::core::record::{RuleRecord, TEXT_FIELD_BYTES};
use winfw::{Error, Firewall, Result};

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "winfw")]
#[command(about = "Manage Windows Firewall rules", long_about = None)]
#[command(version = build::CLAP_LONG_VERSION)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Rules(RuleCommand),
    /// Show or update the saved configuration
    Config {
        #[arg(long, value_enum)]
        output_format: Option<OutputFormat>,
        /// Default log level: error, warn, info, debug or trace
        #[arg(long)]
        log_level: Option<String>,
        /// Record rule changes in the audit log
        #[arg(long)]
        audit: Option<bool>,
    },
}

#[derive(Subcommand)]
enum RuleCommand {
    /// List all firewall rules in policy order
    List {
        /// Output format (defaults to the configured one)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Show one rule in detail
    Show {
        name: String,
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Add a rule scoped to the currently active profiles
    Add(AddArgs),
    /// Remove a rule by exact name
    Remove { name: String },
    /// Enable a rule by exact name
    Enable { name: String },
    /// Disable a rule by exact name
    Disable { name: String },
    /// Print the number of rules
    Count,
}

#[derive(clap::Args)]
struct AddArgs {
    /// Unique rule name
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Executable the rule applies to
    #[arg(long, default_value = "")]
    program: String,
    /// Service short name the rule applies to
    #[arg(long, default_value = "")]
    service: String,
    /// tcp, udp, icmpv4, icmpv6, any, or an IP protocol number
    #[arg(long, default_value = "any", value_parser = parse_protocol)]
    protocol: i32,
    /// TCP/UDP only, e.g. 80,443 or 5000-5010
    #[arg(long, default_value = "")]
    local_ports: String,
    #[arg(long, default_value = "")]
    remote_ports: String,
    /// ICMP only, e.g. 8:* or 128:0
    #[arg(long, default_value = "")]
    icmp_types: String,
    #[arg(long, default_value = "")]
    local_addresses: String,
    #[arg(long, default_value = "")]
    remote_addresses: String,
    /// in or out; any leaves the engine default
    #[arg(long, default_value = "in")]
    direction: Direction,
    /// allow or block
    #[arg(long, default_value = "block")]
    action: Action,
    /// e.g. All, LAN, Wireless, RemoteAccess
    #[arg(long, default_value = "")]
    interface_types: String,
    /// Interface name; repeat for several
    #[arg(long = "interface")]
    interfaces: Vec<String>,
    #[arg(long, default_value = "")]
    grouping: String,
    /// Create the rule disabled
    #[arg(long)]
    disabled: bool,
    #[arg(long)]
    edge_traversal: bool,
}

impl AddArgs {
    fn into_rule(self) -> FirewallRule {
        FirewallRule {
            name: self.name,
            description: self.description,
            application: self.program,
            service: self.service,
            protocol: Protocol::from_parts(
                self.protocol,
                self.icmp_types,
                Ports::new(self.local_ports, self.remote_ports),
            ),
            local_addresses: self.local_addresses,
            remote_addresses: self.remote_addresses,
            profiles: winfw::ProfileSet::EMPTY,
            direction: self.direction,
            action: self.action,
            interface_types: self.interface_types,
            interfaces: self.interfaces,
            enabled: !self.disabled,
            grouping: self.grouping,
            edge_traversal: self.edge_traversal,
        }
    }
}

fn parse_protocol(value: &str) -> std::result::Result<i32, String> {
    match value.to_ascii_lowercase().as_str() {
        "tcp" => Ok(protocol_number::TCP),
        "udp" => Ok(protocol_number::UDP),
        "icmpv4" | "icmp" => Ok(protocol_number::ICMPV4),
        "icmpv6" => Ok(protocol_number::ICMPV6),
        "any" => Ok(protocol_number::ANY),
        other => match other.parse::<i32>() {
            Ok(n) if (0..=protocol_number::ANY).contains(&n) => Ok(n),
            _ => Err(format!(
                "'{value}' is not a protocol name or a number between 0 and 256"
            )),
        },
    }
}

#[cfg(windows)]
fn system_firewall() -> Result<Firewall<winfw::core::windows::WindowsEngine>> {
    Ok(Firewall::system())
}

#[cfg(not(windows))]
fn system_firewall() -> Result<Firewall<winfw::core::memory::MemoryEngine>> {
    Err(Error::Unsupported)
}

fn main() -> ExitCode {
    let _ = winfw::utils::ensure_dirs();
    let cli = Cli::parse();
    let config = config::load_config();
    init_logging(cli.verbose, &config.log_level);

    let result = match cli.command {
        Commands::Config {
            output_format,
            log_level,
            audit,
        } => update_config(config, output_format, log_level, audit),
        Commands::Rules(command) => {
            system_firewall().and_then(|fw| handle_cli(&fw, command, &config))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            let translation = e.translate();
            if translation.user_message != e.to_string() {
                eprintln!("  {}", translation.user_message);
            }
            for suggestion in &translation.suggestions {
                eprintln!("  - {suggestion}");
            }
            if let Some(url) = &translation.help_url {
                eprintln!("  See: {url}");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, configured: &str) {
    let level = match verbose {
        0 => tracing::Level::from_str(configured).unwrap_or(tracing::Level::WARN),
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_cli<E: PolicyEngine>(
    fw: &Firewall<E>,
    command: RuleCommand,
    config: &AppConfig,
) -> Result<()> {
    match command {
        RuleCommand::List { format } => {
            let listing = fw.rules()?;
            match format.unwrap_or(config.output_format) {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&listing)?),
                OutputFormat::Text => {
                    for rule in &listing.rules {
                        println!(
                            "{} {:<48} {:<3} {:<5} {:<7} {}",
                            if rule.enabled { "*" } else { " " },
                            rule.name,
                            rule.direction,
                            rule.action,
                            rule.protocol.display_name(),
                            rule.profiles,
                        );
                    }
                    println!("{} rules (* = enabled)", listing.rules.len());
                }
            }
            if listing.skipped > 0 {
                eprintln!(
                    "Warning: {} of {} entries could not be read",
                    listing.skipped, listing.reported_count
                );
            }
        }
        RuleCommand::Show { name, format } => {
            let rule = fw.find_rule(&name)?.ok_or_else(|| Error::RuleNotFoundOrRemoveFailed {
                name: name.clone(),
                source: NativeError::new(hresult::E_NOT_FOUND),
            })?;
            match format.unwrap_or(config.output_format) {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rule)?),
                OutputFormat::Text => println!("{rule}"),
            }
        }
        RuleCommand::Add(args) => {
            let rule = args.into_rule();
            for (field, value) in text_fields(&rule) {
                if value.len() > TEXT_FIELD_BYTES {
                    eprintln!(
                        "Warning: {field} is {} bytes and will be truncated to {TEXT_FIELD_BYTES}",
                        value.len()
                    );
                }
            }
            let result = fw.add_rule(&RuleRecord::from(&rule));
            audited(config, EventType::AddRule, &rule.name, result)?;
            println!("✓ Rule '{}' added.", rule.name);
        }
        RuleCommand::Remove { name } => {
            audited(config, EventType::RemoveRule, &name, fw.remove_rule(&name))?;
            println!("✓ Rule '{name}' removed.");
        }
        RuleCommand::Enable { name } => {
            let result = fw.set_rule_enabled(&name, true);
            audited(config, EventType::EnableRule, &name, result)?;
            println!("✓ Rule '{name}' enabled.");
        }
        RuleCommand::Disable { name } => {
            let result = fw.set_rule_enabled(&name, false);
            audited(config, EventType::DisableRule, &name, result)?;
            println!("✓ Rule '{name}' disabled.");
        }
        RuleCommand::Count => println!("{}", fw.rule_count()?),
    }
    Ok(())
}

/// Text attributes of a rule as typed by the user, before any record truncation
fn text_fields(rule: &FirewallRule) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("name", rule.name.clone()),
        ("description", rule.description.clone()),
        ("program", rule.application.clone()),
        ("service", rule.service.clone()),
        ("local addresses", rule.local_addresses.clone()),
        ("remote addresses", rule.remote_addresses.clone()),
        ("interface types", rule.interface_types.clone()),
        ("interfaces", rule.interfaces_joined()),
        ("grouping", rule.grouping.clone()),
    ];
    if let Some(ports) = rule.protocol.ports() {
        fields.push(("local ports", ports.local.clone()));
        fields.push(("remote ports", ports.remote.clone()));
    }
    if let Some(icmp) = rule.protocol.icmp_types() {
        fields.push(("icmp types", icmp.to_string()));
    }
    fields
}

fn audited(config: &AppConfig, event: EventType, name: &str, result: Result<()>) -> Result<()> {
    if config.audit_enabled {
        audit::log_rule_change(event, name, &result);
    }
    result
}

fn update_config(
    mut config: AppConfig,
    output_format: Option<OutputFormat>,
    log_level: Option<String>,
    audit: Option<bool>,
) -> Result<()> {
    let changed = output_format.is_some() || log_level.is_some() || audit.is_some();
    if let Some(format) = output_format {
        config.output_format = format;
    }
    if let Some(level) = log_level {
        tracing::Level::from_str(&level)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, level.clone()))?;
        config.log_level = level;
    }
    if let Some(enabled) = audit {
        config.audit_enabled = enabled;
    }
    if changed {
        config::save_config(&config)?;
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
