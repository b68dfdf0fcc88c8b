#![forbid(unsafe_code)]

//! pseudoflow CLI - turn indented pseudocode into validated flowchart graphs.
//!
//! # Commands
//!
//! - `parse`: Output a parse summary or the full graph as JSON
//! - `validate`: Check node connectivity and report violations
//! - `segments`: Show how the input was split into statements and classified
//! - `outline`: Print a plain-text adjacency listing of the graph

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pf_core::{Dialect, parse_dialect_config_value, violations};
use pf_parser::{parse_evidence_json, parse_with_dialect, resolve_grammar, segment};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// pseudoflow CLI - turn indented pseudocode into validated flowchart graphs.
#[derive(Debug, Parser)]
#[command(
    name = "pf",
    version,
    about = "pseudoflow CLI - turn indented pseudocode into validated flowchart graphs",
    long_about = "Compiles an indented, keyword-driven pseudocode markup into a flowchart\n\
        graph (start, end, process, decision, connector, input and output nodes)\n\
        and checks every node against its connectivity rules."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging (can be repeated for more detail: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Dialect file (.toml, .json, .json5, .yaml/.yml) overriding keywords and delimiters
    #[arg(short, long, global = true)]
    dialect: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a document and output a summary or the full graph as JSON.
    Parse {
        /// Input file path, "-" for stdin, or inline text.
        #[arg(default_value = "-")]
        input: String,

        /// Output the full graph (default is summary)
        #[arg(long)]
        full: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a document and report connectivity violations.
    Validate {
        /// Input file path, "-" for stdin, or inline text.
        #[arg(default_value = "-")]
        input: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the logical segments and their resolved keywords.
    Segments {
        /// Input file path, "-" for stdin, or inline text.
        #[arg(default_value = "-")]
        input: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a plain-text adjacency listing of the graph.
    Outline {
        /// Input file path, "-" for stdin, or inline text.
        #[arg(default_value = "-")]
        input: String,
    },
}

/// Result of validating a document.
#[derive(Debug, Serialize)]
struct ValidateResult {
    valid: bool,
    node_count: usize,
    edge_count: usize,
    warnings: Vec<String>,
    errors: Vec<ValidationError>,
}

#[derive(Debug, Serialize)]
struct ValidationError {
    node: usize,
    kind: String,
    line: usize,
    direction: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct SegmentRow<'a> {
    #[serde(flatten)]
    segment: &'a pf_parser::LogicalSegment,
    grammar: Option<pf_parser::Grammar>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);
    let dialect = load_dialect(cli.dialect.as_deref())?;

    match cli.command {
        Command::Parse {
            input,
            full,
            pretty,
        } => cmd_parse(&input, &dialect, full, pretty),

        Command::Validate { input, json } => cmd_validate(&input, &dialect, json),

        Command::Segments { input, json } => cmd_segments(&input, &dialect, json),

        Command::Outline { input } => cmd_outline(&input, &dialect),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .try_init();
}

fn load_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else if Path::new(input).exists() {
        std::fs::read_to_string(input).context(format!("Failed to read file: {input}"))
    } else {
        // Treat as inline document text
        Ok(input.to_string())
    }
}

// =============================================================================
// Dialect files
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
    Json5,
    Yaml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            Some("json5") => Ok(Self::Json5),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            _ => bail!(
                "Unsupported dialect file extension for {} (expected .toml, .json, .json5, .yaml or .yml)",
                path.display()
            ),
        }
    }
}

fn parse_config_text(text: &str, format: ConfigFormat) -> Result<Value> {
    let value = match format {
        ConfigFormat::Toml => toml::from_str(text).context("Invalid TOML dialect file")?,
        ConfigFormat::Json => serde_json::from_str(text).context("Invalid JSON dialect file")?,
        ConfigFormat::Json5 => json5::from_str(text).context("Invalid JSON5 dialect file")?,
        ConfigFormat::Yaml => serde_yaml::from_str(text).context("Invalid YAML dialect file")?,
    };
    Ok(value)
}

fn dialect_from_text(text: &str, format: ConfigFormat) -> Result<Dialect> {
    let value = parse_config_text(text, format)?;
    let parsed = parse_dialect_config_value(&value);
    for warning in &parsed.warnings {
        warn!("Dialect warning: {warning}");
    }
    if !parsed.errors.is_empty() {
        let details: Vec<String> = parsed
            .errors
            .iter()
            .map(|err| format!("{}: {} (got {})", err.field, err.message, err.value))
            .collect();
        bail!("Invalid dialect:\n  {}", details.join("\n  "));
    }
    Ok(parsed.dialect)
}

fn load_dialect(path: Option<&Path>) -> Result<Dialect> {
    let Some(path) = path else {
        return Ok(Dialect::default());
    };
    let format = ConfigFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dialect file: {}", path.display()))?;
    let dialect = dialect_from_text(&text, format)
        .with_context(|| format!("Failed to load dialect from {}", path.display()))?;
    info!("Loaded dialect from {}", path.display());
    debug!(?dialect, "active dialect");
    Ok(dialect)
}

// =============================================================================
// Command: parse
// =============================================================================

fn cmd_parse(input: &str, dialect: &Dialect, full: bool, pretty: bool) -> Result<()> {
    let source = load_input(input)?;
    let parsed = parse_with_dialect(&source, dialect);

    let output = if full {
        if pretty {
            serde_json::to_string_pretty(&parsed.graph)?
        } else {
            serde_json::to_string(&parsed.graph)?
        }
    } else if pretty {
        let value: Value = serde_json::from_str(&parse_evidence_json(&parsed))?;
        serde_json::to_string_pretty(&value)?
    } else {
        parse_evidence_json(&parsed)
    };

    println!("{output}");

    for warning in &parsed.warnings {
        warn!("Parse warning: {warning}");
    }

    Ok(())
}

// =============================================================================
// Command: validate
// =============================================================================

fn validate_source(source: &str, dialect: &Dialect) -> ValidateResult {
    let parsed = parse_with_dialect(source, dialect);
    let errors: Vec<ValidationError> = violations(&parsed.graph)
        .into_iter()
        .map(|violation| ValidationError {
            node: violation.node.0,
            kind: violation.kind.as_str().to_string(),
            line: violation.line,
            direction: violation.direction.as_str().to_string(),
            message: violation.to_string(),
        })
        .collect();

    ValidateResult {
        valid: errors.is_empty(),
        node_count: parsed.graph.nodes.len(),
        edge_count: parsed.graph.edges.len(),
        warnings: parsed.warnings,
        errors,
    }
}

fn cmd_validate(input: &str, dialect: &Dialect, json_output: bool) -> Result<()> {
    let source = load_input(input)?;
    let result = validate_source(&source, dialect);

    if json_output {
        let output = serde_json::to_string_pretty(&result)?;
        println!("{output}");
    } else {
        if result.valid {
            println!("✓ Valid flowchart");
        } else {
            println!("✗ Invalid flowchart");
        }

        println!("  Nodes: {}", result.node_count);
        println!("  Edges: {}", result.edge_count);

        if !result.errors.is_empty() {
            println!("\nErrors:");
            for err in &result.errors {
                println!("  [line {}] {}", err.line, err.message);
            }
        }

        if !result.warnings.is_empty() {
            println!("\nWarnings:");
            for warning in &result.warnings {
                println!("  {warning}");
            }
        }
    }

    if !result.valid {
        std::process::exit(1);
    }

    Ok(())
}

// =============================================================================
// Command: segments
// =============================================================================

fn cmd_segments(input: &str, dialect: &Dialect, json_output: bool) -> Result<()> {
    let source = load_input(input)?;
    let segments = segment(&source, dialect);
    let rows: Vec<SegmentRow<'_>> = segments
        .iter()
        .map(|segment| SegmentRow {
            segment,
            grammar: resolve_grammar(segment, dialect),
        })
        .collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        println!("{}", describe_segment(row));
    }
    Ok(())
}

fn describe_segment(row: &SegmentRow<'_>) -> String {
    let segment = row.segment;
    let location = format!(
        "{}:{} indent={}",
        segment.line + 1,
        segment.sub_index,
        segment.indent
    );
    let Some(grammar) = &row.grammar else {
        return if segment.is_comment_only() {
            format!("{location}  comment {:?}", segment.comment)
        } else {
            format!("{location}  (skipped)")
        };
    };

    let mut keys: Vec<&str> = Vec::new();
    if let Some(key) = grammar.spec_key {
        keys.push(key.as_str());
    }
    if let Some(key) = grammar.node_key {
        keys.push(key.as_str());
    }
    if grammar.collapsed {
        keys.push("collapsed");
    }
    keys.extend(grammar.inline_keys.iter().map(|key| key.as_str()));
    format!("{location}  [{}] {:?}", keys.join(" "), grammar.text)
}

// =============================================================================
// Command: outline
// =============================================================================

fn cmd_outline(input: &str, dialect: &Dialect) -> Result<()> {
    let source = load_input(input)?;
    let parsed = parse_with_dialect(&source, dialect);
    print!("{}", parsed.graph.outline());
    for warning in &parsed.warnings {
        warn!("Parse warning: {warning}");
    }
    Ok(())
}
