//! linemap CLI - map CSV uploads to JSON documents per rule
//!
//! ```bash
//! linemap serve                          # Start HTTP server
//! linemap map people input.csv           # Map a file locally, print the payload
//! linemap parse input.csv -d ,           # Just parse CSV to JSON rows
//! linemap rules                          # List configured rules
//! ```
//!
//! The config file defaults to `$LINEMAP_CONFIG`, then `linemap.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use linemap::{
    parse_file, Config, MappingEngine, Settings, UploadOptions, UploadPipeline,
};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "linemap")]
#[command(about = "Map CSV rows to JSON documents with configurable rules", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on (default: $PORT or 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Map a CSV file with a rule and print the payload (never delivers)
    Map {
        /// Rule id
        rule: String,

        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse a CSV file and output headers and rows as JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter
        #[arg(short, long, default_value = ";")]
        delimiter: char,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List configured rules
    Rules,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = Settings::from_env();
    if let Some(path) = cli.config {
        settings.config_path = path;
    }

    let result = match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                settings.port = port;
            }
            cmd_serve(settings).await
        }
        Commands::Map { rule, input, output } => {
            cmd_map(&settings, &rule, &input, output.as_deref()).await
        }
        Commands::Parse {
            input,
            delimiter,
            output,
        } => cmd_parse(&input, delimiter, output.as_deref()),
        Commands::Rules => cmd_rules(&settings),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,linemap={level},linemap_backend={level}",
            level = level.as_str().to_lowercase()
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

async fn cmd_serve(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(&settings.config_path)?;
    linemap::server::start_server(settings, config).await?;
    Ok(())
}

async fn cmd_map(
    settings: &Settings,
    rule_id: &str,
    input: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(&settings.config_path)?;
    let rule = config
        .rule(rule_id)
        .ok_or_else(|| format!("Unknown rule: {}", rule_id))?;

    let supervisor = Arc::new(config.build_supervisor());
    supervisor.spawn_persistent(&config.handlers).await?;
    let engine = MappingEngine::new(Arc::clone(&supervisor), Arc::new(config.build_hooks()?));
    let pipeline = UploadPipeline::new(engine);

    let bytes = fs::read(input)?;
    let result = pipeline.run(rule, &bytes, UploadOptions { dry: true }).await;
    supervisor.shutdown().await;
    let outcome = result?;

    eprintln!("   Encoding: {}", outcome.csv_info.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(outcome.csv_info.delimiter));
    eprintln!("   Columns: {}", outcome.csv_info.headers.join(", "));
    eprintln!("   Rows: {}", outcome.processed_rows);

    let json = serde_json::to_string_pretty(&outcome.payload)?;
    write_output(&json, output)
}

fn cmd_parse(input: &Path, delimiter: char, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = parse_file(input, delimiter)?;
    eprintln!("   Encoding: {}", parsed.encoding);
    eprintln!("   Columns: {}", parsed.headers.join(", "));
    eprintln!("   Rows: {}", parsed.rows.len());

    let json = serde_json::to_string_pretty(&serde_json::json!({
        "headers": parsed.headers,
        "rows": parsed.rows,
    }))?;
    write_output(&json, output)
}

fn cmd_rules(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(&settings.config_path)?;
    for rule in &config.rules {
        let target = rule
            .http
            .as_ref()
            .map(|h| format!("{} {}", h.method, h.url))
            .unwrap_or_else(|| "-".to_string());
        let fields = rule.line_spec().map(|s| s.map.len()).unwrap_or(0);
        println!("{:<24} {:>3} fields  {}", rule.id, fields, target);
    }
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("   Saved to: {}", p.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
