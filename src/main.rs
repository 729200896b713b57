use std::path::PathBuf;

use clap::{Parser, Subcommand};

use oncodeck::Error;

#[derive(Parser)]
#[command(name = "oncodeck")]
#[command(about = "NGS result workbooks in, slide-deck and HTML reports out")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a results workbook and store its record
    Ingest {
        /// Path to the .xlsx results workbook
        workbook: PathBuf,
        /// Record store directory
        #[arg(long, default_value = "records")]
        store: PathBuf,
    },
    /// Generate the slide deck for a stored specimen
    Deck {
        /// Specimen id (pathology number)
        specimen: String,
        /// Record store directory
        #[arg(long, default_value = "records")]
        store: PathBuf,
        /// Directory holding the blank report templates
        #[arg(long, default_value = "templates")]
        templates: PathBuf,
        /// Output path (defaults to the report naming convention)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render the HTML report for a stored specimen
    Html {
        /// Specimen id (pathology number)
        specimen: String,
        /// Record store directory
        #[arg(long, default_value = "records")]
        store: PathBuf,
        /// Output path (defaults to {specimen}.html)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List stored specimen ids
    List {
        /// Record store directory
        #[arg(long, default_value = "records")]
        store: PathBuf,
    },
}

fn main() {
    env_logger::init();
    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::Ingest { workbook, store } => {
            let record = oncodeck::ingest_workbook(&workbook)?;
            let path = oncodeck::store::save(&store, &record)?;
            println!("Saved record {} to {}", record.specimen, path.display());
        }
        Commands::Deck { specimen, store, templates, output } => {
            let record = oncodeck::store::load(&store, &specimen)?;
            let bytes = oncodeck::generate_deck(&record, &templates)?;
            let out = output.unwrap_or_else(|| {
                let date = chrono::Local::now().format("%y%m%d").to_string();
                PathBuf::from(record.deck_filename(&date))
            });
            std::fs::write(&out, &bytes)?;
            println!("Wrote {} ({} bytes)", out.display(), bytes.len());
        }
        Commands::Html { specimen, store, output } => {
            let record = oncodeck::store::load(&store, &specimen)?;
            let html = oncodeck::render_html(&record);
            let out = output.unwrap_or_else(|| PathBuf::from(format!("{specimen}.html")));
            std::fs::write(&out, html)?;
            println!("Wrote {}", out.display());
        }
        Commands::List { store } => {
            let ids = oncodeck::store::list(&store)?;
            if ids.is_empty() {
                println!("No records in {}", store.display());
            } else {
                for id in ids {
                    println!("{id}");
                }
            }
        }
    }
    Ok(())
}
