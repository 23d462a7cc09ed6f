mod ai_extract;
mod config;
mod error;
mod fields;
mod pattern_extract;
mod patterns;
mod pdf_text;
mod pipeline;
mod process;
mod receipt_db;

use std::path::Path;

use tracing::info;

const CONFIG_PATH: &str = ".config/receipts.toml";

fn usage() {
    eprintln!("usage: receipt_extract <command>");
    eprintln!();
    eprintln!("  ingest <file.pdf>    copy a receipt PDF into the media dir and register it");
    eprintln!("  validate <id>        re-check a registered file and persist the result");
    eprintln!("  process [id]         extract fields and save receipts (all pending, or one id)");
    eprintln!("  list                 print processed receipts, newest purchase first");
    eprintln!("  show <id>            print one stored receipt as JSON");
    eprintln!("  extract <file.pdf>   run extraction on a PDF and print JSON, without storing");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter("info")
        .init();

    // Install crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let cfg = config::Config::load(CONFIG_PATH)?;
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("extract") => {
            let path = args
                .get(2)
                .ok_or("usage: receipt_extract extract <file.pdf>")?;
            process::extract_once(&cfg, Path::new(path)).await?;
        }
        Some("ingest") => {
            let path = args
                .get(2)
                .ok_or("usage: receipt_extract ingest <file.pdf>")?;
            let store = process::open_store(&cfg)?;
            let id = process::ingest_file(&store, &cfg, Path::new(path))?;
            println!("registered receipt file {id}");
        }
        Some("validate") => {
            let id: i64 = args
                .get(2)
                .ok_or("usage: receipt_extract validate <id>")?
                .parse()?;
            let store = process::open_store(&cfg)?;
            let valid = process::validate_file(&store, id)?;
            println!(
                "receipt file {id}: {}",
                if valid { "valid" } else { "invalid" }
            );
        }
        Some("process") => {
            let store = process::open_store(&cfg)?;
            match args.get(2) {
                Some(raw) => {
                    let id: i64 = raw.parse()?;
                    process::process_file(&store, &cfg, id).await?;
                }
                None => process::process_pending(&store, &cfg).await?,
            }

            let (files, processed, receipts) = store.get_counts()?;
            info!(
                files_total = files,
                files_processed = processed,
                receipts_total = receipts,
                "Database statistics"
            );
        }
        Some("list") => {
            let store = process::open_store(&cfg)?;
            process::list_receipts(&store)?;
        }
        Some("show") => {
            let id: i64 = args
                .get(2)
                .ok_or("usage: receipt_extract show <id>")?
                .parse()?;
            let store = process::open_store(&cfg)?;
            process::show_receipt(&store, id)?;
        }
        _ => usage(),
    }

    Ok(())
}
