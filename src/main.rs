use clap::{Parser, Subcommand};
use oerm::check::check_file;
use oerm::codec::CompressionId;
use oerm::crypto::CipherId;
use oerm::database::{Database, Mode, StoreOptions};
use oerm::matcher::ReportMatcher;
use oerm::report::Reports;
use oerm::spool::{FixedLengthReader, HostReprintReader};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "oerm", about = "Archival storage for mainframe report spools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a print spool into a store, splitting it into reports
    Load {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Spool format: fcfc (default) or fixed
        #[arg(short, long, default_value = "fcfc")]
        spool_type: String,
        /// Record length for fixed spools
        #[arg(long, default_value = "256")]
        record_length: usize,
        /// New-page code for fixed spools
        #[arg(long, default_value = "1")]
        newpage_code: String,
        /// YAML rules used to identify reports
        #[arg(short, long)]
        rules: Option<PathBuf>,
        /// Compression: gzip (default), lzma, lz4, brotli, zstd, store
        #[arg(short, long, default_value = "gzip")]
        compression: String,
        /// Compression effort: 0 minimum, 1 normal, 2 maximum
        #[arg(short, long, default_value = "1")]
        level: u8,
        /// Cipher: none (default), aes-gcm, xchacha20
        #[arg(long, default_value = "none")]
        cipher: String,
        #[arg(short, long)]
        password: Option<String>,
        /// Pages stored per container block
        #[arg(long, default_value = "10")]
        pages_per_container: u16,
        /// Extend an existing store instead of creating one
        #[arg(short, long)]
        append: bool,
    },
    /// List the reports in a store
    List {
        input: PathBuf,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Show store details, or one report's full metadata
    Info {
        input: PathBuf,
        #[arg(short, long)]
        report: Option<u32>,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Print report pages to stdout
    Pages {
        input: PathBuf,
        #[arg(short, long)]
        report: u32,
        /// Pages to print, e.g. "1-3,7"; all pages when omitted
        #[arg(long)]
        pages: Option<String>,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Search report text for a substring
    Find {
        input: PathBuf,
        text: String,
        /// Restrict the search to these report ids
        #[arg(short, long)]
        report: Vec<u32>,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Verify that every block of a store decodes
    Check {
        input: PathBuf,
        #[arg(short, long)]
        password: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    drop(env_logger::try_init());

    match Cli::parse().command {

        // ── Load ─────────────────────────────────────────────────────────────
        Commands::Load {
            input, output, spool_type, record_length, newpage_code, rules,
            compression, level, cipher, password, pages_per_container, append,
        } => {
            let matcher = match &rules {
                Some(path) => ReportMatcher::from_file(path)?,
                None => ReportMatcher::empty(),
            };
            let options = StoreOptions {
                compression: parse_compression(&compression).id(),
                level,
                cipher: parse_cipher(&cipher).id(),
                passphrase: password,
                pages_per_container,
            };
            let mode = if append { Mode::Append } else { Mode::Create };
            let mut db = Database::open(&output, mode, options)?;

            let reader: Box<dyn Iterator<Item = io::Result<String>>> =
                match spool_type.as_str() {
                    "fixed" => Box::new(FixedLengthReader::open(
                        &input, record_length, &newpage_code,
                    )?),
                    "fcfc" => Box::new(HostReprintReader::open(&input)?),
                    other => {
                        eprintln!("Unknown spool type '{}', defaulting to fcfc", other);
                        Box::new(HostReprintReader::open(&input)?)
                    }
                };

            let mut previous = String::new();
            let mut pages = 0u64;
            for page in reader {
                let page = page?;
                let metadata = matcher.identify(&page);
                if metadata.report() != previous {
                    previous = metadata.report().to_owned();
                    match db.get_report(metadata.report()) {
                        Some(id) => db.set_report(id)?,
                        None => {
                            db.add_report(&metadata)?;
                        }
                    }
                }
                db.add_page(&page)?;
                pages += 1;
            }
            let reports = db.report_count();
            db.close()?;
            println!(
                "Loaded {} page(s) across {} report(s) into {}",
                pages, reports, output.display()
            );
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, password } => {
            let reports = Reports::open(&input, password.as_deref())?;
            println!("Store: {}", input.display());
            println!("{:<6} {:<42} {:>8} {:>11}", "Id", "Report", "Pages", "Containers");
            for entry in reports.iter() {
                if let Some(report) = reports.get_report(entry.id)? {
                    println!(
                        "{:<6} {:<42} {:>8} {:>11}",
                        report.id(), report.name(),
                        report.total_pages(), report.container_count()
                    );
                }
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, report, password } => {
            let reports = Reports::open(&input, password.as_deref())?;
            match report {
                Some(id) => {
                    let report = reports
                        .get_report(id)?
                        .ok_or_else(|| format!("no report {} in {}", id, input.display()))?;
                    println!("── Report {} ───────────────────────────────────────────", id);
                    println!("  Name       {}", report.name());
                    println!("  Pages      {}", report.total_pages());
                    println!("  Containers {}", report.container_count());
                    for (key, value) in report.metadata().iter() {
                        println!("  {:<10} {}", key, value);
                    }
                }
                None => {
                    let size = std::fs::metadata(&input)?.len();
                    let containers: usize =
                        reports.iter().map(|e| e.containers.len()).sum();
                    println!("── Store ──────────────────────────────────────────────");
                    println!("  Path       {}", input.display());
                    println!("  Size       {} B", size);
                    println!("  Reports    {}", reports.len());
                    println!("  Containers {}", containers);
                }
            }
        }

        // ── Pages ────────────────────────────────────────────────────────────
        Commands::Pages { input, report, pages, password } => {
            let reports = Reports::open(&input, password.as_deref())?;
            let mut report = reports
                .get_report(report)?
                .ok_or_else(|| format!("no report {} in {}", report, input.display()))?;
            let wanted: Vec<u64> = match pages {
                Some(ranges) => parse_page_ranges(&ranges, report.total_pages()),
                None => (1..=report.total_pages()).collect(),
            };
            for n in wanted {
                if let Some(text) = report.get_page(n)? {
                    print!("{}", text);
                }
            }
        }

        // ── Find ─────────────────────────────────────────────────────────────
        Commands::Find { input, text, report, password } => {
            let reports = Reports::open(&input, password.as_deref())?;
            let filter = if report.is_empty() {
                None
            } else {
                Some(report.as_slice())
            };
            let matches = reports.find_text(&text, filter)?;
            println!("{:<8} {:>8} {:>8}  Snippet", "Report", "Page", "Offset");
            for m in &matches {
                println!("{:<8} {:>8} {:>8}  {}", m.report, m.page, m.offset, m.snippet);
            }
            println!("{} match(es)", matches.len());
        }

        // ── Check ────────────────────────────────────────────────────────────
        Commands::Check { input, password } => {
            let report = check_file(&input, password.as_deref())?;
            println!("{}", report.summary());
            for (name, blocks) in &report.by_compression {
                println!("  {:<8} {:>6} block(s)", name, blocks);
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_compression(s: &str) -> CompressionId {
    CompressionId::from_name(s).unwrap_or_else(|| {
        eprintln!("Unknown compression '{}', defaulting to gzip", s);
        CompressionId::Gzip
    })
}

fn parse_cipher(s: &str) -> CipherId {
    CipherId::from_name(s).unwrap_or_else(|| {
        eprintln!("Unknown cipher '{}', storing plain text", s);
        CipherId::Plain
    })
}

/// Expand "1-3,7" into page numbers, dropping anything outside 1..=total.
fn parse_page_ranges(ranges: &str, total: u64) -> Vec<u64> {
    let mut pages = Vec::new();
    for part in ranges.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (from, to) = match part.split_once('-') {
            Some((a, b)) => (
                a.trim().parse().unwrap_or(0),
                b.trim().parse().unwrap_or(0),
            ),
            None => {
                let n = part.parse().unwrap_or(0);
                (n, n)
            }
        };
        for n in from..=to {
            if (1..=total).contains(&n) {
                pages.push(n);
            }
        }
    }
    pages
}
