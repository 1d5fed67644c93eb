use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use paper_scraper::pipeline::batch::PostFilter;
use paper_scraper::pipeline::engine::{Engine, EngineConfig, RunReport};
use paper_scraper::pipeline::events::ScrapeEvent;
use paper_scraper::pipeline::log::{JsonLinesLog, LogSink, NullLog};
use paper_scraper::pipeline::retrieval::RetrievalOptions;
use paper_scraper::plugins::http::fetch::HttpFetcher;
use paper_scraper::plugins::registry::{FetchContext, ResolverRegistry, ScrapeCliConfig};
use paper_scraper::source::listing::ListingFileSource;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const RUN_LOG: &str = "log.jsonl";
const INCOMPATIBLE_LOG: &str = "Incompatible URL Log.txt";

fn build_cli(registry: &ResolverRegistry) -> Command {
    let scrape = Command::new("scrape")
        .about("Download the images behind a list of saved posts")
        .arg(
            Arg::new("listing")
                .long("listing")
                .help("JSON listing of saved posts")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("limit")
                .short('l')
                .long("limit")
                .help("Number of posts with images to process")
                .default_value("1000")
                .num_args(1),
        )
        .arg(
            Arg::new("directory")
                .short('d')
                .long("directory")
                .help("Output directory")
                .default_value("Output")
                .num_args(1),
        )
        .arg(
            Arg::new("titlecase")
                .short('t')
                .long("titlecase")
                .help("Title Case file names")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("png")
                .short('p')
                .long("png")
                .help("Convert jpeg images to png")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("sort")
                .short('s')
                .long("sort")
                .help("Save into one folder per subcategory")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("nolog")
                .long("nolog")
                .help("Do not write the run log or the incompatible-domain log")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log_dir")
                .long("log-dir")
                .help("Log directory (default: <directory>/Logs)")
                .num_args(1),
        )
        .arg(
            Arg::new("min_score")
                .long("min-score")
                .help("Skip posts scored below this")
                .num_args(1),
        )
        .arg(
            Arg::new("max_age_days")
                .long("max-age-days")
                .help("Skip posts older than this many days")
                .num_args(1),
        );

    let scrape = registry.augment_scrape_command(scrape);

    Command::new("paper-scraper")
        .about("Wallpaper scraper for saved posts - plugin based")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(scrape)
        .subcommand(Command::new("providers").about("List known link providers"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paper_scraper=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn string_arg<'a>(m: &'a ArgMatches, name: &str) -> anyhow::Result<&'a String> {
    m.get_one::<String>(name).with_context(|| format!("missing --{name}"))
}

fn post_filter(m: &ArgMatches) -> anyhow::Result<PostFilter> {
    let min_score = m
        .get_one::<String>("min_score")
        .map(|s| s.parse::<i64>())
        .transpose()
        .context("--min-score")?;
    let max_age = m
        .get_one::<String>("max_age_days")
        .map(|s| s.parse::<i64>())
        .transpose()
        .context("--max-age-days")?
        .map(chrono::Duration::days);
    Ok(PostFilter { min_score, max_age })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let registry = ResolverRegistry::with_defaults();
    let app = build_cli(&registry);
    let matches = app.get_matches();

    match matches.subcommand() {
        Some(("scrape", m)) => scrape(registry, m).await?,
        Some(("providers", _)) => {
            for p in registry.providers() {
                let status = if p.implemented { "supported" } else { "not implemented" };
                println!("{:<14} {}", p.name, status);
            }
        }
        _ => {}
    }

    Ok(())
}

async fn scrape(registry: ResolverRegistry, m: &ArgMatches) -> anyhow::Result<()> {
    let listing = PathBuf::from(string_arg(m, "listing")?);
    let directory = PathBuf::from(string_arg(m, "directory")?);
    let limit: usize = string_arg(m, "limit")?.parse().context("--limit")?;
    let log_dir = m
        .get_one::<String>("log_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| directory.join("Logs"));
    let nolog = m.get_flag("nolog");

    let mut cfg = ScrapeCliConfig { fetch_ctx: FetchContext::default(), max_concurrency: 8 };
    registry.apply_scrape_matches(m, &mut cfg)?;

    let options = RetrievalOptions {
        title_case: m.get_flag("titlecase"),
        convert_png: m.get_flag("png"),
        max_concurrency: cfg.max_concurrency,
    };
    let config = EngineConfig {
        directory: directory.clone(),
        organize: m.get_flag("sort"),
        limit,
        filter: post_filter(m)?,
    };

    let mut source = ListingFileSource::open(&listing).await?;
    let log: Box<dyn LogSink> = if nolog {
        Box::new(NullLog)
    } else {
        Box::new(JsonLinesLog::open(log_dir.join(RUN_LOG)).await?)
    };

    let engine = Engine::new(registry, HttpFetcher::new(cfg.fetch_ctx), options, config).await?;
    let rx = engine.subscribe();
    let ui_task = tokio::spawn(render_progress(rx));

    let report = engine.run(&mut source, log.as_ref()).await;
    drop(engine);
    let _ = ui_task.await;
    let report = report?;

    if !nolog && !report.incompatible.is_empty() {
        report.incompatible.write_to(&log_dir.join(INCOMPATIBLE_LOG)).await?;
    }
    print_summary(&report, &directory);
    Ok(())
}

async fn render_progress(mut rx: tokio::sync::broadcast::Receiver<ScrapeEvent>) {
    let mp = MultiProgress::new();
    let sty = ProgressStyle::with_template("{spinner:.green} {prefix} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("|/-\\ ");

    let mut bars: HashMap<String, ProgressBar> = HashMap::new();

    loop {
        let evt = match rx.recv().await {
            Ok(e) => e,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(_) => break,
        };

        match evt {
            ScrapeEvent::PostQueued { post_id, title, found } => {
                let pb = mp.add(ProgressBar::new_spinner());
                pb.set_style(sty.clone());
                pb.set_prefix(format!("[{post_id}]"));
                pb.enable_steady_tick(std::time::Duration::from_millis(120));
                pb.set_message(format!("{title} - {found} image(s)"));
                bars.insert(post_id, pb);
            }
            ScrapeEvent::PostSkipped { post_id, url, reason } => {
                let _ = mp.println(format!("[SKIP] {post_id} {url}: {reason}"));
            }
            ScrapeEvent::ItemSaved { post_id, path, .. } => {
                if let Some(pb) = bars.get(&post_id) {
                    pb.set_message(format!("saved {}", path.display()));
                }
            }
            ScrapeEvent::ItemFailed { post_id, url, reason } => {
                let _ = mp.println(format!("[ERR] {post_id} {url}: {reason}"));
            }
            ScrapeEvent::PostFinished { post_id, saved, found } => {
                if let Some(pb) = bars.remove(&post_id) {
                    pb.finish_with_message(format!("saved {saved} / {found}"));
                }
            }
            ScrapeEvent::Info { scope, message } => {
                let _ = mp.println(format!("[INFO] {scope}: {message}"));
            }
        }
    }
}

fn print_summary(report: &RunReport, directory: &std::path::Path) {
    println!();
    println!(
        "Processed {} post(s): {} image(s) saved to {}, {} failed, {} post(s) skipped, {} unsaved.",
        report.processed,
        report.images_saved,
        directory.display(),
        report.images_failed,
        report.skipped,
        report.unsaved,
    );

    if report.incompatible.is_empty() {
        return;
    }
    println!("Links nothing could handle, by domain:");
    for (domain, count) in report.incompatible.sorted() {
        println!("  {domain} : {count}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrape_matches(args: &[&str]) -> ArgMatches {
        let registry = ResolverRegistry::with_defaults();
        let mut argv = vec!["paper-scraper", "scrape", "--listing", "saved.json"];
        argv.extend_from_slice(args);
        let matches = build_cli(&registry).try_get_matches_from(argv).unwrap();
        matches.subcommand_matches("scrape").unwrap().clone()
    }

    #[test]
    fn filter_flags_reach_the_post_filter() {
        let filter = post_filter(&scrape_matches(&["--min-score", "10", "--max-age-days", "30"])).unwrap();
        assert_eq!(filter.min_score, Some(10));
        assert_eq!(filter.max_age, Some(chrono::Duration::days(30)));

        let filter = post_filter(&scrape_matches(&[])).unwrap();
        assert_eq!(filter.min_score, None);
        assert_eq!(filter.max_age, None);
    }

    #[test]
    fn non_numeric_age_is_rejected() {
        assert!(post_filter(&scrape_matches(&["--max-age-days", "a week"])).is_err());
    }
}
