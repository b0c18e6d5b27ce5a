use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::{info, LevelFilter};
use prerender_core::{PrerenderConfig, PrerenderStats, PrerenderStrategy, Prerenderer};
use prerender_render::{Document, PageBitmap, RenderBackend, RenderError, RenderResult};
use serde::Serialize;
use simplelog::{Config, WriteLogger};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Synthetic page size in inches
const PAGE_WIDTH_IN: f64 = 2.0;
const PAGE_HEIGHT_IN: f64 = 3.0;

/// Every this many steps the simulated reader jumps back
const JUMP_BACK_EVERY: usize = 7;
const JUMP_BACK_PAGES: usize = 3;

const VIEW_MILLIS: u64 = 250;
const STEP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "prerender-sim")]
#[command(about = "Simulate a reader paging through a document with predictive prerendering")]
pub struct Cli {
    /// Pages in the synthetic document.
    #[arg(long, default_value_t = 50)]
    pages: usize,
    /// Page turns to simulate.
    #[arg(long, default_value_t = 30)]
    steps: usize,
    /// Prediction strategy (conservative, balanced, aggressive).
    #[arg(long)]
    strategy: Option<PrerenderStrategy>,
    /// Worker thread count.
    #[arg(long)]
    workers: Option<usize>,
    /// Cache memory budget in megabytes.
    #[arg(long = "memory-mb")]
    memory_mb: Option<usize>,
    /// Maximum number of cached pages.
    #[arg(long = "cache-items")]
    cache_items: Option<usize>,
    /// TOML configuration file; PRERENDER_* variables are used otherwise.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print statistics as JSON.
    #[arg(long)]
    json: bool,
    /// Log to stderr (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Serialize)]
struct SimulationOutput {
    pages: usize,
    steps: usize,
    view_hits: usize,
    view_misses: usize,
    shutdown: ShutdownOutput,
    stats: PrerenderStats,
}

#[derive(Debug, Serialize)]
struct ShutdownOutput {
    joined: usize,
    forced: usize,
}

/// A document of identical synthetic pages
struct SyntheticDocument {
    pages: usize,
}

impl Document for SyntheticDocument {
    fn page_count(&self) -> usize {
        self.pages
    }
}

/// Fills each page with a shade derived from its index
struct SyntheticBackend;

impl RenderBackend for SyntheticBackend {
    fn render(
        &self,
        document: &dyn Document,
        page: usize,
        dpi_x: f64,
        dpi_y: f64,
    ) -> RenderResult<PageBitmap> {
        if page >= document.page_count() {
            return Err(RenderError::PageOutOfRange {
                page,
                page_count: document.page_count(),
            });
        }

        let width = (PAGE_WIDTH_IN * dpi_x).round() as u32;
        let height = (PAGE_HEIGHT_IN * dpi_y).round() as u32;
        let shade = 255 - (page % 128) as u8;

        Ok(PageBitmap::from_pixel(width, height, image::Rgba([shade, shade, shade, 255])))
    }
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    init_logging(cli.verbose)?;

    if cli.pages == 0 {
        anyhow::bail!("--pages must be >= 1");
    }

    let config = load_config(&cli)?;
    let output = simulate(&cli, config)?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output)?;
        println!("{json}");
    } else {
        print_summary(&output);
    }

    Ok(())
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => return Ok(()),
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    WriteLogger::init(level, Config::default(), std::io::stderr())
        .context("failed to initialise logging")
}

fn load_config(cli: &Cli) -> Result<PrerenderConfig> {
    let mut config = match &cli.config {
        Some(path) => PrerenderConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PrerenderConfig::from_env().context("invalid PRERENDER_* environment")?,
    };

    if let Some(strategy) = cli.strategy {
        config = config.with_strategy(strategy);
    }
    if let Some(workers) = cli.workers {
        config = config.with_max_worker_threads(workers);
    }
    if let Some(memory_mb) = cli.memory_mb {
        config = config.with_max_memory_mb(memory_mb);
    }
    if let Some(cache_items) = cli.cache_items {
        if cache_items == 0 {
            anyhow::bail!("--cache-items must be >= 1");
        }
        config = config.with_max_cache_items(cache_items);
    }

    // Each step waits for its renders, so the debounce only adds latency
    Ok(config.with_scroll_debounce(Duration::ZERO))
}

fn simulate(cli: &Cli, config: PrerenderConfig) -> Result<SimulationOutput> {
    let mut prerenderer = Prerenderer::new(Arc::new(SyntheticBackend), config);
    prerenderer.set_document(Some(Arc::new(SyntheticDocument { pages: cli.pages })));
    prerenderer.start().context("failed to start prerender workers")?;

    info!("Simulating {} steps over {} pages", cli.steps, cli.pages);

    let last_page = cli.pages - 1;
    let mut page = 0;
    let mut view_hits = 0;
    let mut view_misses = 0;

    prerenderer.render_page_now(page, 1.0, 0).context("failed to render first page")?;
    prerenderer.on_page_viewed(page, VIEW_MILLIS);

    for step in 1..=cli.steps {
        let next = if step % JUMP_BACK_EVERY == 0 {
            page.saturating_sub(JUMP_BACK_PAGES)
        } else {
            (page + 1).min(last_page)
        };

        prerenderer.on_scroll_direction_changed(direction(page, next));
        prerenderer.on_navigation(page, next);

        if prerenderer.has_prerendered_page(next, 1.0, 0) {
            view_hits += 1;
        } else {
            view_misses += 1;
        }
        prerenderer
            .render_page_now(next, 1.0, 0)
            .with_context(|| format!("failed to render page {next}"))?;
        prerenderer.on_page_viewed(next, VIEW_MILLIS);

        prerenderer.schedule_prerendering(next);
        prerenderer.wait_for_completions(STEP_TIMEOUT);

        page = next;
    }

    let report = prerenderer.stop();
    let stats = prerenderer.stats();

    Ok(SimulationOutput {
        pages: cli.pages,
        steps: cli.steps,
        view_hits,
        view_misses,
        shutdown: ShutdownOutput {
            joined: report.joined,
            forced: report.forced,
        },
        stats,
    })
}

fn direction(from: usize, to: usize) -> i32 {
    match to.cmp(&from) {
        std::cmp::Ordering::Greater => 1,
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
    }
}

fn print_summary(output: &SimulationOutput) {
    let stats = &output.stats;

    println!("pages:            {}", output.pages);
    println!("steps:            {}", output.steps);
    println!("strategy:         {}", stats.strategy);
    println!("workers:          {}", stats.workers);
    println!("view hits:        {}", output.view_hits);
    println!("view misses:      {}", output.view_misses);
    println!("rendered:         {}", stats.rendered);
    println!("failed:           {}", stats.failed);
    println!("cached pages:     {}/{}", stats.cache_items, stats.max_items);
    println!("cache memory:     {}/{} bytes", stats.memory_used, stats.memory_limit);
    println!("evictions:        {}", stats.evictions);
    println!("hit ratio:        {:.3}", stats.hit_ratio);
    println!("lookahead radius: {}", stats.lookahead_radius);
    println!(
        "shutdown:         {} joined, {} forced",
        output.shutdown.joined, output.shutdown.forced
    );
}
