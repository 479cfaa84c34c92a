//! Markjump - follow in-document links in a markdown file.
//!
//! # Usage
//!
//! ```bash
//! markjump README.md --follow '#installation'
//! markjump --height 30 --header-inset 1 --follow '#usage' --follow '#faq' GUIDE.md
//! markjump --anchors README.md
//! ```

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use markjump::config::{
    ConfigFlags, clear_config_flags, global_config_path, load_config_flags, local_override_path,
    parse_flag_tokens, save_config_flags,
};
use markjump::document::{StyleConfig, prepare_content};
use markjump::link::LinkOutcome;
use markjump::perf;
use markjump::scroll::ScrollStep;
use markjump::session::DocumentView;
use markjump::ui::viewport::Viewport;
use markjump::ui::{DOCUMENT_LEFT_PADDING, visible_text};

const DEFAULT_WIDTH: u16 = 80;
const DEFAULT_HEIGHT: u16 = 24;
const FRAME: Duration = Duration::from_millis(16);

/// Follow in-document links in a markdown file
#[derive(Parser, Debug)]
#[command(name = "markjump", version, about, long_about = None)]
struct Cli {
    /// Markdown file to open
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Activate this href, as if the link were clicked (repeatable)
    #[arg(long, value_name = "HREF")]
    follow: Vec<String>,

    /// Terminal width in columns
    #[arg(long, value_name = "N")]
    width: Option<u16>,

    /// Viewport height in lines
    #[arg(long, value_name = "N")]
    height: Option<u16>,

    /// Lines covered by a fixed header at the top of the viewport
    #[arg(long, value_name = "N")]
    header_inset: Option<u16>,

    /// Render headings without leading `#` markers
    #[arg(long)]
    no_heading_markers: bool,

    /// Print the whole rendered document
    #[arg(long)]
    print: bool,

    /// Print every anchor id with its line as JSON
    #[arg(long)]
    anchors: bool,

    /// Enable performance logging
    #[arg(long)]
    perf: bool,

    /// Write a numbered log of session and scroll events to a file
    #[arg(long, value_name = "PATH")]
    render_debug_log: Option<PathBuf>,

    /// Save current command-line flags as defaults
    #[arg(long)]
    save: bool,

    /// Clear saved defaults
    #[arg(long)]
    clear: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw_args = std::env::args().collect::<Vec<_>>();
    let cli = Cli::parse();
    let global_path = global_config_path();
    let local_path = local_override_path();
    let cli_flags = parse_flag_tokens(&raw_args);

    if cli.clear {
        clear_config_flags(&global_path)?;
    }
    if cli.save {
        save_config_flags(&global_path, &cli_flags)?;
    }

    let file_flags = if cli.clear {
        ConfigFlags::default()
    } else {
        let global_flags = load_config_flags(&global_path)?;
        let local_flags = load_config_flags(&local_path)?;
        global_flags.union(&local_flags)
    };
    let effective = file_flags.union(&cli_flags);

    perf::set_timing(effective.perf);
    let render_debug_log_path = effective
        .render_debug_log
        .clone()
        .or_else(|| std::env::var_os("MARKJUMP_RENDER_DEBUG_LOG").map(PathBuf::from));
    if let Err(err) = perf::set_nav_log(render_debug_log_path.as_deref()) {
        let path = render_debug_log_path
            .as_ref()
            .map_or_else(|| "<unset>".to_string(), |p| p.display().to_string());
        tracing::warn!(%path, %err, "failed to open navigation log");
    }

    if !cli.file.exists() {
        anyhow::bail!("File not found: {}", cli.file.display());
    }
    let raw_bytes = std::fs::read(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;
    let markdown = prepare_content(&cli.file, raw_bytes)?;

    let width = effective.width.unwrap_or(DEFAULT_WIDTH);
    let height = effective.height.unwrap_or(DEFAULT_HEIGHT);
    let style = StyleConfig {
        wrap_width: width.saturating_sub(DOCUMENT_LEFT_PADDING).max(1),
        heading_markers: !effective.no_heading_markers,
        ..StyleConfig::default()
    };
    let base_dir = cli
        .file
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();

    run(&cli, &markdown, &style, base_dir, width, height, effective.header_inset)?;
    if perf::is_timing() {
        perf::report();
    }
    Ok(())
}

fn run(
    cli: &Cli,
    markdown: &str,
    style: &StyleConfig,
    base_dir: PathBuf,
    width: u16,
    height: u16,
    header_inset: Option<u16>,
) -> Result<()> {
    let bus = markjump::bus::EventBus::new();
    let viewport = Viewport::new(width, height, 0).with_header_inset(header_inset.unwrap_or(0));
    let view = Rc::new(std::cell::RefCell::new(viewport));

    let settled = Rc::new(Cell::new(None));
    let report = Rc::clone(&settled);
    bus.subscribe_position_report(move |event| report.set(Some(event.offset)));

    let mut document = DocumentView::new(bus, Rc::clone(&view))
        .with_base_dir(base_dir)
        .with_external_link(|href| println!("external: {href}"));
    let session = document.render(markdown, style)?;

    if cli.anchors {
        let entries = session.anchors().entries(session.tree());
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("Failed to encode anchors")?
        );
    }
    if cli.print {
        for line in session.tree().lines() {
            println!("{}", line.content());
        }
    }

    for href in &cli.follow {
        settled.set(None);
        match document.follow_href(href)? {
            LinkOutcome::Scrolled(target) => {
                let mut now = Instant::now();
                while let ScrollStep::Moving(_) = document.tick(now) {
                    now += FRAME;
                }
                match settled.get() {
                    Some(offset) => println!("{href}: settled at line {offset} ({target})"),
                    None => println!("{href}: {target} is not laid out"),
                }
                if let Some(session) = document.session() {
                    for text in visible_text(session.tree(), &view.borrow()) {
                        println!("{text}");
                    }
                }
            }
            // the external callback already reported it
            LinkOutcome::External => {}
            LinkOutcome::Ignored | LinkOutcome::Inert => println!("{href}: ignored"),
        }
    }

    document.dispose();
    Ok(())
}
