use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use std::fs::File;
use std::io::{self, BufWriter};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trawl_core::report::generate_run_report;
use trawl_core::{
    Archive, ConfigOverrides, ExtractOptions, FeedCache, FeedSource, FeedTarget, JsonLinesSink,
    LinkSource, MessageStream, RunSummary, SelectorParser, Session, SetSource, Sink, TrawlConfig,
    WarnOnce, execute_extraction,
};
use url::Url;

/// Warned about once per process, however many sets a command walks.
static ANONYMOUS_SESSION: WarnOnce = WarnOnce::new();

/// Default log filter for a `-v` count, used when `RUST_LOG` is unset.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

pub fn init_tracing(verbosity: u8) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(verbosity).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn flag(args: &ArgMatches, id: &str) -> bool {
    args.try_get_one::<bool>(id).ok().flatten().copied().unwrap_or(false)
}

/// Collects the command-line values that override the config file.
///
/// Flags that are absent leave the file's value alone.
pub fn overrides_from_args(args: &ArgMatches) -> ConfigOverrides {
    let lang = args
        .try_get_many::<String>("lang")
        .ok()
        .flatten()
        .map(|values| values.cloned().collect::<Vec<_>>());
    let expand_related = flag(args, "followups")
        || args.try_get_one::<String>("related").ok().flatten().is_some();

    ConfigOverrides {
        max_transient_retries: args.try_get_one::<u32>("retries").ok().flatten().copied(),
        transient_retry_delay: args.try_get_one::<f64>("retry-delay").ok().flatten().copied(),
        expand_related: expand_related.then_some(true),
        archive: args.try_get_one::<String>("archive").ok().flatten().cloned(),
        lang,
        metadata: flag(args, "metadata").then_some(true),
        reverse: flag(args, "reverse").then_some(true),
    }
}

pub fn load_config(args: &ArgMatches) -> Result<TrawlConfig> {
    let path = args.try_get_one::<String>("config").ok().flatten();
    let overrides = overrides_from_args(args);
    TrawlConfig::load(path.map(String::as_str), Some(&overrides)).context("Failed to load configuration")
}

/// Splits a set argument into the set id and an optional item to resume from.
///
/// Accepts a bare set id, a set URL (`.../media/set/?set=ID`) or a photo URL
/// (`.../photo/?fbid=NODE&set=ID`).
pub fn parse_set_target(arg: &str) -> Result<(String, Option<String>)> {
    let arg = arg.trim();
    if !arg.contains("://") {
        if arg.is_empty() {
            bail!("empty set id");
        }
        return Ok((arg.to_string(), None));
    }

    let url = Url::parse(arg).with_context(|| format!("Invalid set URL {}", arg))?;
    let mut set = None;
    let mut node = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "set" => set = Some(value.to_string()),
            "fbid" => node = Some(value.to_string()),
            _ => {}
        }
    }
    match set.filter(|s| !s.is_empty()) {
        Some(set) => Ok((set, node.filter(|n| !n.is_empty()))),
        None => bail!("No set id in {}", arg),
    }
}

/// Reads a feed argument: an id, or a `/title/ID`, `/manga/ID` or `/chapter/ID` URL.
pub fn parse_feed_target(arg: &str, bare_is_chapter: bool) -> Result<FeedTarget> {
    let arg = arg.trim();
    if !arg.contains("://") {
        if arg.is_empty() || arg.contains('/') {
            bail!("Invalid feed id {:?}", arg);
        }
        return Ok(if bare_is_chapter {
            FeedTarget::Chapter(arg.to_string())
        } else {
            FeedTarget::Series(arg.to_string())
        });
    }

    let url = Url::parse(arg).with_context(|| format!("Invalid feed URL {}", arg))?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.collect())
        .unwrap_or_default();
    for pair in segments.windows(2) {
        match (pair[0], pair[1]) {
            (_, "") => {}
            ("title" | "manga", id) => return Ok(FeedTarget::Series(id.to_string())),
            ("chapter", id) => return Ok(FeedTarget::Chapter(id.to_string())),
            _ => {}
        }
    }
    bail!("No series or chapter id in {}", arg)
}

/// JSON lines to `output`, or stdout.
pub fn open_sink(output: Option<&str>) -> Result<Box<dyn Sink>> {
    match output {
        Some(path) => {
            let expanded = trawl_core::config::expand_path(path);
            let file = File::create(&expanded)
                .with_context(|| format!("Failed to create {}", expanded.display()))?;
            Ok(Box::new(JsonLinesSink::new(BufWriter::new(file))))
        }
        None => Ok(Box::new(JsonLinesSink::new(io::stdout()))),
    }
}

fn open_archive(config: &TrawlConfig) -> Result<Option<Archive>> {
    match config.archive.resolved_path() {
        Some(path) => {
            let archive = Archive::new(&path)
                .with_context(|| format!("Failed to open archive {}", path.display()))?;
            Ok(Some(archive))
        }
        None => Ok(None),
    }
}

async fn run(
    stream: MessageStream,
    sink: &mut dyn Sink,
    config: &TrawlConfig,
    category: &str,
    quiet: bool,
) -> Result<RunSummary> {
    let options = ExtractOptions {
        category: category.to_string(),
        archive: open_archive(config)?,
        show_progress_bars: !quiet,
    };
    let summary = execute_extraction(stream, sink, options, None).await?;
    if !quiet {
        eprint!("{}", generate_run_report(&summary));
    }
    Ok(summary)
}

pub async fn handle_set(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let quiet = flag(args, "quiet");
    let start_at = args.get_one::<String>("start-at").cloned();
    let targets = args
        .get_many::<String>("SET")
        .map(|values| values.cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    let session = Session::from_config(&config.session, &config.set.root)?;
    let client = config.extractor.client(Some(&session), None)?;
    let options = config.extractor.traversal_options()?;
    let mut sink = open_sink(args.get_one::<String>("output").map(String::as_str))?;

    for target in targets {
        let (set_id, resume_from) = parse_set_target(&target)?;
        info!("Walking set {}", set_id);
        session.check_login(config.set.session_cookie.as_deref(), &ANONYMOUS_SESSION);

        let source = SetSource::new(client.clone(), &config.set, set_id)
            .with_start_at(start_at.clone().or(resume_from))
            .with_options(options.clone());
        run(source.into_stream(), sink.as_mut(), &config, "set", quiet).await?;
    }
    Ok(())
}

pub async fn handle_links(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let quiet = flag(args, "quiet");
    let seed = args
        .get_one::<Url>("URL")
        .context("A start URL is required")?
        .to_string();
    let media = args
        .get_one::<String>("media")
        .context("A media selector is required")?;

    let mut parser = SelectorParser::new(&seed, media)?;
    if let Some(next) = args.get_one::<String>("next") {
        parser = parser.with_next(next)?;
    }
    if let Some(related) = args.get_one::<String>("related") {
        parser = parser.with_related(related)?;
    }

    let session = Session::from_config(&config.session, &seed)?;
    let client = config.extractor.client(Some(&session), None)?;
    let source = LinkSource::new(client, &seed, parser)?
        .with_options(config.extractor.traversal_options()?);

    let mut sink = open_sink(args.get_one::<String>("output").map(String::as_str))?;
    run(source.into_stream(), sink.as_mut(), &config, "links", quiet).await?;
    Ok(())
}

pub async fn handle_feed(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let quiet = flag(args, "quiet");
    let bare_is_chapter = flag(args, "chapter");
    let targets = args
        .get_many::<String>("TARGET")
        .map(|values| values.cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    let client = config
        .extractor
        .client(None, Some(config.feed.rate_limit_header.as_str()))?;
    let cache = FeedCache::shared();
    let mut sink = open_sink(args.get_one::<String>("output").map(String::as_str))?;

    for target in targets {
        let target = parse_feed_target(&target, bare_is_chapter)?;
        info!("Reading feed {:?}", target);
        let source =
            FeedSource::new(client.clone(), &config.feed, target).with_cache(cache.clone());
        run(source.into_stream(), sink.as_mut(), &config, "feed", quiet).await?;
    }
    Ok(())
}
