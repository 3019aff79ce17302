use tempfile::TempDir;
use trawl::commands::command_argument_builder;
use trawl::handlers::*;
use trawl_core::FeedTarget;

fn subcommand_args(argv: &[&str]) -> clap::ArgMatches {
    let matches = command_argument_builder()
        .try_get_matches_from(argv)
        .unwrap();
    let (_, args) = matches.subcommand().unwrap();
    args.clone()
}

// ============================================================================
// Target parsing
// ============================================================================

#[test]
fn test_parse_set_target_bare_id() {
    let (set, node) = parse_set_target("a.10150000000000000").unwrap();
    assert_eq!(set, "a.10150000000000000");
    assert_eq!(node, None);
}

#[test]
fn test_parse_set_target_set_url() {
    let (set, node) =
        parse_set_target("https://www.facebook.com/media/set/?set=a.555&type=3").unwrap();
    assert_eq!(set, "a.555");
    assert_eq!(node, None);
}

#[test]
fn test_parse_set_target_photo_url_resumes() {
    let (set, node) =
        parse_set_target("https://www.facebook.com/photo/?fbid=102&set=a.555&setextract").unwrap();
    assert_eq!(set, "a.555");
    assert_eq!(node.as_deref(), Some("102"));
}

#[test]
fn test_parse_set_target_rejects_url_without_set() {
    assert!(parse_set_target("https://www.facebook.com/photo/?fbid=102").is_err());
    assert!(parse_set_target("  ").is_err());
}

#[test]
fn test_parse_feed_target_ids_and_urls() {
    assert_eq!(
        parse_feed_target("f90c4398-8aad-4f51-8a1f-024ca09fdcbc", false).unwrap(),
        FeedTarget::Series("f90c4398-8aad-4f51-8a1f-024ca09fdcbc".to_string())
    );
    assert_eq!(
        parse_feed_target("f946ac53", true).unwrap(),
        FeedTarget::Chapter("f946ac53".to_string())
    );
    assert_eq!(
        parse_feed_target("https://mangadex.org/title/f90c4398/souten-no-koumori", false).unwrap(),
        FeedTarget::Series("f90c4398".to_string())
    );
    assert_eq!(
        parse_feed_target("https://mangadex.cc/manga/d0c88e3b/", false).unwrap(),
        FeedTarget::Series("d0c88e3b".to_string())
    );
    // a chapter URL is a chapter even without --chapter
    assert_eq!(
        parse_feed_target("https://mangadex.org/chapter/f946ac53", false).unwrap(),
        FeedTarget::Chapter("f946ac53".to_string())
    );
}

#[test]
fn test_parse_feed_target_invalid() {
    assert!(parse_feed_target("https://mangadex.org/about", false).is_err());
    assert!(parse_feed_target("a/b", false).is_err());
    assert!(parse_feed_target("", false).is_err());
}

// ============================================================================
// Command line
// ============================================================================

#[test]
fn test_default_filter_by_verbosity() {
    assert_eq!(default_filter(0), "warn");
    assert_eq!(default_filter(1), "info");
    assert_eq!(default_filter(2), "debug");
    assert_eq!(default_filter(9), "trace");
}

#[test]
fn test_overrides_absent_flags_leave_file_values() {
    let args = subcommand_args(&["trawl", "set", "a.555"]);
    let overrides = overrides_from_args(&args);

    assert_eq!(overrides.max_transient_retries, None);
    assert_eq!(overrides.transient_retry_delay, None);
    assert_eq!(overrides.expand_related, None);
    assert_eq!(overrides.archive, None);
    assert_eq!(overrides.lang, None);
}

#[test]
fn test_overrides_from_global_and_subcommand_flags() {
    let args = subcommand_args(&[
        "trawl",
        "set",
        "a.555",
        "--followups",
        "--retries",
        "0",
        "--retry-delay",
        "1.5",
        "--archive",
        "/tmp/archive.sqlite3",
    ]);
    let overrides = overrides_from_args(&args);

    assert_eq!(overrides.max_transient_retries, Some(0));
    assert_eq!(overrides.transient_retry_delay, Some(1.5));
    assert_eq!(overrides.expand_related, Some(true));
    assert_eq!(overrides.archive.as_deref(), Some("/tmp/archive.sqlite3"));
}

#[test]
fn test_feed_language_list() {
    let args = subcommand_args(&["trawl", "feed", "m1", "--lang", "en,pt-br", "--reverse"]);
    let overrides = overrides_from_args(&args);

    assert_eq!(
        overrides.lang,
        Some(vec!["en".to_string(), "pt-br".to_string()])
    );
    assert_eq!(overrides.reverse, Some(true));
    assert_eq!(overrides.metadata, None);
}

#[test]
fn test_links_related_selector_turns_on_expansion() {
    let args = subcommand_args(&[
        "trawl",
        "links",
        "https://example.com/g/1.html",
        "--media",
        "img.main",
        "--related",
        "a.more",
    ]);
    assert_eq!(overrides_from_args(&args).expand_related, Some(true));
}

#[test]
fn test_links_requires_media_selector() {
    let result =
        command_argument_builder().try_get_matches_from(["trawl", "links", "https://example.com/"]);
    assert!(result.is_err());
}

#[test]
fn test_load_config_applies_file_then_flags() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let file = dir.path().join("config.toml");
    std::fs::write(
        &file,
        "[extractor]\nmax-transient-retries = 5\nexpand-related = true\n",
    )?;
    let path = file.to_string_lossy().to_string();

    let args = subcommand_args(&["trawl", "--config", &path, "set", "a.555", "--retries", "1"]);
    let config = load_config(&args)?;

    assert_eq!(config.extractor.max_transient_retries, 1);
    assert!(config.extractor.expand_related);

    Ok(())
}

#[test]
fn test_open_sink_creates_output_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("out.jsonl");
    let path_str = path.to_string_lossy().to_string();

    let mut sink = open_sink(Some(&path_str))?;
    sink.flush()?;
    assert!(path.exists());

    Ok(())
}
