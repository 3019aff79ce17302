use clap::{ArgAction, arg, command};

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("trawl")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("trawl")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner, progress and summary output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" ... "More log output; repeat for more detail")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-c --"config" <PATH>)
                .required(false)
                .global(true)
                .help("Configuration file (default ~/.config/trawl/config.toml)"),
        )
        .arg(
            arg!(-o --"output" <PATH>)
                .required(false)
                .global(true)
                .help("Write JSON lines here instead of stdout"),
        )
        .arg(
            arg!(--"archive" <PATH>)
                .required(false)
                .global(true)
                .help("SQLite archive of items written by earlier runs; recorded items are skipped"),
        )
        .arg(
            arg!(--"retries" <N>)
                .required(false)
                .global(true)
                .help("Times a node with a missing media URL is fetched again before it is skipped")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            arg!(--"retry-delay" <SECONDS>)
                .required(false)
                .global(true)
                .help("Seconds to wait before fetching such a node again")
                .value_parser(clap::value_parser!(f64)),
        )
        .subcommand_required(false)
        .subcommand(
            command!("set")
                .about("Walk a media set from its first item through each item's next link")
                .arg(
                    arg!(<SET> ...)
                        .required(true)
                        .help("Set ids or set/photo URLs; photo URLs resume from that photo"),
                )
                .arg(
                    arg!(--"start-at" <NODE>)
                        .required(false)
                        .help("Start from this item instead of the set's first"),
                )
                .arg(
                    arg!(--"followups")
                        .required(false)
                        .help("Also collect photos the author posted in the comments"),
                ),
        )
        .subcommand(
            command!("links")
                .about("Follow a chain of HTML pages, collecting one media element per page")
                .arg(
                    arg!(<URL>)
                        .required(true)
                        .help("The first page")
                        .value_parser(clap::value_parser!(url::Url)),
                )
                .arg(
                    arg!(--"media" <CSS>)
                        .required(true)
                        .help("Selector of the media element (src, data-src, href or content)"),
                )
                .arg(
                    arg!(--"next" <CSS>)
                        .required(false)
                        .help("Selector of the link to the next page"),
                )
                .arg(
                    arg!(--"related" <CSS>)
                        .required(false)
                        .help("Selector of extra pages to visit after the chain"),
                ),
        )
        .subcommand(
            command!("feed")
                .about("Read every chapter of a series feed, or single chapters")
                .arg(
                    arg!(<TARGET> ...)
                        .required(true)
                        .help("Series or chapter ids, or their URLs"),
                )
                .arg(
                    arg!(--"chapter")
                        .required(false)
                        .help("Treat bare ids as chapter ids"),
                )
                .arg(
                    arg!(--"lang" <LANG>)
                        .required(false)
                        .help("Translated languages to keep, comma separated")
                        .value_delimiter(',')
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(--"metadata")
                        .required(false)
                        .help("Resolve author, artist and group names"),
                )
                .arg(
                    arg!(--"reverse")
                        .required(false)
                        .help("Newest chapters first"),
                ),
        )
}
