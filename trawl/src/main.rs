use colored::Colorize;
use trawl::commands::command_argument_builder;
use trawl::handlers::{handle_feed, handle_links, handle_set, init_tracing};
use trawl_core::CoreError;
use trawl_core::print_banner;
use trawl_core::report::generate_abort_report;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();

    let Some((name, primary_command)) = chosen_command.subcommand() else {
        // No subcommand provided, just show the banner
        print_banner();
        return;
    };

    if !primary_command.get_flag("quiet") {
        print_banner();
    }
    init_tracing(primary_command.get_count("verbose"));

    let result = match name {
        "set" => handle_set(primary_command).await,
        "links" => handle_links(primary_command).await,
        "feed" => handle_feed(primary_command).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        match e.downcast_ref::<CoreError>() {
            Some(core) => eprint!("{}", generate_abort_report(core)),
            None => eprintln!("{} {:#}", "[!]".red().bold(), e),
        }
        std::process::exit(1);
    }
}
