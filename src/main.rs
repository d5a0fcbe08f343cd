use annals::archive::MemoryArchive;
use annals::build::{Builder, Outcome};
use annals::config::Config;
use annals::render::GtmplRenderer;
use anyhow::{anyhow, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use std::path::Path;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .setting(AppSettings::ArgRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("build")
                .about("Builds the site into the configured publish directory")
                .arg(
                    Arg::with_name("config")
                        .short("c")
                        .long("config")
                        .takes_value(true)
                        .help("Path to the config file; searched for upward from the current directory by default"),
                )
                .arg(
                    Arg::with_name("archive")
                        .short("a")
                        .long("archive")
                        .takes_value(true)
                        .default_value("archive.yaml")
                        .help("Path to the YAML message archive"),
                )
                .arg(
                    Arg::with_name("symlink")
                        .long("symlink")
                        .help("Link static assets, media, and index.html instead of copying them"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        ("build", Some(matches)) => build(matches),
        (other, _) => Err(anyhow!("Unknown subcommand `{}`", other)),
    }
}

fn build(matches: &ArgMatches) -> Result<()> {
    let mut config = match matches.value_of("config") {
        Some(path) => Config::from_file(Path::new(path))?,
        None => Config::from_directory(&std::env::current_dir()?)?,
    };
    config.symlink = matches.is_present("symlink");

    // `default_value` guarantees presence
    let archive_path = matches.value_of("archive").unwrap_or("archive.yaml");
    let archive = MemoryArchive::from_path(Path::new(archive_path))
        .with_context(|| format!("Loading archive `{}`", archive_path))?;
    let renderer = GtmplRenderer::from_config(&config)?;

    match Builder::new(&config, &archive, &renderer).build()? {
        Outcome::Empty => log::info!("Nothing to publish."),
        Outcome::Built(summary) => log::info!(
            "Published to {}: {} page(s) rendered, {} skipped; {} day counter(s) rendered, {} skipped; {} feed entries",
            config.publish_dir.display(),
            summary.pages_rendered,
            summary.pages_skipped,
            summary.day_counters_rendered,
            summary.day_counters_skipped,
            summary.feed_entries,
        ),
    }
    Ok(())
}
