use clap::{App, Arg, ArgMatches};
use log::{error, info};
use sheaf::build::build_site;
use sheaf::config::{parse_locale, Config};
use std::error::Error;
use std::path::PathBuf;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("POSTS_DIR")
                .help("The directory of .markdown posts (and optional META.yaml)")
                .default_value("posts")
                .index(1),
        )
        .arg(
            Arg::with_name("templates-dir")
                .short("t")
                .long("templates-dir")
                .value_name("DIR")
                .help("Where post.html, index.html and tagged.html live")
                .takes_value(true)
                .default_value("templates"),
        )
        .arg(
            Arg::with_name("static-dir")
                .short("s")
                .long("static-dir")
                .value_name("DIR")
                .help("Copied into the output directory as is")
                .takes_value(true)
                .default_value("static"),
        )
        .arg(
            Arg::with_name("out-dir")
                .short("o")
                .long("out-dir")
                .value_name("DIR")
                .help("Where the site is written")
                .takes_value(true)
                .default_value("pub"),
        )
        .arg(
            Arg::with_name("drafts")
                .short("d")
                .long("drafts")
                .help("Include undated and future posts, flagged as drafts"),
        )
        .arg(
            Arg::with_name("as-of")
                .long("as-of")
                .value_name("RFC3339")
                .help("Publish posts dated up to this time instead of now")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("page-size")
                .long("page-size")
                .value_name("N")
                .help("Entries per feed page, overriding META.yaml")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("locale")
                .long("locale")
                .value_name("LOCALE")
                .help("Locale for month names, such as fr_FR")
                .takes_value(true)
                .default_value("C"),
        )
        .get_matches();

    if let Err(err) = run(&matches) {
        error!("{}", err);
        std::process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let path = |name: &str| PathBuf::from(matches.value_of(name).unwrap_or_default());

    let now = match matches.value_of("as-of") {
        Some(as_of) => Some(
            chrono::DateTime::parse_from_rfc3339(as_of)
                .map_err(|err| format!("Invalid --as-of {:?}: {}", as_of, err))?,
        ),
        None => None,
    };
    let page_size = match matches.value_of("page-size") {
        Some(n) => match n.parse::<usize>() {
            Ok(n) if n > 0 => Some(n),
            _ => return Err(format!("Invalid --page-size {:?}: expected a positive integer", n).into()),
        },
        None => None,
    };

    let config = Config {
        posts_directory: path("POSTS_DIR"),
        templates_directory: path("templates-dir"),
        static_directory: Some(path("static-dir")),
        output_directory: path("out-dir"),
        include_drafts: matches.is_present("drafts"),
        now,
        page_size,
        locale: parse_locale(matches.value_of("locale").unwrap_or("C"))?,
    };
    let summary = build_site(&config)?;
    info!(
        "built {} post(s), {} tag page(s) and {} feed page(s) in {}",
        summary.posts,
        summary.tag_pages,
        summary.feed_pages,
        config.output_directory.display()
    );
    Ok(())
}
