use anyhow::{Context, Result};
use clap::Parser;
use reqwest::redirect::Policy;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use feedmend::config::{is_valid_date_format, Config};
use feedmend::feed::{fetch_cached, parse_feed, ItemField};
use feedmend::render::{render, OutputFormat, RenderOptions};
use feedmend::util::validate_url;

/// Local files and stdin are read up to the same limit as fetched feeds.
const MAX_INPUT_SIZE: u64 = 10 * 1024 * 1024; // 10MB

#[derive(Parser, Debug)]
#[command(
    name = "feedmend",
    version,
    about = "Parse a possibly broken RSS or Atom feed and print a clean transcript"
)]
struct Args {
    /// Feed to read: a file path, `-` for stdin, or an http(s) URL
    source: String,

    /// Config file (default: ~/.config/feedmend/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Render at most N items (0 = all)
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Sort items by field: title, link, content, date, creator, subject, category
    #[arg(long, value_name = "FIELD")]
    sort_by: Option<ItemField>,

    /// Strip HTML tags from item content
    #[arg(long)]
    no_html: bool,

    /// Cut item content after N characters (0 = unlimited)
    #[arg(long = "max-length", value_name = "N")]
    max_length: Option<usize>,

    /// strftime layout for item dates
    #[arg(long, value_name = "LAYOUT")]
    date_format: Option<String>,
}

/// Where the feed document comes from.
#[derive(Debug, PartialEq, Eq)]
enum Source {
    Stdin,
    File(PathBuf),
    Url(String),
}

impl Source {
    fn from_arg(arg: &str) -> Self {
        let lower = arg.to_ascii_lowercase();
        if arg == "-" {
            Source::Stdin
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            Source::Url(arg.to_owned())
        } else {
            Source::File(PathBuf::from(arg))
        }
    }
}

/// Follows at most 3 redirects, refusing loops and internal targets.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }
        if let Err(e) = validate_url(url.as_str()) {
            return attempt.error(e);
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Command-line flags override file settings.
fn merge_options(args: &Args, config: &Config) -> Result<RenderOptions> {
    let mut options = config.render_options()?;
    if let Some(limit) = args.limit {
        options.limit = limit;
    }
    if let Some(field) = args.sort_by {
        options.sort_by = Some(field);
    }
    if args.no_html {
        options.no_html = true;
    }
    if let Some(max) = args.max_length {
        options.max_content_length = max;
    }
    if let Some(layout) = &args.date_format {
        if !is_valid_date_format(layout) {
            anyhow::bail!("Invalid --date-format: {layout:?}");
        }
        options.date_format = layout.clone();
    }
    Ok(options)
}

fn read_limited(reader: impl Read, what: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader
        .take(MAX_INPUT_SIZE + 1)
        .read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read {what}"))?;
    if bytes.len() as u64 > MAX_INPUT_SIZE {
        anyhow::bail!("{what} is larger than {MAX_INPUT_SIZE} bytes");
    }
    Ok(bytes)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open feed file '{}'", path.display()))?;
    read_limited(file, &format!("feed file '{}'", path.display()))
}

async fn read_source(source: &Source, config: &Config) -> Result<Vec<u8>> {
    match source {
        Source::Stdin => read_limited(std::io::stdin().lock(), "standard input"),
        Source::File(path) => read_file(path),
        Source::Url(raw) => {
            let url = validate_url(raw).with_context(|| format!("Refusing to fetch '{raw}'"))?;
            let client = reqwest::Client::builder()
                .redirect(create_redirect_policy())
                .user_agent(concat!("feedmend/", env!("CARGO_PKG_VERSION")))
                .build()?;
            let fetched = fetch_cached(&client, url.as_str(), &config.cache_dir())
                .await
                .with_context(|| format!("Failed to fetch '{url}'"))?;
            Ok(fetched.into_bytes())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never mix with rendered output
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_path().context("HOME environment variable not set")?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;

    let options = merge_options(&args, &config)?;
    let format = args.format.unwrap_or(config.format);

    let source = Source::from_arg(&args.source);
    let bytes = read_source(&source, &config).await?;
    let feed = parse_feed(&bytes)
        .with_context(|| format!("Failed to parse feed from '{}'", args.source))?;

    let output = render(&feed, format, &options).context("Failed to render feed")?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        writeln!(stdout)?;
    }
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_classification() {
        assert_eq!(Source::from_arg("-"), Source::Stdin);
        assert_eq!(
            Source::from_arg("https://example.com/feed"),
            Source::Url("https://example.com/feed".into())
        );
        assert_eq!(
            Source::from_arg("HTTP://example.com/feed"),
            Source::Url("HTTP://example.com/feed".into())
        );
        assert_eq!(
            Source::from_arg("feeds/local.xml"),
            Source::File(PathBuf::from("feeds/local.xml"))
        );
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "feedmend",
            "--limit",
            "2",
            "--sort-by",
            "title",
            "--no-html",
            "--max-length",
            "80",
            "feed.xml",
        ]);
        let config = Config::from_toml("limit = 10\nsort_by = \"date\"\n").unwrap();
        let options = merge_options(&args, &config).unwrap();
        assert_eq!(options.limit, 2);
        assert_eq!(options.sort_by, Some(ItemField::Title));
        assert!(options.no_html);
        assert_eq!(options.max_content_length, 80);
    }

    #[test]
    fn test_unknown_sort_flag_rejected() {
        assert!(Args::try_parse_from(["feedmend", "--sort-by", "pubdate", "f.xml"]).is_err());
    }

    #[test]
    fn test_invalid_date_format_flag_rejected() {
        let args = Args::parse_from(["feedmend", "--date-format", "%Q", "f.xml"]);
        assert!(merge_options(&args, &Config::default()).is_err());
    }

    #[test]
    fn test_read_limited_rejects_oversized_input() {
        let big = vec![b'x'; MAX_INPUT_SIZE as usize + 1];
        assert!(read_limited(big.as_slice(), "input").is_err());
        assert_eq!(read_limited(&b"<rss/>"[..], "input").unwrap(), b"<rss/>");
    }
}
