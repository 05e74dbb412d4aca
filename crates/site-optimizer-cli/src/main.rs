//! site-optimizer — entry point.

use std::path::Path;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use site_optimizer::{
    forward, FetchConfig, FetchOptions, FetchOutcome, FetchRequest, LogSink, Method, Metric,
    PagePlan, RetryingFetcher,
};

#[derive(Parser)]
#[command(
    name = "site-optimizer",
    about = "Site optimizer — retrying JSON fetches and page-load plans",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL as JSON, retrying failed attempts.
    ///
    /// Prints the parsed body, or `null` (exit status 1) once every
    /// attempt has failed.
    Fetch {
        url: String,

        /// HTTP method.
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Request header as 'Name: value'. Repeatable.
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body.
        #[arg(short = 'd', long)]
        data: Option<String>,

        /// Retries after the first attempt.
        /// Defaults to SITE_OPTIMIZER_RETRIES, then 3.
        #[arg(long)]
        retries: Option<u32>,

        /// Per-attempt timeout in milliseconds.
        /// Defaults to SITE_OPTIMIZER_TIMEOUT_MS, then 5000.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print the lazy media and deferred script plan of an HTML file as JSON.
    Inspect {
        file: String,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fetch {
            url,
            method,
            headers,
            data,
            retries,
            timeout_ms,
        } => {
            let config = FetchConfig::from_env().with_overrides(retries, timeout_ms);
            let options = build_options(&method, &headers, data)?;
            let request = FetchRequest::new(&url)
                .with_options(options)
                .with_retries(config.retries)
                .with_timeout(config.timeout);

            tracing::info!("{}", describe_request(&request));
            let fetcher = RetryingFetcher::new(config);
            let report = fetcher.run(&request).await;

            forward(
                &LogSink,
                &[
                    Metric::custom("fetch_ms", report.elapsed.as_secs_f64() * 1000.0),
                    Metric::custom("fetch_attempts", f64::from(report.attempts)),
                ],
            );

            match report.outcome {
                FetchOutcome::Parsed(value) => {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                FetchOutcome::Absent => {
                    println!("null");
                    std::process::exit(1);
                }
            }
        }

        Commands::Inspect { file } => {
            let plan = load_plan(Path::new(&file))?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "site-optimizer", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn build_options(
    method: &str,
    headers: &[String],
    data: Option<String>,
) -> anyhow::Result<FetchOptions> {
    let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method: {method}"))?;

    let mut options = FetchOptions::default().with_method(method);
    for raw in headers {
        let (name, value) = parse_header(raw)?;
        options = options.with_header(name, value);
    }
    if let Some(body) = data {
        options = options.with_body(body);
    }
    Ok(options)
}

fn parse_header(raw: &str) -> anyhow::Result<(&str, &str)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("header must look like 'Name: value', got '{raw}'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("header name is empty in '{raw}'");
    }
    Ok((name, value.trim()))
}

fn load_plan(path: &Path) -> anyhow::Result<PagePlan> {
    site_optimizer::init_file(path)
        .with_context(|| format!("failed to read {}", path.display()))
}

/// One-line summary of the resolved request, logged before fetching.
fn describe_request(request: &FetchRequest) -> String {
    format!(
        "{} {} (retries={}, timeout={}ms)",
        request.options.method,
        request.url,
        request.retries,
        request.timeout.as_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Authorization: Bearer x:y").unwrap(),
            ("Authorization", "Bearer x:y")
        );
        assert_eq!(parse_header("X-Empty:").unwrap(), ("X-Empty", ""));
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_build_options() {
        let opts = build_options(
            "post",
            &["Content-Type: application/json".to_string()],
            Some("{}".to_string()),
        )
        .unwrap();
        assert_eq!(opts.method, Method::POST);
        assert_eq!(
            opts.headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );
        assert_eq!(opts.body.as_deref(), Some("{}"));

        assert!(build_options("GE T", &[], None).is_err());
    }

    #[test]
    fn test_describe_request() {
        let request = FetchRequest::new("https://api.example.com/data")
            .with_options(build_options("post", &[], None).unwrap())
            .with_retries(2)
            .with_timeout(std::time::Duration::from_millis(100));
        assert_eq!(
            describe_request(&request),
            "POST https://api.example.com/data (retries=2, timeout=100ms)"
        );
    }

    #[test]
    fn test_load_plan_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"<img data-lazy data-src="/a.png"><script data-defer data-src="/b.js"></script>"#
        )
        .unwrap();

        let plan = load_plan(file.path()).unwrap();
        assert_eq!(plan.lazy_media.len(), 1);
        assert_eq!(plan.deferred_scripts[0].src, "/b.js");
    }

    #[test]
    fn test_load_plan_missing_file() {
        let err = load_plan(Path::new("/definitely/not/here.html")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
        assert!(err.chain().any(|cause| cause.to_string().starts_with("IO error")));
    }
}
