//! api-probe: 通过弹性客户端发起请求并打印调用统计的命令行工具
//!
//! Usage:
//!   api-probe get <url> [--base-url <url>] [--repeat <n>] [--no-cache] [--config <file>]
//!   api-probe version

use anyhow::{bail, Context};
use futures::future::join_all;
use resilient_api_client::{ApiClientBuilder, ClientConfig, RequestOptions, ResponseBody};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "get" => cmd_get(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("api-probe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"api-probe: resilient API client probe

USAGE:
    api-probe <COMMAND> [OPTIONS]

COMMANDS:
    get <url>                   Issue a GET and print the response with call stats
    version                     Show version information
    help                        Show this help message

OPTIONS (get):
    --base-url <url>            Base URL for relative paths
    --repeat <n>                Issue <n> concurrent identical requests (default 1)
    --no-cache                  Bypass the response cache
    --config <file>             Load client configuration from a YAML file

ENVIRONMENT:
    API_CLIENT_*                Configuration overrides (see ClientConfig)
    RUST_LOG                    Log filter, e.g. resilient_api_client=debug"#
    );
}

#[derive(Debug, Default)]
struct GetArgs {
    url: Option<String>,
    base_url: Option<String>,
    repeat: usize,
    no_cache: bool,
    config: Option<String>,
}

fn parse_get_args(args: &[String]) -> anyhow::Result<GetArgs> {
    let mut parsed = GetArgs {
        repeat: 1,
        ..GetArgs::default()
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--base-url" => {
                parsed.base_url = Some(iter.next().context("--base-url needs a value")?.clone())
            }
            "--config" => parsed.config = Some(iter.next().context("--config needs a value")?.clone()),
            "--repeat" => {
                let raw = iter.next().context("--repeat needs a value")?;
                parsed.repeat = raw
                    .parse()
                    .with_context(|| format!("invalid --repeat value '{raw}'"))?;
            }
            "--no-cache" => parsed.no_cache = true,
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            url => {
                if parsed.url.replace(url.to_string()).is_some() {
                    bail!("only one URL may be given");
                }
            }
        }
    }
    if parsed.repeat == 0 {
        bail!("--repeat must be at least 1");
    }
    Ok(parsed)
}

async fn cmd_get(args: &[String]) -> anyhow::Result<()> {
    let args = parse_get_args(args)?;
    let url = args.url.context("missing <url>")?;

    let config = match args.config {
        Some(ref path) => ClientConfig::from_yaml_file(path)?,
        None => ClientConfig::default(),
    };
    let mut builder = ApiClientBuilder::from_config(config).with_env_overrides();
    if let Some(base) = args.base_url {
        builder = builder.base_url(base);
    }
    let client = builder.build()?;

    let opts = RequestOptions::new().cache(!args.no_cache);
    let calls = (0..args.repeat).map(|_| client.get_with_stats(&url, opts.clone()));
    let results = join_all(calls).await;

    let mut first_body = None;
    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok((resp, stats)) => {
                println!(
                    "#{i} {} {} attempts={} cache_hit={} deduplicated={} {}ms",
                    stats.http_status,
                    stats.url,
                    stats.attempts,
                    stats.cache_hit,
                    stats.deduplicated,
                    stats.duration_ms
                );
                first_body.get_or_insert(resp.body);
            }
            Err(e) => println!("#{i} error [{}] {}", e.code(), e),
        }
    }

    match first_body {
        Some(ResponseBody::Json(v)) => println!("{}", serde_json::to_string_pretty(&v)?),
        Some(ResponseBody::Text(t)) => println!("{t}"),
        Some(ResponseBody::Empty) => println!("<empty body>"),
        None => bail!("all requests failed"),
    }

    let stats = client.cache_stats();
    eprintln!(
        "cache: hits={} misses={} sets={} errors={}",
        stats.hits, stats.misses, stats.sets, stats.errors
    );
    Ok(())
}
