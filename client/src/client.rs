use std::ffi::OsString;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, CommandFactory, Parser};
use commons::rpc::{CallTarget, CallerKind};
use commons::utils::LogUtility;
use log::{error, info};

mod cltctx;
use cltctx::ClientContext;

/// Exercises a greeter endpoint with concurrent SayHello calls.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Base URL of the greeter, scheme://host[:port]
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// Number of concurrent workers
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Sequential calls per worker
    #[arg(long, default_value_t = 1)]
    iterations: usize,

    /// Send hand-built frames over plain HTTP/2 instead of the tonic client
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true"
    )]
    http: bool,

    /// Name to greet
    #[arg(long, default_value = "world")]
    name: String,

    /// Per-call deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Exit with status 1 if any call failed
    #[arg(long)]
    strict: bool,
}

impl Args {
    fn caller_kind(&self) -> CallerKind {
        if self.http {
            CallerKind::Raw
        } else {
            CallerKind::Stack
        }
    }

    fn deadline(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Rewrites single-dash long flags (`-url`, `-http=true`) to their `--` form.
/// Only names that are real long options are touched, so values such as
/// `-bob` pass through.
fn normalize_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let command = Args::command();
    let is_long = |name: &str| command.get_arguments().any(|a| a.get_long() == Some(name));

    args.into_iter()
        .map(|arg| {
            let rewritten = arg.to_str().and_then(|s| {
                let flag = s.strip_prefix('-').filter(|rest| !rest.starts_with('-'))?;
                let name = flag.split('=').next().unwrap_or(flag);
                (name.len() > 1 && is_long(name)).then(|| OsString::from(format!("-{}", s)))
            });
            rewritten.unwrap_or(arg)
        })
        .collect()
}

async fn run(args: Args) -> Result<bool> {
    let target = CallTarget::parse(&args.url)?;
    let kind = args.caller_kind();
    info!("Target {} via {} caller", target, kind);

    let mut client_context = ClientContext::new(target, kind).with_deadline(args.deadline());
    let (report, stats) = client_context
        .benchmark_rpc(args.workers, args.iterations, &args.name)
        .await?;
    stats.print_stats();

    Ok(report.all_succeeded())
}

#[tokio::main]
async fn main() -> ExitCode {
    LogUtility::init();
    let args = Args::parse_from(normalize_flags(std::env::args_os()));
    let strict = args.strict;

    match run(args).await {
        Ok(all_succeeded) if strict && !all_succeeded => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
