//! `dtl` command-line entry point

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use dtl_artifact::{ManifestReport, RunConfig, RunMode};
use dtl_core::{evaluate_kill_switches, ControlPlaneConfig, MarketContext, MarketStatus, Orchestrator};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn root_arg() -> Arg {
    Arg::new("root")
        .long("root")
        .default_value(".")
        .value_parser(value_parser!(PathBuf))
        .help("Project root holding dtl.toml, config/ and data/")
}

fn cli() -> Command {
    Command::new("dtl")
        .version(dtl_core::VERSION)
        .about("DTL governance control plane")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .about("Execute one eight-step run")
                .arg(root_arg())
                .arg(
                    Arg::new("run-id")
                        .long("run-id")
                        .help("Run id; minted from the clock when absent"),
                )
                .arg(
                    Arg::new("run-ts")
                        .long("run-ts")
                        .requires("run-id")
                        .help("RFC3339 run timestamp with offset, for replays"),
                )
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .default_value("mock")
                        .value_parser(["mock", "live"])
                        .help("Execution mode"),
                )
                .arg(
                    Arg::new("market-status")
                        .long("market-status")
                        .default_value("pre_market")
                        .value_parser(["pre_market", "open", "closed"])
                        .help("Trading session"),
                )
                .arg(
                    Arg::new("asset")
                        .long("asset")
                        .action(ArgAction::Append)
                        .help("Asset to consider; repeatable"),
                ),
        )
        .subcommand(
            Command::new("check-manifest")
                .about("Report every problem in a capability manifest")
                .arg(Arg::new("path").required(true).value_parser(value_parser!(PathBuf))),
        )
        .subcommand(
            Command::new("kill-switches")
                .about("Evaluate kill switches without running anything")
                .arg(root_arg())
                .arg(
                    Arg::new("op")
                        .long("op")
                        .action(ArgAction::Append)
                        .help("Operation to check; defaults to the configured set"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn root(args: &ArgMatches) -> PathBuf {
    args.get_one::<PathBuf>("root").cloned().unwrap_or_else(|| PathBuf::from("."))
}

fn run(args: &ArgMatches) -> anyhow::Result<bool> {
    let config = ControlPlaneConfig::load(root(args))?;
    let mode: RunMode = args
        .get_one::<String>("mode")
        .map_or(Ok(RunMode::Mock), |m| m.parse())?;

    let run = match (args.get_one::<String>("run-id"), args.get_one::<String>("run-ts")) {
        (Some(id), Some(ts)) => RunConfig::new(id.as_str(), ts.as_str(), mode)?,
        (Some(id), None) => RunConfig::new(id.as_str(), RunConfig::mint(mode).run_ts(), mode)?,
        _ => RunConfig::mint(mode),
    };

    let market_status: MarketStatus = args
        .get_one::<String>("market-status")
        .map_or(Ok(MarketStatus::default()), |s| s.parse())?;
    let context = MarketContext {
        market_status,
        available_assets: args
            .get_many::<String>("asset")
            .map(|assets| assets.cloned().collect())
            .unwrap_or_default(),
        routing_stats: None,
    };

    let mut orchestrator = Orchestrator::new(config).context("failed to initialize control plane")?;
    let result = orchestrator.run(&run, context);
    print_json(&result)?;
    Ok(result.success)
}

fn check_manifest(args: &ArgMatches) -> anyhow::Result<bool> {
    let path = args.get_one::<PathBuf>("path").context("path is required")?;
    let report = ManifestReport::inspect_path(path);
    print_json(&report)?;
    Ok(report.valid)
}

fn kill_switches(args: &ArgMatches) -> anyhow::Result<bool> {
    let config = ControlPlaneConfig::load(root(args))?;
    let ops: Vec<String> = args
        .get_many::<String>("op")
        .map_or_else(|| config.requested_operations.clone(), |ops| ops.cloned().collect());
    let result = evaluate_kill_switches(&config, &ops)?;
    print_json(&result)?;
    Ok(result.can_proceed)
}

fn main() {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let outcome = match matches.subcommand() {
        Some(("run", args)) => run(args),
        Some(("check-manifest", args)) => check_manifest(args),
        Some(("kill-switches", args)) => kill_switches(args),
        _ => Ok(false),
    };

    match outcome {
        Ok(ok) => std::process::exit(if ok { 0 } else { 1 }),
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
