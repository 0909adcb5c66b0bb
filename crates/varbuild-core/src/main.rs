//! `varbuild` command-line interface

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use varbuild_core::{
    discover_gpu_devices, BuildMode, Bindings, EngineConfig, FailurePolicy, Orchestrator, Plan,
    PlanState, Planner, Report, SweepSpec,
};
use varbuild_template::Template;

fn cli() -> Command {
    let sweep_args = [
        Arg::new("sweep")
            .long("sweep")
            .short('s')
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Sweep file (.json or .toml)"),
        Arg::new("base-id")
            .long("base-id")
            .default_value("0")
            .value_parser(value_parser!(u64))
            .help("Identity of the first variant"),
        Arg::new("mode")
            .long("mode")
            .value_parser(value_parser!(BuildMode))
            .help("Build every variant in this mode (plain, parallel, profiling)"),
        Arg::new("devices")
            .long("devices")
            .value_delimiter(',')
            .help("Comma-separated device pool"),
        Arg::new("detect-gpus")
            .long("detect-gpus")
            .action(ArgAction::SetTrue)
            .conflicts_with("devices")
            .help("Fill the device pool from nvidia-smi"),
    ];

    Command::new("varbuild")
        .version(varbuild_core::VERSION)
        .about("Build and run every variant of a parameterized source template")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Plan, build, run and check all variants")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .value_parser(value_parser!(PathBuf))
                        .help("Engine configuration (TOML)"),
                )
                .args(sweep_args.clone())
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .short('j')
                        .value_parser(value_parser!(usize))
                        .help("Concurrent build/run pipelines"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_parser(value_parser!(u64))
                        .help("Per-run timeout in milliseconds"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the JSON report to this file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                )
                .arg(
                    Arg::new("resume")
                        .long("resume")
                        .value_parser(value_parser!(PathBuf))
                        .help("Skip variants already recorded in this report"),
                )
                .arg(
                    Arg::new("fail-fast")
                        .long("fail-fast")
                        .action(ArgAction::SetTrue)
                        .help("Cancel the run at the first failure"),
                )
                .arg(
                    Arg::new("retain")
                        .long("retain")
                        .action(ArgAction::SetTrue)
                        .help("Keep variant directories"),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about("Print the planned variants as JSON")
                .args(sweep_args),
        )
        .subcommand(
            Command::new("render")
                .about("Render a template to stdout")
                .arg(
                    Arg::new("template")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Template file"),
                )
                .arg(
                    Arg::new("set")
                        .long("set")
                        .action(ArgAction::Append)
                        .help("Binding NAME=VALUE"),
                ),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "varbuild=info,varbuild_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("plan", args)) => {
            let plan = plan(args).await?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(ExitCode::SUCCESS)
        }
        Some(("render", args)) => render(args),
        _ => Ok(ExitCode::FAILURE),
    }
}

async fn plan(args: &ArgMatches) -> anyhow::Result<Plan> {
    let sweep_path = args
        .get_one::<PathBuf>("sweep")
        .context("--sweep is required")?;
    let mut sweep = SweepSpec::load(sweep_path)
        .with_context(|| format!("loading sweep {}", sweep_path.display()))?;
    if let Some(mode) = args.get_one::<BuildMode>("mode") {
        sweep.modes = vec![*mode];
    }

    let devices = if args.get_flag("detect-gpus") {
        discover_gpu_devices().await
    } else {
        args.get_many::<String>("devices")
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    };
    let base_id = args.get_one::<u64>("base-id").copied().unwrap_or(0);

    let mut planner = Planner::new(PlanState::new(base_id).with_devices(devices));
    Ok(planner.plan(&sweep)?)
}

async fn run(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(workers) = args.get_one::<usize>("workers") {
        config.workers = *workers;
    }
    if let Some(timeout) = args.get_one::<u64>("timeout") {
        config = config.with_run_timeout(Duration::from_millis(*timeout));
    }
    if args.get_flag("fail-fast") {
        config.failure_policy = FailurePolicy::FailFast;
    }
    if args.get_flag("retain") {
        config.retain_workspaces = true;
    }
    config.validate()?;

    let plan = plan(args).await?;
    let previous = args
        .get_one::<PathBuf>("resume")
        .map(|path| {
            Report::load(path).with_context(|| format!("loading report {}", path.display()))
        })
        .transpose()?;

    let orchestrator = Orchestrator::new(config);
    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let report = match &previous {
        Some(previous) => orchestrator.resume(plan, previous).await?,
        None => orchestrator.run(plan).await?,
    };

    if let Some(path) = args.get_one::<PathBuf>("output") {
        report
            .save(path)
            .with_context(|| format!("writing report {}", path.display()))?;
    }
    if args.get_flag("json") {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_text());
    }

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn render(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let path = args
        .get_one::<PathBuf>("template")
        .context("template path is required")?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading template {}", path.display()))?;

    let mut bindings = Bindings::new();
    for pair in args.get_many::<String>("set").into_iter().flatten() {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("binding {pair:?} is not NAME=VALUE");
        };
        bindings.insert(name.trim().to_string(), value.to_string());
    }

    let template = Template::parse(text)?;
    print!("{}", template.render(&bindings)?);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn run_arguments_parse() {
        let matches = cli()
            .try_get_matches_from([
                "varbuild", "run", "-s", "sweep.json", "-j", "3", "--mode", "profiling",
                "--devices", "0,1",
            ])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "run");
        assert_eq!(args.get_one::<usize>("workers"), Some(&3));
        assert_eq!(args.get_one::<BuildMode>("mode"), Some(&BuildMode::Profiling));
        let devices: Vec<&String> = args.get_many::<String>("devices").unwrap().collect();
        assert_eq!(devices, ["0", "1"]);
    }

    #[test]
    fn detect_gpus_conflicts_with_devices() {
        let result = cli().try_get_matches_from([
            "varbuild", "plan", "-s", "s.json", "--devices", "0", "--detect-gpus",
        ]);
        assert!(result.is_err());
    }
}
