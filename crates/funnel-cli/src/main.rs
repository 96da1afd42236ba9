//! `funnel`: inspect slice keys, retrieval plans and stored parameter files.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Arg, ArgAction, ArgMatches, Command};
use funnel_cache::ParameterFile;
use funnel_retrieval::{plan_retrieval, FileRegistry, FsFileRegistry, RetrievalConfig};
use funnel_slice::{canonicalize, parse_uk_date, QueryShape};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let reference_date = Arg::new("reference-date")
        .long("reference-date")
        .value_name("D-MMM-YY")
        .help("Date treated as today (default: current UTC date)");
    let registry = Arg::new("registry")
        .long("registry")
        .required(true)
        .value_name("DIR")
        .help("Directory of parameter files");
    let param = Arg::new("param")
        .long("param")
        .required(true)
        .value_name("ID")
        .help("Parameter id");

    Command::new("funnel")
        .version(funnel_retrieval::VERSION)
        .about("Incremental retrieval cache for funnel parameters")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("FILE")
                .help("TOML retrieval configuration"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("key")
                .about("Print the canonical slice key of a DSL")
                .arg(Arg::new("dsl").required(true).help("Slice DSL"))
                .arg(reference_date.clone()),
        )
        .subcommand(
            Command::new("plan")
                .about("Show what a retrieval would fetch, without fetching")
                .arg(registry.clone())
                .arg(param.clone())
                .arg(
                    Arg::new("dsl")
                        .long("dsl")
                        .required(true)
                        .help("Slice DSL"),
                )
                .arg(
                    Arg::new("events")
                        .long("events")
                        .value_delimiter(',')
                        .help("Funnel events, hashed into the query signature"),
                )
                .arg(reference_date),
        )
        .subcommand(
            Command::new("check")
                .about("Verify the invariants of a stored parameter file")
                .arg(registry)
                .arg(param),
        )
}

fn init_logging(json: bool) {
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

fn reference_date(args: &ArgMatches) -> Result<NaiveDate> {
    match args.get_one::<String>("reference-date") {
        Some(text) => parse_uk_date(text).with_context(|| format!("bad --reference-date {text:?}")),
        None => Ok(Utc::now().date_naive()),
    }
}

async fn load_config(matches: &ArgMatches) -> Result<RetrievalConfig> {
    match matches.get_one::<String>("config") {
        Some(path) => Ok(RetrievalConfig::load(path).await?),
        None => Ok(RetrievalConfig::default()),
    }
}

async fn open_registry(args: &ArgMatches) -> Result<(FsFileRegistry, String)> {
    let root = args
        .get_one::<String>("registry")
        .context("--registry is required")?;
    let param = args
        .get_one::<String>("param")
        .context("--param is required")?;
    let registry = FsFileRegistry::new(root);
    registry.open().await?;
    Ok((registry, param.clone()))
}

fn key(args: &ArgMatches) -> Result<()> {
    let dsl = args.get_one::<String>("dsl").context("missing DSL")?;
    let canonical = canonicalize(dsl, reference_date(args)?)?;
    println!("{}", serde_json::to_string_pretty(&canonical)?);
    Ok(())
}

async fn plan(args: &ArgMatches, config: &RetrievalConfig) -> Result<()> {
    let (registry, param) = open_registry(args).await?;
    let dsl = args.get_one::<String>("dsl").context("--dsl is required")?;
    let file = registry
        .get_file(&param)
        .await?
        .unwrap_or_else(|| ParameterFile::new(param.as_str()));
    let shape = args
        .get_many::<String>("events")
        .map(|events| QueryShape::new(events.cloned()));

    let plan = plan_retrieval(&file, dsl, shape.as_ref(), reference_date(args)?, &config.maturity)?;
    tracing::debug!(param = %param, gaps = plan.gaps.len(), "Planned");
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn check(args: &ArgMatches) -> Result<()> {
    let (registry, param) = open_registry(args).await?;
    let Some(file) = registry.get_file(&param).await? else {
        bail!("parameter file {param:?} not found");
    };
    file.check_invariants()
        .with_context(|| format!("parameter file {param:?} is inconsistent"))?;
    println!(
        "{param}: ok ({} slices, {} days)",
        file.values.len(),
        file.all_dates().len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("log-json"));
    let config = load_config(&matches).await?;

    match matches.subcommand() {
        Some(("key", args)) => key(args),
        Some(("plan", args)) => plan(args, &config).await,
        Some(("check", args)) => check(args).await,
        _ => unreachable!("subcommand is required"),
    }
}
