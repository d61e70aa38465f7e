// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use quoter_app::{CalculationId, Editor};
use quoter_db::Store;
use quoter_sync::{Client, TotalsSync};
use runtime::DbRuntime;
use std::env;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `quoter --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    init_logging(&config.log_path()?, config.log_level())?;

    let store = Store::open(&db_path).with_context(|| {
        format!(
            "open database {} -- if this path is wrong, set [storage].db_path or QUOTER_DB_PATH",
            db_path.display()
        )
    })?;
    store.bootstrap()?;
    let demo_id = if options.demo {
        Some(store.seed_demo_data()?)
    } else {
        None
    };

    let format = config.number_format()?;
    let totals_sync = match config.sync_update_url() {
        Some(update_url) if config.sync_enabled() => {
            let client = Client::new(update_url, config.sync_timeout()?).with_context(|| {
                format!(
                    "invalid [sync] config in {}; fix update_url/timeout values",
                    options.config_path.display()
                )
            })?;
            Some(TotalsSync::new(client, config.sync_debounce()?))
        }
        _ => None,
    };

    let calculation_id = resolve_calculation(&store, options.calculation.or(demo_id))?;
    let calculation = store.get_calculation(calculation_id)?;
    let table = store.load_table(calculation_id)?;
    if options.check_only {
        return Ok(());
    }

    info!(
        calculation_id = calculation_id.get(),
        items = table.item_count(),
        sync = totals_sync.is_some(),
        "opening calculation"
    );
    let mut editor = Editor::new(store.list_categories()?, table, format);
    let mut runtime = DbRuntime::new(&store, calculation_id, totals_sync);
    quoter_tui::run_app(&mut editor, &mut runtime, &calculation.title())
}

fn resolve_calculation(store: &Store, requested: Option<CalculationId>) -> Result<CalculationId> {
    if let Some(id) = requested {
        return Ok(id);
    }
    store
        .list_calculations()?
        .first()
        .map(|calculation| calculation.id)
        .ok_or_else(|| {
            anyhow!("no calculations in the database -- run with --demo or pass --calculation <id>")
        })
}

fn init_logging(path: &Path, level: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {} -- set [log].path", path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|error| anyhow!("initialize logging: {error}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    calculation: Option<CalculationId>,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
        calculation: None,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--calculation" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--calculation requires a calculation id"))?;
                let id: i64 = value.as_ref().parse().with_context(|| {
                    format!("--calculation expects a numeric id, got {:?}", value.as_ref())
                })?;
                if id <= 0 {
                    bail!("--calculation expects a positive id, got {id}");
                }
                options.calculation = Some(CalculationId::new(id));
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                bail!("unknown argument {unknown:?}; run with --help to see supported options");
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("quoter");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Launch with a seeded demo calculation (in-memory)");
    println!("  --calculation <id>       Open a specific calculation (default: most recent)");
    println!("  --check                  Validate config + DB + calculation, then exit");
    println!("  --help                   Show this help");
}
