use anyhow::Context;
use clap::Parser;
use cpf_export::{CommandDriver, Config, ConsolePrompter, Pipeline};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "cpf-export",
    version,
    author,
    about = "Convert and validate legacy controller CPF/CDF exports",
    long_about = "Batch-convert legacy vehicle-controller parameter (.cpf) and clone (.cdf) \
    files into validated workbook exports.\n\n\
    Files are first renamed to their canonical {date}_sn{serial} form, then converted one \
    at a time through the configured external tool. Each export is validated against the \
    serial number in its file name and, for clone files, against the injected part-number \
    revision map. Files needing a different tool revision are deferred and retried after \
    the operator reconfigures the tool.\n\n\
    USAGE EXAMPLES:\n  \
      # Convert the default import directory\n  \
      cpf-export --tool /usr/local/bin/controller-tool\n\n  \
      # Convert an ad-hoc directory, no revision checks or summary\n  \
      cpf-export --dir ./field-drop --tool ./tool\n\n  \
      # Only normalize file names\n  \
      cpf-export --datestamp-only"
)]
struct Cli {
    /// Directory holding the raw .cpf/.cdf files
    #[arg(short, long, default_value = "import", value_name = "PATH")]
    import: PathBuf,

    /// Directory receiving the converted exports
    #[arg(short, long, default_value = "export", value_name = "PATH")]
    export: PathBuf,

    /// Ad-hoc source directory: overrides --import/--export (exports land in
    /// DIR/export) and disables revision checks and the summary sidecar
    #[arg(long, value_name = "DIR", conflicts_with_all = ["import", "export"])]
    dir: Option<PathBuf>,

    /// External tool command invoked for open/export operations
    #[arg(short, long, value_name = "FILE")]
    tool: Option<PathBuf>,

    /// JSON file mapping part numbers to firmware revisions
    #[arg(short, long, default_value = "revisions.json", value_name = "FILE")]
    revisions: PathBuf,

    /// Skip the revision-mapping cross-check
    #[arg(long)]
    no_check_revisions: bool,

    /// Only normalize file names; do not convert
    #[arg(long)]
    datestamp_only: bool,

    /// Serial-field prefix used in canonical file names
    #[arg(long, default_value = "sn", value_name = "PREFIX")]
    serial_prefix: String,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    // The --dir override is for ad-hoc drops pulled from elsewhere: exports
    // stay beside the sources and nothing but serial validation gates them.
    let (import_dir, export_dir, ad_hoc) = match &cli.dir {
        Some(dir) => (dir.clone(), dir.join("export"), true),
        None => (cli.import.clone(), cli.export.clone(), false),
    };

    let check_revisions = !cli.no_check_revisions && !ad_hoc;

    let mut builder = Config::builder()
        .import_dir(import_dir)
        .export_dir(export_dir)
        .serial_prefix(cli.serial_prefix)
        .check_revisions(check_revisions)
        .datestamp_only(cli.datestamp_only)
        .write_summary(!ad_hoc);

    if check_revisions {
        builder = builder.revision_map_path(cli.revisions);
    }
    if let Some(tool) = cli.tool {
        builder = builder.tool_command(tool);
    }

    let config = builder.build().context("Failed to build configuration")?;

    if config.tool_command.is_none() && !config.datestamp_only {
        anyhow::bail!("an external tool command is required; pass --tool or --datestamp-only");
    }
    let mut driver = CommandDriver::new(config.tool_command.clone().unwrap_or_default());
    let mut prompter = ConsolePrompter::new();

    let stats = Pipeline::new(&config)
        .run(&mut driver, &mut prompter)
        .context("Conversion run failed")?;

    stats.print_summary();

    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("cpf_export=info"),
        1 => EnvFilter::new("cpf_export=debug"),
        _ => EnvFilter::new("cpf_export=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
