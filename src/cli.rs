//! The command line interface for biotea.
use crate::combined::CombinedTea;
use crate::log;
use crate::settings::Settings;
use crate::tea::Tea;
use crate::units::Dimensionless;
use crate::venture::load_venture;
use ::log::{debug, info};
use anyhow::{Context, Result, ensure};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// The command line interface for biotea.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options for the combine command
#[derive(Args)]
pub struct CombineOpts {
    /// Discount rate shared by all ventures
    #[arg(long)]
    pub irr: f64,
    /// Solve the price of this stream instead of the IRR
    #[arg(long, requires = "member")]
    pub price: Option<String>,
    /// Index of the venture owning the stream given by `--price`
    #[arg(long, requires = "price")]
    pub member: Option<usize>,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Analyse a venture and solve its IRR.
    Run {
        /// Path to the venture file.
        venture_file: PathBuf,
    },
    /// Solve the price of a stream at which the venture breaks even.
    Price {
        /// Path to the venture file.
        venture_file: PathBuf,
        /// The stream to price.
        stream: String,
    },
    /// Analyse several ventures as a single investment.
    Combine {
        /// Paths to the venture files.
        #[arg(required = true)]
        venture_files: Vec<PathBuf>,
        /// Other combine options
        #[command(flatten)]
        opts: CombineOpts,
    },
    /// Validate a venture file.
    Validate {
        /// Path to the venture file.
        venture_file: PathBuf,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { venture_file } => handle_run_command(&venture_file, None),
            Self::Price {
                venture_file,
                stream,
            } => handle_price_command(&venture_file, &stream, None),
            Self::Combine {
                venture_files,
                opts,
            } => handle_combine_command(&venture_files, &opts, None),
            Self::Validate { venture_file } => handle_validate_command(&venture_file, None),
        }
    }
}

/// Parse CLI arguments and start biotea
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load program settings (if not provided) and initialise the logger
fn init_logging(venture_path: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = if let Some(settings) = settings {
        settings
    } else {
        Settings::load(venture_path).context("Failed to load settings.")?
    };

    log::init(&settings.log_level).context("Failed to initialise logging.")
}

/// Handle the `run` command.
pub fn handle_run_command(venture_path: &Path, settings: Option<Settings>) -> Result<()> {
    init_logging(venture_path, settings)?;

    let mut tea = load_venture(venture_path).context("Failed to load venture.")?;
    info!("Loaded venture from {}", venture_path.display());

    println!("{}", tea.summary()?);
    for row in tea.cashflow_table()? {
        debug!(
            "{}: cash flow {:.4e} USD, cumulative {:.4e} USD",
            row.year,
            row.cash_flow.value(),
            row.cumulative_cash_flow.value()
        );
    }

    let irr = tea.solve_irr().context("Failed to solve IRR.")?;
    info!("IRR: {:.2}%", irr.value() * 100.0);

    Ok(())
}

/// Handle the `price` command.
pub fn handle_price_command(
    venture_path: &Path,
    stream: &str,
    settings: Option<Settings>,
) -> Result<()> {
    init_logging(venture_path, settings)?;

    let mut tea = load_venture(venture_path).context("Failed to load venture.")?;
    info!("Loaded venture from {}", venture_path.display());

    let price = tea
        .solve_price(stream)
        .with_context(|| format!("Failed to solve price of stream '{stream}'."))?;
    info!("Break-even price of {stream}: {:.4} USD/unit", price.value());

    Ok(())
}

/// Handle the `combine` command.
pub fn handle_combine_command(
    venture_paths: &[PathBuf],
    opts: &CombineOpts,
    settings: Option<Settings>,
) -> Result<()> {
    ensure!(!venture_paths.is_empty(), "No venture files given.");
    init_logging(&venture_paths[0], settings)?;

    let teas = venture_paths
        .iter()
        .map(|path| {
            load_venture(path).with_context(|| format!("Failed to load {}.", path.display()))
        })
        .collect::<Result<Vec<Tea>>>()?;
    let mut combined = CombinedTea::new(teas, Dimensionless(opts.irr))
        .context("Failed to combine ventures.")?;
    info!("Combined {} ventures", combined.members().len());

    println!("{}", combined.summary()?);

    if let (Some(stream), Some(member)) = (opts.price.as_deref(), opts.member) {
        let price = combined
            .solve_price(stream, member)
            .with_context(|| format!("Failed to solve price of stream '{stream}'."))?;
        info!(
            "Break-even price of {stream} (venture {member}): {:.4} USD/unit",
            price.value()
        );
    } else {
        let irr = combined.solve_irr().context("Failed to solve IRR.")?;
        info!("Combined IRR: {:.2}%", irr.value() * 100.0);
    }

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(venture_path: &Path, settings: Option<Settings>) -> Result<()> {
    init_logging(venture_path, settings)?;

    // Loading the venture checks the parameters and cost accounting
    let tea = load_venture(venture_path).context("Failed to validate venture.")?;
    tea.cashflow().context("Failed to validate venture.")?;
    info!("Venture validation successful!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["biotea", "run", "a.toml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Run { .. })));

        // Cash flow tables are not rendered
        assert!(Cli::try_parse_from(["biotea", "run", "a.toml", "--cashflow"]).is_err());
    }

    #[test]
    fn test_parse_combine() {
        let cli = Cli::try_parse_from([
            "biotea", "combine", "a.toml", "b.toml", "--irr", "0.1", "--price", "ethanol",
            "--member", "1",
        ])
        .unwrap();
        let Some(Commands::Combine {
            venture_files,
            opts,
        }) = cli.command
        else {
            panic!("Expected combine command");
        };
        assert_eq!(venture_files.len(), 2);
        assert_eq!(opts.price.as_deref(), Some("ethanol"));
        assert_eq!(opts.member, Some(1));
    }

    #[test]
    fn test_parse_combine_price_without_member() {
        assert!(
            Cli::try_parse_from(["biotea", "combine", "a.toml", "--irr", "0.1", "--price", "x"])
                .is_err()
        );
    }
}
