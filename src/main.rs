use clap::{Parser, Subcommand};
use std::path::Path;

use climvel::cli::{self, commands};

#[derive(Parser)]
#[command(name = "climvel")]
#[command(about = "Velocity of climate change from gridded climate time series")]
#[command(version)]
struct Cli {
    /// Path to the analysis config file (climvel.toml is used when present)
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic climate dataset
    Synth {
        /// Path to a synthetic dataset parameter file
        #[arg(short, long)]
        params: Option<String>,

        /// Output dataset directory (defaults to dataset_directory)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Gradient-based velocity (trend / spatial gradient)
    Gvocc {
        /// Variable to analyse
        #[arg(short, long, default_value = "tas")]
        variable: String,

        /// Dataset file (defaults to the newest in dataset_directory)
        #[arg(short, long)]
        dataset: Option<String>,

        /// Report path
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Trace trajectories through a gradient velocity field
    Trajectories {
        #[arg(short, long, default_value = "tas")]
        variable: String,

        #[arg(short, long)]
        dataset: Option<String>,

        /// Seed every Nth cell with a defined velocity
        #[arg(short, long)]
        stride: Option<u32>,

        #[arg(short, long)]
        output: Option<String>,
    },

    /// Distance-based velocity (climate analogues between two periods)
    Dvocc {
        /// Variables to match, comma separated
        #[arg(short, long, value_delimiter = ',', default_value = "tas")]
        variables: Vec<String>,

        /// Baseline period as start:end
        #[arg(short, long)]
        baseline: String,

        /// Future period as start:end
        #[arg(short, long)]
        future: String,

        #[arg(short, long)]
        dataset: Option<String>,

        #[arg(short, long)]
        output: Option<String>,
    },

    /// Summarise a dataset or one of its cells
    Inspect {
        /// Cell ID to inspect
        #[arg(long)]
        cell: Option<u32>,

        #[arg(short, long)]
        dataset: Option<String>,
    },

    /// Manage stored datasets
    Datasets {
        #[command(subcommand)]
        action: DatasetAction,
    },
}

#[derive(Subcommand)]
enum DatasetAction {
    /// List stored datasets
    List {
        /// Dataset directory (defaults to dataset_directory)
        #[arg(short, long)]
        dir: Option<String>,
    },

    /// Load and summarise a dataset file
    Show {
        /// Path to the dataset file
        file: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match commands::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };
    cli::init_logging(&config.log_level, cli.log_json);

    let result = match cli.command {
        Commands::Synth { params, output } => {
            commands::synth(&config, params.as_deref(), output.as_deref()).map(|_| ())
        }
        Commands::Gvocc {
            variable,
            dataset,
            output,
        } => commands::gvocc(&config, dataset.as_deref(), &variable, output.as_deref()).map(|_| ()),
        Commands::Trajectories {
            variable,
            dataset,
            stride,
            output,
        } => commands::trajectories(&config, dataset.as_deref(), &variable, stride, output.as_deref())
            .map(|_| ()),
        Commands::Dvocc {
            variables,
            baseline,
            future,
            dataset,
            output,
        } => commands::dvocc(
            &config,
            dataset.as_deref(),
            &variables,
            &baseline,
            &future,
            output.as_deref(),
        )
        .map(|_| ()),
        Commands::Inspect { cell, dataset } => commands::inspect(&config, dataset.as_deref(), cell),
        Commands::Datasets { action } => match action {
            DatasetAction::List { dir } => {
                let dir = dir.unwrap_or_else(|| config.dataset_directory.clone());
                commands::list_datasets(Path::new(&dir))
            }
            DatasetAction::Show { file } => commands::show_dataset(Path::new(&file)),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
