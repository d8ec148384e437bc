#[macro_use]
extern crate log;

use clap::{CommandFactory, Parser};
use colored::*;
use eyre::Result;

use deposit_knife::{
    config::{self, *},
    logger::Logger,
    validator,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Install a backtrace hook
    // stable_eyre::install()?;

    // Parse args with clap
    let args = Cli::parse();

    // Setup our global logger, level is adjusted once the config is merged
    let logger = Logger::new(3);
    logger.set_global()?;

    // Load config file, command line args take precedence
    let config = config::merge_args_from_file::<CliArgs>(args.config, args.config_path)?;
    logger.set_log_level(config.log_level());
    trace!("{:#?}", config);

    // Secrets may come from a `.env` file
    config::load_dotenv()?;

    match &args.command {
        CliCmd::Version {} => {
            let mut ver = Cli::command().render_version();
            ver.pop(); // remove "\n"
            println!("version: {}", ver);
            Ok(())
        }
        CliCmd::Deposit { deposit } => {
            let confirmation = validator::deposit(&config, deposit, &mut std::io::stdout()).await?;
            debug!(
                "Deposit {} confirmed in block {}",
                confirmation.tx_hash.to_string().red(),
                confirmation.block_number
            );
            Ok(())
        }
        CliCmd::Compose { deposit } => validator::compose_cmd(&config, deposit),
        CliCmd::Verify { deposit } => validator::verify_cmd(&config, deposit),
    }
}
