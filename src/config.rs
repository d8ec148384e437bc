use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;
use std::{fs::File, io::BufReader};

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use eyre::{Result, WrapErr, bail, eyre};
use log::*;
use serde_derive::Deserialize;
use url::Url;

use clap_serde_derive::{
    ClapSerde,
    clap::{Parser, Subcommand},
};

use crate::chains::{self, ChainData};

pub const DEFAULT_RPC_URL: &str = "https://rpc.hoodi.ethpandaops.io";
pub const DEFAULT_KEY_ENV: &str = "PRIVATE_KEY";
pub const DEFAULT_AMOUNT_ETH: f64 = 34.0;

#[allow(deprecated)]
fn config_file() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::home_dir().map(|home| home.join(".config")))
        .unwrap_or_default()
        .join("deposit-knife")
        .join("config.toml")
}

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Config file
    #[arg(short, long = "config", default_value = config_file().into_os_string())]
    pub config_path: Option<PathBuf>,

    /// Global arguments
    #[command(flatten)]
    pub config: <CliArgs as ClapSerde>::Opt,

    // Subcommands
    #[command(subcommand)]
    pub command: CliCmd,
}

// Make sure all values are optional or parsing fails if a value
// is missing in the config file, defaults are applied by the getters
// so a config file value isn't shadowed by a clap default
#[derive(Debug, Clone, ClapSerde, Deserialize)]
pub struct CliArgs {
    /// Logging level [0: critical .. 5: trace, default: 3]
    #[arg(short, long = "log-level", required = false)]
    pub log_level: Option<u8>,

    /// JsonRPC URL [default: https://rpc.hoodi.ethpandaops.io]
    #[arg(long = "rpc-url", required = false)]
    pub rpc_url: Option<String>,

    /// Environment variable holding the signing key [default: PRIVATE_KEY]
    #[arg(long = "key-env", required = false)]
    pub key_env: Option<String>,

    /// Deposit contract address [default: by chain id]
    #[arg(long = "deposit-contract", required = false)]
    pub deposit_contract: Option<String>,

    /// Expected network name (mainnet, holesky, hoodi)
    #[arg(long, required = false)]
    pub chain: Option<String>,

    /// Deposit amount in eth [default: 34]
    #[arg(long, required = false)]
    pub amount: Option<f64>,

    /// Required block confirmations [default: 1]
    #[arg(long, required = false)]
    pub confirmations: Option<u64>,

    /// Confirmation timeout in seconds [default: none]
    #[arg(long, required = false)]
    pub timeout: Option<u64>,

    /// Abort when the deposit data fails verification
    // Not `SetTrue`, an absent flag must stay `None` or it shadows the config file
    #[arg(
        long,
        required = false,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub strict: Option<bool>,
}

impl CliArgs {
    pub fn log_level(&self) -> u8 {
        self.log_level.unwrap_or(3)
    }

    pub fn rpc_url(&self) -> Result<Url> {
        let url = self.rpc_url.as_deref().unwrap_or(DEFAULT_RPC_URL);
        if url.trim().is_empty() {
            bail!("must specify a valid --rpc-url")
        };
        Url::parse(url.trim()).wrap_err_with(|| format!("invalid rpc url '{}'", url))
    }

    pub fn key_env(&self) -> &str {
        self.key_env.as_deref().unwrap_or(DEFAULT_KEY_ENV)
    }

    pub fn amount(&self) -> f64 {
        self.amount.unwrap_or(DEFAULT_AMOUNT_ETH)
    }

    pub fn confirmations(&self) -> u64 {
        self.confirmations.unwrap_or(1).max(1)
    }

    pub fn strict(&self) -> bool {
        self.strict.unwrap_or(false)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    pub fn deposit_contract(&self) -> Result<Option<Address>> {
        self.deposit_contract
            .as_deref()
            .map(|addr| {
                addr.trim()
                    .parse::<Address>()
                    .wrap_err_with(|| format!("invalid deposit contract '{}'", addr))
            })
            .transpose()
    }

    pub fn chain(&self) -> Result<Option<&'static ChainData>> {
        match self.chain.as_deref() {
            Some(name) => match chains::by_name(name) {
                Some(chain) => Ok(Some(chain)),
                None => bail!("Unknown chain '{}'", name),
            },
            None => Ok(None),
        }
    }
}

// Command line cmds
#[derive(Subcommand)]
pub enum CliCmd {
    /// Print version information
    #[clap(visible_alias = "ver")]
    Version {},
    /// Send a validator deposit and wait for confirmation
    #[clap(visible_aliases = &["d"])]
    Deposit {
        #[command(flatten)]
        deposit: DepositArgs,
    },
    /// Print the deposit transaction without sending it
    #[clap(visible_aliases = &["c"])]
    Compose {
        #[command(flatten)]
        deposit: DepositArgs,
    },
    /// Verify deposit data root and signature
    #[clap(visible_aliases = &["v"])]
    Verify {
        #[command(flatten)]
        deposit: DepositArgs,
    },
}

/// Deposit inputs, flags override values from `--deposit-file`
#[derive(Parser, Debug, Clone, Default)]
pub struct DepositArgs {
    /// staking-deposit-cli deposit_data json
    #[arg(short = 'f', long, required = false)]
    pub deposit_file: Option<PathBuf>,
    /// Entry index in the deposit data file
    #[arg(short, long, required = false, default_value_t = 0)]
    pub index: usize,
    /// Validator public key (48 bytes)
    #[arg(short, long, required = false)]
    pub pubkey: Option<String>,
    /// Withdrawal credentials (32 bytes)
    #[arg(short, long, visible_alias = "wc", required = false)]
    pub withdrawal_credentials: Option<String>,
    /// Deposit signature (96 bytes)
    #[arg(short, long, required = false)]
    pub signature: Option<String>,
    /// Deposit data root (32 bytes)
    #[arg(short = 'r', long, visible_alias = "root", required = false)]
    pub deposit_data_root: Option<String>,
    /// Eth amount to deposit
    #[arg(short, long = "eth", required = false)]
    pub eth: Option<f64>,
}

/// Load `.env` from the working directory (or parents), if any
pub fn load_dotenv() -> Result<()> {
    match dotenv::dotenv() {
        Ok(path) => {
            debug!("Loaded environment from {}", path.display());
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => bail!(".env: {}", e),
    }
}

/// Read the signing key from `var`, this must happen before
/// any network activity so a missing key fails fast
pub fn signing_key(var: &str) -> Result<PrivateKeySigner> {
    let key = match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => bail!("{} is not set in environment variables", var),
    };
    parse_signing_key(&key).wrap_err_with(|| format!("{} is not a valid private key", var))
}

pub fn parse_signing_key(key: &str) -> Result<PrivateKeySigner> {
    // Never echo the key in the error
    key.trim()
        .parse::<PrivateKeySigner>()
        .map_err(|_| eyre!("expected a 32 byte hex string"))
}

pub fn merge_args_from_file<T>(
    args: <T as ClapSerde>::Opt,
    maybe_path: Option<PathBuf>,
) -> Result<T>
where
    T: ClapSerde + serde::de::DeserializeOwned,
{
    match maybe_path {
        Some(path) => {
            let path: PathBuf = shellexpand::full(&path.to_string_lossy())?
                .to_string()
                .into();
            let config_path = path.as_path();
            match config_path.exists() {
                true => {
                    let config = match config_path.extension().and_then(OsStr::to_str) {
                        Some("toml") => read_toml_config::<T, _>(config_path),
                        Some("json") => read_json_config::<T, _>(config_path),
                        Some("jsonc") => read_jsonc_config::<T, _>(config_path),
                        _ => {
                            bail!("Unsupported config file type: {:?}", path);
                        }
                    }?;
                    // Fields which are not None in `other` will be cleared and used to update `self`.
                    // Fields which are None in `other` will not be modified in `self`.
                    // Command line arguments win over the config file
                    Ok(T::from(config).merge(args))
                }
                false => Ok(T::from(args)),
            }
        }
        None => Ok(T::from(args)),
    }
}

fn read_toml_config<T, P: AsRef<std::path::Path>>(path: P) -> Result<<T as ClapSerde>::Opt>
where
    P: AsRef<std::path::Path> + std::fmt::Debug + Copy,
    T: ClapSerde + serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path).wrap_err_with(|| format!("{:?}", path))?;
    Ok(toml::from_str(&content)?)
}

fn read_json_config<T: ClapSerde, P: AsRef<std::path::Path>>(
    path: P,
) -> Result<<T as ClapSerde>::Opt>
where
    P: AsRef<std::path::Path> + std::fmt::Debug + Copy,
{
    let f = File::open(path).wrap_err_with(|| format!("{:?}", path))?;
    let json_cfg = serde_json::from_reader::<_, <T as ClapSerde>::Opt>(BufReader::new(f))?;
    Ok(json_cfg)
}

fn read_jsonc_config<T: ClapSerde, P: AsRef<std::path::Path>>(
    path: P,
) -> Result<<T as ClapSerde>::Opt>
where
    P: AsRef<std::path::Path> + std::fmt::Debug + Copy,
{
    let f = File::open(path).wrap_err_with(|| format!("{:?}", path))?;
    let jsonc_cfg = serde_jsonc::from_reader::<_, <T as ClapSerde>::Opt>(BufReader::new(f))?;
    Ok(jsonc_cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("deposit-knife-{}-{}", std::process::id(), name))
    }

    #[test]
    fn missing_key_env() {
        let err = signing_key("DEPOSIT_KNIFE_TEST_UNSET_KEY").unwrap_err();
        assert_eq!(
            err.to_string(),
            "DEPOSIT_KNIFE_TEST_UNSET_KEY is not set in environment variables"
        );
    }

    #[test]
    fn signing_key_parsing() {
        // anvil's first dev account
        let key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(parse_signing_key(key).unwrap().address(), expected);
        assert_eq!(
            parse_signing_key(&key[2..]).unwrap().address(),
            expected,
            "0x prefix is optional"
        );

        let err = parse_signing_key("0xdeadbeef").unwrap_err();
        assert!(!err.to_string().contains("deadbeef"));
    }

    #[test]
    fn defaults() {
        let args = CliArgs::default();
        assert_eq!(args.log_level(), 3);
        assert_eq!(args.rpc_url().unwrap().as_str(), "https://rpc.hoodi.ethpandaops.io/");
        assert_eq!(args.key_env(), "PRIVATE_KEY");
        assert_eq!(args.amount(), 34.0);
        assert_eq!(args.confirmations(), 1);
        assert!(args.timeout().is_none());
        assert!(args.deposit_contract().unwrap().is_none());
        assert!(args.chain().unwrap().is_none());
    }

    #[test]
    fn invalid_values() {
        let args = CliArgs {
            rpc_url: Some("not a url".into()),
            deposit_contract: Some("0x1234".into()),
            chain: Some("goerli".into()),
            ..Default::default()
        };
        assert!(args.rpc_url().is_err());
        assert!(args.deposit_contract().is_err());
        assert!(args.chain().is_err());
    }

    #[test]
    fn cli_overrides_config_file() {
        let path = temp_path("config.toml");
        std::fs::write(
            &path,
            "rpc_url = \"http://file:8545\"\nkey_env = \"VALIDATOR_KEY\"\namount = 32.0\nstrict = true\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "deposit-knife",
            "--rpc-url",
            "http://cli:8545",
            "version",
        ])
        .unwrap();
        let config = merge_args_from_file::<CliArgs>(cli.config, Some(path.clone())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.rpc_url.as_deref(), Some("http://cli:8545"));
        assert_eq!(config.key_env(), "VALIDATOR_KEY");
        assert_eq!(config.amount(), 32.0);
        assert_eq!(config.log_level(), 3);
        assert!(config.strict(), "strict from the config file survives an absent flag");
    }

    #[test]
    fn strict_flag() {
        let cli = Cli::try_parse_from(["deposit-knife", "version"]).unwrap();
        assert!(!CliArgs::from(cli.config).strict());

        // A bare flag must not swallow the subcommand
        let cli = Cli::try_parse_from(["deposit-knife", "--strict", "version"]).unwrap();
        assert!(matches!(cli.command, CliCmd::Version {}));
        assert!(CliArgs::from(cli.config).strict());

        let path = temp_path("strict.toml");
        std::fs::write(&path, "strict = true\n").unwrap();
        let cli = Cli::try_parse_from(["deposit-knife", "--strict=false", "version"]).unwrap();
        let config = merge_args_from_file::<CliArgs>(cli.config, Some(path.clone())).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(!config.strict());
    }

    #[test]
    fn json_config_file() {
        let path = temp_path("config.json");
        std::fs::write(
            &path,
            r#"{"rpc_url": "http://json:8545", "confirmations": 3, "strict": true}"#,
        )
        .unwrap();
        let cli = Cli::try_parse_from(["deposit-knife", "version"]).unwrap();
        let config = merge_args_from_file::<CliArgs>(cli.config, Some(path.clone())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.rpc_url().unwrap().as_str(), "http://json:8545/");
        assert_eq!(config.confirmations(), 3);
        assert!(config.strict());
        assert_eq!(config.amount(), DEFAULT_AMOUNT_ETH);
    }

    #[test]
    fn jsonc_config_file() {
        let path = temp_path("config.jsonc");
        std::fs::write(
            &path,
            "{\n  // hoodi via a local node\n  \"rpc_url\": \"http://jsonc:8545\",\n  \"timeout\": 120,\n  \"amount\": 32.0\n}\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from(["deposit-knife", "--amount", "33", "version"]).unwrap();
        let config = merge_args_from_file::<CliArgs>(cli.config, Some(path.clone())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.rpc_url().unwrap().as_str(), "http://jsonc:8545/");
        assert_eq!(config.timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.amount(), 33.0);
    }

    #[test]
    fn malformed_json_config_file() {
        let path = temp_path("broken.json");
        std::fs::write(&path, "{\"rpc_url\": ").unwrap();
        let cli = Cli::try_parse_from(["deposit-knife", "version"]).unwrap();
        let res = merge_args_from_file::<CliArgs>(cli.config, Some(path.clone()));
        std::fs::remove_file(&path).unwrap();
        assert!(res.is_err());
    }

    #[test]
    fn missing_config_file_is_ignored() {
        let cli = Cli::try_parse_from(["deposit-knife", "--amount", "33", "version"]).unwrap();
        let config =
            merge_args_from_file::<CliArgs>(cli.config, Some(temp_path("missing.toml"))).unwrap();
        assert_eq!(config.amount(), 33.0);
    }

    #[test]
    fn unsupported_config_extension() {
        let path = temp_path("config.yaml");
        std::fs::write(&path, "rpc_url: http://file:8545\n").unwrap();
        let cli = Cli::try_parse_from(["deposit-knife", "version"]).unwrap();
        let res = merge_args_from_file::<CliArgs>(cli.config, Some(path.clone()));
        std::fs::remove_file(&path).unwrap();
        assert!(res.is_err());
    }

    #[test]
    fn deposit_subcommand_args() {
        let cli = Cli::try_parse_from([
            "deposit-knife",
            "deposit",
            "--deposit-file",
            "deposit_data.json",
            "--index",
            "2",
            "--eth",
            "32",
        ])
        .unwrap();
        match cli.command {
            CliCmd::Deposit { deposit } => {
                assert_eq!(deposit.deposit_file, Some(PathBuf::from("deposit_data.json")));
                assert_eq!(deposit.index, 2);
                assert_eq!(deposit.eth, Some(32.0));
                assert!(deposit.pubkey.is_none());
            }
            _ => panic!("expected deposit subcommand"),
        }
    }
}
