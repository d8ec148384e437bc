use colored::*;
use eyre::{Result, WrapErr, bail, eyre};
use log::*;
use std::io::Write;

use alloy::{
    network::TransactionBuilder,
    primitives::{
        Address, B256, Bytes, FixedBytes, U256, hex,
        utils::{Unit, parse_ether},
    },
    rpc::types::TransactionRequest,
    sol_types::SolCall,
};

use crate::{
    chains::{self, ChainData},
    config::{self, CliArgs, DepositArgs},
    helpers::{
        self, decode_fixed,
        depositdata::{self, DepositData, DepositFileEntry},
    },
    macros::print_kv,
    rpc::{self, ChainClient, Client, Confirmation, WaitPolicy},
};

// https://github.com/ethereum/consensus-specs/blob/dev/solidity_deposit_contract/deposit_contract.sol
alloy::sol! {
    #[derive(Debug, PartialEq)]
    interface IDepositContract {
        /// @notice Submit a Phase 0 DepositData object.
        /// @param pubkey A BLS12-381 public key.
        /// @param withdrawal_credentials Commitment to a public key for withdrawals.
        /// @param signature A BLS12-381 signature.
        /// @param deposit_data_root The SHA-256 hash of the SSZ-encoded DepositData object.
        /// Used as a protection against malformed input.
        function deposit(
            bytes calldata pubkey,
            bytes calldata withdrawal_credentials,
            bytes calldata signature,
            bytes32 deposit_data_root
        ) external payable;
    }
}

/// A fully decoded deposit, ready to be composed into a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct DepositInput {
    pub data: DepositData,
    pub deposit_data_root: B256,
    /// Root of the signed fields, only known from a deposit data file
    pub deposit_message_root: Option<B256>,
    /// Value sent with the call, `data.amount` in wei
    pub value: U256,
    /// From the deposit data file, if any
    pub fork_version: Option<FixedBytes<4>>,
    pub network_name: Option<String>,
}

impl DepositInput {
    /// Chain named by the deposit data file
    pub fn chain(&self) -> Option<&'static ChainData> {
        self.network_name.as_deref().and_then(chains::by_name)
    }
}

/// Merge `--deposit-file` with explicit flags, flags win
pub fn resolve(args: &DepositArgs, config: &CliArgs) -> Result<DepositInput> {
    let entry: Option<DepositFileEntry> = match &args.deposit_file {
        Some(path) => {
            let path: std::path::PathBuf = shellexpand::full(&path.to_string_lossy())?
                .to_string()
                .into();
            Some(depositdata::load_file(&path, args.index)?)
        }
        None => None,
    };

    macro_rules! field {
        ($name:ident, $flag:expr) => {
            match (&args.$name, &entry) {
                (Some(v), _) => v.clone(),
                (None, Some(entry)) => entry.$name.clone(),
                (None, None) => bail!("missing {} (or --deposit-file)", $flag),
            }
        };
    }

    let pubkey = decode_fixed::<48>("pubkey", &field!(pubkey, "--pubkey"))?;
    let withdrawal_credentials = decode_fixed::<32>(
        "withdrawal_credentials",
        &field!(withdrawal_credentials, "--withdrawal-credentials"),
    )?;
    let signature = decode_fixed::<96>("signature", &field!(signature, "--signature"))?;
    let deposit_data_root = decode_fixed::<32>(
        "deposit_data_root",
        &field!(deposit_data_root, "--deposit-data-root"),
    )?;

    let value = match (args.eth, &entry) {
        (Some(eth), _) => parse_eth(eth)?,
        (None, Some(entry)) => U256::from(entry.amount) * Unit::GWEI.wei(),
        (None, None) => parse_eth(config.amount())?,
    };
    let amount = amount_gwei(&value)?;

    let (fork_version, deposit_message_root) = match &entry {
        Some(entry) => (entry.fork_version()?, entry.deposit_message_root()?),
        None => (None, None),
    };

    Ok(DepositInput {
        data: DepositData {
            pubkey,
            withdrawal_credentials,
            amount,
            signature,
        },
        deposit_data_root,
        deposit_message_root,
        value,
        fork_version,
        network_name: entry.and_then(|e| e.network_name),
    })
}

fn parse_eth(eth: f64) -> Result<U256> {
    parse_ether(&eth.to_string()).wrap_err_with(|| format!("invalid eth amount {}", eth))
}

/// The deposit contract only accepts whole gwei amounts of at least 1 eth
pub fn amount_gwei(value: &U256) -> Result<u64> {
    if *value < Unit::ETHER.wei() {
        bail!("deposit value too low: {} eth", helpers::format_eth(value))
    }
    let gwei = Unit::GWEI.wei();
    if *value % gwei != U256::ZERO {
        bail!("deposit value not multiple of gwei: {} wei", value)
    }
    u64::try_from(*value / gwei).map_err(|_| eyre!("deposit value too high: {} wei", value))
}

/// ABI encoded `deposit(bytes,bytes,bytes,bytes32)` call
pub fn calldata(input: &DepositInput) -> Bytes {
    IDepositContract::depositCall {
        pubkey: input.data.pubkey.into(),
        withdrawal_credentials: input.data.withdrawal_credentials.into(),
        signature: input.data.signature.into(),
        deposit_data_root: input.deposit_data_root,
    }
    .abi_encode()
    .into()
}

/// Unsigned deposit transaction, nonce, gas and fees are left to the provider
pub fn compose(contract: Address, input: &DepositInput) -> TransactionRequest {
    TransactionRequest::default()
        .with_to(contract)
        .with_value(input.value)
        .with_input(calldata(input))
}

pub fn deposit_contract(config: &CliArgs, chain: Option<&ChainData>) -> Result<Address> {
    if let Some(addr) = config.deposit_contract()? {
        return Ok(addr);
    }
    match chain.map(|c| c.deposit_contract) {
        Some(addr) if addr != Address::ZERO => Ok(addr),
        _ => bail!("Unknown chain, specify --deposit-contract or --chain"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    Passed,
    Failed(String),
    Skipped(&'static str),
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Check::Passed => write!(f, "{}", "ok".green()),
            Check::Failed(e) => write!(f, "{}", e.red()),
            Check::Skipped(why) => write!(f, "{} ({})", "skipped".yellow(), why),
        }
    }
}

fn check(res: Result<()>) -> Check {
    match res {
        Ok(()) => Check::Passed,
        Err(e) => Check::Failed(format!("{:#}", e)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub pubkey: Check,
    pub deposit_message_root: Check,
    pub deposit_data_root: Check,
    pub signature: Check,
}

impl Verification {
    pub fn failures(&self) -> Vec<String> {
        [
            ("pubkey", &self.pubkey),
            ("deposit_message_root", &self.deposit_message_root),
            ("deposit_data_root", &self.deposit_data_root),
            ("signature", &self.signature),
        ]
        .iter()
        .filter_map(|(name, c)| match c {
            Check::Failed(e) => Some(format!("{}: {}", name, e)),
            _ => None,
        })
        .collect()
    }

    pub fn print(&self) {
        let align = 28;
        print_kv!(align, "pubkey", self.pubkey, normal);
        print_kv!(align, "deposit_message_root", self.deposit_message_root, normal);
        print_kv!(align, "deposit_data_root", self.deposit_data_root, normal);
        print_kv!(align, "signature", self.signature, normal);
    }

    /// Warn on every failed check, with `strict` the first failure is fatal
    pub fn enforce(&self, strict: bool) -> Result<()> {
        let failures = self.failures();
        for failure in failures.iter() {
            warn!("Deposit data check failed, {}", failure);
        }
        match (strict, failures.first()) {
            (true, Some(failure)) => bail!("deposit data verification failed, {}", failure),
            _ => Ok(()),
        }
    }
}

fn compare_root(expected: B256, computed: B256) -> Check {
    match computed == expected {
        true => Check::Passed,
        false => Check::Failed(format!("expected {}, computed {}", expected, computed)),
    }
}

pub fn verify(input: &DepositInput, fork_version: Option<FixedBytes<4>>) -> Verification {
    let pubkey = check(depositdata::parse_pubkey(&input.data.pubkey).map(|_| ()));
    let deposit_message_root = match input.deposit_message_root {
        Some(expected) => compare_root(expected, input.data.deposit_message_root()),
        None => Check::Skipped("not in deposit data"),
    };
    let deposit_data_root =
        compare_root(input.deposit_data_root, input.data.deposit_data_root());
    let signature = match fork_version {
        Some(fork_version) => check(input.data.verify_signature(fork_version)),
        None => Check::Skipped("unknown fork version"),
    };
    Verification {
        pubkey,
        deposit_message_root,
        deposit_data_root,
        signature,
    }
}

/// Fork version for signature checks, the file's wins over the chain's
fn fork_version_for(input: &DepositInput, chain: Option<&ChainData>) -> Option<FixedBytes<4>> {
    if let (Some(file), Some(chain)) = (input.fork_version, chain) {
        if file != chain.fork_version {
            warn!(
                "Deposit data fork version {} does not match {} ({})",
                file, chain.name, chain.fork_version
            );
        }
    }
    input.fork_version.or(chain.map(|c| c.fork_version))
}

pub fn print_tx(tx: &TransactionRequest, input: &DepositInput) -> Result<()> {
    let align = 28;
    let to = tx.to.and_then(|to| to.to().copied()).unwrap_or_default();
    print_kv!(align, "to", to, blue);
    print_kv!(
        align,
        "value",
        format!("{} eth", helpers::format_eth(&input.value)),
        magenta
    );
    print_kv!(align, "deposit_data_root", input.deposit_data_root, blue);
    print_kv!(
        align,
        "input",
        hex::encode_prefixed(tx.input.input().cloned().unwrap_or_default()),
        normal
    );
    println!("{}", serde_json::to_string_pretty(&input.data)?);
    Ok(())
}

/// Simulate then submit a composed deposit
pub async fn send_deposit<C, W>(
    client: &C,
    tx: TransactionRequest,
    policy: &WaitPolicy,
    out: &mut W,
) -> Result<Confirmation>
where
    C: ChainClient,
    W: Write,
{
    trace!("{:#?}", tx);
    // Bail early if simulation fails
    client.simulate(&tx).await?;
    rpc::submit(client, tx, policy, out).await
}

/// Full deposit workflow: key, inputs, connect, compose, send, wait
pub async fn deposit<W: Write>(
    config: &CliArgs,
    args: &DepositArgs,
    out: &mut W,
) -> Result<Confirmation> {
    // Before anything touches the network
    let signer = config::signing_key(config.key_env())?;
    let input = resolve(args, config)?;
    let expected_chain = config.chain()?.or(input.chain());
    let rpc_url = config.rpc_url()?;

    let client = Client::connect(rpc_url, signer).await?;
    let chain = chains::by_id(client.chain_id);
    if let Some(expected) = expected_chain {
        if expected.id != client.chain_id {
            bail!(
                "Connected to chain {} but expected {} ({})",
                client.chain_id,
                expected.name,
                expected.id
            )
        }
    }

    let contract = deposit_contract(config, chain)?;
    verify(&input, fork_version_for(&input, chain)).enforce(config.strict())?;

    let balance = client.balance(&client.address).await?;
    debug!(
        "From {} balance {} eth",
        client.address.to_string().blue(),
        helpers::format_eth(&balance).magenta()
    );
    info!(
        "Depositing {} eth for {} to {}",
        helpers::format_eth(&input.value).magenta(),
        input.data.pubkey.to_string().blue(),
        contract.to_string().green()
    );

    let tx = compose(contract, &input).with_from(client.address);
    let policy = WaitPolicy {
        confirmations: config.confirmations(),
        timeout: config.timeout(),
    };
    send_deposit(&client, tx, &policy, out).await
}

/// Offline: print the transaction `deposit` would send
pub fn compose_cmd(config: &CliArgs, args: &DepositArgs) -> Result<()> {
    let input = resolve(args, config)?;
    let chain = config.chain()?.or(input.chain());
    let contract = deposit_contract(config, chain)?;
    let tx = compose(contract, &input);
    print_tx(&tx, &input)?;
    verify(&input, fork_version_for(&input, chain)).print();
    Ok(())
}

/// Offline: check root and signature
pub fn verify_cmd(config: &CliArgs, args: &DepositArgs) -> Result<()> {
    let input = resolve(args, config)?;
    let chain = config.chain()?.or(input.chain());
    let verification = verify(&input, fork_version_for(&input, chain));
    verification.print();
    // Always strict, this is the whole point of the command
    verification.enforce(true)
}
