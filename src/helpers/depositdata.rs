use alloy::primitives::{B256, FixedBytes};
use eyre::{Result, WrapErr, bail, eyre};
use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use tree_hash::TreeHash;

use crate::helpers::decode_fixed;

/// `DOMAIN_DEPOSIT` domain type (phase0)
pub const DOMAIN_DEPOSIT: [u8; 4] = [0x03, 0x00, 0x00, 0x00];

/// Proof-of-possession ciphersuite tag used by the consensus layer
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

#[derive(Debug, Clone, PartialEq, tree_hash_derive::TreeHash, Serialize)]
pub struct DepositData {
    /// Validator public key
    pub pubkey: FixedBytes<48>,
    /// Withdrawal credentials
    pub withdrawal_credentials: B256,
    /// Amount of ether deposited in gwei
    #[serde(with = "serde_utils::quoted_u64")]
    pub amount: u64,
    /// Deposit signature
    pub signature: FixedBytes<96>,
}

/// The signed part of `DepositData`
#[derive(Debug, Clone, PartialEq, tree_hash_derive::TreeHash)]
pub struct DepositMessage {
    pub pubkey: FixedBytes<48>,
    pub withdrawal_credentials: B256,
    pub amount: u64,
}

// Bytes4 packs into a single chunk, right padding it to 32 bytes
// yields the same hash tree root
#[derive(tree_hash_derive::TreeHash)]
struct ForkData {
    current_version: B256,
    genesis_validators_root: B256,
}

#[derive(tree_hash_derive::TreeHash)]
struct SigningData {
    object_root: B256,
    domain: B256,
}

/// Deposit domain for `fork_version`, deposits are valid across forks
/// so the genesis validators root is always zero
pub fn compute_domain(fork_version: FixedBytes<4>) -> B256 {
    let mut current_version = B256::ZERO;
    current_version[..4].copy_from_slice(fork_version.as_slice());
    let fork_data_root = ForkData {
        current_version,
        genesis_validators_root: B256::ZERO,
    }
    .tree_hash_root();
    let mut domain = B256::ZERO;
    domain[..4].copy_from_slice(&DOMAIN_DEPOSIT);
    domain[4..].copy_from_slice(&fork_data_root[..28]);
    domain
}

pub fn parse_pubkey(pubkey: &FixedBytes<48>) -> Result<blst::min_pk::PublicKey> {
    blst::min_pk::PublicKey::key_validate(pubkey.as_slice())
        .map_err(|e| eyre!("invalid BLS public key: {:?}", e))
}

impl DepositMessage {
    pub fn signing_root(&self, fork_version: FixedBytes<4>) -> B256 {
        SigningData {
            object_root: self.tree_hash_root(),
            domain: compute_domain(fork_version),
        }
        .tree_hash_root()
    }
}

impl DepositData {
    pub fn message(&self) -> DepositMessage {
        DepositMessage {
            pubkey: self.pubkey,
            withdrawal_credentials: self.withdrawal_credentials,
            amount: self.amount,
        }
    }

    /// Hash tree root of the signed fields
    pub fn deposit_message_root(&self) -> B256 {
        self.message().tree_hash_root()
    }

    /// SSZ hash tree root, the contract recomputes this and reverts on mismatch
    pub fn deposit_data_root(&self) -> B256 {
        self.tree_hash_root()
    }

    pub fn verify_signature(&self, fork_version: FixedBytes<4>) -> Result<()> {
        let pubkey = parse_pubkey(&self.pubkey)?;
        let signature = blst::min_pk::Signature::sig_validate(self.signature.as_slice(), true)
            .map_err(|e| eyre!("invalid BLS signature: {:?}", e))?;
        let signing_root = self.message().signing_root(fork_version);
        match signature.verify(false, signing_root.as_slice(), BLS_DST, &[], &pubkey, false) {
            blst::BLST_ERROR::BLST_SUCCESS => Ok(()),
            e => bail!("signature verification failed: {:?}", e),
        }
    }
}

/// A single entry of a staking-deposit-cli `deposit_data-*.json` file
#[derive(Debug, Clone, Deserialize)]
pub struct DepositFileEntry {
    pub pubkey: String,
    pub withdrawal_credentials: String,
    /// Amount in gwei
    pub amount: u64,
    pub signature: String,
    pub deposit_data_root: String,
    pub deposit_message_root: Option<String>,
    pub fork_version: Option<String>,
    pub network_name: Option<String>,
}

impl DepositFileEntry {
    pub fn fork_version(&self) -> Result<Option<FixedBytes<4>>> {
        self.fork_version
            .as_ref()
            .map(|v| decode_fixed::<4>("fork_version", v))
            .transpose()
    }

    pub fn deposit_message_root(&self) -> Result<Option<B256>> {
        self.deposit_message_root
            .as_ref()
            .map(|v| decode_fixed::<32>("deposit_message_root", v))
            .transpose()
    }
}

/// Load entry `index` from a deposit data file
pub fn load_file(path: &Path, index: usize) -> Result<DepositFileEntry> {
    let content =
        std::fs::read_to_string(path).wrap_err_with(|| format!("{}", path.display()))?;
    let mut entries = serde_json::from_str::<Vec<DepositFileEntry>>(&content)
        .wrap_err_with(|| format!("{}: not a deposit data file", path.display()))?;
    let count = entries.len();
    match index < count {
        true => Ok(entries.swap_remove(index)),
        false => bail!(
            "{}: index {} out of range ({} entries)",
            path.display(),
            index,
            count
        ),
    }
}
