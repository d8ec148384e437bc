use alloy::{
    network::{EthereumWallet, ReceiptResponse},
    primitives::{Address, BlockNumber, TxHash, U256},
    providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use colored::*;
use eyre::{Result, WrapErr, bail, eyre};
use log::*;
use std::io::Write;
use std::time::Duration;
use url::Url;

use crate::chains;

/// How long to wait for a sent transaction
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub confirmations: u64,
    /// `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            confirmations: 1,
            timeout: None,
        }
    }
}

/// Receipt fields we care about
#[derive(Debug, Clone, PartialEq)]
pub struct Inclusion {
    pub block_number: Option<BlockNumber>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub tx_hash: TxHash,
    pub block_number: BlockNumber,
}

/// Network side of a deposit
#[allow(async_fn_in_trait)]
pub trait ChainClient {
    /// `eth_call` the request, errors if it would revert
    async fn simulate(&self, tx: &TransactionRequest) -> Result<()>;
    /// Sign and broadcast, returns once the node accepted the tx
    async fn send(&self, tx: TransactionRequest) -> Result<TxHash>;
    /// Block until `tx_hash` is included per `policy`
    async fn wait(&self, tx_hash: TxHash, policy: &WaitPolicy) -> Result<Inclusion>;
}

pub struct Client {
    pub chain_id: u64,
    pub address: Address,
    provider: DynProvider,
}

impl Client {
    /// Build a wallet backed provider, nonce, gas and fees are filled in by alloy
    pub async fn connect(rpc_url: Url, signer: PrivateKeySigner) -> Result<Client> {
        let address = signer.address();
        let provider = DynProvider::new(
            ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .connect(rpc_url.as_str())
                .await
                .wrap_err_with(|| format!("Connect failed to '{}'", rpc_url))?,
        );

        // Get chain ID and height
        let chain_id = provider
            .get_chain_id()
            .await
            .wrap_err_with(|| format!("Connect failed to '{}'", rpc_url))?;
        let height = provider.get_block_number().await?;

        debug!(
            "Connected to {} ({}) {}:{} {}:{}",
            rpc_url.as_str().white(),
            chains::by_id(chain_id)
                .map(|c| c.name)
                .unwrap_or("unknown")
                .green()
                .bold(),
            "chainId".white().bold(),
            format!("{:?}", chain_id).blue(),
            "height".white().bold(),
            format!("{:?}", height).blue(),
        );

        Ok(Client {
            chain_id,
            address,
            provider,
        })
    }

    pub async fn balance(&self, addr: &Address) -> Result<U256> {
        Ok(self.provider.get_balance(*addr).await?)
    }
}

impl ChainClient for Client {
    async fn simulate(&self, tx: &TransactionRequest) -> Result<()> {
        self.provider
            .call(tx.clone())
            .await
            .map_err(|e| eyre!("tx simulation failed: {:#?}", e))?;
        Ok(())
    }

    async fn send(&self, tx: TransactionRequest) -> Result<TxHash> {
        let pending = self.provider.send_transaction(tx).await?;
        Ok(*pending.tx_hash())
    }

    async fn wait(&self, tx_hash: TxHash, policy: &WaitPolicy) -> Result<Inclusion> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_required_confirmations(policy.confirmations)
            .with_timeout(policy.timeout)
            .get_receipt()
            .await?;
        trace!("{:#?}", receipt);
        Ok(Inclusion {
            block_number: receipt.block_number(),
            success: receipt.status(),
        })
    }
}

/// Send `tx`, print its hash, wait for inclusion and print the block number
pub async fn submit<C, W>(
    client: &C,
    tx: TransactionRequest,
    policy: &WaitPolicy,
    out: &mut W,
) -> Result<Confirmation>
where
    C: ChainClient,
    W: Write,
{
    let tx_hash = client.send(tx).await.wrap_err("broadcast failed")?;
    writeln!(out, "Transaction sent. Hash: {}", tx_hash.to_string().red())?;

    info!(
        "Waiting for {} confirmation(s){}...",
        policy.confirmations,
        match policy.timeout {
            Some(t) => format!(" (timeout {}s)", t.as_secs()),
            None => String::default(),
        }
    );
    let inclusion = client
        .wait(tx_hash, policy)
        .await
        .wrap_err_with(|| format!("Transaction {} was not confirmed", tx_hash))?;
    if !inclusion.success {
        bail!("Transaction {} reverted", tx_hash)
    }
    let block_number = inclusion
        .block_number
        .ok_or_else(|| eyre!("Transaction {} receipt has no block number", tx_hash))?;
    writeln!(
        out,
        "Transaction mined in block {}",
        block_number.to_string().blue()
    )?;

    Ok(Confirmation {
        tx_hash,
        block_number,
    })
}


#[cfg(test)]
mod tests {
    use super::mock::MockClient;
    use super::*;
    use alloy::primitives::b256;

    const HASH: TxHash =
        b256!("9c1e4d2bd1b1f1ff1ac8e3b0a0d5a3c2e1f0a9b8c7d6e5f4a3b2c1d0e9f8a7b6");

    fn output(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn prints_hash_then_block() {
        let client = MockClient::confirming(HASH, 1_234_567);
        let mut out = Vec::new();
        let confirmation = submit(
            &client,
            TransactionRequest::default(),
            &WaitPolicy::default(),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(
            confirmation,
            Confirmation {
                tx_hash: HASH,
                block_number: 1_234_567
            }
        );
        assert_eq!(client.calls(), vec!["send", "wait"]);

        let out = output(out);
        let hash = HASH.to_string();
        assert_eq!(out.matches(&hash).count(), 1);
        assert_eq!(out.matches("1234567").count(), 1);
        assert!(out.find(&hash).unwrap() < out.find("1234567").unwrap());
        assert_eq!(out.lines().count(), 2);
    }

    #[tokio::test]
    async fn broadcast_failure_prints_nothing() {
        let mut client = MockClient::confirming(HASH, 1);
        client.send_result = None;
        let mut out = Vec::new();
        let err = submit(
            &client,
            TransactionRequest::default(),
            &WaitPolicy::default(),
            &mut out,
        )
        .await
        .unwrap_err();

        assert!(format!("{:#}", err).contains("insufficient funds"));
        assert!(out.is_empty());
        assert_eq!(client.calls(), vec!["send"]);
    }

    #[tokio::test]
    async fn reverted_tx_is_an_error() {
        let mut client = MockClient::confirming(HASH, 99);
        client.inclusion = Some(Inclusion {
            block_number: Some(99),
            success: false,
        });
        let mut out = Vec::new();
        let err = submit(
            &client,
            TransactionRequest::default(),
            &WaitPolicy::default(),
            &mut out,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("reverted"));
        let out = output(out);
        assert!(out.contains(&HASH.to_string()));
        assert!(!out.contains("mined in block"));
    }

    #[tokio::test]
    async fn wait_failure_is_an_error() {
        let mut client = MockClient::confirming(HASH, 1);
        client.inclusion = None;
        let mut out = Vec::new();
        let err = submit(
            &client,
            TransactionRequest::default(),
            &WaitPolicy {
                confirmations: 2,
                timeout: Some(Duration::from_secs(1)),
            },
            &mut out,
        )
        .await
        .unwrap_err();

        assert!(format!("{:#}", err).contains("timed out"));
        assert_eq!(output(out).lines().count(), 1);
    }

    #[tokio::test]
    async fn connect_error_names_the_url() {
        // anvil's first dev account, nothing listens on port 1
        let signer: PrivateKeySigner =
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                .parse()
                .unwrap();
        let url = Url::parse("http://127.0.0.1:1").unwrap();
        let err = Client::connect(url, signer).await.err().unwrap();
        assert_eq!(err.to_string(), "Connect failed to 'http://127.0.0.1:1/'");
    }

    #[tokio::test]
    async fn missing_block_number_is_an_error() {
        let mut client = MockClient::confirming(HASH, 1);
        client.inclusion = Some(Inclusion {
            block_number: None,
            success: true,
        });
        let mut out = Vec::new();
        assert!(
            submit(
                &client,
                TransactionRequest::default(),
                &WaitPolicy::default(),
                &mut out,
            )
            .await
            .is_err()
        );
    }
}
