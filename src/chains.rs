use alloy::primitives::{Address, FixedBytes, fixed_bytes};
use log::*;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::macros::parse_address;

#[derive(Debug, Clone)]
pub struct ChainData {
    pub id: u64,
    pub name: &'static str,
    pub deposit_contract: Address,
    /// Genesis fork version, used for the deposit signing domain
    pub fork_version: FixedBytes<4>,
}

pub static CHAINDATA: Lazy<HashMap<u64, ChainData>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(1, CHAIN_ETH_MAINNET.clone());
    m.insert(17000, CHAIN_ETH_HOLESKY.clone());
    m.insert(560048, CHAIN_ETH_HOODI.clone());
    m
});

pub fn by_id(chain_id: u64) -> Option<&'static ChainData> {
    let chain = CHAINDATA.get(&chain_id);
    trace!("chain {chain_id}: {:?}", chain);
    chain
}

pub fn by_name(name: &str) -> Option<&'static ChainData> {
    CHAINDATA
        .values()
        .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
}

static CHAIN_ETH_MAINNET: Lazy<ChainData> = Lazy::new(|| ChainData {
    id: 1,
    name: "mainnet",
    deposit_contract: parse_address!("0x00000000219ab540356cBB839Cbe05303d7705Fa"),
    fork_version: fixed_bytes!("00000000"),
});

static CHAIN_ETH_HOLESKY: Lazy<ChainData> = Lazy::new(|| ChainData {
    id: 17000,
    name: "holesky",
    deposit_contract: parse_address!("0x4242424242424242424242424242424242424242"),
    fork_version: fixed_bytes!("01017000"),
});

static CHAIN_ETH_HOODI: Lazy<ChainData> = Lazy::new(|| ChainData {
    id: 560048,
    name: "hoodi",
    deposit_contract: parse_address!("0x00000000219ab540356cBB839Cbe05303d7705Fa"),
    fork_version: fixed_bytes!("10000910"),
});
