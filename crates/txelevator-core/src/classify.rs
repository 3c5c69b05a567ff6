//! Transaction type classification.
//!
//! Tests run in a fixed precedence against the transaction's shape:
//!
//! 1. cellbase structure (single input spending the null outpoint)
//! 2. UDT type script (sUDT, xUDT)
//! 3. DOB type script (Spore, Spore cluster)
//! 4. Nervos DAO type script
//! 5. RGB++ lock script (RGB++ lock, BTC time lock)
//! 6. no type script on any output → plain CKB transfer
//! 7. anything else → `Other`

use crate::model::{CellInput, CellOutput, Network, TransactionParts, TransactionType};

const NULL_TX_HASH: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

const DAO: &str = "0x82d76d1b75fe2fd9a27dfbaa65a039221a380d76c926f378d3f81cf3e7e13f2e";

const MAINNET_UDT: &[&str] = &[
    "0x5e7a36a77e68eecc013dfa2fe6a23f3b6c344b04005808694ae6dd45eea4cfd5",
    "0x50bd8d6680b8b9cf98b73f3c08faf8b2a21914311954118ad6609be6e78a1b95",
];
const TESTNET_UDT: &[&str] = &[
    "0xc5e5dcf215925f7ef4dfaf5f4b4f105bc321c02776d6e7d52a1db3fcd9d011a4",
    "0x25c29dc317811a6f6f3985a7a9ebc4838bd388d19d0feeecf0bcd60f6c0975bb",
];

const MAINNET_DOB: &[&str] = &[
    "0x4a4dce1df3dffff7f8b2cd7dff7303df3b6150c9788cb75dcf6747247132b9f5",
    "0x7366a61534fa7c7e6225ecc0d828ea3b5366adec2b58206f2ee84995fe030075",
];
const TESTNET_DOB: &[&str] = &[
    "0x685a60219309029d01310311dba953d67029170ca4848a4ff638e57002130a0d",
    "0x5e063b4c0e7abeaa6a428df3b693521a3050934cf3b0ae97a800d1bc31449398",
    "0x0bbe768b519d8ea7b96d58f1182eb7e6ef96c541fbd9526975077ee09f049058",
    "0x7366a61534fa7c7e6225ecc0d828ea3b5366adec2b58206f2ee84995fe030075",
];

const MAINNET_RGBPP: &[&str] = &[
    "0xbc6c568a1a0d0a09f6844dc9d74ddb4343c32143ff25f727c59edf4fb72d6936",
    "0x70d64497a075bd651e98ac030455ea200637ee325a12ad08aff03f1a117e5a62",
];
const TESTNET_RGBPP: &[&str] = &[
    "0x61ca7a4796a4eb19ca4f0d065cb9b10ddcf002f10f7cbb810c706cb6bb5c3248",
    "0x00cdf8fab0f8ac638758ebf5ea5e4052b1d71e8a77b9f43139718621f6849326",
];

/// Known system script code hashes for one network.
#[derive(Debug, Clone)]
pub struct ScriptRegistry {
    pub network: Network,
    udt: Vec<String>,
    dob: Vec<String>,
    dao: Vec<String>,
    rgbpp: Vec<String>,
}

impl ScriptRegistry {
    pub fn for_network(network: Network) -> Self {
        let (udt, dob, rgbpp) = match network {
            Network::Mainnet => (MAINNET_UDT, MAINNET_DOB, MAINNET_RGBPP),
            Network::Testnet => (TESTNET_UDT, TESTNET_DOB, TESTNET_RGBPP),
        };
        let owned = |hashes: &[&str]| hashes.iter().map(|h| h.to_string()).collect();
        Self {
            network,
            udt: owned(udt),
            dob: owned(dob),
            dao: owned(&[DAO]),
            rgbpp: owned(rgbpp),
        }
    }

    fn any_type_in(&self, outputs: &[CellOutput], hashes: &[String]) -> bool {
        outputs.iter().any(|o| {
            o.type_script
                .as_ref()
                .is_some_and(|s| contains_hash(hashes, &s.code_hash))
        })
    }

    fn any_lock_in(&self, outputs: &[CellOutput], hashes: &[String]) -> bool {
        outputs
            .iter()
            .any(|o| contains_hash(hashes, &o.lock.code_hash))
    }
}

fn contains_hash(hashes: &[String], code_hash: &str) -> bool {
    hashes.iter().any(|h| h.eq_ignore_ascii_case(code_hash))
}

/// A cellbase has exactly one input, and it spends the null outpoint.
pub fn is_cellbase(inputs: &[CellInput]) -> bool {
    match inputs {
        [only] => only.previous_tx_hash.eq_ignore_ascii_case(NULL_TX_HASH),
        _ => false,
    }
}

/// Classify a transaction by the precedence documented at module level.
pub fn classify(registry: &ScriptRegistry, parts: &TransactionParts) -> TransactionType {
    let outputs = &parts.outputs;
    if is_cellbase(&parts.inputs) {
        TransactionType::Cellbase
    } else if registry.any_type_in(outputs, &registry.udt) {
        TransactionType::Udt
    } else if registry.any_type_in(outputs, &registry.dob) {
        TransactionType::Dob
    } else if registry.any_type_in(outputs, &registry.dao) {
        TransactionType::Dao
    } else if registry.any_lock_in(outputs, &registry.rgbpp) {
        TransactionType::Rgbpp
    } else if outputs.iter().all(|o| o.type_script.is_none()) {
        TransactionType::Ckb
    } else {
        TransactionType::Other
    }
}
