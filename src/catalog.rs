//! The Tool Catalog: a static registry of invocable operations.
//!
//! Entries are configuration, not runtime state — the catalog never changes
//! during a conversation. The default set mirrors the blockchain backend's
//! tool surface.

use serde::{Deserialize, Serialize};

/// One catalog entry: an operation the planner may schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required_parameters: Vec<String>,
    #[serde(default)]
    pub example_phrasings: Vec<String>,
}

impl ToolSpec {
    fn new(name: &str, description: &str, required: &[&str], examples: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required_parameters: required.iter().map(|s| s.to_string()).collect(),
            example_phrasings: examples.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The fixed set of tools the planner may reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCatalog {
    pub tools: Vec<ToolSpec>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<ToolSpec>) -> Self {
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolCatalog {
    /// The blockchain agent tool set.
    fn default() -> Self {
        Self::new(vec![
            ToolSpec::new(
                "get_balance",
                "Get the native ETH balance of a wallet address.",
                &["address"],
                &["what's the balance of 0xAAA…", "how much ETH do I have"],
            ),
            ToolSpec::new(
                "fetch_price",
                "Get the current USD price of any token by name or symbol.",
                &["query"],
                &["what is BTC price?", "how much is solana right now"],
            ),
            ToolSpec::new(
                "transfer",
                "Transfer ETH or ERC-20 tokens to another wallet. Requires the \
                 recipient address, the amount, and the token (or 'ETH').",
                &["to_address", "amount", "token"],
                &["send 0.5 ETH to 0xBBB…", "transfer 100 MYTOKEN to Alice's wallet"],
            ),
            ToolSpec::new(
                "deploy_erc20",
                "Deploy a new ERC-20 token contract.",
                &["name", "symbol", "initial_supply"],
                &["deploy a token called MYTOKEN with 1000000 supply"],
            ),
            ToolSpec::new(
                "deploy_erc721",
                "Deploy a new ERC-721 NFT collection.",
                &["name", "symbol", "base_uri"],
                &["create an NFT collection called CryptoCats"],
            ),
            ToolSpec::new(
                "mint_nft",
                "Mint an NFT from an existing ERC-721 collection.",
                &["collection_address", "to_address"],
                &["mint the first NFT to my wallet"],
            ),
            ToolSpec::new(
                "get_token_info",
                "Get name, symbol, decimals, total supply, and creator of a \
                 deployed token.",
                &["token_id"],
                &["what are the details of my token"],
            ),
            ToolSpec::new(
                "get_token_balance",
                "Get the balance of a specific deployed token for a wallet.",
                &["token_id", "owner_address"],
                &["how much MYTOKEN does 0xAAA… hold"],
            ),
            ToolSpec::new(
                "get_nft_info",
                "Get information about one NFT in a collection.",
                &["collection_address", "token_id"],
                &["show me NFT #1 from my collection"],
            ),
            ToolSpec::new(
                "calculate",
                "Evaluate an arithmetic expression over earlier step results \
                 (e.g. dividing a balance by a price).",
                &["expression"],
                &["how much SOL can I buy with that balance"],
            ),
        ])
    }
}
