//! Node endpoint resolution
//!
//! The remembered endpoint always wins. When nothing has been remembered the
//! session falls back to, in order:
//! 1. `ETH_RPC_URL`
//! 2. `INFURA_API_KEY` - builds a URL for chains Infura serves
//! 3. A local node at `http://127.0.0.1:8545`

/// Chain ID constants
pub mod chains {
    pub const MAINNET: u64 = 1;
    pub const RINKEBY: u64 = 4;
    pub const GOERLI: u64 = 5;
    pub const SEPOLIA: u64 = 11155111;
}

/// Environment variable names
mod env_vars {
    pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
    pub const INFURA_API_KEY: &str = "INFURA_API_KEY";
}

pub const LOCAL_NODE: &str = "http://127.0.0.1:8545";

fn infura_network(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        chains::MAINNET => Some("mainnet"),
        chains::GOERLI => Some("goerli"),
        chains::SEPOLIA => Some("sepolia"),
        _ => None,
    }
}

/// Resolve a fallback endpoint for `chain_id` from the environment
pub fn endpoint_from_env(chain_id: u64) -> String {
    if let Ok(url) = std::env::var(env_vars::ETH_RPC_URL) {
        if !url.is_empty() {
            tracing::debug!("Using ETH_RPC_URL as fallback endpoint");
            return url;
        }
    }

    if let (Ok(key), Some(network)) = (
        std::env::var(env_vars::INFURA_API_KEY),
        infura_network(chain_id),
    ) {
        tracing::debug!(network, "Building fallback endpoint from INFURA_API_KEY");
        return format!("https://{}.infura.io/v3/{}", network, key);
    }

    tracing::warn!(chain_id, "No node endpoint configured, using local node");
    LOCAL_NODE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infura_networks() {
        assert_eq!(infura_network(chains::MAINNET), Some("mainnet"));
        assert_eq!(infura_network(chains::SEPOLIA), Some("sepolia"));
        assert_eq!(infura_network(chains::RINKEBY), None);
    }

    #[test]
    fn test_unknown_chain_without_env_falls_back_locally() {
        std::env::remove_var(env_vars::ETH_RPC_URL);
        assert_eq!(endpoint_from_env(999_999), LOCAL_NODE);
    }
}
