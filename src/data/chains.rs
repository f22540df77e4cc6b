pub const MAINNET_CHAIN_ID: u64 = 1;

/// Chain ids used by local development nodes (anvil, hardhat, ganache).
const LOCAL_DEV_CHAIN_IDS: &[u64] = &[31337, 1337];

/// Get the display name of a network by chain id.
pub fn network_name(chain_id: u64) -> &'static str {
    match chain_id {
        MAINNET_CHAIN_ID => "Main",
        5 => "Goerli",
        17000 => "Holesky",
        11155111 => "Sepolia",
        10 => "Optimism",
        42161 => "Arbitrum One",
        8453 => "Base",
        137 => "Polygon",
        id if LOCAL_DEV_CHAIN_IDS.contains(&id) => "Local VM",
        _ => "Custom",
    }
}

/// Whether the chain id belongs to a local simulated execution environment.
pub fn is_local_dev_chain(chain_id: u64) -> bool {
    LOCAL_DEV_CHAIN_IDS.contains(&chain_id)
}
