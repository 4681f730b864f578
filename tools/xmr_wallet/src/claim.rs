use monero_rpc::monero::{self, Network};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::crypto::PrivateKeyPair;
use crate::rpc::XmrWallet;
use crate::types::Result;

/// Parameters for sweeping the joint swap account into a destination address.
pub struct SweepParams<'a> {
    /// Joint keypair (s_a + s_b, v_a + v_b) able to spend the swap account.
    pub keypair: &'a PrivateKeyPair,
    pub network: Network,
    /// Wallet filename for the imported swap account; must be unique per swap.
    pub wallet_filename: String,
    /// Chain height shortly before the lock transaction, to bound the rescan.
    pub restore_height: u64,
    pub destination: monero::Address,
    /// Wallet file to reopen after the sweep, if any.
    pub reopen_wallet: Option<String>,
}

/// Imports the joint account keys into a fresh wallet file, rescans from
/// `restore_height` and sweeps the whole balance to the destination address.
/// Returns the sweep transaction hashes.
pub async fn sweep_joint_account(
    token: &CancellationToken,
    wallet: &XmrWallet,
    params: &SweepParams<'_>,
) -> Result<Vec<String>> {
    let account_address = params.keypair.public_key_pair().address(params.network)?;
    info!(
        address = %account_address,
        restore_height = params.restore_height,
        "Claiming funds from the joint swap account"
    );

    wallet
        .generate_from_keys(
            token,
            params.keypair.spend_key().to_bytes(),
            params.keypair.view_key().to_bytes(),
            &account_address.to_string(),
            &params.wallet_filename,
            Some(params.restore_height),
        )
        .await?;

    wallet.refresh(token, Some(params.restore_height)).await?;

    let balance = wallet.get_balance(token, 0).await?;
    info!(piconero = balance.balance, "Joint account balance before sweep");

    let tx_hashes = wallet.sweep_all(token, &params.destination).await?;
    info!(?tx_hashes, "Swept joint account");

    if let Some(primary) = &params.reopen_wallet {
        wallet.open_wallet(token, primary, None).await?;
    }

    Ok(tx_hashes)
}
