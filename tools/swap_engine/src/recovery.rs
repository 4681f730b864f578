//! Startup recovery: re-instantiate swaps from the recovery DB.
//!
//! Only swaps that already locked XMR (status at least XMRLocked) are
//! resumed; earlier stages took no irreversible action, so they are aborted
//! and their offers re-advertised.

use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::SwapError;
use crate::maker::{MakerSwap, SwapHandle};
use crate::types::Status;

/// Scans the recovery DB and resumes every recoverable maker swap,
/// returning their handles. Unrecoverable entries are cleaned up.
pub async fn recover_ongoing_swaps(backend: Arc<Backend>) -> Result<Vec<SwapHandle>, SwapError> {
    let mut handles = Vec::new();

    for offer_id in backend.recovery_db.list_offer_ids()? {
        let Some(ongoing) = backend.recovery_db.get_ongoing_offer(&offer_id)? else {
            warn!(%offer_id, "recovery entry without an offer record; removing");
            backend.recovery_db.delete_swap(&offer_id)?;
            continue;
        };

        if !matches!(ongoing.status, Status::XmrLocked | Status::ContractReady) {
            // Nothing irreversible happened; abort safely and offer again.
            info!(
                %offer_id,
                status = %ongoing.status,
                "aborting unrecoverable swap from before the restart"
            );
            backend.recovery_db.delete_swap(&offer_id)?;
            if let Err(err) = backend
                .offers
                .add_offer(ongoing.offer, ongoing.extra)
            {
                warn!(%err, %offer_id, "failed to re-advertise recovered offer");
            }
            continue;
        }

        let Some(spend_key) = backend.recovery_db.get_swap_private_key(&offer_id)? else {
            return Err(SwapError::MissingRecoveryRecord("swap-private-key", offer_id));
        };
        let Some(eth_info) = backend.recovery_db.get_ethereum_swap_info(&offer_id)? else {
            return Err(SwapError::MissingRecoveryRecord("eth-swap-info", offer_id));
        };

        info!(
            %offer_id,
            status = %ongoing.status,
            start_block = eth_info.start_block,
            "resuming swap from recovery records"
        );
        let (swap, handle, _status_rx) =
            MakerSwap::new_from_ongoing(backend.clone(), ongoing, eth_info, spend_key)?;
        tokio::spawn(swap.run());
        handles.push(handle);
    }

    Ok(handles)
}
