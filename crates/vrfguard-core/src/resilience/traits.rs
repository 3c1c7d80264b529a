//! Capabilities the resilience layer consumes but does not implement.

use async_trait::async_trait;
use vrfguard_types::{
    AccountIdentity, ChainStateAnchor, Confirmation, Operation, OracleAccountInfo, OracleFailure,
    QueueSnapshot, Signature,
};

/// Signs, broadcasts and confirms transactions. Must tolerate repeated calls
/// with different anchors.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    async fn submit(
        &self,
        operation: &Operation,
        anchor: &ChainStateAnchor,
    ) -> Result<Signature, OracleFailure>;

    async fn confirm(
        &self,
        signature: &Signature,
        anchor: &ChainStateAnchor,
    ) -> Result<Confirmation, OracleFailure>;

    async fn fresh_anchor(&self) -> Result<ChainStateAnchor, OracleFailure>;
}

/// Reads oracle account and queue state.
#[async_trait]
pub trait OracleAccountLoader: Send + Sync {
    /// `Ok(None)` when the account does not exist.
    async fn load(
        &self,
        identity: &AccountIdentity,
    ) -> Result<Option<OracleAccountInfo>, OracleFailure>;

    /// `Ok(None)` when the queue does not exist.
    async fn load_queue(&self, queue: &str) -> Result<Option<QueueSnapshot>, OracleFailure>;
}

/// Submit with the given anchor and wait for confirmation. An on-chain
/// program error becomes [`OracleFailure::OnChain`].
pub async fn submit_and_confirm(
    submitter: &dyn TransactionSubmitter,
    operation: &Operation,
    anchor: &ChainStateAnchor,
) -> Result<Signature, OracleFailure> {
    let signature = submitter.submit(operation, anchor).await?;
    match submitter.confirm(&signature, anchor).await? {
        Confirmation::Confirmed => Ok(signature),
        Confirmation::OnChainError(message) => Err(OracleFailure::on_chain(message)),
    }
}

/// One-shot execution with a freshly fetched anchor.
pub async fn execute_operation(
    submitter: &dyn TransactionSubmitter,
    operation: &Operation,
) -> Result<Signature, OracleFailure> {
    let anchor = submitter.fresh_anchor().await?;
    submit_and_confirm(submitter, operation, &anchor).await
}
