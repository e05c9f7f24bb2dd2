//! Substrate asset-chain submitter built on `subxt`.
//!
//! Epistemic foundation:
//! - K_i: A batch is `Utility.batch_all([mint, freeze]* ++ [remark])`, all or nothing
//! - B_i: Node reachable at startup (might fail) → bounded connection retries
//! - B_i: Extrinsic dispatches successfully (might fail) → Error status
//! - B_i: Watch reports every outcome (might not) → Unknown status, never Error
//! - I^B: Finality timing unknowable → caller bounds the wait

use super::{BatchSubmitter, Submission, SubmissionStatus};
use crate::models::{Batch, DistributionConfig, DistributorError, NodeConfig, Result};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::str::FromStr;
use std::time::Duration;
use subxt::config::polkadot::PolkadotExtrinsicParamsBuilder;
use subxt::dynamic::Value;
use subxt::tx::{Signer, TxInBlock, TxProgress, TxStatus};
use subxt::utils::AccountId32;
use subxt::{OnlineClient, PolkadotConfig};
use subxt_signer::sr25519::Keypair;
use tracing::{debug, info, warn};

type ChainClient = OnlineClient<PolkadotConfig>;
type Progress = TxProgress<PolkadotConfig, ChainClient>;

/// How each record turns into calls.
#[derive(Debug, Clone)]
pub struct DistributionCalls {
    pub asset_id: u32,
    pub amount_multiplier: u128,
    pub freeze: bool,
    pub remark_prefix: String,
}

impl From<&DistributionConfig> for DistributionCalls {
    fn from(config: &DistributionConfig) -> Self {
        Self {
            asset_id: config.asset_id,
            amount_multiplier: config.amount_multiplier,
            freeze: config.freeze,
            remark_prefix: config.remark_prefix.clone(),
        }
    }
}

impl DistributionCalls {
    /// Marker remark attached to every batch.
    pub fn remark_text(&self, batch_number: u64) -> String {
        format!("{} {}", self.remark_prefix, batch_number)
    }

    /// Calls making up a batch, in submission order.
    ///
    /// Fails without side effects if any record has an invalid address or an
    /// amount that overflows after the multiplier.
    pub fn build(&self, batch: &Batch) -> Result<Vec<Value>> {
        let per_record = if self.freeze { 2 } else { 1 };
        let mut calls = Vec::with_capacity(batch.len() * per_record + 1);

        for (offset, record) in batch.records.iter().enumerate() {
            let line = batch.first_line + offset as u64;

            let account = AccountId32::from_str(&record.account_id).map_err(|e| {
                DistributorError::BatchBuild {
                    batch: batch.number,
                    message: format!("line {line}: invalid account {}: {e:?}", record.account_id),
                }
            })?;
            let amount = record
                .total
                .checked_mul(self.amount_multiplier)
                .ok_or_else(|| DistributorError::BatchBuild {
                    batch: batch.number,
                    message: format!("line {line}: amount overflow for total {}", record.total),
                })?;

            calls.push(assets_call(
                "mint",
                [
                    ("id", Value::u128(u128::from(self.asset_id))),
                    ("beneficiary", beneficiary(&account)),
                    ("amount", Value::u128(amount)),
                ],
            ));
            if self.freeze {
                calls.push(assets_call(
                    "freeze",
                    [
                        ("id", Value::u128(u128::from(self.asset_id))),
                        ("who", beneficiary(&account)),
                    ],
                ));
            }
        }

        calls.push(Value::unnamed_variant(
            "System",
            [Value::named_variant(
                "remark_with_event",
                [(
                    "remark",
                    Value::from_bytes(self.remark_text(batch.number).as_bytes()),
                )],
            )],
        ));

        Ok(calls)
    }
}

fn beneficiary(account: &AccountId32) -> Value {
    Value::unnamed_variant("Id", [Value::from_bytes(account.0)])
}

fn assets_call<const N: usize>(call: &str, fields: [(&str, Value); N]) -> Value {
    Value::unnamed_variant("Assets", [Value::named_variant(call, fields)])
}

/// Submits distribution batches to a Substrate node.
pub struct SubstrateSubmitter {
    client: ChainClient,
    signer: Keypair,
    calls: DistributionCalls,
}

impl SubstrateSubmitter {
    /// Connect to the node and prepare the signer.
    ///
    /// I^B(node availability) → retry with exponential backoff
    pub async fn connect(
        node: &NodeConfig,
        distribution: &DistributionConfig,
        seed: [u8; 32],
    ) -> Result<Self> {
        let signer = Keypair::from_secret_key(seed)
            .map_err(|e| DistributorError::Chain(format!("Invalid signer seed: {e:?}")))?;
        let client = connect_with_retries(node).await?;

        let submitter = Self {
            client,
            signer,
            calls: DistributionCalls::from(distribution),
        };

        info!(
            url = %node.url,
            signer = %submitter.signer_account(),
            asset_id = distribution.asset_id,
            "Connected to node"
        );
        Ok(submitter)
    }

    /// Account the batches are signed by.
    pub fn signer_account(&self) -> AccountId32 {
        <Keypair as Signer<PolkadotConfig>>::account_id(&self.signer)
    }
}

/// Delay before the retry following `attempt` (0-based), doubling each time.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.min(16)))
}

async fn connect_with_retries(node: &NodeConfig) -> Result<ChainClient> {
    let attempts = node.connect_retries.max(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        match ChainClient::from_url(&node.url).await {
            Ok(client) => return Ok(client),
            Err(e) => {
                last_error = e.to_string();
                if attempt < attempts - 1 {
                    let backoff = backoff_delay(node.retry_backoff_ms, attempt);
                    warn!(
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %last_error,
                        "Retrying node connection"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    Err(DistributorError::Chain(format!(
        "Failed to connect to {} after {attempts} attempts: {last_error}",
        node.url
    )))
}

#[async_trait]
impl BatchSubmitter for SubstrateSubmitter {
    async fn account_nonce(&self) -> Result<u64> {
        self.client
            .tx()
            .account_nonce(&self.signer_account())
            .await
            .map_err(|e| DistributorError::Chain(format!("Fetching account nonce: {e}")))
    }

    async fn submit(&self, batch: &Batch) -> Result<Submission> {
        let calls = self.calls.build(batch)?;
        let tx = subxt::dynamic::tx("Utility", "batch_all", vec![Value::unnamed_composite(calls)]);
        let params = PolkadotExtrinsicParamsBuilder::<PolkadotConfig>::new()
            .nonce(batch.nonce)
            .build();

        // Signing is local, nothing has left the process yet
        let signed = self
            .client
            .tx()
            .create_signed(&tx, &self.signer, params)
            .await
            .map_err(|e| DistributorError::Chain(format!("Signing batch {}: {e}", batch.number)))?;

        // From here on the node may have received the extrinsic
        let progress = signed
            .submit_and_watch()
            .await
            .map_err(|e| DistributorError::OutcomeUnknown {
                batch: batch.number,
                detail: format!("submission failed after signing: {e}"),
            })?;

        let tx_hash = format!("{:?}", progress.extrinsic_hash());
        debug!(batch = batch.number, tx_hash = %tx_hash, "Batch submitted");

        Ok(Submission {
            tx_hash,
            statuses: status_stream(progress),
        })
    }
}

/// Whether the extrinsic in a block dispatched successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DispatchOutcome {
    Success,
    /// The runtime rejected the call; `batch_all` reverted everything
    Failed(String),
    /// Events could not be fetched
    Unverified(String),
}

/// Transaction progress reduced to what decides the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProgressEvent {
    BestBlock { block: String, outcome: DispatchOutcome },
    FinalizedBlock { block: String, outcome: DispatchOutcome },
    Invalid(String),
    PoolError(String),
    Dropped(String),
    /// The watch subscription itself failed
    Transport(String),
    /// Validated, broadcast or retracted
    Pending,
}

/// Status reported for an event, and whether the watch goes on afterwards.
///
/// Only an invalid transaction or a runtime dispatch failure proves the batch
/// was not applied. Pool errors, drops and lost watches may still end up
/// included, so they are reported as unknown.
fn classify(event: ProgressEvent) -> Option<(SubmissionStatus, bool)> {
    let classified = match event {
        ProgressEvent::BestBlock {
            block,
            outcome: DispatchOutcome::Success,
        } => (SubmissionStatus::included(block), true),
        ProgressEvent::FinalizedBlock {
            block,
            outcome: DispatchOutcome::Success,
        } => (SubmissionStatus::finalized(block), false),
        ProgressEvent::BestBlock {
            block,
            outcome: DispatchOutcome::Failed(e),
        }
        | ProgressEvent::FinalizedBlock {
            block,
            outcome: DispatchOutcome::Failed(e),
        } => (SubmissionStatus::error(format!("{e} (block {block})")), false),
        ProgressEvent::BestBlock {
            block,
            outcome: DispatchOutcome::Unverified(e),
        }
        | ProgressEvent::FinalizedBlock {
            block,
            outcome: DispatchOutcome::Unverified(e),
        } => (
            SubmissionStatus::unknown(format!("included in block {block}, events unavailable: {e}")),
            false,
        ),
        ProgressEvent::Invalid(message) => {
            (SubmissionStatus::error(format!("invalid: {message}")), false)
        }
        ProgressEvent::PoolError(message) => {
            (SubmissionStatus::unknown(format!("pool error: {message}")), false)
        }
        ProgressEvent::Dropped(message) => {
            (SubmissionStatus::unknown(format!("dropped: {message}")), false)
        }
        ProgressEvent::Transport(message) => {
            (SubmissionStatus::unknown(format!("watch failed: {message}")), false)
        }
        ProgressEvent::Pending => return None,
    };
    Some(classified)
}

async fn dispatch_outcome(in_block: &TxInBlock<PolkadotConfig, ChainClient>) -> DispatchOutcome {
    match in_block.wait_for_success().await {
        Ok(_) => DispatchOutcome::Success,
        Err(subxt::Error::Runtime(e)) => DispatchOutcome::Failed(e.to_string()),
        Err(e) => DispatchOutcome::Unverified(e.to_string()),
    }
}

async fn progress_event(status: TxStatus<PolkadotConfig, ChainClient>) -> ProgressEvent {
    match status {
        TxStatus::InBestBlock(in_block) => ProgressEvent::BestBlock {
            block: format!("{:?}", in_block.block_hash()),
            outcome: dispatch_outcome(&in_block).await,
        },
        TxStatus::InFinalizedBlock(in_block) => ProgressEvent::FinalizedBlock {
            block: format!("{:?}", in_block.block_hash()),
            outcome: dispatch_outcome(&in_block).await,
        },
        TxStatus::Invalid { message } => ProgressEvent::Invalid(message),
        TxStatus::Error { message } => ProgressEvent::PoolError(message),
        TxStatus::Dropped { message } => ProgressEvent::Dropped(message),
        _ => ProgressEvent::Pending,
    }
}

/// Map raw transaction progress onto submission statuses.
fn status_stream(progress: Progress) -> BoxStream<'static, SubmissionStatus> {
    stream::unfold(Some(progress), |state| async move {
        let mut progress = state?;
        loop {
            let event = match progress.next().await {
                None => return None,
                Some(Err(e)) => ProgressEvent::Transport(e.to_string()),
                Some(Ok(status)) => progress_event(status).await,
            };
            if let Some((status, more)) = classify(event) {
                return Some((status, more.then_some(progress)));
            }
        }
    })
    .boxed()
}
