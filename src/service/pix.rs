//! PIX charge creation and settlement monitoring.
//!
//! The PIX provider has no event push: settlement is observed by
//! polling the charge status on a two-phase schedule (a tight phase
//! while the payer has the QR code open, then a slower phase until the
//! charge's expiration window closes). Settlement applies one atomic
//! ledger transaction guarded on the status row's `finalizado` flag, so
//! concurrent pollers can never credit the balance twice.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::money::{format_cents, net_of_fee, parse_amount_to_cents};
use crate::domain::records::{now_secs, rfc3339};
use crate::domain::{PixCharge, PixStatusRecord};
use crate::error::GatewayError;
use crate::ledger::keys::{pix_charge_sort_key, TX_PREFIX};
use crate::ledger::{AttrValue, Guard, ItemKey, LedgerError, LedgerStore, UpdateAction, WriteOp};
use crate::provider::{PixChargeParams, PixProvider};

use super::dispatch::PollDispatcher;

/// Provider status of a payable charge.
pub const STATUS_ACTIVE: &str = "ATIVA";
/// Provider status of a settled charge.
pub const STATUS_SETTLED: &str = "CONCLUIDA";
/// Local status applied when the polling window closes unpaid.
pub const STATUS_EXPIRED: &str = "VENCIDO";

/// Charge expiration window requested from the provider, in seconds.
const CHARGE_EXPIRATION_SECS: i64 = 3_600;

/// Two-phase polling schedule.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    /// Interval of the tight first phase.
    pub short_interval: Duration,
    /// Attempts in the tight first phase.
    pub short_attempts: u32,
    /// Interval of the slow second phase.
    pub long_interval: Duration,
    /// Attempts in the slow second phase.
    pub long_attempts: u32,
}

impl Default for PollSchedule {
    /// 30s x 10 then 60s x 21: covers the one-hour charge expiration
    /// window with margin.
    fn default() -> Self {
        Self {
            short_interval: Duration::from_secs(30),
            short_attempts: 10,
            long_interval: Duration::from_secs(60),
            long_attempts: 21,
        }
    }
}

impl PollSchedule {
    const fn phases(self) -> [(Duration, u32); 2] {
        [
            (self.short_interval, self.short_attempts),
            (self.long_interval, self.long_attempts),
        ]
    }
}

/// Inputs for a new PIX charge.
#[derive(Debug, Clone)]
pub struct NewPixCharge {
    /// Donation the charge credits.
    pub donation_id: String,
    /// Charge value as a decimal string (`"100.00"`).
    pub amount: String,
    /// Payer CPF.
    pub payer_cpf: String,
    /// Payer display name.
    pub payer_name: String,
    /// Receiving PIX key.
    pub pix_key: String,
    /// Donor message shown in the feed once settled.
    pub message: String,
    /// Payer asked not to be named.
    pub anonymous: bool,
}

/// Result of creating a PIX charge.
#[derive(Debug, Clone)]
pub struct PixChargeIssued {
    /// Charge row identifier.
    pub charge_id: String,
    /// Provider transaction identifier.
    pub txid: String,
    /// Payment location URL.
    pub location: String,
    /// Copy-and-paste payment code.
    pub copy_paste: String,
    /// Full provider response, passed through to the caller.
    pub raw: serde_json::Value,
}

/// Terminal outcome of a monitor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The charge settled and the donation balance was credited.
    Settled,
    /// The polling window closed unpaid; the charge was marked expired.
    Expired,
    /// Settlement had already been processed; nothing to do.
    AlreadyFinalized,
}

/// PIX charge service: creation, status passthrough, settlement
/// monitoring and the recovery sweep.
#[derive(Debug)]
pub struct PixService {
    ledger: Arc<dyn LedgerStore>,
    provider: Arc<dyn PixProvider>,
    dispatcher: PollDispatcher,
    schedule: PollSchedule,
    /// Platform fee in basis points, retained from every settled
    /// charge.
    fee_bps: u32,
}

impl PixService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        provider: Arc<dyn PixProvider>,
        dispatcher: PollDispatcher,
        schedule: PollSchedule,
        fee_bps: u32,
    ) -> Self {
        Self {
            ledger,
            provider,
            dispatcher,
            schedule,
            fee_bps,
        }
    }

    /// Creates an immediate PIX charge, records the invisible charge
    /// row and its polling state in one transaction, and hands the
    /// transaction to the monitor queue.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] on bad input, a
    /// provider error when the charge cannot be created, or a ledger
    /// error on write failure.
    pub async fn create_charge(
        &self,
        input: &NewPixCharge,
    ) -> Result<PixChargeIssued, GatewayError> {
        let donation_id = input.donation_id.trim();
        let payer_cpf = input.payer_cpf.trim();
        let payer_name = input.payer_name.trim();
        let pix_key = input.pix_key.trim();
        if donation_id.is_empty() || payer_cpf.is_empty() || payer_name.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "donation_id, payer_cpf and payer_name are required".to_string(),
            ));
        }
        if pix_key.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "pix_key is required".to_string(),
            ));
        }
        let amount_cents = parse_amount_to_cents(&input.amount)
            .map_err(|e| GatewayError::InvalidRequest(format!("amount: {e}")))?;

        let created = self
            .provider
            .create_immediate_charge(&PixChargeParams {
                amount: format_cents(amount_cents),
                payer_cpf: payer_cpf.to_string(),
                payer_name: payer_name.to_string(),
                pix_key: pix_key.to_string(),
                expiration_secs: CHARGE_EXPIRATION_SECS,
            })
            .await?;

        let now = now_secs();
        let charge_id = Uuid::new_v4().to_string();
        let charge_sk = pix_charge_sort_key(now, &charge_id);
        let charge = PixCharge {
            id: charge_id.clone(),
            donation_id: donation_id.to_string(),
            amount_cents,
            payer_cpf: payer_cpf.to_string(),
            payer_name: payer_name.to_string(),
            message: input.message.trim().to_string(),
            anonymous: input.anonymous,
            // Charges surface in the public feed only once settled.
            visible: false,
            status: created.status.clone(),
            txid: created.txid.clone(),
            created_at: now,
        };
        let status_record = PixStatusRecord {
            charge_id: charge_id.clone(),
            donation_id: donation_id.to_string(),
            charge_sk: charge_sk.clone(),
            txid: created.txid.clone(),
            status: created.status.clone(),
            pollable: true,
            finalized: false,
            paid_at: None,
            expiration_secs: created.expiration_secs,
            location: created.location.clone(),
            copy_paste: created.copy_paste.clone(),
            pix_key: pix_key.to_string(),
            amount_cents,
            created_at: now,
        };

        let ops = vec![
            WriteOp::Put {
                key: ItemKey::pix_charge(donation_id, &charge_sk),
                item: charge.to_item(),
                guard: Some(Guard::NotExists),
            },
            WriteOp::Put {
                key: ItemKey::pix_status(&created.txid),
                item: status_record.to_item(),
                guard: Some(Guard::NotExists),
            },
        ];
        self.ledger.transact_write(ops).await?;

        tracing::info!(
            charge_id = %charge_id,
            txid = %created.txid,
            donation_id = %donation_id,
            amount = amount_cents,
            "pix charge created"
        );
        self.dispatcher.enqueue(&created.txid).await;

        Ok(PixChargeIssued {
            charge_id,
            txid: created.txid,
            location: created.location,
            copy_paste: created.copy_paste,
            raw: created.raw,
        })
    }

    /// Fetches the provider's charge detail for a transaction.
    ///
    /// # Errors
    ///
    /// Returns a provider error when the call fails.
    pub async fn charge_detail(&self, txid: &str) -> Result<serde_json::Value, GatewayError> {
        Ok(self.provider.charge_detail(txid).await?)
    }

    /// Polls a transaction until it settles or the schedule is
    /// exhausted. Settlement credits the donation balance; exhaustion
    /// marks the charge expired.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Inconsistency`] when no polling state
    /// exists for the transaction, a provider error when status polling
    /// fails, or a ledger error on write failure.
    pub async fn monitor(&self, txid: &str) -> Result<MonitorOutcome, GatewayError> {
        let record = self.status_record(txid).await?;
        if record.finalized || !record.pollable {
            return Ok(MonitorOutcome::AlreadyFinalized);
        }

        let phases = self.schedule.phases();
        let mut remaining: u32 = phases.iter().map(|(_, attempts)| attempts).sum();
        for (interval, attempts) in phases {
            for attempt in 0..attempts {
                let status = self.provider.charge_status(txid).await?;
                if status == STATUS_SETTLED {
                    self.settle(&record).await?;
                    return Ok(MonitorOutcome::Settled);
                }
                tracing::debug!(txid, %status, attempt, "pix charge not settled yet");
                remaining = remaining.saturating_sub(1);
                // No point waiting out an interval after the last check.
                if remaining > 0 {
                    tokio::time::sleep(interval).await;
                }
            }
        }

        self.mark_expired(txid).await?;
        tracing::info!(txid, "pix charge expired unpaid");
        Ok(MonitorOutcome::Expired)
    }

    /// Hands a transaction to the monitor queue without waiting for
    /// the poll to finish.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ChargeNotFound`] when no polling state
    /// exists for the transaction.
    pub async fn request_monitor(&self, txid: &str) -> Result<(), GatewayError> {
        let txid = txid.trim();
        if self.ledger.get(&ItemKey::pix_status(txid)).await?.is_none() {
            return Err(GatewayError::ChargeNotFound(txid.to_string()));
        }
        self.dispatcher.enqueue(txid).await;
        Ok(())
    }

    /// Re-enqueues every transaction whose polling state is still
    /// active, recovering monitors lost to a restart. Returns how many
    /// transactions were enqueued.
    ///
    /// # Errors
    ///
    /// Returns a ledger error when the scan fails.
    pub async fn sweep(&self) -> Result<usize, GatewayError> {
        let items = self.ledger.scan_prefix(TX_PREFIX).await?;
        let mut enqueued = 0;
        for item in items {
            let Ok(record) = PixStatusRecord::from_item(&item) else {
                tracing::warn!("skipping malformed pix status row in sweep");
                continue;
            };
            if record.status == STATUS_ACTIVE && record.pollable && !record.finalized {
                self.dispatcher.enqueue(&record.txid).await;
                enqueued += 1;
            }
        }
        tracing::info!(enqueued, "pix sweep finished");
        Ok(enqueued)
    }

    async fn status_record(&self, txid: &str) -> Result<PixStatusRecord, GatewayError> {
        let item = self
            .ledger
            .get(&ItemKey::pix_status(txid))
            .await?
            .ok_or_else(|| {
                GatewayError::Inconsistency(format!("no polling state for transaction {txid}"))
            })?;
        Ok(PixStatusRecord::from_item(&item)?)
    }

    /// Applies settlement atomically: finalizes the status row (guarded
    /// on `finalizado` still being false), flips the charge row
    /// visible, and credits the donation balance net of the platform
    /// fee. A lost race on the guard means another poller already
    /// settled the transaction.
    async fn settle(&self, record: &PixStatusRecord) -> Result<(), GatewayError> {
        let now = now_secs();
        let net = net_of_fee(record.amount_cents, self.fee_bps);

        let ops = vec![
            WriteOp::Update {
                key: ItemKey::pix_status(&record.txid),
                actions: vec![
                    UpdateAction::Set("status".to_string(), AttrValue::from(STATUS_SETTLED)),
                    UpdateAction::Set("buscar".to_string(), AttrValue::Bool(false)),
                    UpdateAction::Set("finalizado".to_string(), AttrValue::Bool(true)),
                    UpdateAction::Set("data_pago".to_string(), AttrValue::from(rfc3339(now))),
                ],
                guard: Some(Guard::Equals(
                    "finalizado".to_string(),
                    AttrValue::Bool(false),
                )),
            },
            WriteOp::Update {
                key: ItemKey::pix_charge(&record.donation_id, &record.charge_sk),
                actions: vec![
                    UpdateAction::Set("visivel".to_string(), AttrValue::Bool(true)),
                    UpdateAction::Set("status".to_string(), AttrValue::from(STATUS_SETTLED)),
                ],
                guard: Some(Guard::Exists),
            },
            WriteOp::Update {
                key: ItemKey::balance(&record.donation_id),
                actions: vec![
                    UpdateAction::Add("valor_disponivel_centavos".to_string(), net),
                    UpdateAction::Set("data_update".to_string(), AttrValue::from(rfc3339(now))),
                ],
                guard: None,
            },
        ];

        match self.ledger.transact_write(ops).await {
            Ok(()) => {
                tracing::info!(
                    txid = %record.txid,
                    donation_id = %record.donation_id,
                    credited = net,
                    "pix charge settled"
                );
                Ok(())
            }
            // Index 0 is the finalization guard: another poller won the
            // race and the credit already happened exactly once.
            Err(LedgerError::ConditionFailed(0)) => {
                tracing::info!(txid = %record.txid, "pix charge already settled");
                Ok(())
            }
            Err(LedgerError::ConditionFailed(index)) => {
                Err(GatewayError::Inconsistency(format!(
                    "settlement of transaction {} hit a missing row (operation {index})",
                    record.txid
                )))
            }
            Err(LedgerError::Backend(msg)) => Err(GatewayError::Store(msg)),
        }
    }

    async fn mark_expired(&self, txid: &str) -> Result<(), GatewayError> {
        self.ledger
            .update(
                &ItemKey::pix_status(txid),
                &[
                    UpdateAction::Set("status".to_string(), AttrValue::from(STATUS_EXPIRED)),
                    UpdateAction::Set("buscar".to_string(), AttrValue::Bool(false)),
                ],
                Some(Guard::Exists),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::ledger::MemoryLedger;
    use crate::provider::{PixChargeCreated, ProviderError};

    use super::*;

    /// Provider double: answers `create_immediate_charge` with a canned
    /// charge and `charge_detail` with a scripted status sequence,
    /// repeating the last status when the script runs out.
    #[derive(Debug)]
    struct ScriptedPix {
        statuses: Mutex<VecDeque<String>>,
    }

    impl ScriptedPix {
        fn with_statuses(statuses: &[&str]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().map(|s| (*s).to_string()).collect()),
            }
        }
    }

    #[async_trait]
    impl PixProvider for ScriptedPix {
        async fn create_immediate_charge(
            &self,
            params: &PixChargeParams,
        ) -> Result<PixChargeCreated, ProviderError> {
            Ok(PixChargeCreated {
                txid: "tx-1".to_string(),
                status: STATUS_ACTIVE.to_string(),
                expiration_secs: params.expiration_secs,
                location: "pix.example/loc/1".to_string(),
                copy_paste: "00020126...".to_string(),
                created_at: Utc::now(),
                raw: serde_json::json!({"txid": "tx-1", "status": STATUS_ACTIVE}),
            })
        }

        async fn charge_detail(&self, _txid: &str) -> Result<serde_json::Value, ProviderError> {
            let Ok(mut statuses) = self.statuses.lock() else {
                panic!("lock poisoned");
            };
            let status = if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            }
            .unwrap_or_else(|| STATUS_ACTIVE.to_string());
            Ok(serde_json::json!({"txid": "tx-1", "status": status}))
        }
    }

    fn fast_schedule() -> PollSchedule {
        PollSchedule {
            short_interval: Duration::from_millis(1),
            short_attempts: 2,
            long_interval: Duration::from_millis(1),
            long_attempts: 2,
        }
    }

    fn service_with(
        statuses: &[&str],
    ) -> (Arc<PixService>, Arc<MemoryLedger>, super::super::PollQueue) {
        service_with_schedule(statuses, fast_schedule())
    }

    fn service_with_schedule(
        statuses: &[&str],
        schedule: PollSchedule,
    ) -> (Arc<PixService>, Arc<MemoryLedger>, super::super::PollQueue) {
        let ledger = Arc::new(MemoryLedger::new());
        let store = Arc::clone(&ledger) as Arc<dyn LedgerStore>;
        let (dispatcher, queue) = PollDispatcher::channel(16);
        let service = Arc::new(PixService::new(
            store,
            Arc::new(ScriptedPix::with_statuses(statuses)),
            dispatcher,
            schedule,
            1_000,
        ));
        (service, ledger, queue)
    }

    fn charge_input() -> NewPixCharge {
        NewPixCharge {
            donation_id: "d-1".to_string(),
            amount: "100.00".to_string(),
            payer_cpf: "12345678901".to_string(),
            payer_name: "Maria".to_string(),
            pix_key: "chave@example.com".to_string(),
            message: "boa sorte".to_string(),
            anonymous: false,
        }
    }

    #[tokio::test]
    async fn create_charge_records_invisible_charge_and_polling_state() {
        let (service, ledger, _queue) = service_with(&[STATUS_ACTIVE]);
        let Ok(issued) = service.create_charge(&charge_input()).await else {
            panic!("create failed");
        };
        assert_eq!(issued.txid, "tx-1");

        let Ok(Some(item)) = ledger.get(&ItemKey::pix_status("tx-1")).await else {
            panic!("status row missing");
        };
        let Ok(record) = PixStatusRecord::from_item(&item) else {
            panic!("status row malformed");
        };
        assert!(record.pollable);
        assert!(!record.finalized);
        assert_eq!(record.amount_cents, 10_000);

        let Ok(Some(item)) = ledger
            .get(&ItemKey::pix_charge("d-1", &record.charge_sk))
            .await
        else {
            panic!("charge row missing");
        };
        let Ok(charge) = PixCharge::from_item(&item) else {
            panic!("charge row malformed");
        };
        assert!(!charge.visible);
        assert_eq!(charge.status, STATUS_ACTIVE);
    }

    #[tokio::test]
    async fn settlement_credits_balance_net_of_fee() {
        let (service, ledger, _queue) = service_with(&[STATUS_ACTIVE, STATUS_SETTLED]);
        let Ok(_issued) = service.create_charge(&charge_input()).await else {
            panic!("create failed");
        };
        let Ok(outcome) = service.monitor("tx-1").await else {
            panic!("monitor failed");
        };
        assert_eq!(outcome, MonitorOutcome::Settled);

        // 100.00 charged, 10% platform fee retained.
        let Ok(Some(balance)) = ledger.get(&ItemKey::balance("d-1")).await else {
            panic!("balance row missing");
        };
        assert_eq!(
            balance
                .get("valor_disponivel_centavos")
                .and_then(AttrValue::as_n),
            Some(9_000)
        );

        let Ok(Some(item)) = ledger.get(&ItemKey::pix_status("tx-1")).await else {
            panic!("status row missing");
        };
        let Ok(record) = PixStatusRecord::from_item(&item) else {
            panic!("status row malformed");
        };
        assert!(record.finalized);
        assert!(!record.pollable);
        assert!(record.paid_at.is_some());

        let Ok(Some(item)) = ledger
            .get(&ItemKey::pix_charge("d-1", &record.charge_sk))
            .await
        else {
            panic!("charge row missing");
        };
        let Ok(charge) = PixCharge::from_item(&item) else {
            panic!("charge row malformed");
        };
        assert!(charge.visible);
        assert_eq!(charge.status, STATUS_SETTLED);
    }

    #[tokio::test]
    async fn finalized_transaction_is_never_credited_twice() {
        let (service, ledger, _queue) = service_with(&[STATUS_SETTLED]);
        let Ok(_issued) = service.create_charge(&charge_input()).await else {
            panic!("create failed");
        };
        let Ok(first) = service.monitor("tx-1").await else {
            panic!("first monitor failed");
        };
        assert_eq!(first, MonitorOutcome::Settled);

        let Ok(second) = service.monitor("tx-1").await else {
            panic!("second monitor failed");
        };
        assert_eq!(second, MonitorOutcome::AlreadyFinalized);

        let Ok(Some(balance)) = ledger.get(&ItemKey::balance("d-1")).await else {
            panic!("balance row missing");
        };
        assert_eq!(
            balance
                .get("valor_disponivel_centavos")
                .and_then(AttrValue::as_n),
            Some(9_000)
        );
    }

    #[tokio::test]
    async fn exhausted_schedule_marks_charge_expired() {
        let (service, ledger, _queue) = service_with(&[STATUS_ACTIVE]);
        let Ok(_issued) = service.create_charge(&charge_input()).await else {
            panic!("create failed");
        };
        let Ok(outcome) = service.monitor("tx-1").await else {
            panic!("monitor failed");
        };
        assert_eq!(outcome, MonitorOutcome::Expired);

        let Ok(Some(item)) = ledger.get(&ItemKey::pix_status("tx-1")).await else {
            panic!("status row missing");
        };
        let Ok(record) = PixStatusRecord::from_item(&item) else {
            panic!("status row malformed");
        };
        assert_eq!(record.status, STATUS_EXPIRED);
        assert!(!record.pollable);
    }

    #[tokio::test]
    async fn final_attempt_expires_without_a_trailing_wait() {
        // The last phase carries a long interval; the monitor must not
        // sleep it out after the last status check.
        let schedule = PollSchedule {
            short_interval: Duration::from_millis(1),
            short_attempts: 1,
            long_interval: Duration::from_secs(60),
            long_attempts: 1,
        };
        let (service, _ledger, _queue) = service_with_schedule(&[STATUS_ACTIVE], schedule);
        let Ok(_issued) = service.create_charge(&charge_input()).await else {
            panic!("create failed");
        };
        let monitored = tokio::time::timeout(Duration::from_secs(5), service.monitor("tx-1")).await;
        let Ok(Ok(outcome)) = monitored else {
            panic!("monitor did not finish after its last attempt");
        };
        assert_eq!(outcome, MonitorOutcome::Expired);
    }

    #[tokio::test]
    async fn sweep_requeues_only_active_pollable_transactions() {
        let (service, _ledger, mut queue) = service_with(&[STATUS_ACTIVE]);
        let Ok(_issued) = service.create_charge(&charge_input()).await else {
            panic!("create failed");
        };
        // Drain the enqueue from creation so the sweep's is observable.
        let Some(first) = queue.recv().await else {
            panic!("creation enqueue missing");
        };
        assert_eq!(first, "tx-1");

        let Ok(enqueued) = service.sweep().await else {
            panic!("sweep failed");
        };
        assert_eq!(enqueued, 1);
        let Some(again) = queue.recv().await else {
            panic!("sweep enqueue missing");
        };
        assert_eq!(again, "tx-1");
    }

    #[tokio::test]
    async fn invalid_amount_is_rejected_before_the_provider_call() {
        let (service, _ledger, _queue) = service_with(&[STATUS_ACTIVE]);
        let mut input = charge_input();
        input.amount = "10,5,0".to_string();
        assert!(matches!(
            service.create_charge(&input).await,
            Err(GatewayError::InvalidRequest(_))
        ));
    }
}
