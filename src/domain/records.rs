//! Typed ledger records and their item conversions.
//!
//! Every record converts to and from the flat attribute map stored in
//! the ledger. Reads match attribute variants explicitly and report
//! which attribute was missing or malformed instead of panicking on a
//! bad row.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::ledger::item::{AttrValue, Item};

use super::status::{DonationStatus, PaymentStatus};

/// A stored row could not be converted to its typed record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Required attribute absent.
    #[error("missing attribute `{0}`")]
    Missing(&'static str),
    /// Attribute present but the wrong variant or unparseable.
    #[error("malformed attribute `{0}`")]
    Malformed(&'static str),
}

/// A donation awaiting or holding payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Donation {
    /// Donation identifier (UUID v4 at creation).
    pub id: String,
    /// Campaign the donation belongs to.
    pub campaign_id: String,
    /// Expected amount in minor currency units.
    pub amount_expected: i64,
    /// ISO currency code, uppercase.
    pub currency: String,
    /// Lifecycle state.
    pub status: DonationStatus,
    /// Donor display name.
    pub donor_name: String,
    /// Donor contact email.
    pub donor_email: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Donation {
    /// Converts to the stored attribute map.
    #[must_use]
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert("donationId".into(), AttrValue::from(self.id.clone()));
        item.insert(
            "campaignId".into(),
            AttrValue::from(self.campaign_id.clone()),
        );
        item.insert("amountExpected".into(), AttrValue::N(self.amount_expected));
        item.insert("currency".into(), AttrValue::from(self.currency.clone()));
        item.insert("status".into(), AttrValue::from(self.status.as_str()));
        item.insert("donorName".into(), AttrValue::from(self.donor_name.clone()));
        item.insert(
            "donorEmail".into(),
            AttrValue::from(self.donor_email.clone()),
        );
        item.insert("createdAt".into(), AttrValue::from(rfc3339(self.created_at)));
        item.insert("updatedAt".into(), AttrValue::from(rfc3339(self.updated_at)));
        item
    }

    /// Reads a donation back from its stored attribute map.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] naming the offending attribute.
    pub fn from_item(item: &Item) -> Result<Self, RecordError> {
        Ok(Self {
            id: req_s(item, "donationId")?,
            campaign_id: req_s(item, "campaignId")?,
            amount_expected: req_n(item, "amountExpected")?,
            currency: req_s(item, "currency")?,
            status: DonationStatus::parse(&req_s(item, "status")?)
                .ok_or(RecordError::Malformed("status"))?,
            donor_name: req_s(item, "donorName")?,
            donor_email: req_s(item, "donorEmail")?,
            created_at: req_time(item, "createdAt")?,
            updated_at: req_time(item, "updatedAt")?,
        })
    }
}

/// A provider payment linked to a donation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    /// Provider payment-intent identifier (also the partition key).
    pub payment_intent_id: String,
    /// Parent donation identifier.
    pub donation_id: String,
    /// Campaign carried through from the donation.
    pub campaign_id: String,
    /// Amount in minor currency units.
    pub amount: i64,
    /// ISO currency code, uppercase.
    pub currency: String,
    /// Lifecycle state.
    pub status: PaymentStatus,
    /// Provider charge identifier, once known.
    pub charge_id: Option<String>,
    /// Identifier of the last event applied to this row; idempotency
    /// diagnostics only.
    pub last_event_id: Option<String>,
    /// Intent creation time on the provider's side.
    pub created_at_stripe: DateTime<Utc>,
    /// Ledger creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Converts to the stored attribute map.
    #[must_use]
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(
            "paymentIntentId".into(),
            AttrValue::from(self.payment_intent_id.clone()),
        );
        item.insert("donationId".into(), AttrValue::from(self.donation_id.clone()));
        item.insert(
            "campaignId".into(),
            AttrValue::from(self.campaign_id.clone()),
        );
        item.insert("amount".into(), AttrValue::N(self.amount));
        item.insert("currency".into(), AttrValue::from(self.currency.clone()));
        item.insert("status".into(), AttrValue::from(self.status.as_str()));
        if let Some(charge_id) = &self.charge_id {
            item.insert("chargeId".into(), AttrValue::from(charge_id.clone()));
        }
        if let Some(event_id) = &self.last_event_id {
            item.insert("rawEventLastId".into(), AttrValue::from(event_id.clone()));
        }
        item.insert(
            "createdAtStripe".into(),
            AttrValue::from(rfc3339(self.created_at_stripe)),
        );
        item.insert("createdAt".into(), AttrValue::from(rfc3339(self.created_at)));
        item.insert("updatedAt".into(), AttrValue::from(rfc3339(self.updated_at)));
        item
    }

    /// Reads a payment back from its stored attribute map.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] naming the offending attribute.
    pub fn from_item(item: &Item) -> Result<Self, RecordError> {
        Ok(Self {
            payment_intent_id: req_s(item, "paymentIntentId")?,
            donation_id: req_s(item, "donationId")?,
            campaign_id: req_s(item, "campaignId")?,
            amount: req_n(item, "amount")?,
            currency: req_s(item, "currency")?,
            status: PaymentStatus::parse(&req_s(item, "status")?)
                .ok_or(RecordError::Malformed("status"))?,
            charge_id: opt_s(item, "chargeId"),
            last_event_id: opt_s(item, "rawEventLastId"),
            created_at_stripe: req_time(item, "createdAtStripe")?,
            created_at: req_time(item, "createdAt")?,
            updated_at: req_time(item, "updatedAt")?,
        })
    }
}

/// The write-once idempotency fence for provider events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    /// Provider event identifier.
    pub event_id: String,
    /// Provider event type string.
    pub event_type: String,
    /// Payment intent the event refers to.
    pub payment_intent_id: String,
    /// Linked donation, when metadata carried one.
    pub donation_id: Option<String>,
    /// Processing timestamp.
    pub created_at: DateTime<Utc>,
}

impl ProcessedEvent {
    /// Converts to the stored attribute map.
    #[must_use]
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert("eventId".into(), AttrValue::from(self.event_id.clone()));
        item.insert("eventType".into(), AttrValue::from(self.event_type.clone()));
        item.insert(
            "paymentIntentId".into(),
            AttrValue::from(self.payment_intent_id.clone()),
        );
        if let Some(donation_id) = &self.donation_id {
            item.insert("donationId".into(), AttrValue::from(donation_id.clone()));
        }
        item.insert("createdAt".into(), AttrValue::from(rfc3339(self.created_at)));
        item
    }

    /// Reads a processed-event marker back from its attribute map.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] naming the offending attribute.
    pub fn from_item(item: &Item) -> Result<Self, RecordError> {
        Ok(Self {
            event_id: req_s(item, "eventId")?,
            event_type: req_s(item, "eventType")?,
            payment_intent_id: req_s(item, "paymentIntentId")?,
            donation_id: opt_s(item, "donationId"),
            created_at: req_time(item, "createdAt")?,
        })
    }
}

/// A PIX charge shown (once settled) in the donation's public feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixCharge {
    /// Charge identifier (UUID v4 at creation).
    pub id: String,
    /// Donation the charge credits.
    pub donation_id: String,
    /// Charge value in cents.
    pub amount_cents: i64,
    /// Payer CPF.
    pub payer_cpf: String,
    /// Payer display name.
    pub payer_name: String,
    /// Donor message shown in the feed.
    pub message: String,
    /// Payer asked not to be named.
    pub anonymous: bool,
    /// Whether the charge appears in the public feed; flipped on
    /// settlement.
    pub visible: bool,
    /// Provider status string (`ATIVA`, `CONCLUIDA`, ...).
    pub status: String,
    /// Provider transaction identifier.
    pub txid: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl PixCharge {
    /// Converts to the stored attribute map.
    #[must_use]
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert("id".into(), AttrValue::from(self.id.clone()));
        item.insert("id_doacao".into(), AttrValue::from(self.donation_id.clone()));
        item.insert("valor_centavos".into(), AttrValue::N(self.amount_cents));
        item.insert("cpf".into(), AttrValue::from(self.payer_cpf.clone()));
        item.insert("nome".into(), AttrValue::from(self.payer_name.clone()));
        item.insert("mensagem".into(), AttrValue::from(self.message.clone()));
        item.insert("anonimo".into(), AttrValue::Bool(self.anonymous));
        item.insert("visivel".into(), AttrValue::Bool(self.visible));
        item.insert("status".into(), AttrValue::from(self.status.clone()));
        item.insert("txid".into(), AttrValue::from(self.txid.clone()));
        item.insert(
            "data_criacao".into(),
            AttrValue::from(rfc3339(self.created_at)),
        );
        item
    }

    /// Reads a PIX charge back from its stored attribute map.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] naming the offending attribute.
    pub fn from_item(item: &Item) -> Result<Self, RecordError> {
        Ok(Self {
            id: req_s(item, "id")?,
            donation_id: req_s(item, "id_doacao")?,
            amount_cents: req_n(item, "valor_centavos")?,
            payer_cpf: req_s(item, "cpf")?,
            payer_name: req_s(item, "nome")?,
            message: req_s(item, "mensagem")?,
            anonymous: req_bool(item, "anonimo")?,
            visible: req_bool(item, "visivel")?,
            status: req_s(item, "status")?,
            txid: req_s(item, "txid")?,
            created_at: req_time(item, "data_criacao")?,
        })
    }
}

/// Polling state for a PIX transaction, keyed by provider txid.
///
/// Carries the back-reference (`charge_sk`) needed to flip the charge
/// row visible when the transaction settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixStatusRecord {
    /// Charge row identifier.
    pub charge_id: String,
    /// Donation the charge credits.
    pub donation_id: String,
    /// Sort key of the charge row under the donation partition.
    pub charge_sk: String,
    /// Provider transaction identifier.
    pub txid: String,
    /// Provider status string.
    pub status: String,
    /// Whether the poller should still query this transaction.
    pub pollable: bool,
    /// Whether settlement processing completed.
    pub finalized: bool,
    /// Settlement timestamp, once paid.
    pub paid_at: Option<DateTime<Utc>>,
    /// Charge expiration window in seconds.
    pub expiration_secs: i64,
    /// Provider payment location URL.
    pub location: String,
    /// Copy-and-paste payment code.
    pub copy_paste: String,
    /// PIX key the charge was created against.
    pub pix_key: String,
    /// Charge value in cents.
    pub amount_cents: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl PixStatusRecord {
    /// Converts to the stored attribute map.
    #[must_use]
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert("id_pix_qrcode".into(), AttrValue::from(self.charge_id.clone()));
        item.insert("id_doacao".into(), AttrValue::from(self.donation_id.clone()));
        item.insert("pix_sk".into(), AttrValue::from(self.charge_sk.clone()));
        item.insert("id_pix".into(), AttrValue::from(self.txid.clone()));
        item.insert("status".into(), AttrValue::from(self.status.clone()));
        item.insert("buscar".into(), AttrValue::Bool(self.pollable));
        item.insert("finalizado".into(), AttrValue::Bool(self.finalized));
        if let Some(paid_at) = self.paid_at {
            item.insert("data_pago".into(), AttrValue::from(rfc3339(paid_at)));
        }
        item.insert("expiracao".into(), AttrValue::N(self.expiration_secs));
        item.insert("location".into(), AttrValue::from(self.location.clone()));
        item.insert(
            "pix_copia_e_cola".into(),
            AttrValue::from(self.copy_paste.clone()),
        );
        item.insert("chave".into(), AttrValue::from(self.pix_key.clone()));
        item.insert("valor_centavos".into(), AttrValue::N(self.amount_cents));
        item.insert(
            "data_criacao".into(),
            AttrValue::from(rfc3339(self.created_at)),
        );
        item
    }

    /// Reads a PIX status record back from its attribute map.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] naming the offending attribute.
    pub fn from_item(item: &Item) -> Result<Self, RecordError> {
        let paid_at = match opt_s(item, "data_pago") {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|_| RecordError::Malformed("data_pago"))?,
            ),
            None => None,
        };
        Ok(Self {
            charge_id: req_s(item, "id_pix_qrcode")?,
            donation_id: req_s(item, "id_doacao")?,
            charge_sk: req_s(item, "pix_sk")?,
            txid: req_s(item, "id_pix")?,
            status: req_s(item, "status")?,
            pollable: req_bool(item, "buscar")?,
            finalized: req_bool(item, "finalizado")?,
            paid_at,
            expiration_secs: req_n(item, "expiracao")?,
            location: req_s(item, "location")?,
            copy_paste: req_s(item, "pix_copia_e_cola")?,
            pix_key: req_s(item, "chave")?,
            amount_cents: req_n(item, "valor_centavos")?,
            created_at: req_time(item, "data_criacao")?,
        })
    }
}

/// Canonical RFC 3339 form used for every stored timestamp.
#[must_use]
pub fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time at stored precision. Records stamp creation and update
/// times with this so a written item reads back equal to the in-memory
/// value.
#[must_use]
pub fn now_secs() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

fn req_s(item: &Item, name: &'static str) -> Result<String, RecordError> {
    item.get(name)
        .ok_or(RecordError::Missing(name))?
        .as_s()
        .map(str::to_string)
        .ok_or(RecordError::Malformed(name))
}

fn opt_s(item: &Item, name: &'static str) -> Option<String> {
    item.get(name)
        .and_then(AttrValue::as_s)
        .map(str::to_string)
}

fn req_n(item: &Item, name: &'static str) -> Result<i64, RecordError> {
    item.get(name)
        .ok_or(RecordError::Missing(name))?
        .as_n()
        .ok_or(RecordError::Malformed(name))
}

fn req_bool(item: &Item, name: &'static str) -> Result<bool, RecordError> {
    item.get(name)
        .ok_or(RecordError::Missing(name))?
        .as_bool()
        .ok_or(RecordError::Malformed(name))
}

fn req_time(item: &Item, name: &'static str) -> Result<DateTime<Utc>, RecordError> {
    let raw = req_s(item, name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| RecordError::Malformed(name))
}
