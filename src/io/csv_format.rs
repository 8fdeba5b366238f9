//! CSV format handling for the marketplace event log and balance output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV rows to [`EventRecord`] values
//! - Balance snapshot output serialization
//!
//! All functions are pure (no I/O) for easy testing.
//!
//! # Log schema
//!
//! Columns: `event,request,account,counterparty,amount,mode,reference,url`.
//! Which columns an event uses depends on its kind; unused columns are
//! left empty. The `mode` column is overloaded per event: payment method
//! for deposits, content mode for request creation, dispute type for
//! `open_dispute`, resolution kind for `resolve_dispute`.

use crate::types::{
    AccountId, BalanceSnapshot, ContentMode, EventRecord, RequestId, ResolutionKind,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Matches the event-log format; every column except `event` is optional
/// because each event kind uses its own subset.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    pub event: String,
    pub request: Option<RequestId>,
    pub account: Option<AccountId>,
    pub counterparty: Option<AccountId>,
    pub amount: Option<String>,
    pub mode: Option<String>,
    pub reference: Option<String>,
    pub url: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty()).map(|s| s.trim().to_string())
}

fn parse_amount(raw: &str, event: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.trim())
        .map_err(|_| format!("Invalid amount '{}' for {} event", raw, event))
}

/// Convert a CsvRecord to an EventRecord
///
/// Validates that the columns each event kind requires are present and
/// parse, and that enumerated columns (content mode, resolution kind)
/// carry known values. Semantic validation (URL shape, balances, state)
/// is the engine's job.
pub fn convert_csv_record(record: CsvRecord) -> Result<EventRecord, String> {
    let event = record.event.trim().to_lowercase();
    let amount = non_empty(record.amount);
    let mode = non_empty(record.mode);
    let reference = non_empty(record.reference);
    let url = non_empty(record.url);

    let need_request = || {
        record
            .request
            .ok_or_else(|| format!("{} event requires a request id", event))
    };
    let need_account = || {
        record
            .account
            .ok_or_else(|| format!("{} event requires an account", event))
    };
    let need_amount = |amount: &Option<String>| -> Result<Decimal, String> {
        match amount {
            Some(raw) => parse_amount(raw, &event),
            None => Err(format!("{} event requires an amount", event)),
        }
    };

    match event.as_str() {
        "deposit" => Ok(EventRecord::Deposit {
            account: need_account()?,
            gross: need_amount(&amount)?,
            method: mode.unwrap_or_else(|| "external".to_string()),
            reference: reference
                .ok_or_else(|| "deposit event requires a reference".to_string())?,
        }),
        "withdrawal" => Ok(EventRecord::Withdrawal {
            account: need_account()?,
            amount: need_amount(&amount)?,
        }),
        "create_request" => {
            let request = need_request()?;
            let content_mode = match mode.as_deref() {
                Some(raw) => ContentMode::parse(raw)
                    .ok_or_else(|| format!("Invalid content mode '{}'", raw))?,
                None => return Err("create_request event requires a content mode".to_string()),
            };
            Ok(EventRecord::CreateRequest {
                request,
                advertiser: need_account()?,
                publisher: record
                    .counterparty
                    .ok_or_else(|| "create_request event requires a counterparty".to_string())?,
                price: need_amount(&amount)?,
                content_mode,
                listing_reference: reference.unwrap_or_default(),
                target_url: url
                    .ok_or_else(|| "create_request event requires a target URL".to_string())?,
            })
        }
        "accept" => Ok(EventRecord::Accept {
            request: need_request()?,
        }),
        "reject" => Ok(EventRecord::Reject {
            request: need_request()?,
        }),
        "cancel" => Ok(EventRecord::Cancel {
            request: need_request()?,
        }),
        "submit_article" => Ok(EventRecord::SubmitArticle {
            request: need_request()?,
            title: reference.unwrap_or_default(),
        }),
        "submit_placement" => Ok(EventRecord::SubmitPlacement {
            request: need_request()?,
            url: url.ok_or_else(|| "submit_placement event requires a URL".to_string())?,
        }),
        "open_dispute" => Ok(EventRecord::OpenDispute {
            request: need_request()?,
            initiator: need_account()?,
            dispute_type: mode.unwrap_or_else(|| "unspecified".to_string()),
        }),
        "begin_review" => Ok(EventRecord::BeginReview {
            request: need_request()?,
        }),
        "escalate" => Ok(EventRecord::Escalate {
            request: need_request()?,
        }),
        "resolve_dispute" => {
            let resolution = match mode.as_deref() {
                Some(raw) => ResolutionKind::parse(raw)
                    .ok_or_else(|| format!("Invalid resolution '{}'", raw))?,
                None => return Err("resolve_dispute event requires a resolution".to_string()),
            };
            let amount = match amount {
                Some(raw) => Some(parse_amount(&raw, &event)?),
                None => None,
            };
            Ok(EventRecord::ResolveDispute {
                request: need_request()?,
                resolution,
                amount,
            })
        }
        "close_dispute" => Ok(EventRecord::CloseDispute {
            request: need_request()?,
        }),
        other => Err(format!("Invalid event type: '{}'", other)),
    }
}

/// Write balance snapshots to CSV format
///
/// Columns: `account,balance`, two decimal places, sorted by account id
/// for deterministic output.
pub fn write_balances_csv(
    snapshots: &[BalanceSnapshot],
    output: &mut dyn Write,
) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["account", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = snapshots.to_vec();
    sorted.sort_by_key(|snapshot| snapshot.account);

    for snapshot in sorted {
        writer
            .write_record(&[
                snapshot.account.to_string(),
                format!("{:.2}", snapshot.balance),
            ])
            .map_err(|e| format!("Failed to write balance record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
