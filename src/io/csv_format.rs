//! CSV format handling for replay operations and settlement output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization of replay log rows
//! - Conversion from CSV records to [`Operation`]s
//! - Account and order output serialization
//!
//! All functions are pure (no I/O beyond the supplied writer) for easy testing.

use crate::types::{Account, Operation, Order, SettlementError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::num::NonZeroU32;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Matches the replay log format with columns: type, customer, event, code,
/// amount, fee. Every column but `type` and `customer` is optional; which
/// ones are required depends on the operation.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    #[serde(rename = "type")]
    pub op_type: String,
    pub customer: String,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub fee: Option<String>,
}

fn present(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Convert a CsvRecord to an Operation
///
/// This function:
/// - Parses the operation type (case-insensitive)
/// - Requires `amount` for grants (whole credits, at least 1)
/// - Requires `fee` for checkouts (pence)
/// - Requires `event` for payments and converts `amount` from major units to pence
///
/// # Returns
///
/// * `Ok(Operation)` - Successfully converted record
/// * `Err(ParseError)` - Description of the conversion failure
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<Operation, SettlementError> {
    let customer = csv_record.customer.trim().to_string();
    if customer.is_empty() {
        return Err(SettlementError::parse_error(format!(
            "{} operation has no customer",
            csv_record.op_type
        )));
    }

    let code = present(&csv_record.code).map(str::to_string);

    match csv_record.op_type.trim().to_lowercase().as_str() {
        "register" => Ok(Operation::Register {
            customer,
            referral_code: code,
        }),
        "grant" => {
            let amount = present(&csv_record.amount).ok_or_else(|| {
                SettlementError::parse_error(format!(
                    "grant for customer {} requires an amount",
                    customer
                ))
            })?;
            let credits = amount
                .parse::<u32>()
                .ok()
                .and_then(NonZeroU32::new)
                .ok_or_else(|| {
                    SettlementError::parse_error(format!(
                        "Invalid credit amount '{}' for customer {}",
                        amount, customer
                    ))
                })?;
            Ok(Operation::Grant { customer, credits })
        }
        "checkout" => {
            let fee = present(&csv_record.fee).ok_or_else(|| {
                SettlementError::parse_error(format!(
                    "checkout for customer {} requires a fee",
                    customer
                ))
            })?;
            let delivery_fee_pence = fee.parse::<u32>().map_err(|_| {
                SettlementError::parse_error(format!(
                    "Invalid fee '{}' for customer {}",
                    fee, customer
                ))
            })?;
            Ok(Operation::Checkout {
                customer,
                referral_code: code,
                delivery_fee_pence,
            })
        }
        "payment" => {
            let event_id = present(&csv_record.event)
                .ok_or_else(|| {
                    SettlementError::parse_error(format!(
                        "payment for customer {} requires an event id",
                        customer
                    ))
                })?
                .to_string();
            let amount_pence = match present(&csv_record.amount) {
                Some(amount) => parse_pence(amount).ok_or_else(|| {
                    SettlementError::parse_error(format!(
                        "Invalid amount '{}' for event {}",
                        amount, event_id
                    ))
                })?,
                None => 0,
            };
            Ok(Operation::Payment {
                customer,
                event_id,
                amount_pence,
            })
        }
        other => Err(SettlementError::parse_error(format!(
            "Invalid operation type: '{}' for customer {}",
            other, customer
        ))),
    }
}

/// Parse a non-negative major-unit amount into minor units
fn parse_pence(amount: &str) -> Option<i64> {
    let decimal = Decimal::from_str(amount).ok()?;
    if decimal.is_sign_negative() {
        return None;
    }
    (decimal * Decimal::ONE_HUNDRED).round().try_into().ok()
}

fn optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// Write account states to CSV format
///
/// Writes accounts with columns: customer, referral_code,
/// referral_code_redeemed, redeemed_by, referred_by, free_delivery_credits.
/// Accounts are sorted by customer id for deterministic output.
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), SettlementError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "customer",
        "referral_code",
        "referral_code_redeemed",
        "redeemed_by",
        "referred_by",
        "free_delivery_credits",
    ])?;

    let mut sorted_accounts: Vec<&Account> = accounts.iter().collect();
    sorted_accounts.sort_by(|a, b| a.customer.cmp(&b.customer));

    for account in sorted_accounts {
        writer.write_record(&[
            account.customer.clone(),
            optional(&account.referral_code),
            account.referral_code_redeemed.to_string(),
            optional(&account.redeemed_by),
            optional(&account.referred_by),
            account.free_delivery_credits.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write orders to CSV format
///
/// Writes orders with columns: event, order, customer, amount, currency,
/// delivery_fee_pence, payment_status, referral_code_used, referrer. Orders
/// are sorted by source event id.
pub fn write_orders_csv(orders: &[Order], output: &mut dyn Write) -> Result<(), SettlementError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "event",
        "order",
        "customer",
        "amount",
        "currency",
        "delivery_fee_pence",
        "payment_status",
        "referral_code_used",
        "referrer",
    ])?;

    let mut sorted_orders: Vec<&Order> = orders.iter().collect();
    sorted_orders.sort_by(|a, b| a.source_event.cmp(&b.source_event));

    for order in sorted_orders {
        writer.write_record(&[
            order.source_event.clone(),
            order.id.to_string(),
            order.customer.clone(),
            format!("{:.2}", order.amount()),
            order.currency.clone(),
            order.delivery_fee_pence.to_string(),
            order.payment_status.as_str().to_string(),
            optional(&order.referral_code_used),
            optional(&order.referrer),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
