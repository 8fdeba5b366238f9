//! Commission calculation
//!
//! Pure functions mapping a settlement or deposit event to its split of
//! amounts. Prices are quoted in whole currency units; the rate side of a
//! split is rounded half-away-from-zero to a whole unit and the remainder
//! is computed by subtraction, so the two parts always sum exactly to the
//! input. No rounding leakage across repeated splits.

use crate::types::MarketError;
use rust_decimal::{Decimal, RoundingStrategy};

/// Marketplace commission rates
///
/// The publisher keeps `publisher_rate` of a confirmed placement's price;
/// the platform keeps the remainder. Deposits are charged
/// `deposit_fee_rate` off the top before crediting the advertiser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommissionPolicy {
    /// Publisher's share of a settled placement price (0..=1)
    pub publisher_rate: Decimal,

    /// Platform fee taken from advertiser deposits (0..=1)
    pub deposit_fee_rate: Decimal,
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        CommissionPolicy {
            publisher_rate: Decimal::new(70, 2),
            deposit_fee_rate: Decimal::new(5, 2),
        }
    }
}

/// Split of a placement price between publisher and platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementSplit {
    pub publisher_share: Decimal,
    pub platform_fee: Decimal,
}

/// Split of a gross deposit between the advertiser credit and the
/// platform fee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositSplit {
    pub credited: Decimal,
    pub platform_fee: Decimal,
}

impl CommissionPolicy {
    /// Create a policy with explicit rates
    ///
    /// # Errors
    ///
    /// Returns `Validation` if either rate is outside `0..=1`.
    pub fn new(publisher_rate: Decimal, deposit_fee_rate: Decimal) -> Result<Self, MarketError> {
        for (name, rate) in [
            ("publisher_rate", publisher_rate),
            ("deposit_fee_rate", deposit_fee_rate),
        ] {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return Err(MarketError::validation(format!(
                    "{} must be between 0 and 1, got {}",
                    name, rate
                )));
            }
        }
        Ok(CommissionPolicy {
            publisher_rate,
            deposit_fee_rate,
        })
    }

    /// Split a confirmed placement's price into publisher share and
    /// platform fee
    ///
    /// `publisher_share = round(price * publisher_rate)`; the fee is the
    /// remainder, so `publisher_share + platform_fee == price` exactly.
    /// The caller guarantees a positive price.
    pub fn settlement_split(&self, price: Decimal) -> SettlementSplit {
        let publisher_share = round_unit(price * self.publisher_rate);
        SettlementSplit {
            publisher_share,
            platform_fee: price - publisher_share,
        }
    }

    /// Split a gross deposit into the advertiser credit and the platform
    /// fee
    ///
    /// `platform_fee = round(gross * deposit_fee_rate)`; the credited
    /// amount is the remainder, so `credited + platform_fee == gross`
    /// exactly. The caller guarantees a positive gross amount.
    pub fn deposit_split(&self, gross: Decimal) -> DepositSplit {
        let platform_fee = round_unit(gross * self.deposit_fee_rate);
        DepositSplit {
            credited: gross - platform_fee,
            platform_fee,
        }
    }
}

/// Round to a whole currency unit, half away from zero
fn round_unit(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}
