use crate::model::constants::{DEFAULT_DEDUCTION, DEFAULT_TAX_RATE};
use crate::model::record::TaxRecord;
use crate::util::text::group_thousands;
use rust_decimal::prelude::ToPrimitive as _;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use thiserror::Error;

const RULE_WIDTH: usize = 38;
const AMOUNT_WIDTH: usize = 20;

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum TaxError {
    #[error("Deduction must not be negative, found {0}")]
    NegativeDeduction(i64),

    #[error("Tax rate must be between 0 and 1, found {0}")]
    Rate(Decimal),

    #[error("Gain/loss total overflowed")]
    Overflow,
}

/// Deduction and rate applied to the yearly gain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TaxPolicy {
    deduction: i64,
    rate: Decimal,
}

impl TaxPolicy {
    pub fn new(deduction: i64, rate: Decimal) -> Result<Self, TaxError> {
        if deduction < 0 {
            return Err(TaxError::NegativeDeduction(deduction));
        }
        if rate.is_sign_negative() || rate > Decimal::ONE {
            return Err(TaxError::Rate(rate));
        }

        Ok(Self { deduction, rate })
    }

    pub fn deduction(&self) -> i64 {
        self.deduction
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }
}

impl Default for TaxPolicy {
    fn default() -> Self {
        Self {
            deduction: DEFAULT_DEDUCTION,
            rate: DEFAULT_TAX_RATE,
        }
    }
}

/// Yearly totals for the whole schedule, in KRW.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TaxSummary {
    pub total_gain_loss: i64,
    pub tax_base: i64,
    pub tax_payable: i64,
}

impl TaxSummary {
    /// Sum every record and apply the policy.
    ///
    /// Sums are exact integers. Only the final multiplication by the rate is rounded, half to even.
    pub fn compute<'a>(
        records: impl IntoIterator<Item = &'a TaxRecord>,
        policy: &TaxPolicy,
    ) -> Result<Self, TaxError> {
        let mut proceeds = 0_i64;
        let mut cost = 0_i64;
        let mut expenses = 0_i64;
        for record in records {
            proceeds = proceeds
                .checked_add(record.proceeds())
                .ok_or(TaxError::Overflow)?;
            cost = cost.checked_add(record.cost()).ok_or(TaxError::Overflow)?;
            expenses = expenses
                .checked_add(record.expenses())
                .ok_or(TaxError::Overflow)?;
        }

        let total_gain_loss = proceeds
            .checked_sub(cost)
            .and_then(|total| total.checked_sub(expenses))
            .ok_or(TaxError::Overflow)?;

        Self::from_total(total_gain_loss, policy)
    }

    pub fn from_total(total_gain_loss: i64, policy: &TaxPolicy) -> Result<Self, TaxError> {
        let tax_base = total_gain_loss
            .checked_sub(policy.deduction)
            .ok_or(TaxError::Overflow)?
            .max(0);
        let tax_payable = (Decimal::from(tax_base) * policy.rate)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i64()
            .ok_or(TaxError::Overflow)?;

        Ok(Self {
            total_gain_loss,
            tax_base,
            tax_payable,
        })
    }
}

impl fmt::Display for TaxSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(RULE_WIDTH);
        let krw = |amount| format!("{} KRW", group_thousands(amount));

        writeln!(f, "{rule}")?;
        writeln!(
            f,
            "Total Gain/Loss\t:{:>AMOUNT_WIDTH$}",
            krw(self.total_gain_loss)
        )?;
        writeln!(f, "Tax Base\t:{:>AMOUNT_WIDTH$}", krw(self.tax_base))?;
        writeln!(f, "Tax Payable\t:{:>AMOUNT_WIDTH$}", krw(self.tax_payable))?;
        write!(f, "{rule}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::tests::record;
    use arbtest::arbtest;

    fn summary(records: &[TaxRecord]) -> TaxSummary {
        TaxSummary::compute(records, &TaxPolicy::default()).unwrap()
    }

    #[test]
    fn test_below_deduction() {
        let summary = summary(&[record(1_000_000, 600_000, 0)]);

        assert_eq!(
            summary,
            TaxSummary {
                total_gain_loss: 400_000,
                tax_base: 0,
                tax_payable: 0,
            }
        );
    }

    #[test]
    fn test_above_deduction() {
        let summary = summary(&[record(12_000_000, 2_000_000, 0)]);

        assert_eq!(summary.total_gain_loss, 10_000_000);
        assert_eq!(summary.tax_base, 7_500_000);
        assert_eq!(summary.tax_payable, 1_650_000);
    }

    #[test]
    fn test_expenses_reduce_gain() {
        let summary = summary(&[
            record(5_000_000, 1_000_000, 25_000),
            record(800_000, 1_200_000, 3_000),
        ]);

        assert_eq!(summary.total_gain_loss, 3_572_000);
        assert_eq!(summary.tax_base, 1_072_000);
        assert_eq!(summary.tax_payable, 235_840);
    }

    #[test]
    fn test_boundaries() {
        let policy = TaxPolicy::default();
        let tax = |total| TaxSummary::from_total(total, &policy).unwrap();

        assert_eq!(tax(-3_000_000).tax_base, 0);
        assert_eq!(tax(-3_000_000).tax_payable, 0);
        assert_eq!(tax(0).tax_payable, 0);
        assert_eq!(tax(2_500_000).tax_base, 0);
        assert_eq!(tax(2_500_001).tax_base, 1);
        assert_eq!(tax(2_500_001).tax_payable, 0);
        assert_eq!(tax(2_500_003).tax_payable, 1);
    }

    #[test]
    fn test_half_even_rounding() {
        let policy = TaxPolicy::new(0, Decimal::new(5, 1)).unwrap();

        assert_eq!(TaxSummary::from_total(5, &policy).unwrap().tax_payable, 2);
        assert_eq!(TaxSummary::from_total(7, &policy).unwrap().tax_payable, 4);
    }

    #[test]
    fn test_empty_and_overflow() {
        assert_eq!(summary(&[]).total_gain_loss, 0);

        let records = [record(i64::MAX, 0, 0), record(1, 0, 0)];
        assert_eq!(
            TaxSummary::compute(&records, &TaxPolicy::default()),
            Err(TaxError::Overflow)
        );
    }

    #[test]
    fn test_policy_validation() {
        assert_eq!(
            TaxPolicy::new(-1, Decimal::ONE),
            Err(TaxError::NegativeDeduction(-1))
        );
        assert_eq!(
            TaxPolicy::new(0, Decimal::TWO),
            Err(TaxError::Rate(Decimal::TWO))
        );
        assert_eq!(TaxPolicy::default().deduction(), 2_500_000);
        assert_eq!(TaxPolicy::default().rate(), Decimal::new(22, 2));
    }

    #[test]
    fn test_display() {
        let summary = summary(&[record(12_000_000, 2_000_000, 0)]);
        let rule = "-".repeat(38);
        let expected = [
            rule.as_str(),
            "Total Gain/Loss\t:      10,000,000 KRW",
            "Tax Base\t:       7,500,000 KRW",
            "Tax Payable\t:       1,650,000 KRW",
            rule.as_str(),
        ]
        .join("\n");

        assert_eq!(summary.to_string(), expected);

        let loss = TaxSummary::from_total(-120_000, &TaxPolicy::default()).unwrap();
        assert!(loss.to_string().contains("Total Gain/Loss\t:        -120,000 KRW"));
    }

    #[test]
    fn prop_test_order_invariance() {
        arbtest(|u| {
            let len = u.int_in_range(0..=20)?;
            let mut records = Vec::with_capacity(len);
            for _ in 0..len {
                records.push(record(
                    u.int_in_range(0..=1_000_000_000)?,
                    u.int_in_range(0..=1_000_000_000)?,
                    u.int_in_range(0..=10_000_000)?,
                ));
            }

            let forward = summary(&records);
            records.reverse();
            let last = records.len().saturating_sub(1);
            let rotate = u.int_in_range(0..=last)?;
            records.rotate_left(rotate);

            assert_eq!(summary(&records), forward);
            Ok(())
        });
    }
}
