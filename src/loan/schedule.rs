//! Flat repayment schedule generation
//!
//! Every installment carries the same principal and interest portion:
//! `principal = A / N`, `interest = A * r / N`. Due dates advance from the
//! issue date by one cadence step per period.

use chrono::{Days, Months, NaiveDate};
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Longest schedule that may be generated, in periods
pub const MAX_TENURE: i32 = 600;

/// Schedule generation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Unsupported amortization plan: {0}")]
    UnsupportedCadence(String),

    #[error("Tenure must be between 1 and {} periods, got {0}", MAX_TENURE)]
    InvalidTenure(i32),

    #[error("Loan amount or interest rate out of range")]
    AmountOutOfRange,

    #[error("Due date out of range for period {0}")]
    DateOutOfRange(u32),
}

/// Interval between two installments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Monthly,
    Biweekly,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Monthly => "monthly",
            Cadence::Biweekly => "biweekly",
        }
    }

    /// Due date of the `period`-th installment (1-based)
    pub fn due_date(&self, issue_date: NaiveDate, period: u32) -> Option<NaiveDate> {
        match self {
            Cadence::Monthly => issue_date.checked_add_months(Months::new(period)),
            Cadence::Biweekly => issue_date.checked_add_days(Days::new(15 * u64::from(period))),
        }
    }
}

impl FromStr for Cadence {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Cadence::Monthly),
            "biweekly" => Ok(Cadence::Biweekly),
            other => Err(ScheduleError::UnsupportedCadence(other.to_string())),
        }
    }
}

/// Terms a schedule is derived from
#[derive(Debug, Clone)]
pub struct ScheduleTerms {
    pub amount: Decimal,
    pub tenure: i32,
    pub interest_rate: Decimal,
    pub issue_date: NaiveDate,
    pub cadence: Cadence,
}

/// One generated installment, before it is attached to a loan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installment {
    pub period: u32,
    pub due_date: NaiveDate,
    pub principal: Decimal,
    pub interest: Decimal,
    pub total: Decimal,
}

/// Derive the installments for the given terms
pub fn generate(terms: &ScheduleTerms) -> Result<Vec<Installment>, ScheduleError> {
    if !(1..=MAX_TENURE).contains(&terms.tenure) {
        return Err(ScheduleError::InvalidTenure(terms.tenure));
    }

    let periods = Decimal::from(terms.tenure);
    let principal = terms
        .amount
        .checked_div(periods)
        .ok_or(ScheduleError::AmountOutOfRange)?;
    let interest = terms
        .amount
        .checked_mul(terms.interest_rate)
        .and_then(|i| i.checked_div(periods))
        .ok_or(ScheduleError::AmountOutOfRange)?;
    let total = principal
        .checked_add(interest)
        .ok_or(ScheduleError::AmountOutOfRange)?;

    (1..=terms.tenure as u32)
        .map(|period| {
            let due_date = terms
                .cadence
                .due_date(terms.issue_date, period)
                .ok_or(ScheduleError::DateOutOfRange(period))?;
            Ok(Installment {
                period,
                due_date,
                principal,
                interest,
                total,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn terms(amount: &str, tenure: i32, rate: &str, cadence: Cadence) -> ScheduleTerms {
        ScheduleTerms {
            amount: Decimal::from_str(amount).unwrap(),
            tenure,
            interest_rate: Decimal::from_str(rate).unwrap(),
            issue_date: date(2024, 1, 15),
            cadence,
        }
    }

    #[test]
    fn test_monthly_due_dates() {
        let lines = generate(&terms("3000", 3, "0.05", Cadence::Monthly)).unwrap();
        let dates: Vec<_> = lines.iter().map(|l| l.due_date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 2, 15), date(2024, 3, 15), date(2024, 4, 15)]
        );
    }

    #[test]
    fn test_biweekly_due_dates() {
        let lines = generate(&terms("3000", 3, "0.05", Cadence::Biweekly)).unwrap();
        let dates: Vec<_> = lines.iter().map(|l| l.due_date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 1, 30), date(2024, 2, 14), date(2024, 2, 29)]
        );
    }

    #[test]
    fn test_month_end_is_clamped() {
        let mut t = terms("1200", 2, "0", Cadence::Monthly);
        t.issue_date = date(2024, 1, 31);
        let lines = generate(&t).unwrap();
        assert_eq!(lines[0].due_date, date(2024, 2, 29));
        assert_eq!(lines[1].due_date, date(2024, 3, 31));
    }

    #[test]
    fn test_flat_amounts() {
        let lines = generate(&terms("12000", 12, "0.0469", Cadence::Monthly)).unwrap();
        assert_eq!(lines.len(), 12);

        let principal = Decimal::from(1000);
        let interest = Decimal::from_str("46.9").unwrap();
        for line in &lines {
            assert_eq!(line.principal, principal);
            assert_eq!(line.interest, interest);
            assert_eq!(line.total, principal + interest);
        }
        assert_eq!(lines.first().unwrap().period, 1);
        assert_eq!(lines.last().unwrap().period, 12);
    }

    #[test]
    fn test_principal_sums_to_amount() {
        let lines = generate(&terms("1000", 3, "0.1", Cadence::Monthly)).unwrap();
        let sum: Decimal = lines.iter().map(|l| l.principal).sum();
        let diff = (sum - Decimal::from(1000)).abs();
        assert!(diff < Decimal::from_str("0.000001").unwrap(), "sum was {}", sum);
    }

    #[test]
    fn test_zero_tenure_is_rejected() {
        let err = generate(&terms("1000", 0, "0.1", Cadence::Monthly)).unwrap_err();
        assert_eq!(err, ScheduleError::InvalidTenure(0));
    }

    #[test]
    fn test_tenure_above_limit_is_rejected() {
        let err = generate(&terms("1000", MAX_TENURE + 1, "0.1", Cadence::Biweekly)).unwrap_err();
        assert_eq!(err, ScheduleError::InvalidTenure(MAX_TENURE + 1));
        assert_eq!(
            generate(&terms("1000", MAX_TENURE, "0.1", Cadence::Monthly))
                .unwrap()
                .len(),
            MAX_TENURE as usize
        );
    }

    #[test]
    fn test_overflowing_interest_is_an_error() {
        let mut t = terms("1", 12, "1000000000", Cadence::Monthly);
        t.amount = Decimal::MAX;
        assert_eq!(generate(&t).unwrap_err(), ScheduleError::AmountOutOfRange);
    }

    #[test]
    fn test_cadence_parsing() {
        assert_eq!(Cadence::from_str("monthly").unwrap(), Cadence::Monthly);
        assert_eq!(Cadence::from_str("biweekly").unwrap(), Cadence::Biweekly);
        assert_eq!(
            Cadence::from_str("weekly").unwrap_err(),
            ScheduleError::UnsupportedCadence("weekly".to_string())
        );
    }
}
