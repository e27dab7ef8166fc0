//! Bill totals with an intra-state GST split.

use crate::aggregates::round_paise;
use crate::error::{PanelError, PanelResult};
use serde::{Deserialize, Serialize};

/// GST rates (percent) accepted on a bill line.
pub const GST_SLABS: [f64; 7] = [0.0, 0.25, 3.0, 5.0, 12.0, 18.0, 28.0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillLine {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    /// GST rate in percent, one of [`GST_SLABS`].
    pub gst_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    #[default]
    None,
    /// Percentage of the subtotal.
    Percent(f64),
    /// Flat rupee amount off the subtotal.
    Flat(f64),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BillTotals {
    pub subtotal: f64,
    pub discount: f64,
    pub taxable_value: f64,
    pub cgst: f64,
    pub sgst: f64,
    pub total_tax: f64,
    pub grand_total: f64,
}

/// Compute bill totals.
///
/// The discount is spread over lines in proportion to their value before tax
/// is applied, so each line is taxed at its own rate on its discounted value.
/// Tax is split equally into CGST and SGST.
pub fn compute_bill(lines: &[BillLine], discount: Discount) -> PanelResult<BillTotals> {
    if lines.is_empty() {
        return Err(PanelError::InvalidBill("bill has no lines".to_string()));
    }
    for line in lines {
        if !(line.quantity > 0.0) {
            return Err(PanelError::InvalidBill(format!(
                "{}: quantity must be positive",
                line.description
            )));
        }
        if line.unit_price < 0.0 || !line.unit_price.is_finite() {
            return Err(PanelError::InvalidBill(format!(
                "{}: price must not be negative",
                line.description
            )));
        }
        if !GST_SLABS.contains(&line.gst_rate) {
            return Err(PanelError::InvalidBill(format!(
                "{}: {}% is not a GST slab",
                line.description, line.gst_rate
            )));
        }
    }

    let subtotal: f64 = lines.iter().map(|line| line.quantity * line.unit_price).sum();
    let discount_amount = match discount {
        Discount::None => 0.0,
        Discount::Percent(percent) => {
            if !(0.0..=100.0).contains(&percent) {
                return Err(PanelError::InvalidBill(format!(
                    "discount of {percent}% is out of range"
                )));
            }
            subtotal * percent / 100.0
        }
        Discount::Flat(amount) => {
            if amount < 0.0 || amount > subtotal {
                return Err(PanelError::InvalidBill(format!(
                    "flat discount of {amount} exceeds the subtotal"
                )));
            }
            amount
        }
    };

    let scale = if subtotal > 0.0 {
        (subtotal - discount_amount) / subtotal
    } else {
        0.0
    };
    let total_tax: f64 = lines
        .iter()
        .map(|line| line.quantity * line.unit_price * scale * line.gst_rate / 100.0)
        .sum();

    let half = round_paise(total_tax / 2.0);
    let subtotal = round_paise(subtotal);
    let discount = round_paise(discount_amount);
    let taxable_value = round_paise(subtotal - discount);
    let total_tax = round_paise(half * 2.0);

    Ok(BillTotals {
        subtotal,
        discount,
        taxable_value,
        cgst: half,
        sgst: half,
        total_tax,
        grand_total: round_paise(taxable_value + total_tax),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(description: &str, quantity: f64, unit_price: f64, gst_rate: f64) -> BillLine {
        BillLine {
            description: description.to_string(),
            quantity,
            unit_price,
            gst_rate,
        }
    }

    #[test]
    fn mixed_rates_without_discount() {
        let totals = compute_bill(
            &[line("Soap", 2.0, 50.0, 18.0), line("Rice", 1.0, 200.0, 5.0)],
            Discount::None,
        )
        .unwrap();

        assert_eq!(totals.subtotal, 300.0);
        assert_eq!(totals.taxable_value, 300.0);
        // 18 + 10
        assert_eq!(totals.total_tax, 28.0);
        assert_eq!(totals.cgst, 14.0);
        assert_eq!(totals.sgst, 14.0);
        assert_eq!(totals.grand_total, 328.0);
    }

    #[test]
    fn percent_discount_applies_before_tax() {
        let totals = compute_bill(&[line("Shirt", 1.0, 1000.0, 12.0)], Discount::Percent(10.0)).unwrap();
        assert_eq!(totals.discount, 100.0);
        assert_eq!(totals.taxable_value, 900.0);
        assert_eq!(totals.total_tax, 108.0);
        assert_eq!(totals.grand_total, 1008.0);
    }

    #[test]
    fn odd_paise_split_evenly() {
        let totals = compute_bill(&[line("Pen", 1.0, 10.1, 5.0)], Discount::None).unwrap();
        // 0.505 of tax: each half rounds to 0.25
        assert_eq!(totals.cgst, totals.sgst);
        assert_eq!(totals.total_tax, totals.cgst * 2.0);
    }

    #[test]
    fn rejects_invalid_bills() {
        assert!(compute_bill(&[], Discount::None).is_err());
        assert!(compute_bill(&[line("X", 0.0, 10.0, 5.0)], Discount::None).is_err());
        assert!(compute_bill(&[line("X", 1.0, 10.0, 7.0)], Discount::None).is_err());
        assert!(compute_bill(&[line("X", 1.0, 10.0, 5.0)], Discount::Flat(20.0)).is_err());
        assert!(compute_bill(&[line("X", 1.0, 10.0, 5.0)], Discount::Percent(120.0)).is_err());
    }
}
