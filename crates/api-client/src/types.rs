use rust_decimal::Decimal;

/// Receipt returned by a successful order placement, close, or bracket
/// attach (§4.B). Carries enough of the fill to build a `Decision`'s outcome
/// in the decision log without the caller needing venue-specific shapes.
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub venue_order_id: String,
    pub avg_price: Decimal,
    pub filled_qty: Decimal,
}

/// Precision and minimum-notional rules, pulled once per adapter instance
/// from the venue's exchange-info endpoint and cached for the adapter's
/// lifetime (§4.B "pulled once per adapter ... and cached").
#[derive(Debug, Clone, Copy)]
pub struct SymbolPrecision {
    pub qty_step: Decimal,
    pub price_step: Decimal,
    pub min_notional: Decimal,
}

impl SymbolPrecision {
    /// Rounds `qty` down to the venue's quantity step, returning
    /// `PrecisionTooLow` if the result is zero.
    pub fn round_qty(&self, qty: Decimal) -> crate::Result<Decimal> {
        if self.qty_step.is_zero() {
            return Ok(qty);
        }
        let rounded = (qty / self.qty_step).trunc() * self.qty_step;
        if rounded.is_zero() {
            return Err(crate::Error::PrecisionTooLow);
        }
        Ok(rounded)
    }

    pub fn check_min_notional(&self, notional: Decimal) -> crate::Result<()> {
        if notional < self.min_notional {
            return Err(crate::Error::BelowMinNotional);
        }
        Ok(())
    }
}
