//! Stock movement requests and the quantity arithmetic behind them.
//!
//! Everything here is pure: a [`MovementRequest`] coming off the wire is
//! validated into a [`MovementCommand`] before any connection is taken, and
//! [`StockChange::apply`] decides the new balance from the locked current one.

use crate::error::ServiceError;
use crate::wire::{decimal_opt, id_opt, max_len, non_blank, numeric_fits, parse_date};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Longest note accepted on a movement
pub const MAX_NOTE_LEN: usize = 255;

/// Quantities are stored as `NUMERIC(18,3)`
pub const QUANTITY_SCALE: u32 = 3;
pub const QUANTITY_INT_DIGITS: u32 = 15;

/// Reject a quantity the item and movement columns cannot hold exactly
///
/// # Errors
///
/// `InvalidArgument` for more than three decimals or fifteen integer digits.
pub fn check_quantity(value: Decimal, field: &str) -> Result<Decimal, ServiceError> {
    numeric_fits(value, field, QUANTITY_INT_DIGITS, QUANTITY_SCALE)
}

/// Kind of stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementKind {
    /// `carico`: stock enters the warehouse
    Load,
    /// `scarico`: stock leaves the warehouse
    Unload,
    /// `rettifica`: inventory correction
    Adjustment,
}

impl MovementKind {
    /// Name stored in the movement log
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Load => "carico",
            MovementKind::Unload => "scarico",
            MovementKind::Adjustment => "rettifica",
        }
    }
}

impl FromStr for MovementKind {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "carico" | "load" | "entrata" => Ok(MovementKind::Load),
            "scarico" | "unload" | "uscita" => Ok(MovementKind::Unload),
            "rettifica" | "adjustment" => Ok(MovementKind::Adjustment),
            _ => Err(ServiceError::invalid(format!(
                "Tipo movimento non valido: {raw} (ammessi: carico, scarico, rettifica)"
            ))),
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a movement does to the on-hand quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// Add a positive quantity
    Load(Decimal),
    /// Remove a positive quantity
    Unload(Decimal),
    /// Set the quantity to an absolute value
    SetTo(Decimal),
    /// Shift the quantity by a signed, non-zero amount
    Shift(Decimal),
}

/// Result of applying a [`StockChange`] to a balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Signed delta actually applied
    pub delta: Decimal,
    pub new_quantity: Decimal,
}

impl StockChange {
    pub fn kind(&self) -> MovementKind {
        match self {
            StockChange::Load(_) => MovementKind::Load,
            StockChange::Unload(_) => MovementKind::Unload,
            StockChange::SetTo(_) | StockChange::Shift(_) => MovementKind::Adjustment,
        }
    }

    /// Quantity as the caller expressed it, for logs
    pub fn requested(&self) -> Decimal {
        match self {
            StockChange::Load(q)
            | StockChange::Unload(q)
            | StockChange::SetTo(q)
            | StockChange::Shift(q) => *q,
        }
    }

    /// Compute the balance after this change
    ///
    /// # Errors
    ///
    /// An unload past zero is `InvalidState`; an adjustment that would leave a
    /// negative balance, or any result outside the quantity range, is
    /// `InvalidArgument`.
    pub fn apply(&self, current: Decimal) -> Result<Applied, ServiceError> {
        let out_of_range = || ServiceError::invalid("La giacenza risultante è fuori scala");
        let (delta, new_quantity) = match *self {
            StockChange::Load(q) => (q, current.checked_add(q).ok_or_else(out_of_range)?),
            StockChange::Unload(q) => {
                let after = current.checked_sub(q).ok_or_else(out_of_range)?;
                if after.is_sign_negative() && !after.is_zero() {
                    return Err(ServiceError::InvalidState(format!(
                        "Giacenza insufficiente: disponibili {}, richiesti {}",
                        current.normalize(),
                        q.normalize()
                    )));
                }
                (-q, after)
            }
            StockChange::SetTo(target) => {
                (target.checked_sub(current).ok_or_else(out_of_range)?, target)
            }
            StockChange::Shift(delta) => {
                let after = current.checked_add(delta).ok_or_else(out_of_range)?;
                if after.is_sign_negative() && !after.is_zero() {
                    return Err(ServiceError::invalid(format!(
                        "La rettifica porterebbe la giacenza a {}",
                        after.normalize()
                    )));
                }
                (delta, after)
            }
        };
        check_quantity(new_quantity, "giacenza risultante")?;
        Ok(Applied { delta, new_quantity })
    }
}

/// Optional data attached to a movement row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementMeta {
    pub unit_cost: Option<Decimal>,
    pub site_id: Option<i64>,
    pub note: Option<String>,
    pub date: Option<NaiveDate>,
}

/// A validated movement, ready for the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementCommand {
    pub item_id: i64,
    pub change: StockChange,
    pub meta: MovementMeta,
}

impl MovementCommand {
    pub fn new(item_id: i64, change: StockChange) -> Self {
        Self {
            item_id,
            change,
            meta: MovementMeta::default(),
        }
    }
}

/// `POST /magazzino/movimenti` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementRequest {
    #[serde(rename = "articoloId", default, deserialize_with = "id_opt")]
    pub item_id: Option<i64>,
    #[serde(rename = "tipo", default)]
    pub kind: Option<String>,
    #[serde(rename = "quantita", default, deserialize_with = "decimal_opt")]
    pub quantity: Option<Decimal>,
    #[serde(rename = "quantitaTarget", default, deserialize_with = "decimal_opt")]
    pub target: Option<Decimal>,
    #[serde(rename = "costoUnitario", default, deserialize_with = "decimal_opt")]
    pub unit_cost: Option<Decimal>,
    #[serde(rename = "cantiereId", default, deserialize_with = "id_opt")]
    pub site_id: Option<i64>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(rename = "data", default)]
    pub date: Option<String>,
}

fn positive(quantity: Option<Decimal>, kind: MovementKind) -> Result<Decimal, ServiceError> {
    match quantity {
        Some(q) if q > Decimal::ZERO => check_quantity(q, "quantita"),
        Some(_) => Err(ServiceError::invalid(format!(
            "La quantità di un {kind} deve essere positiva"
        ))),
        None => Err(ServiceError::invalid(format!(
            "Quantità obbligatoria per un {kind}"
        ))),
    }
}

impl MovementRequest {
    /// Check the request and turn it into a ledger command
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InvalidArgument` for any missing or malformed
    /// field.
    pub fn validate(self) -> Result<MovementCommand, ServiceError> {
        let item_id = match self.item_id {
            Some(id) if id > 0 => id,
            _ => return Err(ServiceError::invalid("articoloId obbligatorio")),
        };
        let kind: MovementKind = self
            .kind
            .as_deref()
            .ok_or_else(|| ServiceError::invalid("tipo obbligatorio"))?
            .parse()?;

        let change = match kind {
            MovementKind::Load => StockChange::Load(positive(self.quantity, kind)?),
            MovementKind::Unload => StockChange::Unload(positive(self.quantity, kind)?),
            MovementKind::Adjustment => match (self.target, self.quantity) {
                (Some(target), None) if target.is_sign_negative() && !target.is_zero() => {
                    return Err(ServiceError::invalid(
                        "quantitaTarget non può essere negativa",
                    ))
                }
                (Some(target), None) => {
                    StockChange::SetTo(check_quantity(target, "quantitaTarget")?)
                }
                (None, Some(delta)) if delta.is_zero() => {
                    return Err(ServiceError::invalid("Una rettifica di 0 non ha effetto"))
                }
                (None, Some(delta)) => StockChange::Shift(check_quantity(delta, "quantita")?),
                _ => {
                    return Err(ServiceError::invalid(
                        "Per una rettifica indicare quantitaTarget oppure quantita, non entrambe",
                    ))
                }
            },
        };

        if let Some(cost) = self.unit_cost {
            if cost.is_sign_negative() && !cost.is_zero() {
                return Err(ServiceError::invalid("costoUnitario non può essere negativo"));
            }
            numeric_fits(cost, "costoUnitario", 14, 4)?;
        }
        if let Some(site) = self.site_id {
            if site <= 0 {
                return Err(ServiceError::invalid("cantiereId non valido"));
            }
        }
        let note = max_len(non_blank(self.note), MAX_NOTE_LEN, "note")?;
        let date = non_blank(self.date).as_deref().map(parse_date).transpose()?;

        Ok(MovementCommand {
            item_id,
            change,
            meta: MovementMeta {
                unit_cost: self.unit_cost,
                site_id: self.site_id,
                note,
                date,
            },
        })
    }
}
