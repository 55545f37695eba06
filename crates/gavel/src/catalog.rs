//! Per-league player catalog used to seed new rooms.
//!
//! The file format is a JSON object keyed by league:
//!
//! ```json
//! {
//!   "IPL": [
//!     { "player": "Virat Kohli", "basePrice": 2, "nation": "India", "role": "Batter", "team": "RCB" }
//!   ],
//!   "BBL": []
//! }
//! ```
//!
//! `basePrice` is in crores and may be fractional. A missing base price
//! means [`DEFAULT_BASE_PRICE`].

use std::collections::HashMap;
use std::path::Path;

use gavel_protocol::{Amount, Codec, JsonCodec, League, PlayerLot, ProtocolError};
use serde::Deserialize;
use tracing::info;

use crate::GavelError;

/// Base price for catalog entries that don't name one.
pub const DEFAULT_BASE_PRICE: Amount = Amount::crores(2);

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(alias = "player")]
    name: String,
    #[serde(default, alias = "basePrice")]
    base_price: Option<f64>,
    #[serde(default)]
    nation: String,
    #[serde(default)]
    role: String,
    #[serde(default, alias = "team")]
    franchise: String,
}

impl CatalogEntry {
    fn into_lot(self) -> Result<PlayerLot, GavelError> {
        let base_price = match self.base_price {
            None => DEFAULT_BASE_PRICE,
            Some(crores) if crores.is_finite() && crores > 0.0 => {
                Amount::from_hundredths((crores * 100.0).round() as u64)
            }
            Some(_) => Amount::ZERO,
        };
        // Checked after rounding: 0.004 crore is zero hundredths.
        if base_price.is_zero() {
            return Err(ProtocolError::InvalidMessage(format!(
                "{}: base price {:?} is not a positive amount",
                self.name, self.base_price
            ))
            .into());
        }
        let mut lot = PlayerLot::new(self.name, base_price, self.nation, self.role);
        lot.franchise = self.franchise;
        Ok(lot)
    }
}

/// Lots available to each league.
#[derive(Debug, Clone, Default)]
pub struct LotCatalog {
    leagues: HashMap<League, Vec<PlayerLot>>,
}

impl LotCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a catalog from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, GavelError> {
        let raw: HashMap<League, Vec<CatalogEntry>> = JsonCodec.decode(bytes)?;
        let mut catalog = Self::new();
        for (league, entries) in raw {
            let lots = entries
                .into_iter()
                .map(CatalogEntry::into_lot)
                .collect::<Result<Vec<_>, _>>()?;
            catalog.leagues.insert(league, lots);
        }
        Ok(catalog)
    }

    /// Reads and parses a catalog file.
    pub fn load(path: &Path) -> Result<Self, GavelError> {
        let bytes = std::fs::read(path).map_err(|source| GavelError::Catalog {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json(&bytes)?;
        info!(path = %path.display(), lots = catalog.len(), "lot catalog loaded");
        Ok(catalog)
    }

    /// A small catalog covering every league, for local play and tests.
    pub fn builtin() -> Self {
        let lot = |name: &str, crores_x100: u64, nation: &str, role: &str| {
            PlayerLot::new(name, Amount::from_hundredths(crores_x100), nation, role)
        };
        let mut catalog = Self::new();
        catalog.insert(
            League::Ipl,
            vec![
                lot("Virat Kohli", 200, "India", "Batter"),
                lot("Jasprit Bumrah", 200, "India", "Bowler"),
                lot("Rishabh Pant", 200, "India", "Wicketkeeper"),
                lot("Ravindra Jadeja", 150, "India", "All-rounder"),
                lot("Rashid Khan", 200, "Afghanistan", "Bowler"),
                lot("Jos Buttler", 200, "England", "Wicketkeeper"),
                lot("Pat Cummins", 200, "Australia", "Bowler"),
                lot("Kuldeep Yadav", 100, "India", "Bowler"),
            ],
        );
        catalog.insert(
            League::Bbl,
            vec![
                lot("Glenn Maxwell", 200, "Australia", "All-rounder"),
                lot("Adam Zampa", 150, "Australia", "Bowler"),
                lot("Marcus Stoinis", 150, "Australia", "All-rounder"),
                lot("Josh Inglis", 100, "Australia", "Wicketkeeper"),
                lot("Tim David", 150, "Singapore", "Batter"),
                lot("Shadab Khan", 100, "Pakistan", "All-rounder"),
            ],
        );
        catalog.insert(
            League::Hundreds,
            vec![
                lot("Harry Brook", 200, "England", "Batter"),
                lot("Jofra Archer", 200, "England", "Bowler"),
                lot("Liam Livingstone", 150, "England", "All-rounder"),
                lot("Phil Salt", 150, "England", "Wicketkeeper"),
                lot("Kieron Pollard", 100, "West Indies", "All-rounder"),
                lot("Sunil Narine", 100, "West Indies", "Bowler"),
            ],
        );
        catalog
    }

    /// Replaces a league's lots.
    pub fn insert(&mut self, league: League, lots: Vec<PlayerLot>) {
        self.leagues.insert(league, lots);
    }

    /// Fresh copies of a league's lots. Empty for an unlisted league.
    pub fn lots(&self, league: League) -> Vec<PlayerLot> {
        self.leagues.get(&league).cloned().unwrap_or_default()
    }

    /// Total lots across every league.
    pub fn len(&self) -> usize {
        self.leagues.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
