//! Shared primitive types used across the entire engine.

use crate::error::{SettlementError, SettlementResult};
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Agency tax identifier. Primary grouping and join key.
pub type Ruc = String;

/// Identifier of one engine run (one cut over one zone/period batch).
pub type RunId = String;

/// A reporting period, stored as the integer YYYYMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Periodo(u32);

impl Periodo {
    pub fn new(year: i32, month: u32) -> SettlementResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(SettlementError::InvalidPeriod(format!("{year}{month:02}")));
        }
        if !(2000..=2999).contains(&year) {
            return Err(SettlementError::InvalidPeriod(format!("{year}{month:02}")));
        }
        Ok(Self(year as u32 * 100 + month))
    }

    pub fn year(&self) -> i32 {
        (self.0 / 100) as i32
    }

    pub fn month(&self) -> u32 {
        self.0 % 100
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// First day of the period.
    pub fn start(&self) -> NaiveDate {
        // Month and year were range-checked on construction.
        NaiveDate::from_ymd_opt(self.year(), self.month(), 1).unwrap_or(NaiveDate::MIN)
    }

    /// First day of the following month (exclusive upper bound).
    pub fn end(&self) -> NaiveDate {
        self.plus_months(1)
    }

    /// First day of the month `n` months after the period start.
    pub fn plus_months(&self, n: u32) -> NaiveDate {
        self.start()
            .checked_add_months(Months::new(n))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date < self.end()
    }
}

impl TryFrom<u32> for Periodo {
    type Error = SettlementError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new((value / 100) as i32, value % 100)
    }
}

impl From<Periodo> for u32 {
    fn from(p: Periodo) -> u32 {
        p.0
    }
}

impl FromStr for Periodo {
    type Err = SettlementError;

    /// Accepts `202504`, `2025-04` and `04/2025`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let invalid = || SettlementError::InvalidPeriod(token.to_string());

        let (year, month) = if let Some((y, m)) = token.split_once('-') {
            (y, m)
        } else if let Some((m, y)) = token.split_once('/') {
            (y, m)
        } else if token.len() == 6 && token.chars().all(|c| c.is_ascii_digit()) {
            token.split_at(4)
        } else {
            return Err(invalid());
        };

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl fmt::Display for Periodo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Zona {
    #[serde(rename = "LIMA")]
    Lima,
    #[serde(rename = "PROVINCIA")]
    Provincia,
}

impl Zona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zona::Lima      => "LIMA",
            Zona::Provincia => "PROVINCIA",
        }
    }
}

impl FromStr for Zona {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIMA"      => Ok(Zona::Lima),
            "PROVINCIA" => Ok(Zona::Provincia),
            other       => Err(SettlementError::InvalidZone(other.to_string())),
        }
    }
}

impl TryFrom<String> for Zona {
    type Error = SettlementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Zona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agency classification used by the multiplier band table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Tier {
    Gold,
    Silver,
    Regular,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Gold    => "GOLD",
            Tier::Silver  => "SILVER",
            Tier::Regular => "REGULAR",
        }
    }
}

impl FromStr for Tier {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GOLD"                 => Ok(Tier::Gold),
            "SILVER"               => Ok(Tier::Silver),
            "REGULAR" | "NO ES TOP" => Ok(Tier::Regular),
            other                  => Err(SettlementError::InvalidTier(other.to_string())),
        }
    }
}

impl TryFrom<String> for Tier {
    type Error = SettlementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Tier> for String {
    fn from(t: Tier) -> String {
        t.as_str().to_string()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the four sequential settlement checkpoints of a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Corte {
    Uno,
    Dos,
    Tres,
    Cuatro,
}

impl Corte {
    pub const ALL: [Corte; 4] = [Corte::Uno, Corte::Dos, Corte::Tres, Corte::Cuatro];

    pub fn number(&self) -> u8 {
        match self {
            Corte::Uno    => 1,
            Corte::Dos    => 2,
            Corte::Tres   => 3,
            Corte::Cuatro => 4,
        }
    }

    /// Zero-based position, for per-cut config arrays.
    pub fn index(&self) -> usize {
        self.number() as usize - 1
    }

    pub fn previous(&self) -> Option<Corte> {
        match self {
            Corte::Uno    => None,
            Corte::Dos    => Some(Corte::Uno),
            Corte::Tres   => Some(Corte::Dos),
            Corte::Cuatro => Some(Corte::Tres),
        }
    }

    pub fn next(&self) -> Option<Corte> {
        match self {
            Corte::Uno    => Some(Corte::Dos),
            Corte::Dos    => Some(Corte::Tres),
            Corte::Tres   => Some(Corte::Cuatro),
            Corte::Cuatro => None,
        }
    }

    /// Billing cycle (1..=3) whose receipt is checked at this cut.
    pub fn receipt_cycle(&self) -> usize {
        match self {
            Corte::Uno | Corte::Dos => 1,
            Corte::Tres             => 2,
            Corte::Cuatro           => 3,
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            Corte::Uno    => "corte_1",
            Corte::Dos    => "corte_2",
            Corte::Tres   => "corte_3",
            Corte::Cuatro => "corte_4",
        }
    }
}

impl TryFrom<u8> for Corte {
    type Error = SettlementError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Corte::Uno),
            2 => Ok(Corte::Dos),
            3 => Ok(Corte::Tres),
            4 => Ok(Corte::Cuatro),
            n => Err(SettlementError::MissingKey(format!("corte {n}"))),
        }
    }
}

impl From<Corte> for u8 {
    fn from(c: Corte) -> u8 {
        c.number()
    }
}

impl fmt::Display for Corte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "corte {}", self.number())
    }
}

/// Natural key of every cut settlement row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SettlementKey {
    pub periodo: Periodo,
    pub zona:    Zona,
    pub ruc:     Ruc,
}

impl SettlementKey {
    pub fn new(periodo: Periodo, zona: Zona, ruc: impl Into<Ruc>) -> Self {
        Self { periodo, zona, ruc: ruc.into() }
    }
}

impl fmt::Display for SettlementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.periodo, self.zona, self.ruc)
    }
}
