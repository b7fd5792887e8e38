use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Placeholder the lookup endpoint yields when a street's house numbers are unknown
pub const UNKNOWN_HOUSENUMBERS: &str = "...";

/// A street/house-number pair exactly as the rent-index site spells it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub housenumber: String,
}

impl Address {
    pub fn new(street: impl Into<String>, housenumber: impl Into<String>) -> Self {
        Self {
            street: street.into(),
            housenumber: housenumber.into(),
        }
    }

    /// Composite lookup key `"<street> <housenumber>"`
    pub fn key(&self) -> String {
        composite_key(&self.street, &self.housenumber)
    }

    /// True for the `"..."` placeholder of a street without known numbers
    pub fn is_unknown(&self) -> bool {
        self.housenumber == UNKNOWN_HOUSENUMBERS
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.street, self.housenumber)
    }
}

pub fn composite_key(street: &str, housenumber: &str) -> String {
    format!("{} {}", street, housenumber)
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid {kind} '{value}'. Accepted values: {accepted}")]
pub struct BandParseError {
    kind: &'static str,
    value: String,
    accepted: String,
}

/// Dwelling size classification used as query parameter `form_3`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SizeBand {
    #[serde(rename = "under50")]
    Under50,
    #[serde(rename = "between50and80")]
    Between50And80,
    #[serde(rename = "over80")]
    Over80,
}

impl SizeBand {
    pub const ALL: [SizeBand; 3] = [SizeBand::Under50, SizeBand::Between50And80, SizeBand::Over80];

    /// Numeric code the query form expects
    pub fn code(self) -> u8 {
        match self {
            SizeBand::Under50 => 1,
            SizeBand::Between50And80 => 2,
            SizeBand::Over80 => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SizeBand::Under50 => "under50",
            SizeBand::Between50And80 => "between50and80",
            SizeBand::Over80 => "over80",
        }
    }
}

impl fmt::Display for SizeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SizeBand {
    type Err = BandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SizeBand::ALL
            .into_iter()
            .find(|band| band.name() == s || band.code().to_string() == s)
            .ok_or_else(|| BandParseError {
                kind: "size band",
                value: s.to_string(),
                accepted: SizeBand::ALL.map(SizeBand::name).join(", "),
            })
    }
}

/// Construction period classification used as query parameter `form_4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum YearBand {
    #[serde(rename = "till1949")]
    Till1949,
    #[serde(rename = "between1950and1962")]
    Between1950And1962,
    #[serde(rename = "between1963and1990")]
    Between1963And1990,
    #[serde(rename = "between1991and2001")]
    Between1991And2001,
    #[serde(rename = "since2002")]
    Since2002,
}

impl YearBand {
    pub const ALL: [YearBand; 5] = [
        YearBand::Till1949,
        YearBand::Between1950And1962,
        YearBand::Between1963And1990,
        YearBand::Between1991And2001,
        YearBand::Since2002,
    ];

    /// Numeric code the query form expects
    pub fn code(self) -> u8 {
        match self {
            YearBand::Till1949 => 1,
            YearBand::Between1950And1962 => 2,
            YearBand::Between1963And1990 => 3,
            YearBand::Between1991And2001 => 4,
            YearBand::Since2002 => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            YearBand::Till1949 => "till1949",
            YearBand::Between1950And1962 => "between1950and1962",
            YearBand::Between1963And1990 => "between1963and1990",
            YearBand::Between1991And2001 => "between1991and2001",
            YearBand::Since2002 => "since2002",
        }
    }
}

impl fmt::Display for YearBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for YearBand {
    type Err = BandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        YearBand::ALL
            .into_iter()
            .find(|band| band.name() == s || band.code().to_string() == s)
            .ok_or_else(|| BandParseError {
                kind: "year band",
                value: s.to_string(),
                accepted: YearBand::ALL.map(YearBand::name).join(", "),
            })
    }
}

/// Scraped rent-index values, kept as the raw text the site renders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentRecord {
    #[serde(rename = "VergleichsmieteVon")]
    pub rent_from: String,
    #[serde(rename = "VergleichsmieteBis")]
    pub rent_to: String,
    #[serde(rename = "Wohnlage")]
    pub location_quality: String,
    #[serde(rename = "Wohnwertpunkte")]
    pub quality_points: String,
}

impl RentRecord {
    /// The empty record stands for "no result page"
    pub fn is_empty(&self) -> bool {
        *self == RentRecord::default()
    }
}

/// Street → house numbers, built once per run and frozen afterwards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressInventory {
    streets: BTreeMap<String, Vec<String>>,
}

impl AddressInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a street; numbers of a street already present are appended.
    pub fn insert(&mut self, street: impl Into<String>, housenumbers: Vec<String>) {
        self.streets
            .entry(street.into())
            .or_default()
            .extend(housenumbers);
    }

    pub fn streets(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.streets
            .iter()
            .map(|(street, numbers)| (street.as_str(), numbers.as_slice()))
    }

    pub fn housenumbers(&self, street: &str) -> Option<&[String]> {
        self.streets.get(street).map(Vec::as_slice)
    }

    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.streets.iter().flat_map(|(street, numbers)| {
            numbers
                .iter()
                .map(move |housenumber| Address::new(street.as_str(), housenumber.as_str()))
        })
    }

    pub fn street_count(&self) -> usize {
        self.streets.len()
    }

    pub fn address_count(&self) -> usize {
        self.streets.values().map(Vec::len).sum()
    }
}

impl FromIterator<(String, Vec<String>)> for AddressInventory {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        let mut inventory = AddressInventory::new();
        for (street, numbers) in iter {
            inventory.insert(street, numbers);
        }
        inventory
    }
}

/// SizeBand → YearBand → record for a single house number
pub type HouseRents = BTreeMap<SizeBand, BTreeMap<YearBand, RentRecord>>;

/// House number → its rents, for a single street
pub type StreetRents = BTreeMap<String, HouseRents>;

/// street → house number → SizeBand → YearBand → RentRecord
pub type RentIndex = BTreeMap<String, StreetRents>;

/// Opaque geodata element, echoed back untouched
pub type FootprintRecord = serde_json::Value;

/// Building footprints keyed by `"<street> <housenumber>"`
#[derive(Debug, Clone, Default)]
pub struct FootprintIndex {
    by_address: HashMap<String, Vec<FootprintRecord>>,
}

impl FootprintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, record: FootprintRecord) {
        self.by_address.entry(key).or_default().push(record);
    }

    pub fn get(&self, key: &str) -> Option<&[FootprintRecord]> {
        self.by_address.get(key).map(Vec::as_slice)
    }

    /// Number of distinct address keys
    pub fn len(&self) -> usize {
        self.by_address.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchedAddress {
    pub address: Address,
    /// The lookup key variant that hit
    pub matched_key: String,
    pub footprints: Vec<FootprintRecord>,
}

/// Every inventory address lands in exactly one of `matched` / `unmatched`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationResult {
    pub matched: Vec<MatchedAddress>,
    pub unmatched: Vec<Address>,
    /// Matched footprint records keyed by their element identity
    pub footprints: BTreeMap<String, FootprintRecord>,
}

impl ReconciliationResult {
    pub fn total(&self) -> usize {
        self.matched.len() + self.unmatched.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_codes_follow_form_values() {
        assert_eq!(SizeBand::ALL.map(SizeBand::code), [1, 2, 3]);
        assert_eq!(YearBand::ALL.map(YearBand::code), [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_band_from_str_accepts_name_and_code() {
        assert_eq!("over80".parse::<SizeBand>().unwrap(), SizeBand::Over80);
        assert_eq!("2".parse::<SizeBand>().unwrap(), SizeBand::Between50And80);
        assert_eq!("since2002".parse::<YearBand>().unwrap(), YearBand::Since2002);
        assert!("1800".parse::<YearBand>().is_err());
    }

    #[test]
    fn test_rent_record_serializes_with_site_field_names() {
        let record = RentRecord {
            rent_from: "5,20".into(),
            rent_to: "7,40".into(),
            location_quality: "gut".into(),
            quality_points: "12".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["VergleichsmieteVon"], "5,20");
        assert_eq!(json["VergleichsmieteBis"], "7,40");
        assert_eq!(json["Wohnlage"], "gut");
        assert_eq!(json["Wohnwertpunkte"], "12");
        assert!(RentRecord::default().is_empty());
        assert!(!record.is_empty());
    }

    #[test]
    fn test_band_keys_serialize_by_name() {
        let mut rents = HouseRents::new();
        rents
            .entry(SizeBand::Between50And80)
            .or_default()
            .insert(YearBand::Till1949, RentRecord::default());
        let json = serde_json::to_value(&rents).unwrap();
        assert!(json["between50and80"]["till1949"].is_object());
    }

    #[test]
    fn test_inventory_merges_duplicate_streets() {
        let mut inventory = AddressInventory::new();
        inventory.insert("Biberweg", vec!["1".into(), "2".into()]);
        inventory.insert("Biberweg", vec!["3".into()]);
        inventory.insert("Am Anger", vec!["7".into()]);

        assert_eq!(inventory.street_count(), 2);
        assert_eq!(inventory.address_count(), 4);
        assert_eq!(inventory.housenumbers("Biberweg").unwrap(), ["1", "2", "3"]);

        let first = inventory.addresses().next().unwrap();
        assert_eq!(first, Address::new("Am Anger", "7"));
        assert_eq!(first.key(), "Am Anger 7");
        assert_eq!(first.to_string(), "Am Anger => 7");
    }
}
