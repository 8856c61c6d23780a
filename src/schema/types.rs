// src/schema/types.rs

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Number of IRI items in the instrument.
pub const ITEM_COUNT: usize = 28;

/// Items per subscale.
pub const ITEMS_PER_SUBSCALE: usize = 7;

/// The four IRI subscales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subscale {
    Fantasy,
    PerspectiveTaking,
    EmpathicConcern,
    PersonalDistress,
}

impl Subscale {
    pub const ALL: [Subscale; 4] = [
        Subscale::Fantasy,
        Subscale::PerspectiveTaking,
        Subscale::EmpathicConcern,
        Subscale::PersonalDistress,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Subscale::Fantasy => "FS",
            Subscale::PerspectiveTaking => "PT",
            Subscale::EmpathicConcern => "EC",
            Subscale::PersonalDistress => "PD",
        }
    }

    pub fn from_prefix(s: &str) -> Option<Self> {
        match s {
            "FS" => Some(Subscale::Fantasy),
            "PT" => Some(Subscale::PerspectiveTaking),
            "EC" => Some(Subscale::EmpathicConcern),
            "PD" => Some(Subscale::PersonalDistress),
            _ => None,
        }
    }

    /// Position in `Subscale::ALL`.
    pub fn ordinal(&self) -> usize {
        match self {
            Subscale::Fantasy => 0,
            Subscale::PerspectiveTaking => 1,
            Subscale::EmpathicConcern => 2,
            Subscale::PersonalDistress => 3,
        }
    }

    /// Item indices (1-based) that belong to this subscale.
    pub fn indices(&self) -> [u8; ITEMS_PER_SUBSCALE] {
        match self {
            Subscale::Fantasy => [1, 5, 7, 12, 16, 23, 26],
            Subscale::PerspectiveTaking => [3, 8, 11, 15, 21, 25, 28],
            Subscale::EmpathicConcern => [2, 4, 9, 14, 18, 20, 22],
            Subscale::PersonalDistress => [6, 10, 13, 17, 19, 24, 27],
        }
    }

    pub fn items(&self) -> impl Iterator<Item = CanonicalItem> {
        let sub = *self;
        self.indices()
            .into_iter()
            .map(move |index| CanonicalItem { index, subscale: sub })
    }

    /// Name of the mean column in published tables, e.g. `FS_mean`.
    pub fn mean_column(&self) -> String {
        format!("{}_mean", self.prefix())
    }
}

impl fmt::Display for Subscale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One of the 28 IRI items, e.g. `FS1` or `EC2`.
///
/// The subscale is fixed by the index; a `CanonicalItem` can only be built
/// through [`CanonicalItem::from_index`] or parsing, so the pair is always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalItem {
    index: u8,
    subscale: Subscale,
}

impl CanonicalItem {
    pub fn from_index(index: u8) -> Option<Self> {
        Subscale::ALL
            .iter()
            .find(|s| s.indices().contains(&index))
            .map(|&subscale| CanonicalItem { index, subscale })
    }

    /// All 28 items ordered by index.
    pub fn all() -> impl Iterator<Item = CanonicalItem> {
        (1..=ITEM_COUNT as u8).filter_map(CanonicalItem::from_index)
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn subscale(&self) -> Subscale {
        self.subscale
    }

    /// Zero-based slot in an item vector ordered by index.
    pub fn slot(&self) -> usize {
        usize::from(self.index) - 1
    }

    pub fn id(&self) -> String {
        format!("{}{}", self.subscale.prefix(), self.index)
    }
}

impl fmt::Display for CanonicalItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.subscale.prefix(), self.index)
    }
}

impl FromStr for CanonicalItem {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() < 3 || !s.is_char_boundary(2) {
            return Err(anyhow!("`{}` is not an IRI item id", s));
        }
        let (prefix, digits) = s.split_at(2);
        let subscale = Subscale::from_prefix(&prefix.to_ascii_uppercase())
            .ok_or_else(|| anyhow!("unknown subscale prefix in `{}`", s))?;
        let index: u8 = digits
            .parse()
            .map_err(|_| anyhow!("bad item index in `{}`", s))?;
        let item = CanonicalItem::from_index(index)
            .ok_or_else(|| anyhow!("item index {} out of range in `{}`", index, s))?;
        if item.subscale != subscale {
            return Err(anyhow!(
                "item {} belongs to {}, not {}",
                index,
                item.subscale,
                subscale
            ));
        }
        Ok(item)
    }
}

impl TryFrom<String> for CanonicalItem {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<CanonicalItem> for String {
    fn from(item: CanonicalItem) -> String {
        item.id()
    }
}

/// Responses for all 28 items, indexed by [`CanonicalItem::slot`].
/// `None` marks an absent answer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemResponses([Option<f64>; ITEM_COUNT]);

impl ItemResponses {
    pub fn get(&self, item: CanonicalItem) -> Option<f64> {
        self.0[item.slot()]
    }

    pub fn set(&mut self, item: CanonicalItem, value: Option<f64>) {
        self.0[item.slot()] = value;
    }

    /// Values in index order.
    pub fn values(&self) -> &[Option<f64>; ITEM_COUNT] {
        &self.0
    }

    /// Values for `items`, or `None` when any of them is absent.
    pub fn complete_on(&self, items: &[CanonicalItem]) -> Option<Vec<f64>> {
        items.iter().map(|&it| self.get(it)).collect()
    }
}

impl From<[Option<f64>; ITEM_COUNT]> for ItemResponses {
    fn from(values: [Option<f64>; ITEM_COUNT]) -> Self {
        ItemResponses(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_index_maps_to_exactly_one_subscale() {
        let items: Vec<CanonicalItem> = CanonicalItem::all().collect();
        assert_eq!(items.len(), ITEM_COUNT);
        for sub in Subscale::ALL {
            assert_eq!(
                items.iter().filter(|i| i.subscale() == sub).count(),
                ITEMS_PER_SUBSCALE
            );
        }
        assert_eq!(items[0].id(), "FS1");
        assert_eq!(items[1].id(), "EC2");
        assert_eq!(items[27].id(), "PT28");
    }

    #[test]
    fn parses_and_rejects_item_ids() {
        assert_eq!("PD13".parse::<CanonicalItem>().unwrap().index(), 13);
        assert_eq!("fs7".parse::<CanonicalItem>().unwrap().id(), "FS7");
        assert!("FS2".parse::<CanonicalItem>().is_err());
        assert!("XX1".parse::<CanonicalItem>().is_err());
        assert!("PT29".parse::<CanonicalItem>().is_err());
        assert!("P".parse::<CanonicalItem>().is_err());
    }

    #[test]
    fn serde_uses_item_id() {
        let item: CanonicalItem = "EC14".parse().unwrap();
        let yaml = serde_yaml::to_string(&vec![item]).unwrap();
        assert!(yaml.contains("EC14"));
        let back: Vec<CanonicalItem> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, vec![item]);
    }
}
