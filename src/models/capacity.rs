use serde::{Deserialize, Deserializer, Serialize};

/// Transport size shared by items, batches and couriers.
///
/// Ordered `Small < Medium < Large`. Missing or unrecognised tags
/// deserialize as `Small`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capacity {
    #[default]
    Small,
    Medium,
    Large,
}

impl Capacity {
    pub fn rank(self) -> u8 {
        match self {
            Capacity::Small => 1,
            Capacity::Medium => 2,
            Capacity::Large => 3,
        }
    }

    pub fn from_rank(rank: u8) -> Self {
        match rank {
            0 | 1 => Capacity::Small,
            2 => Capacity::Medium,
            _ => Capacity::Large,
        }
    }

    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.map(|raw| raw.trim().to_ascii_lowercase()).as_deref() {
            Some("medium") => Capacity::Medium,
            Some("large") => Capacity::Large,
            _ => Capacity::Small,
        }
    }

    /// A courier of this capacity can carry a load that requires `required`.
    pub fn satisfies(self, required: Capacity) -> bool {
        self.rank() >= required.rank()
    }

    /// Largest capacity among `sizes`; `Small` for an empty set.
    pub fn max_of<I>(sizes: I) -> Self
    where
        I: IntoIterator<Item = Capacity>,
    {
        sizes
            .into_iter()
            .map(Capacity::rank)
            .max()
            .map(Capacity::from_rank)
            .unwrap_or_default()
    }
}

impl<'de> Deserialize<'de> for Capacity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = Option::<String>::deserialize(deserializer)?;
        Ok(Capacity::from_tag(tag.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::Capacity;

    #[test]
    fn ranks_are_ordinal() {
        assert!(Capacity::Small.rank() < Capacity::Medium.rank());
        assert!(Capacity::Medium.rank() < Capacity::Large.rank());
    }

    #[test]
    fn larger_capacity_satisfies_smaller_requirement() {
        assert!(Capacity::Large.satisfies(Capacity::Small));
        assert!(Capacity::Medium.satisfies(Capacity::Medium));
        assert!(!Capacity::Small.satisfies(Capacity::Large));
    }

    #[test]
    fn unknown_tags_default_to_small() {
        assert_eq!(Capacity::from_tag(None), Capacity::Small);
        assert_eq!(Capacity::from_tag(Some("truck")), Capacity::Small);
        assert_eq!(Capacity::from_tag(Some(" LARGE ")), Capacity::Large);

        let parsed: Capacity = serde_json::from_str("\"bicycle\"").unwrap();
        assert_eq!(parsed, Capacity::Small);
        let parsed: Capacity = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, Capacity::Small);
    }

    #[test]
    fn max_of_picks_largest() {
        let sizes = [Capacity::Small, Capacity::Large, Capacity::Medium];
        assert_eq!(Capacity::max_of(sizes), Capacity::Large);
        assert_eq!(Capacity::max_of(Vec::new()), Capacity::Small);
    }
}
