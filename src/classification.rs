/// TLP sensitivity levels, ordered least to most restrictive. `None` is
/// the absent-marking sentinel and compares below every real level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Classification {
    #[default]
    None,
    White,
    Green,
    Amber,
    Red,
}

impl Classification {
    /// Maps a document property value to a level. Values outside the
    /// fixed TLP table contribute nothing.
    pub fn from_label(value: &str) -> Option<Classification> {
        match value {
            "TLP:WHITE" => Some(Classification::White),
            "TLP:GREEN" => Some(Classification::Green),
            "TLP:AMBER" => Some(Classification::Amber),
            "TLP:RED" => Some(Classification::Red),
            _ => None,
        }
    }

    /// The wire label for this level. `None` serializes to the empty
    /// string, which the front-end treats as "no classification found".
    pub fn label(self) -> &'static str {
        match self {
            Classification::None => "",
            Classification::White => "TLP:WHITE",
            Classification::Green => "TLP:GREEN",
            Classification::Amber => "TLP:AMBER",
            Classification::Red => "TLP:RED",
        }
    }
}

/// Reduces a sequence of property values to the most restrictive level
/// found among them, with `None` as the identity.
pub fn classify_values<I, S>(values: I) -> Classification
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .filter_map(|value| Classification::from_label(value.as_ref()))
        .max()
        .unwrap_or(Classification::None)
}
