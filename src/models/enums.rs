use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(MessageRole {
    User => "user",
    Agent => "agent",
});

str_enum!(SeverityBand {
    Normal => "normal",
    Mild => "mild",
    Moderate => "moderate",
    Severe => "severe",
    VerySevere => "very_severe",
});

impl MessageRole {
    /// Speaker prefix used when rendering history into a prompt.
    pub fn prompt_prefix(&self) -> &'static str {
        match self {
            Self::User => "Human",
            _ => "AI",
        }
    }
}

impl SeverityBand {
    /// Map a PHQ-9 total score to its band.
    ///
    /// Boundaries are inclusive and contiguous over 0..=27. Callers are
    /// expected to have range-checked the score; anything above 27 lands in
    /// `VerySevere`.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=4 => Self::Normal,
            5..=9 => Self::Mild,
            10..=14 => Self::Moderate,
            15..=19 => Self::Severe,
            _ => Self::VerySevere,
        }
    }

    /// Korean label shown to the counselor model and the user.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "정상",
            Self::Mild => "경미한 우울",
            Self::Moderate => "중등도 우울",
            Self::Severe => "중증 우울",
            Self::VerySevere => "매우 심한 우울",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn message_role_round_trip() {
        for (variant, s) in [(MessageRole::User, "user"), (MessageRole::Agent, "agent")] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(MessageRole::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn severity_band_round_trip() {
        for (variant, s) in [
            (SeverityBand::Normal, "normal"),
            (SeverityBand::Mild, "mild"),
            (SeverityBand::Moderate, "moderate"),
            (SeverityBand::Severe, "severe"),
            (SeverityBand::VerySevere, "very_severe"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(SeverityBand::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn band_boundaries_are_exact() {
        let expected = [
            (0, SeverityBand::Normal),
            (4, SeverityBand::Normal),
            (5, SeverityBand::Mild),
            (9, SeverityBand::Mild),
            (10, SeverityBand::Moderate),
            (14, SeverityBand::Moderate),
            (15, SeverityBand::Severe),
            (19, SeverityBand::Severe),
            (20, SeverityBand::VerySevere),
            (27, SeverityBand::VerySevere),
        ];
        for (score, band) in expected {
            assert_eq!(SeverityBand::from_score(score), band, "score {score}");
        }
    }

    #[test]
    fn prompt_prefix_maps_user_to_human() {
        assert_eq!(MessageRole::User.prompt_prefix(), "Human");
        assert_eq!(MessageRole::Agent.prompt_prefix(), "AI");
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(MessageRole::from_str("system").is_err());
        assert!(SeverityBand::from_str("").is_err());
    }
}
