//! Score-update payload parsing.
//!
//! A score payload is a run of tagged text fields, e.g.
//! `<homeName>TIGERS</homeName><homeScore>54</homeScore><period>3</period>`.
//! The server sends whichever fields changed; unrecognized or absent tags
//! resolve to "no data" (`None`) and are ignored rather than treated as
//! errors. Field parsing beyond this contract belongs to the presentation
//! layer.

use crate::protocol::messages::extract_tag;

/// Which side currently has possession, when the server reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Possession {
    Home,
    Guest,
}

/// One parsed score update. Every field is optional: `None` means the server
/// did not include the tag in this payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreUpdate {
    pub home_name: Option<String>,
    pub guest_name: Option<String>,
    pub period: Option<String>,
    pub home_score: Option<u32>,
    pub guest_score: Option<u32>,
    pub home_fouls: Option<u32>,
    pub guest_fouls: Option<u32>,
    pub home_timeouts: Option<u32>,
    pub guest_timeouts: Option<u32>,
    pub possession: Option<Possession>,
    pub home_bonus: Option<bool>,
    pub guest_bonus: Option<bool>,
}

impl ScoreUpdate {
    /// Parses every known tag out of `payload`. Never fails: fields that are
    /// absent or unparsable stay `None`.
    pub fn parse(payload: &str) -> Self {
        Self {
            home_name: text_field(payload, "homeName"),
            guest_name: text_field(payload, "guestName"),
            period: text_field(payload, "period"),
            home_score: numeric_field(payload, "homeScore"),
            guest_score: numeric_field(payload, "guestScore"),
            home_fouls: numeric_field(payload, "homeFouls"),
            guest_fouls: numeric_field(payload, "guestFouls"),
            home_timeouts: numeric_field(payload, "homeTimeouts"),
            guest_timeouts: numeric_field(payload, "guestTimeouts"),
            possession: possession_field(payload),
            home_bonus: flag_field(payload, "homeBonus"),
            guest_bonus: flag_field(payload, "guestBonus"),
        }
    }

    /// True when no known tag was present in the payload.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn text_field(payload: &str, tag: &str) -> Option<String> {
    extract_tag(payload, tag)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn numeric_field(payload: &str, tag: &str) -> Option<u32> {
    extract_tag(payload, tag)?.trim().parse().ok()
}

fn flag_field(payload: &str, tag: &str) -> Option<bool> {
    match extract_tag(payload, tag)?.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

fn possession_field(payload: &str) -> Option<Possession> {
    match extract_tag(payload, "possession")?.trim() {
        "home" | "H" => Some(Possession::Home),
        "guest" | "G" => Some(Possession::Guest),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_payload() {
        // Arrange
        let payload = "<homeName>TIGERS</homeName><guestName>LIONS</guestName>\
                       <period>3</period><homeScore>54</homeScore><guestScore>48</guestScore>\
                       <homeFouls>6</homeFouls><guestFouls>4</guestFouls>\
                       <homeTimeouts>2</homeTimeouts><guestTimeouts>1</guestTimeouts>\
                       <possession>home</possession><homeBonus>1</homeBonus><guestBonus>0</guestBonus>";

        // Act
        let update = ScoreUpdate::parse(payload);

        // Assert
        assert_eq!(update.home_name.as_deref(), Some("TIGERS"));
        assert_eq!(update.guest_name.as_deref(), Some("LIONS"));
        assert_eq!(update.period.as_deref(), Some("3"));
        assert_eq!(update.home_score, Some(54));
        assert_eq!(update.guest_score, Some(48));
        assert_eq!(update.home_fouls, Some(6));
        assert_eq!(update.guest_fouls, Some(4));
        assert_eq!(update.home_timeouts, Some(2));
        assert_eq!(update.guest_timeouts, Some(1));
        assert_eq!(update.possession, Some(Possession::Home));
        assert_eq!(update.home_bonus, Some(true));
        assert_eq!(update.guest_bonus, Some(false));
    }

    #[test]
    fn test_absent_tags_resolve_to_none() {
        let update = ScoreUpdate::parse("<homeScore>10</homeScore>");
        assert_eq!(update.home_score, Some(10));
        assert_eq!(update.guest_score, None);
        assert_eq!(update.home_name, None);
    }

    #[test]
    fn test_unrecognized_tags_are_ignored() {
        // A field this display does not know about must not be an error.
        let update = ScoreUpdate::parse("<shotClock>24</shotClock><homeScore>2</homeScore>");
        assert_eq!(update.home_score, Some(2));
    }

    #[test]
    fn test_unparsable_numeric_field_is_no_data() {
        let update = ScoreUpdate::parse("<homeScore>abc</homeScore>");
        assert_eq!(update.home_score, None);
    }

    #[test]
    fn test_empty_payload_is_empty_update() {
        assert!(ScoreUpdate::parse("").is_empty());
    }

    #[test]
    fn test_possession_short_codes() {
        assert_eq!(
            ScoreUpdate::parse("<possession>G</possession>").possession,
            Some(Possession::Guest)
        );
    }
}
