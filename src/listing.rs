// src/listing.rs
//! Pure in-memory derivations over the full request set: free-text filter,
//! kanban grouping and rule-based sorting. The board endpoints load every
//! request (there is no server-side pagination) and shape the result here.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumString};

use crate::models::{RequestEquipment, RequestRow};

// ==================== CARD ====================

/// What a list row / kanban card carries: the joined request row plus the
/// association names that take part in free-text search.
#[derive(Debug, Serialize, Clone)]
pub struct RequestCard {
    #[serde(flatten)]
    pub row: RequestRow,
    pub equipment: Vec<RequestEquipment>,
    pub songs: Vec<String>,
    pub assignees: Vec<String>,
}

impl RequestCard {
    /// Concatenated lowercase text the filter matches against
    fn haystack(&self) -> String {
        let mut parts: Vec<&str> = vec![
            &self.row.who,
            &self.row.what,
            &self.row.when_,
            &self.row.where_,
            &self.row.why,
            &self.row.how,
            &self.row.status_name,
            &self.row.priority_name,
            &self.row.type_name,
        ];
        if let Some(ref info) = self.row.info {
            parts.push(info);
        }
        for eq in &self.equipment {
            parts.push(&eq.name);
        }
        for song in &self.songs {
            parts.push(song);
        }
        parts.join(" ").to_lowercase()
    }
}

// ==================== FILTER ====================

pub fn filter_cards(cards: &[RequestCard], query: &str) -> Vec<RequestCard> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return cards.to_vec();
    }
    cards
        .iter()
        .filter(|card| card.haystack().contains(&needle))
        .cloned()
        .collect()
}

// ==================== GROUPING ====================

/// Partition cards by status ordinal. The union of the groups equals the
/// input and the key set is exactly the distinct status values present.
pub fn group_by_status(cards: &[RequestCard]) -> BTreeMap<i64, Vec<RequestCard>> {
    let mut groups: BTreeMap<i64, Vec<RequestCard>> = BTreeMap::new();
    for card in cards {
        groups
            .entry(card.row.status_value)
            .or_default()
            .push(card.clone());
    }
    groups
}

// ==================== SORTING ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Created,
    Due,
    Priority,
    Status,
    Who,
    What,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SortRule {
    pub field: SortField,
    pub dir: SortDir,
    pub enabled: bool,
}

impl SortRule {
    pub fn new(field: SortField, dir: SortDir) -> Self {
        Self { field, dir, enabled: true }
    }
}

/// Missing due dates sort as the epoch
fn due_key(card: &RequestCard) -> DateTime<Utc> {
    card.row.due_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn compare_by(a: &RequestCard, b: &RequestCard, field: SortField) -> Ordering {
    match field {
        SortField::Created => a.row.created_at.cmp(&b.row.created_at),
        SortField::Due => due_key(a).cmp(&due_key(b)),
        SortField::Priority => a.row.priority_value.cmp(&b.row.priority_value),
        SortField::Status => a.row.status_value.cmp(&b.row.status_value),
        SortField::Who => a.row.who.to_lowercase().cmp(&b.row.who.to_lowercase()),
        SortField::What => a.row.what.to_lowercase().cmp(&b.row.what.to_lowercase()),
    }
}

/// Apply the rules in priority order; the first enabled rule producing a
/// non-equal comparison wins. Ties keep the incoming order (stable sort).
pub fn sort_cards(cards: &mut [RequestCard], rules: &[SortRule]) {
    cards.sort_by(|a, b| {
        for rule in rules.iter().filter(|r| r.enabled) {
            let ord = compare_by(a, b, rule.field);
            let ord = match rule.dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Parse a `field:dir` comma list, e.g. `due:asc,priority:desc`. Unknown
/// fields or directions are skipped rather than rejected.
pub fn parse_sort_rules(raw: &str) -> Vec<SortRule> {
    raw.split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let (field, dir) = match part.split_once(':') {
                Some((f, d)) => (f, d),
                None => (part, "asc"),
            };
            let field = SortField::from_str(field.trim()).ok()?;
            let dir = SortDir::from_str(dir.trim()).unwrap_or(SortDir::Asc);
            Some(SortRule::new(field, dir))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn card(id: &str, what: &str, status_value: i64, due_at: Option<DateTime<Utc>>) -> RequestCard {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        RequestCard {
            row: RequestRow {
                id: id.to_string(),
                who: "Youth group".to_string(),
                what: what.to_string(),
                when_: "Friday evening".to_string(),
                where_: "Main hall".to_string(),
                why: "Rehearsal".to_string(),
                how: "Standard setup".to_string(),
                info: None,
                due_at,
                created_at: created,
                status_id: format!("status-{}", status_value),
                status_name: format!("Stage {}", status_value),
                status_value,
                status_color: None,
                priority_id: "prio-20".to_string(),
                priority_name: "Normal".to_string(),
                priority_value: 20,
                type_id: "type-10".to_string(),
                type_name: "General".to_string(),
            },
            equipment: vec![],
            songs: vec![],
            assignees: vec![],
        }
    }

    fn due(day: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_filter_matches_what_case_insensitive() {
        let cards = vec![card("a", "Stage Lighting", 10, None)];
        assert_eq!(filter_cards(&cards, "light").len(), 1);
        assert_eq!(filter_cards(&cards, "LIGHT").len(), 1);
        assert_eq!(filter_cards(&cards, "sound").len(), 0);
    }

    #[test]
    fn test_filter_matches_equipment_and_song_names() {
        let mut c = card("a", "Rehearsal", 10, None);
        c.equipment.push(RequestEquipment {
            equipment_id: "eq-1".to_string(),
            name: "Fog Machine".to_string(),
            amount: 1,
        });
        c.songs.push("Morning Anthem".to_string());
        let cards = vec![c];
        assert_eq!(filter_cards(&cards, "fog").len(), 1);
        assert_eq!(filter_cards(&cards, "anthem").len(), 1);
        assert_eq!(filter_cards(&cards, "strobe").len(), 0);
    }

    #[test]
    fn test_filter_empty_query_returns_all() {
        let cards = vec![card("a", "x", 10, None), card("b", "y", 20, None)];
        assert_eq!(filter_cards(&cards, "  ").len(), 2);
    }

    #[test]
    fn test_group_by_status_is_a_partition() {
        let cards = vec![
            card("a", "one", 10, None),
            card("b", "two", 30, None),
            card("c", "three", 10, None),
            card("d", "four", 20, None),
        ];
        let groups = group_by_status(&cards);

        let keys: Vec<i64> = groups.keys().copied().collect();
        assert_eq!(keys, vec![10, 20, 30]);

        let mut regrouped: Vec<String> = groups
            .values()
            .flatten()
            .map(|c| c.row.id.clone())
            .collect();
        regrouped.sort();
        assert_eq!(regrouped, vec!["a", "b", "c", "d"]);

        assert_eq!(groups[&10].len(), 2);
        assert_eq!(groups[&20].len(), 1);
    }

    #[test]
    fn test_sort_by_due_asc_missing_as_epoch() {
        let mut cards = vec![
            card("late", "x", 30, due(20)),
            card("none", "x", 10, None),
            card("soon", "x", 20, due(5)),
        ];
        sort_cards(&mut cards, &[SortRule::new(SortField::Due, SortDir::Asc)]);
        let ids: Vec<&str> = cards.iter().map(|c| c.row.id.as_str()).collect();
        // the missing due date compares as epoch 0 and sorts first
        assert_eq!(ids, vec!["none", "soon", "late"]);
    }

    #[test]
    fn test_sort_first_non_zero_rule_wins() {
        let mut a = card("a", "alpha", 20, due(10));
        let mut b = card("b", "beta", 10, due(10));
        a.row.priority_value = 30;
        b.row.priority_value = 30;
        let mut cards = vec![a, b];

        // equal priority falls through to the status rule
        let rules = [
            SortRule::new(SortField::Priority, SortDir::Desc),
            SortRule::new(SortField::Status, SortDir::Asc),
        ];
        sort_cards(&mut cards, &rules);
        let ids: Vec<&str> = cards.iter().map(|c| c.row.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_sort_skips_disabled_rules() {
        let mut cards = vec![card("a", "zeta", 10, None), card("b", "alpha", 20, None)];
        let rules = [
            SortRule { field: SortField::What, dir: SortDir::Asc, enabled: false },
            SortRule::new(SortField::Status, SortDir::Desc),
        ];
        sort_cards(&mut cards, &rules);
        let ids: Vec<&str> = cards.iter().map(|c| c.row.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_parse_sort_rules() {
        let rules = parse_sort_rules("due:asc, priority:desc, bogus:asc, who");
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].field, SortField::Due);
        assert_eq!(rules[1].field, SortField::Priority);
        assert_eq!(rules[1].dir, SortDir::Desc);
        assert_eq!(rules[2].field, SortField::Who);
        assert_eq!(rules[2].dir, SortDir::Asc);
    }
}
