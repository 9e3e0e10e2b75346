//! Turns a free-text query into a structured retrieval plan (C13): intent
//! classification, capitalized-entity extraction, and ISO-date/temporal-keyword time
//! range extraction — ported from the original `QueryPlanner.plan()`.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Factual,
    Temporal,
    EntityLookup,
    Exploratory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    pub raw_query: String,
    pub intent: Intent,
    pub entities: Vec<String>,
    pub time_range: Option<TimeRange>,
}

const TEMPORAL_KEYWORDS: &[&str] = &[
    "yesterday", "today", "last week", "last month", "last year", "this week", "this month",
    "when", "schedule", "date", "time", "timeline",
];

const ENTITY_LOOKUP_KEYWORDS: &[&str] = &["who is", "who was", "tell me about"];

pub struct QueryPlanner {
    capitalized_run: Regex,
    iso_date: Regex,
}

impl QueryPlanner {
    pub fn new() -> Self {
        Self {
            capitalized_run: Regex::new(r"\b([A-Z][a-zA-Z]*(?:\s+[A-Z][a-zA-Z]*)*)\b").unwrap(),
            iso_date: Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap(),
        }
    }

    pub fn plan(&self, query: &str, now: DateTime<Utc>) -> QueryPlan {
        let entities = self.extract_entities(query);
        let time_range = self.extract_time_range(query, now);
        let intent = self.classify_intent(query, &entities, &time_range);
        QueryPlan {
            raw_query: query.to_string(),
            intent,
            entities,
            time_range,
        }
    }

    /// Capitalized word runs, skipping the sentence-initial word so a query like
    /// "Who attended the Atlas kickoff" doesn't treat "Who" as an entity.
    fn extract_entities(&self, query: &str) -> Vec<String> {
        let mut entities = Vec::new();
        for (idx, m) in self.capitalized_run.find_iter(query).enumerate() {
            if idx == 0 && m.start() == 0 {
                continue;
            }
            let candidate = m.as_str().trim();
            if candidate.len() > 1 && !entities.iter().any(|e: &String| e == candidate) {
                entities.push(candidate.to_string());
            }
        }
        entities
    }

    fn extract_time_range(&self, query: &str, now: DateTime<Utc>) -> Option<TimeRange> {
        if let Some(m) = self.iso_date.find(query) {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d") {
                let from = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
                let to = from + Duration::days(1);
                return Some(TimeRange { from, to });
            }
        }

        let lowered = query.to_lowercase();
        for keyword in TEMPORAL_KEYWORDS {
            if lowered.contains(keyword) {
                return Some(self.resolve_relative_keyword(keyword, now));
            }
        }
        None
    }

    fn resolve_relative_keyword(&self, keyword: &str, now: DateTime<Utc>) -> TimeRange {
        let today_start = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        match keyword {
            "yesterday" => TimeRange {
                from: today_start - Duration::days(1),
                to: today_start,
            },
            "today" => TimeRange {
                from: today_start,
                to: today_start + Duration::days(1),
            },
            "last week" => TimeRange {
                from: today_start - Duration::weeks(1),
                to: today_start,
            },
            "this week" => TimeRange {
                from: today_start - Duration::days(today_start.weekday().num_days_from_monday() as i64),
                to: today_start + Duration::days(1),
            },
            "last month" => TimeRange {
                from: today_start - Duration::days(30),
                to: today_start,
            },
            "this month" => TimeRange {
                from: today_start - Duration::days(today_start.day0() as i64),
                to: today_start + Duration::days(1),
            },
            "last year" => TimeRange {
                from: today_start - Duration::days(365),
                to: today_start,
            },
            // Generic temporal cue ("when", "schedule", "date", "time", "timeline")
            // without an explicit relative phrase: fall back to a trailing 30-day
            // window ending now, same as the original planner's `subtract(months=1)`.
            _ => TimeRange {
                from: now - Duration::days(30),
                to: now,
            },
        }
    }

    fn classify_intent(&self, query: &str, entities: &[String], time_range: &Option<TimeRange>) -> Intent {
        let lowered = query.to_lowercase();
        if ENTITY_LOOKUP_KEYWORDS.iter().any(|kw| lowered.contains(kw)) && !entities.is_empty() {
            return Intent::EntityLookup;
        }
        if time_range.is_some() {
            return Intent::Temporal;
        }
        if lowered.trim_end_matches('?').ends_with("it") || lowered.split_whitespace().count() <= 3 {
            return Intent::Exploratory;
        }
        Intent::Factual
    }
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

use chrono::Datelike;

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        "2026-07-26T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn extracts_capitalized_entity_skipping_sentence_start() {
        let planner = QueryPlanner::new();
        let plan = planner.plan("What did Ada Lovelace say about Project Atlas", fixed_now());
        assert!(plan.entities.contains(&"Ada Lovelace".to_string()));
        assert!(plan.entities.contains(&"Project Atlas".to_string()));
    }

    #[test]
    fn iso_date_drives_temporal_intent() {
        let planner = QueryPlanner::new();
        let plan = planner.plan("What happened on 2026-07-20", fixed_now());
        assert_eq!(plan.intent, Intent::Temporal);
        assert!(plan.time_range.is_some());
    }

    #[test]
    fn relative_keyword_yesterday_resolves_to_prior_day() {
        let planner = QueryPlanner::new();
        let plan = planner.plan("what did we discuss yesterday", fixed_now());
        let range = plan.time_range.unwrap();
        assert_eq!((range.to - range.from).num_days(), 1);
    }

    #[test]
    fn who_is_with_entity_is_entity_lookup() {
        let planner = QueryPlanner::new();
        let plan = planner.plan("Who is Ada Lovelace", fixed_now());
        assert_eq!(plan.intent, Intent::EntityLookup);
    }

    #[test]
    fn when_question_is_temporal_with_entity_and_time_range() {
        let planner = QueryPlanner::new();
        let plan = planner.plan("When was Project Alpha kickoff?", fixed_now());
        assert_eq!(plan.intent, Intent::Temporal);
        assert!(plan.entities.contains(&"Project Alpha".to_string()));
        assert!(plan.time_range.is_some());
    }

    #[test]
    fn plain_query_without_entities_or_time_is_factual_or_exploratory() {
        let planner = QueryPlanner::new();
        let plan = planner.plan("explain the quarterly roadmap decisions in detail", fixed_now());
        assert_eq!(plan.intent, Intent::Factual);
    }
}
