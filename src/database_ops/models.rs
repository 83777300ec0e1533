//! Typed rows built from one source record, ready for the store.

use chrono::NaiveDate;
use indexmap::IndexSet;

use super::catalog::{ReferenceKind, ReferenceMaps};
use super::columns;
use crate::normalization::{parse_csv_list, parse_date, parse_int, parse_number, split_reviews};
use crate::source::SourceRecord;

fn text(record: &SourceRecord, column: &str) -> Option<String> {
    record.get(column).map(str::to_string)
}

/// The record's usable primary identifier; zero counts as none.
pub fn extract_app_id(record: &SourceRecord) -> Option<i64> {
    parse_int(record.get(columns::APP_ID)).filter(|id| *id != 0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameRow {
    pub app_id: i64,
    pub name: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub required_age: Option<i32>,
    pub about_the_game: Option<String>,
    pub header_image: Option<String>,
    pub notes: Option<String>,
}

impl GameRow {
    pub fn from_record(app_id: i64, record: &SourceRecord) -> Self {
        Self {
            app_id,
            name: text(record, columns::NAME),
            release_date: parse_date(record.get(columns::RELEASE_DATE)),
            required_age: parse_int(record.get(columns::REQUIRED_AGE))
                .and_then(|age| i32::try_from(age).ok()),
            about_the_game: text(record, columns::ABOUT_THE_GAME),
            header_image: text(record, columns::HEADER_IMAGE),
            notes: text(record, columns::NOTES),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactInfo {
    pub website: Option<String>,
    pub support_url: Option<String>,
    pub support_email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub price: f64,
    pub discount: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewAggregates {
    pub positive: Option<i64>,
    pub negative: Option<i64>,
    pub user_score: Option<f64>,
    pub score_rank: Option<i64>,
    pub recommendations: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageStats {
    /// Bucket label such as `"0 - 20000"`, stored verbatim.
    pub estimated_owners: Option<String>,
    pub peak_ccu: Option<i64>,
    pub dlc_count: Option<i64>,
    pub achievements: Option<i64>,
    pub average_playtime_forever: Option<i64>,
    pub average_playtime_two_weeks: Option<i64>,
    pub median_playtime_forever: Option<i64>,
    pub median_playtime_two_weeks: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriticScore {
    pub score: Option<i64>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageLink {
    pub language_id: i64,
    pub full_audio: bool,
}

/// Everything written in the details unit of one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameDetails {
    pub contact: ContactInfo,
    pub pricing: Option<Pricing>,
    pub review_aggregates: ReviewAggregates,
    pub review_texts: Vec<String>,
    pub stats: UsageStats,
    pub critic: Option<CriticScore>,
    pub screenshots: Vec<String>,
    pub movies: Vec<String>,
    pub languages: Vec<LanguageLink>,
}

impl GameDetails {
    pub fn from_record(record: &SourceRecord, maps: &ReferenceMaps) -> Self {
        let int = |column: &str| parse_int(record.get(column));

        let pricing = parse_number(record.get(columns::PRICE)).map(|price| Pricing {
            price,
            discount: parse_number(record.get(columns::DISCOUNT)),
        });

        // Presence of either raw cell is enough, even if the score is junk.
        let critic = (record.is_present(columns::METACRITIC_SCORE)
            || record.is_present(columns::METACRITIC_URL))
        .then(|| CriticScore {
            score: int(columns::METACRITIC_SCORE),
            url: text(record, columns::METACRITIC_URL),
        });

        Self {
            contact: ContactInfo {
                website: text(record, columns::WEBSITE),
                support_url: text(record, columns::SUPPORT_URL),
                support_email: text(record, columns::SUPPORT_EMAIL),
            },
            pricing,
            review_aggregates: ReviewAggregates {
                positive: int(columns::POSITIVE),
                negative: int(columns::NEGATIVE),
                user_score: parse_number(record.get(columns::USER_SCORE)),
                score_rank: int(columns::SCORE_RANK),
                recommendations: int(columns::RECOMMENDATIONS),
            },
            review_texts: record
                .get(columns::REVIEWS)
                .map(split_reviews)
                .unwrap_or_default(),
            stats: UsageStats {
                estimated_owners: text(record, columns::ESTIMATED_OWNERS),
                peak_ccu: int(columns::PEAK_CCU),
                dlc_count: int(columns::DLC_COUNT),
                achievements: int(columns::ACHIEVEMENTS),
                average_playtime_forever: int(columns::AVERAGE_PLAYTIME_FOREVER),
                average_playtime_two_weeks: int(columns::AVERAGE_PLAYTIME_TWO_WEEKS),
                median_playtime_forever: int(columns::MEDIAN_PLAYTIME_FOREVER),
                median_playtime_two_weeks: int(columns::MEDIAN_PLAYTIME_TWO_WEEKS),
            },
            critic,
            screenshots: parse_csv_list(record.get(columns::SCREENSHOTS)),
            movies: parse_csv_list(record.get(columns::MOVIES)),
            languages: language_links(record, maps),
        }
    }
}

fn language_links(record: &SourceRecord, maps: &ReferenceMaps) -> Vec<LanguageLink> {
    let supported: IndexSet<String> = parse_csv_list(record.get(columns::SUPPORTED_LANGUAGES))
        .into_iter()
        .collect();
    let full_audio: IndexSet<String> = parse_csv_list(record.get(columns::FULL_AUDIO_LANGUAGES))
        .into_iter()
        .collect();

    supported
        .iter()
        .filter_map(|name| {
            maps.get(ReferenceKind::Language, name).map(|language_id| LanguageLink {
                language_id,
                full_audio: full_audio.contains(name),
            })
        })
        .collect()
}
