//! Column names of the Steam games CSV export.

pub const APP_ID: &str = "AppID";
pub const NAME: &str = "Name";
pub const RELEASE_DATE: &str = "Release date";
pub const REQUIRED_AGE: &str = "Required age";
pub const ABOUT_THE_GAME: &str = "About the game";
pub const HEADER_IMAGE: &str = "Header image";
pub const NOTES: &str = "Notes";

pub const WEBSITE: &str = "Website";
pub const SUPPORT_URL: &str = "Support url";
pub const SUPPORT_EMAIL: &str = "Support email";

pub const PRICE: &str = "Price";
pub const DISCOUNT: &str = "Discount";

pub const POSITIVE: &str = "Positive";
pub const NEGATIVE: &str = "Negative";
pub const USER_SCORE: &str = "User score";
pub const SCORE_RANK: &str = "Score rank";
pub const RECOMMENDATIONS: &str = "Recommendations";
pub const REVIEWS: &str = "Reviews";

pub const ESTIMATED_OWNERS: &str = "Estimated owners";
pub const PEAK_CCU: &str = "Peak CCU";
pub const DLC_COUNT: &str = "DLC count";
pub const ACHIEVEMENTS: &str = "Achievements";
pub const AVERAGE_PLAYTIME_FOREVER: &str = "Average playtime forever";
pub const AVERAGE_PLAYTIME_TWO_WEEKS: &str = "Average playtime two weeks";
pub const MEDIAN_PLAYTIME_FOREVER: &str = "Median playtime forever";
pub const MEDIAN_PLAYTIME_TWO_WEEKS: &str = "Median playtime two weeks";

pub const METACRITIC_SCORE: &str = "Metacritic score";
pub const METACRITIC_URL: &str = "Metacritic url";

pub const SCREENSHOTS: &str = "Screenshots";
pub const MOVIES: &str = "Movies";

pub const DEVELOPERS: &str = "Developers";
pub const PUBLISHERS: &str = "Publishers";
pub const CATEGORIES: &str = "Categories";
pub const GENRES: &str = "Genres";
pub const TAGS: &str = "Tags";
pub const SUPPORTED_LANGUAGES: &str = "Supported languages";
pub const FULL_AUDIO_LANGUAGES: &str = "Full audio languages";

/// Boolean platform columns; each column name doubles as the platform name.
pub const PLATFORMS: [&str; 3] = ["Windows", "Mac", "Linux"];
