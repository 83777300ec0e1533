pub mod fields;
pub mod reviews;

pub use fields::{parse_csv_list, parse_date, parse_flag, parse_int, parse_list, parse_number};
pub use reviews::split_reviews;
